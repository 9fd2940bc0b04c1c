use thiserror::Error;

/// Workspace-wide result alias.
pub type Result<T> = color_eyre::eyre::Result<T>;

/// Schema version the input documents are expected to carry.
pub const SOURCE_VERSION: &str = "2.01";

/// Schema version written to the root of converted documents.
pub const TARGET_VERSION: &str = "1.05";

/// Column holding the 2.01 code in a codelist mapping table.
pub const SOURCE_COLUMN: &str = "2.01";

/// Column holding the 1.0x code in a codelist mapping table.
pub const TARGET_COLUMN: &str = "1.0x";

/// Tag of a single activity record.
pub const ACTIVITY_TAG: &str = "iati-activity";

/// Tag of the child carrying an activity's unique identifier.
pub const IDENTIFIER_TAG: &str = "iati-identifier";

/// Tag of the inner text-bearing element of a two-level narrative.
pub const NARRATIVE_TAG: &str = "narrative";

/// Typed failures raised by the library crates. They travel inside
/// `color_eyre` reports up to the binary.
#[derive(Debug, Error)]
pub enum ReversionError {
    #[error("malformed XML: {0}")]
    Xml(String),
    #[error("codelist {path}: missing column `{column}`")]
    MissingColumn { path: String, column: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_column_message_names_file_and_column() {
        let err = ReversionError::MissingColumn {
            path: "codelists/TransactionType.csv".into(),
            column: "1.0x".into(),
        };
        assert_eq!(
            err.to_string(),
            "codelist codelists/TransactionType.csv: missing column `1.0x`"
        );
    }
}
