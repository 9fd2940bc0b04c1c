use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "iati-revert.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevertConfig {
    pub codelists_dir: Option<String>,
    pub target_version: Option<String>,
    pub columns: Option<ColumnsCfg>,
    pub narrative: Option<NarrativeCfg>,
    pub output: Option<OutputCfg>,
    pub logging: Option<LoggingCfg>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColumnsCfg {
    pub source: Option<String>,
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NarrativeCfg {
    pub drop_empty: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputCfg {
    pub xml_declaration: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingCfg {
    pub dir: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Search order: CWD/iati-revert.toml, then
/// `$CONFIG_DIR/iati-revert/iati-revert.toml`. Earlier files win per key.
pub fn load_config() -> Result<RevertConfig, ConfigError> {
    let mut candidates = Vec::new();
    if let Ok(p) = std::env::current_dir() {
        candidates.push(p.join(CONFIG_FILE));
    }
    if let Some(base) = dirs::config_dir() {
        candidates.push(base.join("iati-revert").join(CONFIG_FILE));
    }
    load_from(&candidates)
}

/// Merge every readable file of `paths`, first wins. Missing files are
/// skipped; a file that exists but does not parse is an error.
pub fn load_from(paths: &[PathBuf]) -> Result<RevertConfig, ConfigError> {
    let mut merged = RevertConfig::default();
    for path in paths {
        if let Some(cfg) = read_file(path)? {
            tracing::debug!(event = "config_loaded", path = %path.display());
            merged = merge(merged, cfg);
        }
    }
    Ok(merged)
}

fn read_file(path: &Path) -> Result<Option<RevertConfig>, ConfigError> {
    let Ok(s) = std::fs::read_to_string(path) else {
        return Ok(None);
    };
    toml::from_str::<RevertConfig>(&s)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn merge(mut a: RevertConfig, b: RevertConfig) -> RevertConfig {
    if a.codelists_dir.is_none() {
        a.codelists_dir = b.codelists_dir;
    }
    if a.target_version.is_none() {
        a.target_version = b.target_version;
    }
    a.columns = merge_opt(a.columns, b.columns, merge_columns);
    a.narrative = merge_opt(a.narrative, b.narrative, merge_narrative);
    a.output = merge_opt(a.output, b.output, merge_output);
    a.logging = merge_opt(a.logging, b.logging, merge_logging);
    a
}

fn merge_opt<T: Default>(a: Option<T>, b: Option<T>, f: fn(T, T) -> T) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (None, Some(b)) => Some(b),
        (Some(a), None) => Some(a),
        (None, None) => None,
    }
}

fn merge_columns(mut a: ColumnsCfg, b: ColumnsCfg) -> ColumnsCfg {
    if a.source.is_none() {
        a.source = b.source;
    }
    if a.target.is_none() {
        a.target = b.target;
    }
    a
}

fn merge_narrative(mut a: NarrativeCfg, b: NarrativeCfg) -> NarrativeCfg {
    if a.drop_empty.is_none() {
        a.drop_empty = b.drop_empty;
    }
    a
}

fn merge_output(mut a: OutputCfg, b: OutputCfg) -> OutputCfg {
    if a.xml_declaration.is_none() {
        a.xml_declaration = b.xml_declaration;
    }
    a
}

fn merge_logging(mut a: LoggingCfg, b: LoggingCfg) -> LoggingCfg {
    if a.dir.is_none() {
        a.dir = b.dir;
    }
    a
}
