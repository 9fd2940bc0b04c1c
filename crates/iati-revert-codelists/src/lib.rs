use color_eyre::eyre::WrapErr;
use iati_revert_core::{ReversionError, Result, SOURCE_COLUMN, TARGET_COLUMN};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use walkdir::WalkDir;

/// Header labels of the two columns read from every codelist table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodelistColumns {
    /// Column with the newer-schema code (lookup key).
    pub source: String,
    /// Column with the older-schema code (replacement value).
    pub target: String,
}

impl Default for CodelistColumns {
    fn default() -> Self {
        Self {
            source: SOURCE_COLUMN.to_string(),
            target: TARGET_COLUMN.to_string(),
        }
    }
}

/// Loaded mapping tables: codelist name -> (new code -> old code).
/// Built once and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct Codelists {
    tables: HashMap<String, HashMap<String, String>>,
}

impl Codelists {
    /// Replacement for `value` in `table`, if both exist.
    pub fn lookup(&self, table: &str, value: &str) -> Option<&str> {
        self.tables
            .get(table)
            .and_then(|t| t.get(value))
            .map(String::as_str)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn insert(&mut self, table: impl Into<String>, pairs: HashMap<String, String>) {
        self.tables.insert(table.into(), pairs);
    }

    /// Sorted table names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl<K, V, P> FromIterator<(K, P)> for Codelists
where
    K: Into<String>,
    V: Into<String>,
    P: IntoIterator<Item = (V, V)>,
{
    fn from_iter<I: IntoIterator<Item = (K, P)>>(iter: I) -> Self {
        let tables = iter
            .into_iter()
            .map(|(name, pairs)| {
                let map = pairs
                    .into_iter()
                    .map(|(a, b)| (a.into(), b.into()))
                    .collect();
                (name.into(), map)
            })
            .collect();
        Self { tables }
    }
}

/// Load every `*.csv` directly inside `dir`. The table name is the file
/// name up to its first dot; files with other extensions are skipped.
pub fn load_codelists(dir: &Path, columns: &CodelistColumns) -> Result<Codelists> {
    if !dir.is_dir() {
        color_eyre::eyre::bail!("codelist directory {} not found", dir.display());
    }

    let mut out = Codelists::default();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.wrap_err_with(|| format!("listing {}", dir.display()))?;
        let p = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if p.extension()
            .and_then(|e| e.to_str())
            .is_none_or(|ext| !ext.eq_ignore_ascii_case("csv"))
        {
            tracing::debug!(event = "codelist_skip", path = %p.display());
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        let name = file_name.split('.').next().unwrap_or_default().to_string();

        let file = std::fs::File::open(p).wrap_err_with(|| format!("opening {}", p.display()))?;
        let pairs = read_table(file, columns, &p.display().to_string())?;
        tracing::debug!(event = "codelist_loaded", codelist = %name, pairs = pairs.len());
        out.insert(name, pairs);
    }

    tracing::info!(
        "Loaded {} codelist(s) from {}: {}",
        out.len(),
        dir.display(),
        out.names().join(", ")
    );
    Ok(out)
}

/// Read one CSV table into `source -> target` pairs. `origin` is only used
/// in error messages.
pub fn read_table<R: Read>(
    reader: R,
    columns: &CodelistColumns,
    origin: &str,
) -> Result<HashMap<String, String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .wrap_err_with(|| format!("reading header of {origin}"))?
        .clone();
    let position = |label: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h.trim() == label)
            .ok_or_else(|| {
                ReversionError::MissingColumn {
                    path: origin.to_string(),
                    column: label.to_string(),
                }
                .into()
            })
    };
    let src = position(&columns.source)?;
    let dst = position(&columns.target)?;

    let mut pairs = HashMap::new();
    for record in rdr.records() {
        let record = record.wrap_err_with(|| format!("reading {origin}"))?;
        let (Some(from), Some(to)) = (record.get(src), record.get(dst)) else {
            continue;
        };
        pairs.insert(from.to_string(), to.to_string());
    }
    Ok(pairs)
}
