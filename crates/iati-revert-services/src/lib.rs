//! High-level conversion layer over the lower-level crates.
//! Exposes the stable entry points used by the CLI.

pub mod activity;
pub mod codelists;
pub mod narrative;
pub mod reversion;

use std::path::Path;

pub use iati_revert_codelists::{CodelistColumns, Codelists};
pub use iati_revert_core::Result;
pub use iati_revert_xml::Element;
pub use narrative::NarrativeOptions;
pub use reversion::{revert_document, ReversionOptions, ReversionStats, Reverter};

/// Load the codelist tables under `dir`. Thin wrapper so clients do not need
/// to depend on the loader crate directly.
pub fn load_codelists(dir: &Path, columns: &CodelistColumns) -> Result<Codelists> {
    iati_revert_codelists::load_codelists(dir, columns)
}

/// Read and convert one document from disk.
pub fn revert_file(path: &Path, reverter: &Reverter<'_>) -> Result<(Element, ReversionStats)> {
    let doc = iati_revert_xml::read_document(path)?;
    Ok(reverter.revert(doc))
}
