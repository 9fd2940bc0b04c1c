use crate::activity::convert_activity;
use crate::codelists::{unloaded_rules, CODELIST_RULES};
use crate::narrative::NarrativeOptions;
use crate::Result;
use iati_revert_codelists::Codelists;
use iati_revert_core::{ACTIVITY_TAG, SOURCE_VERSION, TARGET_VERSION};
use iati_revert_xml::{parse_document, Element};
use serde::Serialize;

/// Counters gathered over one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReversionStats {
    pub source_version: Option<String>,
    pub target_version: String,
    pub activities: usize,
    pub narratives_flattened: usize,
    pub outer_removed: usize,
    pub codes_remapped: usize,
    pub lookup_misses: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversionOptions {
    pub target_version: String,
    pub narrative: NarrativeOptions,
}

impl Default for ReversionOptions {
    fn default() -> Self {
        Self {
            target_version: TARGET_VERSION.to_string(),
            narrative: NarrativeOptions::default(),
        }
    }
}

/// Converts documents against one loaded set of codelists.
#[derive(Debug, Clone)]
pub struct Reverter<'a> {
    codelists: &'a Codelists,
    opts: ReversionOptions,
}

impl<'a> Reverter<'a> {
    pub fn new(codelists: &'a Codelists, opts: ReversionOptions) -> Self {
        for rule in unloaded_rules(CODELIST_RULES, codelists) {
            tracing::warn!(
                "codelist {} not loaded, `{}/@{}` stays unchanged",
                rule.codelist,
                rule.path,
                rule.attribute
            );
        }
        Self { codelists, opts }
    }

    pub fn revert(&self, doc: Element) -> (Element, ReversionStats) {
        revert_document(doc, self.codelists, &self.opts)
    }

    pub fn revert_str(&self, xml: &str) -> Result<(Element, ReversionStats)> {
        let doc = parse_document(xml)?;
        Ok(self.revert(doc))
    }
}

/// Pull every activity out of `doc`, reset the root to the target version
/// with no children, then convert the activities back into it in document
/// order. The root element is the container and is never itself treated as
/// an activity.
pub fn revert_document(
    mut doc: Element,
    codelists: &Codelists,
    opts: &ReversionOptions,
) -> (Element, ReversionStats) {
    let activities = doc.take_descendants(ACTIVITY_TAG);
    let source_version = doc.attr("version").map(str::to_string);
    if source_version.as_deref() != Some(SOURCE_VERSION) {
        tracing::warn!(
            "input declares version {:?}, expected {}",
            source_version.as_deref().unwrap_or("<none>"),
            SOURCE_VERSION
        );
    }
    tracing::debug!(event = "reversion_start", activities = activities.len());

    doc.set_attr("version", opts.target_version.as_str());
    doc.children.clear();

    let mut stats = ReversionStats {
        source_version,
        target_version: opts.target_version.clone(),
        ..ReversionStats::default()
    };
    for activity in activities {
        convert_activity(activity, &mut doc, codelists, opts.narrative, &mut stats);
    }

    tracing::info!(
        "Converted {} activit(y/ies): {} narrative(s) flattened, {} code(s) remapped, {} without mapping",
        stats.activities,
        stats.narratives_flattened,
        stats.codes_remapped,
        stats.lookup_misses
    );
    (doc, stats)
}
