use crate::codelists::rewrite_codelists;
use crate::narrative::{flatten_narratives, NarrativeOptions, NARRATIVE_CATEGORIES};
use crate::reversion::ReversionStats;
use iati_revert_codelists::Codelists;
use iati_revert_xml::Element;

/// Flatten narratives for every category, remap coded attributes, then move
/// the activity into `out`.
pub fn convert_activity(
    mut activity: Element,
    out: &mut Element,
    codelists: &Codelists,
    opts: NarrativeOptions,
    stats: &mut ReversionStats,
) {
    for category in NARRATIVE_CATEGORIES {
        let n = flatten_narratives(&mut activity, category, opts);
        stats.narratives_flattened += n.flattened;
        stats.outer_removed += n.removed;
    }
    let r = rewrite_codelists(&mut activity, codelists);
    stats.codes_remapped += r.remapped;
    stats.lookup_misses += r.missed;
    stats.activities += 1;
    out.push_element(activity);
}
