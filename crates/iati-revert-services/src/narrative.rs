use iati_revert_core::NARRATIVE_TAG;
use iati_revert_xml::{Element, XmlNode};
use std::collections::BTreeSet;

/// Element categories whose `narrative` children get flattened, in the
/// order they are processed.
pub const NARRATIVE_CATEGORIES: &[&str] = &["title", "description", "participating-org"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NarrativeOptions {
    /// Also remove category elements that hold no `narrative` child.
    pub drop_empty: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NarrativeOutcome {
    pub flattened: usize,
    pub removed: usize,
}

/// Replace every `<category><narrative>..</narrative></category>` directly
/// under `activity` with one `<category>` per narrative. The new elements
/// carry the outer attributes overlaid with the narrative's own (narrative
/// wins) and are appended after the existing children.
pub fn flatten_narratives(
    activity: &mut Element,
    category: &str,
    opts: NarrativeOptions,
) -> NarrativeOutcome {
    let mut flattened = Vec::new();
    let mut to_remove = BTreeSet::new();

    for (idx, node) in activity.children.iter().enumerate() {
        let XmlNode::Element(outer) = node else {
            continue;
        };
        if outer.name != category {
            continue;
        }
        let before = flattened.len();
        flattened.extend(
            outer
                .child_elements()
                .filter(|c| c.name == NARRATIVE_TAG)
                .map(|inner| flatten_one(category, outer, inner)),
        );
        if flattened.len() > before || opts.drop_empty {
            to_remove.insert(idx);
        }
    }

    // Highest index first so the remaining indices stay valid.
    for idx in to_remove.iter().rev() {
        activity.children.remove(*idx);
    }

    let outcome = NarrativeOutcome {
        flattened: flattened.len(),
        removed: to_remove.len(),
    };
    for el in flattened {
        activity.push_element(el);
    }
    outcome
}

/// The flattened element takes the narrative's leading text, the text before
/// its first child. Markup nested inside a narrative and any text after it
/// are not carried over.
fn flatten_one(category: &str, outer: &Element, inner: &Element) -> Element {
    let mut el = Element::new(category);
    el.attributes = outer.attributes.clone();
    for (k, v) in &inner.attributes {
        el.set_attr(k, v.as_str());
    }
    if inner.child_elements().next().is_some() {
        tracing::debug!(
            event = "narrative_markup_dropped",
            category,
            children = inner.child_elements().count()
        );
    }
    if let Some(text) = inner.leading_text() {
        el.push_text(text);
    }
    el
}
