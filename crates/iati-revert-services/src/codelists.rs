use iati_revert_codelists::Codelists;
use iati_revert_core::IDENTIFIER_TAG;
use iati_revert_xml::Element;

/// One coded attribute to remap: elements at `path` (relative to the
/// activity) get `attribute` translated through `codelist`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodelistRule {
    pub path: &'static str,
    pub attribute: &'static str,
    pub codelist: &'static str,
}

pub const CODELIST_RULES: &[CodelistRule] = &[
    CodelistRule {
        path: "participating-org",
        attribute: "role",
        codelist: "OrganisationRole",
    },
    CodelistRule {
        path: "activity-date",
        attribute: "type",
        codelist: "ActivityDateType",
    },
    CodelistRule {
        path: "transaction/transaction-type",
        attribute: "code",
        codelist: "TransactionType",
    },
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub remapped: usize,
    pub missed: usize,
}

/// Trimmed `iati-identifier` text of an activity.
pub fn activity_identifier(activity: &Element) -> Option<String> {
    activity
        .find_child(IDENTIFIER_TAG)
        .and_then(Element::text)
        .map(|t| t.trim().to_string())
}

/// Rules whose codelist is not among the loaded tables.
pub fn unloaded_rules<'r>(rules: &'r [CodelistRule], codelists: &Codelists) -> Vec<&'r CodelistRule> {
    rules
        .iter()
        .filter(|r| !codelists.contains(r.codelist))
        .collect()
}

pub fn rewrite_codelists(activity: &mut Element, codelists: &Codelists) -> RewriteOutcome {
    rewrite_with_rules(activity, codelists, CODELIST_RULES)
}

/// Apply each rule to every matching element. A value without a mapping
/// (or an element lacking the attribute) is left as is.
pub fn rewrite_with_rules(
    activity: &mut Element,
    codelists: &Codelists,
    rules: &[CodelistRule],
) -> RewriteOutcome {
    let identifier = activity_identifier(activity);
    let mut out = RewriteOutcome::default();

    for rule in rules {
        for el in activity.select_mut(rule.path) {
            let Some(current) = el.attr(rule.attribute) else {
                continue;
            };
            match codelists.lookup(rule.codelist, current) {
                Some(mapped) => {
                    el.set_attr(rule.attribute, mapped);
                    out.remapped += 1;
                }
                None => {
                    tracing::debug!(
                        event = "codelist_miss",
                        codelist = rule.codelist,
                        value = current,
                        activity = identifier.as_deref().unwrap_or("<unknown>"),
                    );
                    out.missed += 1;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use iati_revert_xml::parse_document;

    fn codelists() -> Codelists {
        [
            ("TransactionType", vec![("1", "A"), ("2", "C")]),
            ("OrganisationRole", vec![("1", "Funding"), ("4", "Implementing")]),
            ("ActivityDateType", vec![("2", "start-actual")]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn mapped_value_is_replaced() {
        let mut a = parse_document(
            r#"<iati-activity><transaction><transaction-type code="1"/></transaction></iati-activity>"#,
        )
        .unwrap();
        let out = rewrite_codelists(&mut a, &codelists());
        assert_eq!(out, RewriteOutcome { remapped: 1, missed: 0 });
        let t = a.select("transaction/transaction-type")[0];
        assert_eq!(t.attr("code"), Some("A"));
    }

    #[test]
    fn unmapped_value_is_left_alone() {
        let mut a = parse_document(
            r#"<iati-activity><transaction><transaction-type code="11"/></transaction><transaction><transaction-type code="2"/></transaction></iati-activity>"#,
        )
        .unwrap();
        let out = rewrite_codelists(&mut a, &codelists());
        assert_eq!(out, RewriteOutcome { remapped: 1, missed: 1 });
        let codes: Vec<_> = a
            .select("transaction/transaction-type")
            .iter()
            .map(|t| t.attr("code"))
            .collect();
        assert_eq!(codes, [Some("11"), Some("C")]);
    }

    #[test]
    fn other_attributes_untouched() {
        let mut a = parse_document(
            r#"<iati-activity><participating-org ref="GB-1" role="4" type="10" xml:lang="en">Agency</participating-org></iati-activity>"#,
        )
        .unwrap();
        rewrite_codelists(&mut a, &codelists());
        let org = a.select("participating-org")[0];
        assert_eq!(
            org.attributes,
            vec![
                ("ref".to_string(), "GB-1".to_string()),
                ("role".to_string(), "Implementing".to_string()),
                ("type".to_string(), "10".to_string()),
                ("xml:lang".to_string(), "en".to_string()),
            ]
        );
    }

    #[test]
    fn missing_table_or_attribute_is_silent() {
        let mut a = parse_document(
            r#"<iati-activity><iati-identifier>X-1</iati-identifier><activity-date iso-date="2015-01-01"/><activity-date type="2"/></iati-activity>"#,
        )
        .unwrap();
        let out = rewrite_codelists(&mut a, &Codelists::default());
        assert_eq!(out, RewriteOutcome { remapped: 0, missed: 1 });
        assert_eq!(a.select("activity-date")[1].attr("type"), Some("2"));
        assert_eq!(a.select("activity-date")[0].attr("type"), None);
    }

    #[test]
    fn identifier_is_trimmed() {
        let a = parse_document(
            "<iati-activity><iati-identifier>\n  GB-1-123 \n</iati-identifier></iati-activity>",
        )
        .unwrap();
        assert_eq!(activity_identifier(&a).as_deref(), Some("GB-1-123"));
    }

    #[test]
    fn reports_rules_without_tables() {
        let cl: Codelists = [("TransactionType", vec![("1", "A")])].into_iter().collect();
        let missing: Vec<_> = unloaded_rules(CODELIST_RULES, &cl)
            .iter()
            .map(|r| r.codelist)
            .collect();
        assert_eq!(missing, ["OrganisationRole", "ActivityDateType"]);
    }
}
