use color_eyre::eyre::WrapErr;
use iati_revert_core::{ReversionError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use roxmltree::{Document, Node, ParsingOptions};
use std::io::Write;
use std::path::Path;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// A node inside an owned element tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
    Comment(String),
}

/// Owned, mutable XML element. Names are kept qualified (`xml:lang`,
/// `akvo:photo-id`) and namespace declarations live among the attributes
/// as `xmlns` / `xmlns:<prefix>` entries, so the tree serializes back
/// without a separate namespace table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing the value in place when the key exists
    /// so attribute order stays stable.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// Text preceding the first child element or comment.
    pub fn leading_text(&self) -> Option<String> {
        let mut out: Option<String> = None;
        for child in &self.children {
            let XmlNode::Text(t) = child else {
                break;
            };
            out.get_or_insert_with(String::new).push_str(t);
        }
        out
    }

    /// Concatenated direct text children.
    pub fn text(&self) -> Option<String> {
        let mut out: Option<String> = None;
        for child in &self.children {
            if let XmlNode::Text(t) = child {
                out.get_or_insert_with(String::new).push_str(t);
            }
        }
        out
    }

    pub fn push_element(&mut self, child: Element) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(XmlNode::Text(text.into()));
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn find_child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    /// Elements reached by a `/`-separated path of child names, relative
    /// to `self`, in document order.
    pub fn select(&self, path: &str) -> Vec<&Element> {
        let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut out = Vec::new();
        collect_by_path(self, &segs, &mut out);
        out
    }

    /// Mutable variant of [`Element::select`].
    pub fn select_mut(&mut self, path: &str) -> Vec<&mut Element> {
        let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut out = Vec::new();
        collect_by_path_mut(self, &segs, &mut out);
        out
    }

    /// Detach every descendant named `name` (outermost matches only, in
    /// document order) and hand them back by value. A match re-declares the
    /// namespaces it inherited from intermediate ancestors, so it stays
    /// well-formed once moved directly under `self`.
    pub fn take_descendants(&mut self, name: &str) -> Vec<Element> {
        let mut out = Vec::new();
        take_into(self, name, &[], &mut out);
        out
    }

    /// Number of descendant elements named `name`, `self` excluded.
    pub fn count_descendants(&self, name: &str) -> usize {
        self.child_elements()
            .map(|c| usize::from(c.name == name) + c.count_descendants(name))
            .sum()
    }
}

fn collect_by_path<'a>(el: &'a Element, path: &[&str], out: &mut Vec<&'a Element>) {
    let Some((head, tail)) = path.split_first() else {
        out.push(el);
        return;
    };
    for child in el.child_elements().filter(|c| c.name == *head) {
        collect_by_path(child, tail, out);
    }
}

fn collect_by_path_mut<'a>(el: &'a mut Element, path: &[&str], out: &mut Vec<&'a mut Element>) {
    let Some((head, tail)) = path.split_first() else {
        out.push(el);
        return;
    };
    for child in el.children.iter_mut() {
        if let XmlNode::Element(c) = child {
            if c.name == *head {
                collect_by_path_mut(c, tail, out);
            }
        }
    }
}

/// `scope` holds the namespace declarations of the ancestors walked through
/// so far, outermost first.
fn take_into(el: &mut Element, name: &str, scope: &[(String, String)], out: &mut Vec<Element>) {
    let children = std::mem::take(&mut el.children);
    for node in children {
        match node {
            XmlNode::Element(mut child) if child.name == name => {
                redeclare(&mut child, scope);
                out.push(child);
            }
            XmlNode::Element(mut child) => {
                let mut inner = scope.to_vec();
                inner.extend(
                    child
                        .attributes
                        .iter()
                        .filter(|(k, _)| is_namespace_decl(k))
                        .cloned(),
                );
                take_into(&mut child, name, &inner, out);
                el.children.push(XmlNode::Element(child));
            }
            other => el.children.push(other),
        }
    }
}

/// Prepend the declarations of `scope` that `el` does not make itself. The
/// nearest ancestor wins when a prefix is declared more than once.
fn redeclare(el: &mut Element, scope: &[(String, String)]) {
    let mut missing: Vec<(String, String)> = Vec::new();
    for (k, v) in scope.iter().rev() {
        if el.attr(k).is_none() && !missing.iter().any(|(m, _)| m == k) {
            missing.push((k.clone(), v.clone()));
        }
    }
    missing.reverse();
    el.attributes.splice(0..0, missing);
}

fn is_namespace_decl(key: &str) -> bool {
    key == "xmlns" || key.starts_with("xmlns:")
}

/// Parse an XML document into an owned tree rooted at the document element.
/// Whitespace-only text is dropped so the writer can re-indent, unless it is
/// the whole content of its element. Processing instructions are not kept.
pub fn parse_document(xml: &str) -> Result<Element> {
    let opts = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(xml, opts)
        .map_err(|e| ReversionError::Xml(format!("{e}")))?;
    Ok(convert(doc.root_element(), None))
}

pub fn read_document(path: &Path) -> Result<Element> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    parse_document(&content).wrap_err_with(|| format!("parsing {}", path.display()))
}

fn convert(node: Node, parent: Option<Node>) -> Element {
    let mut el = Element::new(qualified_name(
        node,
        node.tag_name().namespace(),
        node.tag_name().name(),
    ));

    // Re-declare only what the parent does not already have in scope.
    for ns in node.namespaces().filter(|ns| ns.uri() != XML_NS) {
        let inherited = parent.is_some_and(|p| {
            p.namespaces()
                .any(|pns| pns.name() == ns.name() && pns.uri() == ns.uri())
        });
        if inherited {
            continue;
        }
        let key = match ns.name() {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        };
        el.attributes.push((key, ns.uri().to_string()));
    }

    for a in node.attributes() {
        el.attributes.push((
            qualified_name(node, a.namespace(), a.name()),
            a.value().to_string(),
        ));
    }

    for child in node.children() {
        if child.is_element() {
            el.push_element(convert(child, Some(node)));
        } else if child.is_text() {
            if let Some(t) = child.text() {
                if !t.trim().is_empty() || node.children().count() == 1 {
                    el.push_text(t);
                }
            }
        } else if child.is_comment() {
            if let Some(t) = child.text() {
                el.children.push(XmlNode::Comment(t.to_string()));
            }
        }
    }
    el
}

fn qualified_name(node: Node, namespace: Option<&str>, local: &str) -> String {
    match namespace {
        Some(XML_NS) => format!("xml:{local}"),
        Some(uri) => match node.lookup_prefix(uri) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
            _ => local.to_string(),
        },
        None => local.to_string(),
    }
}

/// Serialize `root` with two-space indentation. Elements holding only text
/// stay on one line.
pub fn write_document<W: Write>(out: W, root: &Element, declaration: bool) -> Result<()> {
    let mut w = Writer::new_with_indent(out, b' ', 2);
    if declaration {
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    }
    write_element(&mut w, root)?;
    let mut inner = w.into_inner();
    inner.write_all(b"\n")?;
    inner.flush()?;
    Ok(())
}

pub fn to_string_pretty(root: &Element, declaration: bool) -> Result<String> {
    let mut buf = Vec::new();
    write_document(&mut buf, root, declaration)?;
    Ok(String::from_utf8(buf)?)
}

fn write_element<W: Write>(w: &mut Writer<W>, el: &Element) -> Result<()> {
    let mut start = BytesStart::new(el.name.as_str());
    for (k, v) in &el.attributes {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if el.children.is_empty() {
        w.write_event(Event::Empty(start))?;
        return Ok(());
    }
    w.write_event(Event::Start(start))?;
    for child in &el.children {
        match child {
            XmlNode::Element(c) => write_element(w, c)?,
            XmlNode::Text(t) => w.write_event(Event::Text(BytesText::new(t)))?,
            XmlNode::Comment(c) => {
                w.write_event(Event::Comment(BytesText::from_escaped(c.as_str())))?
            }
        }
    }
    w.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<iati-activities version="2.01" xmlns:akvo="http://akvo.org/iati-activities">
  <!-- generated -->
  <iati-activity akvo:id="7">
    <iati-identifier>XM-1</iati-identifier>
    <title><narrative xml:lang="en">Hello &amp; bye</narrative></title>
    <transaction><transaction-type code="1"/></transaction>
    <transaction><transaction-type code="2"/></transaction>
  </iati-activity>
</iati-activities>"#;

    #[test]
    fn parse_keeps_qualified_names_and_declarations() {
        let root = parse_document(DOC).unwrap();
        assert_eq!(root.name, "iati-activities");
        assert_eq!(root.attr("version"), Some("2.01"));
        assert_eq!(
            root.attr("xmlns:akvo"),
            Some("http://akvo.org/iati-activities")
        );
        let activity = root.find_child("iati-activity").unwrap();
        assert_eq!(activity.attr("akvo:id"), Some("7"));
        // inherited declaration is not repeated
        assert_eq!(activity.attr("xmlns:akvo"), None);
        let narrative = &activity.select("title/narrative")[0];
        assert_eq!(narrative.attr("xml:lang"), Some("en"));
        assert_eq!(narrative.text().as_deref(), Some("Hello & bye"));
        assert!(matches!(root.children[0], XmlNode::Comment(_)));
    }

    #[test]
    fn malformed_input_is_an_error() {
        let err = parse_document("<a><b></a>").unwrap_err();
        assert!(err.downcast_ref::<ReversionError>().is_some());
    }

    #[test]
    fn select_mut_follows_child_paths() {
        let mut root = parse_document(DOC).unwrap();
        let activity = root.select_mut("iati-activity").pop().unwrap();
        let types = activity.select_mut("transaction/transaction-type");
        assert_eq!(types.len(), 2);
        for t in types {
            t.set_attr("code", "X");
        }
        let codes: Vec<_> = activity
            .select("transaction/transaction-type")
            .iter()
            .map(|e| e.attr("code").unwrap().to_string())
            .collect();
        assert_eq!(codes, ["X", "X"]);
    }

    #[test]
    fn set_attr_replaces_in_place() {
        let mut el = Element::new("x");
        el.set_attr("a", "1");
        el.set_attr("b", "2");
        el.set_attr("a", "3");
        assert_eq!(
            el.attributes,
            vec![("a".into(), "3".into()), ("b".into(), "2".into())]
        );
    }

    #[test]
    fn take_descendants_detaches_matches_in_order() {
        let mut root = parse_document(
            "<r><a id=\"1\"/><g><a id=\"2\"/><k/></g><a id=\"3\"><a id=\"inner\"/></a></r>",
        )
        .unwrap();
        let taken = root.take_descendants("a");
        let ids: Vec<_> = taken.iter().map(|e| e.attr("id").unwrap()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert_eq!(root.count_descendants("a"), 0);
        assert!(root.find_child("g").unwrap().find_child("k").is_some());
    }

    #[test]
    fn taken_elements_redeclare_wrapper_namespaces() {
        let mut root = parse_document(
            r#"<r xmlns:top="urn:top"><wrap xmlns:akvo="urn:akvo"><g xmlns:akvo="urn:akvo2"><a akvo:id="1" top:x="y"/></g></wrap><a xmlns:akvo="urn:own" akvo:id="2"/></r>"#,
        )
        .unwrap();
        let taken = root.take_descendants("a");
        // nearest declaration wins; the root's stays on the root
        assert_eq!(taken[0].attributes[0], ("xmlns:akvo".into(), "urn:akvo2".into()));
        assert_eq!(taken[0].attr("akvo:id"), Some("1"));
        assert_eq!(taken[0].attr("xmlns:top"), None);
        // own declaration untouched
        assert_eq!(taken[1].attr("xmlns:akvo"), Some("urn:own"));
        assert_eq!(taken[1].attributes.len(), 2);

        root.children.clear();
        for a in taken {
            root.push_element(a);
        }
        let reparsed = parse_document(&to_string_pretty(&root, false).unwrap()).unwrap();
        let ids: Vec<_> = reparsed
            .child_elements()
            .map(|a| a.attr("akvo:id").unwrap())
            .collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[test]
    fn whitespace_only_content_is_kept() {
        let root = parse_document("<title><narrative> </narrative>\n  <x>\n  <y/>\n  </x></title>").unwrap();
        let narrative = root.find_child("narrative").unwrap();
        assert_eq!(narrative.text().as_deref(), Some(" "));
        // layout around child elements is still dropped
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.find_child("x").unwrap().children.len(), 1);
    }

    #[test]
    fn leading_text_stops_at_first_child() {
        let root = parse_document("<narrative>a <x/> b</narrative>").unwrap();
        assert_eq!(root.leading_text().as_deref(), Some("a "));
        assert_eq!(root.text().as_deref(), Some("a  b"));
        let empty = parse_document("<narrative><x/>b</narrative>").unwrap();
        assert_eq!(empty.leading_text(), None);
    }

    #[test]
    fn pretty_output_keeps_text_inline() {
        let mut root = Element::new("iati-activities");
        root.set_attr("version", "1.05");
        let mut title = Element::new("title");
        title.set_attr("xml:lang", "en");
        title.push_text("Hello & bye");
        let mut activity = Element::new("iati-activity");
        activity.push_element(title);
        activity.push_element(Element::new("empty"));
        root.push_element(activity);

        let out = to_string_pretty(&root, false).unwrap();
        assert_eq!(
            out,
            "<iati-activities version=\"1.05\">\n  <iati-activity>\n    <title xml:lang=\"en\">Hello &amp; bye</title>\n    <empty/>\n  </iati-activity>\n</iati-activities>\n"
        );
    }

    #[test]
    fn declaration_is_optional() {
        let root = Element::new("r");
        let out = to_string_pretty(&root, true).unwrap();
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(out.trim_end().ends_with("<r/>"));
    }

    #[test]
    fn read_document_reports_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_document(&tmp.path().join("nope.xml")).unwrap_err();
        assert!(err.to_string().contains("nope.xml"));
    }
}
