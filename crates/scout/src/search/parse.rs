use lazy_static::lazy_static;
use regex::Regex;
use roxmltree::{Document, Node};
use tracing::{debug, warn};

use super::SearchRecord;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"<[^>]+>").unwrap();
}

/// Strip leftover markup tags and surrounding whitespace from a text field.
fn clean_text(text: &str) -> String {
    if !text.contains('<') {
        return text.trim().to_string();
    }
    TAG_RE.replace_all(text, "").trim().to_string()
}

/// All text beneath a node, nested markup flattened away.
fn full_text(node: Node) -> String {
    let mut text = String::new();
    for descendant in node.descendants().filter(Node::is_text) {
        if let Some(part) = descendant.text() {
            text.push_str(part);
        }
    }
    text.trim().to_string()
}

/// Direct text of the first child with the given tag name.
fn child_text(node: Node, name: &str) -> String {
    node.children()
        .find(|child| child.has_tag_name(name))
        .and_then(|child| child.text())
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn find_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| child.has_tag_name(name))
}

/// Extract one record from a result document element.
///
/// Content is chosen by priority: the extended-text property, then the
/// concatenated passages, then the headline.
fn parse_document(doc_node: Node) -> SearchRecord {
    let url = child_text(doc_node, "url");
    let domain = child_text(doc_node, "domain");
    let title = clean_text(&find_child(doc_node, "title").map(full_text).unwrap_or_default());
    let headline = clean_text(
        &find_child(doc_node, "headline")
            .map(full_text)
            .unwrap_or_default(),
    );
    let modtime = child_text(doc_node, "modtime");

    let properties = find_child(doc_node, "properties");
    let lang = properties
        .map(|properties| child_text(properties, "lang"))
        .unwrap_or_default();

    let mut content = properties
        .and_then(|properties| find_child(properties, "extended-text"))
        .map(full_text)
        .unwrap_or_default();

    if content.is_empty() {
        let passages: Vec<String> = doc_node
            .descendants()
            .filter(|node| node.has_tag_name("passage"))
            .map(full_text)
            .filter(|passage| !passage.is_empty())
            .collect();
        content = passages.join(" ");
    }

    if content.is_empty() {
        content = headline.clone();
    }

    SearchRecord {
        url,
        domain,
        title,
        headline,
        modtime,
        lang,
        content: clean_text(&content),
    }
}

/// Parse one decoded search payload into records.
///
/// Malformed input yields an empty vec, never an error; individual
/// documents are isolated, so one bad document does not drop the rest.
pub fn parse_results(xml: &str) -> Vec<SearchRecord> {
    debug!("parsing search payload");
    let document = match Document::parse(xml) {
        Ok(document) => document,
        Err(e) => {
            warn!("unparseable search payload: {e}");
            return Vec::new();
        }
    };

    let records: Vec<SearchRecord> = document
        .descendants()
        .filter(|node| node.has_tag_name("doc"))
        .map(parse_document)
        .collect();

    debug!(count = records.len(), "parsed search documents");
    records
}
