use itertools::Itertools;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::dom::{Document, Element, NodeId};
use crate::md_vocab;
use crate::prefixes::PrefixTable;

/// Everything except RFC 3986 unreserved characters, so the escaped parts
/// never contain a `/` or `#` that would move the namespace split.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn is_absolute(token: &str) -> bool {
    token.contains(':')
}

pub fn vocabulary_iri(item_type: &str, name: &str) -> String {
    let mut anchored = item_type.to_string();
    if !anchored.contains('#') {
        anchored.push('#');
    }

    format!(
        "{}{}:{}",
        md_vocab::NS,
        utf8_percent_encode(&anchored, COMPONENT),
        utf8_percent_encode(name, COMPONENT)
    )
}

/// Resolves a single token. A bare token without a type in scope has no IRI.
pub fn property_iri(token: &str, item_type: Option<&str>) -> Option<String> {
    if is_absolute(token) {
        Some(token.to_string())
    } else {
        item_type.map(|t| vocabulary_iri(t, token))
    }
}

pub fn type_context(doc: &Document, node: NodeId) -> Option<&str> {
    doc.ancestors(node).find_map(|ancestor| {
        doc.attr(ancestor, "itemtype")
            .and_then(|t| t.split_ascii_whitespace().next())
    })
}

/// Resolves a whitespace-separated `itemprop` value.
pub fn resolve_properties(
    prefixes: &mut PrefixTable,
    original: &Document,
    node: NodeId,
    tokens: &str,
    target: &mut Element,
) -> Option<String> {
    let context = type_context(original, node);
    let names = tokens
        .split_ascii_whitespace()
        .filter_map(|token| {
            let Some(iri) = property_iri(token, context) else {
                tracing::debug!(token, "no item type in scope, dropping property");
                return None;
            };

            let split = prefixes.split(&iri);
            split.declare_on(target);
            Some(split.curie())
        })
        .join(" ");

    (!names.is_empty()).then_some(names)
}
