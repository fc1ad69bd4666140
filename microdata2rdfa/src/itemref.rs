use itertools::Itertools;
use oxrdf::{NamedOrBlankNode, Subject, Term, Triple};

use crate::dom::{Document, Element, NodeId};
use crate::extract::{ElementError, MicrodataExtractor};
use crate::prefixes::PrefixTable;
use crate::subject_attr;

/// Appends the out-of-subtree triples of `item` to its working copy.
pub fn materialize<E: MicrodataExtractor + ?Sized>(
    extractor: &mut E,
    prefixes: &mut PrefixTable,
    original: &Document,
    working: &mut Document,
    item: NodeId,
    owner: &NamedOrBlankNode,
) -> Result<usize, ElementError> {
    let to_element_error = |source| ElementError {
        path: original.path(item),
        source,
    };

    let extracted = extractor
        .consume_item(original, item)
        .map_err(to_element_error)?;
    let placeholder = subject_attr(&extracted.subject);
    let foreign: Vec<Triple> = extracted
        .triples
        .filter_ok(|t| {
            // a nested item states its own itemref properties
            let nested = t.subject_item != item
                && original.is_inclusive_ancestor(item, t.subject_item);
            !nested && !original.is_inclusive_ancestor(item, t.source)
        })
        .map_ok(|t| t.triple)
        .collect::<Result<_, _>>()
        .map_err(to_element_error)?;

    let owner = subject_attr(owner);
    let rename = |node: String| if node == placeholder { owner.clone() } else { node };

    let children: Vec<Element> = foreign
        .iter()
        .map(|triple| triple_element(prefixes, triple, &rename))
        .collect();

    tracing::debug!(
        item = %original.path(item),
        added = children.len(),
        "materialized itemref properties"
    );

    let added = children.len();
    for child in children {
        working.append_element(item, child);
    }

    Ok(added)
}

fn triple_element(
    prefixes: &mut PrefixTable,
    triple: &Triple,
    rename: &impl Fn(String) -> String,
) -> Element {
    let about = match &triple.subject {
        Subject::NamedNode(n) => n.as_str().to_string(),
        Subject::BlankNode(b) => format!("_:{}", b.as_str()),
    };

    let mut span = Element::new("span").with_attr("about", rename(about));
    let predicate = prefixes.split(triple.predicate.as_str());
    predicate.declare_on(&mut span);

    let resource = match &triple.object {
        Term::NamedNode(n) => n.as_str().to_string(),
        Term::BlankNode(b) => format!("_:{}", b.as_str()),
        Term::Literal(literal) => {
            span.set_attr("property", predicate.curie());
            span.set_attr("content", literal.value());
            if let Some(lang) = literal.language() {
                span.set_attr("xml:lang", lang);
            } else if !literal.is_plain() {
                let datatype = prefixes.split(literal.datatype().as_str());
                datatype.declare_on(&mut span);
                span.set_attr("datatype", datatype.curie());
            }
            return span;
        }
    };

    span.set_attr("rel", predicate.curie());
    span.set_attr("resource", rename(resource));
    span
}
