use std::collections::VecDeque;
use std::str::FromStr;

use icu::locale::LanguageIdentifier;
use itertools::Itertools;
use oxiri::Iri;
use oxrdf::vocab::{rdf, xsd};
use oxrdf::{Graph, Literal, NamedNode, NamedNodeRef, NamedOrBlankNode, Term, Triple, TripleRef};

use crate::bnode::BlankNodeAllocator;
use crate::dom::{Document, NodeId};
use crate::properties::property_iri;

pub const EXTRACTOR_NODE_PREFIX: &str = "MicrodataNode";

#[derive(derive_more::Error, derive_more::Display, Clone, Debug, PartialEq, Eq)]
pub enum ExtractError {
    #[display("itemref names `{id}`, but no element has that id")]
    MissingReference { id: String },

    #[display("itemref cycle: {path} is reached again from its own properties")]
    CyclicReference { path: String },
}

#[derive(derive_more::Error, derive_more::Display, Clone, Debug, PartialEq, Eq)]
#[display("{path}: {source}")]
pub struct ElementError {
    pub path: String,
    pub source: ExtractError,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourcedTriple {
    pub triple: Triple,
    /// The element whose markup asserted the triple.
    pub source: NodeId,
    /// The item element of the triple's subject.
    pub subject_item: NodeId,
}

pub struct ExtractedItem<'a> {
    /// The subject the extractor chose for the item itself.
    pub subject: NamedOrBlankNode,
    /// Single pass; an `Err` ends the sequence.
    pub triples: Box<dyn Iterator<Item = Result<SourcedTriple, ExtractError>> + 'a>,
}

pub trait MicrodataExtractor {
    fn consume_item<'a>(
        &'a mut self,
        document: &'a Document,
        item: NodeId,
    ) -> Result<ExtractedItem<'a>, ExtractError>;
}

pub struct Extractor {
    base: Iri<String>,
    bnodes: BlankNodeAllocator,
}

impl Extractor {
    pub fn new(base: Iri<String>) -> Self {
        Self {
            base,
            bnodes: BlankNodeAllocator::new(EXTRACTOR_NODE_PREFIX),
        }
    }
}

impl MicrodataExtractor for Extractor {
    fn consume_item<'a>(
        &'a mut self,
        document: &'a Document,
        item: NodeId,
    ) -> Result<ExtractedItem<'a>, ExtractError> {
        let frame = open_item(document, &self.base, &mut self.bnodes, item)?;
        let subject = frame.subject.clone();
        let queue = type_triples(&frame, item).collect();

        Ok(ExtractedItem {
            subject,
            triples: Box::new(ItemTriples {
                doc: document,
                base: &self.base,
                bnodes: &mut self.bnodes,
                frames: vec![frame],
                queue,
            }),
        })
    }
}

struct Frame {
    item: NodeId,
    subject: NamedOrBlankNode,
    types: Vec<NamedNode>,
    /// First `itemtype` token, used for bare property names.
    vocabulary: Option<String>,
    properties: std::vec::IntoIter<NodeId>,
}

fn open_item(
    doc: &Document,
    base: &Iri<String>,
    bnodes: &mut BlankNodeAllocator,
    item: NodeId,
) -> Result<Frame, ExtractError> {
    let subject = match doc.attr(item, "itemid").and_then(|id| resolve_url(base, id)) {
        Some(iri) => iri.into(),
        None => bnodes.allocate().into(),
    };

    let itemtype = doc.attr(item, "itemtype").unwrap_or_default();
    let types = itemtype
        .split_ascii_whitespace()
        .filter_map(|t| NamedNode::new(t).ok())
        .collect();
    let vocabulary = itemtype.split_ascii_whitespace().next().map(str::to_string);

    let properties = crawl_properties(doc, item)?;
    tracing::trace!(
        item = %doc.path(item),
        %subject,
        properties = properties.len(),
        "opened item"
    );

    Ok(Frame {
        item,
        subject,
        types,
        vocabulary,
        properties: properties.into_iter(),
    })
}

fn type_triples(frame: &Frame, source: NodeId) -> impl Iterator<Item = SourcedTriple> + '_ {
    frame.types.iter().map(move |t| SourcedTriple {
        triple: TripleRef::new(&frame.subject, rdf::TYPE, t).into_owned(),
        source,
        subject_item: frame.item,
    })
}

/// The property elements of `root`, in tree order.
fn crawl_properties(doc: &Document, root: NodeId) -> Result<Vec<NodeId>, ExtractError> {
    let mut pending: Vec<NodeId> = doc.element_children(root).collect();
    for id in doc
        .attr(root, "itemref")
        .unwrap_or_default()
        .split_ascii_whitespace()
    {
        match doc.element_by_id(id) {
            Some(target) => pending.push(target),
            None => {
                return Err(ExtractError::MissingReference { id: id.to_string() });
            }
        }
    }

    let mut seen = vec![root];
    let mut results = Vec::new();
    while let Some(current) = pending.pop() {
        if current == root {
            return Err(ExtractError::CyclicReference {
                path: doc.path(root),
            });
        }

        if seen.contains(&current) {
            continue;
        }
        seen.push(current);

        if !doc.has_attr(current, "itemscope") {
            pending.extend(doc.element_children(current));
        }

        if doc
            .attr(current, "itemprop")
            .is_some_and(|p| !p.trim().is_empty())
        {
            results.push(current);
        }
    }

    // ids of a parsed document follow tree order
    results.sort();
    Ok(results)
}

fn resolve_url(base: &Iri<String>, value: &str) -> Option<NamedNode> {
    match base.resolve(value) {
        Ok(iri) => Some(NamedNode::new_unchecked(iri.into_inner())),
        Err(err) => {
            tracing::debug!(value, %err, "not a resolvable URL");
            None
        }
    }
}

fn temporal_datatype(value: &str) -> Option<NamedNodeRef<'static>> {
    if oxsdatatypes::Duration::from_str(value).is_ok() {
        Some(xsd::DURATION)
    } else if oxsdatatypes::DateTime::from_str(value).is_ok() {
        Some(xsd::DATE_TIME)
    } else if oxsdatatypes::Date::from_str(value).is_ok() {
        Some(xsd::DATE)
    } else if oxsdatatypes::Time::from_str(value).is_ok() {
        Some(xsd::TIME)
    } else if oxsdatatypes::GYearMonth::from_str(value).is_ok() {
        Some(xsd::G_YEAR_MONTH)
    } else if oxsdatatypes::GYear::from_str(value).is_ok() {
        Some(xsd::G_YEAR)
    } else {
        None
    }
}

/// The language in effect at `node`; `xml:lang` wins over `lang`.
fn language(doc: &Document, node: NodeId) -> Option<String> {
    let lang = std::iter::once(node)
        .chain(doc.ancestors(node))
        .find_map(|n| doc.attr(n, "xml:lang").or(doc.attr(n, "lang")))?;

    if lang.is_empty() {
        return None;
    }

    match LanguageIdentifier::from_str(lang) {
        Ok(id) => Some(id.to_string().to_ascii_lowercase()),
        Err(err) => {
            tracing::warn!(lang, %err, "ignoring invalid language identifier");
            None
        }
    }
}

struct ItemTriples<'a> {
    doc: &'a Document,
    base: &'a Iri<String>,
    bnodes: &'a mut BlankNodeAllocator,
    frames: Vec<Frame>,
    queue: VecDeque<SourcedTriple>,
}

impl ItemTriples<'_> {
    fn visit_property(
        &mut self,
        item: NodeId,
        subject: &NamedOrBlankNode,
        vocabulary: Option<&str>,
        property: NodeId,
    ) -> Result<(), ExtractError> {
        let mut nested = None;
        let value: Term = if self.doc.has_attr(property, "itemscope") {
            if self.frames.iter().any(|f| f.item == property) {
                return Err(ExtractError::CyclicReference {
                    path: self.doc.path(property),
                });
            }

            let frame = open_item(self.doc, self.base, self.bnodes, property)?;
            let value = frame.subject.clone().into();
            nested = Some(frame);
            value
        } else {
            self.property_value(property)
        };

        let tokens = self.doc.attr(property, "itemprop").unwrap_or_default();
        for token in tokens.split_ascii_whitespace() {
            let Some(predicate) =
                property_iri(token, vocabulary).and_then(|iri| NamedNode::new(iri).ok())
            else {
                continue;
            };

            self.queue.push_back(SourcedTriple {
                triple: TripleRef::new(subject, &predicate, &value).into_owned(),
                source: property,
                subject_item: item,
            });
        }

        if let Some(frame) = nested {
            self.queue.extend(type_triples(&frame, property));
            self.frames.push(frame);
        }

        Ok(())
    }

    fn property_value(&self, node: NodeId) -> Term {
        let doc = self.doc;
        let Some(el) = doc.element(node) else {
            return Literal::new_simple_literal("").into();
        };

        let url_attr = match el.name() {
            "audio" | "embed" | "iframe" | "img" | "source" | "track" | "video" => Some("src"),
            "a" | "area" | "link" => Some("href"),
            "object" => Some("data"),
            _ => None,
        };

        if let Some(attr) = url_attr {
            let value = el.attr(attr).unwrap_or_default();
            return match el.attr(attr).and_then(|v| resolve_url(self.base, v)) {
                Some(iri) => iri.into(),
                None => Literal::new_simple_literal(value).into(),
            };
        }

        let mut datatype = None;
        let value = match el.name() {
            "meta" => el.attr("content").unwrap_or_default().to_string(),
            "data" | "meter" => el.attr("value").unwrap_or_default().to_string(),
            "time" => {
                let value = el
                    .attr("datetime")
                    .map(str::to_string)
                    .unwrap_or_else(|| doc.text_content(node));
                datatype = temporal_datatype(&value);
                value
            }
            _ => doc.text_content(node),
        };

        match (datatype, language(doc, node)) {
            (Some(datatype), _) => Literal::new_typed_literal(value, datatype).into(),
            (None, Some(lang)) => Literal::new_language_tagged_literal_unchecked(value, lang).into(),
            (None, None) => Literal::new_simple_literal(value).into(),
        }
    }
}

impl Iterator for ItemTriples<'_> {
    type Item = Result<SourcedTriple, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(triple) = self.queue.pop_front() {
                return Some(Ok(triple));
            }

            let frame = self.frames.last_mut()?;
            let Some(property) = frame.properties.next() else {
                self.frames.pop();
                continue;
            };

            let item = frame.item;
            let subject = frame.subject.clone();
            let vocabulary = frame.vocabulary.clone();
            if let Err(err) = self.visit_property(item, &subject, vocabulary.as_deref(), property)
            {
                self.frames.clear();
                self.queue.clear();
                return Some(Err(err));
            }
        }
    }
}

pub struct GraphExtraction {
    pub graph: Graph,
    /// Items that could not be extracted; none of their triples are in `graph`.
    pub diagnostics: Vec<ElementError>,
}

/// Extracts every top-level item (`itemscope` without `itemprop`).
pub fn extract_graph(document: &Document, base: Iri<String>) -> GraphExtraction {
    let mut extractor = Extractor::new(base);
    let mut graph = Graph::new();
    let mut diagnostics = Vec::new();

    let items: Vec<NodeId> = document
        .elements()
        .filter(|(_, el)| el.has_attr("itemscope") && !el.has_attr("itemprop"))
        .map(|(id, _)| id)
        .collect();

    for item in items {
        let triples = extractor
            .consume_item(document, item)
            .and_then(|extracted| {
                extracted
                    .triples
                    .map_ok(|sourced| sourced.triple)
                    .collect::<Result<Vec<_>, _>>()
            });

        match triples {
            Ok(triples) => {
                for triple in &triples {
                    graph.insert(triple);
                }
            }
            Err(source) => {
                let error = ElementError {
                    path: document.path(item),
                    source,
                };
                tracing::warn!(%error, "skipping item");
                diagnostics.push(error);
            }
        }
    }

    GraphExtraction { graph, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Iri<String> {
        Iri::parse("http://example.org/doc".to_string()).unwrap()
    }

    fn item_triples(html: &str, item_id: &str) -> Result<Vec<(String, String)>, ExtractError> {
        let doc = Document::parse_html(html);
        let item = doc.element_by_id(item_id).unwrap();
        let mut extractor = Extractor::new(base());
        let extracted = extractor.consume_item(&doc, item)?;
        extracted
            .triples
            .map_ok(|t| {
                let source = doc
                    .attr(t.source, "id")
                    .unwrap_or_else(|| doc.element(t.source).unwrap().name())
                    .to_string();
                (t.triple.to_string(), source)
            })
            .collect()
    }

    #[test]
    fn emits_types_then_properties() {
        let triples = item_triples(
            r#"<div id="i" itemscope itemtype="http://schema.org/Person">
                 <span itemprop="http://xmlns.com/foaf/0.1/name">Ann</span>
                 <a itemprop="http://xmlns.com/foaf/0.1/homepage" href="/ann">home</a>
               </div>"#,
            "i",
        )
        .unwrap();

        assert_eq!(
            triples,
            vec![
                (
                    "_:MicrodataNode000 <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://schema.org/Person>".to_string(),
                    "i".to_string()
                ),
                (
                    "_:MicrodataNode000 <http://xmlns.com/foaf/0.1/name> \"Ann\"".to_string(),
                    "span".to_string()
                ),
                (
                    "_:MicrodataNode000 <http://xmlns.com/foaf/0.1/homepage> <http://example.org/ann>".to_string(),
                    "a".to_string()
                ),
            ]
        );
    }

    #[test]
    fn itemref_contributes_out_of_tree_properties() {
        let triples = item_triples(
            r#"<div id="i" itemscope itemid="urn:x" itemref="extra"></div>
               <p id="extra" itemprop="http://example.org/note">Hi</p>"#,
            "i",
        )
        .unwrap();

        assert_eq!(
            triples,
            vec![(
                "<urn:x> <http://example.org/note> \"Hi\"".to_string(),
                "extra".to_string()
            )]
        );
    }

    #[test]
    fn nested_items_follow_their_link() {
        let triples = item_triples(
            r#"<div id="i" itemscope>
                 <div id="n" itemprop="http://example.org/knows" itemscope itemtype="http://schema.org/Person">
                   <span id="s" itemprop="name">Bo</span>
                 </div>
               </div>"#,
            "i",
        )
        .unwrap();

        let rendered: Vec<_> = triples.iter().map(|(t, s)| format!("{t} @{s}")).collect();
        assert_eq!(
            rendered,
            vec![
                "_:MicrodataNode000 <http://example.org/knows> _:MicrodataNode001 @n",
                "_:MicrodataNode001 <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://schema.org/Person> @n",
                "_:MicrodataNode001 <http://www.w3.org/1999/xhtml/microdata#http%3A%2F%2Fschema.org%2FPerson%23:name> \"Bo\" @s",
            ]
        );
    }

    #[test]
    fn triples_know_their_subject_item() {
        let doc = Document::parse_html(
            r#"<div id="i" itemscope itemref="a"></div>
               <div id="a" itemprop="http://example.org/k" itemscope itemtype="http://schema.org/Thing" itemref="b"></div>
               <p id="b" itemprop="http://example.org/n">x</p>"#,
        );
        let i = doc.element_by_id("i").unwrap();
        let a = doc.element_by_id("a").unwrap();
        let b = doc.element_by_id("b").unwrap();

        let mut extractor = Extractor::new(base());
        let sourced: Vec<(NodeId, NodeId)> = extractor
            .consume_item(&doc, i)
            .unwrap()
            .triples
            .map_ok(|t| (t.source, t.subject_item))
            .collect::<Result<_, _>>()
            .unwrap();

        // k, then the nested type, then n
        assert_eq!(sourced, vec![(a, i), (a, a), (b, a)]);
    }

    #[test]
    fn missing_reference_is_an_error() {
        let err = item_triples(r#"<div id="i" itemscope itemref="nope"></div>"#, "i").unwrap_err();
        assert_eq!(
            err,
            ExtractError::MissingReference {
                id: "nope".to_string()
            }
        );
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let err = item_triples(
            r#"<div id="outer"><div id="i" itemscope itemref="outer"></div></div>"#,
            "i",
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::CyclicReference { .. }));
    }

    #[test]
    fn values_depend_on_the_element() {
        let triples = item_triples(
            r#"<div id="i" itemscope lang="en-GB">
                 <meta itemprop="http://example.org/m" content="meta value">
                 <time itemprop="http://example.org/t" datetime="2020-01-02">2nd Jan</time>
                 <data itemprop="http://example.org/d" value="42">forty-two</data>
                 <img itemprop="http://example.org/i" src="a.jpg">
                 <span itemprop="http://example.org/s" lang="">plain</span>
               </div>"#,
            "i",
        )
        .unwrap();

        let objects: Vec<_> = triples
            .iter()
            .map(|(t, _)| t.split_once("> ").unwrap().1.to_string())
            .collect();
        assert_eq!(
            objects,
            vec![
                "\"meta value\"@en-gb",
                "\"2020-01-02\"^^<http://www.w3.org/2001/XMLSchema#date>",
                "\"42\"@en-gb",
                "<http://example.org/a.jpg>",
                "\"plain\"",
            ]
        );
    }

    #[test]
    fn extractor_labels_continue_across_items() {
        let doc = Document::parse_html(r#"<div id="a" itemscope></div><div id="b" itemscope></div>"#);
        let mut extractor = Extractor::new(base());
        let a = extractor
            .consume_item(&doc, doc.element_by_id("a").unwrap())
            .unwrap()
            .subject;
        let b = extractor
            .consume_item(&doc, doc.element_by_id("b").unwrap())
            .unwrap()
            .subject;
        assert_ne!(a, b);
    }
}
