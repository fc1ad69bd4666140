use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use microdata2rdfa::{Conversion, Document, NodeId, PrefixTable, md_vocab};
use oxiri::Iri;
use oxrdf::{Graph, SubjectRef, TermRef, TripleRef};

#[allow(unused)]
pub fn base() -> Iri<String> {
    Iri::parse("http://example.org/".to_string()).unwrap()
}

#[allow(unused)]
pub fn convert(html: &str) -> Conversion {
    microdata2rdfa::convert(html, base()).unwrap()
}

/// Attributes of `node`, ordered by name.
#[allow(unused)]
pub fn attrs(doc: &Document, node: NodeId) -> BTreeMap<String, String> {
    doc.element(node)
        .unwrap()
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Attributes of the element with the given `id`, ordered by name.
#[allow(unused)]
pub fn attrs_of(doc: &Document, id: &str) -> BTreeMap<String, String> {
    attrs(doc, doc.element_by_id(id).unwrap())
}

#[allow(unused)]
pub fn map<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Checks the microdata graph of `html` against `ttl`.
///
/// Both graphs are canonicalized and written as Turtle with the prefixes of
/// the namespaces they use, so a mismatch shows up as a readable diff.
#[allow(unused)]
pub fn assert_graph(html: &str, ttl: &str) {
    let document = Document::parse_html(html);
    let extraction = microdata2rdfa::extract_graph(&document, base());
    assert!(
        extraction.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        extraction.diagnostics
    );

    let mut expected = Graph::new();
    for triple in oxttl::TurtleParser::new()
        .with_base_iri(base().as_str())
        .unwrap()
        .for_slice(ttl.as_bytes())
    {
        expected.insert(&triple.unwrap());
    }

    // minted names are not valid Turtle local names
    let table = PrefixTable::new();
    let known: Vec<(&str, &str)> = table
        .iter()
        .filter(|(namespace, _)| *namespace != md_vocab::NS)
        .collect();
    let used: BTreeSet<(&str, &str)> = extraction
        .graph
        .iter()
        .chain(expected.iter())
        .flat_map(iris)
        .filter_map(|iri| known.iter().find(|(ns, _)| iri.starts_with(*ns)).copied())
        .collect();

    pretty_assertions::assert_eq!(
        canonical_turtle(&extraction.graph, &used),
        canonical_turtle(&expected, &used)
    );
}

#[allow(unused)]
fn iris(triple: TripleRef<'_>) -> Vec<&str> {
    let mut iris = vec![triple.predicate.as_str()];
    if let SubjectRef::NamedNode(n) = triple.subject {
        iris.push(n.as_str());
    }
    match triple.object {
        TermRef::NamedNode(n) => iris.push(n.as_str()),
        TermRef::Literal(l) if !l.is_plain() => iris.push(l.datatype().as_str()),
        _ => {}
    }
    iris
}

#[allow(unused)]
fn canonical_turtle(graph: &Graph, prefixes: &BTreeSet<(&str, &str)>) -> String {
    let labels = rdf_canon::issue_graph_with::<sha2::Sha256>(graph, &Default::default()).unwrap();
    let graph = rdf_canon::relabel_graph(graph, &labels).unwrap();

    let serializer = prefixes.iter().fold(
        oxttl::TurtleSerializer::new()
            .with_base_iri(base().as_str())
            .unwrap(),
        |serializer, (namespace, prefix)| serializer.with_prefix(*prefix, *namespace).unwrap(),
    );

    let mut writer = serializer.for_writer(Vec::new());
    for triple in graph.iter().sorted_by_cached_key(|t| t.to_string()) {
        writer.serialize_triple(triple).unwrap();
    }

    String::from_utf8(writer.finish().unwrap()).unwrap()
}
