use indexmap::IndexMap;
use sha1::{Digest, Sha1};

use crate::dom::Element;

const GENERATED_PREFIX_TAG: &str = "ns-";

/// Well-known vocabularies, as `(prefix, namespace)`.
pub fn well_known_prefixes() -> &'static [(&'static str, &'static str)] {
    &[
        ("dcterms", "http://purl.org/dc/terms/"),
        ("foaf", "http://xmlns.com/foaf/0.1/"),
        ("md", crate::md_vocab::NS),
        ("owl", "http://www.w3.org/2002/07/owl#"),
        ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
        ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
        ("ex", "http://example.org/"),
        ("rss", "http://purl.org/rss/1.0/"),
        ("sioc", "http://rdfs.org/sioc/ns#"),
        ("skos", "http://www.w3.org/2004/02/skos/core#"),
        ("xhv", "http://www.w3.org/1999/xhtml/vocab#"),
        ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ]
}

/// An append-only map from namespace to prefix.
#[derive(Clone, Debug)]
pub struct PrefixTable {
    by_namespace: IndexMap<String, String>,
}

impl Default for PrefixTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitIri {
    pub namespace: String,
    pub prefix: String,
    pub local: String,
}

impl SplitIri {
    pub fn curie(&self) -> String {
        format!("{}:{}", self.prefix, self.local)
    }

    /// `[prefix:local]`, usable where a plain IRI would also be accepted.
    pub fn safe_curie(&self) -> String {
        format!("[{}]", self.curie())
    }

    pub fn declare_on(&self, element: &mut Element) {
        element.set_attr(format!("xmlns:{}", self.prefix), self.namespace.as_str());
    }
}

/// Splits at the last `/` or `#`; the separator stays with the namespace.
pub fn split_namespace(iri: &str) -> (&str, &str) {
    match iri.rfind(['/', '#']) {
        Some(at) => iri.split_at(at + 1),
        None => (iri, ""),
    }
}

fn generated_prefix(namespace: &str) -> String {
    let digest = format!("{:x}", Sha1::digest(namespace.as_bytes()));
    format!("{GENERATED_PREFIX_TAG}{}", &digest[..8])
}

impl PrefixTable {
    pub fn new() -> Self {
        let by_namespace = well_known_prefixes()
            .iter()
            .map(|(prefix, ns)| (ns.to_string(), prefix.to_string()))
            .collect();
        Self { by_namespace }
    }

    pub fn get(&self, namespace: &str) -> Option<&str> {
        self.by_namespace.get(namespace).map(String::as_str)
    }

    /// Looks up the prefix for `namespace`, allocating one if needed.
    pub fn prefix_for(&mut self, namespace: &str) -> &str {
        if !self.by_namespace.contains_key(namespace) {
            let mut prefix = generated_prefix(namespace);
            // a truncated digest can collide; a prefix is never shared
            let mut n = 1;
            while self.by_namespace.values().any(|p| *p == prefix) {
                prefix = format!("{}-{n}", generated_prefix(namespace));
                n += 1;
            }

            tracing::debug!(namespace, prefix = %prefix, "allocated namespace prefix");
            self.by_namespace.insert(namespace.to_string(), prefix);
        }

        &self.by_namespace[namespace]
    }

    pub fn split(&mut self, iri: &str) -> SplitIri {
        let (namespace, local) = split_namespace(iri);
        let prefix = self.prefix_for(namespace).to_string();
        SplitIri {
            namespace: namespace.to_string(),
            prefix,
            local: local.to_string(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_namespace
            .iter()
            .map(|(ns, prefix)| (ns.as_str(), prefix.as_str()))
    }
}

#[cfg(test)]
impl PrefixTable {
    /// Expands a `prefix:local` name written by this table.
    pub(crate) fn expand(&self, name: &str) -> Option<String> {
        let mut mapping = curie::PrefixMapping::default();
        for (namespace, prefix) in self.iter() {
            mapping.add_prefix(prefix, namespace).unwrap();
        }

        let (prefix, reference) = name.split_once(':')?;
        mapping
            .expand_curie(&curie::Curie::new(Some(prefix), reference))
            .ok()
    }
}
