use oxiri::Iri;
use oxrdf::NamedOrBlankNode;

pub mod bnode;
pub mod dom;
pub mod extract;
mod itemref;
pub mod prefixes;
pub mod properties;
mod rewrite;
mod xhtml;

pub use bnode::BlankNodeAllocator;
pub use dom::{Document, Element, NodeData, NodeId};
pub use extract::{
    ElementError, ExtractError, ExtractedItem, Extractor, GraphExtraction, MicrodataExtractor,
    SourcedTriple, extract_graph,
};
pub use prefixes::{PrefixTable, SplitIri};
pub use xhtml::XHTML_RDFA_DOCTYPE;

use rewrite::Rewriter;

pub mod md_vocab {
    /// Namespace of the IRIs minted for bare property names.
    pub const NS: &str = "http://www.w3.org/1999/xhtml/microdata#";
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub enum Error {
    #[display("IRI parse error: `{iri}`")]
    IriParseError {
        source: oxiri::IriParseError,
        iri: String,
    },
}

pub(crate) fn subject_attr(node: &NamedOrBlankNode) -> String {
    match node {
        NamedOrBlankNode::NamedNode(n) => n.as_str().to_string(),
        NamedOrBlankNode::BlankNode(b) => format!("_:{}", b.as_str()),
    }
}

/// The state of one conversion: prefixes, blank node labels and the
/// extractor used for `itemref`.
pub struct Converter<E = Extractor> {
    prefixes: PrefixTable,
    bnodes: BlankNodeAllocator,
    extractor: E,
}

impl Converter {
    pub fn new(base: Iri<String>) -> Self {
        Self::with_extractor(Extractor::new(base))
    }
}

impl<E: MicrodataExtractor> Converter<E> {
    pub fn with_extractor(extractor: E) -> Self {
        Self {
            prefixes: PrefixTable::new(),
            bnodes: BlankNodeAllocator::default(),
            extractor,
        }
    }

    /// Rewrites a copy of `original`; `original` itself is what the
    /// extractor reads.
    pub fn convert(mut self, original: &Document) -> Conversion {
        let mut document = original.clone();
        let mut diagnostics = Vec::new();

        Rewriter {
            original,
            working: &mut document,
            prefixes: &mut self.prefixes,
            bnodes: &mut self.bnodes,
            extractor: &mut self.extractor,
            diagnostics: &mut diagnostics,
        }
        .run();

        tracing::debug!(
            namespaces = self.prefixes.iter().count(),
            diagnostics = diagnostics.len(),
            "conversion finished"
        );

        Conversion {
            document,
            prefixes: self.prefixes,
            diagnostics,
        }
    }
}

#[derive(Debug)]
pub struct Conversion {
    pub document: Document,
    pub prefixes: PrefixTable,
    /// Elements whose `itemref` properties could not be materialized.
    pub diagnostics: Vec<ElementError>,
}

impl Conversion {
    pub fn write_xhtml<W: std::io::Write>(&self, out: W) -> std::io::Result<W> {
        self.document.write_xhtml(out)
    }

    pub fn to_xhtml(&self) -> std::io::Result<String> {
        self.document.to_xhtml()
    }
}

/// `base`, or the `html>head>base[href]` of `document` resolved against it.
pub fn document_base(document: &Document, base: Iri<String>) -> Result<Iri<String>, Error> {
    let href = document.elements().find_map(|(id, el)| {
        let parents: Vec<&str> = document
            .ancestors(id)
            .filter_map(|a| document.element(a))
            .map(Element::name)
            .collect();

        (el.name() == "base" && parents == ["head", "html"])
            .then(|| el.attr("href"))
            .flatten()
    });

    let Some(href) = href else {
        return Ok(base);
    };

    let resolved = base
        .resolve(href)
        .map_err(|source| Error::IriParseError {
            source,
            iri: href.to_string(),
        })?;

    tracing::debug!(base = %resolved, "<base> found");
    Ok(resolved)
}

/// Parses `html` and converts it with the built-in extractor.
pub fn convert(html: &str, base: Iri<String>) -> Result<Conversion, Error> {
    let document = Document::parse_html(html);
    let base = document_base(&document, base)?;
    Ok(Converter::new(base).convert(&document))
}
