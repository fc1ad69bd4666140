use std::rc::Rc;

use oxrdf::NamedOrBlankNode;

use crate::bnode::BlankNodeAllocator;
use crate::dom::{Document, Element, NodeId};
use crate::extract::{ElementError, MicrodataExtractor};
use crate::itemref::materialize;
use crate::prefixes::PrefixTable;
use crate::properties::resolve_properties;
use crate::subject_attr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ElementKind {
    Media,
    Link,
    Object,
    Other,
}

impl ElementKind {
    fn of(name: &str) -> Self {
        match name {
            "audio" | "embed" | "iframe" | "img" | "source" | "video" => ElementKind::Media,
            "a" | "area" | "link" => ElementKind::Link,
            "object" => ElementKind::Object,
            _ => ElementKind::Other,
        }
    }

    fn url_attr(self) -> Option<&'static str> {
        match self {
            ElementKind::Media => Some("src"),
            ElementKind::Link => Some("href"),
            ElementKind::Object => Some("data"),
            ElementKind::Other => None,
        }
    }
}

const MICRODATA_ATTRS: [&str; 4] = ["itemprop", "itemtype", "itemid", "itemref"];

pub(crate) struct Rewriter<'c, E: ?Sized> {
    pub original: &'c Document,
    pub working: &'c mut Document,
    pub prefixes: &'c mut PrefixTable,
    pub bnodes: &'c mut BlankNodeAllocator,
    pub extractor: &'c mut E,
    pub diagnostics: &'c mut Vec<ElementError>,
}

fn element_mut(doc: &mut Document, node: NodeId) -> &mut Element {
    doc.element_mut(node).expect("the walk only visits elements")
}

type Subject = Option<Rc<NamedOrBlankNode>>;
type ChainingSubject = Option<Rc<str>>;

impl<E: MicrodataExtractor + ?Sized> Rewriter<'_, E> {
    pub fn run(&mut self) {
        let root = self.working.root();
        let mut stack: Vec<(NodeId, Subject, ChainingSubject)> = self
            .working
            .element_children(root)
            .map(|child| (child, None, None))
            .collect();
        stack.reverse();

        while let Some((node, subject, rdfa_subject)) = stack.pop() {
            let (subject, rdfa_subject) = self.rewrite_element(node, subject, rdfa_subject);

            // includes any children appended while rewriting `node`
            let children: Vec<NodeId> = self.working.element_children(node).collect();
            for child in children.into_iter().rev() {
                stack.push((child, subject.clone(), rdfa_subject.clone()));
            }
        }
    }

    fn element(&mut self, node: NodeId) -> &mut Element {
        element_mut(self.working, node)
    }

    fn rewrite_element(
        &mut self,
        node: NodeId,
        subject: Subject,
        rdfa_subject: ChainingSubject,
    ) -> (Subject, ChainingSubject) {
        let el = self.element(node).clone();
        tracing::trace!(
            path = %self.working.path(node),
            subject = ?subject.as_deref().map(subject_attr),
            rdfa_subject = ?rdfa_subject.as_deref(),
            "rewriting element"
        );

        let new_subject: Subject = el.has_attr("itemscope").then(|| {
            Rc::new(match el.attr("itemid") {
                // carried verbatim, exactly as written
                Some(itemid) => oxrdf::NamedNode::new_unchecked(itemid).into(),
                None => self.bnodes.allocate().into(),
            })
        });

        if subject.is_none() && new_subject.is_none() {
            // no item to belong to
            let element = self.element(node);
            for attr in MICRODATA_ATTRS {
                element.remove_attr(attr);
            }
        }

        if let Some(owner) = &new_subject {
            if el.has_attr("itemref") {
                if let Err(error) = materialize(
                    &mut *self.extractor,
                    self.prefixes,
                    self.original,
                    self.working,
                    node,
                    owner,
                ) {
                    tracing::warn!(%error, "itemref properties dropped");
                    self.diagnostics.push(error);
                }
                self.element(node).remove_attr("itemref");
            }
        }

        self.element(node).remove_attr("itemscope");

        let itemprop = self.element(node).attr("itemprop").map(str::to_string);
        let chained: ChainingSubject = if itemprop.is_none() {
            el.attr("href").or(el.attr("src")).map(Rc::from)
        } else {
            None
        };

        match (&new_subject, itemprop) {
            (Some(new_subject), None) => self.item_root(node, new_subject),
            (Some(new_subject), Some(itemprop)) => {
                self.nested_item(node, new_subject, &itemprop)
            }
            (None, Some(itemprop)) => self.property(node, subject.as_deref(), &itemprop),
            (None, None) => {}
        }

        // unless `about` pins it, RDFa takes the subject from the nearest
        // href/src or about above, which need not be the item
        if let Some(subject) = &subject {
            let subject = subject_attr(subject);
            let element = self.element(node);
            if rdfa_subject.as_deref() != Some(subject.as_str())
                && (element.has_attr("rel") || element.has_attr("property"))
                && !element.has_attr("about")
            {
                tracing::trace!(%subject, "anchoring subject against RDFa chaining");
                element.set_attr("about", subject);
            }
        }

        (new_subject.or(subject), chained.or(rdfa_subject))
    }

    /// `itemscope` without `itemprop`: the element is the subject.
    fn item_root(&mut self, node: NodeId, new_subject: &NamedOrBlankNode) {
        let element = element_mut(self.working, node);
        element.set_attr("about", subject_attr(new_subject));
        element.remove_attr("itemid");

        if let Some(types) = element.remove_attr("itemtype") {
            let typeof_ = types
                .split_ascii_whitespace()
                .map(|t| {
                    let split = self.prefixes.split(t);
                    split.declare_on(element);
                    split.curie()
                })
                .collect::<Vec<_>>()
                .join(" ");

            if !typeof_.is_empty() {
                element.set_attr("typeof", typeof_);
            }
        }
    }

    /// `itemscope` with `itemprop`: the element is the object of its parent item.
    fn nested_item(&mut self, node: NodeId, new_subject: &NamedOrBlankNode, itemprop: &str) {
        let resource = subject_attr(new_subject);
        let element = element_mut(self.working, node);
        element.set_attr("resource", resource.as_str());
        element.remove_attr("itemid");
        if let Some(names) =
            resolve_properties(self.prefixes, self.original, node, itemprop, element)
        {
            element.set_attr("rel", names);
        }
        element.remove_attr("itemprop");

        // typeof here would retype the element's subject, not its object,
        // so the type is stated by a child about the object instead
        let Some(types) = element.remove_attr("itemtype") else {
            return;
        };

        let rdf_type = self.prefixes.split(oxrdf::vocab::rdf::TYPE.as_str());
        for t in types.split_ascii_whitespace() {
            let item_type = self.prefixes.split(t);
            let mut span = Element::new("span")
                .with_attr("about", resource.as_str())
                .with_attr("rel", rdf_type.curie())
                .with_attr("resource", item_type.safe_curie());
            rdf_type.declare_on(&mut span);
            item_type.declare_on(&mut span);
            self.working.append_element(node, span);
        }
    }

    /// `itemprop` on a plain element: a property of the inherited item.
    fn property(&mut self, node: NodeId, subject: Option<&NamedOrBlankNode>, itemprop: &str) {
        let has_element_children = self.working.has_element_children(node);
        let element = element_mut(self.working, node);
        let names = resolve_properties(self.prefixes, self.original, node, itemprop, element);
        element.remove_attr("itemprop");

        let Some(names) = names else {
            return;
        };

        let kind = ElementKind::of(element.name());
        let url = kind
            .url_attr()
            .and_then(|attr| element.attr(attr))
            .map(str::to_string);

        match (kind, url) {
            (ElementKind::Media, Some(src)) => {
                element.set_attr("rel", names);
                if let Some(subject) = subject {
                    element.set_attr("about", subject_attr(subject));
                }
                element.set_attr("resource", src);
            }
            (ElementKind::Media, None) => {
                element.set_attr("property", names);
                if let Some(subject) = subject {
                    element.set_attr("about", subject_attr(subject));
                }
                element.set_attr("content", "");
            }
            (ElementKind::Link, Some(_)) => {
                element.set_attr("rel", names);
            }
            (ElementKind::Object, Some(data)) => {
                element.set_attr("rel", names);
                element.set_attr("resource", data);
            }
            (ElementKind::Link | ElementKind::Object, None) => {
                element.set_attr("property", names);
                element.set_attr("content", "");
            }
            (ElementKind::Other, _) => {
                element.set_attr("property", names);
                if has_element_children {
                    // take the markup, not just the text
                    element.set_attr("datatype", "");
                }

                // values that are not the element's text
                let value = match element.name() {
                    "time" => element.attr("datetime"),
                    "data" | "meter" => element.attr("value"),
                    _ => None,
                };
                if let Some(value) = value.map(str::to_string) {
                    if !element.has_attr("content") {
                        element.set_attr("content", value);
                    }
                }
            }
        }
    }
}
