use indexmap::IndexMap;
use itertools::Itertools;
use scraper::Html;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Clone, Debug)]
pub enum NodeData {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    name: String,
    attrs: IndexMap<String, String>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: IndexMap::new(),
        }
    }

    fn from_scraper(el: &scraper::node::Element) -> Self {
        let attrs = el
            .attrs
            .iter()
            .map(|(qn, value)| {
                // keep `xml:lang`, `xmlns:foo` etc. intact
                let name = match qn.prefix.as_deref() {
                    Some(prefix) => format!("{prefix}:{}", qn.local),
                    None => qn.local.to_string(),
                };
                (name, value.to_string())
            })
            .collect();

        Self {
            name: el.name().to_string(),
            attrs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(name.into(), value.into());
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        self.attrs.shift_remove(name)
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }
}

#[derive(Clone, Debug)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn parse_html(input: &str) -> Self {
        let html = Html::parse_document(input);
        for err in html.errors.iter() {
            tracing::trace!(%err, "HTML parse error");
        }

        let mut doc = Document::new();
        let mut stack = Vec::new();
        for child in html.tree.root().children().rev() {
            stack.push((child, doc.root()));
        }

        // pre-order, so that ids follow document order
        while let Some((node, parent)) = stack.pop() {
            let data = match node.value() {
                scraper::Node::Element(el) => NodeData::Element(Element::from_scraper(el)),
                scraper::Node::Text(text) => NodeData::Text(text.text.to_string()),
                scraper::Node::Comment(comment) => NodeData::Comment(comment.comment.to_string()),
                scraper::Node::Document
                | scraper::Node::Fragment
                | scraper::Node::Doctype(_)
                | scraper::Node::ProcessingInstruction(_) => continue,
            };

            let id = doc.push(parent, data);
            for child in node.children().rev() {
                stack.push((child, id));
            }
        }

        doc
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn push(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn append_element(&mut self, parent: NodeId, element: Element) -> NodeId {
        self.push(parent, NodeData::Element(element))
    }

    #[cfg(test)]
    pub(crate) fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        self.push(parent, NodeData::Text(text.into()))
    }

    #[cfg(test)]
    pub(crate) fn append_comment(&mut self, parent: NodeId, comment: impl Into<String>) -> NodeId {
        self.push(parent, NodeData::Comment(comment.into()))
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|el| el.attr(name))
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.element(id).is_some_and(|el| el.has_attr(name))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|&child| self.element(child).is_some())
    }

    pub fn has_element_children(&self, id: NodeId) -> bool {
        self.element_children(id).next().is_some()
    }

    /// Strict ancestors, nearest first. The document root is included.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), |&node| self.parent(node))
    }

    /// Is `node` equal to `ancestor` or somewhere beneath it?
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(self.children(next).iter().rev().copied());
            Some(next)
        })
    }

    pub fn elements(&self) -> impl Iterator<Item = (NodeId, &Element)> + '_ {
        self.descendants(self.root())
            .filter_map(|id| self.element(id).map(|el| (id, el)))
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.elements()
            .find(|(_, el)| el.attr("id") == Some(id))
            .map(|(node, _)| node)
    }

    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .filter_map(|node| match self.data(node) {
                NodeData::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// A structural path such as `/html[1]/body[1]/div[2]`.
    pub fn path(&self, id: NodeId) -> String {
        let mut steps = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            let siblings = self.children(parent);
            let step = match self.data(current) {
                NodeData::Element(el) => {
                    let position = siblings
                        .iter()
                        .take_while(|&&sib| sib != current)
                        .filter(|&&sib| self.element(sib).is_some_and(|s| s.name() == el.name()))
                        .count();
                    format!("{}[{}]", el.name(), position + 1)
                }
                NodeData::Text(_) | NodeData::Comment(_) | NodeData::Document => {
                    let kind = |node: NodeId| std::mem::discriminant(self.data(node));
                    let position = siblings
                        .iter()
                        .take_while(|&&sib| sib != current)
                        .filter(|&&sib| kind(sib) == kind(current))
                        .count();
                    let name = match self.data(current) {
                        NodeData::Comment(_) => "comment()",
                        _ => "text()",
                    };
                    format!("{name}[{}]", position + 1)
                }
            };
            steps.push(step);
            current = parent;
        }

        if steps.is_empty() {
            return "/".to_string();
        }

        format!("/{}", steps.iter().rev().join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_document_order() {
        let doc = Document::parse_html(
            r#"<div id="a"><span id="b">x</span></div><p id="c" xml:lang="en">y</p>"#,
        );

        let a = doc.element_by_id("a").unwrap();
        let b = doc.element_by_id("b").unwrap();
        let c = doc.element_by_id("c").unwrap();
        assert!(a < b && b < c);
        assert!(doc.is_inclusive_ancestor(a, b));
        assert!(!doc.is_inclusive_ancestor(a, c));
        assert_eq!(doc.attr(c, "xml:lang"), Some("en"));
        assert_eq!(doc.text_content(a), "x");
    }

    #[test]
    fn paths_count_same_named_siblings() {
        let doc = Document::parse_html(r#"<div></div><p></p><div id="x"><i id="y"></i></div>"#);

        let x = doc.element_by_id("x").unwrap();
        let y = doc.element_by_id("y").unwrap();
        assert_eq!(doc.path(x), "/html[1]/body[1]/div[2]");
        assert_eq!(doc.path(y), "/html[1]/body[1]/div[2]/i[1]");
        assert_eq!(doc.path(doc.root()), "/");
    }

    #[test]
    fn paths_are_stable_across_parses() {
        let input = r#"<ul><li>a</li><li id="t">b</li></ul>"#;
        let one = Document::parse_html(input);
        let two = Document::parse_html(input);

        let t1 = one.element_by_id("t").unwrap();
        let t2 = two.element_by_id("t").unwrap();
        assert_eq!(one.path(t1), two.path(t2));
        assert_eq!(t1, t2);
    }

    #[test]
    fn attributes_keep_position_when_overwritten() {
        let mut el = Element::new("a")
            .with_attr("href", "x")
            .with_attr("rel", "y");
        el.set_attr("href", "z");
        el.remove_attr("missing");

        let attrs: Vec<_> = el.attrs().collect();
        assert_eq!(attrs, vec![("href", "z"), ("rel", "y")]);
    }

    #[test]
    fn clone_shares_node_ids() {
        let original = Document::parse_html(r#"<div id="a"></div>"#);
        let mut working = original.clone();
        let a = original.element_by_id("a").unwrap();

        working.append_element(a, Element::new("span"));
        working.element_mut(a).unwrap().set_attr("about", "_:x");

        assert_eq!(working.attr(a, "id"), Some("a"));
        assert_eq!(original.attr(a, "about"), None);
        assert!(!original.has_element_children(a));
        assert!(working.has_element_children(a));
    }
}
