use std::borrow::Cow;
use std::io::{self, Write};

use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::dom::{Document, Element, NodeData, NodeId};

pub const XHTML_RDFA_DOCTYPE: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML+RDFa 1.0//EN" "http://www.w3.org/MarkUp/DTD/xhtml-rdfa-1.dtd">"#;
const DOCTYPE_CONTENT: &str = r#"html PUBLIC "-//W3C//DTD XHTML+RDFa 1.0//EN" "http://www.w3.org/MarkUp/DTD/xhtml-rdfa-1.dtd""#;

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
const RDFA_VERSION: &str = "XHTML+RDFa 1.0";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

enum Step<'d> {
    Open(NodeId),
    Close(&'d str),
}

impl Document {
    /// Writes the document as XML, preceded by the XHTML+RDFa DOCTYPE.
    pub fn write_xhtml<W: Write>(&self, out: W) -> io::Result<W> {
        let mut writer = Writer::new(out);
        writer.write_event(Event::DocType(BytesText::from_escaped(DOCTYPE_CONTENT)))?;
        writer.get_mut().write_all(b"\n")?;

        let mut stack: Vec<Step> = self
            .children(self.root())
            .iter()
            .rev()
            .map(|&child| Step::Open(child))
            .collect();

        while let Some(step) = stack.pop() {
            let node = match step {
                Step::Open(node) => node,
                Step::Close(name) => {
                    writer.write_event(Event::End(BytesEnd::new(name)))?;
                    continue;
                }
            };

            match self.data(node) {
                NodeData::Document => {}
                NodeData::Text(text) => {
                    let text = xml_chars(text);
                    writer.write_event(Event::Text(BytesText::new(&text)))?;
                }
                NodeData::Comment(comment) => {
                    writer.write_event(Event::Comment(BytesText::from_escaped(
                        sanitize_comment(comment),
                    )))?;
                }
                NodeData::Element(el) => {
                    if !valid_qname(el.name()) {
                        tracing::warn!(
                            name = el.name(),
                            "element name is not XML, writing content only"
                        );
                        stack.extend(self.children(node).iter().rev().map(|&c| Step::Open(c)));
                        continue;
                    }

                    let document_element =
                        self.parent(node) == Some(self.root()) && el.name() == "html";
                    let start = start_tag(el, document_element);

                    let children = self.children(node);
                    if children.is_empty() && VOID_ELEMENTS.contains(&el.name()) {
                        writer.write_event(Event::Empty(start))?;
                        continue;
                    }

                    writer.write_event(Event::Start(start))?;
                    stack.push(Step::Close(el.name()));
                    stack.extend(children.iter().rev().map(|&c| Step::Open(c)));
                }
            }
        }

        Ok(writer.into_inner())
    }

    pub fn to_xhtml(&self) -> io::Result<String> {
        let bytes = self.write_xhtml(Vec::new())?;
        String::from_utf8(bytes).map_err(io::Error::other)
    }
}

fn start_tag<'e>(el: &'e Element, document_element: bool) -> BytesStart<'e> {
    let mut start = BytesStart::new(el.name());

    if document_element {
        if !el.has_attr("xmlns") {
            start.push_attribute(("xmlns", XHTML_NS));
        }
        if !el.has_attr("version") {
            start.push_attribute(("version", RDFA_VERSION));
        }
    }

    for (name, value) in el.attrs() {
        if valid_qname(name) {
            let value = attribute_value(value);
            start.push_attribute((name.as_bytes(), value.as_bytes()));
        } else {
            tracing::warn!(
                element = el.name(),
                attribute = name,
                "dropping attribute with a non-XML name"
            );
        }
    }

    start
}

/// `name` or `prefix:name`, both parts NCNames.
fn valid_qname(name: &str) -> bool {
    let mut parts = name.split(':');
    let valid = parts
        .by_ref()
        .take(2)
        .all(|s| rxml_validation::validate_ncname(s).is_ok());
    valid && parts.next().is_none()
}

fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

fn xml_chars(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|&c| is_xml_char(c)).collect())
    }
}

fn attribute_value(value: &str) -> String {
    escape(xml_chars(value).as_ref())
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
        .replace('\t', "&#9;")
}

/// Comments may not contain `--` or end in `-`.
fn sanitize_comment(comment: &str) -> String {
    let mut out = String::with_capacity(comment.len());
    for c in comment.chars().filter(|&c| is_xml_char(c)) {
        if c == '-' && out.ends_with('-') {
            out.push(' ');
        }
        out.push(c);
    }
    if out.ends_with('-') {
        out.push(' ');
    }
    out
}
