//! Generic XML element tree
//!
//! Documents are tokenized with quick-xml into an owned tree. Text is trimmed;
//! comments, processing instructions and the declaration are dropped.

use palisade_core::{PermissionError, Result, ViolationKind};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// One XML element with its attributes, text content and children
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    content: String,
    children: Vec<XmlElement>,
}

fn malformed(message: impl Into<String>) -> PermissionError {
    PermissionError::schema(ViolationKind::MalformedXml, message)
}

impl XmlElement {
    /// Empty element named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder: add an attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Builder: set text content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Builder: append a child
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    /// Append a child
    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    /// Element name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed text content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Child elements in document order
    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    /// Parse a document and return its root element
    pub fn parse(xml: &str) -> Result<XmlElement> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => stack.push(element_from_start(&start)?),
                Ok(Event::Empty(start)) => {
                    attach(&mut stack, &mut root, element_from_start(&start)?)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| malformed("closing tag without opening tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(text)) => {
                    let text = text
                        .unescape()
                        .map_err(|e| malformed(format!("bad text content: {e}")))?;
                    match stack.last_mut() {
                        Some(top) => top.content.push_str(&text),
                        None if text.trim().is_empty() => {}
                        None => return Err(malformed("text outside the root element")),
                    }
                }
                Ok(Event::CData(data)) => {
                    let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    match stack.last_mut() {
                        Some(top) => top.content.push_str(&text),
                        None => return Err(malformed("CDATA outside the root element")),
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(malformed(format!(
                        "at byte {}: {e}",
                        reader.buffer_position()
                    )))
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(malformed(format!("element <{}> is not closed", open.name)));
        }
        root.ok_or_else(|| malformed("document has no root element"))
    }

    /// Serialize with four-space indentation
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out, 0);
        out
    }

    fn write_into(&self, out: &mut String, depth: usize) {
        let indent = "    ".repeat(depth);
        out.push_str(&indent);
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.children.is_empty() && self.content.is_empty() {
            out.push_str("/>\n");
            return;
        }
        out.push('>');
        out.push_str(&escape(self.content.as_str()));
        if self.children.is_empty() {
            out.push_str("</");
            out.push_str(&self.name);
            out.push_str(">\n");
            return;
        }
        out.push('\n');
        for child in &self.children {
            child.write_into(out, depth + 1);
        }
        out.push_str(&indent);
        out.push_str("</");
        out.push_str(&self.name);
        out.push_str(">\n");
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = XmlElement::new(name);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| malformed(format!("bad attribute: {e}")))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| malformed(format!("bad attribute value: {e}")))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(malformed("document has more than one root element"));
    }
    *root = Some(element);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_document() {
        let xml = r#"<?xml version="1.0"?>
            <rules>
                <!-- comment -->
                <node name="/a">
                    <annotation name="x" value="a &amp; b"/>
                    <text>  hello  </text>
                </node>
            </rules>"#;
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.name(), "rules");
        assert_eq!(root.children().len(), 1);
        let node = &root.children()[0];
        assert_eq!(node.attribute("name"), Some("/a"));
        assert_eq!(node.children()[0].attribute("value"), Some("a & b"));
        assert_eq!(node.children()[1].content(), "hello");
    }

    #[test]
    fn test_rejects_broken_documents() {
        for xml in ["", "<a><b></a>", "<a></a><b></b>", "<a>", "just text"] {
            let err = XmlElement::parse(xml).unwrap_err();
            assert!(err.is_schema(ViolationKind::MalformedXml), "{xml}: {err}");
        }
    }

    #[test]
    fn test_writer_output_parses_back() {
        let element = XmlElement::new("policy")
            .with_child(XmlElement::new("serialNumber").with_content("5"))
            .with_child(
                XmlElement::new("node")
                    .with_attribute("name", "<odd>\"path\"")
                    .with_child(XmlElement::new("empty")),
            );
        let text = element.to_xml_string();
        assert!(text.contains("<empty/>"));
        assert_eq!(XmlElement::parse(&text).unwrap(), element);
    }
}
