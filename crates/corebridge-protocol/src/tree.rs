//! The tagged tree every payload and envelope is built from.
//!
//! An [`Element`] is a tag, a few attributes, optional text, and child
//! elements. Its text form is XML: written by [`Element::to_xml`] and
//! read back with [`Element::parse`].
//!
//! ```rust
//! use corebridge_protocol::Element;
//!
//! let foo = Element::new("Foo").with_child(Element::leaf("name", "Ada"));
//! assert_eq!(foo.to_xml().unwrap(), "<Foo><name>Ada</name></Foo>");
//!
//! let parsed = Element::parse(&foo.to_xml().unwrap()).unwrap();
//! assert_eq!(parsed.child("name").map(|e| e.text()), Some("Ada"));
//! ```

use crate::ProtocolError;

/// Deepest nesting accepted when parsing, encoding or decoding a tree.
pub const MAX_DEPTH: usize = 256;

/// One node of a tagged tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    /// An empty element.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// An element holding only text.
    pub fn leaf(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Sets an attribute, replacing any earlier value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// The first child with this tag.
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Text of the first child with this tag.
    pub fn child_text(&self, tag: &str) -> Option<&str> {
        self.child(tag).map(Element::text)
    }

    // -----------------------------------------------------------------------
    // Text form
    // -----------------------------------------------------------------------

    /// Parses XML text into a tree.
    ///
    /// Whitespace-only text between elements is dropped; other text runs
    /// of an element are concatenated.
    ///
    /// # Errors
    /// [`ProtocolError::Xml`] for malformed text, [`ProtocolError::Decode`]
    /// for documents nested deeper than [`MAX_DEPTH`].
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let document = roxmltree::Document::parse(text)?;
        Self::from_node(document.root_element(), 1)
    }

    fn from_node(node: roxmltree::Node<'_, '_>, depth: usize) -> Result<Self, ProtocolError> {
        if depth > MAX_DEPTH {
            return Err(ProtocolError::Decode(format!(
                "document nests deeper than {MAX_DEPTH} levels"
            )));
        }

        let mut element = Self::new(node.tag_name().name());
        for attribute in node.attributes() {
            element
                .attributes
                .push((attribute.name().to_string(), attribute.value().to_string()));
        }

        let mut text = String::new();
        for child in node.children() {
            if child.is_element() {
                element.children.push(Self::from_node(child, depth + 1)?);
            } else if child.is_text() {
                text.push_str(child.text().unwrap_or_default());
            }
        }
        if element.children.is_empty() || !text.trim().is_empty() {
            element.text = text;
        }
        Ok(element)
    }

    /// Renders the tree as compact XML with no declaration.
    ///
    /// Carriage returns are written as character references so they
    /// survive line-ending normalization; in attributes, tabs and line
    /// feeds are too.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidCharacter`] if text or an attribute holds a
    /// character XML 1.0 can't carry, such as most control characters.
    pub fn to_xml(&self) -> Result<String, ProtocolError> {
        let mut out = String::new();
        self.write_xml(&mut out)?;
        Ok(out)
    }

    fn write_xml(&self, out: &mut String) -> Result<(), ProtocolError> {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape_into(value, true, out)?;
            out.push('"');
        }

        if self.text.is_empty() && self.children.is_empty() {
            out.push_str("/>");
            return Ok(());
        }

        out.push('>');
        escape_into(&self.text, false, out)?;
        for child in &self.children {
            child.write_xml(out)?;
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
        Ok(())
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) -> Result<(), ProtocolError> {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\r' => out.push_str("&#13;"),
            '\t' if attribute => out.push_str("&#9;"),
            '\n' if attribute => out.push_str("&#10;"),
            c if is_xml_char(c) => out.push(c),
            c => return Err(ProtocolError::InvalidCharacter(c)),
        }
    }
    Ok(())
}

/// The `Char` production of XML 1.0.
fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}
