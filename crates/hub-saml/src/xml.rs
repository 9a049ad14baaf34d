//! Minimal owned XML element tree.
//!
//! SAML messages only ever hold element-only or text-only content, so a
//! node carries either children or a text value. Serialization is
//! deterministic (attributes in insertion order, no insignificant
//! whitespace, every element written as a start/end pair) and doubles as
//! the canonical form that signature digests are computed over.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};

/// Deepest element nesting [`parse`] accepts. SAML messages stay well
/// below it; anything deeper is refused before the tree is built.
pub const MAX_ELEMENT_DEPTH: usize = 64;

/// An XML element with its attributes, children and text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlNode {
    /// Qualified element name, e.g. `saml:Assertion`.
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<XmlNode>,
    /// Text content, if any.
    pub text: Option<String>,
}

impl XmlNode {
    /// Creates an empty element.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Adds an attribute if the value is present.
    #[must_use]
    pub fn with_opt_attr(self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.with_attr(name, value),
            None => self,
        }
    }

    /// Appends a child element.
    #[must_use]
    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    /// Appends several child elements.
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = XmlNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// Sets the text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets or replaces an attribute, keeping its position if it exists.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Element name without its namespace prefix.
    #[must_use]
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    /// Returns an attribute value by qualified or local name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .or_else(|| self.attributes.iter().find(|(n, _)| local(n) == name && !n.starts_with("xmlns")))
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given local name.
    #[must_use]
    pub fn child(&self, local_name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.local_name() == local_name)
    }

    /// All children with the given local name.
    pub fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.local_name() == local_name)
    }

    /// Text of the first child with the given local name.
    #[must_use]
    pub fn child_text(&self, local_name: &str) -> Option<&str> {
        self.child(local_name).and_then(|c| c.text.as_deref())
    }

    /// Index of the first child with the given local name.
    #[must_use]
    pub fn position(&self, local_name: &str) -> Option<usize> {
        self.children.iter().position(|c| c.local_name() == local_name)
    }

    /// Serializes the element and its subtree.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(&escape(text.as_str()));
        }
        for child in &self.children {
            child.write_into(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, l)| l)
}

/// Parses a document into its root element.
///
/// Comments, processing instructions and the XML declaration are skipped.
/// DOCTYPE declarations are rejected outright.
///
/// # Errors
///
/// Returns [`SamlError::XmlParse`] for malformed input or for elements
/// nested deeper than [`MAX_ELEMENT_DEPTH`].
pub fn parse(xml: &str) -> SamlResult<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                check_depth(&stack)?;
                stack.push(start_node(&e)?);
            }
            Ok(Event::Empty(e)) => {
                check_depth(&stack)?;
                let node = start_node(&e)?;
                close(node, &mut stack, &mut root)?;
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| SamlError::XmlParse(e.to_string()))?;
                append_text(&mut stack, &text)?;
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8(e.into_inner().into_owned())
                    .map_err(|e| SamlError::XmlParse(e.to_string()))?;
                append_text(&mut stack, &text)?;
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| SamlError::XmlParse("unbalanced end tag".to_string()))?;
                close(node, &mut stack, &mut root)?;
            }
            Ok(Event::DocType(_)) => {
                return Err(SamlError::XmlParse("DOCTYPE is not allowed".to_string()));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(SamlError::XmlParse(e.to_string())),
        }
    }

    if !stack.is_empty() {
        return Err(SamlError::XmlParse("unclosed element".to_string()));
    }
    root.ok_or_else(|| SamlError::XmlParse("document has no root element".to_string()))
}

fn check_depth(stack: &[XmlNode]) -> SamlResult<()> {
    if stack.len() >= MAX_ELEMENT_DEPTH {
        return Err(SamlError::XmlParse(format!(
            "elements nested deeper than {MAX_ELEMENT_DEPTH}"
        )));
    }
    Ok(())
}

fn start_node(e: &BytesStart<'_>) -> SamlResult<XmlNode> {
    let name = String::from_utf8(e.name().as_ref().to_vec())
        .map_err(|e| SamlError::XmlParse(e.to_string()))?;
    let mut node = XmlNode::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SamlError::XmlParse(e.to_string()))?;
        let key = String::from_utf8(attr.key.as_ref().to_vec())
            .map_err(|e| SamlError::XmlParse(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| SamlError::XmlParse(e.to_string()))?;
        node.attributes.push((key, value.into_owned()));
    }
    Ok(node)
}

fn append_text(stack: &mut [XmlNode], text: &str) -> SamlResult<()> {
    let current = stack
        .last_mut()
        .ok_or_else(|| SamlError::XmlParse("text outside the root element".to_string()))?;
    match &mut current.text {
        Some(existing) => existing.push_str(text),
        None => current.text = Some(text.to_string()),
    }
    Ok(())
}

fn close(node: XmlNode, stack: &mut [XmlNode], root: &mut Option<XmlNode>) -> SamlResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => return Err(SamlError::XmlParse("multiple root elements".to_string())),
    }
    Ok(())
}
