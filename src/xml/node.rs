//! XML node tree
//!
//! The node kind set is closed, so nodes are a tagged enum rather than a
//! virtual hierarchy; serialization dispatch is a `match` and exhaustiveness
//! is checked at compile time. Ownership is strict: an element owns its
//! children outright (`Vec<XmlNode>`), so a node belongs to exactly one
//! parent by construction and destroying a node destroys its subtree.

use std::fmt;

use super::text::{
    collapsed_spaces, decoded_text, encoded_text, find_next_char, find_next_space, is_name_char,
    is_name_start_char, skip_whitespace, trimmed_spaces,
};
use super::XmlError;

/// Source position (1-based line and column) captured at parse time.
///
/// Nodes built programmatically carry the default `0:0` location, which
/// displays as `<unknown>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextLocation {
    /// 1-based line number, 0 when unknown.
    pub line: usize,
    /// 1-based column number, 0 when unknown.
    pub column: usize,
}

impl fmt::Display for TextLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// Discriminant of an [`XmlNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlNodeType {
    /// An element node.
    Element,
    /// A character data node.
    Text,
    /// A CDATA section.
    CData,
    /// A processing instructions node.
    ProcessingInstructions,
    /// A comment.
    Comment,
    /// An unknown `<!...>` declaration.
    Unknown,
}

/// One node of an XML document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    /// An element with attributes and owned children.
    Element(XmlElement),
    /// A character data run (stored decoded).
    Text(XmlText),
    /// A CDATA section.
    CData(XmlCData),
    /// A `<?target instructions?>` node other than the XML declaration.
    ProcessingInstructions(XmlProcessingInstructions),
    /// A `<!-- ... -->` comment.
    Comment(XmlComment),
    /// An unrecognized `<!...>` declaration, kept verbatim.
    Unknown(XmlUnknownElement),
}

impl XmlNode {
    /// The node's kind tag.
    pub fn node_type(&self) -> XmlNodeType {
        match self {
            XmlNode::Element(_) => XmlNodeType::Element,
            XmlNode::Text(_) => XmlNodeType::Text,
            XmlNode::CData(_) => XmlNodeType::CData,
            XmlNode::ProcessingInstructions(_) => XmlNodeType::ProcessingInstructions,
            XmlNode::Comment(_) => XmlNodeType::Comment,
            XmlNode::Unknown(_) => XmlNodeType::Unknown,
        }
    }

    /// Source location captured at parse time.
    pub fn location(&self) -> TextLocation {
        match self {
            XmlNode::Element(n) => n.location,
            XmlNode::Text(n) => n.location,
            XmlNode::CData(n) => n.location,
            XmlNode::ProcessingInstructions(n) => n.location,
            XmlNode::Comment(n) => n.location,
            XmlNode::Unknown(n) => n.location,
        }
    }

    /// Append this node's text form to `out`.
    pub(crate) fn serialize(&self, out: &mut String, fmt: &XmlFormatOptions, level: usize) {
        match self {
            XmlNode::Element(n) => n.serialize(out, fmt, level),
            XmlNode::Text(n) => n.serialize(out),
            XmlNode::CData(n) => n.serialize(out),
            XmlNode::ProcessingInstructions(n) => n.serialize(out),
            XmlNode::Comment(n) => n.serialize(out),
            XmlNode::Unknown(n) => n.serialize(out),
        }
    }
}

impl From<XmlElement> for XmlNode {
    fn from(node: XmlElement) -> Self {
        XmlNode::Element(node)
    }
}

impl From<XmlText> for XmlNode {
    fn from(node: XmlText) -> Self {
        XmlNode::Text(node)
    }
}

impl From<XmlCData> for XmlNode {
    fn from(node: XmlCData) -> Self {
        XmlNode::CData(node)
    }
}

impl From<XmlProcessingInstructions> for XmlNode {
    fn from(node: XmlProcessingInstructions) -> Self {
        XmlNode::ProcessingInstructions(node)
    }
}

impl From<XmlComment> for XmlNode {
    fn from(node: XmlComment) -> Self {
        XmlNode::Comment(node)
    }
}

impl From<XmlUnknownElement> for XmlNode {
    fn from(node: XmlUnknownElement) -> Self {
        XmlNode::Unknown(node)
    }
}

/// Serialization formatting settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XmlFormatOptions {
    /// Insert newlines and indentation between structural nodes.
    pub auto_format: bool,
    /// Indentation character (space or tab).
    pub indent_char: char,
    /// Indentation units per nesting level.
    pub indent_size: usize,
}

impl Default for XmlFormatOptions {
    fn default() -> Self {
        Self {
            auto_format: true,
            indent_char: ' ',
            indent_size: 3,
        }
    }
}

impl XmlFormatOptions {
    /// Compact output: no newlines, no indentation.
    pub fn compact() -> Self {
        Self {
            auto_format: false,
            ..Self::default()
        }
    }

    pub(crate) fn indent(&self, out: &mut String, level: usize) {
        if self.auto_format {
            for _ in 0..level * self.indent_size {
                out.push(self.indent_char);
            }
        }
    }
}

/// One `name="value"` attribute. Values are stored decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Attribute name.
    pub name: String,
    /// Attribute value, entity-decoded and whitespace-collapsed.
    pub value: String,
}

/// An ordered list of attributes with unique names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlAttributeList {
    items: Vec<XmlAttribute>,
}

impl XmlAttributeList {
    /// An empty attribute list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no attributes are present.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate attributes in list order.
    pub fn iter(&self) -> impl Iterator<Item = &XmlAttribute> {
        self.items.iter()
    }

    /// Value of the named attribute, if present.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// True when the named attribute is present.
    pub fn has(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    /// Set an attribute. Names are unique within a list: setting an existing
    /// name replaces the value in place, preserving list order.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.items.iter_mut().find(|a| a.name == name) {
            Some(a) => a.value = value,
            None => self.items.push(XmlAttribute { name, value }),
        }
    }

    /// Parse the attribute section of a start tag.
    ///
    /// Single left-to-right scan over `name = "value"` pairs. Values are
    /// entity-decoded and whitespace-collapsed. Structural violations fail
    /// with an offset-qualified message wrapped by the caller-facing
    /// "Parsing XML attribute list" prefix.
    pub fn parse(text: &str) -> Result<Self, XmlError> {
        let mut list = Self::new();
        let j = text.len();
        let mut i = skip_whitespace(text, 0, j);
        while i < j {
            let start = i;
            let c = text[i..].chars().next().unwrap_or('\0');
            if !is_name_start_char(c) {
                return Err(Self::error(
                    format!("Invalid attribute name starting with '{}'", c),
                    start,
                ));
            }
            let mut name_end = j;
            for (k, nc) in text[i..j].char_indices().skip(1) {
                if !is_name_char(nc) {
                    name_end = i + k;
                    break;
                }
            }
            let name = &text[i..name_end];
            i = skip_whitespace(text, name_end, j);
            if i >= j || text.as_bytes()[i] != b'=' {
                return Err(Self::error(
                    format!("Expected '=' after attribute name '{}'", name),
                    start,
                ));
            }
            i = skip_whitespace(text, i + 1, j);
            if i >= j {
                return Err(Self::error(
                    format!("Missing value of attribute '{}'", name),
                    start,
                ));
            }
            let quote = text.as_bytes()[i];
            if quote != b'"' && quote != b'\'' {
                return Err(Self::error(
                    format!("Expected starting quote of attribute '{}'", name),
                    start,
                ));
            }
            let value_start = i + 1;
            let value_end = find_next_char(text, value_start, j, quote);
            if value_end >= j {
                return Err(Self::error(
                    format!(
                        "Unmatched {} quote in value of attribute '{}'",
                        if quote == b'"' { "double" } else { "single" },
                        name
                    ),
                    start,
                ));
            }
            let value = collapsed_spaces(&decoded_text(&text[value_start..value_end]));
            list.set(name, value);
            i = skip_whitespace(text, value_end + 1, j);
        }
        Ok(list)
    }

    fn error(message: String, offset: usize) -> XmlError {
        XmlError::AttributeList {
            message: format!("{} (at offset {})", message, offset),
        }
    }

    /// Append the list's text form: `name="value"` pairs separated by single
    /// spaces, in list order (order is semantically irrelevant but kept for
    /// deterministic output).
    pub fn serialize(&self, out: &mut String) {
        for (k, a) in self.items.iter().enumerate() {
            if k > 0 {
                out.push(' ');
            }
            out.push_str(&a.name);
            out.push_str("=\"");
            out.push_str(&encoded_text(&a.value, false));
            out.push('"');
        }
    }
}

impl<'a> IntoIterator for &'a XmlAttributeList {
    type Item = &'a XmlAttribute;
    type IntoIter = std::slice::Iter<'a, XmlAttribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// An element: name, attributes, owned ordered children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    /// Tag name.
    pub name: String,
    /// Attribute list (names unique, order preserved).
    pub attributes: XmlAttributeList,
    /// Owned child nodes in document order.
    pub children: Vec<XmlNode>,
    /// Source location of the start tag.
    pub location: TextLocation,
}

impl XmlElement {
    /// A new element with no attributes and no children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A new element with the given attribute list.
    pub fn with_attributes(name: impl Into<String>, attributes: XmlAttributeList) -> Self {
        Self {
            name: name.into(),
            attributes,
            ..Self::default()
        }
    }

    /// Set an attribute (unique by name).
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.set(name, value);
    }

    /// Value of the named attribute, if present.
    pub fn attribute_value(&self, name: &str) -> Option<&str> {
        self.attributes.value(name)
    }

    /// Append a child node.
    pub fn add_child(&mut self, node: XmlNode) {
        self.children.push(node);
    }

    /// Append a text child holding `text`.
    pub fn add_text(&mut self, text: impl Into<String>) {
        self.children.push(XmlNode::Text(XmlText::new(text)));
    }

    /// True when the element has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Iterate direct child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First direct child element with the given name.
    pub fn find_child_element(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.name == name)
    }

    /// Concatenated content of the direct text children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let XmlNode::Text(t) = child {
                out.push_str(&t.text);
            }
        }
        out
    }

    pub(crate) fn serialize(&self, out: &mut String, fmt: &XmlFormatOptions, level: usize) {
        out.push('<');
        out.push_str(&self.name);
        if !self.attributes.is_empty() {
            out.push(' ');
            self.attributes.serialize(out);
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        // Newlines are only legal next to structure, never next to text:
        // a text child glued to its neighbors keeps data content byte-exact
        // across a serialize/parse round trip.
        let mut prev_was_text = false;
        for child in &self.children {
            let is_text = matches!(child, XmlNode::Text(_));
            if fmt.auto_format && !is_text && !prev_was_text {
                out.push('\n');
                fmt.indent(out, level + 1);
            }
            child.serialize(out, fmt, level + 1);
            prev_was_text = is_text;
        }
        if fmt.auto_format && !prev_was_text {
            out.push('\n');
            fmt.indent(out, level);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// A character data node. Content is stored decoded; entities are applied on
/// serialization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlText {
    /// Decoded character data.
    pub text: String,
    /// Source location.
    pub location: TextLocation,
}

impl XmlText {
    /// A new text node.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: TextLocation::default(),
        }
    }

    fn serialize(&self, out: &mut String) {
        out.push_str(&encoded_text(&self.text, false));
    }
}

/// A CDATA section. The forbidden `]]>` terminator is stripped from the data
/// on serialization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlCData {
    /// Verbatim section data.
    pub data: String,
    /// Source location.
    pub location: TextLocation,
}

impl XmlCData {
    /// A new CDATA node.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            location: TextLocation::default(),
        }
    }

    fn serialize(&self, out: &mut String) {
        out.push_str("<![CDATA[");
        out.push_str(&self.data.replace("]]>", ""));
        out.push_str("]]>");
    }
}

/// A `<?target instructions?>` node. The forbidden `?>` sequence is stripped
/// from the instructions on serialization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlProcessingInstructions {
    /// PI target name.
    pub target: String,
    /// Instructions text.
    pub instructions: String,
    /// Source location.
    pub location: TextLocation,
}

impl XmlProcessingInstructions {
    /// A new processing instructions node.
    pub fn new(target: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            instructions: instructions.into(),
            location: TextLocation::default(),
        }
    }

    fn serialize(&self, out: &mut String) {
        out.push_str("<?");
        out.push_str(&self.target);
        if !self.instructions.is_empty() {
            out.push(' ');
            out.push_str(&self.instructions.replace("?>", ""));
        }
        out.push_str("?>");
    }
}

/// A comment. The forbidden `--` sequence is stripped from the comment text
/// on serialization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlComment {
    /// Comment text.
    pub comment: String,
    /// Source location.
    pub location: TextLocation,
}

impl XmlComment {
    /// A new comment node.
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            location: TextLocation::default(),
        }
    }

    fn serialize(&self, out: &mut String) {
        out.push_str("<!--");
        out.push_str(&self.comment.replace("--", ""));
        out.push_str("-->");
    }
}

/// An unrecognized `<!name parameters>` declaration, kept verbatim.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlUnknownElement {
    /// Declaration name.
    pub name: String,
    /// Raw parameter text.
    pub parameters: String,
    /// Source location.
    pub location: TextLocation,
}

impl XmlUnknownElement {
    /// A new unknown-declaration node.
    pub fn new(name: impl Into<String>, parameters: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: parameters.into(),
            location: TextLocation::default(),
        }
    }

    fn serialize(&self, out: &mut String) {
        out.push_str("<!");
        out.push_str(&self.name);
        if !self.parameters.is_empty() {
            out.push(' ');
            out.push_str(&self.parameters);
        }
        out.push('>');
    }
}

/// The `<?xml ...?>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDeclaration {
    /// XML version, normally "1.0".
    pub version: String,
    /// Document encoding, when declared.
    pub encoding: Option<String>,
    /// Standalone flag, when declared.
    pub standalone: Option<bool>,
}

impl Default for XmlDeclaration {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            encoding: Some("UTF-8".to_string()),
            standalone: None,
        }
    }
}

impl XmlDeclaration {
    /// Spellings of the encodings this implementation accepts.
    pub(crate) const KNOWN_ENCODINGS: &'static [&'static str] = &[
        "UTF-8", "utf-8", "UTF-16", "utf-16", "ISO-8859-1", "iso-8859-1",
    ];

    pub(crate) fn serialize(&self, out: &mut String) {
        out.push_str("<?xml version=\"");
        out.push_str(&self.version);
        out.push('"');
        if let Some(encoding) = &self.encoding {
            out.push_str(" encoding=\"");
            out.push_str(encoding);
            out.push('"');
        }
        if let Some(standalone) = self.standalone {
            out.push_str(" standalone=\"");
            out.push_str(if standalone { "yes" } else { "no" });
            out.push('"');
        }
        out.push_str("?>");
    }
}

/// A `<!DOCTYPE name definition>` declaration. The definition is kept
/// verbatim; external subsets are not resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlDocTypeDeclaration {
    /// Document type name.
    pub name: String,
    /// Remaining declaration text, verbatim.
    pub definition: String,
}

impl XmlDocTypeDeclaration {
    /// A new DOCTYPE declaration.
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
        }
    }

    /// Split a raw DOCTYPE body into name and definition.
    pub(crate) fn from_raw(raw: &str) -> Self {
        let raw = trimmed_spaces(raw);
        let split = find_next_space(raw, 0, raw.len());
        Self {
            name: raw[..split].to_string(),
            definition: trimmed_spaces(&raw[split..]).to_string(),
        }
    }

    pub(crate) fn serialize(&self, out: &mut String) {
        out.push_str("<!DOCTYPE ");
        out.push_str(&self.name);
        if !self.definition.is_empty() {
            out.push(' ');
            out.push_str(&self.definition);
        }
        out.push('>');
    }
}
