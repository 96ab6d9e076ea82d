//! XML document container and serializer

use std::fs;
use std::path::Path;

use super::node::{
    XmlDeclaration, XmlDocTypeDeclaration, XmlElement, XmlFormatOptions, XmlNode,
};
use super::parser::Parser;
use super::{XmlElementFilter, XmlError};

/// Parser behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XmlParserOptions {
    /// Discard comments instead of building [`XmlNode::Comment`] nodes.
    pub ignore_comments: bool,
    /// Discard unrecognized `<!...>` declarations.
    pub ignore_unknown_elements: bool,
    /// Tolerate non-whitespace characters outside the root element.
    pub ignore_stray_characters: bool,
    /// Trim structural whitespace from text runs and drop runs that become
    /// empty. Disable to preserve every character of text content.
    pub normalize_text_spaces: bool,
}

impl Default for XmlParserOptions {
    fn default() -> Self {
        Self {
            ignore_comments: false,
            ignore_unknown_elements: false,
            ignore_stray_characters: false,
            normalize_text_spaces: true,
        }
    }
}

/// A parsed or programmatically built XML document.
///
/// The document owns its top-level nodes; one of them may be designated the
/// root element. A document holds at most one XML declaration, at most one
/// DOCTYPE declaration and at most one root element.
#[derive(Debug, Clone, Default)]
pub struct XmlDocument {
    declaration: Option<XmlDeclaration>,
    doctype: Option<XmlDocTypeDeclaration>,
    nodes: Vec<XmlNode>,
    root: Option<usize>,
}

impl XmlDocument {
    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a complete document from text with default options.
    pub fn parse(text: &str) -> Result<Self, XmlError> {
        Self::parse_with_options(text, XmlParserOptions::default())
    }

    /// Parse a complete document from text.
    pub fn parse_with_options(text: &str, options: XmlParserOptions) -> Result<Self, XmlError> {
        Parser::new(text, options, None).run()
    }

    /// Parse with an element filter for selective parsing. Subtrees whose
    /// root element the filter rejects are skipped without being built.
    pub fn parse_with_filter(
        text: &str,
        options: XmlParserOptions,
        filter: &mut dyn XmlElementFilter,
    ) -> Result<Self, XmlError> {
        Parser::new(text, options, Some(filter)).run()
    }

    /// The XML declaration, if any.
    pub fn declaration(&self) -> Option<&XmlDeclaration> {
        self.declaration.as_ref()
    }

    /// Install the XML declaration.
    pub fn set_declaration(&mut self, declaration: XmlDeclaration) {
        self.declaration = Some(declaration);
    }

    /// The DOCTYPE declaration, if any.
    pub fn doctype(&self) -> Option<&XmlDocTypeDeclaration> {
        self.doctype.as_ref()
    }

    /// Install the DOCTYPE declaration.
    pub fn set_doctype(&mut self, doctype: XmlDocTypeDeclaration) {
        self.doctype = Some(doctype);
    }

    /// The root element, if one has been designated.
    pub fn root_element(&self) -> Option<&XmlElement> {
        self.root.and_then(|k| match self.nodes.get(k) {
            Some(XmlNode::Element(e)) => Some(e),
            _ => None,
        })
    }

    /// Designate `element` as the document's root. Fails when a root element
    /// already exists.
    pub fn set_root_element(&mut self, element: XmlElement) -> Result<(), XmlError> {
        if self.root.is_some() {
            return Err(XmlError::Structure(
                "The document already has a root element".to_string(),
            ));
        }
        self.root = Some(self.nodes.len());
        self.nodes.push(XmlNode::Element(element));
        Ok(())
    }

    /// Append a document-level node (comment, processing instructions).
    /// Elements must go through [`XmlDocument::set_root_element`].
    pub fn add_node(&mut self, node: XmlNode) -> Result<(), XmlError> {
        if let XmlNode::Element(_) = node {
            return Err(XmlError::Structure(
                "Element nodes at document level must be set as the root element".to_string(),
            ));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub(crate) fn push_top_level(&mut self, node: XmlNode) {
        if let XmlNode::Element(_) = node {
            self.root = Some(self.nodes.len());
        }
        self.nodes.push(node);
    }

    pub(crate) fn has_root(&self) -> bool {
        self.root.is_some()
    }

    pub(crate) fn has_doctype(&self) -> bool {
        self.doctype.is_some()
    }

    pub(crate) fn has_declaration(&self) -> bool {
        self.declaration.is_some()
    }

    /// Top-level nodes in document order.
    pub fn nodes(&self) -> &[XmlNode] {
        &self.nodes
    }

    /// Reset the document to a newly constructed state, releasing the owned
    /// node tree.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Serialize with default formatting (3-space auto-indentation).
    pub fn serialize(&self) -> String {
        self.serialize_with(&XmlFormatOptions::default())
    }

    /// Serialize to text with explicit formatting settings.
    pub fn serialize_with(&self, fmt: &XmlFormatOptions) -> String {
        let mut out = String::new();
        if let Some(declaration) = &self.declaration {
            declaration.serialize(&mut out);
            if fmt.auto_format {
                out.push('\n');
            }
        }
        if let Some(doctype) = &self.doctype {
            doctype.serialize(&mut out);
            if fmt.auto_format {
                out.push('\n');
            }
        }
        for node in &self.nodes {
            node.serialize(&mut out, fmt, 0);
            if fmt.auto_format {
                out.push('\n');
            }
        }
        out
    }

    /// Serialize and write to a file.
    pub fn serialize_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), XmlError> {
        fs::write(path, self.serialize())?;
        Ok(())
    }
}
