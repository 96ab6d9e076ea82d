//! # XML Document Model and Parser
//!
//! A self-contained XML engine: a tree of owned nodes, a single-pass
//! streaming parser, and a serializer with optional auto-indentation. This
//! exists because XDRZ interoperability requires byte-level control over the
//! emitted documents and selective parsing of very large subtrees (rejection
//! maps can run to tens of megabytes), neither of which a generic pull
//! parser gives us.
//!
//! ## Document structure
//!
//! ```text
//! XmlDocument
//! ├── XmlDeclaration?            (<?xml version="1.0" ...?>)
//! ├── XmlDocTypeDeclaration?     (<!DOCTYPE ...>)
//! └── top-level nodes
//!     ├── XmlNode::Comment / ProcessingInstructions / Unknown
//!     └── XmlNode::Element       (the designated root, at most one)
//!         └── children: Element | Text | CData | PI | Comment | Unknown
//! ```
//!
//! ## Selective parsing
//!
//! An [`XmlElementFilter`] installed at parse time is consulted for every
//! start tag, first with the bare tag name and then, if accepted, with the
//! parsed attribute list. Rejecting either call prunes the whole subtree:
//! none of its nodes are materialized, and parsing resumes after the
//! matching end tag.

mod document;
mod node;
mod parser;
mod text;

pub use document::{XmlDocument, XmlParserOptions};
pub use node::{
    TextLocation, XmlAttribute, XmlAttributeList, XmlCData, XmlComment, XmlDeclaration,
    XmlDocTypeDeclaration, XmlElement, XmlFormatOptions, XmlNode, XmlNodeType,
    XmlProcessingInstructions, XmlText, XmlUnknownElement,
};
pub use text::{collapsed_spaces, decoded_text, encoded_text, trimmed_spaces};

/// Errors raised by the XML layer.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    /// A lexical or syntax error, located in the source text.
    #[error("{message} (line {line}, column {column})")]
    Parse {
        /// Human-readable description of the problem.
        message: String,
        /// 1-based source line.
        line: usize,
        /// 1-based source column.
        column: usize,
    },

    /// A malformed attribute list.
    #[error("{message}")]
    AttributeList {
        /// Offset-qualified description of the problem.
        message: String,
    },

    /// A document-structure violation detected outside of parsing.
    #[error("{0}")]
    Structure(String),

    /// An I/O failure while writing a serialized document.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Element filter for selective parsing.
///
/// [`accept_name`](Self::accept_name) is called before the tag's attributes
/// are parsed; returning `false` skips the subtree without attribute
/// parsing. When it returns `true`, [`accept`](Self::accept) is offered the
/// parsed attribute list for the final decision.
pub trait XmlElementFilter {
    /// First-stage decision from the tag name alone.
    fn accept_name(&mut self, name: &str) -> bool {
        let _ = name;
        true
    }

    /// Second-stage decision with the parsed attribute list.
    fn accept(&mut self, name: &str, attributes: &XmlAttributeList) -> bool;
}
