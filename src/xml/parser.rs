//! Streaming XML parser
//!
//! A single forward pass over the input buffer with an explicit stack of
//! open elements. Tags, comments, CDATA sections, DOCTYPE and processing
//! instructions are tokenized in place; character runs between tags become
//! text nodes. An optional element filter can reject a start tag, which
//! suppresses the whole subtree without materializing any of its nodes.

use super::document::{XmlDocument, XmlParserOptions};
use super::node::{
    TextLocation, XmlAttributeList, XmlCData, XmlComment, XmlDeclaration, XmlDocTypeDeclaration,
    XmlElement, XmlNode, XmlProcessingInstructions, XmlText, XmlUnknownElement,
};
use super::text::{
    decoded_text, find_closing_char, find_next_char, find_next_space, find_token, is_name_char,
    is_name_start_char, is_space, is_token, skip_whitespace, trimmed_spaces,
};
use super::{XmlElementFilter, XmlError};

/// Subtree suppression state while an element rejected by the filter is
/// being skipped. Nested same-name start tags bump the depth so the skip
/// ends at the matching end tag, not the first one.
struct SkipState {
    name: String,
    depth: usize,
}

pub(crate) struct Parser<'a, 'f> {
    text: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    options: XmlParserOptions,
    filter: Option<&'f mut dyn XmlElementFilter>,
    document: XmlDocument,
    stack: Vec<XmlElement>,
    skip: Option<SkipState>,
}

impl<'a, 'f> Parser<'a, 'f> {
    pub(crate) fn new(
        text: &'a str,
        options: XmlParserOptions,
        filter: Option<&'f mut dyn XmlElementFilter>,
    ) -> Self {
        Self {
            text,
            pos: 0,
            line: 1,
            column: 1,
            options,
            filter,
            document: XmlDocument::new(),
            stack: Vec::new(),
            skip: None,
        }
    }

    pub(crate) fn run(mut self) -> Result<XmlDocument, XmlError> {
        let j = self.text.len();
        while self.pos < j {
            let lt = find_next_char(self.text, self.pos, j, b'<');
            if lt > self.pos {
                self.text_run(self.pos, lt)?;
                self.advance(lt);
            }
            if lt >= j {
                break;
            }
            if is_token(self.text, lt, "<!--") {
                self.comment()?;
            } else if is_token(self.text, lt, "<![CDATA[") {
                self.cdata()?;
            } else if is_token(self.text, lt, "<!DOCTYPE") {
                self.doctype()?;
            } else if is_token(self.text, lt, "<!") {
                self.unknown_element()?;
            } else if is_token(self.text, lt, "<?") {
                self.processing_instructions()?;
            } else if is_token(self.text, lt, "</") {
                self.end_tag()?;
            } else {
                self.start_tag()?;
            }
        }
        if let Some(state) = &self.skip {
            return Err(self.error(format!("Missing end-tag '</{}>'", state.name)));
        }
        if let Some(open) = self.stack.last() {
            return Err(XmlError::Parse {
                message: format!("Missing end-tag '</{}>'", open.name),
                line: open.location.line,
                column: open.location.column,
            });
        }
        if !self.document.has_root() {
            return Err(self.error("No root element".to_string()));
        }
        Ok(self.document)
    }

    // --- location tracking -------------------------------------------------

    /// Move the cursor forward to byte offset `to`, updating line/column.
    /// Columns count characters, so UTF-8 continuation bytes are skipped.
    fn advance(&mut self, to: usize) {
        for &b in &self.text.as_bytes()[self.pos..to] {
            if b == b'\n' {
                self.line += 1;
                self.column = 1;
            } else if b & 0xC0 != 0x80 {
                self.column += 1;
            }
        }
        self.pos = to;
    }

    fn location(&self) -> TextLocation {
        TextLocation {
            line: self.line,
            column: self.column,
        }
    }

    fn error(&self, message: String) -> XmlError {
        XmlError::Parse {
            message,
            line: self.line,
            column: self.column,
        }
    }

    fn error_at(&self, location: TextLocation, message: String) -> XmlError {
        XmlError::Parse {
            message,
            line: location.line,
            column: location.column,
        }
    }

    // --- node attachment ---------------------------------------------------

    fn attach(&mut self, node: XmlNode) -> Result<(), XmlError> {
        match self.stack.last_mut() {
            Some(parent) => {
                parent.children.push(node);
                Ok(())
            }
            None => match &node {
                XmlNode::Element(e) if self.document.has_root() => Err(self.error_at(
                    e.location,
                    "Multiple root elements".to_string(),
                )),
                _ => {
                    self.document.push_top_level(node);
                    Ok(())
                }
            },
        }
    }

    // --- text runs ---------------------------------------------------------

    fn text_run(&mut self, i: usize, j: usize) -> Result<(), XmlError> {
        if self.skip.is_some() {
            return Ok(());
        }
        let raw = &self.text[i..j];
        if self.stack.is_empty() {
            // Outside any element only whitespace is legal.
            if !raw.bytes().all(is_space) && !self.options.ignore_stray_characters {
                let k = raw.bytes().position(|b| !is_space(b)).unwrap_or(0);
                let mut loc = self.location();
                for &b in &raw.as_bytes()[..k] {
                    if b == b'\n' {
                        loc.line += 1;
                        loc.column = 1;
                    } else {
                        loc.column += 1;
                    }
                }
                return Err(self.error_at(
                    loc,
                    "Stray character outside the root element".to_string(),
                ));
            }
            return Ok(());
        }
        let content = if self.options.normalize_text_spaces {
            trimmed_spaces(raw)
        } else {
            raw
        };
        if content.is_empty() {
            return Ok(());
        }
        let node = XmlText {
            text: decoded_text(content),
            location: self.location(),
        };
        self.attach(XmlNode::Text(node))
    }

    // --- tags and declarations ---------------------------------------------

    fn comment(&mut self) -> Result<(), XmlError> {
        let start = self.location();
        let j = self.text.len();
        let end = find_token(self.text, self.pos + 4, j, "-->");
        if end >= j {
            return Err(self.error_at(start, "Unterminated XML comment".to_string()));
        }
        let comment = self.text[self.pos + 4..end].to_string();
        self.advance(end + 3);
        if self.skip.is_some() || self.options.ignore_comments {
            return Ok(());
        }
        self.attach(XmlNode::Comment(XmlComment {
            comment,
            location: start,
        }))
    }

    fn cdata(&mut self) -> Result<(), XmlError> {
        let start = self.location();
        let j = self.text.len();
        let end = find_token(self.text, self.pos + 9, j, "]]>");
        if end >= j {
            return Err(self.error_at(start, "Unterminated CDATA section".to_string()));
        }
        let data = self.text[self.pos + 9..end].to_string();
        self.advance(end + 3);
        if self.skip.is_some() {
            return Ok(());
        }
        if self.stack.is_empty() {
            return Err(self.error_at(
                start,
                "CDATA section outside of an element".to_string(),
            ));
        }
        self.attach(XmlNode::CData(XmlCData {
            data,
            location: start,
        }))
    }

    fn doctype(&mut self) -> Result<(), XmlError> {
        let start = self.location();
        let j = self.text.len();
        let end = find_closing_char(self.text, self.pos + 9, j, b'<', b'>');
        if end >= j {
            return Err(self.error_at(start, "Unterminated DOCTYPE declaration".to_string()));
        }
        let raw = self.text[self.pos + 9..end].to_string();
        self.advance(end + 1);
        if self.skip.is_some() || !self.stack.is_empty() || self.document.has_root() {
            return Err(self.error_at(start, "Misplaced DOCTYPE declaration".to_string()));
        }
        if self.document.has_doctype() {
            return Err(self.error_at(start, "Duplicate DOCTYPE declaration".to_string()));
        }
        self.document.set_doctype(XmlDocTypeDeclaration::from_raw(&raw));
        Ok(())
    }

    fn unknown_element(&mut self) -> Result<(), XmlError> {
        let start = self.location();
        let j = self.text.len();
        let end = find_closing_char(self.text, self.pos + 2, j, b'<', b'>');
        if end >= j {
            return Err(self.error_at(start, "Unterminated element".to_string()));
        }
        let body = &self.text[self.pos + 2..end];
        let split = find_next_space(body, 0, body.len());
        let name = body[..split].to_string();
        let parameters = trimmed_spaces(&body[split..]).to_string();
        self.advance(end + 1);
        if self.skip.is_some() || self.options.ignore_unknown_elements {
            return Ok(());
        }
        self.attach(XmlNode::Unknown(XmlUnknownElement {
            name,
            parameters,
            location: start,
        }))
    }

    fn processing_instructions(&mut self) -> Result<(), XmlError> {
        let start = self.location();
        let j = self.text.len();
        let end = find_token(self.text, self.pos + 2, j, "?>");
        if end >= j {
            return Err(self.error_at(
                start,
                "Unterminated processing instructions".to_string(),
            ));
        }
        let body = &self.text[self.pos + 2..end];
        let split = find_next_space(body, 0, body.len());
        let target = body[..split].to_string();
        let instructions = trimmed_spaces(&body[split..]).to_string();
        self.advance(end + 2);
        if target == "xml" {
            return self.xml_declaration(start, &instructions);
        }
        if self.skip.is_some() {
            return Ok(());
        }
        self.attach(XmlNode::ProcessingInstructions(XmlProcessingInstructions {
            target,
            instructions,
            location: start,
        }))
    }

    fn xml_declaration(&mut self, start: TextLocation, body: &str) -> Result<(), XmlError> {
        if self.skip.is_some()
            || !self.stack.is_empty()
            || self.document.has_root()
            || self.document.has_declaration()
        {
            return Err(self.error_at(start, "Misplaced XML declaration".to_string()));
        }
        let attributes = XmlAttributeList::parse(body)
            .map_err(|e| self.error_at(start, format!("Parsing XML declaration: {}", e)))?;
        let version = attributes
            .value("version")
            .ok_or_else(|| self.error_at(start, "Missing XML version".to_string()))?
            .to_string();
        let encoding = match attributes.value("encoding") {
            Some(e) if XmlDeclaration::KNOWN_ENCODINGS.contains(&e) => Some(e.to_string()),
            Some(e) => {
                return Err(self.error_at(
                    start,
                    format!("Unsupported document encoding '{}'", e),
                ))
            }
            None => None,
        };
        let standalone = match attributes.value("standalone") {
            Some("yes") => Some(true),
            Some("no") => Some(false),
            Some(s) => {
                return Err(self.error_at(
                    start,
                    format!("Invalid standalone document attribute value '{}'", s),
                ))
            }
            None => None,
        };
        self.document.set_declaration(XmlDeclaration {
            version,
            encoding,
            standalone,
        });
        Ok(())
    }

    fn end_tag(&mut self) -> Result<(), XmlError> {
        let start = self.location();
        let j = self.text.len();
        let i = self.pos + 2;
        let name_end = self.scan_name(i)?;
        let name = self.text[i..name_end].to_string();
        let gt = skip_whitespace(self.text, name_end, j);
        if gt >= j || self.text.as_bytes()[gt] != b'>' {
            return Err(self.error_at(start, format!("Malformed end-tag '</{}'", name)));
        }
        self.advance(gt + 1);
        if let Some(state) = &mut self.skip {
            if state.name == name {
                state.depth -= 1;
                if state.depth == 0 {
                    self.skip = None;
                }
            }
            return Ok(());
        }
        let open = match self.stack.pop() {
            Some(open) => open,
            None => {
                return Err(self.error_at(start, format!("Unexpected end-tag '</{}>'", name)))
            }
        };
        if open.name != name {
            return Err(self.error_at(
                start,
                format!(
                    "Unexpected end-tag '</{}>'; expecting '</{}>'",
                    name, open.name
                ),
            ));
        }
        self.attach(XmlNode::Element(open))
    }

    fn start_tag(&mut self) -> Result<(), XmlError> {
        let start = self.location();
        let j = self.text.len();
        let end = find_closing_char(self.text, self.pos + 1, j, b'<', b'>');
        if end >= j {
            return Err(self.error_at(start, "Unterminated start-tag".to_string()));
        }
        let self_closing = self.text.as_bytes()[end - 1] == b'/';
        let inner_end = if self_closing { end - 1 } else { end };
        let i = self.pos + 1;
        let name_end = self.scan_name(i)?;
        let name = self.text[i..name_end].to_string();
        if name_end < inner_end && !is_space(self.text.as_bytes()[name_end]) {
            return Err(self.error_at(
                start,
                format!("Invalid character in start-tag '<{}'", name),
            ));
        }
        let params = trimmed_spaces(&self.text[name_end..inner_end]).to_string();
        self.advance(end + 1);

        if let Some(state) = &mut self.skip {
            if state.name == name && !self_closing {
                state.depth += 1;
            }
            return Ok(());
        }
        if self.stack.is_empty() && self.document.has_root() {
            return Err(self.error_at(start, "Multiple root elements".to_string()));
        }

        // The filter sees the bare name first; only when that is accepted
        // are the attributes parsed and offered for the second decision.
        if let Some(filter) = self.filter.as_deref_mut() {
            if !filter.accept_name(&name) {
                return self.begin_skip(name, self_closing);
            }
        }
        let attributes = self.parse_attributes(start, &params)?;
        if let Some(filter) = self.filter.as_deref_mut() {
            if !filter.accept(&name, &attributes) {
                return self.begin_skip(name, self_closing);
            }
        }

        let element = XmlElement {
            name,
            attributes,
            children: Vec::new(),
            location: start,
        };
        if self_closing {
            self.attach(XmlNode::Element(element))
        } else {
            self.stack.push(element);
            Ok(())
        }
    }

    fn begin_skip(&mut self, name: String, self_closing: bool) -> Result<(), XmlError> {
        if !self_closing {
            self.skip = Some(SkipState { name, depth: 1 });
        }
        Ok(())
    }

    fn parse_attributes(
        &self,
        start: TextLocation,
        params: &str,
    ) -> Result<XmlAttributeList, XmlError> {
        XmlAttributeList::parse(params)
            .map_err(|e| self.error_at(start, format!("Parsing XML attribute list: {}", e)))
    }

    /// Scan an XML name starting at byte offset `i`; returns the end offset.
    fn scan_name(&self, i: usize) -> Result<usize, XmlError> {
        let rest = &self.text[i..];
        let first = rest.chars().next().unwrap_or('\0');
        if !is_name_start_char(first) {
            return Err(self.error(format!("Invalid name start character '{}'", first)));
        }
        for (k, c) in rest.char_indices().skip(1) {
            if !is_name_char(c) {
                return Ok(i + k);
            }
        }
        Ok(self.text.len())
    }
}

#[cfg(test)]
mod tests {
    use super::super::document::{XmlDocument, XmlParserOptions};
    use super::super::node::{XmlAttributeList, XmlNode};
    use super::super::XmlElementFilter;

    #[test]
    fn test_parse_minimal_document() {
        let doc = XmlDocument::parse("<root><a k=\"1\">hello</a><b/></root>").unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.children.len(), 2);
        let a = root.find_child_element("a").unwrap();
        assert_eq!(a.attribute_value("k"), Some("1"));
        assert_eq!(a.text(), "hello");
        assert!(root.find_child_element("b").unwrap().is_empty());
    }

    #[test]
    fn test_parse_declaration_and_doctype() {
        let doc = XmlDocument::parse(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <!DOCTYPE root SYSTEM \"root.dtd\">\n<root/>",
        )
        .unwrap();
        let decl = doc.declaration().unwrap();
        assert_eq!(decl.version, "1.0");
        assert_eq!(decl.encoding.as_deref(), Some("UTF-8"));
        assert_eq!(decl.standalone, Some(true));
        let doctype = doc.doctype().unwrap();
        assert_eq!(doctype.name, "root");
        assert_eq!(doctype.definition, "SYSTEM \"root.dtd\"");
    }

    #[test]
    fn test_rejects_unsupported_encoding() {
        let err = XmlDocument::parse("<?xml version=\"1.0\" encoding=\"EBCDIC\"?><r/>")
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported document encoding"), "{}", err);
    }

    #[test]
    fn test_rejects_mismatched_end_tag() {
        let err = XmlDocument::parse("<a><b></a></b>").unwrap_err();
        assert!(err.to_string().contains("Unexpected end-tag"), "{}", err);
    }

    #[test]
    fn test_rejects_unclosed_element() {
        let err = XmlDocument::parse("<a><b></b>").unwrap_err();
        assert!(err.to_string().contains("Missing end-tag"), "{}", err);
    }

    #[test]
    fn test_rejects_missing_root() {
        assert!(XmlDocument::parse("   \n  ").is_err());
        assert!(XmlDocument::parse("<!-- only a comment -->").is_err());
    }

    #[test]
    fn test_rejects_multiple_roots() {
        let err = XmlDocument::parse("<a/><b/>").unwrap_err();
        assert!(err.to_string().contains("Multiple root elements"), "{}", err);
    }

    #[test]
    fn test_stray_characters() {
        assert!(XmlDocument::parse("junk <a/>").is_err());
        let options = XmlParserOptions {
            ignore_stray_characters: true,
            ..Default::default()
        };
        assert!(XmlDocument::parse_with_options("junk <a/>", options).is_ok());
    }

    #[test]
    fn test_parse_error_carries_location() {
        let err = XmlDocument::parse("<a>\n  <b></c>\n</a>").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("line 2"), "{}", text);
    }

    #[test]
    fn test_cdata_requires_open_element() {
        assert!(XmlDocument::parse("<![CDATA[x]]><a/>").is_err());
        let doc = XmlDocument::parse("<a><![CDATA[1 < 2 & 3]]></a>").unwrap();
        let root = doc.root_element().unwrap();
        match &root.children[0] {
            XmlNode::CData(c) => assert_eq!(c.data, "1 < 2 & 3"),
            other => panic!("expected CDATA, got {:?}", other),
        }
    }

    #[test]
    fn test_comments_and_ignore_option() {
        let text = "<!-- before --><a><!-- inside --></a>";
        let doc = XmlDocument::parse(text).unwrap();
        assert_eq!(doc.root_element().unwrap().children.len(), 1);
        let options = XmlParserOptions {
            ignore_comments: true,
            ..Default::default()
        };
        let doc = XmlDocument::parse_with_options(text, options).unwrap();
        assert!(doc.root_element().unwrap().children.is_empty());
        assert_eq!(doc.nodes().len(), 1);
    }

    #[test]
    fn test_processing_instructions() {
        let doc = XmlDocument::parse("<?pi do things?><a/>").unwrap();
        match &doc.nodes()[0] {
            XmlNode::ProcessingInstructions(pi) => {
                assert_eq!(pi.target, "pi");
                assert_eq!(pi.instructions, "do things");
            }
            other => panic!("expected PI, got {:?}", other),
        }
    }

    #[test]
    fn test_misplaced_xml_declaration() {
        let err = XmlDocument::parse("<a/><?xml version=\"1.0\"?>").unwrap_err();
        assert!(err.to_string().contains("Misplaced XML declaration"), "{}", err);
    }

    #[test]
    fn test_unknown_declaration_nodes() {
        let doc = XmlDocument::parse("<a><!ENTITY thing \"v\"></a>").unwrap();
        match &doc.root_element().unwrap().children[0] {
            XmlNode::Unknown(u) => assert_eq!(u.name, "ENTITY"),
            other => panic!("expected unknown element, got {:?}", other),
        }
        let options = XmlParserOptions {
            ignore_unknown_elements: true,
            ..Default::default()
        };
        let doc =
            XmlDocument::parse_with_options("<a><!ENTITY thing \"v\"></a>", options).unwrap();
        assert!(doc.root_element().unwrap().children.is_empty());
    }

    #[test]
    fn test_text_entity_decoding() {
        let doc = XmlDocument::parse("<a>x &lt; y &amp; z</a>").unwrap();
        assert_eq!(doc.root_element().unwrap().text(), "x < y & z");
    }

    #[test]
    fn test_normalize_text_spaces_disabled() {
        let options = XmlParserOptions {
            normalize_text_spaces: false,
            ..Default::default()
        };
        let doc = XmlDocument::parse_with_options("<a>  padded  </a>", options).unwrap();
        assert_eq!(doc.root_element().unwrap().text(), "  padded  ");
    }

    struct RejectNamed(&'static str);

    impl XmlElementFilter for RejectNamed {
        fn accept(&mut self, name: &str, _attributes: &XmlAttributeList) -> bool {
            name != self.0
        }
    }

    #[test]
    fn test_element_filter_prunes_subtree() {
        let text = "<root><Keep>1</Keep><Drop><Drop>nested</Drop><x/></Drop><Tail/></root>";
        let mut filter = RejectNamed("Drop");
        let doc = XmlDocument::parse_with_filter(text, Default::default(), &mut filter).unwrap();
        let root = doc.root_element().unwrap();
        assert!(root.find_child_element("Drop").is_none());
        assert!(root.find_child_element("Keep").is_some());
        assert!(root.find_child_element("Tail").is_some());
        assert_eq!(root.children.len(), 2);
    }

    struct RejectByName(&'static str);

    impl XmlElementFilter for RejectByName {
        fn accept_name(&mut self, name: &str) -> bool {
            name != self.0
        }
        fn accept(&mut self, _name: &str, _attributes: &XmlAttributeList) -> bool {
            true
        }
    }

    #[test]
    fn test_element_filter_by_name_skips_attribute_parse() {
        // The rejected subtree carries a malformed attribute list; rejecting
        // on the name alone must skip it before attributes are parsed.
        let text = "<root><Drop bad=></Drop><Keep/></root>";
        let mut filter = RejectByName("Drop");
        let doc = XmlDocument::parse_with_filter(text, Default::default(), &mut filter).unwrap();
        assert!(doc.root_element().unwrap().find_child_element("Keep").is_some());
    }

    #[test]
    fn test_serialize_round_trip() {
        let text = "<root a=\"1\"><child b=\"x &amp; y\">text &lt;here&gt;</child><empty/></root>";
        let doc = XmlDocument::parse(text).unwrap();
        let serialized = doc.serialize();
        let doc2 = XmlDocument::parse(&serialized).unwrap();
        let r1 = doc.root_element().unwrap();
        let r2 = doc2.root_element().unwrap();
        assert_eq!(r1.name, r2.name);
        assert_eq!(r1.attributes, r2.attributes);
        let c1 = r1.find_child_element("child").unwrap();
        let c2 = r2.find_child_element("child").unwrap();
        assert_eq!(c1.attributes, c2.attributes);
        assert_eq!(c1.text(), c2.text());
        assert_eq!(c1.text(), "text <here>");
    }
}
