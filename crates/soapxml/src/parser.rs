/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Secure XML parser that builds XmlDocument trees.
 *
 * Comments are dropped, entity references are never substituted and the
 * DOCTYPE's declarations are only inspected. The policy in `Settings` is
 * enforced once the tree is built.
 */

use quick_xml::Reader;
use quick_xml::events::{BytesDecl, BytesStart, Event};
use soapxml_transport::Transport;

use crate::dtd::{self, DoctypeDecl, Dtd};
use crate::encoding::decode_content;
use crate::error::{Error, Result};
use crate::location::absolute_location;
use crate::resolver::{ImportResolver, TransportResolver};
use crate::settings::Settings;
use crate::types::{DocInfo, NamespaceDecl, XmlAttribute, XmlDocument, XmlElement, XmlNode};

/// The namespace bound to the reserved `xml` prefix.
const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Size and depth limits applied while building the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserLimits {
    /// Maximum element nesting depth.
    pub max_depth: usize,
    /// Maximum length in bytes of one text node or attribute value.
    pub max_text_length: usize,
    /// Maximum length in bytes of an element or attribute name.
    pub max_name_length: usize,
}

impl ParserLimits {
    pub const DEFAULT: ParserLimits = ParserLimits {
        max_depth: 256,
        max_text_length: 10_000_000,
        max_name_length: 50_000,
    };

    /// Limits used with `xml_huge_tree`.
    pub const HUGE: ParserLimits = ParserLimits {
        max_depth: 2048,
        max_text_length: 1_000_000_000,
        max_name_length: 10_000_000,
    };
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Per-call parser configuration derived from [`Settings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Recover from syntax errors instead of failing.
    pub recover: bool,
    pub limits: ParserLimits,
    /// Fetch the DOCTYPE's external subset through the resolver.
    pub load_external_dtd: bool,
}

impl ParserOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            recover: !settings.strict,
            limits: if settings.xml_huge_tree {
                ParserLimits::HUGE
            } else {
                ParserLimits::DEFAULT
            },
            load_external_dtd: !settings.forbid_dtd && !settings.forbid_external,
        }
    }
}

/// Parse `content` securely, resolving external references through `transport`.
///
/// `base_url` is the location `content` was loaded from; relative references
/// inside the document resolve against it.
///
/// # Example
///
/// ```rust
/// use soapxml::{Settings, StaticTransport, parse_xml};
///
/// let doc = parse_xml(b"<root><child/></root>", &StaticTransport::new(), None, &Settings::default())
///     .unwrap();
/// assert_eq!(doc.root.name, "root");
/// assert_eq!(doc.root.all_children().len(), 1);
/// ```
///
/// # Errors
///
/// [`Error::XmlSyntax`] for malformed content (only fatal ones when
/// `settings.strict` is false), [`Error::DtdForbidden`] and
/// [`Error::EntitiesForbidden`] for policy violations, and transport errors
/// from fetching an external DTD subset.
pub fn parse_xml<T: Transport + ?Sized>(
    content: &[u8],
    transport: &T,
    base_url: Option<&str>,
    settings: &Settings,
) -> Result<XmlDocument> {
    let resolver = TransportResolver::new(transport);
    parse_xml_with_resolver(content, &resolver, base_url, settings)
}

/// Parse `content` securely with a caller-supplied resolver.
pub fn parse_xml_with_resolver(
    content: &[u8],
    resolver: &dyn ImportResolver,
    base_url: Option<&str>,
    settings: &Settings,
) -> Result<XmlDocument> {
    let options = ParserOptions::from_settings(settings);
    let text = decode_content(content, options.recover)
        .map_err(|message| Error::syntax(message, content, None))?;

    let mut parser = XmlParser::new(&text, content, options);
    let (root, prolog) = parser.parse()?;

    let mut docinfo = DocInfo {
        root_name: root.qualified_name(),
        xml_version: prolog.xml_version,
        encoding: prolog.encoding,
        standalone: prolog.standalone,
        url: base_url.map(str::to_string),
        ..Default::default()
    };

    if let Some(doctype) = prolog.doctype {
        if settings.forbid_dtd {
            tracing::debug!(root = %doctype.root_name, "Rejecting document with DOCTYPE");
            return Err(Error::DtdForbidden {
                doctype: doctype.to_doctype_string(),
                system_url: doctype.system_id,
                public_id: doctype.public_id,
            });
        }

        if options.load_external_dtd {
            docinfo.external_dtd = load_external_dtd(&doctype, resolver, base_url, &options)?;
        }

        docinfo.doctype = Some(doctype.to_doctype_string());
        docinfo.system_url = doctype.system_id;
        docinfo.public_id = doctype.public_id;
        docinfo.internal_dtd = prolog.internal_dtd;
    }

    if settings.forbid_entities {
        let subsets = [&docinfo.internal_dtd, &docinfo.external_dtd];
        let first = subsets
            .into_iter()
            .flatten()
            .find_map(|dtd| dtd.iter_entities().next());
        if let Some(entity) = first {
            tracing::debug!(entity = %entity.name, "Rejecting document with entity declaration");
            return Err(Error::EntitiesForbidden {
                name: entity.name.clone(),
                content: entity.content().map(str::to_string),
            });
        }
    }

    Ok(XmlDocument { root, docinfo })
}

/// Fetch and parse the external subset named by `doctype`, if the resolver serves it.
fn load_external_dtd(
    doctype: &DoctypeDecl,
    resolver: &dyn ImportResolver,
    base_url: Option<&str>,
    options: &ParserOptions,
) -> Result<Option<Dtd>> {
    let Some(system_id) = &doctype.system_id else {
        return Ok(None);
    };
    let url = absolute_location(system_id, base_url);
    let Some(bytes) = resolver.resolve(&url, doctype.public_id.as_deref())? else {
        tracing::debug!(url = %url, "External DTD subset not loaded");
        return Ok(None);
    };

    let text = decode_content(&bytes, options.recover)
        .map_err(|message| Error::syntax(message, &bytes, None))?;
    let subset = strip_text_declaration(&text);
    let dtd = Dtd::parse(subset).map_err(|err| {
        Error::syntax(
            format!("{} in external subset {}", err.message, url),
            &bytes,
            Some(err.offset as u64),
        )
    })?;
    Ok(Some(dtd))
}

/// Drop the `<?xml ...?>` text declaration an external subset may start with.
fn strip_text_declaration(subset: &str) -> &str {
    match subset.strip_prefix("<?xml") {
        Some(rest) if rest.starts_with(char::is_whitespace) => match rest.find("?>") {
            Some(end) => &rest[end + 2..],
            None => subset,
        },
        _ => subset,
    }
}

/// What the prolog declared.
#[derive(Debug, Default)]
struct Prolog {
    xml_version: Option<String>,
    encoding: Option<String>,
    standalone: Option<bool>,
    doctype: Option<DoctypeDecl>,
    internal_dtd: Option<Dtd>,
}

/// A piece of character data after reference decoding.
enum Segment {
    Text(String),
    EntityRef(String),
}

/// Internal parser state.
struct XmlParser<'a> {
    /// The raw bytes handed to the parser, for error reporting.
    content: &'a [u8],

    /// The decoded text.
    text: &'a str,

    /// The quick-xml reader over a slice of `text` starting at `offset`.
    reader: Reader<&'a [u8]>,

    offset: u64,

    /// Where a prolog DOCTYPE starts; the reader stops short of it.
    doctype_at: Option<usize>,

    options: ParserOptions,

    /// Stack of elements being built, with their names as written.
    stack: Vec<(String, XmlElement)>,

    root: Option<XmlElement>,

    prolog: Prolog,
}

impl<'a> XmlParser<'a> {
    fn new(text: &'a str, content: &'a [u8], options: ParserOptions) -> Self {
        // quick-xml ends a DOCTYPE at the first unbalanced '>', even inside a
        // quoted literal, so the DTD scanner reads it and the reader restarts after.
        let doctype_at = prolog_doctype(text);
        let prolog = &text[..doctype_at.unwrap_or(text.len())];

        Self {
            content,
            text,
            reader: new_reader(prolog),
            offset: 0,
            doctype_at,
            options,
            stack: Vec::new(),
            root: None,
            prolog: Prolog::default(),
        }
    }

    fn parse(&mut self) -> Result<(XmlElement, Prolog)> {
        loop {
            let position = self.position();

            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(err) => {
                    let error_position = self.offset + self.reader.error_position();
                    if self.options.recover {
                        tracing::debug!(position = error_position, error = %err, "Recovering from XML syntax error");
                        break;
                    }
                    return Err(self.error(err.to_string(), error_position));
                }
            };

            match event {
                Event::Start(e) => {
                    if !self.accept_element(position)? {
                        break;
                    }
                    let element = self.open_element(&e, position)?;
                    self.push(element, position)?;
                }
                Event::Empty(e) => {
                    if !self.accept_element(position)? {
                        break;
                    }
                    let element = self.open_element(&e, position)?;
                    self.push(element, position)?;
                    self.close_top();
                }
                Event::End(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    self.handle_end(&name, position)?;
                }
                Event::Text(e) => {
                    let raw = String::from_utf8_lossy(&e).into_owned();
                    if !self.handle_text(&raw, position)? {
                        break;
                    }
                }
                Event::CData(e) => {
                    let raw = String::from_utf8_lossy(&e).into_owned();
                    self.check_chars(&raw, "CData section", position)?;
                    if self.stack.is_empty() {
                        if !self.handle_stray_text(&raw, position)? {
                            break;
                        }
                    } else {
                        self.append_text(raw, position)?;
                    }
                }
                Event::PI(e) => {
                    if let Some((_, parent)) = self.stack.last_mut() {
                        let target = String::from_utf8_lossy(e.target()).into_owned();
                        let data = String::from_utf8_lossy(e.content()).trim_start().to_string();
                        parent
                            .children
                            .push(XmlNode::ProcessingInstruction { target, data });
                    }
                }
                Event::Decl(e) => self.handle_decl(&e),
                Event::DocType(e) => {
                    let raw = String::from_utf8_lossy(&e).into_owned();
                    self.handle_doctype(&raw, position)?;
                }
                Event::Comment(_) => {}
                Event::Eof => match self.doctype_at.take() {
                    Some(start) => self.read_prolog_doctype(start)?,
                    None => break,
                },
            }
        }

        if let Some(name) = self.stack.last().map(|(name, _)| name.clone()) {
            if !self.options.recover {
                let message = format!("Premature end of data in tag {}", name);
                return Err(self.error(message, self.position()));
            }
            tracing::debug!(open = self.stack.len(), "Closing unclosed elements at end of input");
            while !self.stack.is_empty() {
                self.close_top();
            }
        }

        let root = self
            .root
            .take()
            .ok_or_else(|| Error::syntax("Document is empty", self.content, None))?;
        Ok((root, std::mem::take(&mut self.prolog)))
    }

    /// Position of the reader in the decoded text.
    fn position(&self) -> u64 {
        self.offset + self.reader.buffer_position()
    }

    fn error(&self, message: impl Into<String>, position: u64) -> Error {
        Error::syntax(message, self.content, Some(position))
    }

    /// Whether a new element may start here; `false` ends a recovering parse.
    fn accept_element(&self, position: u64) -> Result<bool> {
        if self.stack.is_empty() && self.root.is_some() {
            if !self.options.recover {
                return Err(self.error("Extra content at the end of the document", position));
            }
            tracing::debug!(position, "Ignoring content after the root element");
            return Ok(false);
        }
        Ok(true)
    }

    /// Length limit in both modes; `invalid` reports a malformed name when strict.
    fn check_name(&self, name: &str, invalid: &str, position: u64) -> Result<()> {
        if name.len() > self.options.limits.max_name_length {
            return Err(self.error("Name too long", position));
        }
        if self.options.recover {
            return Ok(());
        }

        let mut chars = name.chars();
        if !(chars.next().is_some_and(dtd::is_name_start_char) && chars.all(dtd::is_name_char)) {
            return Err(self.error(invalid, position));
        }
        if name.split(':').count() > 2 || name.starts_with(':') || name.ends_with(':') {
            return Err(self.error(format!("Failed to parse QName '{}'", name), position));
        }
        Ok(())
    }

    /// Reject characters outside the XML `Char` production when strict.
    fn check_chars(&self, raw: &str, context: &str, position: u64) -> Result<()> {
        if self.options.recover {
            return Ok(());
        }
        match raw.chars().find(|&c| !is_xml_char(c)) {
            Some(c) => {
                let message = format!("{} invalid Char value {}", context, c as u32);
                Err(self.error(message, position))
            }
            None => Ok(()),
        }
    }

    fn open_element(&self, start: &BytesStart<'_>, position: u64) -> Result<(String, XmlElement)> {
        let qname = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        self.check_name(&qname, "StartTag: invalid element name", position)?;
        if !self.options.recover && !attributes_are_separated(start) {
            return Err(self.error("attributes construct error", position));
        }
        let (prefix, name) = split_qname(&qname);

        let mut declarations = Vec::new();
        let mut raw_attributes = Vec::new();
        for attr in start.attributes() {
            let attr = match attr {
                Ok(attr) => attr,
                Err(err) if self.options.recover => {
                    tracing::debug!(element = %qname, error = %err, "Dropping malformed attributes");
                    break;
                }
                Err(err) => return Err(self.error(err.to_string(), position)),
            };
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            self.check_name(&key, "error parsing attribute name", position)?;
            let value = self.attribute_value(&String::from_utf8_lossy(&attr.value), position)?;

            if key == "xmlns" {
                declarations.push(NamespaceDecl {
                    prefix: None,
                    uri: value,
                });
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                declarations.push(NamespaceDecl {
                    prefix: Some(prefix.to_string()),
                    uri: value,
                });
            } else {
                raw_attributes.push((key, value));
            }
        }

        // Redeclaring a binding already in scope adds nothing.
        declarations.retain(|decl| {
            self.lookup_namespace(&[], decl.prefix.as_deref()).as_deref() != Some(decl.uri.as_str())
        });

        let namespace = self.lookup_namespace(&declarations, prefix);
        if namespace.is_none() && prefix.is_some() {
            tracing::debug!(element = %qname, "Namespace prefix is not defined");
        }

        let attributes = raw_attributes
            .into_iter()
            .map(|(key, value)| {
                let (prefix, name) = split_qname(&key);
                XmlAttribute {
                    name: name.to_string(),
                    prefix: prefix.map(str::to_string),
                    namespace: prefix.and_then(|p| self.lookup_namespace(&declarations, Some(p))),
                    value,
                }
            })
            .collect();

        let element = XmlElement {
            name: name.to_string(),
            prefix: prefix.map(str::to_string),
            namespace,
            namespaces: declarations,
            attributes,
            children: Vec::new(),
        };
        Ok((qname, element))
    }

    /// URI bound to `prefix`, looking at `own` first and then the open elements.
    fn lookup_namespace(&self, own: &[NamespaceDecl], prefix: Option<&str>) -> Option<String> {
        if prefix == Some("xml") {
            return Some(XML_NAMESPACE.to_string());
        }
        own.iter()
            .chain(self.stack.iter().rev().flat_map(|(_, e)| e.namespaces.iter()))
            .find(|decl| decl.prefix.as_deref() == prefix)
            .map(|decl| decl.uri.clone())
            .filter(|uri| !uri.is_empty())
    }

    fn attribute_value(&self, raw: &str, position: u64) -> Result<String> {
        if raw.len() > self.options.limits.max_text_length {
            return Err(self.error("AttValue length too long", position));
        }
        if raw.contains('<') && !self.options.recover {
            return Err(self.error("Unescaped '<' not allowed in attributes values", position));
        }
        self.check_chars(raw, "AttValue:", position)?;
        let normalized = raw.replace(['\t', '\n', '\r'], " ");
        let value = self
            .decode_references(&normalized, position)?
            .into_iter()
            .map(|segment| match segment {
                Segment::Text(text) => text,
                Segment::EntityRef(name) => format!("&{};", name),
            })
            .collect();
        Ok(value)
    }

    fn push(&mut self, element: (String, XmlElement), position: u64) -> Result<()> {
        if self.stack.len() >= self.options.limits.max_depth {
            let message = format!(
                "Excessive depth in document: {} use XML_PARSE_HUGE option",
                self.stack.len() + 1
            );
            return Err(self.error(message, position));
        }
        self.stack.push(element);
        Ok(())
    }

    fn close_top(&mut self) {
        let Some((_, element)) = self.stack.pop() else {
            return;
        };
        match self.stack.last_mut() {
            Some((_, parent)) => parent.children.push(XmlNode::Element(element)),
            None => self.root = Some(element),
        }
    }

    fn handle_end(&mut self, name: &str, position: u64) -> Result<()> {
        let Some((open, _)) = self.stack.last() else {
            if !self.options.recover {
                let message = format!("Unexpected end tag : {}", name);
                return Err(self.error(message, position));
            }
            tracing::debug!(tag = %name, "Ignoring unmatched end tag");
            return Ok(());
        };

        if open == name {
            self.close_top();
            return Ok(());
        }

        if !self.options.recover {
            let message = format!("Opening and ending tag mismatch: {} and {}", open, name);
            return Err(self.error(message, position));
        }

        match self.stack.iter().rposition(|(open, _)| open == name) {
            Some(index) => {
                tracing::debug!(tag = %name, unclosed = self.stack.len() - index - 1, "Closing back to matching ancestor");
                while self.stack.len() > index {
                    self.close_top();
                }
            }
            None => tracing::debug!(tag = %name, "Ignoring unmatched end tag"),
        }
        Ok(())
    }

    /// Returns `false` when a recovering parse should stop.
    fn handle_text(&mut self, raw: &str, position: u64) -> Result<bool> {
        if self.stack.is_empty() {
            return self.handle_stray_text(raw, position);
        }
        if !self.options.recover && raw.contains("]]>") {
            return Err(self.error("Sequence ']]>' not allowed in content", position));
        }
        self.check_chars(raw, "PCDATA", position)?;
        for segment in self.decode_references(raw, position)? {
            match segment {
                Segment::Text(text) => self.append_text(text, position)?,
                Segment::EntityRef(name) => {
                    if let Some((_, parent)) = self.stack.last_mut() {
                        parent.children.push(XmlNode::EntityRef(name));
                    }
                }
            }
        }
        Ok(true)
    }

    /// Character data outside the root element; only whitespace is allowed.
    fn handle_stray_text(&self, raw: &str, position: u64) -> Result<bool> {
        if raw.trim().is_empty() {
            return Ok(true);
        }
        let message = if self.root.is_some() {
            "Extra content at the end of the document"
        } else {
            "Start tag expected, '<' not found"
        };
        if !self.options.recover {
            return Err(self.error(message, position));
        }
        tracing::debug!(position, "Ignoring character data outside the root element");
        Ok(self.root.is_none())
    }

    /// Append text to the open element, merging with a preceding text node.
    fn append_text(&mut self, text: String, position: u64) -> Result<()> {
        let max = self.options.limits.max_text_length;
        let Some((_, parent)) = self.stack.last_mut() else {
            return Ok(());
        };
        let length = match parent.children.last_mut() {
            Some(XmlNode::Text(existing)) => {
                existing.push_str(&text);
                existing.len()
            }
            _ => {
                let length = text.len();
                parent.children.push(XmlNode::Text(text));
                length
            }
        };
        if length > max {
            return Err(self.error("xmlSAX2Characters: huge text node", position));
        }
        Ok(())
    }

    /// Decode predefined entities and character references; keep other
    /// references as [`Segment::EntityRef`].
    fn decode_references(&self, raw: &str, position: u64) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut rest = raw;

        while let Some(amp) = rest.find('&') {
            text.push_str(&rest[..amp]);
            let after = &rest[amp + 1..];
            let reference = after
                .find(';')
                .map(|end| &after[..end])
                .filter(|r| is_reference(r));

            let Some(reference) = reference else {
                if !self.options.recover {
                    return Err(self.error("EntityRef: expecting ';'", position));
                }
                text.push('&');
                rest = after;
                continue;
            };
            rest = &after[reference.len() + 1..];

            if let Some(number) = reference.strip_prefix('#') {
                match char_reference(number) {
                    Some(c) => text.push(c),
                    None if self.options.recover => {
                        tracing::debug!(reference, "Dropping invalid character reference");
                    }
                    None => {
                        let message = format!("xmlParseCharRef: invalid xmlChar value {}", number);
                        return Err(self.error(message, position));
                    }
                }
            } else if let Some(c) = predefined_entity(reference) {
                text.push(c);
            } else {
                if !self.options.recover && self.prolog.doctype.is_none() {
                    let message = format!("Entity '{}' not defined", reference);
                    return Err(self.error(message, position));
                }
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::EntityRef(reference.to_string()));
            }
        }

        text.push_str(rest);
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        Ok(segments)
    }

    fn handle_decl(&mut self, decl: &BytesDecl<'_>) {
        let text = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();
        self.prolog.xml_version = decl.version().ok().map(|v| text(&v));
        self.prolog.encoding = decl.encoding().and_then(|e| e.ok()).map(|e| text(&e));
        self.prolog.standalone = decl
            .standalone()
            .and_then(|s| s.ok())
            .map(|s| s.as_ref() == b"yes");
    }

    /// Read the DOCTYPE at `start` and continue with the text after it.
    fn read_prolog_doctype(&mut self, start: usize) -> Result<()> {
        let text = self.text;
        let (doctype, length) = dtd::scan_doctype(&text[start..])
            .map_err(|err| self.error(err.message, (start + err.offset) as u64))?;
        self.record_doctype(doctype, start as u64)?;

        let end = start + length;
        self.reader = new_reader(&text[end..]);
        self.offset = end as u64;
        Ok(())
    }

    /// A DOCTYPE the reader met outside the prolog scan.
    fn handle_doctype(&mut self, raw: &str, position: u64) -> Result<()> {
        if self.root.is_some() || !self.stack.is_empty() || self.prolog.doctype.is_some() {
            if !self.options.recover {
                return Err(self.error("Misplaced DOCTYPE declaration", position));
            }
            tracing::debug!(position, "Ignoring misplaced DOCTYPE declaration");
            return Ok(());
        }

        let doctype = dtd::parse_doctype(raw).map_err(|err| self.error(err.message, position))?;
        self.record_doctype(doctype, position)
    }

    fn record_doctype(&mut self, doctype: DoctypeDecl, position: u64) -> Result<()> {
        // A malformed DTD is fatal in both modes so policy checks see all of it.
        let internal_dtd = match &doctype.internal_subset {
            Some(subset) => Some(Dtd::parse(subset).map_err(|err| self.error(err.message, position))?),
            None => None,
        };

        tracing::debug!(root = %doctype.root_name, system_id = ?doctype.system_id, "Found DOCTYPE");
        self.prolog.doctype = Some(doctype);
        self.prolog.internal_dtd = internal_dtd;
        Ok(())
    }
}

fn new_reader(text: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(text);
    let config = reader.config_mut();
    config.trim_text_start = false;
    config.trim_text_end = false;
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    reader
}

/// Offset of a `<!DOCTYPE` preceded only by the XML declaration, comments,
/// processing instructions and whitespace.
fn prolog_doctype(text: &str) -> Option<usize> {
    let mut pos = 0;
    loop {
        let rest = &text[pos..];
        let trimmed = rest.trim_start_matches([' ', '\t', '\r', '\n']);
        pos += rest.len() - trimmed.len();

        if trimmed.starts_with("<!DOCTYPE") {
            return Some(pos);
        }
        let (open, close) = if trimmed.starts_with("<!--") {
            ("<!--", "-->")
        } else if trimmed.starts_with("<?") {
            ("<?", "?>")
        } else {
            return None;
        };
        pos += open.len() + trimmed[open.len()..].find(close)? + close.len();
    }
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

/// `#123`, `#x1F` or an entity name.
fn is_reference(reference: &str) -> bool {
    if let Some(number) = reference.strip_prefix('#') {
        return match number.strip_prefix('x') {
            Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
            None => !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()),
        };
    }
    let mut chars = reference.chars();
    chars.next().is_some_and(dtd::is_name_start_char) && chars.all(dtd::is_name_char)
}

fn char_reference(number: &str) -> Option<char> {
    let value = match number.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => number.parse::<u32>().ok()?,
    };
    char::from_u32(value).filter(|&c| is_xml_char(c))
}

/// The XML 1.0 `Char` production; surrogates cannot occur in a `char`.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

/// Whether every quoted attribute value in the tag is followed by whitespace
/// or the end of the tag.
fn attributes_are_separated(tag: &[u8]) -> bool {
    let mut quote = None;
    let mut bytes = tag.iter().peekable();
    while let Some(&b) = bytes.next() {
        match quote {
            Some(q) if b == q => {
                quote = None;
                if bytes
                    .peek()
                    .is_some_and(|&&next| !matches!(next, b' ' | b'\t' | b'\r' | b'\n'))
                {
                    return false;
                }
            }
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None => {}
        }
    }
    true
}

fn predefined_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "apos" => Some('\''),
        "quot" => Some('"'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soapxml_transport::StaticTransport;

    fn parse(content: &str) -> Result<XmlDocument> {
        parse_with(content, &Settings::default())
    }

    fn parse_with(content: &str, settings: &Settings) -> Result<XmlDocument> {
        parse_xml(content.as_bytes(), &StaticTransport::new(), None, settings)
    }

    fn lenient() -> Settings {
        Settings::default().with_strict(false)
    }

    fn syntax_message(err: Error) -> String {
        match err {
            Error::XmlSyntax { message, .. } => message,
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_structure() {
        let doc = parse(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<definitions name="svc">
  <!-- a comment -->
  <types><schema/></types>
  <message name="m">text</message>
</definitions>"#,
        )
        .unwrap();

        assert_eq!(doc.root.name, "definitions");
        assert_eq!(doc.root.get_attribute("name"), Some("svc"));
        let names: Vec<_> = doc.root.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["types", "message"]);
        assert_eq!(doc.root.get_children("message")[0].text(), Some("text"));

        assert_eq!(doc.docinfo.root_name, "definitions");
        assert_eq!(doc.docinfo.xml_version.as_deref(), Some("1.0"));
        assert_eq!(doc.docinfo.encoding.as_deref(), Some("UTF-8"));
        assert_eq!(doc.docinfo.standalone, Some(true));
        assert!(!doc.docinfo.has_doctype());
    }

    #[test]
    fn test_comments_are_stripped_and_text_merged() {
        let doc = parse("<a>x<!-- gone -->y<![CDATA[<z>]]></a>").unwrap();
        assert_eq!(doc.root.children, vec![XmlNode::Text("xy<z>".to_string())]);
    }

    #[test]
    fn test_predefined_and_character_references() {
        let doc = parse(r#"<a b="&lt;&#65;&#x42;">&amp;&#x263A;&quot;</a>"#).unwrap();
        assert_eq!(doc.root.get_attribute("b"), Some("<AB"));
        assert_eq!(doc.root.text(), Some("&\u{263A}\""));
    }

    #[test]
    fn test_attribute_whitespace_is_normalized() {
        let doc = parse("<a b=\"x\ty\nz&#10;\"/>").unwrap();
        assert_eq!(doc.root.get_attribute("b"), Some("x y z\n"));
    }

    #[test]
    fn test_custom_entity_references_are_not_expanded() {
        let settings = Settings::default().with_forbid_entities(false);
        let doc = parse_with(
            r#"<!DOCTYPE a [<!ENTITY custom "expanded">]><a v="&custom;">x&custom;y</a>"#,
            &settings,
        )
        .unwrap();

        assert_eq!(
            doc.root.children,
            vec![
                XmlNode::Text("x".to_string()),
                XmlNode::EntityRef("custom".to_string()),
                XmlNode::Text("y".to_string()),
            ]
        );
        assert_eq!(doc.root.get_attribute("v"), Some("&custom;"));
        assert_eq!(doc.root.text_content(), "xy");
    }

    #[test]
    fn test_undefined_entity_without_doctype() {
        let err = parse("<a>&nope;</a>").unwrap_err();
        insta::assert_snapshot!(syntax_message(err), @"Entity 'nope' not defined");

        let doc = parse_with("<a>&nope;</a>", &lenient()).unwrap();
        assert_eq!(doc.root.children, vec![XmlNode::EntityRef("nope".to_string())]);
    }

    #[test]
    fn test_processing_instructions_inside_root() {
        let doc = parse("<a><?target some data?></a>").unwrap();
        assert_eq!(
            doc.root.children,
            vec![XmlNode::ProcessingInstruction {
                target: "target".to_string(),
                data: "some data".to_string(),
            }]
        );
    }

    #[test]
    fn test_empty_document_is_always_an_error() {
        for content in ["", "   \n", "<!-- only a comment -->"] {
            let err = parse(content).unwrap_err();
            assert_eq!(syntax_message(err), "Document is empty");
            assert!(parse_with(content, &lenient()).is_err());
        }
    }

    #[test]
    fn test_mismatched_tags() {
        let err = parse("<a><b></a>").unwrap_err();
        match &err {
            Error::XmlSyntax { position, content, .. } => {
                assert_eq!(*position, Some(6));
                assert_eq!(content, b"<a><b></a>");
            }
            other => panic!("unexpected error {other:?}"),
        }
        insta::assert_snapshot!(err.to_string(), @"Invalid XML content received (Opening and ending tag mismatch: b and a)");

        let doc = parse_with("<a><b><c></a>", &lenient()).unwrap();
        let b = &doc.root.get_children("b")[0];
        assert_eq!(b.get_children("c").len(), 1);
    }

    #[test]
    fn test_recovery_closes_unclosed_elements() {
        let err = parse("<a><b>text").unwrap_err();
        assert_eq!(syntax_message(err), "Premature end of data in tag b");

        let doc = parse_with("<a><b>text", &lenient()).unwrap();
        assert_eq!(doc.root.get_children("b")[0].text(), Some("text"));
    }

    #[test]
    fn test_recovery_ignores_stray_end_tags() {
        let doc = parse_with("<a></x><b/></a>", &lenient()).unwrap();
        assert_eq!(doc.root.all_children().len(), 1);
    }

    #[test]
    fn test_content_after_root() {
        let err = parse("<a/><b/>").unwrap_err();
        assert_eq!(syntax_message(err), "Extra content at the end of the document");
        let err = parse("<a/>trailing").unwrap_err();
        assert_eq!(syntax_message(err), "Extra content at the end of the document");

        let doc = parse_with("<a/><b/>", &lenient()).unwrap();
        assert_eq!(doc.root.name, "a");
    }

    #[test]
    fn test_reader_errors() {
        assert!(parse("<a><b").is_err());

        let doc = parse_with("<a><b/><c", &lenient()).unwrap();
        assert_eq!(doc.root.get_children("b").len(), 1);
    }

    #[test]
    fn test_duplicate_attribute() {
        assert!(parse(r#"<a x="1" x="2"/>"#).is_err());
        let doc = parse_with(r#"<a y="0" x="1" x="2"/>"#, &lenient()).unwrap();
        assert_eq!(doc.root.get_attribute("y"), Some("0"));
    }

    #[test]
    fn test_depth_limit() {
        let depth = ParserLimits::DEFAULT.max_depth + 1;
        let content = format!("{}{}", "<a>".repeat(depth), "</a>".repeat(depth));

        let err = parse(&content).unwrap_err();
        assert!(syntax_message(err).starts_with("Excessive depth in document"));
        assert!(parse_with(&content, &lenient()).is_err());

        let huge = Settings::default().with_xml_huge_tree(true);
        assert!(parse_with(&content, &huge).is_ok());
    }

    #[test]
    fn test_options_from_settings() {
        let options = ParserOptions::from_settings(&Settings::default());
        assert!(!options.recover);
        assert_eq!(options.limits, ParserLimits::DEFAULT);
        assert!(!options.load_external_dtd);

        let settings = Settings::default()
            .with_strict(false)
            .with_xml_huge_tree(true)
            .with_forbid_external(false);
        let options = ParserOptions::from_settings(&settings);
        assert!(options.recover);
        assert_eq!(options.limits, ParserLimits::HUGE);
        assert!(options.load_external_dtd);

        let options = ParserOptions::from_settings(&settings.with_forbid_dtd(true));
        assert!(!options.load_external_dtd);
    }

    #[test]
    fn test_namespaces() {
        let doc = parse(
            r#"<a xmlns="urn:default" xmlns:p="urn:p">
  <p:b xmlns:p="urn:p" p:attr="1" plain="2"/>
  <c xmlns:q="urn:q"/>
  <d xmlns=""/>
  <p:e xmlns:p="urn:other"/>
</a>"#,
        )
        .unwrap();

        let root = &doc.root;
        assert_eq!(root.namespace.as_deref(), Some("urn:default"));
        assert_eq!(root.namespaces.len(), 2);

        let b = root.find("b").unwrap();
        assert_eq!(b.prefix.as_deref(), Some("p"));
        assert_eq!(b.namespace.as_deref(), Some("urn:p"));
        assert!(b.namespaces.is_empty());
        assert_eq!(b.attributes[0].namespace.as_deref(), Some("urn:p"));
        assert_eq!(b.attributes[1].namespace, None);
        assert_eq!(b.get_attribute_ns("urn:p", "attr"), Some("1"));

        let c = root.find("c").unwrap();
        assert_eq!(c.namespace.as_deref(), Some("urn:default"));
        assert_eq!(c.namespaces.len(), 1);

        assert_eq!(root.find("d").unwrap().namespace, None);

        let e = root.find("e").unwrap();
        assert_eq!(e.namespace.as_deref(), Some("urn:other"));
        assert_eq!(e.namespaces.len(), 1);
    }

    #[test]
    fn test_undeclared_prefix_is_tolerated() {
        let doc = parse(r#"<x:a xml:lang="en"/>"#).unwrap();
        assert_eq!(doc.root.namespace, None);
        assert_eq!(
            doc.root.get_attribute_ns(XML_NAMESPACE, "lang"),
            Some("en")
        );
    }

    #[test]
    fn test_doctype_is_recorded() {
        let settings = Settings::default();
        let doc = parse_with(
            r#"<!DOCTYPE definitions SYSTEM "http://example.com/wsdl.dtd"><definitions/>"#,
            &settings,
        )
        .unwrap();

        assert_eq!(
            doc.docinfo.doctype.as_deref(),
            Some(r#"<!DOCTYPE definitions SYSTEM "http://example.com/wsdl.dtd">"#)
        );
        assert_eq!(doc.docinfo.system_url.as_deref(), Some("http://example.com/wsdl.dtd"));
        assert!(doc.docinfo.external_dtd.is_none());
    }

    #[test]
    fn test_forbid_dtd() {
        let settings = Settings::default().with_forbid_dtd(true);
        let err = parse_with(
            r#"<!DOCTYPE a PUBLIC "-//X//EN" "http://example.com/a.dtd"><a/>"#,
            &settings,
        )
        .unwrap_err();

        match err {
            Error::DtdForbidden {
                doctype,
                system_url,
                public_id,
            } => {
                assert!(doctype.starts_with("<!DOCTYPE a PUBLIC"));
                assert_eq!(system_url.as_deref(), Some("http://example.com/a.dtd"));
                assert_eq!(public_id.as_deref(), Some("-//X//EN"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_forbid_entities_reports_first_entity() {
        let err = parse(
            r#"<!DOCTYPE a [
  <!ENTITY lol "lol">
  <!ENTITY lol1 "&lol;&lol;">
]><a>&lol1;</a>"#,
        )
        .unwrap_err();

        match err {
            Error::EntitiesForbidden { name, content } => {
                assert_eq!(name, "lol");
                assert_eq!(content.as_deref(), Some("lol"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_external_entity_declaration_is_rejected() {
        let err = parse(r#"<!DOCTYPE a [<!ENTITY xxe SYSTEM "file:///etc/passwd">]><a>&xxe;</a>"#)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::EntitiesForbidden { ref name, content: None } if name == "xxe"
        ));
    }

    #[test]
    fn test_malformed_internal_subset_is_fatal_when_recovering() {
        let err = parse_with(r#"<!DOCTYPE a [<!ENTITY broken "x>]><a/>"#, &lenient()).unwrap_err();
        assert!(matches!(err, Error::XmlSyntax { .. }));
    }

    #[test]
    fn test_internal_subset_may_contain_markup_characters() {
        let cases = [
            (r#"<!ENTITY x "a>b">"#, Some("x")),
            (r#"<!ATTLIST a n CDATA "x > y">"#, None),
            (r#"<!-- a > b -->"#, None),
        ];
        for (subset, entity) in cases {
            let content = format!("<?xml version=\"1.0\"?>\n<!DOCTYPE a [{subset}]>\n<a>text</a>");

            match (parse(&content), entity) {
                (Err(Error::EntitiesForbidden { name, .. }), Some(expected)) => assert_eq!(name, expected),
                (Ok(doc), None) => assert_eq!(doc.root.text(), Some("text")),
                (other, _) => panic!("unexpected result for {subset}: {other:?}"),
            }

            for settings in [
                Settings::default().with_forbid_entities(false),
                lenient().with_forbid_entities(false),
            ] {
                let doc = parse_with(&content, &settings).unwrap();
                assert_eq!(doc.root.text(), Some("text"));
                assert_eq!(doc.docinfo.xml_version.as_deref(), Some("1.0"));
                let dtd = doc.docinfo.internal_dtd.unwrap();
                assert_eq!(dtd.iter_entities().count(), usize::from(entity.is_some()));
            }
        }

        let err = parse(r#"<!DOCTYPE a [<!ENTITY x "a>b">]><a/>"#).unwrap_err();
        assert!(matches!(
            err,
            Error::EntitiesForbidden { ref name, content: Some(ref content) } if name == "x" && content == "a>b"
        ));
    }

    #[test]
    fn test_positions_after_doctype_are_absolute() {
        let settings = Settings::default().with_forbid_entities(false);
        let err = parse_with(r#"<!DOCTYPE a [<!ENTITY x "a>b">]><a><b></a>"#, &settings).unwrap_err();
        match err {
            Error::XmlSyntax { position, .. } => assert_eq!(position, Some(38)),
            other => panic!("unexpected error {other:?}"),
        }

        let err = parse("<a/><!DOCTYPE a>").unwrap_err();
        assert_eq!(syntax_message(err), "Misplaced DOCTYPE declaration");
    }

    #[test]
    fn test_strict_mode_rejects_malformed_names() {
        let message = |content| syntax_message(parse(content).unwrap_err());
        assert_eq!(message("<1a/>"), "StartTag: invalid element name");
        assert_eq!(message("<a 1b='x'/>"), "error parsing attribute name");
        assert_eq!(message("<a:b:c/>"), "Failed to parse QName 'a:b:c'");
        assert_eq!(message("<a x:y:z='1'/>"), "Failed to parse QName 'x:y:z'");

        let doc = parse_with("<a:b:c/>", &lenient()).unwrap();
        assert_eq!(doc.root.name, "b:c");
    }

    #[test]
    fn test_strict_mode_requires_space_between_attributes() {
        let err = parse("<a b='1'c='2'/>").unwrap_err();
        assert_eq!(syntax_message(err), "attributes construct error");
        assert!(parse("<a b=\"it's\"\tc='2' />").is_ok());

        let doc = parse_with("<a b='1'c='2'/>", &lenient()).unwrap();
        assert_eq!(doc.root.get_attribute("b"), Some("1"));
    }

    #[test]
    fn test_strict_mode_rejects_illegal_character_data() {
        let message = |content| syntax_message(parse(content).unwrap_err());
        assert_eq!(message("<a>]]></a>"), "Sequence ']]>' not allowed in content");
        assert_eq!(message("<a>\u{1}</a>"), "PCDATA invalid Char value 1");
        assert_eq!(message("<a b='\u{1b}'/>"), "AttValue: invalid Char value 27");
        assert_eq!(message("<a><![CDATA[\u{8}]]></a>"), "CData section invalid Char value 8");
        assert!(parse("<a>]] >\t\r\n</a>").is_ok());

        let doc = parse_with("<a>]]>\u{1}</a>", &lenient()).unwrap();
        assert_eq!(doc.root.text(), Some("]]>\u{1}"));
    }

    #[test]
    fn test_external_subset_through_transport() {
        let transport = StaticTransport::new()
            .with_document("http://example.com/wsdl/types.dtd", br#"<?xml version="1.0"?><!ENTITY ext "x">"#.to_vec());
        let content = br#"<!DOCTYPE a SYSTEM "types.dtd"><a/>"#;
        let base = Some("http://example.com/wsdl/root.wsdl");

        let allow = Settings::default()
            .with_forbid_external(false)
            .with_forbid_entities(false);
        let doc = parse_xml(content, &transport, base, &allow).unwrap();
        let external = doc.docinfo.external_dtd.unwrap();
        assert_eq!(external.iter_entities().next().unwrap().name, "ext");
        assert_eq!(transport.requests(), vec!["http://example.com/wsdl/types.dtd"]);

        let err = parse_xml(content, &transport, base, &allow.clone().with_forbid_entities(true))
            .unwrap_err();
        assert!(matches!(err, Error::EntitiesForbidden { ref name, .. } if name == "ext"));
        assert_eq!(transport.fetch_count(), 2);

        let doc = parse_xml(content, &transport, base, &Settings::default()).unwrap();
        assert!(doc.docinfo.external_dtd.is_none());
        assert_eq!(transport.fetch_count(), 2);
    }

    #[test]
    fn test_external_subset_on_other_schemes_is_declined() {
        let transport = StaticTransport::new();
        let settings = Settings::default().with_forbid_external(false);
        let doc = parse_xml(
            br#"<!DOCTYPE a SYSTEM "file:///etc/passwd"><a/>"#,
            &transport,
            None,
            &settings,
        )
        .unwrap();
        assert!(doc.docinfo.external_dtd.is_none());
        assert_eq!(transport.fetch_count(), 0);
    }

    #[test]
    fn test_custom_resolver() {
        let resolver = |url: &str, _: Option<&str>| -> Result<Option<Vec<u8>>> {
            assert_eq!(url, "urn:dtd");
            Ok(Some(b"<!ELEMENT a EMPTY>".to_vec()))
        };
        let settings = Settings::default().with_forbid_external(false);
        let doc = parse_xml_with_resolver(
            br#"<!DOCTYPE a SYSTEM "urn:dtd"><a/>"#,
            &resolver,
            None,
            &settings,
        )
        .unwrap();
        assert!(!doc.docinfo.external_dtd.unwrap().has_entities());
    }

    #[test]
    fn test_multibyte_utf8_survives() {
        let doc = parse("<a title=\"naïve\">日本語 ✓ café</a>").unwrap();
        assert_eq!(doc.root.text(), Some("日本語 ✓ café"));
        assert_eq!(doc.root.get_attribute("title"), Some("naïve"));
    }

    #[test]
    fn test_latin1_and_invalid_bytes() {
        let mut content = br#"<?xml version="1.0" encoding="ISO-8859-1"?><a>"#.to_vec();
        content.push(0xE9);
        content.extend_from_slice(b"</a>");
        let doc = parse_xml(&content, &StaticTransport::new(), None, &Settings::default()).unwrap();
        assert_eq!(doc.root.text(), Some("é"));

        let content = b"<a>\xFF</a>";
        let err = parse_xml(content, &StaticTransport::new(), None, &Settings::default()).unwrap_err();
        assert!(syntax_message(err).contains("not proper UTF-8"));
        let doc = parse_xml(content, &StaticTransport::new(), None, &lenient()).unwrap();
        assert_eq!(doc.root.text(), Some("\u{FFFD}"));
    }

    #[test]
    fn test_base_url_is_recorded() {
        let doc = parse_xml(
            b"<a/>",
            &StaticTransport::new(),
            Some("http://example.com/root.wsdl"),
            &Settings::default(),
        )
        .unwrap();
        assert_eq!(doc.docinfo.url.as_deref(), Some("http://example.com/root.wsdl"));
    }

    #[test]
    fn test_strip_text_declaration() {
        assert_eq!(strip_text_declaration(r#"<?xml encoding="UTF-8"?><!ENTITY a "b">"#), r#"<!ENTITY a "b">"#);
        assert_eq!(strip_text_declaration("<?xml-stylesheet x?>"), "<?xml-stylesheet x?>");
    }
}
