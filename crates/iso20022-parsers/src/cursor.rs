//! Pull-reader cursor over ISO 20022 XML
//!
//! `XmlCursor` wraps a `quick-xml` reader behind a small owned-event
//! interface: element navigation, typed content readers, scoped skip,
//! and subtree extraction. Namespace declarations are tracked per scope
//! so every start element carries its resolved namespace URI. The
//! cursor enforces the security policy of the reader factory: DTDs fail
//! immediately and only the five predefined entities (plus character
//! references) are ever expanded.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rust_decimal::Decimal;
use serde::Serialize;
use smallvec::SmallVec;
use tokio::io::AsyncBufRead;

use iso20022_core::error::{Error, ParseIssue, Result};

use crate::reader::{ReaderSettings, SchemaHook};

/// Boxed async buffered byte source feeding a cursor
pub type DynSource<'a> = Box<dyn AsyncBufRead + Send + Unpin + 'a>;

/// Start-element view with owned local name, namespace, and attributes
#[derive(Debug, Clone)]
pub struct ElementStart {
    /// Local name, prefix stripped
    pub name: String,
    /// Resolved namespace URI, when bound
    pub namespace: Option<String>,
    /// Attribute name/value pairs, prefixes stripped, declarations excluded
    pub attributes: SmallVec<[(String, String); 4]>,
}

impl ElementStart {
    /// Look up an attribute value by local name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Owned view of one reader event
#[derive(Debug, Clone)]
pub enum XmlEvent {
    ElementStart(ElementStart),
    ElementEnd { name: String },
    Text(String),
    Eof,
}

/// A date element that wraps either `<Dt>` or `<DtTm>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateValue {
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
}

impl DateValue {
    /// Civil date regardless of which form was present
    pub fn civil_date(&self) -> NaiveDate {
        match self {
            DateValue::Date(d) => *d,
            DateValue::DateTime(dt) => dt.date_naive(),
        }
    }
}

/// Owned element subtree produced by [`XmlCursor::read_subtree`]
#[derive(Debug, Clone, Serialize)]
pub struct XmlNode {
    pub name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn from_start(start: &ElementStart) -> Self {
        Self {
            name: start.name.clone(),
            namespace: start.namespace.clone(),
            attributes: start.attributes.iter().cloned().collect(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// First direct child with the given local name
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Trimmed text of a direct child, when present and non-empty
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
    }

    /// Depth-first search for the first descendant with the given name
    pub fn descendant(&self, name: &str) -> Option<&XmlNode> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// Trimmed text of the first matching descendant
    pub fn descendant_text(&self, name: &str) -> Option<&str> {
        self.descendant(name)
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
    }
}

/// One element's worth of namespace declarations
struct NamespaceScope {
    /// Depth of the element that declared these bindings
    depth: usize,
    /// `None` prefix is the default namespace
    bindings: SmallVec<[(Option<String>, String); 2]>,
}

/// Forward-only pull cursor over an XML byte source
pub struct XmlCursor<'a> {
    reader: Reader<DynSource<'a>>,
    buf: Vec<u8>,
    depth: usize,
    open: Vec<String>,
    scopes: Vec<NamespaceScope>,
    pending_end: Option<String>,
    entity_chars: usize,
    settings: ReaderSettings,
    schema: Option<SchemaHook>,
}

impl<'a> XmlCursor<'a> {
    /// Create a cursor over a buffered source with the given settings
    ///
    /// Callers normally go through [`crate::reader::XmlReaderFactory`],
    /// which validates the settings first.
    pub(crate) fn with_settings(
        source: DynSource<'a>,
        settings: ReaderSettings,
        schema: Option<SchemaHook>,
    ) -> Self {
        let mut reader = Reader::from_reader(source);
        let config = reader.config_mut();
        config.trim_text_start = !settings.preserve_whitespace;
        config.trim_text_end = !settings.preserve_whitespace;
        config.expand_empty_elements = true;

        Self {
            reader,
            buf: Vec::with_capacity(4096),
            depth: 0,
            open: Vec::new(),
            scopes: Vec::new(),
            pending_end: None,
            entity_chars: 0,
            settings,
            schema,
        }
    }

    /// Number of currently open elements
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Byte offset consumed from the source
    pub fn bytes_read(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    /// Slash-joined path of currently open elements
    pub fn path(&self) -> String {
        self.open.join("/")
    }

    /// Build an issue record carrying the current path and offset
    pub fn issue(&self, message: impl Into<String>) -> ParseIssue {
        ParseIssue::new(message).at(self.path(), self.bytes_read())
    }

    /// Issues collected by the schema hook when no handler was installed
    pub fn validation_issues(&self) -> &[ParseIssue] {
        self.schema
            .as_ref()
            .map(|hook| hook.issues.as_slice())
            .unwrap_or(&[])
    }

    fn well_formedness(&self, message: impl Into<String>) -> Error {
        Error::XmlWellFormedness {
            message: message.into(),
            offset: Some(self.bytes_read()),
        }
    }

    fn content_error(&self, message: impl Into<String>) -> Error {
        Error::InvalidContent {
            message: message.into(),
            offset: Some(self.bytes_read()),
        }
    }

    /// Advance to the next significant event
    ///
    /// Comments, processing instructions, and the XML declaration are
    /// skipped. A `DOCTYPE` or a reference to an undeclared entity fails
    /// with [`Error::XmlWellFormedness`] before any entity text is
    /// produced.
    pub async fn next(&mut self) -> Result<XmlEvent> {
        if let Some(name) = self.pending_end.take() {
            self.close_element();
            return Ok(self.inspect(XmlEvent::ElementEnd { name }));
        }

        loop {
            self.buf.clear();
            let offset = self.bytes_read();
            let event = match self.reader.read_event_into_async(&mut self.buf).await {
                Ok(event) => event.into_owned(),
                Err(err) => return Err(map_xml_error(err, offset)),
            };

            if let Some(limit) = self.settings.max_document_bytes {
                if self.bytes_read() > limit {
                    return Err(self.well_formedness(format!(
                        "document exceeds the configured limit of {limit} bytes"
                    )));
                }
            }

            match event {
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) => continue,
                Event::DocType(_) => {
                    return Err(self.well_formedness(
                        "DTD processing is prohibited; the document carries a DOCTYPE",
                    ));
                }
                Event::Start(start) => {
                    let element = self.open_element(&start, offset)?;
                    return Ok(self.inspect(XmlEvent::ElementStart(element)));
                }
                Event::Empty(start) => {
                    // expand_empty_elements is on, so this arm is normally
                    // unreachable; synthesize the pair anyway.
                    let element = self.open_element(&start, offset)?;
                    self.pending_end = Some(element.name.clone());
                    return Ok(self.inspect(XmlEvent::ElementStart(element)));
                }
                Event::End(end) => {
                    let name =
                        String::from_utf8_lossy(end.local_name().into_inner()).into_owned();
                    if self.depth == 0 {
                        return Err(self.well_formedness(format!(
                            "closing tag </{name}> without a matching opening tag"
                        )));
                    }
                    self.close_element();
                    return Ok(self.inspect(XmlEvent::ElementEnd { name }));
                }
                Event::Text(text) => {
                    // Each `&…;` reference in the raw text expands to at
                    // least one character; count them against the cap.
                    let references = text.iter().filter(|&&b| b == b'&').count();
                    if references > 0 {
                        self.entity_chars += references;
                        if self.entity_chars > self.settings.max_entity_expansion {
                            return Err(self.well_formedness(format!(
                                "entity expansion exceeds the limit of {} characters",
                                self.settings.max_entity_expansion
                            )));
                        }
                    }
                    let text = match text.decode() {
                        Ok(cow) => cow.into_owned(),
                        Err(err) => return Err(map_xml_error(err, offset)),
                    };
                    if text.is_empty() {
                        continue;
                    }
                    return Ok(self.inspect(XmlEvent::Text(text)));
                }
                Event::CData(data) => {
                    let text = String::from_utf8_lossy(&data).into_owned();
                    return Ok(self.inspect(XmlEvent::Text(text)));
                }
                Event::GeneralRef(reference) => {
                    let name = String::from_utf8_lossy(&reference).into_owned();
                    let resolved = resolve_entity(&name).ok_or_else(|| {
                        self.well_formedness(format!(
                            "reference to undeclared entity '&{name};' (external entities are disabled)"
                        ))
                    })?;
                    self.entity_chars += resolved.len();
                    if self.entity_chars > self.settings.max_entity_expansion {
                        return Err(self.well_formedness(format!(
                            "entity expansion exceeds the limit of {} characters",
                            self.settings.max_entity_expansion
                        )));
                    }
                    return Ok(self.inspect(XmlEvent::Text(resolved)));
                }
                Event::Eof => return Ok(self.inspect(XmlEvent::Eof)),
            }
        }
    }

    /// Record scope and bookkeeping for a start element
    fn open_element(&mut self, start: &BytesStart<'_>, offset: u64) -> Result<ElementStart> {
        let qname = start.name();
        let local = String::from_utf8_lossy(qname.local_name().into_inner()).into_owned();
        let element_prefix = qname
            .prefix()
            .map(|p| String::from_utf8_lossy(p.into_inner()).into_owned());

        let mut bindings: SmallVec<[(Option<String>, String); 2]> = SmallVec::new();
        let mut attributes: SmallVec<[(String, String); 4]> = SmallVec::new();

        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| Error::XmlWellFormedness {
                message: e.to_string(),
                offset: Some(offset),
            })?;
            let key = attribute.key;
            let value = attribute
                .unescape_value()
                .map_err(|e| Error::XmlWellFormedness {
                    message: e.to_string(),
                    offset: Some(offset),
                })?
                .into_owned();

            let key_prefix = key.prefix().map(|p| p.into_inner().to_vec());
            let key_local = String::from_utf8_lossy(key.local_name().into_inner()).into_owned();

            match key_prefix.as_deref() {
                None if key_local == "xmlns" => bindings.push((None, value)),
                Some(b"xmlns") => bindings.push((Some(key_local), value)),
                _ => attributes.push((key_local, value)),
            }
        }

        self.depth += 1;
        self.open.push(local.clone());
        if !bindings.is_empty() {
            self.scopes.push(NamespaceScope {
                depth: self.depth,
                bindings,
            });
        }

        let namespace = self.resolve_namespace(element_prefix.as_deref());

        Ok(ElementStart {
            name: local,
            namespace,
            attributes,
        })
    }

    fn close_element(&mut self) {
        self.depth -= 1;
        self.open.pop();
        while self
            .scopes
            .last()
            .map(|scope| scope.depth > self.depth)
            .unwrap_or(false)
        {
            self.scopes.pop();
        }
    }

    /// Resolve a prefix (or the default namespace) against open scopes
    fn resolve_namespace(&self, prefix: Option<&str>) -> Option<String> {
        for scope in self.scopes.iter().rev() {
            for (bound_prefix, uri) in scope.bindings.iter().rev() {
                if bound_prefix.as_deref() == prefix {
                    return Some(uri.clone());
                }
            }
        }
        None
    }

    fn inspect(&mut self, event: XmlEvent) -> XmlEvent {
        if let Some(hook) = &mut self.schema {
            let path = self.open.join("/");
            for issue in hook.set.inspect(&event, self.depth, &path) {
                match &hook.handler {
                    Some(handler) => handler(issue),
                    None => hook.issues.push(issue),
                }
            }
        }
        event
    }

    /// Advance to the next element start, or `None` at end of document
    pub async fn next_start(&mut self) -> Result<Option<ElementStart>> {
        loop {
            match self.next().await? {
                XmlEvent::ElementStart(element) => return Ok(Some(element)),
                XmlEvent::Eof => return Ok(None),
                _ => {}
            }
        }
    }

    /// Advance until an element with the given local name starts
    pub async fn move_to_element(&mut self, name: &str) -> Result<Option<ElementStart>> {
        loop {
            match self.next().await? {
                XmlEvent::ElementStart(element) if element.name == name => {
                    return Ok(Some(element))
                }
                XmlEvent::Eof => return Ok(None),
                _ => {}
            }
        }
    }

    /// Read the text content of the element the cursor is inside and
    /// consume its end tag
    pub async fn read_text(&mut self) -> Result<String> {
        let target = self.depth;
        let mut out = String::new();
        loop {
            match self.next().await? {
                XmlEvent::Text(text) => out.push_str(&text),
                XmlEvent::ElementStart(_) => {}
                XmlEvent::ElementEnd { .. } => {
                    if self.depth < target {
                        return Ok(out);
                    }
                }
                XmlEvent::Eof => {
                    return Err(self.well_formedness("unexpected end of document inside element"))
                }
            }
        }
    }

    /// Read element content as an invariant decimal (`.` separator)
    pub async fn read_decimal(&mut self) -> Result<Decimal> {
        let text = self.read_text().await?;
        let trimmed = text.trim();
        Decimal::from_str(trimmed)
            .map_err(|e| self.content_error(format!("'{trimmed}' is not a decimal: {e}")))
    }

    /// Read element content as a round-trip ISO-8601 timestamp
    pub async fn read_date_time(&mut self) -> Result<DateTime<FixedOffset>> {
        let text = self.read_text().await?;
        let trimmed = text.trim();
        DateTime::parse_from_rfc3339(trimmed)
            .map_err(|e| self.content_error(format!("'{trimmed}' is not an ISO-8601 timestamp: {e}")))
    }

    /// Read a date-choice element wrapping `<Dt>YYYY-MM-DD</Dt>` or
    /// `<DtTm>…</DtTm>`, consuming the wrapper
    pub async fn read_date_choice(&mut self) -> Result<DateValue> {
        let target = self.depth;
        let mut value = None;
        loop {
            match self.next().await? {
                XmlEvent::ElementStart(e) if e.name == "Dt" => {
                    let text = self.read_text().await?;
                    let trimmed = text.trim().to_string();
                    let date = NaiveDate::parse_from_str(&trimmed, "%Y-%m-%d").map_err(|e| {
                        self.content_error(format!("'{trimmed}' is not a date: {e}"))
                    })?;
                    value = Some(DateValue::Date(date));
                }
                XmlEvent::ElementStart(e) if e.name == "DtTm" => {
                    value = Some(DateValue::DateTime(self.read_date_time().await?));
                }
                XmlEvent::ElementStart(_) => {}
                XmlEvent::Text(_) => {}
                XmlEvent::ElementEnd { .. } => {
                    if self.depth < target {
                        return value.ok_or_else(|| {
                            self.content_error("date element carries neither <Dt> nor <DtTm>")
                        });
                    }
                }
                XmlEvent::Eof => {
                    return Err(self.well_formedness("unexpected end of document inside element"))
                }
            }
        }
    }

    /// Read an amount element with a `Ccy` attribute
    ///
    /// Returns `(amount, currency)`; either side may be absent without
    /// failing, but non-empty content that is not a decimal is an error.
    pub async fn read_amount(
        &mut self,
        element: &ElementStart,
    ) -> Result<(Option<Decimal>, Option<String>)> {
        let currency = element.attribute("Ccy").map(str::to_string);
        let text = self.read_text().await?;
        let trimmed = text.trim();
        let amount = if trimmed.is_empty() {
            None
        } else {
            Some(Decimal::from_str(trimmed).map_err(|e| {
                self.content_error(format!("'{trimmed}' is not a decimal amount: {e}"))
            })?)
        };
        Ok((amount, currency))
    }

    /// Skip everything up to and including the end tag of the element the
    /// cursor is currently inside
    pub async fn skip_subtree(&mut self) -> Result<()> {
        let target = self.depth;
        self.skip_to_depth(target.saturating_sub(1)).await
    }

    /// Consume events until at most `target_depth` elements remain open
    pub async fn skip_to_depth(&mut self, target_depth: usize) -> Result<()> {
        while self.depth > target_depth {
            if let XmlEvent::Eof = self.next().await? {
                return Err(self.well_formedness("unexpected end of document while skipping"));
            }
        }
        Ok(())
    }

    /// Read the subtree of the element just started into an owned tree
    ///
    /// `root` is the start event the caller already consumed; the cursor
    /// ends up positioned after the matching end tag.
    pub async fn read_subtree(&mut self, root: &ElementStart) -> Result<XmlNode> {
        let mut stack = vec![XmlNode::from_start(root)];
        loop {
            match self.next().await? {
                XmlEvent::ElementStart(e) => stack.push(XmlNode::from_start(&e)),
                XmlEvent::Text(text) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&text);
                    }
                }
                XmlEvent::ElementEnd { .. } => {
                    let node = stack.pop().ok_or_else(|| {
                        self.well_formedness("unbalanced end tag while reading subtree")
                    })?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => return Ok(node),
                    }
                }
                XmlEvent::Eof => {
                    return Err(self.well_formedness("unexpected end of document inside subtree"))
                }
            }
        }
    }
}

fn map_xml_error(error: impl std::fmt::Display, offset: u64) -> Error {
    Error::XmlWellFormedness {
        message: error.to_string(),
        offset: Some(offset),
    }
}

fn resolve_entity(name: &str) -> Option<String> {
    match name {
        "amp" => Some("&".to_string()),
        "lt" => Some("<".to_string()),
        "gt" => Some(">".to_string()),
        "apos" => Some("'".to_string()),
        "quot" => Some("\"".to_string()),
        _ => {
            let rest = name.strip_prefix('#')?;
            let code = match rest.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => rest.parse::<u32>().ok()?,
            };
            char::from_u32(code).map(|c| c.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::XmlReaderFactory;

    fn cursor(xml: &str) -> XmlCursor<'static> {
        XmlReaderFactory::create_from_text(xml)
    }

    #[tokio::test]
    async fn test_walks_elements_with_namespaces() {
        let mut cursor = cursor(
            r#"<Document xmlns="urn:iso:std:iso:20022:tech:xsd:pain.001.001.09">
                 <CstmrCdtTrfInitn/>
               </Document>"#,
        );

        let root = cursor.next_start().await.unwrap().unwrap();
        assert_eq!(root.name, "Document");
        assert_eq!(
            root.namespace.as_deref(),
            Some("urn:iso:std:iso:20022:tech:xsd:pain.001.001.09")
        );

        let child = cursor.next_start().await.unwrap().unwrap();
        assert_eq!(child.name, "CstmrCdtTrfInitn");
        assert_eq!(
            child.namespace.as_deref(),
            Some("urn:iso:std:iso:20022:tech:xsd:pain.001.001.09"),
            "default namespace is inherited"
        );
        assert_eq!(cursor.depth(), 2);
    }

    #[tokio::test]
    async fn test_prefixed_namespaces_resolve() {
        let mut cursor = cursor(
            r#"<h:AppHdr xmlns:h="urn:iso:std:iso:20022:tech:xsd:head.001.001.02">
                 <h:BizMsgIdr>MSG-1</h:BizMsgIdr>
                 <Plain/>
               </h:AppHdr>"#,
        );

        let root = cursor.next_start().await.unwrap().unwrap();
        assert_eq!(root.name, "AppHdr");
        assert_eq!(
            root.namespace.as_deref(),
            Some("urn:iso:std:iso:20022:tech:xsd:head.001.001.02")
        );

        let child = cursor.next_start().await.unwrap().unwrap();
        assert_eq!(child.name, "BizMsgIdr");
        assert!(child.namespace.is_some());

        cursor.read_text().await.unwrap();
        let plain = cursor.next_start().await.unwrap().unwrap();
        assert_eq!(plain.name, "Plain");
        assert_eq!(plain.namespace, None, "no default namespace declared");
    }

    #[tokio::test]
    async fn test_namespace_scope_ends_with_element() {
        let mut cursor = cursor(
            r#"<Root><Inner xmlns="urn:a"><Leaf/></Inner><After/></Root>"#,
        );
        cursor.next_start().await.unwrap().unwrap(); // Root
        let inner = cursor.next_start().await.unwrap().unwrap();
        assert_eq!(inner.namespace.as_deref(), Some("urn:a"));
        let leaf = cursor.next_start().await.unwrap().unwrap();
        assert_eq!(leaf.namespace.as_deref(), Some("urn:a"));
        let after = cursor.move_to_element("After").await.unwrap().unwrap();
        assert_eq!(after.namespace, None, "scope must end with its element");
    }

    #[tokio::test]
    async fn test_read_text_and_decimal() {
        let mut cursor = cursor("<Root><Amt>1234.56</Amt><Bad>12,5</Bad></Root>");
        cursor.move_to_element("Amt").await.unwrap().unwrap();
        assert_eq!(
            cursor.read_decimal().await.unwrap(),
            Decimal::from_str("1234.56").unwrap()
        );

        cursor.move_to_element("Bad").await.unwrap().unwrap();
        let err = cursor.read_decimal().await.unwrap_err();
        assert!(matches!(err, Error::InvalidContent { .. }));
    }

    #[tokio::test]
    async fn test_read_amount_with_currency() {
        let mut cursor = cursor(r#"<Root><Amt Ccy="EUR">101</Amt></Root>"#);
        let amt = cursor.move_to_element("Amt").await.unwrap().unwrap();
        let (amount, currency) = cursor.read_amount(&amt).await.unwrap();
        assert_eq!(amount, Some(Decimal::from(101)));
        assert_eq!(currency.as_deref(), Some("EUR"));
    }

    #[tokio::test]
    async fn test_read_date_choice_both_forms() {
        let mut cursor = cursor(
            "<Root><BookgDt><Dt>2024-01-15</Dt></BookgDt>\
             <ValDt><DtTm>2024-01-16T09:30:00+01:00</DtTm></ValDt></Root>",
        );

        cursor.move_to_element("BookgDt").await.unwrap().unwrap();
        let booked = cursor.read_date_choice().await.unwrap();
        assert_eq!(
            booked.civil_date(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );

        cursor.move_to_element("ValDt").await.unwrap().unwrap();
        let value = cursor.read_date_choice().await.unwrap();
        assert_eq!(
            value.civil_date(),
            NaiveDate::from_ymd_opt(2024, 1, 16).unwrap()
        );
    }

    #[tokio::test]
    async fn test_skip_subtree() {
        let mut cursor = cursor("<Root><Skip><Deep><Deeper/></Deep></Skip><Next/></Root>");
        cursor.move_to_element("Skip").await.unwrap().unwrap();
        cursor.skip_subtree().await.unwrap();
        let next = cursor.next_start().await.unwrap().unwrap();
        assert_eq!(next.name, "Next");
    }

    #[tokio::test]
    async fn test_read_subtree_builds_tree() {
        let mut cursor = cursor(
            r#"<Root><AppHdr><Fr><Nm>Alpha Bank</Nm></Fr><MsgDefIdr>pain.001.001.09</MsgDefIdr></AppHdr></Root>"#,
        );
        let start = cursor.move_to_element("AppHdr").await.unwrap().unwrap();
        let node = cursor.read_subtree(&start).await.unwrap();

        assert_eq!(node.name, "AppHdr");
        assert_eq!(node.child_text("MsgDefIdr"), Some("pain.001.001.09"));
        assert_eq!(node.descendant_text("Nm"), Some("Alpha Bank"));
        assert_eq!(cursor.depth(), 1);
    }

    #[tokio::test]
    async fn test_doctype_is_rejected() {
        let mut cursor = cursor("<!DOCTYPE foo [<!ENTITY xxe SYSTEM \"file:///etc/passwd\">]><foo>&xxe;</foo>");
        let mut failed = false;
        for _ in 0..4 {
            match cursor.next().await {
                Err(err) => {
                    assert!(err.is_well_formedness(), "unexpected error: {err}");
                    failed = true;
                    break;
                }
                Ok(XmlEvent::Text(text)) => {
                    panic!("entity text must never be produced, got {text:?}")
                }
                Ok(XmlEvent::Eof) => break,
                Ok(_) => {}
            }
        }
        assert!(failed, "DOCTYPE input must fail");
    }

    #[tokio::test]
    async fn test_predefined_entities_resolve() {
        let mut cursor = cursor("<Root><Nm>Fish&amp;Chips&#65;</Nm></Root>");
        cursor.move_to_element("Nm").await.unwrap().unwrap();
        let text = cursor.read_text().await.unwrap();
        assert_eq!(text, "Fish&ChipsA");
    }

    #[tokio::test]
    async fn test_path_tracks_open_elements() {
        let mut cursor = cursor("<A><B><C>x</C></B></A>");
        cursor.move_to_element("C").await.unwrap().unwrap();
        assert_eq!(cursor.path(), "A/B/C");
        let issue = cursor.issue("boom");
        assert_eq!(issue.path.as_deref(), Some("A/B/C"));
        assert!(issue.offset.is_some());
    }
}
