//! Message-type detection
//!
//! The detector peeks the XML prolog and root element to identify the
//! message definition and envelope variant without consuming the body.
//! It never resets the stream position; callers either operate on a
//! seekable stream or hand the detected identifier to a stage that
//! re-opens the source.

use tokio::io::AsyncRead;

use iso20022_core::error::{Error, Result};
use iso20022_core::identifier::MessageIdentifier;

use crate::cursor::{XmlCursor, XmlEvent};
use crate::namespace::{NamespaceKind, NamespaceRegistry, GLOBAL_NAMESPACES};
use crate::reader::XmlReaderFactory;

/// Envelope variant of a detected message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageVariant {
    /// Bare `Document` root
    Standalone,
    /// Envelope or inline `AppHdr` present
    WithApplicationHeader,
    /// `urn:swift:xsd:` namespace
    Swift,
    /// `$cbpr_plus` namespace suffix
    CbprPlus,
}

/// Output of message detection
#[derive(Debug, Clone)]
pub struct MessageDetectionResult {
    /// Identifier of the detected message definition
    pub message_id: MessageIdentifier,
    /// Namespace URI the identifier was derived from
    pub namespace_uri: String,
    /// Local name of the document root
    pub root_element_name: String,
    /// First child element under `Document`, e.g. `CstmrCdtTrfInitn`
    pub message_element_name: Option<String>,
    /// Whether an `AppHdr` was seen before the message element
    pub has_application_header: bool,
    /// Identifier of the `AppHdr` definition, when its namespace is ISO
    pub app_header_id: Option<MessageIdentifier>,
    /// Textual `MsgDefIdr` content from the `AppHdr`
    pub message_definition_identifier: Option<String>,
    /// Envelope variant
    pub variant: MessageVariant,
}

/// Determines the message identifier from a prefix of the XML
pub struct MessageDetector {
    namespaces: &'static NamespaceRegistry,
}

impl MessageDetector {
    /// Detector over the global namespace registry
    pub fn new() -> Self {
        Self {
            namespaces: &GLOBAL_NAMESPACES,
        }
    }

    /// Detector over an explicit namespace registry
    pub fn with_namespaces(namespaces: &'static NamespaceRegistry) -> Self {
        Self { namespaces }
    }

    /// Detect from an async byte source
    pub async fn detect<S>(&self, stream: S) -> Result<MessageDetectionResult>
    where
        S: AsyncRead + Send + Unpin,
    {
        let mut cursor = XmlReaderFactory::create(stream);
        self.detect_cursor(&mut cursor).await
    }

    /// Detect from in-memory text
    pub async fn detect_text(&self, xml: &str) -> Result<MessageDetectionResult> {
        let mut cursor = XmlReaderFactory::create_from_text(xml);
        self.detect_cursor(&mut cursor).await
    }

    /// `detect` with the failure rendered as a string instead of an error
    pub async fn try_detect<S>(
        &self,
        stream: S,
    ) -> std::result::Result<MessageDetectionResult, String>
    where
        S: AsyncRead + Send + Unpin,
    {
        self.detect(stream).await.map_err(|e| e.to_string())
    }

    /// Core detection over an existing cursor
    pub async fn detect_cursor(
        &self,
        cursor: &mut XmlCursor<'_>,
    ) -> Result<MessageDetectionResult> {
        let root = cursor
            .next_start()
            .await?
            .ok_or_else(|| Error::detection("document has no root element", None, None))?;

        match root.name.as_str() {
            "Document" => self.detect_standalone(cursor, root).await,
            "BizMsgEnvlp" | "RequestPayload" => self.detect_envelope(cursor, root).await,
            other => Err(Error::detection(
                format!("unrecognized root element <{other}>"),
                Some(other.to_string()),
                root.namespace.clone(),
            )),
        }
    }

    async fn detect_standalone(
        &self,
        cursor: &mut XmlCursor<'_>,
        root: crate::cursor::ElementStart,
    ) -> Result<MessageDetectionResult> {
        let namespace_uri = root.namespace.clone().ok_or_else(|| {
            Error::detection(
                "root element carries no namespace",
                Some(root.name.clone()),
                None,
            )
        })?;

        let (message_id, kind) = self.namespaces.identify(&namespace_uri).ok_or_else(|| {
            Error::detection(
                format!("unknown message namespace '{namespace_uri}'"),
                Some(root.name.clone()),
                Some(namespace_uri.clone()),
            )
        })?;

        let mut has_application_header = false;
        let mut app_header_id = None;
        let mut message_definition_identifier = None;
        let mut message_element_name = None;

        // Read ahead to the first child; an AppHdr before the message
        // element marks the inline-header variant.
        loop {
            match cursor.next().await? {
                XmlEvent::ElementStart(child) if cursor.depth() == 2 => {
                    if child.name == "AppHdr" {
                        has_application_header = true;
                        if let Some(ns) = &child.namespace {
                            app_header_id = MessageIdentifier::from_namespace(ns)
                                .ok()
                                .filter(|id| id.is_application_header());
                        }
                        message_definition_identifier =
                            scan_for_msg_def_idr(cursor, cursor.depth()).await?;
                    } else {
                        message_element_name = Some(child.name);
                        break;
                    }
                }
                XmlEvent::ElementStart(_) => {}
                XmlEvent::ElementEnd { .. } | XmlEvent::Text(_) => {}
                XmlEvent::Eof => break,
            }
        }

        let variant = variant_for(kind, has_application_header);

        Ok(MessageDetectionResult {
            message_id,
            namespace_uri,
            root_element_name: root.name,
            message_element_name,
            has_application_header,
            app_header_id,
            message_definition_identifier,
            variant,
        })
    }

    async fn detect_envelope(
        &self,
        cursor: &mut XmlCursor<'_>,
        root: crate::cursor::ElementStart,
    ) -> Result<MessageDetectionResult> {
        let mut app_header_id = None;
        let mut message_definition_identifier: Option<String> = None;
        let mut document_namespace: Option<String> = None;
        let mut document_kind = None;
        let mut message_element_name = None;

        // Children of the envelope in document order.
        loop {
            match cursor.next().await? {
                XmlEvent::ElementStart(child) if cursor.depth() == 2 => {
                    match child.name.as_str() {
                        "AppHdr" => {
                            if let Some(ns) = &child.namespace {
                                app_header_id = MessageIdentifier::from_namespace(ns)
                                    .ok()
                                    .filter(|id| id.is_application_header());
                            }
                            message_definition_identifier =
                                scan_for_msg_def_idr(cursor, cursor.depth()).await?;
                        }
                        "Document" => {
                            document_namespace = child.namespace.clone();
                            if let Some(ns) = &document_namespace {
                                document_kind = self.namespaces.identify(ns);
                            }
                            // First child of the Document is the message element.
                            loop {
                                match cursor.next().await? {
                                    XmlEvent::ElementStart(inner) => {
                                        message_element_name = Some(inner.name);
                                        break;
                                    }
                                    XmlEvent::ElementEnd { .. } if cursor.depth() < 2 => break,
                                    XmlEvent::Eof => break,
                                    _ => {}
                                }
                            }
                            break;
                        }
                        _ => cursor.skip_subtree().await?,
                    }
                }
                XmlEvent::ElementStart(_) => {}
                XmlEvent::ElementEnd { .. } | XmlEvent::Text(_) => {}
                XmlEvent::Eof => break,
            }
        }

        // Identifier source: Document namespace first, MsgDefIdr fallback.
        let (message_id, kind) = match document_kind {
            Some((id, kind)) => (id, kind),
            None => {
                let text = message_definition_identifier.as_deref().ok_or_else(|| {
                    Error::detection(
                        "envelope carries neither a known Document namespace nor a MsgDefIdr",
                        Some(root.name.clone()),
                        document_namespace.clone(),
                    )
                })?;
                let id = MessageIdentifier::parse(text).map_err(|e| {
                    Error::detection(
                        format!("MsgDefIdr '{text}' is not a message identifier: {e}"),
                        Some(root.name.clone()),
                        document_namespace.clone(),
                    )
                })?;
                (id, NamespaceKind::Canonical)
            }
        };

        let namespace_uri = document_namespace.unwrap_or_else(|| message_id.to_namespace());

        Ok(MessageDetectionResult {
            message_id,
            namespace_uri,
            root_element_name: root.name,
            message_element_name,
            has_application_header: true,
            app_header_id,
            message_definition_identifier,
            variant: variant_for(kind, true),
        })
    }
}

impl Default for MessageDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn variant_for(kind: NamespaceKind, has_application_header: bool) -> MessageVariant {
    match kind {
        NamespaceKind::Swift => MessageVariant::Swift,
        NamespaceKind::CbprPlus => MessageVariant::CbprPlus,
        NamespaceKind::Canonical if has_application_header => {
            MessageVariant::WithApplicationHeader
        }
        NamespaceKind::Canonical => MessageVariant::Standalone,
    }
}

/// Walk the subtree of an `AppHdr` (already entered at `header_depth`)
/// and capture the textual `MsgDefIdr`, consuming the subtree
async fn scan_for_msg_def_idr(
    cursor: &mut XmlCursor<'_>,
    header_depth: usize,
) -> Result<Option<String>> {
    let mut found = None;
    loop {
        match cursor.next().await? {
            XmlEvent::ElementStart(e) if e.name == "MsgDefIdr" => {
                let text = cursor.read_text().await?;
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    found = Some(trimmed.to_string());
                }
            }
            XmlEvent::ElementEnd { .. } => {
                if cursor.depth() < header_depth {
                    return Ok(found);
                }
            }
            XmlEvent::Eof => {
                return Err(Error::malformed("unexpected end of document inside AppHdr"))
            }
            _ => {}
        }
    }
}
