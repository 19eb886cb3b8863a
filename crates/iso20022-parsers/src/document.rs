//! Whole-document parsing
//!
//! `DocumentParser` is the subclass-facing trait for message parsers
//! that return a complete document value. The fixed orchestration lives
//! in [`parse_document`]: detect, reject unsupported messages, rewind,
//! build a reader, extract the business application header, navigate to
//! the message element, then delegate to the implementation. Convenience
//! entry points open files and in-memory text.

use std::any::{Any, TypeId};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use tokio::io::{AsyncRead, AsyncSeek};
use tokio_util::sync::CancellationToken;

use iso20022_core::error::{Error, ParseIssue, Result};
use iso20022_core::header::{ApplicationHeader, CopyDuplicate, Party, Priority};
use iso20022_core::identifier::MessageIdentifier;
use iso20022_core::options::ParseOptions;
use iso20022_core::progress::{report, ParseProgress, ParseStatus};

use crate::cursor::{XmlCursor, XmlEvent, XmlNode};
use crate::detect::MessageDetector;
use crate::reader::{rewind, total_bytes, ReaderSettings, SchemaSet, SeekSource, XmlReaderFactory};

/// Collected errors and warnings of one parse call
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<ParseIssue>,
    warnings: Vec<ParseIssue>,
    collect_warnings: bool,
}

impl Diagnostics {
    pub fn new(collect_warnings: bool) -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            collect_warnings,
        }
    }

    /// Record an error
    pub fn add_error(&mut self, issue: ParseIssue) {
        tracing::warn!(issue = %issue, "parse error collected");
        self.errors.push(issue);
    }

    /// Record a warning; dropped when warning collection is off
    pub fn add_warning(&mut self, issue: ParseIssue) {
        if self.collect_warnings {
            self.warnings.push(issue);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ParseIssue] {
        &self.errors
    }

    pub fn warnings(&self) -> &[ParseIssue] {
        &self.warnings
    }
}

/// Result of a whole-document parse
#[derive(Debug)]
pub struct ParsedDocument<D> {
    pub message_id: MessageIdentifier,
    pub application_header: Option<ApplicationHeader>,
    pub document: D,
    pub errors: Vec<ParseIssue>,
    pub warnings: Vec<ParseIssue>,
}

/// Subclass-facing trait for whole-document message parsers
///
/// Implementations declare the messages they understand and parse the
/// message body; everything around that is driven by [`parse_document`].
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// The document value this parser produces
    type Document: Send + 'static;

    /// Message definitions this parser accepts
    fn supported_messages(&self) -> &[MessageIdentifier];

    /// Parse the message body
    ///
    /// The cursor is positioned just after the message element's start
    /// tag (the first child under `Document`).
    async fn parse_document_core(
        &self,
        cursor: &mut XmlCursor<'_>,
        message_id: &MessageIdentifier,
        application_header: Option<&ApplicationHeader>,
        options: &ParseOptions,
        diagnostics: &mut Diagnostics,
        cancel: &CancellationToken,
    ) -> Result<Self::Document>;

    /// Compile the schema set named by `ParseOptions::schema_path`
    ///
    /// Schema compilation lives outside this library; the default
    /// refuses so that `validate_schema` without a wired compiler is an
    /// explicit failure rather than a silent no-op.
    fn compile_schema_set(&self, path: &Path) -> Result<Arc<dyn SchemaSet>> {
        Err(Error::SchemaValidation {
            issues: vec![ParseIssue::new(format!(
                "no schema compiler configured for {}",
                path.display()
            ))],
        })
    }
}

/// Fixed whole-document orchestration
///
/// Cancellation is observed between every step and propagates verbatim.
pub async fn parse_document<P, S>(
    parser: &P,
    stream: &mut S,
    options: &ParseOptions,
    cancel: &CancellationToken,
) -> Result<ParsedDocument<P::Document>>
where
    P: DocumentParser + ?Sized,
    S: AsyncRead + AsyncSeek + Send + Unpin,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // Detect the message and envelope variant.
    let detection = {
        let mut cursor = XmlReaderFactory::create(&mut *stream);
        MessageDetector::new().detect_cursor(&mut cursor).await?
    };

    // Reject messages the implementation does not declare.
    if !parser.supported_messages().contains(&detection.message_id) {
        return Err(Error::ParserNotFound {
            id: detection.message_id,
            available: parser.supported_messages().to_vec(),
        });
    }

    let total = total_bytes(&mut *stream).await.ok();
    rewind(&mut *stream).await?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // Build the reader, validating preset when asked for.
    let mut cursor = match (&options.validate_schema, &options.schema_path) {
        (true, Some(path)) => {
            let schema_set = parser.compile_schema_set(path)?;
            XmlReaderFactory::create_validating(&mut *stream, schema_set, None)
        }
        _ => {
            let settings = ReaderSettings {
                preserve_whitespace: options.preserve_whitespace,
                ..ReaderSettings::default()
            };
            XmlReaderFactory::create_with_settings(&mut *stream, settings)?
        }
    };

    report(options.progress.as_ref(), ParseProgress::starting(total));

    let mut diagnostics = Diagnostics::new(options.collect_warnings);

    if detection.has_application_header && options.parse_application_header {
        report(
            options.progress.as_ref(),
            ParseProgress::status(ParseStatus::ParsingHeader),
        );
    }
    let application_header =
        navigate_to_message(&mut cursor, options, &mut diagnostics).await?;

    report(
        options.progress.as_ref(),
        ParseProgress::status(ParseStatus::ParsingBody),
    );
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let document = match parser
        .parse_document_core(
            &mut cursor,
            &detection.message_id,
            application_header.as_ref(),
            options,
            &mut diagnostics,
            cancel,
        )
        .await
    {
        Ok(document) => document,
        Err(err) => {
            if !err.is_cancellation() {
                report(options.progress.as_ref(), ParseProgress::failed(err.to_string()));
            }
            return Err(err);
        }
    };

    // Issues the schema set collected on the cursor.
    if options.validate_schema && !cursor.validation_issues().is_empty() {
        let issues = cursor.validation_issues().to_vec();
        report(
            options.progress.as_ref(),
            ParseProgress::failed("schema validation failed"),
        );
        return Err(Error::SchemaValidation { issues });
    }

    if diagnostics.has_errors() && options.stop_on_first_error {
        let err = Error::ParsingFailed {
            errors: diagnostics.errors,
            warnings: diagnostics.warnings,
        };
        report(options.progress.as_ref(), ParseProgress::failed(err.to_string()));
        return Err(err);
    }

    report(
        options.progress.as_ref(),
        ParseProgress::completed(cursor.bytes_read(), None),
    );

    Ok(ParsedDocument {
        message_id: detection.message_id,
        application_header,
        document,
        errors: diagnostics.errors,
        warnings: diagnostics.warnings,
    })
}

/// Walk the envelope down to the message element, extracting the BAH on
/// the way when present; returns with the message element start consumed
async fn navigate_to_message(
    cursor: &mut XmlCursor<'_>,
    options: &ParseOptions,
    diagnostics: &mut Diagnostics,
) -> Result<Option<ApplicationHeader>> {
    let root = cursor
        .next_start()
        .await?
        .ok_or_else(|| Error::malformed("document has no root element"))?;

    let is_envelope = matches!(root.name.as_str(), "BizMsgEnvlp" | "RequestPayload");
    let mut application_header = None;

    loop {
        match cursor.next().await? {
            XmlEvent::ElementStart(child) if cursor.depth() == 2 => match child.name.as_str() {
                "AppHdr" => {
                    if options.parse_application_header {
                        let namespace = child.namespace.clone();
                        let node = cursor.read_subtree(&child).await?;
                        application_header = Some(header_from_node(
                            &node,
                            namespace.as_deref(),
                            diagnostics,
                        ));
                    } else {
                        cursor.skip_subtree().await?;
                    }
                }
                "Document" if is_envelope => {
                    cursor
                        .next_start()
                        .await?
                        .ok_or_else(|| Error::malformed("Document element has no message element"))?;
                    return Ok(application_header);
                }
                _ if !is_envelope => {
                    // First non-AppHdr child of a bare Document root is
                    // the message element itself.
                    return Ok(application_header);
                }
                _ => cursor.skip_subtree().await?,
            },
            XmlEvent::Eof => {
                return Err(Error::malformed("document ended before the message element"))
            }
            _ => {}
        }
    }
}

/// Build a header value from an `AppHdr` subtree
///
/// Missing mandatory fields become warnings and stay at their defaults.
pub(crate) fn header_from_node(
    node: &XmlNode,
    header_namespace: Option<&str>,
    diagnostics: &mut Diagnostics,
) -> ApplicationHeader {
    let version = header_namespace
        .and_then(|ns| MessageIdentifier::from_namespace(ns).ok())
        .unwrap_or_default();

    let mut header = ApplicationHeader {
        version,
        ..ApplicationHeader::default()
    };

    match node.child_text("BizMsgIdr") {
        Some(text) => header.business_message_identifier = text.to_string(),
        None => diagnostics.add_warning(ParseIssue::new("AppHdr is missing mandatory BizMsgIdr")),
    }

    match node.child_text("MsgDefIdr") {
        Some(text) => {
            header.message_definition_identifier = text.to_string();
            if MessageIdentifier::parse(text).is_err() {
                diagnostics.add_warning(ParseIssue::new(format!(
                    "AppHdr MsgDefIdr '{text}' is not a message identifier; using the default"
                )));
            }
        }
        None => diagnostics.add_warning(ParseIssue::new("AppHdr is missing mandatory MsgDefIdr")),
    }

    match node.child_text("CreDt") {
        Some(text) => match DateTime::parse_from_rfc3339(text) {
            Ok(timestamp) => header.creation_date = Some(timestamp),
            Err(err) => diagnostics.add_warning(ParseIssue::new(format!(
                "AppHdr CreDt '{text}' is not an ISO-8601 timestamp: {err}"
            ))),
        },
        None => diagnostics.add_warning(ParseIssue::new("AppHdr is missing mandatory CreDt")),
    }

    if let Some(from) = node.child("Fr") {
        header.from = party_from_node(from);
    }
    if let Some(to) = node.child("To") {
        header.to = party_from_node(to);
    }

    header.business_service = node.child_text("BizSvc").map(str::to_string);
    header.character_set = node.child_text("CharSet").map(str::to_string);

    if let Some(code) = node.child_text("CpyDplct") {
        match CopyDuplicate::from_code(code) {
            Some(indicator) => header.copy_duplicate = Some(indicator),
            None => diagnostics.add_warning(ParseIssue::new(format!(
                "AppHdr CpyDplct '{code}' is not a known indicator"
            ))),
        }
    }

    if let Some(text) = node.child_text("PssblDplct") {
        match text {
            "true" | "1" => header.possible_duplicate = Some(true),
            "false" | "0" => header.possible_duplicate = Some(false),
            other => diagnostics.add_warning(ParseIssue::new(format!(
                "AppHdr PssblDplct '{other}' is not a boolean"
            ))),
        }
    }

    if let Some(code) = node.child_text("Prty") {
        match Priority::from_code(code) {
            Some(priority) => header.priority = Some(priority),
            None => diagnostics.add_warning(ParseIssue::new(format!(
                "AppHdr Prty '{code}' is not a known priority"
            ))),
        }
    }

    header.signature_present = node.child("Sgntr").is_some();

    if let Some(related) = node.child("Rltd") {
        header.related = Some(Arc::new(header_from_node(related, None, diagnostics)));
    }

    header
}

fn party_from_node(node: &XmlNode) -> Party {
    Party {
        name: node.descendant_text("Nm").map(str::to_string),
        bic: node
            .descendant_text("BICFI")
            .or_else(|| node.descendant_text("AnyBIC"))
            .map(str::to_string),
        other_id: node
            .descendant("Othr")
            .and_then(|o| o.child_text("Id"))
            .map(str::to_string),
    }
}

/// Type-erased document parser stored in the registry
#[async_trait]
pub trait ErasedDocumentParser: Send + Sync {
    fn supported_messages(&self) -> Vec<MessageIdentifier>;
    fn document_type_id(&self) -> TypeId;
    fn document_type_name(&self) -> &'static str;

    /// Parse and box the resulting [`ParsedDocument`]
    async fn parse_any(
        &self,
        stream: &mut (dyn SeekSource + '_),
        options: &ParseOptions,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Any + Send>>;
}

#[async_trait]
impl<P> ErasedDocumentParser for P
where
    P: DocumentParser + 'static,
{
    fn supported_messages(&self) -> Vec<MessageIdentifier> {
        DocumentParser::supported_messages(self).to_vec()
    }

    fn document_type_id(&self) -> TypeId {
        TypeId::of::<P::Document>()
    }

    fn document_type_name(&self) -> &'static str {
        std::any::type_name::<P::Document>()
    }

    async fn parse_any(
        &self,
        stream: &mut (dyn SeekSource + '_),
        options: &ParseOptions,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Any + Send>> {
        let mut stream = stream;
        let parsed = parse_document(self, &mut stream, options, cancel).await?;
        Ok(Box::new(parsed))
    }
}

/// Convenience entry points for document parsers
#[async_trait]
pub trait DocumentParserExt: DocumentParser {
    /// Parse a seekable stream with a fresh cancellation token
    async fn parse<S>(
        &self,
        stream: &mut S,
        options: &ParseOptions,
    ) -> Result<ParsedDocument<Self::Document>>
    where
        S: AsyncRead + AsyncSeek + Send + Unpin,
    {
        parse_document(self, stream, options, &CancellationToken::new()).await
    }

    /// Open a file and parse it
    async fn parse_from_path(
        &self,
        path: &Path,
        options: &ParseOptions,
    ) -> Result<ParsedDocument<Self::Document>> {
        let mut file = tokio::fs::File::open(path).await?;
        parse_document(self, &mut file, options, &CancellationToken::new()).await
    }

    /// Parse in-memory XML text
    async fn parse_from_text(
        &self,
        xml: &str,
        options: &ParseOptions,
    ) -> Result<ParsedDocument<Self::Document>> {
        let mut stream = std::io::Cursor::new(xml.as_bytes().to_vec());
        parse_document(self, &mut stream, options, &CancellationToken::new()).await
    }
}

impl<P: DocumentParser> DocumentParserExt for P {}
