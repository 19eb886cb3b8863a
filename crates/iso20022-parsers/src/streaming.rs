//! Entry-level streaming
//!
//! `StreamingParser` implementations yield one entry at a time through a
//! lazy, single-pass asynchronous sequence with bounded memory. The
//! engine observes cancellation before every read and every yield,
//! reports progress at a fixed interval, and can skip failing entries
//! into a bounded error log instead of aborting.

use std::any::{Any, TypeId};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncSeek};
use tokio_util::sync::CancellationToken;

use iso20022_core::error::{Error, ParseIssue, Result};
use iso20022_core::header::ApplicationHeader;
use iso20022_core::identifier::MessageIdentifier;
use iso20022_core::options::ParseOptions;
use iso20022_core::progress::{report, ParseProgress, ParseStatus};

use crate::cursor::{ElementStart, XmlCursor, XmlEvent};
use crate::detect::MessageDetector;
use crate::document::{header_from_node, Diagnostics};
use crate::reader::{rewind, total_bytes, ReadSource, ReaderSettings, SeekSource, XmlReaderFactory};

/// Progress is reported every this many yielded entries
pub const PROGRESS_INTERVAL: u64 = 1_000;

/// Upper bound on the recovered-error log of a skip-errors run
pub const MAX_RECOVERED_ERRORS: usize = 1_024;

/// Subclass-facing trait for entry-streaming message parsers
#[async_trait]
pub trait StreamingParser: Send + Sync {
    /// One repeating unit of the message body
    type Entry: Send + 'static;
    /// Eagerly parsed header value
    type Header: Send + Sync + 'static;

    /// Message definitions this parser accepts
    fn supported_messages(&self) -> &[MessageIdentifier];

    /// Local name of the repeating element, e.g. `Ntry` or `CdtTrfTxInf`
    fn entry_element_name(&self) -> &str;

    /// Optional slash-joined path the entries must live under
    fn parent_element_path(&self) -> Option<&str> {
        None
    }

    /// Parse one entry
    ///
    /// The cursor is positioned just after the entry's start tag, which
    /// is passed as `entry`. Implementations must consume up to and
    /// including the entry's end tag.
    async fn parse_entry(
        &self,
        cursor: &mut XmlCursor<'_>,
        entry: &ElementStart,
        cancel: &CancellationToken,
    ) -> Result<Self::Entry>;

    /// Parse the eager header portion of the message
    ///
    /// Must not read past the first entry.
    async fn parse_header(
        &self,
        cursor: &mut XmlCursor<'_>,
        message_id: &MessageIdentifier,
    ) -> Result<Self::Header>;

    /// Entry count promised by the header, when it carries one
    fn expected_entry_count(&self, _header: &Self::Header) -> Option<u64> {
        None
    }
}

/// Lazy, single-pass asynchronous sequence of entries
///
/// The sequence owns its reader until fully consumed or dropped. It also
/// exposes the recovered-error log of a skip-errors run and the
/// cancellation token governing the parse.
pub struct EntrySequence<E> {
    inner: BoxStream<'static, Result<E>>,
    errors: Arc<Mutex<Vec<ParseIssue>>>,
    cancel: CancellationToken,
}

impl<E> EntrySequence<E> {
    /// Wrap an arbitrary stream; used by combinators and tests
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<E>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
            errors: Arc::new(Mutex::new(Vec::new())),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn new(
        inner: BoxStream<'static, Result<E>>,
        errors: Arc<Mutex<Vec<ParseIssue>>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            errors,
            cancel,
        }
    }

    pub(crate) fn parts(
        self,
    ) -> (
        BoxStream<'static, Result<E>>,
        Arc<Mutex<Vec<ParseIssue>>>,
        CancellationToken,
    ) {
        (self.inner, self.errors, self.cancel)
    }

    /// Errors recovered (skipped over) so far in a lenient run
    pub fn recovered_errors(&self) -> Vec<ParseIssue> {
        self.errors.lock().clone()
    }

    /// Cancellation token observed by this sequence
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Map each entry through a fallible function, keeping the error log
    /// and token
    pub fn map_results<U, F>(self, mut f: F) -> EntrySequence<U>
    where
        E: Send + 'static,
        U: Send + 'static,
        F: FnMut(E) -> Result<U> + Send + 'static,
    {
        let (inner, errors, cancel) = self.parts();
        let mapped = inner.map(move |item| item.and_then(&mut f));
        EntrySequence {
            inner: mapped.boxed(),
            errors,
            cancel,
        }
    }
}

impl<E> Stream for EntrySequence<E> {
    type Item = Result<E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

/// Result of `parse_with_context`: eager header, lazy entries
pub struct StreamingParseResult<E, H> {
    pub message_id: MessageIdentifier,
    pub header: H,
    pub application_header: Option<ApplicationHeader>,
    pub expected_entry_count: Option<u64>,
    pub entries: EntrySequence<E>,
}

impl<E, H: std::fmt::Debug> std::fmt::Debug for StreamingParseResult<E, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingParseResult")
            .field("message_id", &self.message_id)
            .field("header", &self.header)
            .field("application_header", &self.application_header)
            .field("expected_entry_count", &self.expected_entry_count)
            .finish_non_exhaustive()
    }
}

/// Stream entries out of an async byte source
///
/// This is the seekability-free entry point: detection and header
/// parsing are skipped, the source is consumed once front to back.
pub fn parse_entries<P, S>(
    parser: Arc<P>,
    stream: S,
    options: ParseOptions,
    cancel: CancellationToken,
) -> EntrySequence<P::Entry>
where
    P: StreamingParser + ?Sized + 'static,
    S: AsyncRead + Send + Unpin + 'static,
{
    let errors: Arc<Mutex<Vec<ParseIssue>>> = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&errors);
    let token = cancel.clone();

    let sequence = try_stream! {
        let settings = ReaderSettings {
            preserve_whitespace: options.preserve_whitespace,
            ..ReaderSettings::default()
        };
        let mut cursor = XmlReaderFactory::create_with_settings(stream, settings)?;

        report(options.progress.as_ref(), ParseProgress::starting(None));

        let entry_name = parser.entry_element_name().to_string();
        let parent_path = parser.parent_element_path().map(str::to_string);
        let mut yielded: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                Err(Error::Cancelled)?;
            }

            let event = cursor.next().await?;
            match event {
                XmlEvent::ElementStart(element)
                    if element.name == entry_name
                        && under_parent(&cursor, &entry_name, parent_path.as_deref()) =>
                {
                    let entry_depth = cursor.depth();
                    match parser.parse_entry(&mut cursor, &element, &cancel).await {
                        Ok(entry) => {
                            if cancel.is_cancelled() {
                                Err(Error::Cancelled)?;
                            }
                            yield entry;
                            yielded += 1;

                            if yielded % PROGRESS_INTERVAL == 0 {
                                report(
                                    options.progress.as_ref(),
                                    ParseProgress::entries(yielded, cursor.bytes_read(), None),
                                );
                            }
                            // Bound check after the yield.
                            if options.max_entries > 0 && yielded >= options.max_entries {
                                report(
                                    options.progress.as_ref(),
                                    ParseProgress::completed(cursor.bytes_read(), Some(yielded)),
                                );
                                break;
                            }
                        }
                        Err(err) if err.is_cancellation() => Err(err)?,
                        Err(err) => {
                            if options.stop_on_first_error {
                                report(
                                    options.progress.as_ref(),
                                    ParseProgress::failed(err.to_string()),
                                );
                                Err(err)?;
                            } else {
                                tracing::warn!(
                                    entry = %entry_name,
                                    error = %err,
                                    "skipping entry after parse failure"
                                );
                                let overflow = {
                                    let mut log = log.lock();
                                    log.push(
                                        ParseIssue::new(format!(
                                            "skipped {entry_name} entry: {err}"
                                        ))
                                        .at(cursor.path(), cursor.bytes_read()),
                                    );
                                    log.len() > MAX_RECOVERED_ERRORS
                                };
                                if overflow {
                                    Err(Error::ErrorLimitExceeded {
                                        count: MAX_RECOVERED_ERRORS,
                                    })?;
                                }
                                // Resync to the end of the failed entry.
                                cursor.skip_to_depth(entry_depth.saturating_sub(1)).await?;
                            }
                        }
                    }
                }
                XmlEvent::Eof => {
                    report(
                        options.progress.as_ref(),
                        ParseProgress::completed(cursor.bytes_read(), Some(yielded)),
                    );
                    break;
                }
                _ => {}
            }
        }
    };

    EntrySequence::new(sequence.boxed(), errors, token)
}

/// Detect, parse the header, then return a lazy entry sequence
///
/// Requires a seekable stream: the source is read three times (detect,
/// header, entries) by rewinding in between.
pub async fn parse_with_context<P, S>(
    parser: Arc<P>,
    mut stream: S,
    options: ParseOptions,
    cancel: CancellationToken,
) -> Result<StreamingParseResult<P::Entry, P::Header>>
where
    P: StreamingParser + ?Sized + 'static,
    S: AsyncRead + AsyncSeek + Send + Unpin + 'static,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let detection = {
        let mut cursor = XmlReaderFactory::create(&mut stream);
        MessageDetector::new().detect_cursor(&mut cursor).await?
    };

    if !parser.supported_messages().contains(&detection.message_id) {
        return Err(Error::ParserNotFound {
            id: detection.message_id,
            available: parser.supported_messages().to_vec(),
        });
    }

    let total = total_bytes(&mut stream).await.ok();
    rewind(&mut stream).await?;

    report(
        options.progress.as_ref(),
        ParseProgress::starting(total),
    );
    report(
        options.progress.as_ref(),
        ParseProgress::status(ParseStatus::ParsingHeader),
    );

    // Business application header, when the envelope carries one.
    let application_header = if detection.has_application_header
        && options.parse_application_header
    {
        let mut diagnostics = Diagnostics::new(options.collect_warnings);
        let header = {
            let mut cursor = XmlReaderFactory::create(&mut stream);
            extract_application_header(&mut cursor, &mut diagnostics).await?
        };
        for warning in diagnostics.warnings() {
            tracing::debug!(warning = %warning, "application header warning");
        }
        rewind(&mut stream).await?;
        header
    } else {
        None
    };

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // Eager header portion of the message body.
    let header = {
        let mut cursor = XmlReaderFactory::create(&mut stream);
        parser
            .parse_header(&mut cursor, &detection.message_id)
            .await?
    };
    rewind(&mut stream).await?;

    let expected_entry_count = parser.expected_entry_count(&header);
    let entries = parse_entries(parser, stream, options, cancel);

    Ok(StreamingParseResult {
        message_id: detection.message_id,
        header,
        application_header,
        expected_entry_count,
        entries,
    })
}

/// Check that the element just entered sits under the declared parent
/// path; with no declared parent, every occurrence qualifies
fn under_parent(cursor: &XmlCursor<'_>, entry_name: &str, parent: Option<&str>) -> bool {
    match parent {
        None => true,
        Some(parent) => {
            let path = cursor.path();
            match path.strip_suffix(entry_name) {
                Some(prefix) => prefix.trim_end_matches('/').ends_with(parent),
                None => false,
            }
        }
    }
}

async fn extract_application_header(
    cursor: &mut XmlCursor<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<Option<ApplicationHeader>> {
    match cursor.move_to_element("AppHdr").await? {
        Some(start) => {
            let namespace = start.namespace.clone();
            let node = cursor.read_subtree(&start).await?;
            Ok(Some(header_from_node(
                &node,
                namespace.as_deref(),
                diagnostics,
            )))
        }
        None => Ok(None),
    }
}

/// Count top-level occurrences of the parser's entry element
///
/// Nested occurrences of the same local name are excluded. The stream is
/// consumed.
pub async fn count_entries<P, S>(
    parser: &P,
    stream: S,
    cancel: &CancellationToken,
) -> Result<u64>
where
    P: StreamingParser + ?Sized,
    S: AsyncRead + Send + Unpin,
{
    let mut cursor = XmlReaderFactory::create(stream);
    let entry_name = parser.entry_element_name();
    let mut count: u64 = 0;
    let mut nesting: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match cursor.next().await? {
            XmlEvent::ElementStart(e) if e.name == entry_name => {
                if nesting == 0 {
                    count += 1;
                }
                nesting += 1;
            }
            XmlEvent::ElementEnd { name } if name == entry_name => {
                nesting = nesting.saturating_sub(1);
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }

    Ok(count)
}

/// Type-erased streaming parser stored in the registry
#[async_trait]
pub trait ErasedStreamingParser: Send + Sync {
    fn supported_messages(&self) -> Vec<MessageIdentifier>;
    fn entry_element_name(&self) -> String;
    fn entry_type_id(&self) -> TypeId;
    fn entry_type_name(&self) -> &'static str;

    fn parse_entries_any(
        self: Arc<Self>,
        stream: Box<dyn ReadSource>,
        options: ParseOptions,
        cancel: CancellationToken,
    ) -> EntrySequence<Box<dyn Any + Send>>;

    async fn parse_with_context_any(
        self: Arc<Self>,
        stream: Box<dyn SeekSource>,
        options: ParseOptions,
        cancel: CancellationToken,
    ) -> Result<StreamingParseResult<Box<dyn Any + Send>, Box<dyn Any + Send>>>;

    async fn count_entries_any(
        &self,
        stream: Box<dyn ReadSource>,
        cancel: CancellationToken,
    ) -> Result<u64>;
}

#[async_trait]
impl<P> ErasedStreamingParser for P
where
    P: StreamingParser + 'static,
{
    fn supported_messages(&self) -> Vec<MessageIdentifier> {
        StreamingParser::supported_messages(self).to_vec()
    }

    fn entry_element_name(&self) -> String {
        StreamingParser::entry_element_name(self).to_string()
    }

    fn entry_type_id(&self) -> TypeId {
        TypeId::of::<P::Entry>()
    }

    fn entry_type_name(&self) -> &'static str {
        std::any::type_name::<P::Entry>()
    }

    fn parse_entries_any(
        self: Arc<Self>,
        stream: Box<dyn ReadSource>,
        options: ParseOptions,
        cancel: CancellationToken,
    ) -> EntrySequence<Box<dyn Any + Send>> {
        parse_entries(self, stream, options, cancel)
            .map_results(|entry| Ok(Box::new(entry) as Box<dyn Any + Send>))
    }

    async fn parse_with_context_any(
        self: Arc<Self>,
        stream: Box<dyn SeekSource>,
        options: ParseOptions,
        cancel: CancellationToken,
    ) -> Result<StreamingParseResult<Box<dyn Any + Send>, Box<dyn Any + Send>>> {
        let result = parse_with_context(self, stream, options, cancel).await?;
        Ok(StreamingParseResult {
            message_id: result.message_id,
            header: Box::new(result.header) as Box<dyn Any + Send>,
            application_header: result.application_header,
            expected_entry_count: result.expected_entry_count,
            entries: result
                .entries
                .map_results(|entry| Ok(Box::new(entry) as Box<dyn Any + Send>)),
        })
    }

    async fn count_entries_any(
        &self,
        stream: Box<dyn ReadSource>,
        cancel: CancellationToken,
    ) -> Result<u64> {
        count_entries(self, stream, &cancel).await
    }
}
