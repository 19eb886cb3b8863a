//! Parser registry for dynamic parser dispatch
//!
//! The registry is a process-safe map from message identifier to a
//! zero-argument parser constructor. The factory resolves identifiers to
//! typed parser handles, verifying at construction that the registered
//! parser produces the requested document or entry type.

use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use iso20022_core::error::{Error, Result};
use iso20022_core::identifier::MessageIdentifier;
use iso20022_core::options::ParseOptions;

use crate::detect::{MessageDetector, MessageDetectionResult};
use crate::document::{DocumentParser, ErasedDocumentParser, ParsedDocument};
use crate::reader::SeekSource;
use crate::streaming::{
    EntrySequence, ErasedStreamingParser, StreamingParseResult, StreamingParser,
};

/// Constructor closure for document parsers
pub type DocumentParserConstructor =
    Box<dyn Fn() -> Arc<dyn ErasedDocumentParser> + Send + Sync>;

/// Constructor closure for streaming parsers
pub type StreamingParserConstructor =
    Box<dyn Fn() -> Arc<dyn ErasedStreamingParser> + Send + Sync>;

/// Registration record, immutable once installed
#[derive(Debug, Clone)]
pub struct ParserRegistration {
    /// Message definition the parser handles
    pub message_id: MessageIdentifier,
    /// Type name of the produced document (or entry, for streaming)
    pub document_type_name: &'static str,
    /// Type name of the parser itself
    pub parser_type_name: &'static str,
    /// Whether this is the streaming slot
    pub supports_streaming: bool,
    /// When the registration was installed
    pub registered_at: DateTime<Utc>,
}

struct DocumentSlot {
    info: ParserRegistration,
    document_type: TypeId,
    constructor: DocumentParserConstructor,
}

struct StreamingSlot {
    info: ParserRegistration,
    entry_type: TypeId,
    constructor: StreamingParserConstructor,
}

/// Process-safe map from message identifier to parser constructors
///
/// Lookup and iteration take snapshots and stay safe while other threads
/// register.
pub struct ParserRegistry {
    documents: RwLock<HashMap<MessageIdentifier, DocumentSlot>>,
    streaming: RwLock<HashMap<MessageIdentifier, StreamingSlot>>,
}

impl ParserRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            streaming: RwLock::new(HashMap::new()),
        }
    }

    /// Register a document parser constructor
    ///
    /// Fails with [`Error::ParserAlreadyRegistered`] when the identifier
    /// already has a document slot.
    pub fn register<P, F>(&self, id: MessageIdentifier, constructor: F) -> Result<()>
    where
        P: DocumentParser + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        let mut documents = self.documents.write();
        if documents.contains_key(&id) {
            return Err(Error::ParserAlreadyRegistered { id });
        }
        documents.insert(id.clone(), Self::document_slot(id, constructor));
        Ok(())
    }

    /// Register a document parser, replacing any existing slot
    pub fn register_or_replace<P, F>(&self, id: MessageIdentifier, constructor: F)
    where
        P: DocumentParser + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        let mut documents = self.documents.write();
        documents.insert(id.clone(), Self::document_slot(id, constructor));
    }

    fn document_slot<P, F>(id: MessageIdentifier, constructor: F) -> DocumentSlot
    where
        P: DocumentParser + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        tracing::info!(id = %id, parser = std::any::type_name::<P>(), "registering parser");
        DocumentSlot {
            info: ParserRegistration {
                message_id: id,
                document_type_name: std::any::type_name::<P::Document>(),
                parser_type_name: std::any::type_name::<P>(),
                supports_streaming: false,
                registered_at: Utc::now(),
            },
            document_type: TypeId::of::<P::Document>(),
            constructor: Box::new(move || Arc::new(constructor())),
        }
    }

    /// Register a streaming parser constructor under the streaming slot
    pub fn register_streaming<P, F>(&self, id: MessageIdentifier, constructor: F) -> Result<()>
    where
        P: StreamingParser + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        let mut streaming = self.streaming.write();
        if streaming.contains_key(&id) {
            return Err(Error::ParserAlreadyRegistered { id });
        }
        streaming.insert(id.clone(), Self::streaming_slot(id, constructor));
        Ok(())
    }

    /// Register a streaming parser, replacing any existing slot
    pub fn register_streaming_or_replace<P, F>(&self, id: MessageIdentifier, constructor: F)
    where
        P: StreamingParser + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        let mut streaming = self.streaming.write();
        streaming.insert(id.clone(), Self::streaming_slot(id, constructor));
    }

    fn streaming_slot<P, F>(id: MessageIdentifier, constructor: F) -> StreamingSlot
    where
        P: StreamingParser + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        tracing::info!(id = %id, parser = std::any::type_name::<P>(), "registering streaming parser");
        StreamingSlot {
            info: ParserRegistration {
                message_id: id,
                document_type_name: std::any::type_name::<P::Entry>(),
                parser_type_name: std::any::type_name::<P>(),
                supports_streaming: true,
                registered_at: Utc::now(),
            },
            entry_type: TypeId::of::<P::Entry>(),
            constructor: Box::new(move || Arc::new(constructor())),
        }
    }

    /// Remove both slots for an identifier; returns whether anything was
    /// removed
    pub fn unregister(&self, id: &MessageIdentifier) -> bool {
        let removed_document = self.documents.write().remove(id).is_some();
        let removed_streaming = self.streaming.write().remove(id).is_some();
        removed_document || removed_streaming
    }

    /// Whether any slot exists for the identifier
    pub fn is_registered(&self, id: &MessageIdentifier) -> bool {
        self.documents.read().contains_key(id) || self.streaming.read().contains_key(id)
    }

    /// Sorted snapshot of all registered identifiers
    pub fn registered_messages(&self) -> Vec<MessageIdentifier> {
        let mut ids: Vec<MessageIdentifier> = self
            .documents
            .read()
            .keys()
            .chain(self.streaming.read().keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Registration record for an identifier, document slot first
    pub fn get_registration(&self, id: &MessageIdentifier) -> Option<ParserRegistration> {
        if let Some(slot) = self.documents.read().get(id) {
            return Some(slot.info.clone());
        }
        self.streaming.read().get(id).map(|slot| slot.info.clone())
    }

    /// Snapshot of every registration record
    pub fn registrations(&self) -> Vec<ParserRegistration> {
        let mut all: Vec<ParserRegistration> = self
            .documents
            .read()
            .values()
            .map(|slot| slot.info.clone())
            .chain(self.streaming.read().values().map(|slot| slot.info.clone()))
            .collect();
        all.sort_by(|a, b| a.message_id.cmp(&b.message_id));
        all
    }

    fn construct_document(
        &self,
        id: &MessageIdentifier,
    ) -> Option<(Arc<dyn ErasedDocumentParser>, TypeId, &'static str)> {
        let documents = self.documents.read();
        let slot = documents.get(id)?;
        Some((
            (slot.constructor)(),
            slot.document_type,
            slot.info.document_type_name,
        ))
    }

    fn construct_streaming(
        &self,
        id: &MessageIdentifier,
    ) -> Option<(Arc<dyn ErasedStreamingParser>, TypeId, &'static str)> {
        let streaming = self.streaming.read();
        let slot = streaming.get(id)?;
        Some((
            (slot.constructor)(),
            slot.entry_type,
            slot.info.document_type_name,
        ))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide registry instance
pub static GLOBAL_REGISTRY: Lazy<Arc<ParserRegistry>> =
    Lazy::new(|| Arc::new(ParserRegistry::new()));

/// Typed handle over a registered document parser
///
/// Produced by the factory after the document type tag was verified, so
/// the downcast after parsing cannot fail.
pub struct TypedDocumentParser<D> {
    inner: Arc<dyn ErasedDocumentParser>,
    _marker: PhantomData<fn() -> D>,
}

impl<D: Send + 'static> TypedDocumentParser<D> {
    /// Messages the underlying parser declares
    pub fn supported_messages(&self) -> Vec<MessageIdentifier> {
        self.inner.supported_messages()
    }

    /// Run the whole-document template over a seekable stream
    pub async fn parse<S>(
        &self,
        stream: &mut S,
        options: &ParseOptions,
        cancel: &CancellationToken,
    ) -> Result<ParsedDocument<D>>
    where
        S: AsyncRead + AsyncSeek + Send + Unpin,
    {
        let dyn_stream: &mut dyn SeekSource = stream;
        let boxed = self.inner.parse_any(dyn_stream, options, cancel).await?;
        boxed
            .downcast::<ParsedDocument<D>>()
            .map(|parsed| *parsed)
            .map_err(|_| Error::ParserTypeMismatch {
                expected: std::any::type_name::<D>().to_string(),
                actual: self.inner.document_type_name().to_string(),
            })
    }
}

/// Typed handle over a registered streaming parser
pub struct TypedStreamingParser<E> {
    inner: Arc<dyn ErasedStreamingParser>,
    _marker: PhantomData<fn() -> E>,
}

impl<E> std::fmt::Debug for TypedStreamingParser<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedStreamingParser")
            .field("entry_element_name", &self.inner.entry_element_name())
            .finish_non_exhaustive()
    }
}

impl<E: Send + 'static> TypedStreamingParser<E> {
    /// Messages the underlying parser declares
    pub fn supported_messages(&self) -> Vec<MessageIdentifier> {
        self.inner.supported_messages()
    }

    /// Local name of the repeating element
    pub fn entry_element_name(&self) -> String {
        self.inner.entry_element_name()
    }

    /// Stream entries out of a byte source; no seekability required
    pub fn parse_entries<S>(
        &self,
        stream: S,
        options: ParseOptions,
        cancel: CancellationToken,
    ) -> EntrySequence<E>
    where
        S: AsyncRead + Send + Unpin + 'static,
    {
        let expected = std::any::type_name::<E>();
        let actual = self.inner.entry_type_name();
        self.inner
            .clone()
            .parse_entries_any(Box::new(stream), options, cancel)
            .map_results(move |boxed| {
                boxed
                    .downcast::<E>()
                    .map(|entry| *entry)
                    .map_err(|_| Error::ParserTypeMismatch {
                        expected: expected.to_string(),
                        actual: actual.to_string(),
                    })
            })
    }

    /// Detect, parse the header eagerly, and stream entries lazily
    pub async fn parse_with_context<S>(
        &self,
        stream: S,
        options: ParseOptions,
        cancel: CancellationToken,
    ) -> Result<StreamingParseResult<E, Box<dyn std::any::Any + Send>>>
    where
        S: AsyncRead + AsyncSeek + Send + Unpin + 'static,
    {
        let expected = std::any::type_name::<E>();
        let actual = self.inner.entry_type_name();
        let result = self
            .inner
            .clone()
            .parse_with_context_any(Box::new(stream), options, cancel)
            .await?;
        Ok(StreamingParseResult {
            message_id: result.message_id,
            header: result.header,
            application_header: result.application_header,
            expected_entry_count: result.expected_entry_count,
            entries: result.entries.map_results(move |boxed| {
                boxed
                    .downcast::<E>()
                    .map(|entry| *entry)
                    .map_err(|_| Error::ParserTypeMismatch {
                        expected: expected.to_string(),
                        actual: actual.to_string(),
                    })
            }),
        })
    }

    /// Count top-level entry elements; consumes the stream
    pub async fn count_entries<S>(&self, stream: S, cancel: CancellationToken) -> Result<u64>
    where
        S: AsyncRead + Send + Unpin + 'static,
    {
        self.inner.count_entries_any(Box::new(stream), cancel).await
    }
}

/// Resolves identifiers to typed parser handles
pub struct ParserFactory {
    registry: Arc<ParserRegistry>,
}

impl ParserFactory {
    /// Factory over the global registry
    pub fn new() -> Self {
        Self {
            registry: Arc::clone(&GLOBAL_REGISTRY),
        }
    }

    /// Factory over an explicit registry
    pub fn with_registry(registry: Arc<ParserRegistry>) -> Self {
        Self { registry }
    }

    /// Construct the registered document parser for an identifier,
    /// verifying it produces `D`
    pub fn create_parser<D: Send + 'static>(
        &self,
        id: &MessageIdentifier,
    ) -> Result<TypedDocumentParser<D>> {
        let (parser, document_type, type_name) =
            self.registry.construct_document(id).ok_or_else(|| {
                Error::ParserNotFound {
                    id: id.clone(),
                    available: self.registry.registered_messages(),
                }
            })?;

        if document_type != TypeId::of::<D>() {
            return Err(Error::ParserTypeMismatch {
                expected: std::any::type_name::<D>().to_string(),
                actual: type_name.to_string(),
            });
        }

        Ok(TypedDocumentParser {
            inner: parser,
            _marker: PhantomData,
        })
    }

    /// Construct the registered streaming parser for an identifier,
    /// verifying it yields `E` entries
    pub fn create_streaming_parser<E: Send + 'static>(
        &self,
        id: &MessageIdentifier,
    ) -> Result<TypedStreamingParser<E>> {
        let (parser, entry_type, type_name) =
            self.registry.construct_streaming(id).ok_or_else(|| {
                Error::ParserNotFound {
                    id: id.clone(),
                    available: self.registry.registered_messages(),
                }
            })?;

        if entry_type != TypeId::of::<E>() {
            return Err(Error::ParserTypeMismatch {
                expected: std::any::type_name::<E>().to_string(),
                actual: type_name.to_string(),
            });
        }

        Ok(TypedStreamingParser {
            inner: parser,
            _marker: PhantomData,
        })
    }

    /// Whether a parser exists for the identifier, without constructing
    pub fn supports_message(&self, id: &MessageIdentifier) -> bool {
        self.registry.is_registered(id)
    }

    /// Whether any registered parser belongs to the business area
    pub fn supports_business_area(&self, area: &str) -> bool {
        self.registry
            .registered_messages()
            .iter()
            .any(|id| id.in_business_area(area))
    }

    /// Detect the message on a seekable stream and resolve its parser
    ///
    /// The stream position is restored to its value before detection.
    pub async fn detect_and_create_parser<S>(
        &self,
        stream: &mut S,
    ) -> Result<(Arc<dyn ErasedDocumentParser>, MessageDetectionResult)>
    where
        S: AsyncRead + AsyncSeek + Send + Unpin,
    {
        let position = stream
            .stream_position()
            .await
            .map_err(|_| Error::StreamNotSeekable)?;

        let detection = {
            let mut cursor = crate::reader::XmlReaderFactory::create(&mut *stream);
            MessageDetector::new().detect_cursor(&mut cursor).await?
        };

        stream
            .seek(std::io::SeekFrom::Start(position))
            .await
            .map_err(|_| Error::StreamNotSeekable)?;

        let (parser, _, _) = self
            .registry
            .construct_document(&detection.message_id)
            .ok_or_else(|| Error::ParserNotFound {
                id: detection.message_id.clone(),
                available: self.registry.registered_messages(),
            })?;

        Ok((parser, detection))
    }

    /// `detect_and_create_parser` with a document-type assertion
    pub async fn detect_and_create_parser_as<D, S>(
        &self,
        stream: &mut S,
    ) -> Result<(TypedDocumentParser<D>, MessageDetectionResult)>
    where
        D: Send + 'static,
        S: AsyncRead + AsyncSeek + Send + Unpin,
    {
        let position = stream
            .stream_position()
            .await
            .map_err(|_| Error::StreamNotSeekable)?;

        let detection = {
            let mut cursor = crate::reader::XmlReaderFactory::create(&mut *stream);
            MessageDetector::new().detect_cursor(&mut cursor).await?
        };

        stream
            .seek(std::io::SeekFrom::Start(position))
            .await
            .map_err(|_| Error::StreamNotSeekable)?;

        let parser = self.create_parser::<D>(&detection.message_id)?;
        Ok((parser, detection))
    }
}

impl Default for ParserFactory {
    fn default() -> Self {
        Self::new()
    }
}
