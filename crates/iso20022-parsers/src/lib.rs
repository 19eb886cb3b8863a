//! iso20022-parsers
//!
//! Streaming parser core for ISO 20022 financial messages: hardened
//! pull readers, message-type detection, a process-safe parser
//! registry, a whole-document parse template, and an entry-level
//! streaming engine with pipeline combinators.
//!
//! # Example
//!
//! ```rust,ignore
//! use iso20022_parsers::{MessageDetector, ParserFactory};
//!
//! let detector = MessageDetector::new();
//! let detection = detector.detect(stream).await?;
//! let parser = ParserFactory::new().create_parser::<Statement>(&detection.message_id)?;
//! ```

pub mod combinators;
pub mod cursor;
pub mod detect;
pub mod document;
pub mod logging;
pub mod namespace;
pub mod reader;
pub mod registry;
pub mod streaming;

// Re-export main types
pub use cursor::{DateValue, ElementStart, XmlCursor, XmlEvent, XmlNode};
pub use detect::{MessageDetectionResult, MessageDetector, MessageVariant};
pub use document::{
    parse_document, Diagnostics, DocumentParser, DocumentParserExt, ErasedDocumentParser,
    ParsedDocument,
};
pub use namespace::{
    identify_namespace, register_namespace, NamespaceKind, NamespaceRegistry, GLOBAL_NAMESPACES,
};
pub use reader::{
    ReadSource, ReaderSettings, SchemaSet, SeekSource, ValidationFlags, ValidationHandler,
    XmlReaderFactory,
};
pub use registry::{
    ParserFactory, ParserRegistration, ParserRegistry, TypedDocumentParser, TypedStreamingParser,
    GLOBAL_REGISTRY,
};
pub use streaming::{
    count_entries, parse_entries, parse_with_context, EntrySequence, ErasedStreamingParser,
    StreamingParseResult, StreamingParser, MAX_RECOVERED_ERRORS, PROGRESS_INTERVAL,
};

pub use iso20022_core::error::{Error, ParseIssue, Result};
pub use iso20022_core::header::ApplicationHeader;
pub use iso20022_core::identifier::MessageIdentifier;
pub use iso20022_core::options::ParseOptions;
pub use iso20022_core::progress::{ParseProgress, ParseStatus, ProgressSink};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
