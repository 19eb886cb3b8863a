//! Secure reader construction
//!
//! `XmlReaderFactory` produces pull cursors with consistent hardened
//! defaults: no DTD processing, no external entity resolution, bounded
//! entity expansion, comments and processing instructions ignored. Three
//! presets are exposed: default, validating (routes events through a
//! caller-supplied schema set), and large-file (same safeguards, document
//! size explicitly unlimited).

use std::io::SeekFrom;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncSeek, AsyncSeekExt, BufReader};

use iso20022_core::error::{Error, ParseIssue, Result};

use crate::cursor::{DynSource, XmlCursor, XmlEvent};

/// Async byte source for entry streaming; no seekability required
pub trait ReadSource: AsyncRead + Send + Unpin {}
impl<T: AsyncRead + Send + Unpin + ?Sized> ReadSource for T {}

/// Seekable async byte source, required for whole-document parsing and
/// `parse_with_context`
pub trait SeekSource: AsyncRead + AsyncSeek + Send + Unpin {}
impl<T: AsyncRead + AsyncSeek + Send + Unpin + ?Sized> SeekSource for T {}

/// Rewind a seekable source to its start
///
/// A source that reports itself seekable but fails the seek surfaces as
/// [`Error::StreamNotSeekable`].
pub async fn rewind<S: AsyncSeek + Send + Unpin + ?Sized>(stream: &mut S) -> Result<()> {
    stream
        .seek(SeekFrom::Start(0))
        .await
        .map_err(|_| Error::StreamNotSeekable)?;
    Ok(())
}

/// Total length of a seekable source, restoring the current position
pub async fn total_bytes<S: AsyncSeek + Send + Unpin + ?Sized>(stream: &mut S) -> Result<u64> {
    let position = stream
        .stream_position()
        .await
        .map_err(|_| Error::StreamNotSeekable)?;
    let total = stream
        .seek(SeekFrom::End(0))
        .await
        .map_err(|_| Error::StreamNotSeekable)?;
    stream
        .seek(SeekFrom::Start(position))
        .await
        .map_err(|_| Error::StreamNotSeekable)?;
    Ok(total)
}

/// Reader security and behavior settings
///
/// The defaults are the hardened baseline; `validate` rejects any
/// configuration that would re-enable DTD processing.
#[derive(Debug, Clone)]
pub struct ReaderSettings {
    /// DTD processing; must remain off
    pub allow_dtd: bool,
    /// Cumulative cap on expanded entity characters
    pub max_entity_expansion: usize,
    /// Upper bound on document size; `None` is explicitly unlimited
    pub max_document_bytes: Option<u64>,
    /// Keep whitespace-only text nodes
    pub preserve_whitespace: bool,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            allow_dtd: false,
            max_entity_expansion: 1024,
            max_document_bytes: None,
            preserve_whitespace: false,
        }
    }
}

impl ReaderSettings {
    /// Large-file preset: same safeguards, document size unlimited
    pub fn large_file() -> Self {
        Self {
            max_document_bytes: None,
            ..Self::default()
        }
    }

    /// Reject configurations that would weaken the security baseline
    pub fn validate(&self) -> Result<()> {
        if self.allow_dtd {
            return Err(Error::invalid_argument(
                "allow_dtd",
                "DTD processing cannot be enabled on iso20022 readers",
            ));
        }
        Ok(())
    }
}

/// Validation event routing flags for the validating preset
#[derive(Debug, Clone, Copy)]
pub struct ValidationFlags {
    pub process_identity_constraints: bool,
    pub report_warnings: bool,
}

impl Default for ValidationFlags {
    fn default() -> Self {
        Self {
            process_identity_constraints: true,
            report_warnings: true,
        }
    }
}

/// Compiled schema collection supplied by the caller
///
/// Schema compilation and the validation algorithm live outside this
/// library; the reader only routes its event stream through the set and
/// surfaces whatever issues it reports.
pub trait SchemaSet: Send + Sync {
    /// Inspect one reader event at the given depth and element path
    fn inspect(&self, event: &XmlEvent, depth: usize, path: &str) -> Vec<ParseIssue>;
}

/// Receiver for validation issues found by the schema set
pub type ValidationHandler = Arc<dyn Fn(ParseIssue) + Send + Sync>;

/// Internal pairing of a schema set with its routing state
pub(crate) struct SchemaHook {
    pub(crate) set: Arc<dyn SchemaSet>,
    pub(crate) handler: Option<ValidationHandler>,
    #[allow(dead_code)]
    pub(crate) flags: ValidationFlags,
    pub(crate) issues: Vec<ParseIssue>,
}

/// Constructs hardened pull cursors
pub struct XmlReaderFactory;

impl XmlReaderFactory {
    /// Create a cursor over an async byte source with default settings
    pub fn create<'a, S>(stream: S) -> XmlCursor<'a>
    where
        S: AsyncRead + Send + Unpin + 'a,
    {
        let source: DynSource<'a> = Box::new(BufReader::new(stream));
        XmlCursor::with_settings(source, ReaderSettings::default(), None)
    }

    /// Create a cursor over in-memory text
    pub fn create_from_text(text: impl Into<String>) -> XmlCursor<'static> {
        let bytes = std::io::Cursor::new(text.into().into_bytes());
        Self::create(bytes)
    }

    /// Create a cursor with explicit settings
    pub fn create_with_settings<'a, S>(stream: S, settings: ReaderSettings) -> Result<XmlCursor<'a>>
    where
        S: AsyncRead + Send + Unpin + 'a,
    {
        settings.validate()?;
        let source: DynSource<'a> = Box::new(BufReader::new(stream));
        Ok(XmlCursor::with_settings(source, settings, None))
    }

    /// Create a cursor over an already-buffered source
    pub fn create_buffered<'a, S>(stream: S, settings: ReaderSettings) -> Result<XmlCursor<'a>>
    where
        S: AsyncBufRead + Send + Unpin + 'a,
    {
        settings.validate()?;
        let source: DynSource<'a> = Box::new(stream);
        Ok(XmlCursor::with_settings(source, settings, None))
    }

    /// Create a validating cursor that routes events through a schema set
    ///
    /// Issues go to `handler` when supplied, otherwise they collect on the
    /// cursor for inspection after the parse.
    pub fn create_validating<'a, S>(
        stream: S,
        schema_set: Arc<dyn SchemaSet>,
        handler: Option<ValidationHandler>,
    ) -> XmlCursor<'a>
    where
        S: AsyncRead + Send + Unpin + 'a,
    {
        Self::create_validating_with_flags(stream, schema_set, handler, ValidationFlags::default())
    }

    /// Validating cursor with explicit routing flags
    pub fn create_validating_with_flags<'a, S>(
        stream: S,
        schema_set: Arc<dyn SchemaSet>,
        handler: Option<ValidationHandler>,
        flags: ValidationFlags,
    ) -> XmlCursor<'a>
    where
        S: AsyncRead + Send + Unpin + 'a,
    {
        let source: DynSource<'a> = Box::new(BufReader::new(stream));
        let hook = SchemaHook {
            set: schema_set,
            handler,
            flags,
            issues: Vec::new(),
        };
        XmlCursor::with_settings(source, ReaderSettings::default(), Some(hook))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_reject_dtd() {
        let settings = ReaderSettings {
            allow_dtd: true,
            ..ReaderSettings::default()
        };
        assert!(settings.validate().is_err());
        assert!(ReaderSettings::default().validate().is_ok());
    }

    #[test]
    fn test_large_file_preset_keeps_safeguards() {
        let settings = ReaderSettings::large_file();
        assert!(!settings.allow_dtd);
        assert_eq!(settings.max_entity_expansion, 1024);
        assert!(settings.max_document_bytes.is_none());
    }

    #[tokio::test]
    async fn test_rewind_and_total_bytes() {
        let mut stream = std::io::Cursor::new(b"0123456789".to_vec());
        assert_eq!(total_bytes(&mut stream).await.unwrap(), 10);
        stream.set_position(4);
        assert_eq!(total_bytes(&mut stream).await.unwrap(), 10);
        assert_eq!(stream.position(), 4);
        rewind(&mut stream).await.unwrap();
        assert_eq!(stream.position(), 0);
    }

    #[tokio::test]
    async fn test_create_buffered_source() {
        let buffered = tokio::io::BufReader::new(std::io::Cursor::new(b"<A>x</A>".to_vec()));
        let mut cursor =
            XmlReaderFactory::create_buffered(buffered, ReaderSettings::default()).unwrap();
        let root = cursor.next_start().await.unwrap().unwrap();
        assert_eq!(root.name, "A");
        assert_eq!(cursor.read_text().await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_validating_cursor_collects_issues() {
        struct RejectEverything;
        impl SchemaSet for RejectEverything {
            fn inspect(&self, event: &XmlEvent, _depth: usize, path: &str) -> Vec<ParseIssue> {
                match event {
                    XmlEvent::ElementStart(e) => {
                        vec![ParseIssue::new(format!("unexpected element {}", e.name))
                            .at(path.to_string(), 0)]
                    }
                    _ => Vec::new(),
                }
            }
        }

        let mut cursor = XmlReaderFactory::create_validating(
            std::io::Cursor::new(b"<A><B/></A>".to_vec()),
            Arc::new(RejectEverything),
            None,
        );
        while !matches!(cursor.next().await.unwrap(), XmlEvent::Eof) {}
        assert_eq!(cursor.validation_issues().len(), 2);
    }
}
