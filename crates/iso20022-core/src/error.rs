//! Unified error handling for the iso20022 crates
//!
//! This module provides a comprehensive error type that encompasses
//! all failures across detection, registry dispatch, and parsing.

use thiserror::Error;

use crate::identifier::MessageIdentifier;

/// Unified error type for all iso20022 operations
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A seekable stream was required but the source could not seek
    #[error("Stream is not seekable")]
    StreamNotSeekable,

    // ==================== Detection Errors ====================

    /// The message type could not be determined from the document prolog
    #[error("Message detection failed: {message} (root: {root:?}, namespace: {namespace:?})")]
    MessageDetection {
        message: String,
        root: Option<String>,
        namespace: Option<String>,
    },

    /// A message identifier string did not match `area.type.variant.version`
    #[error("Invalid message identifier '{text}': {message}")]
    InvalidIdentifier {
        text: String,
        message: String,
    },

    // ==================== Registry Errors ====================

    /// No parser registered for the detected identifier
    #[error("No parser registered for {} (available: {})", .id, format_identifiers(.available))]
    ParserNotFound {
        id: MessageIdentifier,
        available: Vec<MessageIdentifier>,
    },

    /// The registered parser produces a different document type than requested
    #[error("Parser type mismatch: expected {expected}, found {actual}")]
    ParserTypeMismatch {
        expected: String,
        actual: String,
    },

    /// Registry collision on `register`
    #[error("Parser already registered for {id}")]
    ParserAlreadyRegistered {
        id: MessageIdentifier,
    },

    // ==================== XML Errors ====================

    /// The reader encountered ill-formed XML, a DTD, or an external entity
    #[error("XML not well-formed{}: {}", format_offset(.offset), .message)]
    XmlWellFormedness {
        message: String,
        offset: Option<u64>,
    },

    /// Produced by the validating reader's event stream
    #[error("Schema validation failed: {} issue(s)", .issues.len())]
    SchemaValidation {
        issues: Vec<ParseIssue>,
    },

    /// Element content did not parse as the requested type
    #[error("Invalid element content{}: {}", format_offset(.offset), .message)]
    InvalidContent {
        message: String,
        offset: Option<u64>,
    },

    // ==================== Parsing Errors ====================

    /// Aggregate of collected errors and warnings
    #[error("Parsing failed with {} error(s) and {} warning(s)", .errors.len(), .warnings.len())]
    ParsingFailed {
        errors: Vec<ParseIssue>,
        warnings: Vec<ParseIssue>,
    },

    /// The bounded error log of a skip-errors run overflowed
    #[error("Recovered-error limit exceeded after {count} entries")]
    ErrorLimitExceeded {
        count: usize,
    },

    // ==================== General Errors ====================

    /// An argument was outside its valid range
    #[error("Invalid argument '{name}': {message}")]
    InvalidArgument {
        name: &'static str,
        message: String,
    },

    /// Operation cancelled; never converted into any other kind
    #[error("Operation cancelled")]
    Cancelled,
}

fn format_identifiers(ids: &[MessageIdentifier]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_offset(offset: &Option<u64>) -> String {
    match offset {
        Some(o) => format!(" at byte {o}"),
        None => String::new(),
    }
}

/// Result type using the unified Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a detection error
    pub fn detection(
        message: impl Into<String>,
        root: Option<String>,
        namespace: Option<String>,
    ) -> Self {
        Error::MessageDetection {
            message: message.into(),
            root,
            namespace,
        }
    }

    /// Create a well-formedness error without position information
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::XmlWellFormedness {
            message: message.into(),
            offset: None,
        }
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            name,
            message: message.into(),
        }
    }

    /// Check if this error is a cancellation signal
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Check if this is a detection-stage error
    pub fn is_detection_error(&self) -> bool {
        matches!(
            self,
            Error::MessageDetection { .. } | Error::InvalidIdentifier { .. }
        )
    }

    /// Check if this is a registry "not found" style error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ParserNotFound { .. })
    }

    /// Check if this error came from the XML layer itself
    pub fn is_well_formedness(&self) -> bool {
        matches!(self, Error::XmlWellFormedness { .. })
    }
}

/// Structured error or warning record collected during a parse
///
/// Carries enough context to locate the offending node: the XML path of
/// the nearest enclosing element, the byte offset into the source, and
/// line/column when the reader can supply them.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParseIssue {
    pub message: String,
    pub path: Option<String>,
    pub offset: Option<u64>,
    pub line: Option<u64>,
    pub column: Option<u64>,
    pub cause: Option<String>,
}

impl ParseIssue {
    /// Create an issue with a message only
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            offset: None,
            line: None,
            column: None,
            cause: None,
        }
    }

    /// Attach the element path and byte offset where the issue was seen
    pub fn at(mut self, path: impl Into<String>, offset: u64) -> Self {
        self.path = Some(path.into());
        self.offset = Some(offset);
        self
    }

    /// Attach the underlying cause
    pub fn caused_by(mut self, cause: impl std::fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

impl std::fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(path) = &self.path {
            write!(f, " at {path}")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " (byte {offset})")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_not_found_lists_available() {
        let err = Error::ParserNotFound {
            id: MessageIdentifier::parse("camt.053.001.08").unwrap(),
            available: vec![
                MessageIdentifier::parse("pain.001.001.09").unwrap(),
                MessageIdentifier::parse("pain.001.001.10").unwrap(),
            ],
        };

        let text = err.to_string();
        assert!(text.contains("camt.053.001.08"));
        assert!(text.contains("pain.001.001.09"));
        assert!(text.contains("pain.001.001.10"));
    }

    #[test]
    fn test_cancelled_is_cancellation() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(!Error::StreamNotSeekable.is_cancellation());
    }

    #[test]
    fn test_issue_display_carries_context() {
        let issue = ParseIssue::new("bad amount")
            .at("Ntry/Amt", 412)
            .caused_by("invalid digit");

        let text = issue.to_string();
        assert!(text.contains("bad amount"));
        assert!(text.contains("Ntry/Amt"));
        assert!(text.contains("412"));
        assert!(text.contains("invalid digit"));
    }

    #[test]
    fn test_well_formedness_display_mentions_offset() {
        let err = Error::XmlWellFormedness {
            message: "DOCTYPE is not allowed".into(),
            offset: Some(7),
        };
        assert!(err.to_string().contains("byte 7"));
        assert!(err.is_well_formedness());
    }
}
