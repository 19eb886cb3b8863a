//! Progress reporting during parsing

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Phases of a parse operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseStatus {
    Starting,
    ParsingHeader,
    ParsingBody,
    ParsingEntries,
    Completed,
    Failed,
}

/// Progress information emitted through the progress sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseProgress {
    /// Current phase
    pub status: ParseStatus,
    /// Bytes consumed from the source so far
    pub bytes_read: Option<u64>,
    /// Total bytes in the source, when known
    pub total_bytes: Option<u64>,
    /// Entries yielded so far (streaming parsers only)
    pub entries_parsed: Option<u64>,
    /// Free-form detail, e.g. the failure message
    pub message: Option<String>,
}

impl ParseProgress {
    /// Progress value for a given status with no counters
    pub fn status(status: ParseStatus) -> Self {
        Self {
            status,
            bytes_read: None,
            total_bytes: None,
            entries_parsed: None,
            message: None,
        }
    }

    /// `Starting` progress with the total size when known
    pub fn starting(total_bytes: Option<u64>) -> Self {
        Self {
            total_bytes,
            ..Self::status(ParseStatus::Starting)
        }
    }

    /// `ParsingEntries` progress snapshot
    pub fn entries(entries_parsed: u64, bytes_read: u64, total_bytes: Option<u64>) -> Self {
        Self {
            bytes_read: Some(bytes_read),
            total_bytes,
            entries_parsed: Some(entries_parsed),
            ..Self::status(ParseStatus::ParsingEntries)
        }
    }

    /// `Completed` progress with final counters
    pub fn completed(bytes_read: u64, entries_parsed: Option<u64>) -> Self {
        Self {
            bytes_read: Some(bytes_read),
            entries_parsed,
            ..Self::status(ParseStatus::Completed)
        }
    }

    /// `Failed` progress carrying the failure message
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::status(ParseStatus::Failed)
        }
    }

    /// Percentage complete (0.0 - 1.0), derived from byte counters
    pub fn percent_complete(&self) -> Option<f64> {
        match (self.bytes_read, self.total_bytes) {
            (Some(read), Some(total)) if total > 0 => Some(read as f64 / total as f64),
            (Some(_), Some(_)) => Some(1.0),
            _ => None,
        }
    }
}

/// Sink that receives progress values during a parse call
pub type ProgressSink = Arc<dyn Fn(ParseProgress) + Send + Sync>;

/// Send a progress value to an optional sink
pub fn report(sink: Option<&ProgressSink>, progress: ParseProgress) {
    if let Some(sink) = sink {
        sink(progress);
    }
}
