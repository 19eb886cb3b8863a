//! Configuration options for parsing

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::progress::ProgressSink;

/// Configuration options for a single parse call
///
/// Options are owned by one parse call and never shared between calls.
#[derive(Clone, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Whether to run the validating reader preset
    pub validate_schema: bool,
    /// Location of the schema set used when `validate_schema` is on
    pub schema_path: Option<PathBuf>,
    /// Abort on the first collected error instead of appending and continuing
    pub stop_on_first_error: bool,
    /// Collect warnings for suboptimal-but-usable content
    pub collect_warnings: bool,
    /// Extract the business application header when the envelope carries one
    pub parse_application_header: bool,
    /// Keep whitespace-only text nodes instead of trimming them
    pub preserve_whitespace: bool,
    /// Stop the entry sequence after this many entries (0 = unlimited)
    pub max_entries: u64,
    /// Optional progress sink
    #[serde(skip)]
    pub progress: Option<ProgressSink>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            validate_schema: false,
            schema_path: None,
            stop_on_first_error: true,
            collect_warnings: true,
            parse_application_header: true,
            preserve_whitespace: false,
            max_entries: 0,
            progress: None,
        }
    }
}

impl ParseOptions {
    /// Options that skip recoverable errors instead of aborting
    pub fn lenient() -> Self {
        Self {
            stop_on_first_error: false,
            ..Self::default()
        }
    }

    /// Attach a progress sink
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Cap the entry sequence at `max_entries`
    pub fn with_max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("validate_schema", &self.validate_schema)
            .field("schema_path", &self.schema_path)
            .field("stop_on_first_error", &self.stop_on_first_error)
            .field("collect_warnings", &self.collect_warnings)
            .field("parse_application_header", &self.parse_application_header)
            .field("preserve_whitespace", &self.preserve_whitespace)
            .field("max_entries", &self.max_entries)
            .field("progress", &self.progress.as_ref().map(|_| "<sink>"))
            .finish()
    }
}
