//! Business application header values
//!
//! The BAH (`head.001.001.*`) carries routing and identification metadata
//! shared across message families. Values are built once during parsing
//! and immutable afterwards; `related` is a shared back-reference to a
//! prior header, never a cycle, because headers are built bottom-up.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::identifier::MessageIdentifier;

/// A sending or receiving party in a business application header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Party {
    /// Organisation or financial institution name
    pub name: Option<String>,
    /// BIC of the institution, when identified that way
    pub bic: Option<String>,
    /// Any other scheme identification found under the party element
    pub other_id: Option<String>,
}

/// `CpyDplct` indicator codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDuplicate {
    Copy,
    Duplicate,
}

impl CopyDuplicate {
    /// Map the ISO code (`COPY`, `DUPL`) to the indicator
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "COPY" => Some(CopyDuplicate::Copy),
            "DUPL" => Some(CopyDuplicate::Duplicate),
            _ => None,
        }
    }
}

/// `Prty` priority codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    Urgent,
    High,
}

impl Priority {
    /// Map the ISO code (`NORM`, `URGT`, `HIGH`) to the priority
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "NORM" => Some(Priority::Normal),
            "URGT" => Some(Priority::Urgent),
            "HIGH" => Some(Priority::High),
            _ => None,
        }
    }
}

/// Parsed business application header
///
/// Missing mandatory fields are reported as warnings by the parser and
/// left at their defaults here, so a header value always exists once an
/// `AppHdr` element was seen.
#[derive(Debug, Clone, Default)]
pub struct ApplicationHeader {
    /// Header definition version (`head.001.001.*`)
    pub version: MessageIdentifier,
    /// Sending party (`Fr`)
    pub from: Party,
    /// Receiving party (`To`)
    pub to: Party,
    /// `BizMsgIdr`
    pub business_message_identifier: String,
    /// `MsgDefIdr`, verbatim as found in the document
    pub message_definition_identifier: String,
    /// `CreDt`, ISO-8601 with offset
    pub creation_date: Option<DateTime<FixedOffset>>,
    /// `BizSvc`
    pub business_service: Option<String>,
    /// `CharSet`
    pub character_set: Option<String>,
    /// `CpyDplct`
    pub copy_duplicate: Option<CopyDuplicate>,
    /// `PssblDplct`
    pub possible_duplicate: Option<bool>,
    /// `Prty`
    pub priority: Option<Priority>,
    /// Whether a `Sgntr` element was present; its content is opaque here
    pub signature_present: bool,
    /// `Rltd` back-reference to a prior header, shared ownership
    pub related: Option<Arc<ApplicationHeader>>,
}

impl ApplicationHeader {
    /// Message definition identifier parsed into an identifier value,
    /// when it is well-formed
    pub fn message_definition(&self) -> Option<MessageIdentifier> {
        MessageIdentifier::parse(&self.message_definition_identifier).ok()
    }
}
