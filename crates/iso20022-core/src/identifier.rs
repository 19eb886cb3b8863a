//! ISO 20022 message identifiers
//!
//! A message identifier is the four-component tag `area.type.variant.version`
//! (for example `pain.001.001.09`) that names one message definition. The
//! canonical XML namespace form prefixes it with the ISO URN.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix of every canonical ISO 20022 message namespace
pub const ISO_NAMESPACE_PREFIX: &str = "urn:iso:std:iso:20022:tech:xsd:";

/// Immutable four-component message identifier
///
/// The textual width of each digit group is preserved: `pain.001.001.09`
/// and a hypothetical `pain.001.001.9` are different identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageIdentifier {
    business_area: String,
    message_type: String,
    variant: String,
    version: String,
}

impl MessageIdentifier {
    /// Create an identifier from its components, validating each one
    pub fn new(
        business_area: impl Into<String>,
        message_type: impl Into<String>,
        variant: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let id = Self {
            business_area: business_area.into(),
            message_type: message_type.into(),
            variant: variant.into(),
            version: version.into(),
        };
        id.validate()?;
        Ok(id)
    }

    fn validate(&self) -> Result<()> {
        if self.business_area.is_empty()
            || !self.business_area.bytes().all(|b| b.is_ascii_lowercase())
        {
            return Err(self.component_error("business area must be lowercase letters"));
        }
        if self.message_type.len() != 3 || !self.message_type.bytes().all(|b| b.is_ascii_digit()) {
            return Err(self.component_error("message type must be three digits"));
        }
        if self.variant.len() != 3 || !self.variant.bytes().all(|b| b.is_ascii_digit()) {
            return Err(self.component_error("variant must be three digits"));
        }
        if self.version.is_empty() || !self.version.bytes().all(|b| b.is_ascii_digit()) {
            return Err(self.component_error("version must be one or more digits"));
        }
        Ok(())
    }

    fn component_error(&self, message: &str) -> Error {
        Error::InvalidIdentifier {
            text: format!(
                "{}.{}.{}.{}",
                self.business_area, self.message_type, self.variant, self.version
            ),
            message: message.to_string(),
        }
    }

    /// Parse a dotted identifier such as `head.001.001.01`
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = text.split('.');
        let (area, msg_type, variant, version) = match (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) {
            (Some(a), Some(t), Some(va), Some(ve), None) => (a, t, va, ve),
            _ => {
                return Err(Error::InvalidIdentifier {
                    text: text.to_string(),
                    message: "expected four dot-separated components".to_string(),
                })
            }
        };
        Self::new(area, msg_type, variant, version)
    }

    /// Parse the canonical ISO namespace form
    pub fn from_namespace(uri: &str) -> Result<Self> {
        match uri.strip_prefix(ISO_NAMESPACE_PREFIX) {
            Some(rest) => Self::parse(rest),
            None => Err(Error::InvalidIdentifier {
                text: uri.to_string(),
                message: "not an ISO 20022 message namespace".to_string(),
            }),
        }
    }

    /// Canonical namespace URI for this identifier
    pub fn to_namespace(&self) -> String {
        format!("{ISO_NAMESPACE_PREFIX}{self}")
    }

    /// Business area component (e.g. `pain`, `camt`)
    pub fn business_area(&self) -> &str {
        &self.business_area
    }

    /// Message type component (three digits)
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Variant component (three digits)
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Version component, textual width preserved
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Check whether this identifier belongs to a business area
    pub fn in_business_area(&self, area: &str) -> bool {
        self.business_area == area
    }

    /// Check whether this is a business application header definition
    pub fn is_application_header(&self) -> bool {
        self.business_area == "head" && self.message_type == "001"
    }
}

impl fmt::Display for MessageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.business_area, self.message_type, self.variant, self.version
        )
    }
}

impl FromStr for MessageIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Placeholder identifier used when a message definition identifier is
/// missing or malformed; real identifiers never carry the `none` area.
impl Default for MessageIdentifier {
    fn default() -> Self {
        Self {
            business_area: "none".to_string(),
            message_type: "000".to_string(),
            variant: "000".to_string(),
            version: "00".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_valid() {
        let id = MessageIdentifier::parse("pain.001.001.09").unwrap();
        assert_eq!(id.business_area(), "pain");
        assert_eq!(id.message_type(), "001");
        assert_eq!(id.variant(), "001");
        assert_eq!(id.version(), "09");
        assert_eq!(id.to_string(), "pain.001.001.09");
    }

    #[test]
    fn test_parse_preserves_version_width() {
        let two = MessageIdentifier::parse("camt.053.001.02").unwrap();
        let one = MessageIdentifier::parse("camt.053.001.2").unwrap();
        assert_ne!(two, one);
        assert_eq!(one.to_string(), "camt.053.001.2");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in [
            "",
            "pain",
            "pain.001.001",
            "pain.001.001.09.extra",
            "PAIN.001.001.09",
            "pain.01.001.09",
            "pain.001.0011.09",
            "pain.001.001.x9",
            "pa1n.001.001.09",
        ] {
            let err = MessageIdentifier::parse(text).unwrap_err();
            assert!(
                matches!(err, Error::InvalidIdentifier { .. }),
                "{text} should be rejected"
            );
        }
    }

    #[test]
    fn test_namespace_round_trip() {
        let id = MessageIdentifier::parse("camt.053.001.08").unwrap();
        let ns = id.to_namespace();
        assert_eq!(ns, "urn:iso:std:iso:20022:tech:xsd:camt.053.001.08");
        assert_eq!(MessageIdentifier::from_namespace(&ns).unwrap(), id);
    }

    #[test]
    fn test_from_namespace_rejects_foreign_uri() {
        assert!(MessageIdentifier::from_namespace("http://example.com/ns").is_err());
        assert!(MessageIdentifier::from_namespace("urn:swift:xsd:pain.001.001.09").is_err());
    }

    #[test]
    fn test_application_header_identification() {
        assert!(MessageIdentifier::parse("head.001.001.02")
            .unwrap()
            .is_application_header());
        assert!(!MessageIdentifier::parse("pain.001.001.09")
            .unwrap()
            .is_application_header());
    }

    proptest! {
        #[test]
        fn prop_round_trip_text(
            area in "[a-z]{2,6}",
            msg_type in "[0-9]{3}",
            variant in "[0-9]{3}",
            version in "[0-9]{1,4}",
        ) {
            let id = MessageIdentifier::new(area, msg_type, variant, version).unwrap();
            prop_assert_eq!(MessageIdentifier::parse(&id.to_string()).unwrap(), id.clone());
            prop_assert_eq!(MessageIdentifier::from_namespace(&id.to_namespace()).unwrap(), id);
        }

        #[test]
        fn prop_rejects_junk(text in "[a-zA-Z0-9.]{0,12}") {
            // Either it parses and round-trips, or it errors; never panics.
            if let Ok(id) = MessageIdentifier::parse(&text) {
                prop_assert_eq!(id.to_string(), text);
            }
        }
    }
}
