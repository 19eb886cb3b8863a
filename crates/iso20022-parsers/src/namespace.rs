//! Namespace ↔ identifier mapping
//!
//! The registry preloads the namespaces of the message definitions this
//! library ships knowledge of and recognizes the Swift and CBPR+ variant
//! shapes. Unknown but well-formed identifiers pass through verbatim, so
//! detection never loses a message just because it is newer than this
//! table.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use iso20022_core::identifier::{MessageIdentifier, ISO_NAMESPACE_PREFIX};

/// Prefix of the Swift-published namespace variant
pub const SWIFT_NAMESPACE_PREFIX: &str = "urn:swift:xsd:";

/// Suffix marking the CBPR+ usage-guideline variant
pub const CBPR_PLUS_SUFFIX: &str = "$cbpr_plus";

/// Shape of the namespace URI an identifier was found under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceKind {
    /// Canonical `urn:iso:std:iso:20022:tech:xsd:` namespace
    Canonical,
    /// `urn:swift:xsd:` variant
    Swift,
    /// Canonical namespace with the `$cbpr_plus` suffix
    CbprPlus,
}

/// Message definitions preloaded into the global registry
static KNOWN_MESSAGES: &[&str] = &[
    // Payments initiation
    "pain.001.001.03",
    "pain.001.001.09",
    "pain.001.001.10",
    "pain.001.001.11",
    "pain.002.001.10",
    "pain.007.001.09",
    "pain.008.001.08",
    // Payments clearing and settlement
    "pacs.002.001.10",
    "pacs.003.001.08",
    "pacs.004.001.09",
    "pacs.008.001.08",
    "pacs.008.001.10",
    "pacs.009.001.08",
    "pacs.010.001.03",
    // Cash management
    "camt.052.001.08",
    "camt.053.001.02",
    "camt.053.001.08",
    "camt.053.001.10",
    "camt.054.001.08",
    "camt.056.001.08",
    "camt.029.001.09",
    // Business application header
    "head.001.001.01",
    "head.001.001.02",
    "head.001.001.03",
];

/// Bidirectional namespace ↔ identifier registry
pub struct NamespaceRegistry {
    map: RwLock<HashMap<String, MessageIdentifier>>,
}

impl NamespaceRegistry {
    /// Empty registry; mainly useful in tests
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Registry preloaded with the known message table
    pub fn with_known_messages() -> Self {
        let registry = Self::new();
        {
            let mut map = registry.map.write();
            for text in KNOWN_MESSAGES {
                if let Ok(id) = MessageIdentifier::parse(text) {
                    map.insert(id.to_namespace(), id);
                }
            }
        }
        registry
    }

    /// Register an additional namespace mapping at runtime
    ///
    /// Returns `true` when the mapping was inserted, `false` when the
    /// URI was already present (the existing mapping wins).
    pub fn register(&self, uri: impl Into<String>, id: MessageIdentifier) -> bool {
        let uri = uri.into();
        let mut map = self.map.write();
        match map.entry(uri) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                tracing::info!(uri = %slot.key(), id = %id, "registering namespace mapping");
                slot.insert(id);
                true
            }
        }
    }

    /// Exact lookup of a registered namespace URI
    pub fn lookup(&self, uri: &str) -> Option<MessageIdentifier> {
        self.map.read().get(uri).cloned()
    }

    /// Number of registered mappings
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Whether the registry holds no mappings
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Identify the message behind a namespace URI
    ///
    /// Handles the canonical form, the Swift prefix, and the CBPR+
    /// suffix. Falls back to syntactic parsing so unknown identifiers
    /// are preserved verbatim.
    pub fn identify(&self, uri: &str) -> Option<(MessageIdentifier, NamespaceKind)> {
        if let Some(base) = uri.strip_suffix(CBPR_PLUS_SUFFIX) {
            let (id, _) = self.identify(base)?;
            return Some((id, NamespaceKind::CbprPlus));
        }
        if let Some(rest) = uri.strip_prefix(SWIFT_NAMESPACE_PREFIX) {
            let id = MessageIdentifier::parse(rest).ok()?;
            return Some((id, NamespaceKind::Swift));
        }
        if let Some(id) = self.lookup(uri) {
            return Some((id, NamespaceKind::Canonical));
        }
        let id = MessageIdentifier::from_namespace(uri).ok()?;
        Some((id, NamespaceKind::Canonical))
    }

    /// Canonical namespace for an identifier; inverse of `identify`
    pub fn namespace_of(&self, id: &MessageIdentifier) -> String {
        id.to_namespace()
    }
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self::with_known_messages()
    }
}

/// Process-wide namespace registry
pub static GLOBAL_NAMESPACES: Lazy<NamespaceRegistry> =
    Lazy::new(NamespaceRegistry::with_known_messages);

/// Convenience wrapper over the global registry
pub fn identify_namespace(uri: &str) -> Option<(MessageIdentifier, NamespaceKind)> {
    GLOBAL_NAMESPACES.identify(uri)
}

/// Register a mapping in the global registry
pub fn register_namespace(uri: impl Into<String>, id: MessageIdentifier) -> bool {
    GLOBAL_NAMESPACES.register(uri, id)
}
