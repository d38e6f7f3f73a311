//! Catalog-level errors
//!
//! Wire errors stay recoverable (drop the datagram). `UnknownAction` is the
//! one condition callers are expected to escalate: it means a peer speaks a
//! kind this process was never built to understand.

use codec::WireError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Header names an action kind that has no catalog entry
    #[error("Unknown action kind {kind}: no catalog entry (known kinds: {known})")]
    UnknownAction { kind: u32, known: &'static str },

    /// Structural decode/encode failure
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    /// Payload does not hash to the value stored in the header
    #[error("Integrity hash mismatch for {action}: header {expected:#018x}, payload {computed:#018x} (payload: {payload_size} bytes)")]
    IntegrityMismatch {
        action: &'static str,
        expected: u64,
        computed: u64,
        payload_size: usize,
    },
}

impl CatalogError {
    pub fn unknown_action(kind: u32) -> Self {
        Self::UnknownAction {
            kind,
            known: crate::catalog::KNOWN_KINDS,
        }
    }

    /// True when the datagram itself is malformed or corrupted, as opposed to
    /// well-formed but of an unknown kind
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Wire(_) | Self::IntegrityMismatch { .. })
    }
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
