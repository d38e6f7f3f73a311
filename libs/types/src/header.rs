//! Message Header Implementation
//!
//! The header is identical for every action and carries routing and
//! validation information.
//!
//! ```text
//! ┌─────────────┬────────────────┬────────────┬────────────────┬──────────────────┐
//! │ action_kind │ transaction_id │ message_id │ integrity_hash │ action fields... │
//! │ u32         │ u64            │ u64        │ u64            │ (payload)        │
//! └─────────────┴────────────────┴────────────┴────────────────┴──────────────────┘
//!   bytes 0-3     bytes 4-11       bytes 12-19  bytes 20-27
//! ```
//!
//! `integrity_hash` covers the payload only, so it can be patched in after the
//! fields are written.

use codec::{wire_enum, wire_struct, Decoder, WireConfig, WireResult};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable numeric identity of each catalog member
///
/// Values are part of the wire format: never renumber or reuse a value when
/// adding a kind.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u32)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Ping = 1,
    TransferOk = 2,
    TransferCorrupted = 3,
    HandshakeRequest = 4,
}
wire_enum!(ActionKind as u32);

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::Ping,
        ActionKind::TransferOk,
        ActionKind::TransferCorrupted,
        ActionKind::HandshakeRequest,
    ];

    /// Human-readable name used by the pretty-printer and logs
    pub const fn name(self) -> &'static str {
        match self {
            ActionKind::Ping => "ping",
            ActionKind::TransferOk => "transfer-ok",
            ActionKind::TransferCorrupted => "transfer-corrupted",
            ActionKind::HandshakeRequest => "handshake-request",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared prefix of every action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageHeader {
    pub action_kind: u32,
    pub transaction_id: u64,
    pub message_id: u64,
    pub integrity_hash: u64,
}
wire_struct!(MessageHeader {
    action_kind,
    transaction_id,
    message_id,
    integrity_hash,
});

impl MessageHeader {
    /// Header size in bytes
    pub const SIZE: usize = 28;

    /// Offset of the `integrity_hash` slot from the start of the header
    pub const HASH_OFFSET: usize = 20;

    /// Fresh header for `kind` with a newly allocated message id
    pub fn for_kind(kind: ActionKind) -> Self {
        Self {
            action_kind: kind.into(),
            transaction_id: 0,
            message_id: next_message_id(),
            integrity_hash: 0,
        }
    }

    /// Catalog kind of this header, if it names one
    pub fn kind(&self) -> Option<ActionKind> {
        ActionKind::try_from(self.action_kind).ok()
    }

    /// Decode only the `action_kind` field of an encoded message
    pub fn peek_kind(bytes: &[u8], config: WireConfig) -> WireResult<u32> {
        Decoder::new(bytes, config).get_u32()
    }
}

static MESSAGE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique message id
pub fn next_message_id() -> u64 {
    MESSAGE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}
