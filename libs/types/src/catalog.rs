//! # Action Catalog
//!
//! Closed registry of every action kind this process understands. The table
//! is static: adding an action means adding a `define_action!` block, an
//! [`ActionKind`] variant and one [`CatalogEntry`] row.
//!
//! Two dispatch primitives hand decoded actions to a handler:
//!
//! - [`Catalog::dispatch_by_value`] decodes raw bytes and moves the owned
//!   action into the handler
//! - [`Catalog::dispatch_by_ref`] lends an already-decoded action, so one
//!   decode can feed several handlers

use crate::actions::{
    native_payload_hash, Action, ActionBody, HandshakeRequest, Ping, TransferCorrupted,
    TransferOk,
};
use crate::error::{CatalogError, CatalogResult};
use crate::header::{ActionKind, MessageHeader};
use codec::{integrity_hash, Bytes, Decoder, Encoder, Wire, WireConfig, WireResult};
use std::fmt;
use std::net::SocketAddr;
use tracing::debug;

/// Static description of one catalog member
pub struct CatalogEntry {
    pub kind: ActionKind,
    pub name: &'static str,
    /// Decode the fields that follow an already-read header
    pub decode: fn(MessageHeader, &mut Decoder<'_>) -> WireResult<Action>,
    /// Render a decoded action of this kind on one line
    pub describe: fn(&Action, &mut fmt::Formatter<'_>) -> fmt::Result,
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("kind", &u32::from(self.kind))
            .field("name", &self.name)
            .finish()
    }
}

fn decode_entry<A>(header: MessageHeader, dec: &mut Decoder<'_>) -> WireResult<Action>
where
    A: ActionBody + Into<Action>,
{
    A::decode_fields(header, dec).map(Into::into)
}

fn describe_entry<A>(action: &Action, f: &mut fmt::Formatter<'_>) -> fmt::Result
where
    A: ActionBody + fmt::Display,
{
    match A::from_action(action) {
        Some(inner) => fmt::Display::fmt(inner, f),
        None => write!(f, "{}{{mismatched kind={}}}", A::KIND.name(), u32::from(action.kind())),
    }
}

static ENTRIES: [CatalogEntry; 4] = [
    CatalogEntry {
        kind: ActionKind::Ping,
        name: ActionKind::Ping.name(),
        decode: decode_entry::<Ping>,
        describe: describe_entry::<Ping>,
    },
    CatalogEntry {
        kind: ActionKind::TransferOk,
        name: ActionKind::TransferOk.name(),
        decode: decode_entry::<TransferOk>,
        describe: describe_entry::<TransferOk>,
    },
    CatalogEntry {
        kind: ActionKind::TransferCorrupted,
        name: ActionKind::TransferCorrupted.name(),
        decode: decode_entry::<TransferCorrupted>,
        describe: describe_entry::<TransferCorrupted>,
    },
    CatalogEntry {
        kind: ActionKind::HandshakeRequest,
        name: ActionKind::HandshakeRequest.name(),
        decode: decode_entry::<HandshakeRequest>,
        describe: describe_entry::<HandshakeRequest>,
    },
];

/// Listed in error messages for unknown kinds
pub(crate) const KNOWN_KINDS: &str =
    "1=ping, 2=transfer-ok, 3=transfer-corrupted, 4=handshake-request";

/// Decoding front-end for the catalog under one wire configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Catalog {
    config: WireConfig,
    verify_integrity: bool,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(WireConfig::default())
    }
}

impl Catalog {
    pub fn new(config: WireConfig) -> Self {
        Self {
            config,
            verify_integrity: true,
        }
    }

    /// Enable or disable the hash check on every decode
    pub fn with_integrity_check(mut self, verify: bool) -> Self {
        self.verify_integrity = verify;
        self
    }

    pub fn config(&self) -> WireConfig {
        self.config
    }

    pub fn verifies_integrity(&self) -> bool {
        self.verify_integrity
    }

    pub fn entries() -> &'static [CatalogEntry] {
        &ENTRIES
    }

    pub fn lookup(kind: u32) -> Option<&'static CatalogEntry> {
        ENTRIES.iter().find(|entry| u32::from(entry.kind) == kind)
    }

    pub fn contains(kind: u32) -> bool {
        Self::lookup(kind).is_some()
    }

    /// Read the `action_kind` field without decoding anything else
    pub fn peek_kind(&self, bytes: &[u8]) -> CatalogResult<u32> {
        Ok(MessageHeader::peek_kind(bytes, self.config)?)
    }

    /// Decode a complete message
    ///
    /// Fails with `UnknownAction` before touching the payload when the kind
    /// has no entry, with `IntegrityMismatch` when checking is enabled and the
    /// payload was altered, and with `TrailingBytes` when the datagram holds
    /// more than one action.
    ///
    /// Under a wire order other than the host's the fields are decoded before
    /// the hash is checked, since the hash covers their native rendering.
    /// A payload too short for its fields then fails as a wire error.
    pub fn decode(&self, bytes: &[u8]) -> CatalogResult<Action> {
        let mut dec = Decoder::new(bytes, self.config);
        let header = MessageHeader::decode(&mut dec)?;
        let entry = Self::lookup(header.action_kind)
            .ok_or_else(|| CatalogError::unknown_action(header.action_kind))?;

        let in_place = self.config.endianness.is_host_order();
        let payload_size = dec.remaining();
        if self.verify_integrity && in_place {
            check_hash(entry.name, &header, integrity_hash(dec.rest()), payload_size)?;
        }

        let action = (entry.decode)(header, &mut dec)?;
        if self.verify_integrity && !in_place {
            let computed = self.native_hash(&action, dec.rest(), payload_size)?;
            check_hash(entry.name, &header, computed, payload_size)?;
        }
        dec.finish(entry.name)?;
        Ok(action)
    }

    pub fn encode(&self, action: &Action) -> CatalogResult<Bytes> {
        let mut enc = Encoder::with_capacity(self.config, 64);
        action.encode(&mut enc)?;
        Ok(enc.finish())
    }

    /// Native-order hash of decoded fields plus any bytes left after them
    fn native_hash(&self, action: &Action, trailing: &[u8], size: usize) -> WireResult<u64> {
        native_payload_hash(self.config, size, |native| {
            action.encode_fields(native)?;
            native.put_raw(trailing);
            Ok(())
        })
    }

    /// Decode `bytes` and hand the owned action to `handler`
    pub fn dispatch_by_value<R>(
        &self,
        sender: SocketAddr,
        bytes: &[u8],
        handler: impl FnOnce(SocketAddr, Action) -> R,
    ) -> CatalogResult<R> {
        let action = self.decode(bytes)?;
        debug!(%sender, action = %action, "dispatching by value");
        Ok(handler(sender, action))
    }

    /// Lend an already-decoded action to `handler`
    pub fn dispatch_by_ref<R>(
        &self,
        sender: SocketAddr,
        action: &Action,
        handler: impl FnOnce(SocketAddr, &Action) -> R,
    ) -> R {
        handler(sender, action)
    }

    /// Check the stored hash against the payload
    ///
    /// Fields are only decoded when the wire order differs from the host's.
    pub fn verify_integrity(&self, bytes: &[u8]) -> CatalogResult<()> {
        let mut dec = Decoder::new(bytes, self.config);
        let header = MessageHeader::decode(&mut dec)?;
        let entry = Self::lookup(header.action_kind)
            .ok_or_else(|| CatalogError::unknown_action(header.action_kind))?;

        let payload_size = dec.remaining();
        let computed = if self.config.endianness.is_host_order() {
            integrity_hash(dec.rest())
        } else {
            let action = (entry.decode)(header, &mut dec)?;
            self.native_hash(&action, dec.rest(), payload_size)?
        };
        check_hash(entry.name, &header, computed, payload_size)
    }

    /// One-line rendering of an encoded message for logs and tooling
    pub fn describe(&self, bytes: &[u8]) -> String {
        match self.decode(bytes) {
            Ok(action) => action.to_string(),
            Err(CatalogError::UnknownAction { kind, .. }) => {
                format!("unknown{{kind={kind} len={}}}", bytes.len())
            }
            Err(err) => format!("malformed{{len={} error={err}}}", bytes.len()),
        }
    }
}

fn check_hash(
    action: &'static str,
    header: &MessageHeader,
    computed: u64,
    payload_size: usize,
) -> CatalogResult<()> {
    if computed != header.integrity_hash {
        return Err(CatalogError::IntegrityMismatch {
            action,
            expected: header.integrity_hash,
            computed,
            payload_size,
        });
    }
    Ok(())
}
