//! Typed actions
//!
//! Every action is a [`MessageHeader`] followed by its own fields. The
//! [`define_action!`] macro generates the struct, its constructor, the
//! [`ActionBody`] impl, the [`Wire`] impl that seals the integrity hash, and
//! the pretty-printer.
//!
//! The integrity hash covers the fields as they lay out in host byte order,
//! so one action carries the same hash under every wire endianness. When the
//! wire order already matches the host the payload bytes are hashed in place;
//! otherwise the fields are re-encoded natively first.

use crate::header::{ActionKind, MessageHeader};
use codec::{integrity_hash, Decoder, Encoder, Endianness, Wire, WireConfig, WireError, WireResult};
use std::fmt;

/// Per-kind hooks shared by every catalog member
pub trait ActionBody: Sized {
    const KIND: ActionKind;

    fn header(&self) -> &MessageHeader;

    fn header_mut(&mut self) -> &mut MessageHeader;

    /// Write the fields that follow the header
    fn encode_fields(&self, enc: &mut Encoder) -> WireResult<()>;

    /// Read the fields that follow an already-decoded header
    fn decode_fields(header: MessageHeader, dec: &mut Decoder<'_>) -> WireResult<Self>;

    /// Borrow this kind out of the catalog enum
    fn from_action(action: &Action) -> Option<&Self>;
}

/// Hash of a payload re-encoded in host byte order
///
/// `fields` writes the payload; `config` supplies everything but the
/// endianness.
pub fn native_payload_hash(
    config: WireConfig,
    size_hint: usize,
    fields: impl FnOnce(&mut Encoder) -> WireResult<()>,
) -> WireResult<u64> {
    let mut native = Encoder::with_capacity(config.with_endianness(Endianness::Native), size_hint);
    fields(&mut native)?;
    Ok(integrity_hash(native.as_slice()))
}

/// Encode header plus fields, then back-fill the hash over the payload
pub fn encode_action<A: ActionBody>(action: &A, enc: &mut Encoder) -> WireResult<()> {
    let start = enc.len();
    let header = MessageHeader {
        action_kind: A::KIND.into(),
        integrity_hash: 0,
        ..*action.header()
    };
    header.encode(enc)?;

    let payload_start = enc.len();
    action.encode_fields(enc)?;
    let payload = &enc.as_slice()[payload_start..];
    let hash = if enc.config().endianness.is_host_order() {
        integrity_hash(payload)
    } else {
        native_payload_hash(enc.config(), payload.len(), |native| {
            action.encode_fields(native)
        })?
    };
    enc.patch_u64(start + MessageHeader::HASH_OFFSET, hash)
}

/// Decode an action of a statically known kind
///
/// A header naming any other kind fails with `UnknownDiscriminant`.
pub fn decode_action<A: ActionBody>(dec: &mut Decoder<'_>) -> WireResult<A> {
    let header = MessageHeader::decode(dec)?;
    if header.action_kind != u32::from(A::KIND) {
        return Err(WireError::unknown_discriminant(
            std::any::type_name::<A>(),
            u64::from(header.action_kind),
        ));
    }
    A::decode_fields(header, dec)
}

macro_rules! define_action {
    (
        $(#[$meta:meta])*
        $name:ident => $kind:ident {
            $(
                $(#[$field_meta:meta])*
                $field:ident: $fty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            pub header: MessageHeader,
            $(
                $(#[$field_meta])*
                pub $field: $fty,
            )*
        }

        impl $name {
            pub fn new($($field: $fty),*) -> Self {
                Self {
                    header: MessageHeader::for_kind(ActionKind::$kind),
                    $($field,)*
                }
            }

            /// Tag this action as part of an existing exchange
            pub fn with_transaction(mut self, transaction_id: u64) -> Self {
                self.header.transaction_id = transaction_id;
                self
            }
        }

        impl ActionBody for $name {
            const KIND: ActionKind = ActionKind::$kind;

            fn header(&self) -> &MessageHeader {
                &self.header
            }

            fn header_mut(&mut self) -> &mut MessageHeader {
                &mut self.header
            }

            #[allow(unused_variables)]
            fn encode_fields(&self, enc: &mut Encoder) -> WireResult<()> {
                $( Wire::encode(&self.$field, enc)?; )*
                Ok(())
            }

            #[allow(unused_variables)]
            fn decode_fields(header: MessageHeader, dec: &mut Decoder<'_>) -> WireResult<Self> {
                Ok(Self {
                    header,
                    $( $field: Wire::decode(dec)?, )*
                })
            }

            fn from_action(action: &Action) -> Option<&Self> {
                match action {
                    Action::$kind(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl Wire for $name {
            const MIN_SIZE: usize = MessageHeader::SIZE;

            fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
                encode_action(self, enc)
            }

            fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
                decode_action(dec)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    "{}{{tx={} msg={}",
                    ActionKind::$kind.name(),
                    self.header.transaction_id,
                    self.header.message_id
                )?;
                $( write!(f, " {}={:?}", stringify!($field), self.$field)?; )*
                f.write_str("}")
            }
        }

        impl From<$name> for Action {
            fn from(action: $name) -> Self {
                Action::$kind(action)
            }
        }
    };
}

define_action! {
    /// Liveness check; the receiver answers with another ping on the same
    /// transaction
    Ping => Ping {
        ping_id: u64,
        /// Sender's wall clock in milliseconds
        ping_ms: i64,
    }
}

define_action! {
    /// Acknowledges a transfer whose content hash matched
    TransferOk => TransferOk {
        target_id: u64,
        target_hash: u64,
    }
}

define_action! {
    /// Reports a transfer whose content hash did not match
    TransferCorrupted => TransferCorrupted {
        target_id: u64,
        target_hash: u64,
    }
}

define_action! {
    /// Opens a session with a peer
    HandshakeRequest => HandshakeRequest {}
}

/// Any catalog member, decoded
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Ping(Ping),
    TransferOk(TransferOk),
    TransferCorrupted(TransferCorrupted),
    HandshakeRequest(HandshakeRequest),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Ping(_) => ActionKind::Ping,
            Action::TransferOk(_) => ActionKind::TransferOk,
            Action::TransferCorrupted(_) => ActionKind::TransferCorrupted,
            Action::HandshakeRequest(_) => ActionKind::HandshakeRequest,
        }
    }

    pub fn header(&self) -> &MessageHeader {
        match self {
            Action::Ping(a) => &a.header,
            Action::TransferOk(a) => &a.header,
            Action::TransferCorrupted(a) => &a.header,
            Action::HandshakeRequest(a) => &a.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut MessageHeader {
        match self {
            Action::Ping(a) => &mut a.header,
            Action::TransferOk(a) => &mut a.header,
            Action::TransferCorrupted(a) => &mut a.header,
            Action::HandshakeRequest(a) => &mut a.header,
        }
    }

    pub fn transaction_id(&self) -> u64 {
        self.header().transaction_id
    }

    pub fn message_id(&self) -> u64 {
        self.header().message_id
    }

    /// Write the fields that follow the header
    pub fn encode_fields(&self, enc: &mut Encoder) -> WireResult<()> {
        match self {
            Action::Ping(a) => a.encode_fields(enc),
            Action::TransferOk(a) => a.encode_fields(enc),
            Action::TransferCorrupted(a) => a.encode_fields(enc),
            Action::HandshakeRequest(a) => a.encode_fields(enc),
        }
    }
}

impl Wire for Action {
    const MIN_SIZE: usize = MessageHeader::SIZE;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        match self {
            Action::Ping(a) => a.encode(enc),
            Action::TransferOk(a) => a.encode(enc),
            Action::TransferCorrupted(a) => a.encode(enc),
            Action::HandshakeRequest(a) => a.encode(enc),
        }
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        let header = MessageHeader::decode(dec)?;
        let entry = crate::catalog::Catalog::lookup(header.action_kind).ok_or_else(|| {
            WireError::unknown_discriminant("ActionKind", u64::from(header.action_kind))
        })?;
        (entry.decode)(header, dec)
    }
}

/// Formats through the catalog row for the action's kind
impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match crate::catalog::Catalog::lookup(self.kind().into()) {
            Some(entry) => (entry.describe)(self, f),
            None => write!(f, "{}{{tx={}}}", self.kind().name(), self.transaction_id()),
        }
    }
}
