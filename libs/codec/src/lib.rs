//! # Weft Wire Codec
//!
//! ## Purpose
//!
//! Generic encode/decode engine that turns typed values into a canonical,
//! versionable byte layout and back. The codec knows nothing about actions,
//! transports or actors; higher layers describe their types to it through the
//! [`Wire`] trait.
//!
//! ## Integration Points
//!
//! - **Action Catalog** (`types`): hand-written `Wire` impls manage the shared
//!   message header and back-fill the [`integrity_hash`] slot
//! - **Actor Dispatcher** (`actors`): decodes headers on every datagram and
//!   full payloads only for accepted messages
//! - **Configuration**: [`WireConfig`] deserialises straight from the runtime
//!   config file
//!
//! ## Architecture Role
//!
//! ```text
//! typed value → [Wire::encode] → Encoder (BytesMut) → Bytes on the wire
//! &[u8]       → Decoder (bounds-checked cursor) → [Wire::decode] → typed value
//! ```
//!
//! ## Policies
//!
//! - **Endianness**: big, little (default) or native
//! - **Length prefix**: u8/u16/u32/u64 (default) element counts before
//!   variable-length fields
//!
//! Decoding never reads past the input or past a declared element count; a
//! short buffer fails with [`WireError::OutOfData`].

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod hash;
pub mod macros;
pub mod wire;

pub use bytes::Bytes;
pub use config::{Endianness, LengthPrefix, WireConfig};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{WireError, WireResult};
pub use hash::integrity_hash;
pub use wire::{encode_str, Wire};

/// Encode a value into a fresh buffer
pub fn encode<T: Wire>(value: &T, config: WireConfig) -> WireResult<Bytes> {
    let mut enc = Encoder::with_capacity(config, T::MIN_SIZE.max(16));
    value.encode(&mut enc)?;
    Ok(enc.finish())
}

/// Decode a value from the start of `bytes`, ignoring anything after it
pub fn decode<T: Wire>(bytes: &[u8], config: WireConfig) -> WireResult<T> {
    let mut dec = Decoder::new(bytes, config);
    T::decode(&mut dec)
}

/// Decode a value that must occupy `bytes` completely
pub fn decode_exact<T: Wire>(bytes: &[u8], config: WireConfig) -> WireResult<T> {
    let mut dec = Decoder::new(bytes, config);
    let value = T::decode(&mut dec)?;
    dec.finish(std::any::type_name::<T>())?;
    Ok(value)
}
