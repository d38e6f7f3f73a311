//! Wire-level errors for structural encoding and decoding
//!
//! Every variant is recoverable: the caller drops the offending message and
//! carries on. Nothing in the codec truncates silently.

use crate::config::LengthPrefix;
use thiserror::Error;

/// Encode/decode failures with enough context to explain a rejected datagram
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Decoder was asked for more bytes than remain in the input
    #[error("Out of data: need {needed} bytes at offset {offset}, {remaining} remaining (reading {context})")]
    OutOfData {
        needed: usize,
        remaining: usize,
        offset: usize,
        context: &'static str,
    },

    /// Tag, flag or enum value outside the range the target type accepts
    #[error("Unknown discriminant {value} for {type_name}")]
    UnknownDiscriminant { type_name: &'static str, value: u64 },

    /// Sequence length does not fit the configured length prefix
    #[error("Length {len} does not fit a {prefix:?} length prefix")]
    LengthOverflow { len: u64, prefix: LengthPrefix },

    /// String payload is not valid UTF-8
    #[error("Invalid UTF-8 in string field at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// Input continued after the value was fully decoded
    #[error("Trailing bytes: {remaining} bytes left after decoding {type_name}")]
    TrailingBytes {
        remaining: usize,
        type_name: &'static str,
    },
}

impl WireError {
    pub fn out_of_data(
        needed: usize,
        remaining: usize,
        offset: usize,
        context: &'static str,
    ) -> Self {
        Self::OutOfData {
            needed,
            remaining,
            offset,
            context,
        }
    }

    pub fn unknown_discriminant(type_name: &'static str, value: u64) -> Self {
        Self::UnknownDiscriminant { type_name, value }
    }

    pub fn length_overflow(len: u64, prefix: LengthPrefix) -> Self {
        Self::LengthOverflow { len, prefix }
    }

    /// True for errors caused by a short or cut-off datagram
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::OutOfData { .. })
    }
}

/// Result type for wire operations
pub type WireResult<T> = std::result::Result<T, WireError>;
