//! Encoding policies: byte order and length-prefix width
//!
//! Both peers of a conversation must agree on the same [`WireConfig`]; the
//! layout carries no self-describing policy marker.

use serde::{Deserialize, Serialize};

/// Byte order for multi-byte scalars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    Big,
    #[default]
    Little,
    Native,
}

impl Endianness {
    /// True when scalars in this order share the host's in-memory layout,
    /// which is what allows the flat-copy path for scalar runs.
    pub fn is_host_order(self) -> bool {
        match self {
            Endianness::Native => true,
            Endianness::Little => cfg!(target_endian = "little"),
            Endianness::Big => cfg!(target_endian = "big"),
        }
    }
}

/// Width of the element-count prefix written before variable-length fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPrefix {
    U8,
    U16,
    U32,
    #[default]
    U64,
}

impl LengthPrefix {
    /// Bytes occupied by the prefix itself
    pub const fn width(self) -> usize {
        match self {
            LengthPrefix::U8 => 1,
            LengthPrefix::U16 => 2,
            LengthPrefix::U32 => 4,
            LengthPrefix::U64 => 8,
        }
    }

    /// Largest count representable by this prefix
    pub const fn max_len(self) -> u64 {
        match self {
            LengthPrefix::U8 => u8::MAX as u64,
            LengthPrefix::U16 => u16::MAX as u64,
            LengthPrefix::U32 => u32::MAX as u64,
            LengthPrefix::U64 => u64::MAX,
        }
    }
}

/// Complete encoding policy shared by an [`Encoder`](crate::Encoder) and a
/// [`Decoder`](crate::Decoder)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    pub endianness: Endianness,
    pub length_prefix: LengthPrefix,
}

impl WireConfig {
    pub const fn new(endianness: Endianness, length_prefix: LengthPrefix) -> Self {
        Self {
            endianness,
            length_prefix,
        }
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn with_length_prefix(mut self, length_prefix: LengthPrefix) -> Self {
        self.length_prefix = length_prefix;
        self
    }
}
