//! Bounds-checked byte source for structural decoding

use crate::config::{Endianness, LengthPrefix, WireConfig};
use crate::error::{WireError, WireResult};
use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};

macro_rules! get_scalar {
    ($name:ident, $ty:ty, $read:ident, $size:expr) => {
        #[inline]
        pub fn $name(&mut self) -> WireResult<$ty> {
            let bytes = self.take($size, stringify!($ty))?;
            Ok(match self.config.endianness {
                Endianness::Big => BigEndian::$read(bytes),
                Endianness::Little => LittleEndian::$read(bytes),
                Endianness::Native => NativeEndian::$read(bytes),
            })
        }
    };
}

/// Cursor over a borrowed input buffer
///
/// Every read checks the remaining input first and fails with
/// [`WireError::OutOfData`] instead of reading past the end.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    config: WireConfig,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8], config: WireConfig) -> Self {
        Self {
            data,
            pos: 0,
            config,
        }
    }

    pub fn config(&self) -> WireConfig {
        self.config
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Bytes not yet consumed
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Consume exactly `len` bytes
    pub fn take(&mut self, len: usize, context: &'static str) -> WireResult<&'a [u8]> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(WireError::out_of_data(len, remaining, self.pos, context));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    #[inline]
    pub fn get_u8(&mut self) -> WireResult<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    get_scalar!(get_u16, u16, read_u16, 2);
    get_scalar!(get_u32, u32, read_u32, 4);
    get_scalar!(get_u64, u64, read_u64, 8);
    get_scalar!(get_u128, u128, read_u128, 16);

    /// Read an element count written with the configured prefix width
    pub fn get_length(&mut self) -> WireResult<usize> {
        let len = match self.config.length_prefix {
            LengthPrefix::U8 => self.get_u8()? as u64,
            LengthPrefix::U16 => self.get_u16()? as u64,
            LengthPrefix::U32 => self.get_u32()? as u64,
            LengthPrefix::U64 => self.get_u64()?,
        };
        usize::try_from(len)
            .map_err(|_| WireError::length_overflow(len, self.config.length_prefix))
    }

    /// Fail if any input is left over
    pub fn finish(&self, type_name: &'static str) -> WireResult<()> {
        match self.remaining() {
            0 => Ok(()),
            remaining => {
                tracing::debug!(remaining, type_name, "rejecting trailing bytes");
                Err(WireError::TrailingBytes {
                    remaining,
                    type_name,
                })
            }
        }
    }
}
