//! Byte sink for structural encoding
//!
//! `Encoder` owns a growable `BytesMut` and writes scalars in the byte order
//! chosen by its [`WireConfig`]. Multi-byte writes go through `byteorder` so
//! the three orders share one code path.

use crate::config::{Endianness, LengthPrefix, WireConfig};
use crate::error::{WireError, WireResult};
use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};
use bytes::{BufMut, Bytes, BytesMut};

macro_rules! put_scalar {
    ($name:ident, $ty:ty, $write:ident, $size:expr) => {
        #[inline]
        pub fn $name(&mut self, value: $ty) {
            let mut tmp = [0u8; $size];
            match self.config.endianness {
                Endianness::Big => BigEndian::$write(&mut tmp, value),
                Endianness::Little => LittleEndian::$write(&mut tmp, value),
                Endianness::Native => NativeEndian::$write(&mut tmp, value),
            }
            self.buf.put_slice(&tmp);
        }
    };
}

/// Growable output buffer bound to one encoding policy
#[derive(Debug, Clone)]
pub struct Encoder {
    buf: BytesMut,
    config: WireConfig,
}

impl Encoder {
    pub fn new(config: WireConfig) -> Self {
        Self::with_capacity(config, 64)
    }

    pub fn with_capacity(config: WireConfig, capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            config,
        }
    }

    pub fn config(&self) -> WireConfig {
        self.config
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    put_scalar!(put_u16, u16, write_u16, 2);
    put_scalar!(put_u32, u32, write_u32, 4);
    put_scalar!(put_u64, u64, write_u64, 8);
    put_scalar!(put_u128, u128, write_u128, 16);

    /// Copy bytes verbatim, without any prefix or reordering
    #[inline]
    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Write an element count using the configured prefix width
    pub fn put_length(&mut self, len: usize) -> WireResult<()> {
        let len = len as u64;
        let prefix = self.config.length_prefix;
        if len > prefix.max_len() {
            return Err(WireError::length_overflow(len, prefix));
        }
        match prefix {
            LengthPrefix::U8 => self.put_u8(len as u8),
            LengthPrefix::U16 => self.put_u16(len as u16),
            LengthPrefix::U32 => self.put_u32(len as u32),
            LengthPrefix::U64 => self.put_u64(len),
        }
        Ok(())
    }

    /// Overwrite an already-written `u64` slot, used to back-fill header
    /// fields that depend on bytes encoded after them
    pub fn patch_u64(&mut self, offset: usize, value: u64) -> WireResult<()> {
        let end = offset + 8;
        if end > self.buf.len() {
            return Err(WireError::out_of_data(8, self.buf.len().saturating_sub(offset), offset, "patch slot"));
        }
        let slot = &mut self.buf[offset..end];
        match self.config.endianness {
            Endianness::Big => BigEndian::write_u64(slot, value),
            Endianness::Little => LittleEndian::write_u64(slot, value),
            Endianness::Native => NativeEndian::write_u64(slot, value),
        }
        Ok(())
    }

    /// Freeze the written bytes
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
