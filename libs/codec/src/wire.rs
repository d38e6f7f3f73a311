//! # Structural Wire Encoding
//!
//! ## Purpose
//!
//! The [`Wire`] trait describes how a value is laid out on the wire. Impls in
//! this module cover the structural rules every message builds on:
//!
//! - **Integers** (8-128 bit): configured byte order; signed values travel as
//!   their unsigned bit pattern
//! - **Floats**: bit-reinterpreted to the same-width unsigned integer
//! - **`bool` / `Option<T>`**: one flag byte (0 or 1), payload follows `Some`
//! - **Tuples / `[T; N]`**: elements in order, no length prefix
//! - **Sequences** (`Vec`, `VecDeque`, `String`, `Bytes`): element-count
//!   prefix, then the elements
//! - **Maps / sets**: count prefix, then entries inserted one by one
//!
//! A hand-written `Wire` impl is the escape hatch for types that manage their
//! own framing (headers, hashes); it always wins over the structural rules
//! because the structural rules are themselves just impls of the trait.
//!
//! ## Flat-Copy Fast Path
//!
//! Runs of plain scalars (`Vec<u32>`, `[f64; 8]`, ...) are copied verbatim
//! when the configured byte order matches the host, and always for byte-sized
//! scalars. The per-element path produces identical bytes; the fast path just
//! skips the loop.

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{WireError, WireResult};
use bytemuck::Pod;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::{BuildHasher, Hash};
use std::mem::size_of;

/// A value with a canonical byte layout
pub trait Wire: Sized {
    /// Smallest possible encoding; bounds pre-allocation when decoding counts
    /// read from untrusted input
    const MIN_SIZE: usize = 0;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()>;

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self>;

    /// Encode a run of values with no prefix
    fn encode_slice(items: &[Self], enc: &mut Encoder) -> WireResult<()> {
        items.iter().try_for_each(|item| item.encode(enc))
    }

    /// Decode exactly `count` values
    fn decode_many(count: usize, dec: &mut Decoder<'_>) -> WireResult<Vec<Self>> {
        let mut out = Vec::with_capacity(bounded_capacity::<Self>(count, dec));
        for _ in 0..count {
            out.push(Self::decode(dec)?);
        }
        Ok(out)
    }
}

/// Read a sequence length the remaining input can back
///
/// Elements that occupy no bytes are charged one byte each, so a forged
/// count cannot spin the decoder without consuming input.
fn read_count<T: Wire>(dec: &mut Decoder<'_>) -> WireResult<usize> {
    let count = dec.get_length()?;
    if T::MIN_SIZE == 0 && count > dec.remaining() {
        return Err(WireError::out_of_data(
            count,
            dec.remaining(),
            dec.position(),
            "zero-size elements",
        ));
    }
    Ok(count)
}

/// Never reserve more slots than the remaining input could possibly fill
fn bounded_capacity<T: Wire>(count: usize, dec: &Decoder<'_>) -> usize {
    count.min(dec.remaining() / T::MIN_SIZE.max(1))
}

fn flat_eligible<T>(order_matches: bool) -> bool {
    order_matches || size_of::<T>() == 1
}

fn encode_scalar_run<T: Pod + Wire>(items: &[T], enc: &mut Encoder) -> WireResult<()> {
    if flat_eligible::<T>(enc.config().endianness.is_host_order()) {
        enc.put_raw(bytemuck::cast_slice(items));
        Ok(())
    } else {
        items.iter().try_for_each(|item| item.encode(enc))
    }
}

fn decode_scalar_run<T: Pod + Wire>(count: usize, dec: &mut Decoder<'_>) -> WireResult<Vec<T>> {
    if !flat_eligible::<T>(dec.config().endianness.is_host_order()) {
        let mut out = Vec::with_capacity(bounded_capacity::<T>(count, dec));
        for _ in 0..count {
            out.push(T::decode(dec)?);
        }
        return Ok(out);
    }

    let total = count.checked_mul(size_of::<T>()).ok_or_else(|| {
        WireError::out_of_data(usize::MAX, dec.remaining(), dec.position(), "flat scalar run")
    })?;
    let bytes = dec.take(total, "flat scalar run")?;
    let mut out = vec![<T as bytemuck::Zeroable>::zeroed(); count];
    bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(bytes);
    Ok(out)
}

macro_rules! impl_wire_int {
    ($($ty:ty => $uty:ty, $put:ident, $get:ident;)*) => {
        $(
            impl Wire for $ty {
                const MIN_SIZE: usize = size_of::<$ty>();

                #[inline]
                fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
                    enc.$put(*self as $uty);
                    Ok(())
                }

                #[inline]
                fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
                    Ok(dec.$get()? as $ty)
                }

                fn encode_slice(items: &[Self], enc: &mut Encoder) -> WireResult<()> {
                    encode_scalar_run(items, enc)
                }

                fn decode_many(count: usize, dec: &mut Decoder<'_>) -> WireResult<Vec<Self>> {
                    decode_scalar_run(count, dec)
                }
            }
        )*
    };
}

impl_wire_int! {
    u8 => u8, put_u8, get_u8;
    i8 => u8, put_u8, get_u8;
    u16 => u16, put_u16, get_u16;
    i16 => u16, put_u16, get_u16;
    u32 => u32, put_u32, get_u32;
    i32 => u32, put_u32, get_u32;
    u64 => u64, put_u64, get_u64;
    i64 => u64, put_u64, get_u64;
    u128 => u128, put_u128, get_u128;
    i128 => u128, put_u128, get_u128;
}

macro_rules! impl_wire_float {
    ($($ty:ty => $put:ident, $get:ident;)*) => {
        $(
            impl Wire for $ty {
                const MIN_SIZE: usize = size_of::<$ty>();

                #[inline]
                fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
                    enc.$put(self.to_bits());
                    Ok(())
                }

                #[inline]
                fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
                    Ok(<$ty>::from_bits(dec.$get()?))
                }

                fn encode_slice(items: &[Self], enc: &mut Encoder) -> WireResult<()> {
                    encode_scalar_run(items, enc)
                }

                fn decode_many(count: usize, dec: &mut Decoder<'_>) -> WireResult<Vec<Self>> {
                    decode_scalar_run(count, dec)
                }
            }
        )*
    };
}

impl_wire_float! {
    f32 => put_u32, get_u32;
    f64 => put_u64, get_u64;
}

// usize/isize travel as 64-bit so the layout does not depend on the host
impl Wire for usize {
    const MIN_SIZE: usize = 8;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        enc.put_u64(*self as u64);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        let raw = dec.get_u64()?;
        usize::try_from(raw).map_err(|_| WireError::unknown_discriminant("usize", raw))
    }
}

impl Wire for isize {
    const MIN_SIZE: usize = 8;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        enc.put_u64(*self as i64 as u64);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        let raw = dec.get_u64()? as i64;
        isize::try_from(raw).map_err(|_| WireError::unknown_discriminant("isize", raw as u64))
    }
}

impl Wire for bool {
    const MIN_SIZE: usize = 1;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        enc.put_u8(*self as u8);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        match dec.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::unknown_discriminant("bool", other as u64)),
        }
    }
}

impl Wire for char {
    const MIN_SIZE: usize = 4;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        enc.put_u32(*self as u32);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        let raw = dec.get_u32()?;
        char::from_u32(raw).ok_or_else(|| WireError::unknown_discriminant("char", raw as u64))
    }
}

impl Wire for () {
    fn encode(&self, _enc: &mut Encoder) -> WireResult<()> {
        Ok(())
    }

    fn decode(_dec: &mut Decoder<'_>) -> WireResult<Self> {
        Ok(())
    }
}

impl<T: Wire> Wire for Option<T> {
    const MIN_SIZE: usize = 1;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        match self {
            None => {
                enc.put_u8(0);
                Ok(())
            }
            Some(value) => {
                enc.put_u8(1);
                value.encode(enc)
            }
        }
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        match dec.get_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(dec)?)),
            other => Err(WireError::unknown_discriminant("Option presence flag", other as u64)),
        }
    }
}

impl<T: Wire> Wire for Box<T> {
    const MIN_SIZE: usize = T::MIN_SIZE;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        (**self).encode(enc)
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        T::decode(dec).map(Box::new)
    }
}

impl<T: Wire, const N: usize> Wire for [T; N] {
    const MIN_SIZE: usize = T::MIN_SIZE * N;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        T::encode_slice(self, enc)
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        let offset = dec.position();
        let items = T::decode_many(N, dec)?;
        items
            .try_into()
            .map_err(|items: Vec<T>| WireError::out_of_data(N, items.len(), offset, "fixed array"))
    }
}

impl<T: Wire> Wire for Vec<T> {
    const MIN_SIZE: usize = 1;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        enc.put_length(self.len())?;
        T::encode_slice(self, enc)
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        let count = read_count::<T>(dec)?;
        T::decode_many(count, dec)
    }
}

impl<T: Wire> Wire for VecDeque<T> {
    const MIN_SIZE: usize = 1;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        enc.put_length(self.len())?;
        let (front, back) = self.as_slices();
        T::encode_slice(front, enc)?;
        T::encode_slice(back, enc)
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        let count = read_count::<T>(dec)?;
        T::decode_many(count, dec).map(VecDeque::from)
    }
}

/// Encode a string slice exactly as `String` would be
pub fn encode_str(value: &str, enc: &mut Encoder) -> WireResult<()> {
    enc.put_length(value.len())?;
    enc.put_raw(value.as_bytes());
    Ok(())
}

impl Wire for String {
    const MIN_SIZE: usize = 1;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        encode_str(self, enc)
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        let len = dec.get_length()?;
        let offset = dec.position();
        let bytes = dec.take(len, "string bytes")?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| WireError::InvalidUtf8 { offset })
    }
}

impl Wire for Bytes {
    const MIN_SIZE: usize = 1;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        enc.put_length(self.len())?;
        enc.put_raw(self);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        let len = dec.get_length()?;
        dec.take(len, "byte string").map(Bytes::copy_from_slice)
    }
}

impl<K, V, S> Wire for HashMap<K, V, S>
where
    K: Wire + Eq + Hash,
    V: Wire,
    S: BuildHasher + Default,
{
    const MIN_SIZE: usize = 1;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        enc.put_length(self.len())?;
        for (key, value) in self {
            key.encode(enc)?;
            value.encode(enc)?;
        }
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        let count = read_count::<(K, V)>(dec)?;
        let capacity = bounded_capacity::<(K, V)>(count, dec);
        let mut map = HashMap::with_capacity_and_hasher(capacity, S::default());
        for _ in 0..count {
            let key = K::decode(dec)?;
            let value = V::decode(dec)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<K: Wire + Ord, V: Wire> Wire for BTreeMap<K, V> {
    const MIN_SIZE: usize = 1;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        enc.put_length(self.len())?;
        for (key, value) in self {
            key.encode(enc)?;
            value.encode(enc)?;
        }
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        let count = read_count::<(K, V)>(dec)?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = K::decode(dec)?;
            let value = V::decode(dec)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<T, S> Wire for HashSet<T, S>
where
    T: Wire + Eq + Hash,
    S: BuildHasher + Default,
{
    const MIN_SIZE: usize = 1;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        enc.put_length(self.len())?;
        self.iter().try_for_each(|item| item.encode(enc))
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        let count = read_count::<T>(dec)?;
        let mut set = HashSet::with_capacity_and_hasher(bounded_capacity::<T>(count, dec), S::default());
        for _ in 0..count {
            set.insert(T::decode(dec)?);
        }
        Ok(set)
    }
}

impl<T: Wire + Ord> Wire for BTreeSet<T> {
    const MIN_SIZE: usize = 1;

    fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
        enc.put_length(self.len())?;
        self.iter().try_for_each(|item| item.encode(enc))
    }

    fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
        let count = read_count::<T>(dec)?;
        let mut set = BTreeSet::new();
        for _ in 0..count {
            set.insert(T::decode(dec)?);
        }
        Ok(set)
    }
}

macro_rules! impl_wire_tuple {
    ($($name:ident)+) => {
        impl<$($name: Wire),+> Wire for ($($name,)+) {
            const MIN_SIZE: usize = 0 $(+ $name::MIN_SIZE)+;

            #[allow(non_snake_case)]
            fn encode(&self, enc: &mut Encoder) -> WireResult<()> {
                let ($($name,)+) = self;
                $($name.encode(enc)?;)+
                Ok(())
            }

            fn decode(dec: &mut Decoder<'_>) -> WireResult<Self> {
                Ok(($($name::decode(dec)?,)+))
            }
        }
    };
}

impl_wire_tuple!(A);
impl_wire_tuple!(A B);
impl_wire_tuple!(A B C);
impl_wire_tuple!(A B C D);
impl_wire_tuple!(A B C D E);
impl_wire_tuple!(A B C D E F);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Endianness, LengthPrefix, WireConfig};
    use crate::{decode, encode};

    fn all_configs() -> Vec<WireConfig> {
        let mut configs = Vec::new();
        for endianness in [Endianness::Big, Endianness::Little, Endianness::Native] {
            for prefix in [LengthPrefix::U8, LengthPrefix::U16, LengthPrefix::U32, LengthPrefix::U64] {
                configs.push(WireConfig::new(endianness, prefix));
            }
        }
        configs
    }

    #[test]
    fn test_signed_uses_unsigned_pattern() {
        let bytes = encode(&-1i16, WireConfig::default()).unwrap();
        assert_eq!(&bytes[..], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_float_bit_reinterpretation() {
        let config = WireConfig::default().with_endianness(Endianness::Big);
        let bytes = encode(&1.0f32, config).unwrap();
        assert_eq!(&bytes[..], &1.0f32.to_bits().to_be_bytes());
        let back: f32 = decode(&bytes, config).unwrap();
        assert_eq!(back, 1.0);
    }

    #[test]
    fn test_nan_payload_survives() {
        let nan = f64::from_bits(0x7FF8_0000_0000_1234);
        for config in all_configs() {
            let bytes = encode(&vec![nan, 2.5], config).unwrap();
            let back: Vec<f64> = decode(&bytes, config).unwrap();
            assert_eq!(back[0].to_bits(), nan.to_bits());
            assert_eq!(back[1], 2.5);
        }
    }

    #[test]
    fn test_flat_and_per_element_paths_agree() {
        let values: Vec<u32> = (0..17).map(|i| i * 0x0101_0101).collect();
        let native = WireConfig::new(Endianness::Native, LengthPrefix::U32);
        let host = if cfg!(target_endian = "little") { Endianness::Little } else { Endianness::Big };
        let explicit = WireConfig::new(host, LengthPrefix::U32);

        let flat = encode(&values, native).unwrap();
        let mut per_element = Encoder::new(explicit);
        per_element.put_length(values.len()).unwrap();
        for v in &values {
            per_element.put_u32(*v);
        }
        assert_eq!(&flat[..], per_element.as_slice());
    }

    #[test]
    fn test_option_layout() {
        let config = WireConfig::default();
        assert_eq!(&encode(&None::<u16>, config).unwrap()[..], &[0]);
        assert_eq!(&encode(&Some(0x0102u16), config).unwrap()[..], &[1, 0x02, 0x01]);
        let bad = [2u8, 0, 0];
        assert!(matches!(
            decode::<Option<u16>>(&bad, config),
            Err(WireError::UnknownDiscriminant { .. })
        ));
    }

    #[test]
    fn test_fixed_array_has_no_prefix() {
        let config = WireConfig::default();
        let bytes = encode(&[1u16, 2, 3], config).unwrap();
        assert_eq!(bytes.len(), 6);
        let back: [u16; 3] = decode(&bytes, config).unwrap();
        assert_eq!(back, [1, 2, 3]);
    }

    #[test]
    fn test_nested_containers_round_trip() {
        let mut map: BTreeMap<String, Vec<Option<i32>>> = BTreeMap::new();
        map.insert("a".into(), vec![Some(-1), None, Some(i32::MAX)]);
        map.insert("bb".into(), vec![]);
        let value = (map, VecDeque::from(vec![1u8, 2, 3]), [true, false]);

        for config in all_configs() {
            let bytes = encode(&value, config).unwrap();
            let back: (BTreeMap<String, Vec<Option<i32>>>, VecDeque<u8>, [bool; 2]) =
                decode(&bytes, config).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn test_hash_containers_round_trip() {
        let config = WireConfig::default();
        let map: HashMap<u16, String> = (0..10).map(|i| (i, format!("v{i}"))).collect();
        let set: HashSet<i64> = [-5, 0, 5].into_iter().collect();
        let bytes = encode(&(map.clone(), set.clone()), config).unwrap();
        let (map_back, set_back): (HashMap<u16, String>, HashSet<i64>) = decode(&bytes, config).unwrap();
        assert_eq!(map_back, map);
        assert_eq!(set_back, set);
    }

    #[test]
    fn test_sequence_never_reads_past_declared_count() {
        let config = WireConfig::new(Endianness::Little, LengthPrefix::U8);
        // count 2, three u16 elements present
        let data = [2u8, 1, 0, 2, 0, 3, 0];
        let mut dec = Decoder::new(&data, config);
        let values = Vec::<u16>::decode(&mut dec).unwrap();
        assert_eq!(values, vec![1, 2]);
        assert_eq!(dec.remaining(), 2);
    }

    #[test]
    fn test_huge_count_fails_without_allocating() {
        let config = WireConfig::default();
        let mut data = Vec::new();
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        data.extend_from_slice(&[0u8; 4]);
        let err = decode::<Vec<String>>(&data, config).unwrap_err();
        assert!(err.is_truncation());
        let err = decode::<Vec<u32>>(&data, config).unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let config = WireConfig::new(Endianness::Little, LengthPrefix::U8);
        let data = [2u8, 0xC3, 0x28];
        assert_eq!(
            decode::<String>(&data, config),
            Err(WireError::InvalidUtf8 { offset: 1 })
        );
    }

    #[test]
    fn test_bool_rejects_other_bytes() {
        let config = WireConfig::default();
        assert!(matches!(
            decode::<bool>(&[7], config),
            Err(WireError::UnknownDiscriminant { type_name: "bool", value: 7 })
        ));
    }

    #[test]
    fn test_forged_count_of_zero_size_elements_rejected() {
        let config = WireConfig::default();
        let forged = u64::MAX.to_le_bytes();
        assert!(matches!(
            decode::<Vec<()>>(&forged, config),
            Err(WireError::OutOfData { context: "zero-size elements", .. })
        ));
        assert!(decode::<BTreeSet<()>>(&forged, config).is_err());
        assert!(decode::<HashMap<(), ()>>(&forged, config).is_err());

        // A count the trailing input can back still decodes
        let mut backed = encode(&vec![(); 3], config).unwrap().to_vec();
        backed.extend_from_slice(&[0xAA; 3]);
        let mut dec = crate::Decoder::new(&backed, config);
        assert_eq!(Vec::<()>::decode(&mut dec).unwrap().len(), 3);
        assert_eq!(dec.remaining(), 3);
    }
}
