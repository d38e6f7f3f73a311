//! Declarative helpers for describing message types to the codec
//!
//! ```rust
//! use codec::{wire_enum, wire_struct};
//! use num_enum::{IntoPrimitive, TryFromPrimitive};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, IntoPrimitive, TryFromPrimitive)]
//! #[repr(u8)]
//! enum Channel { Control = 1, Data = 2 }
//! wire_enum!(Channel as u8);
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Frame { channel: Channel, seq: u32, body: Vec<u8> }
//! wire_struct!(Frame { channel, seq, body });
//! ```

/// Implement [`Wire`](crate::Wire) for a struct by encoding the listed fields
/// in order
///
/// Every field of the struct must be listed; the field order given here is
/// the wire order.
#[macro_export]
macro_rules! wire_struct {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::Wire for $ty {
            fn encode(&self, enc: &mut $crate::Encoder) -> $crate::WireResult<()> {
                $( $crate::Wire::encode(&self.$field, enc)?; )*
                Ok(())
            }

            fn decode(dec: &mut $crate::Decoder<'_>) -> $crate::WireResult<Self> {
                Ok(Self {
                    $( $field: $crate::Wire::decode(dec)?, )*
                })
            }
        }
    };
}

/// Implement [`Wire`](crate::Wire) for a fieldless enum as its underlying
/// integer
///
/// The enum must be `Copy` and convert both ways with its representation
/// (`num_enum::IntoPrimitive` + `num_enum::TryFromPrimitive`). Values outside
/// the enum fail with `UnknownDiscriminant`.
#[macro_export]
macro_rules! wire_enum {
    ($ty:ty as $repr:ty) => {
        impl $crate::Wire for $ty {
            const MIN_SIZE: usize = ::std::mem::size_of::<$repr>();

            fn encode(&self, enc: &mut $crate::Encoder) -> $crate::WireResult<()> {
                let raw: $repr = (*self).into();
                $crate::Wire::encode(&raw, enc)
            }

            fn decode(dec: &mut $crate::Decoder<'_>) -> $crate::WireResult<Self> {
                let raw = <$repr as $crate::Wire>::decode(dec)?;
                <$ty as ::core::convert::TryFrom<$repr>>::try_from(raw).map_err(|_| {
                    $crate::WireError::unknown_discriminant(stringify!($ty), raw as u64)
                })
            }
        }
    };
}
