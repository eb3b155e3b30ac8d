//! Typed (de)serialization primitives, grounded in the `xdr` module's
//! shape: a pair of traits (one per direction, so write-only and
//! read-only call sites don't need the other half) plus macros that
//! generate per-struct/per-enum impls field-by-field, exactly the way
//! `XDRStruct!`/`XDREnumSerde!`/`XDRBoolUnion!` do for NFS3 types.
//!
//! Unlike XDR, this wire format has no 4-byte alignment requirement (every
//! message's opcode table entry gives it an explicit size), so there is no
//! padding logic here.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Big-endian is used throughout, matching `XDREndian`.
pub type WireEndian = BigEndian;

/// Serializes a value onto a byte sink.
pub trait Serialize {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()>;
}

/// Deserializes a value from a byte source, overwriting `self` in place.
/// Mirrors `XDR::deserialize`'s in-place style so struct/vec impls can
/// reuse an already-allocated receiver instead of constructing a fresh tree
/// of `Default::default()` values for every nested field.
pub trait Deserialize {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()>;
}

/// Convenience constructor: deserializes a fresh `T` starting from
/// `T::default()`.
pub fn deserialize<T: Deserialize + Default>(src: &mut impl Read) -> std::io::Result<T> {
    let mut value = T::default();
    value.deserialize(src)?;
    Ok(value)
}

pub fn invalid_data(message: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.into())
}

macro_rules! impl_scalar {
    ($t:ty, $read:ident, $write:ident) => {
        impl Serialize for $t {
            fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
                dest.$write::<WireEndian>(*self)
            }
        }
        impl Deserialize for $t {
            fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                *self = src.$read::<WireEndian>()?;
                Ok(())
            }
        }
    };
}

impl_scalar!(i16, read_i16, write_i16);
impl_scalar!(u16, read_u16, write_u16);
impl_scalar!(i32, read_i32, write_i32);
impl_scalar!(u32, read_u32, write_u32);
impl_scalar!(i64, read_i64, write_i64);
impl_scalar!(u64, read_u64, write_u64);

impl Serialize for u8 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u8(*self)
    }
}
impl Deserialize for u8 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u8()?;
        Ok(())
    }
}

impl Serialize for bool {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u8(*self as u8)
    }
}
impl Deserialize for bool {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u8()? != 0;
        Ok(())
    }
}

/// Strings are length-prefixed (u32) UTF-8 bytes, unpadded.
impl Serialize for String {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        let bytes = self.as_bytes();
        (bytes.len() as u32).serialize(dest)?;
        dest.write_all(bytes)
    }
}
impl Deserialize for String {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let mut len = 0u32;
        len.deserialize(src)?;
        let mut buf = vec![0u8; len as usize];
        src.read_exact(&mut buf)?;
        *self = String::from_utf8(buf).map_err(|e| invalid_data(e.to_string()))?;
        Ok(())
    }
}

/// Variable-length byte vectors: u32 length prefix, raw bytes, no padding.
impl Serialize for Vec<u8> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        (self.len() as u32).serialize(dest)?;
        dest.write_all(self)
    }
}
impl Deserialize for Vec<u8> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let mut len = 0u32;
        len.deserialize(src)?;
        self.resize(len as usize, 0);
        src.read_exact(self)
    }
}

/// Variable-length vectors of any wire-codec'd element.
impl<T: Serialize> Serialize for Vec<T> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        (self.len() as u32).serialize(dest)?;
        for item in self {
            item.serialize(dest)?;
        }
        Ok(())
    }
}
impl<T: Deserialize + Default> Deserialize for Vec<T> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let mut len = 0u32;
        len.deserialize(src)?;
        self.clear();
        self.reserve(len as usize);
        for _ in 0..len {
            let mut item = T::default();
            item.deserialize(src)?;
            self.push(item);
        }
        Ok(())
    }
}

impl<T: Serialize> Serialize for Option<T> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.is_some().serialize(dest)?;
        if let Some(v) = self {
            v.serialize(dest)?;
        }
        Ok(())
    }
}
impl<T: Deserialize + Default> Deserialize for Option<T> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let mut present = false;
        present.deserialize(src)?;
        *self = if present {
            let mut v = T::default();
            v.deserialize(src)?;
            Some(v)
        } else {
            None
        };
        Ok(())
    }
}

/// Generates `Serialize`/`Deserialize` for a struct by writing/reading each
/// named field in declaration order. Mirrors `XDRStruct!`, split into the
/// two directional traits used throughout this crate.
#[macro_export]
macro_rules! SerializeStruct {
    ($t:ty, $($field:ident),* $(,)?) => {
        impl $crate::wire::codec::Serialize for $t {
            fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
                $($crate::wire::codec::Serialize::serialize(&self.$field, dest)?;)*
                Ok(())
            }
        }
    };
}

#[macro_export]
macro_rules! DeserializeStruct {
    ($t:ty, $($field:ident),* $(,)?) => {
        impl $crate::wire::codec::Deserialize for $t {
            fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                $($crate::wire::codec::Deserialize::deserialize(&mut self.$field, src)?;)*
                Ok(())
            }
        }
    };
}

/// Generates `Serialize`/`Deserialize` for a fieldless enum backed by a
/// single-byte wire representation (used for opcodes and other small
/// closed sets, per the opcode table's "enums: 1 byte" rule in §4.1).
#[macro_export]
macro_rules! WireEnumU8 {
    ($t:ident) => {
        impl $crate::wire::codec::Serialize for $t {
            fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
                use byteorder::WriteBytesExt;
                dest.write_u8(*self as u8)
            }
        }
        impl $crate::wire::codec::Deserialize for $t {
            fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                use byteorder::ReadBytesExt;
                use num_traits::FromPrimitive;
                let raw = src.read_u8()?;
                *self = <$t as FromPrimitive>::from_u8(raw).ok_or_else(|| {
                    $crate::wire::codec::invalid_data(format!(
                        "invalid {} value {}",
                        stringify!($t),
                        raw
                    ))
                })?;
                Ok(())
            }
        }
    };
}

/// Same as [`WireEnumU8`] but for enums carried as a 4-byte field (remote
/// register indices and similar).
#[macro_export]
macro_rules! WireEnumU32 {
    ($t:ident) => {
        impl $crate::wire::codec::Serialize for $t {
            fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
                use byteorder::WriteBytesExt;
                dest.write_u32::<$crate::wire::codec::WireEndian>(*self as u32)
            }
        }
        impl $crate::wire::codec::Deserialize for $t {
            fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                use byteorder::ReadBytesExt;
                use num_traits::FromPrimitive;
                let raw = src.read_u32::<$crate::wire::codec::WireEndian>()?;
                *self = <$t as FromPrimitive>::from_u32(raw).ok_or_else(|| {
                    $crate::wire::codec::invalid_data(format!(
                        "invalid {} value {}",
                        stringify!($t),
                        raw
                    ))
                })?;
                Ok(())
            }
        }
    };
}

pub use crate::{DeserializeStruct, SerializeStruct, WireEnumU32, WireEnumU8};
