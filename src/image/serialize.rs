use crate::code::{BinaryOp, Comparison, DispatchKind, UnaryOp};
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{Error, ErrorKind, Result};

fn length_prefix(length: usize) -> Result<u16> {
    u16::try_from(length)
        .map_err(|_| Error::new(ErrorKind::InvalidInput, "sequence length exceeds u16"))
}

/// Utility trait for serializing data inside class images
///
/// The image format has some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is `u16`
///   - everything multi-byte is big-endian
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for u16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(*self)
    }
}

impl Serialize for u32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(*self)
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

impl Serialize for i16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i16::<BigEndian>(*self)
    }
}

impl Serialize for i32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<BigEndian>(*self)
    }
}

impl Serialize for i64 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i64::<BigEndian>(*self)
    }
}

impl Serialize for f32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_f32::<BigEndian>(*self)
    }
}

impl Serialize for f64 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_f64::<BigEndian>(*self)
    }
}

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        length_prefix(self.len())?.serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

/// Length in `u16` followed by the UTF-8 bytes
impl Serialize for String {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        length_prefix(self.len())?.serialize(writer)?;
        writer.write_all(self.as_bytes())
    }
}

/// Presence byte (0 or 1) followed by the value, if present
impl<A: Serialize> Serialize for Option<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        match self {
            None => 0u8.serialize(writer),
            Some(value) => {
                1u8.serialize(writer)?;
                value.serialize(writer)
            }
        }
    }
}

impl Serialize for BinaryOp {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        let tag: u8 = match self {
            BinaryOp::Add => 0,
            BinaryOp::Subtract => 1,
            BinaryOp::Multiply => 2,
            BinaryOp::Divide => 3,
            BinaryOp::Remainder => 4,
            BinaryOp::And => 5,
            BinaryOp::Or => 6,
            BinaryOp::Xor => 7,
            BinaryOp::ShiftLeft => 8,
            BinaryOp::ShiftRight => 9,
            BinaryOp::UnsignedShiftRight => 10,
        };
        tag.serialize(writer)
    }
}

impl Serialize for UnaryOp {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        let tag: u8 = match self {
            UnaryOp::Not => 0,
            UnaryOp::Negate => 1,
        };
        tag.serialize(writer)
    }
}

impl Serialize for Comparison {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        let tag: u8 = match self {
            Comparison::Lt => 0,
            Comparison::Le => 1,
            Comparison::Eq => 2,
            Comparison::Ge => 3,
            Comparison::Gt => 4,
            Comparison::Ne => 5,
        };
        tag.serialize(writer)
    }
}

impl Serialize for DispatchKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        let tag: u8 = match self {
            DispatchKind::Static => 0,
            DispatchKind::Virtual => 1,
            DispatchKind::Direct => 2,
            DispatchKind::Super => 3,
            DispatchKind::Interface => 4,
        };
        tag.serialize(writer)
    }
}
