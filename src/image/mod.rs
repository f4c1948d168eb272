//! The loadable class image
//!
//! ### Format
//!
//! A materialized image is the unit of exchange between the generator and a loader. It is a
//! self-contained big-endian byte stream:
//!
//! ```text
//! image   := magic "CGIM" | version u16 | classes Vec<ClassDef>
//! strings := length u16 | UTF-8 bytes
//! vectors := length u16 | elements
//! options := present u8 (0|1) | value
//! ```
//!
//! Classes appear in the order they were interned, so materialization is deterministic. Types
//! are stored as descriptor strings (see [`crate::descriptors`]); members are referenced by
//! (class, name, descriptor) triples and resolved at load time. Method bodies store a register
//! type table plus a tagged instruction list whose branch targets are absolute instruction
//! indices (label pseudo-instructions are resolved away by the materializer).
//!
//! The core library classes (`core/Object`, `core/String`, `core/Class`) never appear in an
//! image; every namespace provides them intrinsically.
//!
//! ### Structure
//!
//! The structs here mirror the format one to one. [`crate::generator::Generator::materialize`]
//! lowers the builder graph into them (see [`emit`]) and [`Serialize`] encodes them; the
//! runtime's loader decodes the same stream back into them.

mod emit;
mod serialize;

pub use serialize::Serialize;

use crate::access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use crate::code::{BinaryOp, Comparison, DispatchKind, UnaryOp};
use byteorder::WriteBytesExt;
use std::io::Result;

/// First four bytes of every image
pub const MAGIC: [u8; 4] = *b"CGIM";

/// Version written after the magic; bumped on any format change
pub const FORMAT_VERSION: u16 = 1;

/// Register slot standing in for "no register" (void returns, discarded results, no receiver)
pub const NO_REGISTER: u16 = u16::MAX;

/// A whole image: every class materialized from one generator
pub struct Module {
    pub version: u16,
    pub classes: Vec<ClassDef>,
}

pub struct ClassDef {
    /// Binary name of the class
    pub name: String,

    /// Optional display name carried from `declare_class`
    pub source_name: Option<String>,

    pub access_flags: ClassAccessFlags,

    /// Binary name of the superclass
    pub superclass: String,

    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
}

pub struct FieldDef {
    pub name: String,

    /// Field descriptor string
    pub descriptor: String,

    pub access_flags: FieldAccessFlags,

    /// Initial value, honored by the loader for static fields
    pub constant: Option<Const>,
}

pub struct MethodDef {
    pub name: String,

    /// Method descriptor string
    pub descriptor: String,

    pub access_flags: MethodAccessFlags,

    pub code: CodeDef,
}

pub struct CodeDef {
    /// Field descriptor string per register, in register order
    pub registers: Vec<String>,

    /// Register of the receiver, or [`NO_REGISTER`] for static methods
    pub this_register: u16,

    /// Registers of the parameters, in declaration order
    pub parameter_registers: Vec<u16>,

    pub instructions: Vec<Insn>,
}

/// Member reference, resolved by the loader against its class table
pub struct MemberRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

/// Literal constant as stored in the image
pub enum Const {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(String),
    Null,
}

/// One image instruction
///
/// Registers are `u16` slots into the enclosing [`CodeDef::registers`] table; branch targets
/// are absolute indices into the enclosing instruction list.
pub enum Insn {
    Const {
        dst: u16,
        value: Const,
    },
    Move {
        dst: u16,
        src: u16,
    },
    /// `src` is [`NO_REGISTER`] for void returns
    Return {
        src: u16,
    },
    Unary {
        op: UnaryOp,
        dst: u16,
        src: u16,
    },
    Binary {
        op: BinaryOp,
        dst: u16,
        a: u16,
        b: u16,
    },
    NumericCast {
        dst: u16,
        src: u16,
    },
    Branch {
        comparison: Comparison,
        a: u16,
        b: u16,
        target: u32,
    },
    Jump {
        target: u32,
    },
    /// `dst` is [`NO_REGISTER`] when the result is void or discarded
    Invoke {
        kind: DispatchKind,
        method: MemberRef,
        dst: u16,
        args: Vec<u16>,
    },
    StaticGet {
        field: MemberRef,
        dst: u16,
    },
    StaticPut {
        field: MemberRef,
        src: u16,
    },
    InstanceGet {
        field: MemberRef,
        object: u16,
        dst: u16,
    },
    InstancePut {
        field: MemberRef,
        object: u16,
        src: u16,
    },
    CheckCast {
        dst: u16,
        src: u16,
    },
    InstanceOf {
        dst: u16,
        object: u16,
        class: String,
    },
}

impl Serialize for Module {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&MAGIC)?;
        self.version.serialize(writer)?;
        self.classes.serialize(writer)
    }
}

impl Serialize for ClassDef {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.name.serialize(writer)?;
        self.source_name.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.superclass.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)
    }
}

impl Serialize for FieldDef {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.name.serialize(writer)?;
        self.descriptor.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.constant.serialize(writer)
    }
}

impl Serialize for MethodDef {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.name.serialize(writer)?;
        self.descriptor.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.code.serialize(writer)
    }
}

impl Serialize for CodeDef {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.registers.serialize(writer)?;
        self.this_register.serialize(writer)?;
        self.parameter_registers.serialize(writer)?;
        self.instructions.serialize(writer)
    }
}

impl Serialize for MemberRef {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.class.serialize(writer)?;
        self.name.serialize(writer)?;
        self.descriptor.serialize(writer)
    }
}

impl Serialize for Const {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        match self {
            Const::Boolean(b) => {
                0u8.serialize(writer)?;
                u8::from(*b).serialize(writer)
            }
            Const::Byte(b) => {
                1u8.serialize(writer)?;
                b.serialize(writer)
            }
            Const::Char(c) => {
                2u8.serialize(writer)?;
                c.serialize(writer)
            }
            Const::Short(s) => {
                3u8.serialize(writer)?;
                s.serialize(writer)
            }
            Const::Int(i) => {
                4u8.serialize(writer)?;
                i.serialize(writer)
            }
            Const::Long(l) => {
                5u8.serialize(writer)?;
                l.serialize(writer)
            }
            Const::Float(f) => {
                6u8.serialize(writer)?;
                f.serialize(writer)
            }
            Const::Double(d) => {
                7u8.serialize(writer)?;
                d.serialize(writer)
            }
            Const::String(s) => {
                8u8.serialize(writer)?;
                s.serialize(writer)
            }
            Const::Class(c) => {
                9u8.serialize(writer)?;
                c.serialize(writer)
            }
            Const::Null => 10u8.serialize(writer),
        }
    }
}

impl Serialize for Insn {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        match self {
            Insn::Const { dst, value } => {
                0u8.serialize(writer)?;
                dst.serialize(writer)?;
                value.serialize(writer)
            }
            Insn::Move { dst, src } => {
                1u8.serialize(writer)?;
                dst.serialize(writer)?;
                src.serialize(writer)
            }
            Insn::Return { src } => {
                2u8.serialize(writer)?;
                src.serialize(writer)
            }
            Insn::Unary { op, dst, src } => {
                3u8.serialize(writer)?;
                op.serialize(writer)?;
                dst.serialize(writer)?;
                src.serialize(writer)
            }
            Insn::Binary { op, dst, a, b } => {
                4u8.serialize(writer)?;
                op.serialize(writer)?;
                dst.serialize(writer)?;
                a.serialize(writer)?;
                b.serialize(writer)
            }
            Insn::NumericCast { dst, src } => {
                5u8.serialize(writer)?;
                dst.serialize(writer)?;
                src.serialize(writer)
            }
            Insn::Branch {
                comparison,
                a,
                b,
                target,
            } => {
                6u8.serialize(writer)?;
                comparison.serialize(writer)?;
                a.serialize(writer)?;
                b.serialize(writer)?;
                target.serialize(writer)
            }
            Insn::Jump { target } => {
                7u8.serialize(writer)?;
                target.serialize(writer)
            }
            Insn::Invoke {
                kind,
                method,
                dst,
                args,
            } => {
                8u8.serialize(writer)?;
                kind.serialize(writer)?;
                method.serialize(writer)?;
                dst.serialize(writer)?;
                args.serialize(writer)
            }
            Insn::StaticGet { field, dst } => {
                9u8.serialize(writer)?;
                field.serialize(writer)?;
                dst.serialize(writer)
            }
            Insn::StaticPut { field, src } => {
                10u8.serialize(writer)?;
                field.serialize(writer)?;
                src.serialize(writer)
            }
            Insn::InstanceGet { field, object, dst } => {
                11u8.serialize(writer)?;
                field.serialize(writer)?;
                object.serialize(writer)?;
                dst.serialize(writer)
            }
            Insn::InstancePut { field, object, src } => {
                12u8.serialize(writer)?;
                field.serialize(writer)?;
                object.serialize(writer)?;
                src.serialize(writer)
            }
            Insn::CheckCast { dst, src } => {
                13u8.serialize(writer)?;
                dst.serialize(writer)?;
                src.serialize(writer)
            }
            Insn::InstanceOf { dst, object, class } => {
                14u8.serialize(writer)?;
                dst.serialize(writer)?;
                object.serialize(writer)?;
                class.serialize(writer)
            }
        }
    }
}
