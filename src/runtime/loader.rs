//! Decoding of materialized images into a runnable namespace

use crate::access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use crate::code::{BinaryOp, Comparison, DispatchKind, UnaryOp};
use crate::descriptors::{FieldType, MethodDescriptor, ParseDescriptor};
use crate::image::{Const, Insn, MemberRef, FORMAT_VERSION, MAGIC, NO_REGISTER};
use crate::names::BinaryName;
use crate::runtime::{interp, LoadedBody, LoadedClass, LoadedField, LoadedMethod, Namespace};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;
use std::rc::Rc;

/// Errors raised while decoding an image
///
/// These cover malformed *bytes*; malformed *behavior* (an instruction naming a register that
/// does not exist, say) is caught when the code runs.
#[derive(Debug)]
pub enum LoadError {
    /// The input does not start with the image magic
    BadMagic([u8; 4]),

    /// The input is a different format version than this loader speaks
    UnsupportedVersion(u16),

    /// An enum tag outside its defined range
    BadTag { what: &'static str, tag: u8 },

    /// A descriptor string that does not parse
    BadDescriptor(String),

    /// A string that is not UTF-8
    BadString,

    /// Two classes in the image (or an image class and a core class) share a name
    DuplicateClass(String),

    /// Bytes left over after the last class
    TrailingBytes(usize),

    /// Truncated input, mostly
    IoError(std::io::Error),
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> LoadError {
        LoadError::IoError(err)
    }
}

/// Decodes images into [`Namespace`]s
///
/// Loading is purely structural: descriptors are parsed, classes are indexed, and static
/// fields get their initial values. No code runs.
pub struct Loader {}

impl Loader {
    pub fn new() -> Loader {
        Loader {}
    }

    /// Decode one image into a fresh namespace (core classes included)
    pub fn load(&self, bytes: &[u8]) -> Result<Namespace, LoadError> {
        let mut reader = bytes;

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(LoadError::BadMagic(magic));
        }
        let version = reader.read_u16::<BigEndian>()?;
        if version != FORMAT_VERSION {
            return Err(LoadError::UnsupportedVersion(version));
        }

        let classes = read_vec(&mut reader, read_class)?;
        if !reader.is_empty() {
            return Err(LoadError::TrailingBytes(reader.len()));
        }

        let mut namespace = Namespace::with_core_classes();
        log::debug!("loading {} classes", classes.len());
        for class in classes {
            if namespace.classes.contains_key(&class.name) {
                return Err(LoadError::DuplicateClass(class.name));
            }
            namespace.insert_class(class);
        }
        Ok(namespace)
    }
}

impl Default for Loader {
    fn default() -> Loader {
        Loader::new()
    }
}

fn read_vec<R: Read, A>(
    reader: &mut R,
    read_elem: impl Fn(&mut R) -> Result<A, LoadError>,
) -> Result<Vec<A>, LoadError> {
    let count = reader.read_u16::<BigEndian>()?;
    let mut elems = Vec::with_capacity(count as usize);
    for _ in 0..count {
        elems.push(read_elem(reader)?);
    }
    Ok(elems)
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, LoadError> {
    let length = reader.read_u16::<BigEndian>()?;
    let mut bytes = vec![0u8; length as usize];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| LoadError::BadString)
}

fn read_option<R: Read, A>(
    reader: &mut R,
    read_value: impl FnOnce(&mut R) -> Result<A, LoadError>,
) -> Result<Option<A>, LoadError> {
    match reader.read_u8()? {
        0 => Ok(None),
        1 => read_value(reader).map(Some),
        tag => Err(LoadError::BadTag {
            what: "option",
            tag,
        }),
    }
}

fn parse_field_type(descriptor: &str) -> Result<FieldType<BinaryName>, LoadError> {
    FieldType::parse(descriptor).map_err(|_| LoadError::BadDescriptor(descriptor.to_string()))
}

fn read_class<R: Read>(reader: &mut R) -> Result<LoadedClass, LoadError> {
    let name = read_string(reader)?;
    let source_name = read_option(reader, read_string)?;
    let access_flags = ClassAccessFlags::from_bits_truncate(reader.read_u16::<BigEndian>()?);
    let superclass = read_string(reader)?;
    let fields = read_vec(reader, read_field)?;
    let class_name = name.clone();
    let methods = read_vec(reader, |reader| {
        read_method(reader, &class_name).map(Rc::new)
    })?;
    Ok(LoadedClass {
        name,
        source_name,
        access_flags,
        superclass: Some(superclass),
        fields,
        methods,
    })
}

fn read_field<R: Read>(reader: &mut R) -> Result<LoadedField, LoadError> {
    let name = read_string(reader)?;
    let descriptor = parse_field_type(&read_string(reader)?)?;
    let access_flags = FieldAccessFlags::from_bits_truncate(reader.read_u16::<BigEndian>()?);
    let constant = read_option(reader, read_const)?;
    Ok(LoadedField {
        name,
        descriptor,
        access_flags,
        constant: constant.as_ref().map(interp::constant_value),
    })
}

fn read_method<R: Read>(reader: &mut R, class: &str) -> Result<LoadedMethod, LoadError> {
    let name = read_string(reader)?;
    let descriptor_string = read_string(reader)?;
    let descriptor = MethodDescriptor::parse(&descriptor_string)
        .map_err(|_| LoadError::BadDescriptor(descriptor_string.clone()))?;
    let access_flags = MethodAccessFlags::from_bits_truncate(reader.read_u16::<BigEndian>()?);
    let body = read_code(reader)?;
    Ok(LoadedMethod {
        class: class.to_string(),
        name,
        descriptor,
        descriptor_string,
        access_flags,
        body: Some(body),
    })
}

fn read_code<R: Read>(reader: &mut R) -> Result<LoadedBody, LoadError> {
    let registers = read_vec(reader, |reader| {
        let descriptor = read_string(reader)?;
        parse_field_type(&descriptor)
    })?;
    let this_register = match reader.read_u16::<BigEndian>()? {
        NO_REGISTER => None,
        register => Some(register),
    };
    let parameter_registers = read_vec(reader, |reader| {
        reader.read_u16::<BigEndian>().map_err(LoadError::from)
    })?;
    let instructions = read_vec(reader, read_insn)?;
    Ok(LoadedBody {
        registers,
        this_register,
        parameter_registers,
        instructions,
    })
}

fn read_member_ref<R: Read>(reader: &mut R) -> Result<MemberRef, LoadError> {
    Ok(MemberRef {
        class: read_string(reader)?,
        name: read_string(reader)?,
        descriptor: read_string(reader)?,
    })
}

fn read_const<R: Read>(reader: &mut R) -> Result<Const, LoadError> {
    let constant = match reader.read_u8()? {
        0 => Const::Boolean(reader.read_u8()? != 0),
        1 => Const::Byte(reader.read_i8()?),
        2 => Const::Char(reader.read_u16::<BigEndian>()?),
        3 => Const::Short(reader.read_i16::<BigEndian>()?),
        4 => Const::Int(reader.read_i32::<BigEndian>()?),
        5 => Const::Long(reader.read_i64::<BigEndian>()?),
        6 => Const::Float(reader.read_f32::<BigEndian>()?),
        7 => Const::Double(reader.read_f64::<BigEndian>()?),
        8 => Const::String(read_string(reader)?),
        9 => Const::Class(read_string(reader)?),
        10 => Const::Null,
        tag => {
            return Err(LoadError::BadTag {
                what: "constant",
                tag,
            })
        }
    };
    Ok(constant)
}

fn read_binary_op<R: Read>(reader: &mut R) -> Result<BinaryOp, LoadError> {
    let op = match reader.read_u8()? {
        0 => BinaryOp::Add,
        1 => BinaryOp::Subtract,
        2 => BinaryOp::Multiply,
        3 => BinaryOp::Divide,
        4 => BinaryOp::Remainder,
        5 => BinaryOp::And,
        6 => BinaryOp::Or,
        7 => BinaryOp::Xor,
        8 => BinaryOp::ShiftLeft,
        9 => BinaryOp::ShiftRight,
        10 => BinaryOp::UnsignedShiftRight,
        tag => {
            return Err(LoadError::BadTag {
                what: "binary operator",
                tag,
            })
        }
    };
    Ok(op)
}

fn read_unary_op<R: Read>(reader: &mut R) -> Result<UnaryOp, LoadError> {
    let op = match reader.read_u8()? {
        0 => UnaryOp::Not,
        1 => UnaryOp::Negate,
        tag => {
            return Err(LoadError::BadTag {
                what: "unary operator",
                tag,
            })
        }
    };
    Ok(op)
}

fn read_comparison<R: Read>(reader: &mut R) -> Result<Comparison, LoadError> {
    let comparison = match reader.read_u8()? {
        0 => Comparison::Lt,
        1 => Comparison::Le,
        2 => Comparison::Eq,
        3 => Comparison::Ge,
        4 => Comparison::Gt,
        5 => Comparison::Ne,
        tag => {
            return Err(LoadError::BadTag {
                what: "comparison",
                tag,
            })
        }
    };
    Ok(comparison)
}

fn read_dispatch_kind<R: Read>(reader: &mut R) -> Result<DispatchKind, LoadError> {
    let kind = match reader.read_u8()? {
        0 => DispatchKind::Static,
        1 => DispatchKind::Virtual,
        2 => DispatchKind::Direct,
        3 => DispatchKind::Super,
        4 => DispatchKind::Interface,
        tag => {
            return Err(LoadError::BadTag {
                what: "dispatch kind",
                tag,
            })
        }
    };
    Ok(kind)
}

fn read_insn<R: Read>(reader: &mut R) -> Result<Insn, LoadError> {
    let insn = match reader.read_u8()? {
        0 => Insn::Const {
            dst: reader.read_u16::<BigEndian>()?,
            value: read_const(reader)?,
        },
        1 => Insn::Move {
            dst: reader.read_u16::<BigEndian>()?,
            src: reader.read_u16::<BigEndian>()?,
        },
        2 => Insn::Return {
            src: reader.read_u16::<BigEndian>()?,
        },
        3 => Insn::Unary {
            op: read_unary_op(reader)?,
            dst: reader.read_u16::<BigEndian>()?,
            src: reader.read_u16::<BigEndian>()?,
        },
        4 => Insn::Binary {
            op: read_binary_op(reader)?,
            dst: reader.read_u16::<BigEndian>()?,
            a: reader.read_u16::<BigEndian>()?,
            b: reader.read_u16::<BigEndian>()?,
        },
        5 => Insn::NumericCast {
            dst: reader.read_u16::<BigEndian>()?,
            src: reader.read_u16::<BigEndian>()?,
        },
        6 => Insn::Branch {
            comparison: read_comparison(reader)?,
            a: reader.read_u16::<BigEndian>()?,
            b: reader.read_u16::<BigEndian>()?,
            target: reader.read_u32::<BigEndian>()?,
        },
        7 => Insn::Jump {
            target: reader.read_u32::<BigEndian>()?,
        },
        8 => Insn::Invoke {
            kind: read_dispatch_kind(reader)?,
            method: read_member_ref(reader)?,
            dst: reader.read_u16::<BigEndian>()?,
            args: read_vec(reader, |reader| {
                reader.read_u16::<BigEndian>().map_err(LoadError::from)
            })?,
        },
        9 => Insn::StaticGet {
            field: read_member_ref(reader)?,
            dst: reader.read_u16::<BigEndian>()?,
        },
        10 => Insn::StaticPut {
            field: read_member_ref(reader)?,
            src: reader.read_u16::<BigEndian>()?,
        },
        11 => Insn::InstanceGet {
            field: read_member_ref(reader)?,
            object: reader.read_u16::<BigEndian>()?,
            dst: reader.read_u16::<BigEndian>()?,
        },
        12 => Insn::InstancePut {
            field: read_member_ref(reader)?,
            object: reader.read_u16::<BigEndian>()?,
            src: reader.read_u16::<BigEndian>()?,
        },
        13 => Insn::CheckCast {
            dst: reader.read_u16::<BigEndian>()?,
            src: reader.read_u16::<BigEndian>()?,
        },
        14 => Insn::InstanceOf {
            dst: reader.read_u16::<BigEndian>()?,
            object: reader.read_u16::<BigEndian>()?,
            class: read_string(reader)?,
        },
        tag => {
            return Err(LoadError::BadTag {
                what: "instruction",
                tag,
            })
        }
    };
    Ok(insn)
}
