use crate::code::{Label, Local};
use crate::descriptors::{FieldType, PrimitiveType};
use crate::generator::{ClassId, FieldId, MethodId};
use crate::names::BinaryName;
use std::borrow::Cow;
use std::fmt;
use std::fmt::Debug;

/// How an invoke instruction resolves its callee
///
/// One closed enum instead of a hierarchy: each kind selects its own call encoding in the image
/// and its own resolution rule in the runtime.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum DispatchKind {
    /// No receiver; resolved on the named owner
    Static,

    /// First argument is the receiver; resolved by the receiver's runtime class
    Virtual,

    /// Explicit receiver, statically dispatched (private calls, constructor chaining)
    Direct,

    /// Statically dispatched to the immediate supertype's implementation
    Super,

    /// Like `Virtual`, but the named owner is an interface
    Interface,
}

/// Two-operand operators
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    And,
    Or,
    Xor,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
}

impl BinaryOp {
    /// Operators restricted to `int`/`long` operands
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Xor
                | BinaryOp::ShiftLeft
                | BinaryOp::ShiftRight
                | BinaryOp::UnsignedShiftRight
        )
    }
}

/// One-operand operators
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum UnaryOp {
    /// Bitwise complement (`int`/`long`)
    Not,

    /// Arithmetic negation (any arithmetic type)
    Negate,
}

/// Numeric comparisons for conditional branches
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Comparison {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
}

/// Literal loaded by a const instruction or used as a field's initial value
#[derive(Clone, PartialEq)]
pub enum ConstantValue<'g> {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(Cow<'static, str>),
    Class(ClassId<'g>),
    Null,
}

impl<'g> ConstantValue<'g> {
    /// Does the literal's kind structurally match the given static type?
    ///
    /// `Null` matches any object type; string and class literals require the core string/class
    /// value types.
    pub fn matches(&self, ty: &FieldType<ClassId<'g>>) -> bool {
        match (self, ty) {
            (ConstantValue::Boolean(_), FieldType::Primitive(PrimitiveType::Boolean))
            | (ConstantValue::Byte(_), FieldType::Primitive(PrimitiveType::Byte))
            | (ConstantValue::Char(_), FieldType::Primitive(PrimitiveType::Char))
            | (ConstantValue::Short(_), FieldType::Primitive(PrimitiveType::Short))
            | (ConstantValue::Int(_), FieldType::Primitive(PrimitiveType::Int))
            | (ConstantValue::Long(_), FieldType::Primitive(PrimitiveType::Long))
            | (ConstantValue::Float(_), FieldType::Primitive(PrimitiveType::Float))
            | (ConstantValue::Double(_), FieldType::Primitive(PrimitiveType::Double))
            | (ConstantValue::Null, FieldType::Object(_)) => true,
            (ConstantValue::String(_), FieldType::Object(cls)) => cls.name == BinaryName::STRING,
            (ConstantValue::Class(_), FieldType::Object(cls)) => cls.name == BinaryName::CLASS,
            _ => false,
        }
    }

    /// Short name of the literal's kind, for error messages
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            ConstantValue::Boolean(_) => "boolean",
            ConstantValue::Byte(_) => "byte",
            ConstantValue::Char(_) => "char",
            ConstantValue::Short(_) => "short",
            ConstantValue::Int(_) => "int",
            ConstantValue::Long(_) => "long",
            ConstantValue::Float(_) => "float",
            ConstantValue::Double(_) => "double",
            ConstantValue::String(_) => "string",
            ConstantValue::Class(_) => "class",
            ConstantValue::Null => "null",
        }
    }
}

impl<'g> Debug for ConstantValue<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Boolean(b) => b.fmt(f),
            ConstantValue::Byte(b) => b.fmt(f),
            ConstantValue::Char(c) => c.fmt(f),
            ConstantValue::Short(s) => s.fmt(f),
            ConstantValue::Int(i) => i.fmt(f),
            ConstantValue::Long(l) => l.fmt(f),
            ConstantValue::Float(x) => x.fmt(f),
            ConstantValue::Double(x) => x.fmt(f),
            ConstantValue::String(s) => s.fmt(f),
            ConstantValue::Class(cls) => cls.fmt(f),
            ConstantValue::Null => f.write_str("null"),
        }
    }
}

/// One element of a method body's instruction list
///
/// A closed tagged variant; the materializer and the runtime both consume it by exhaustive
/// match.
#[derive(Clone, Debug)]
pub enum Instruction<'g> {
    /// `dst := literal`
    Const {
        dst: Local<'g>,
        value: ConstantValue<'g>,
    },

    /// `dst := src` (identical static types)
    Move { dst: Local<'g>, src: Local<'g> },

    /// Return from the method, with a value iff the method is non-void
    Return { src: Option<Local<'g>> },

    /// `dst := op src`
    Unary {
        op: UnaryOp,
        dst: Local<'g>,
        src: Local<'g>,
    },

    /// `dst := a op b`
    Binary {
        op: BinaryOp,
        dst: Local<'g>,
        a: Local<'g>,
        b: Local<'g>,
    },

    /// `dst := (dst's type) src`, between two distinct numeric types
    NumericCast { dst: Local<'g>, src: Local<'g> },

    /// Branch to `target` iff `a comparison b` holds; fall through otherwise
    Branch {
        comparison: Comparison,
        a: Local<'g>,
        b: Local<'g>,
        target: Label,
    },

    /// Unconditional branch
    Jump { target: Label },

    /// Bind `label` to this position in the stream
    Mark { label: Label },

    /// Call `method`, storing the result in `dst` (absent iff void or discarded)
    ///
    /// For every kind except `Static`, the first argument is the receiver.
    Invoke {
        kind: DispatchKind,
        method: MethodId<'g>,
        dst: Option<Local<'g>>,
        args: Vec<Local<'g>>,
    },

    /// `dst := field` (static field)
    StaticGet { field: FieldId<'g>, dst: Local<'g> },

    /// `field := src` (static field)
    StaticPut { field: FieldId<'g>, src: Local<'g> },

    /// `dst := object.field`
    InstanceGet {
        field: FieldId<'g>,
        object: Local<'g>,
        dst: Local<'g>,
    },

    /// `object.field := src`
    InstancePut {
        field: FieldId<'g>,
        object: Local<'g>,
        src: Local<'g>,
    },

    /// `dst := src` reinterpreted as `dst`'s reference type; fails at run time if incompatible
    CheckCast { dst: Local<'g>, src: Local<'g> },

    /// `dst := object is a non-null instance of class`
    InstanceOf {
        dst: Local<'g>,
        object: Local<'g>,
        class: ClassId<'g>,
    },
}

impl<'g> Instruction<'g> {
    /// Does control never fall through this instruction?
    pub(crate) fn is_terminator(&self) -> bool {
        matches!(self, Instruction::Return { .. } | Instruction::Jump { .. })
    }
}
