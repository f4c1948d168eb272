use crate::names::{BinaryName, Name};
use crate::util::RefId;
use std::io::{Error, ErrorKind, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Utility trait for converting descriptors to and from string representations
///
/// Descriptor strings are the normalized type identities: the generator interns on them and the
/// class image stores them.
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

impl<'g, T: RenderDescriptor> RenderDescriptor for RefId<'g, T> {
    fn render_to(&self, write_to: &mut String) {
        self.0.render_to(write_to)
    }
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string
    fn parse(source: &str) -> Result<Self> {
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => {
                let msg = format!("Unexpected leftover input '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveType {
    /// Valid operand of a numeric cast (everything except `boolean`)
    pub fn is_numeric(self) -> bool {
        !matches!(self, PrimitiveType::Boolean)
    }

    /// Valid operand of arithmetic, comparison, and negation
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            PrimitiveType::Int | PrimitiveType::Long | PrimitiveType::Float | PrimitiveType::Double
        )
    }

    /// Valid operand of bitwise operators and shifts
    pub fn is_bitwise(self) -> bool {
        matches!(self, PrimitiveType::Int | PrimitiveType::Long)
    }
}

impl RenderDescriptor for PrimitiveType {
    fn render_to(&self, write_to: &mut String) {
        let c = match self {
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Char => 'C',
            PrimitiveType::Short => 'S',
            PrimitiveType::Int => 'I',
            PrimitiveType::Long => 'J',
            PrimitiveType::Float => 'F',
            PrimitiveType::Double => 'D',
        };
        write_to.push(c);
    }
}

impl ParseDescriptor for PrimitiveType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        let typ = match source.next() {
            Some('Z') => PrimitiveType::Boolean,
            Some('B') => PrimitiveType::Byte,
            Some('C') => PrimitiveType::Char,
            Some('S') => PrimitiveType::Short,
            Some('I') => PrimitiveType::Int,
            Some('J') => PrimitiveType::Long,
            Some('F') => PrimitiveType::Float,
            Some('D') => PrimitiveType::Double,
            Some(c) => {
                let msg = format!("Invalid primitive type character '{}'", c);
                return Err(Error::new(ErrorKind::InvalidInput, msg));
            }
            None => {
                let msg = "Missing primitive type character";
                return Err(Error::new(ErrorKind::UnexpectedEof, msg));
            }
        };
        Ok(typ)
    }
}

/// Type of a field, local, parameter, or return value
///
/// Generic over the class representation so the same type can be used with interned `ClassId`
/// handles on the generator side and plain `BinaryName`s on the loader side.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Primitive(PrimitiveType),
    Object(Class),
}

impl<C> FieldType<C> {
    pub const fn object(class: C) -> FieldType<C> {
        FieldType::Object(class)
    }

    pub const fn boolean() -> FieldType<C> {
        FieldType::Primitive(PrimitiveType::Boolean)
    }

    pub const fn byte() -> FieldType<C> {
        FieldType::Primitive(PrimitiveType::Byte)
    }

    pub const fn char() -> FieldType<C> {
        FieldType::Primitive(PrimitiveType::Char)
    }

    pub const fn short() -> FieldType<C> {
        FieldType::Primitive(PrimitiveType::Short)
    }

    pub const fn int() -> FieldType<C> {
        FieldType::Primitive(PrimitiveType::Int)
    }

    pub const fn long() -> FieldType<C> {
        FieldType::Primitive(PrimitiveType::Long)
    }

    pub const fn float() -> FieldType<C> {
        FieldType::Primitive(PrimitiveType::Float)
    }

    pub const fn double() -> FieldType<C> {
        FieldType::Primitive(PrimitiveType::Double)
    }

    /// The primitive kind, if this is a primitive type
    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            FieldType::Primitive(prim) => Some(*prim),
            FieldType::Object(_) => None,
        }
    }

    pub fn map<C2>(&self, map_class: impl FnOnce(&C) -> C2) -> FieldType<C2> {
        match self {
            FieldType::Primitive(prim) => FieldType::Primitive(*prim),
            FieldType::Object(cls) => FieldType::Object(map_class(cls)),
        }
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if let Some('L') = source.next() {
            let mut class_name = String::new();
            loop {
                let c: char = source.next().ok_or_else(|| {
                    let msg = format!("Missing terminator for 'L{}'", class_name);
                    Error::new(ErrorKind::UnexpectedEof, msg)
                })?;
                if c == ';' {
                    return BinaryName::from_string(class_name)
                        .map_err(|msg| Error::new(ErrorKind::InvalidInput, msg));
                } else {
                    class_name.push(c)
                }
            }
        } else {
            Err(Error::new(
                ErrorKind::InvalidInput,
                "Expected object type to start with `L`",
            ))
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Primitive(prim) => prim.render_to(write_to),
            FieldType::Object(cls) => cls.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            None => Err(Error::new(ErrorKind::UnexpectedEof, "Missing field type")),
            Some('L') => C::parse_from(source).map(FieldType::Object),
            Some(_) => PrimitiveType::parse_from(source).map(FieldType::Primitive),
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,
    pub return_type: Option<FieldType<Class>>, // `None` is for `void` (ie. no return)
}

impl<C> MethodDescriptor<C> {
    pub fn map<C2>(&self, mut map_class: impl FnMut(&C) -> C2) -> MethodDescriptor<C2> {
        MethodDescriptor {
            parameters: self
                .parameters
                .iter()
                .map(|param| param.map(&mut map_class))
                .collect(),
            return_type: self.return_type.as_ref().map(|ret| ret.map(&mut map_class)),
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        };
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if let Some('(') = source.next() {
        } else {
            let msg = "Expected '(' for method";
            return Err(Error::new(ErrorKind::InvalidInput, msg));
        }

        let mut parameters = vec![];
        while source.peek().copied() != Some(')') {
            parameters.push(FieldType::<C>::parse_from(source)?);
        }

        if let Some(')') = source.next() {
        } else {
            let msg = "Expected ')' for method";
            return Err(Error::new(ErrorKind::InvalidInput, msg));
        }

        let return_type = if let Some('V') = source.peek().copied() {
            let _ = source.next();
            None
        } else {
            Some(FieldType::<C>::parse_from(source)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fmt::Debug;

    fn round_trip<T: RenderDescriptor + ParseDescriptor + Debug + Eq>(rendered: &str, parsed: T) {
        assert_eq!(rendered, parsed.render());
        assert_eq!(T::parse(rendered).unwrap(), parsed);
    }

    type FT = FieldType<BinaryName>;

    const INT: FT = FieldType::int();
    const DOUBLE: FT = FieldType::double();
    const OBJECT: FT = FieldType::object(BinaryName::OBJECT);
    const STRING: FT = FieldType::object(BinaryName::STRING);

    #[test]
    fn primitive_types() {
        round_trip("Z", PrimitiveType::Boolean);
        round_trip("B", PrimitiveType::Byte);
        round_trip("C", PrimitiveType::Char);
        round_trip("S", PrimitiveType::Short);
        round_trip("I", PrimitiveType::Int);
        round_trip("J", PrimitiveType::Long);
        round_trip("F", PrimitiveType::Float);
        round_trip("D", PrimitiveType::Double);
    }

    #[test]
    fn field_types() {
        round_trip("I", INT);
        round_trip("Lcore/Object;", OBJECT);
        round_trip("Lcore/String;", STRING);
    }

    #[test]
    fn method_descriptors() {
        round_trip(
            "(IDLcore/String;)Lcore/Object;",
            MethodDescriptor {
                parameters: vec![INT, DOUBLE, STRING],
                return_type: Some(OBJECT),
            },
        );
        round_trip(
            "()V",
            MethodDescriptor {
                parameters: Vec::<FT>::new(),
                return_type: None,
            },
        );
    }

    #[test]
    fn malformed_descriptors() {
        assert!(FT::parse("Lcore/Object").is_err());
        assert!(FT::parse("Q").is_err());
        assert!(FT::parse("II").is_err());
        assert!(MethodDescriptor::<BinaryName>::parse("(I").is_err());
        assert!(MethodDescriptor::<BinaryName>::parse("I)V").is_err());
    }
}
