//! Reference runtime for materialized images
//!
//! This is the consuming side of the image contract: a [`Loader`] decodes an image into a
//! [`Namespace`], and the namespace runs the generated code with a small register interpreter.
//! It exists so generated classes can actually be constructed and called; it is deliberately
//! plain (no verification pass, no optimization) and shares the descriptor machinery with the
//! generator, with class names as plain strings instead of interned handles.
//!
//! Failures of *generated* code (division by zero, failed casts, null receivers) surface here
//! as [`RuntimeError`], never as panics.

mod interp;
mod loader;

pub use loader::{LoadError, Loader};

use crate::access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use crate::descriptors::{FieldType, MethodDescriptor, PrimitiveType, RenderDescriptor};
use crate::image::Insn;
use crate::names::{BinaryName, Name};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A value as the interpreter sees it
///
/// Object identity is `Rc` identity. Strings and class references are immutable leaf values
/// (their classes have no user-visible members).
#[derive(Clone, Debug)]
pub enum Value {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    Str(Rc<str>),
    ClassRef(Rc<str>),
    Object(Rc<Instance>),
}

impl Value {
    /// Default value of a static type: zero, `false`, or `null`
    pub(crate) fn default_for(ty: &FieldType<BinaryName>) -> Value {
        match ty {
            FieldType::Primitive(PrimitiveType::Boolean) => Value::Boolean(false),
            FieldType::Primitive(PrimitiveType::Byte) => Value::Byte(0),
            FieldType::Primitive(PrimitiveType::Char) => Value::Char(0),
            FieldType::Primitive(PrimitiveType::Short) => Value::Short(0),
            FieldType::Primitive(PrimitiveType::Int) => Value::Int(0),
            FieldType::Primitive(PrimitiveType::Long) => Value::Long(0),
            FieldType::Primitive(PrimitiveType::Float) => Value::Float(0.0),
            FieldType::Primitive(PrimitiveType::Double) => Value::Double(0.0),
            FieldType::Object(_) => Value::Null,
        }
    }

    /// Name of the value's runtime class, if it is a reference value
    pub(crate) fn class_name(&self) -> Option<&str> {
        match self {
            Value::Str(_) => Some(BinaryName::STRING.as_str()),
            Value::ClassRef(_) => Some(BinaryName::CLASS.as_str()),
            Value::Object(instance) => Some(&instance.class.name),
            _ => None,
        }
    }

    /// Short name of the value's kind, for error messages
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Byte(_) => "byte",
            Value::Char(_) => "char",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Null => "null",
            Value::Str(_) => "string",
            Value::ClassRef(_) => "class",
            Value::Object(_) => "object",
        }
    }
}

/// Same-kind comparison; objects compare by identity, numerics by value
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::ClassRef(a), Value::ClassRef(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// One constructed object
pub struct Instance {
    /// Runtime class, fixed at construction
    pub(crate) class: Rc<LoadedClass>,

    /// Instance fields, keyed by (name, descriptor); absent entries read as defaults
    pub(crate) fields: RefCell<HashMap<(String, String), Value>>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{} instance", self.class.name))
    }
}

/// Failures raised by running generated code
#[derive(Debug, PartialEq)]
pub enum RuntimeError {
    /// Integer `/` or `%` with a zero divisor
    DivisionByZero,

    /// A non-null value failed a checked cast
    ClassCastFailure { from: String, to: String },

    /// Instance dispatch or field access through null
    NullReceiver,

    UnresolvedClass(String),

    UnresolvedMethod {
        class: String,
        name: String,
        descriptor: String,
    },

    UnresolvedField {
        class: String,
        name: String,
    },

    /// A namespace entry point was called with the wrong argument values
    ArgumentMismatch {
        method: String,
        expected: String,
        found: &'static str,
    },

    /// The image told the interpreter to do something impossible
    ///
    /// Unreachable for images produced by `materialize`, which never emits code it can
    /// statically prove incorrect.
    Malformed(String),
}

pub(crate) struct LoadedClass {
    pub(crate) name: String,

    /// Display name carried from the image, kept for diagnostics
    #[allow(dead_code)]
    pub(crate) source_name: Option<String>,

    #[allow(dead_code)]
    pub(crate) access_flags: ClassAccessFlags,

    /// Absent only for the root object class
    pub(crate) superclass: Option<String>,

    pub(crate) fields: Vec<LoadedField>,
    pub(crate) methods: Vec<Rc<LoadedMethod>>,
}

pub(crate) struct LoadedField {
    pub(crate) name: String,
    pub(crate) descriptor: FieldType<BinaryName>,
    pub(crate) access_flags: FieldAccessFlags,
    pub(crate) constant: Option<Value>,
}

pub(crate) struct LoadedMethod {
    /// Name of the owning class
    pub(crate) class: String,
    pub(crate) name: String,
    pub(crate) descriptor: MethodDescriptor<BinaryName>,

    /// Rendered descriptor, used as the resolution key
    pub(crate) descriptor_string: String,

    pub(crate) access_flags: MethodAccessFlags,

    /// Absent for intrinsic methods (the root constructor)
    pub(crate) body: Option<LoadedBody>,
}

pub(crate) struct LoadedBody {
    pub(crate) registers: Vec<FieldType<BinaryName>>,
    pub(crate) this_register: Option<u16>,
    pub(crate) parameter_registers: Vec<u16>,
    pub(crate) instructions: Vec<Insn>,
}

/// Everything one loaded image can see: its own classes plus the intrinsic core classes
///
/// Class and member resolution happens against this table when the generated code runs, so an
/// image may freely reference classes it does not define, as long as they are present here by
/// the time the reference is exercised.
pub struct Namespace {
    classes: HashMap<String, Rc<LoadedClass>>,

    /// Static field values, keyed by (class name, field name)
    statics: RefCell<HashMap<(String, String), Value>>,
}

impl Namespace {
    /// Namespace holding only the intrinsic core classes
    pub(crate) fn with_core_classes() -> Namespace {
        let mut namespace = Namespace {
            classes: HashMap::new(),
            statics: RefCell::new(HashMap::new()),
        };
        let object_name = BinaryName::OBJECT.as_str().to_string();
        let object_init = Rc::new(LoadedMethod {
            class: object_name.clone(),
            name: "<init>".to_string(),
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            descriptor_string: "()V".to_string(),
            access_flags: MethodAccessFlags::PUBLIC,
            body: None,
        });
        namespace.classes.insert(
            object_name.clone(),
            Rc::new(LoadedClass {
                name: object_name,
                source_name: None,
                access_flags: ClassAccessFlags::PUBLIC,
                superclass: None,
                fields: vec![],
                methods: vec![object_init],
            }),
        );
        for name in [BinaryName::STRING, BinaryName::CLASS] {
            namespace.classes.insert(
                name.as_str().to_string(),
                Rc::new(LoadedClass {
                    name: name.as_str().to_string(),
                    source_name: None,
                    access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL,
                    superclass: Some(BinaryName::OBJECT.as_str().to_string()),
                    fields: vec![],
                    methods: vec![],
                }),
            );
        }
        namespace
    }

    pub(crate) fn insert_class(&mut self, class: LoadedClass) {
        for field in &class.fields {
            if field.access_flags.contains(FieldAccessFlags::STATIC) {
                let initial = field
                    .constant
                    .clone()
                    .unwrap_or_else(|| Value::default_for(&field.descriptor));
                self.statics
                    .borrow_mut()
                    .insert((class.name.clone(), field.name.clone()), initial);
            }
        }
        self.classes.insert(class.name.clone(), Rc::new(class));
    }

    pub(crate) fn class(&self, name: &str) -> Result<&Rc<LoadedClass>, RuntimeError> {
        self.classes
            .get(name)
            .ok_or_else(|| RuntimeError::UnresolvedClass(name.to_string()))
    }

    /// Resolve a method on exactly the named class
    pub(crate) fn resolve_exact(
        &self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<Rc<LoadedMethod>, RuntimeError> {
        self.class(class)?
            .methods
            .iter()
            .find(|m| m.name == name && m.descriptor_string == descriptor)
            .cloned()
            .ok_or_else(|| RuntimeError::UnresolvedMethod {
                class: class.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            })
    }

    /// Resolve a method by walking the superclass chain, starting at `class`
    pub(crate) fn resolve_virtual(
        &self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<Rc<LoadedMethod>, RuntimeError> {
        let mut current = Some(class.to_string());
        while let Some(class_name) = current {
            let loaded = self.class(&class_name)?;
            if let Some(m) = loaded
                .methods
                .iter()
                .find(|m| m.name == name && m.descriptor_string == descriptor)
            {
                return Ok(Rc::clone(m));
            }
            current = loaded.superclass.clone();
        }
        Err(RuntimeError::UnresolvedMethod {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// Is the class named `class` the same as, or a subclass of, `target`?
    pub(crate) fn is_instance(&self, class: &str, target: &str) -> bool {
        let mut current = Some(class.to_string());
        while let Some(class_name) = current {
            if class_name == target {
                return true;
            }
            current = match self.classes.get(&class_name) {
                Some(loaded) => loaded.superclass.clone(),
                None => None,
            };
        }
        false
    }

    pub(crate) fn static_value(
        &self,
        class: &str,
        name: &str,
    ) -> Result<Value, RuntimeError> {
        self.statics
            .borrow()
            .get(&(class.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| RuntimeError::UnresolvedField {
                class: class.to_string(),
                name: name.to_string(),
            })
    }

    pub(crate) fn set_static_value(
        &self,
        class: &str,
        name: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let key = (class.to_string(), name.to_string());
        let mut statics = self.statics.borrow_mut();
        if !statics.contains_key(&key) {
            return Err(RuntimeError::UnresolvedField {
                class: class.to_string(),
                name: name.to_string(),
            });
        }
        statics.insert(key, value);
        Ok(())
    }

    /// Does a value fit a declared type, from this namespace's point of view?
    fn accepts(&self, value: &Value, ty: &FieldType<BinaryName>) -> bool {
        match ty {
            FieldType::Primitive(prim) => matches!(
                (value, prim),
                (Value::Boolean(_), PrimitiveType::Boolean)
                    | (Value::Byte(_), PrimitiveType::Byte)
                    | (Value::Char(_), PrimitiveType::Char)
                    | (Value::Short(_), PrimitiveType::Short)
                    | (Value::Int(_), PrimitiveType::Int)
                    | (Value::Long(_), PrimitiveType::Long)
                    | (Value::Float(_), PrimitiveType::Float)
                    | (Value::Double(_), PrimitiveType::Double)
            ),
            FieldType::Object(class) => match value.class_name() {
                Some(runtime_class) => self.is_instance(runtime_class, class.as_str()),
                None => matches!(value, Value::Null),
            },
        }
    }

    fn check_arguments(
        &self,
        method: &LoadedMethod,
        args: &[Value],
    ) -> Result<(), RuntimeError> {
        if args.len() != method.descriptor.parameters.len() {
            return Err(RuntimeError::ArgumentMismatch {
                method: format!("{}.{}", method.class, method.name),
                expected: format!("{} arguments", method.descriptor.parameters.len()),
                found: "wrong argument count",
            });
        }
        for (arg, parameter) in args.iter().zip(&method.descriptor.parameters) {
            if !self.accepts(arg, parameter) {
                return Err(RuntimeError::ArgumentMismatch {
                    method: format!("{}.{}", method.class, method.name),
                    expected: parameter.render(),
                    found: arg.kind_name(),
                });
            }
        }
        Ok(())
    }

    /// Call a static method
    ///
    /// `descriptor` is the method descriptor string (eg. `(II)I`). `None` means the method
    /// returned void.
    pub fn invoke_static(
        &self,
        class: &str,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> Result<Option<Value>, RuntimeError> {
        let method = self.resolve_exact(class, name, descriptor)?;
        self.check_arguments(&method, args)?;
        interp::run(self, &method, None, args.to_vec())
    }

    /// Construct a fresh instance of `class` through the constructor with the given descriptor
    pub fn construct(
        &self,
        class: &str,
        descriptor: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let loaded = Rc::clone(self.class(class)?);
        let init = self.resolve_exact(class, "<init>", descriptor)?;
        self.check_arguments(&init, args)?;
        let instance = Value::Object(Rc::new(Instance {
            class: loaded,
            fields: RefCell::new(HashMap::new()),
        }));
        interp::run(self, &init, Some(instance.clone()), args.to_vec())?;
        Ok(instance)
    }

    /// Call an instance method, dispatching on the receiver's runtime class
    pub fn call_method(
        &self,
        receiver: &Value,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> Result<Option<Value>, RuntimeError> {
        let class = match receiver.class_name() {
            Some(class) => class.to_string(),
            None if matches!(receiver, Value::Null) => return Err(RuntimeError::NullReceiver),
            None => {
                return Err(RuntimeError::ArgumentMismatch {
                    method: name.to_string(),
                    expected: "an object receiver".to_string(),
                    found: receiver.kind_name(),
                })
            }
        };
        let method = self.resolve_virtual(&class, name, descriptor)?;
        self.check_arguments(&method, args)?;
        interp::run(self, &method, Some(receiver.clone()), args.to_vec())
    }

    /// Read a static field
    pub fn static_field(&self, class: &str, name: &str) -> Result<Value, RuntimeError> {
        self.class(class)?;
        self.static_value(class, name)
    }
}
