use crate::access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use crate::code::{Code, CodeBuilder, ConstantValue};
use crate::descriptors::{FieldType, MethodDescriptor, RenderDescriptor};
use crate::errors::Error;
use crate::names::{BinaryName, Name, UnqualifiedName};
use crate::util::RefId;
use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::fmt::Debug;
use typed_arena::Arena;

/// Interned handle to a class (declared or merely referenced)
pub type ClassId<'g> = RefId<'g, ClassData<'g>>;

/// Interned handle to a method signature
pub type MethodId<'g> = RefId<'g, MethodData<'g>>;

/// Interned handle to a field
pub type FieldId<'g> = RefId<'g, FieldData<'g>>;

/// Arenas backing one [`Generator`]
///
/// Kept separate from the generator itself so that handles can borrow from the arenas for the
/// whole generation session while the generator is still free to hand out fresh entries.
pub struct GeneratorArenas<'g> {
    class_arena: Arena<ClassData<'g>>,
    method_arena: Arena<MethodData<'g>>,
    field_arena: Arena<FieldData<'g>>,
}

impl<'g> GeneratorArenas<'g> {
    pub fn new() -> Self {
        GeneratorArenas {
            class_arena: Arena::new(),
            method_arena: Arena::new(),
            field_arena: Arena::new(),
        }
    }
}

impl<'g> Default for GeneratorArenas<'g> {
    fn default() -> Self {
        GeneratorArenas::new()
    }
}

/// Tracks every type and member handle created during one generation session
///
/// All handles are interned: asking twice for the same class name, or for a member with the same
/// (owner, name, signature), returns the same arena entry. Handles may be created before the
/// entity they name is declared, so call sites and declarations can be built in either order.
/// The expected usage is build-completely-then-[`materialize`](Generator::materialize)-then-
/// discard; nothing here is safe for concurrent mutation.
pub struct Generator<'g> {
    arenas: &'g GeneratorArenas<'g>,

    /// Classes by name (interning map)
    classes_by_name: FrozenMap<&'g BinaryName, &'g ClassData<'g>>,

    /// Classes in interning order, so materialized output is deterministic
    classes: FrozenVec<&'g ClassData<'g>>,

    /// Source of per-body identifiers used to scope locals and labels
    next_code_id: Cell<u32>,
}

impl<'g> Generator<'g> {
    /// New empty generator
    pub fn new(arenas: &'g GeneratorArenas<'g>) -> Self {
        Generator {
            arenas,
            classes_by_name: FrozenMap::new(),
            classes: FrozenVec::new(),
            next_code_id: Cell::new(0),
        }
    }

    /// Intern a class handle by name
    ///
    /// Idempotent: repeated calls with the same name return the same handle. The class need not
    /// be declared yet (or ever, for classes that exist only as call targets).
    pub fn class(&'g self, name: BinaryName) -> ClassId<'g> {
        if let Some(data) = self.classes_by_name.get(&name) {
            return RefId(data);
        }
        let data = &*self.arenas.class_arena.alloc(ClassData::undeclared(name));
        self.classes_by_name.insert(&data.name, data);
        self.classes.push(data);
        RefId(data)
    }

    /// Begin the declaration of a class
    ///
    /// Must be called exactly once per generated class and must precede declarations of the
    /// class's members. `source_name` is an optional display name carried through to the image.
    pub fn declare_class(
        &self,
        class: ClassId<'g>,
        source_name: Option<&str>,
        access_flags: ClassAccessFlags,
        superclass: ClassId<'g>,
    ) -> Result<(), Error> {
        let mut decl = class.0.decl.borrow_mut();
        if decl.is_some() {
            return Err(Error::DuplicateClassDeclaration(class.name.clone()));
        }
        *decl = Some(ClassDecl {
            access_flags,
            superclass: Some(superclass),
            source_name: source_name.map(String::from),
        });
        Ok(())
    }

    /// Intern a method handle by (owner, name, signature)
    ///
    /// The handle is a structural value object; it is not validated against an actual member
    /// table until materialization, so the callee's declaration may come later (or never, for
    /// external classes).
    pub fn add_method(
        &'g self,
        class: ClassId<'g>,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<ClassId<'g>>,
    ) -> MethodId<'g> {
        if let Some(m) = class
            .0
            .methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
        {
            return RefId(m);
        }
        let data = &*self.arenas.method_arena.alloc(MethodData {
            class,
            name,
            descriptor,
            decl: Cell::new(None),
            body: RefCell::new(None),
        });
        class.0.methods.push(data);
        RefId(data)
    }

    /// Intern a constructor handle (the reserved `<init>` name, void return)
    pub fn add_constructor(
        &'g self,
        class: ClassId<'g>,
        parameters: Vec<FieldType<ClassId<'g>>>,
    ) -> MethodId<'g> {
        self.add_method(
            class,
            UnqualifiedName::INIT,
            MethodDescriptor {
                parameters,
                return_type: None,
            },
        )
    }

    /// Intern a field handle by (owner, name, type)
    ///
    /// TODO: reject two declared fields on one class that share a name
    pub fn add_field(
        &'g self,
        class: ClassId<'g>,
        name: UnqualifiedName,
        descriptor: FieldType<ClassId<'g>>,
    ) -> FieldId<'g> {
        if let Some(f) = class
            .0
            .fields
            .iter()
            .find(|f| f.name == name && f.descriptor == descriptor)
        {
            return RefId(f);
        }
        let data = &*self.arenas.field_arena.alloc(FieldData {
            class,
            name,
            descriptor,
            decl: RefCell::new(None),
        });
        class.0.fields.push(data);
        RefId(data)
    }

    /// Declare a method, fixing its access flags and opening its one body builder
    ///
    /// The owning class must already be declared. Each method can be declared only once; the
    /// returned [`CodeBuilder`] is the only way to give it a body.
    pub fn declare_method(
        &self,
        method: MethodId<'g>,
        access_flags: MethodAccessFlags,
    ) -> Result<CodeBuilder<'g>, Error> {
        if !method.class.is_declared() {
            return Err(Error::UndeclaredClass(method.class.name.clone()));
        }
        if method.0.decl.get().is_some() {
            return Err(Error::DuplicateMemberDeclaration {
                class: method.class.name.clone(),
                member: format!("{:?}", method.0),
            });
        }
        method.0.decl.set(Some(access_flags));
        let code_id = self.next_code_id.get();
        self.next_code_id.set(code_id + 1);
        Ok(CodeBuilder::new(method, access_flags, code_id))
    }

    /// Declare a field, fixing its access flags and optional constant initial value
    ///
    /// A constant on a static field is honored by the loader without running any code. A
    /// constant on an instance field is accepted but has no effect: freshly constructed
    /// instances read the type's default value regardless.
    pub fn declare_field(
        &self,
        field: FieldId<'g>,
        access_flags: FieldAccessFlags,
        constant: Option<ConstantValue<'g>>,
    ) -> Result<(), Error> {
        if !field.class.is_declared() {
            return Err(Error::UndeclaredClass(field.class.name.clone()));
        }
        let mut decl = field.0.decl.borrow_mut();
        if decl.is_some() {
            return Err(Error::DuplicateMemberDeclaration {
                class: field.class.name.clone(),
                member: format!("{:?}", field.0),
            });
        }
        if let Some(constant) = &constant {
            if !constant.matches(&field.descriptor) {
                return Err(Error::ConstantTypeMismatch {
                    expected: field.descriptor.render(),
                    found: constant.kind_name(),
                });
            }
            if !access_flags.contains(FieldAccessFlags::STATIC) {
                log::warn!(
                    "constant initial value on instance field {:?} has no effect",
                    field.0
                );
            }
        }
        *decl = Some(FieldDecl {
            access_flags,
            constant,
        });
        Ok(())
    }

    /// Add the core library classes to the generator
    ///
    /// Declares the root object class plus the string and class value types, and registers the
    /// root's no-argument constructor (every generated constructor chains to some constructor,
    /// ultimately this one). Idempotent.
    pub fn insert_core_classes(&'g self) -> CoreClasses<'g> {
        let object = self.class(BinaryName::OBJECT);
        if !object.is_declared() {
            *object.0.decl.borrow_mut() = Some(ClassDecl {
                access_flags: ClassAccessFlags::PUBLIC,
                superclass: None,
                source_name: None,
            });
        }
        let string = self.class(BinaryName::STRING);
        if !string.is_declared() {
            *string.0.decl.borrow_mut() = Some(ClassDecl {
                access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL,
                superclass: Some(object),
                source_name: None,
            });
        }
        let class = self.class(BinaryName::CLASS);
        if !class.is_declared() {
            *class.0.decl.borrow_mut() = Some(ClassDecl {
                access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL,
                superclass: Some(object),
                source_name: None,
            });
        }
        let object_init = self.add_constructor(object, vec![]);
        if object_init.0.decl.get().is_none() {
            object_init.0.decl.set(Some(MethodAccessFlags::PUBLIC));
        }

        CoreClasses {
            object,
            string,
            class,
            object_init,
        }
    }

    /// Iterate over every interned class, in interning order
    pub fn classes<'a>(&'a self) -> impl Iterator<Item = &'a ClassData<'g>> + 'a {
        self.classes.iter()
    }
}

/// Handles to the core library classes (see [`Generator::insert_core_classes`])
pub struct CoreClasses<'g> {
    /// Root of the class hierarchy
    pub object: ClassId<'g>,

    /// Value class of string literals
    pub string: ClassId<'g>,

    /// Value class of type literals
    pub class: ClassId<'g>,

    /// The root no-argument constructor
    pub object_init: MethodId<'g>,
}

/// Filled in by `declare_class`, exactly once
#[derive(Clone)]
pub struct ClassDecl<'g> {
    pub access_flags: ClassAccessFlags,

    /// Only ever `None` for the root object class
    pub superclass: Option<ClassId<'g>>,

    pub source_name: Option<String>,
}

pub struct ClassData<'g> {
    /// Name of the class
    pub name: BinaryName,

    /// Declaration, absent while the class is only a forward reference
    pub(crate) decl: RefCell<Option<ClassDecl<'g>>>,

    /// Method handles interned on this class (declared or not)
    pub methods: FrozenVec<&'g MethodData<'g>>,

    /// Field handles interned on this class (declared or not)
    pub fields: FrozenVec<&'g FieldData<'g>>,
}

impl<'g> ClassData<'g> {
    fn undeclared(name: BinaryName) -> ClassData<'g> {
        ClassData {
            name,
            decl: RefCell::new(None),
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
        }
    }

    pub fn is_declared(&self) -> bool {
        self.decl.borrow().is_some()
    }

    pub fn declaration(&self) -> Option<ClassDecl<'g>> {
        self.decl.borrow().clone()
    }

    pub fn superclass(&self) -> Option<ClassId<'g>> {
        self.decl.borrow().as_ref().and_then(|decl| decl.superclass)
    }
}

/// Query if one class is assignable to another
///
/// This does a search up the declared superclass chain. Everything is assignable to the root
/// object class; classes known only as forward references contribute no superclass edges.
pub fn is_assignable<'g>(sub_type: ClassId<'g>, super_type: ClassId<'g>) -> bool {
    if super_type.name == BinaryName::OBJECT {
        return true;
    }
    let mut next_class = Some(sub_type);
    while let Some(class) = next_class {
        if class == super_type {
            return true;
        }
        next_class = class.superclass();
    }
    false
}

impl<'g> PartialEq for ClassData<'g> {
    fn eq(&self, other: &ClassData<'g>) -> bool {
        self.name == other.name
    }
}

impl<'g> Eq for ClassData<'g> {}

impl<'g> RenderDescriptor for ClassData<'g> {
    fn render_to(&self, write_to: &mut String) {
        self.name.render_to(write_to)
    }
}

impl<'g> Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

pub struct MethodData<'g> {
    /// Owning class
    pub class: ClassId<'g>,

    /// Name of the method (`<init>` for constructors)
    pub name: UnqualifiedName,

    /// Signature of the method
    pub descriptor: MethodDescriptor<ClassId<'g>>,

    /// Access flags, fixed by `declare_method`
    pub(crate) decl: Cell<Option<MethodAccessFlags>>,

    /// Finished body, attached by `CodeBuilder::finish`
    pub(crate) body: RefCell<Option<Code<'g>>>,
}

impl<'g> MethodData<'g> {
    pub fn is_declared(&self) -> bool {
        self.decl.get().is_some()
    }

    pub fn declared_flags(&self) -> Option<MethodAccessFlags> {
        self.decl.get()
    }

    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }

    /// Attach the finished body; a method receives a body at most once
    pub(crate) fn attach_body(&self, code: Code<'g>) -> Result<(), Error> {
        let mut body = self.body.borrow_mut();
        if body.is_some() {
            return Err(Error::BodyAlreadyAttached {
                method: format!("{:?}", self),
            });
        }
        *body = Some(code);
        Ok(())
    }
}

impl<'g> Debug for MethodData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.name.as_str(),
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}

pub struct FieldData<'g> {
    /// Owning class
    pub class: ClassId<'g>,

    /// Name of the field
    pub name: UnqualifiedName,

    /// Type of the field
    pub descriptor: FieldType<ClassId<'g>>,

    /// Access flags and constant value, fixed by `declare_field`
    pub(crate) decl: RefCell<Option<FieldDecl<'g>>>,
}

/// Filled in by `declare_field`, exactly once
#[derive(Clone)]
pub struct FieldDecl<'g> {
    pub access_flags: FieldAccessFlags,
    pub constant: Option<ConstantValue<'g>>,
}

impl<'g> FieldData<'g> {
    pub fn is_declared(&self) -> bool {
        self.decl.borrow().is_some()
    }

    pub fn declaration(&self) -> Option<FieldDecl<'g>> {
        self.decl.borrow().clone()
    }
}

impl<'g> Debug for FieldData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.name.as_str(),
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}
