//! Generate classes at run time
//!
//! ### Simple example
//!
//! Consider the following simple class, written in source form:
//!
//! ```text
//! public class Point {
//!     public final int x;
//!
//!     public Point(int x) { this.x = x; }
//!
//!     public int getX() { return this.x; }
//! }
//! ```
//!
//! Generating, materializing, and running an analogous class can be done as follows:
//!
//! ```
//! use classgen::generator::{Generator, GeneratorArenas};
//! use classgen::runtime::{Loader, Value};
//! use classgen::{BinaryName, ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
//! use classgen::{FieldType, MethodDescriptor, Name, UnqualifiedName};
//!
//! // Setup the generator, add in the core library types
//! let arenas = GeneratorArenas::new();
//! let generator = Generator::new(&arenas);
//! let core = generator.insert_core_classes();
//!
//! // Declare the class and its members
//! let point = generator.class(BinaryName::from_string(String::from("demo/Point")).unwrap());
//! generator
//!     .declare_class(point, Some("Point"), ClassAccessFlags::PUBLIC, core.object)
//!     .unwrap();
//!
//! let field_x = generator.add_field(
//!     point,
//!     UnqualifiedName::from_string(String::from("x")).unwrap(),
//!     FieldType::int(),
//! );
//! generator
//!     .declare_field(field_x, FieldAccessFlags::PUBLIC | FieldAccessFlags::FINAL, None)
//!     .unwrap();
//!
//! // Generate the constructor body
//! let constructor = generator.add_constructor(point, vec![FieldType::int()]);
//! let mut code = generator
//!     .declare_method(constructor, MethodAccessFlags::PUBLIC)
//!     .unwrap();
//! let this = code.receiver(FieldType::object(point)).unwrap();
//! let x = code.parameter(0, FieldType::int()).unwrap();
//! code.invoke_direct(core.object_init, None, &[this]).unwrap();
//! code.instance_put(field_x, this, x).unwrap();
//! code.return_void().unwrap();
//! code.finish().unwrap();
//!
//! // Generate the getter body
//! let get_x = generator.add_method(
//!     point,
//!     UnqualifiedName::from_string(String::from("getX")).unwrap(),
//!     MethodDescriptor {
//!         parameters: vec![],
//!         return_type: Some(FieldType::int()),
//!     },
//! );
//! let mut code = generator
//!     .declare_method(get_x, MethodAccessFlags::PUBLIC)
//!     .unwrap();
//! let this = code.receiver(FieldType::object(point)).unwrap();
//! let out = code.new_local(FieldType::int());
//! code.instance_get(field_x, this, out).unwrap();
//! code.return_value(out).unwrap();
//! code.finish().unwrap();
//!
//! // Materialize, load, and exercise the class
//! let image = generator.materialize().unwrap();
//! let namespace = Loader::new().load(&image).unwrap();
//! let instance = namespace.construct("demo/Point", "(I)V", &[Value::Int(7)]).unwrap();
//! let got = namespace.call_method(&instance, "getX", "()I", &[]).unwrap();
//! assert_eq!(got, Some(Value::Int(7)));
//! ```

pub mod code;
pub mod generator;
pub mod image;
pub mod runtime;

mod access_flags;
mod descriptors;
mod errors;
mod names;
mod util;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
pub use util::RefId;
