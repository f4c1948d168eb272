use crate::descriptors::{FieldType, RenderDescriptor};
use crate::generator::ClassId;
use std::fmt;

/// Typed virtual register, scoped to one method body
///
/// Either parameter-bound (an alias to an incoming argument) or a fresh temporary that starts
/// out holding its type's default value. The static type is fixed at creation and checked on
/// every use.
#[derive(Copy, Clone)]
pub struct Local<'g> {
    /// Which body this local belongs to
    pub(crate) code: u32,

    /// Register index within that body
    pub(crate) register: u16,

    /// Static type, fixed at creation
    pub(crate) ty: FieldType<ClassId<'g>>,
}

impl<'g> Local<'g> {
    /// The static type of the register
    pub fn static_type(&self) -> FieldType<ClassId<'g>> {
        self.ty
    }
}

impl<'g> fmt::Debug for Local<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("v{}:{}", self.register, self.ty.render()))
    }
}
