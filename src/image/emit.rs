//! Lowering of the builder graph into the image structs

use crate::code::{Code, ConstantValue, Instruction, Label};
use crate::descriptors::RenderDescriptor;
use crate::errors::Error;
use crate::generator::{FieldId, Generator, MethodData, MethodId};
use crate::image::{
    ClassDef, CodeDef, Const, FieldDef, Insn, MemberRef, MethodDef, Module, Serialize,
    FORMAT_VERSION, NO_REGISTER,
};
use crate::names::{BinaryName, Name};
use std::collections::HashMap;

impl<'g> Generator<'g> {
    /// Turn everything declared so far into a loadable image
    ///
    /// Classes appear in interning order, members in declaration order, so the output is
    /// deterministic. Classes that were only ever referenced are left out (the loader resolves
    /// them against whatever else its namespace holds); the core library classes are left out
    /// too, since every namespace provides them intrinsically.
    ///
    /// This is where whole-body validation happens: every declared method must have a finished
    /// body and every referenced label must be bound exactly once.
    pub fn materialize(&self) -> Result<Vec<u8>, Error> {
        let module = self.lower()?;
        log::debug!("materializing {} classes", module.classes.len());
        let mut buffer = vec![];
        module.serialize(&mut buffer)?;
        Ok(buffer)
    }

    fn lower(&self) -> Result<Module, Error> {
        let mut classes = vec![];
        for class in self.classes() {
            if is_core_class(&class.name) {
                continue;
            }
            let decl = match class.declaration() {
                Some(decl) => decl,
                None => continue,
            };

            let mut fields = vec![];
            for field in class.fields.iter() {
                let field_decl = match field.declaration() {
                    Some(field_decl) => field_decl,
                    None => continue,
                };
                fields.push(FieldDef {
                    name: field.name.as_str().to_string(),
                    descriptor: field.descriptor.render(),
                    access_flags: field_decl.access_flags,
                    constant: field_decl.constant.as_ref().map(lower_constant),
                });
            }

            let mut methods = vec![];
            for method in class.methods.iter() {
                let access_flags = match method.declared_flags() {
                    Some(access_flags) => access_flags,
                    None => continue,
                };
                let body = method.body.borrow();
                let code = match &*body {
                    Some(code) => lower_code(method, code)?,
                    None => {
                        return Err(Error::MissingBody {
                            method: format!("{:?}", method),
                        })
                    }
                };
                methods.push(MethodDef {
                    name: method.name.as_str().to_string(),
                    descriptor: method.descriptor.render(),
                    access_flags,
                    code,
                });
            }

            classes.push(ClassDef {
                name: class.name.as_str().to_string(),
                source_name: decl.source_name.clone(),
                access_flags: decl.access_flags,
                superclass: decl
                    .superclass
                    .map(|superclass| superclass.name.as_str().to_string())
                    .unwrap_or_else(|| BinaryName::OBJECT.as_str().to_string()),
                fields,
                methods,
            });
        }
        Ok(Module {
            version: FORMAT_VERSION,
            classes,
        })
    }
}

fn is_core_class(name: &BinaryName) -> bool {
    *name == BinaryName::OBJECT || *name == BinaryName::STRING || *name == BinaryName::CLASS
}

/// Resolve labels to flat instruction indices and drop the marks
fn lower_code<'g>(method: &MethodData<'g>, code: &Code<'g>) -> Result<CodeDef, Error> {
    // First pass: position of every bound label, counting only real instructions
    let mut bound: HashMap<Label, u32> = HashMap::with_capacity(code.label_count as usize);
    let mut position: u32 = 0;
    for instruction in &code.instructions {
        match instruction {
            Instruction::Mark { label } => {
                if bound.insert(*label, position).is_some() {
                    return Err(Error::LabelBoundTwice {
                        method: format!("{:?}", method),
                        label: *label,
                    });
                }
            }
            _ => position += 1,
        }
    }

    let resolve = |label: Label| -> Result<u32, Error> {
        bound.get(&label).copied().ok_or_else(|| Error::UnboundLabel {
            method: format!("{:?}", method),
            label,
        })
    };

    let mut instructions = vec![];
    for instruction in &code.instructions {
        let insn = match instruction {
            Instruction::Mark { .. } => continue,
            Instruction::Const { dst, value } => Insn::Const {
                dst: dst.register,
                value: lower_constant(value),
            },
            Instruction::Move { dst, src } => Insn::Move {
                dst: dst.register,
                src: src.register,
            },
            Instruction::Return { src } => Insn::Return {
                src: src.map_or(NO_REGISTER, |src| src.register),
            },
            Instruction::Unary { op, dst, src } => Insn::Unary {
                op: *op,
                dst: dst.register,
                src: src.register,
            },
            Instruction::Binary { op, dst, a, b } => Insn::Binary {
                op: *op,
                dst: dst.register,
                a: a.register,
                b: b.register,
            },
            Instruction::NumericCast { dst, src } => Insn::NumericCast {
                dst: dst.register,
                src: src.register,
            },
            Instruction::Branch {
                comparison,
                a,
                b,
                target,
            } => Insn::Branch {
                comparison: *comparison,
                a: a.register,
                b: b.register,
                target: resolve(*target)?,
            },
            Instruction::Jump { target } => Insn::Jump {
                target: resolve(*target)?,
            },
            Instruction::Invoke {
                kind,
                method,
                dst,
                args,
            } => Insn::Invoke {
                kind: *kind,
                method: method_ref(*method),
                dst: dst.map_or(NO_REGISTER, |dst| dst.register),
                args: args.iter().map(|arg| arg.register).collect(),
            },
            Instruction::StaticGet { field, dst } => Insn::StaticGet {
                field: field_ref(*field),
                dst: dst.register,
            },
            Instruction::StaticPut { field, src } => Insn::StaticPut {
                field: field_ref(*field),
                src: src.register,
            },
            Instruction::InstanceGet { field, object, dst } => Insn::InstanceGet {
                field: field_ref(*field),
                object: object.register,
                dst: dst.register,
            },
            Instruction::InstancePut { field, object, src } => Insn::InstancePut {
                field: field_ref(*field),
                object: object.register,
                src: src.register,
            },
            Instruction::CheckCast { dst, src } => Insn::CheckCast {
                dst: dst.register,
                src: src.register,
            },
            Instruction::InstanceOf { dst, object, class } => Insn::InstanceOf {
                dst: dst.register,
                object: object.register,
                class: class.name.as_str().to_string(),
            },
        };
        instructions.push(insn);
    }

    Ok(CodeDef {
        registers: code.registers.iter().map(|ty| ty.render()).collect(),
        this_register: code.this_register.unwrap_or(NO_REGISTER),
        parameter_registers: code.parameter_registers.clone(),
        instructions,
    })
}

fn lower_constant(value: &ConstantValue) -> Const {
    match value {
        ConstantValue::Boolean(b) => Const::Boolean(*b),
        ConstantValue::Byte(b) => Const::Byte(*b),
        ConstantValue::Char(c) => Const::Char(*c),
        ConstantValue::Short(s) => Const::Short(*s),
        ConstantValue::Int(i) => Const::Int(*i),
        ConstantValue::Long(l) => Const::Long(*l),
        ConstantValue::Float(f) => Const::Float(*f),
        ConstantValue::Double(d) => Const::Double(*d),
        ConstantValue::String(s) => Const::String(s.to_string()),
        ConstantValue::Class(cls) => Const::Class(cls.name.as_str().to_string()),
        ConstantValue::Null => Const::Null,
    }
}

fn method_ref(method: MethodId) -> MemberRef {
    MemberRef {
        class: method.class.name.as_str().to_string(),
        name: method.name.as_str().to_string(),
        descriptor: method.descriptor.render(),
    }
}

fn field_ref(field: FieldId) -> MemberRef {
    MemberRef {
        class: field.class.name.as_str().to_string(),
        name: field.name.as_str().to_string(),
        descriptor: field.descriptor.render(),
    }
}
