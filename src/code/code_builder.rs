use crate::access_flags::MethodAccessFlags;
use crate::code::{
    BinaryOp, Comparison, ConstantValue, DispatchKind, Instruction, Label, LabelGenerator, Local,
    UnaryOp,
};
use crate::descriptors::{FieldType, RenderDescriptor};
use crate::errors::Error;
use crate::generator::{is_assignable, ClassId, FieldId, MethodId};

/// Finished method body, produced by [`CodeBuilder::finish`]
pub struct Code<'g> {
    /// Static type of every register, in register order
    pub(crate) registers: Vec<FieldType<ClassId<'g>>>,

    /// Register holding the receiver, absent for static methods
    pub(crate) this_register: Option<u16>,

    /// Registers holding the parameters, in declaration order
    pub(crate) parameter_registers: Vec<u16>,

    /// The instruction list, including `Mark` pseudo-instructions
    pub(crate) instructions: Vec<Instruction<'g>>,

    /// How many labels the body's builder handed out
    pub(crate) label_count: u32,
}

/// Builder for the body of one declared method
///
/// Opened by [`crate::generator::Generator::declare_method`] and consumed by [`finish`]
/// (CodeBuilder::finish). Every appending call checks its operands eagerly: a failed call
/// appends nothing and leaves the builder usable.
///
/// Receiver and parameter registers are allocated up front; everything else comes from
/// [`new_local`](CodeBuilder::new_local).
pub struct CodeBuilder<'g> {
    method: MethodId<'g>,
    access_flags: MethodAccessFlags,

    /// Scopes this builder's locals and labels to this body
    code_id: u32,

    registers: Vec<FieldType<ClassId<'g>>>,
    this_register: Option<u16>,
    parameter_registers: Vec<u16>,
    instructions: Vec<Instruction<'g>>,
    labels: LabelGenerator,
}

impl<'g> CodeBuilder<'g> {
    pub(crate) fn new(
        method: MethodId<'g>,
        access_flags: MethodAccessFlags,
        code_id: u32,
    ) -> CodeBuilder<'g> {
        let mut registers = vec![];
        let this_register = if access_flags.contains(MethodAccessFlags::STATIC) {
            None
        } else {
            registers.push(FieldType::object(method.class));
            Some(0)
        };
        let mut parameter_registers = vec![];
        for parameter in &method.descriptor.parameters {
            parameter_registers.push(registers.len() as u16);
            registers.push(*parameter);
        }
        CodeBuilder {
            method,
            access_flags,
            code_id,
            registers,
            this_register,
            parameter_registers,
            instructions: vec![],
            labels: LabelGenerator::new(code_id),
        }
    }

    /// The method this builder belongs to
    pub fn method(&self) -> MethodId<'g> {
        self.method
    }

    fn local(&self, register: u16) -> Local<'g> {
        Local {
            code: self.code_id,
            register,
            ty: self.registers[register as usize],
        }
    }

    fn check_local(&self, local: Local<'g>) -> Result<(), Error> {
        if local.code != self.code_id {
            return Err(Error::ForeignLocal {
                register: local.register,
            });
        }
        Ok(())
    }

    fn check_label(&self, label: Label) -> Result<(), Error> {
        if label.code != self.code_id {
            return Err(Error::ForeignLabel(label));
        }
        Ok(())
    }

    /// Local bound to the parameter at `index`
    ///
    /// The expected type must exactly match the declared parameter type. Repeated calls return
    /// locals naming the same register; writes through any of them are visible to all.
    pub fn parameter(
        &self,
        index: usize,
        expecting: FieldType<ClassId<'g>>,
    ) -> Result<Local<'g>, Error> {
        let count = self.parameter_registers.len();
        if index >= count {
            return Err(Error::ParameterIndexOutOfRange { index, count });
        }
        let declared = self.method.descriptor.parameters[index];
        if declared != expecting {
            return Err(Error::ParameterTypeMismatch {
                index,
                expected: declared.render(),
                found: expecting.render(),
            });
        }
        Ok(self.local(self.parameter_registers[index]))
    }

    /// Local bound to the receiver of an instance method or constructor
    ///
    /// The expected type must be the owning class itself.
    pub fn receiver(&self, expecting: FieldType<ClassId<'g>>) -> Result<Local<'g>, Error> {
        let register = match self.this_register {
            Some(register) => register,
            None => return Err(Error::ReceiverOnStaticMethod),
        };
        let declared = self.registers[register as usize];
        if declared != expecting {
            return Err(Error::WrongReceiverType {
                expected: declared.render(),
                found: expecting.render(),
            });
        }
        Ok(self.local(register))
    }

    /// Fresh temporary of the given type, starting out at the type's default value
    pub fn new_local(&mut self, ty: FieldType<ClassId<'g>>) -> Local<'g> {
        let register = self.registers.len() as u16;
        self.registers.push(ty);
        self.local(register)
    }

    /// Fresh label, not yet bound to any position
    pub fn fresh_label(&mut self) -> Label {
        self.labels.fresh_label()
    }

    /// Bind `label` to the current end of the instruction stream
    ///
    /// A label may be bound at most once; binding it again is reported at materialization,
    /// where the whole body is in view.
    pub fn place_label(&mut self, label: Label) -> Result<(), Error> {
        self.check_label(label)?;
        self.instructions.push(Instruction::Mark { label });
        Ok(())
    }

    /// Branch unconditionally to `target`
    pub fn jump(&mut self, target: Label) -> Result<(), Error> {
        self.check_label(target)?;
        self.instructions.push(Instruction::Jump { target });
        Ok(())
    }

    /// Branch to `target` iff `a comparison b` holds
    ///
    /// The operands must share one arithmetic type (`int`, `long`, `float`, or `double`).
    pub fn branch(
        &mut self,
        comparison: Comparison,
        a: Local<'g>,
        b: Local<'g>,
        target: Label,
    ) -> Result<(), Error> {
        self.check_local(a)?;
        self.check_local(b)?;
        self.check_label(target)?;
        if a.ty != b.ty {
            return Err(Error::OperandTypeMismatch {
                operation: "branch",
                first: a.ty.render(),
                second: b.ty.render(),
            });
        }
        if !matches!(a.ty.as_primitive(), Some(prim) if prim.is_arithmetic()) {
            return Err(Error::InvalidOperandType {
                operation: "branch",
                found: a.ty.render(),
            });
        }
        self.instructions.push(Instruction::Branch {
            comparison,
            a,
            b,
            target,
        });
        Ok(())
    }

    /// `dst := value`
    ///
    /// The literal's kind must structurally match `dst`'s type ([`ConstantValue::matches`]).
    pub fn load_constant(&mut self, dst: Local<'g>, value: ConstantValue<'g>) -> Result<(), Error> {
        self.check_local(dst)?;
        if !value.matches(&dst.ty) {
            return Err(Error::ConstantTypeMismatch {
                expected: dst.ty.render(),
                found: value.kind_name(),
            });
        }
        self.instructions.push(Instruction::Const { dst, value });
        Ok(())
    }

    /// `dst := src`, between two locals of identical static type
    pub fn copy(&mut self, dst: Local<'g>, src: Local<'g>) -> Result<(), Error> {
        self.check_local(dst)?;
        self.check_local(src)?;
        if dst.ty != src.ty {
            return Err(Error::OperandTypeMismatch {
                operation: "copy",
                first: dst.ty.render(),
                second: src.ty.render(),
            });
        }
        self.instructions.push(Instruction::Move { dst, src });
        Ok(())
    }

    /// Return `src` from a method whose return type is exactly `src`'s type
    pub fn return_value(&mut self, src: Local<'g>) -> Result<(), Error> {
        self.check_local(src)?;
        match &self.method.descriptor.return_type {
            Some(ret) if *ret == src.ty => {}
            ret => {
                return Err(Error::ReturnTypeMismatch {
                    method: format!("{:?}", self.method.0),
                    expected: ret.map_or_else(|| "V".to_string(), |ret| ret.render()),
                    found: src.ty.render(),
                })
            }
        }
        self.instructions
            .push(Instruction::Return { src: Some(src) });
        Ok(())
    }

    /// Return from a void method
    pub fn return_void(&mut self) -> Result<(), Error> {
        if let Some(ret) = &self.method.descriptor.return_type {
            return Err(Error::ReturnTypeMismatch {
                method: format!("{:?}", self.method.0),
                expected: ret.render(),
                found: "V".to_string(),
            });
        }
        self.instructions.push(Instruction::Return { src: None });
        Ok(())
    }

    /// `dst := a op b`
    ///
    /// All three locals must share one type: arithmetic (`int`/`long`/`float`/`double`) for the
    /// arithmetic operators, `int`/`long` for the bitwise and shift operators.
    pub fn binary_op(
        &mut self,
        op: BinaryOp,
        dst: Local<'g>,
        a: Local<'g>,
        b: Local<'g>,
    ) -> Result<(), Error> {
        self.check_local(dst)?;
        self.check_local(a)?;
        self.check_local(b)?;
        if a.ty != b.ty {
            return Err(Error::OperandTypeMismatch {
                operation: "binary_op",
                first: a.ty.render(),
                second: b.ty.render(),
            });
        }
        if dst.ty != a.ty {
            return Err(Error::OperandTypeMismatch {
                operation: "binary_op",
                first: dst.ty.render(),
                second: a.ty.render(),
            });
        }
        let ok = match a.ty.as_primitive() {
            Some(prim) if op.is_bitwise() => prim.is_bitwise(),
            Some(prim) => prim.is_arithmetic(),
            None => false,
        };
        if !ok {
            return Err(Error::InvalidOperandType {
                operation: "binary_op",
                found: a.ty.render(),
            });
        }
        self.instructions.push(Instruction::Binary { op, dst, a, b });
        Ok(())
    }

    /// `dst := ~src` (`int`/`long` only)
    pub fn not(&mut self, dst: Local<'g>, src: Local<'g>) -> Result<(), Error> {
        self.unary_op(UnaryOp::Not, dst, src)
    }

    /// `dst := -src` (any arithmetic type; integer negation wraps at MIN)
    pub fn negate(&mut self, dst: Local<'g>, src: Local<'g>) -> Result<(), Error> {
        self.unary_op(UnaryOp::Negate, dst, src)
    }

    fn unary_op(&mut self, op: UnaryOp, dst: Local<'g>, src: Local<'g>) -> Result<(), Error> {
        self.check_local(dst)?;
        self.check_local(src)?;
        if dst.ty != src.ty {
            return Err(Error::OperandTypeMismatch {
                operation: "unary_op",
                first: dst.ty.render(),
                second: src.ty.render(),
            });
        }
        let ok = match src.ty.as_primitive() {
            Some(prim) => match op {
                UnaryOp::Not => prim.is_bitwise(),
                UnaryOp::Negate => prim.is_arithmetic(),
            },
            None => false,
        };
        if !ok {
            return Err(Error::InvalidOperandType {
                operation: match op {
                    UnaryOp::Not => "not",
                    UnaryOp::Negate => "negate",
                },
                found: src.ty.render(),
            });
        }
        self.instructions.push(Instruction::Unary { op, dst, src });
        Ok(())
    }

    /// `dst := (dst's type) src`, converting between two distinct numeric types
    ///
    /// Every numeric type except `boolean` converts to every other. Narrowing keeps low bits,
    /// widening sign-extends (`char` zero-extends), float to integer truncates toward zero with
    /// NaN mapping to zero and out-of-range values saturating.
    pub fn numeric_cast(&mut self, dst: Local<'g>, src: Local<'g>) -> Result<(), Error> {
        self.check_local(dst)?;
        self.check_local(src)?;
        for local in [dst, src] {
            if !matches!(local.ty.as_primitive(), Some(prim) if prim.is_numeric()) {
                return Err(Error::InvalidOperandType {
                    operation: "numeric_cast",
                    found: local.ty.render(),
                });
            }
        }
        if dst.ty == src.ty {
            return Err(Error::IdenticalCastTypes(dst.ty.render()));
        }
        self.instructions.push(Instruction::NumericCast { dst, src });
        Ok(())
    }

    /// `dst := src` reinterpreted as `dst`'s reference type
    ///
    /// Both locals must be object-typed. Null always passes; a non-null value of an
    /// incompatible class fails when the generated code runs, not here.
    pub fn check_cast(&mut self, dst: Local<'g>, src: Local<'g>) -> Result<(), Error> {
        self.check_local(dst)?;
        self.check_local(src)?;
        for (local, context) in [(dst, "check_cast destination"), (src, "check_cast source")] {
            if local.ty.as_primitive().is_some() {
                return Err(Error::NotAnObjectType {
                    context,
                    found: local.ty.render(),
                });
            }
        }
        self.instructions.push(Instruction::CheckCast { dst, src });
        Ok(())
    }

    /// `dst := object is a non-null instance of class`
    pub fn instance_of(
        &mut self,
        dst: Local<'g>,
        object: Local<'g>,
        class: ClassId<'g>,
    ) -> Result<(), Error> {
        self.check_local(dst)?;
        self.check_local(object)?;
        if dst.ty != FieldType::boolean() {
            return Err(Error::LocalTypeMismatch {
                context: "instance_of destination",
                expected: FieldType::<ClassId>::boolean().render(),
                found: dst.ty.render(),
            });
        }
        if object.ty.as_primitive().is_some() {
            return Err(Error::NotAnObjectType {
                context: "instance_of operand",
                found: object.ty.render(),
            });
        }
        self.instructions
            .push(Instruction::InstanceOf { dst, object, class });
        Ok(())
    }

    fn check_field_value(&self, field: FieldId<'g>, value: Local<'g>) -> Result<(), Error> {
        self.check_local(value)?;
        if value.ty != field.descriptor {
            return Err(Error::FieldTypeMismatch {
                field: format!("{:?}", field.0),
                expected: field.descriptor.render(),
                found: value.ty.render(),
            });
        }
        Ok(())
    }

    fn check_field_object(&self, field: FieldId<'g>, object: Local<'g>) -> Result<(), Error> {
        self.check_local(object)?;
        match object.ty {
            FieldType::Object(class) if is_assignable(class, field.class) => Ok(()),
            _ => Err(Error::FieldOwnerMismatch {
                field: format!("{:?}", field.0),
                found: object.ty.render(),
            }),
        }
    }

    /// `dst := field` (static field)
    pub fn static_get(&mut self, field: FieldId<'g>, dst: Local<'g>) -> Result<(), Error> {
        self.check_field_value(field, dst)?;
        self.instructions.push(Instruction::StaticGet { field, dst });
        Ok(())
    }

    /// `field := src` (static field)
    pub fn static_put(&mut self, field: FieldId<'g>, src: Local<'g>) -> Result<(), Error> {
        self.check_field_value(field, src)?;
        self.instructions.push(Instruction::StaticPut { field, src });
        Ok(())
    }

    /// `dst := object.field`
    pub fn instance_get(
        &mut self,
        field: FieldId<'g>,
        object: Local<'g>,
        dst: Local<'g>,
    ) -> Result<(), Error> {
        self.check_field_object(field, object)?;
        self.check_field_value(field, dst)?;
        self.instructions
            .push(Instruction::InstanceGet { field, object, dst });
        Ok(())
    }

    /// `object.field := src`
    pub fn instance_put(
        &mut self,
        field: FieldId<'g>,
        object: Local<'g>,
        src: Local<'g>,
    ) -> Result<(), Error> {
        self.check_field_object(field, object)?;
        self.check_field_value(field, src)?;
        self.instructions
            .push(Instruction::InstancePut { field, object, src });
        Ok(())
    }

    /// Call a static method
    pub fn invoke_static(
        &mut self,
        method: MethodId<'g>,
        dst: Option<Local<'g>>,
        args: &[Local<'g>],
    ) -> Result<(), Error> {
        self.invoke(DispatchKind::Static, method, dst, args)
    }

    /// Call an instance method, dispatched by the receiver's runtime class
    pub fn invoke_virtual(
        &mut self,
        method: MethodId<'g>,
        dst: Option<Local<'g>>,
        args: &[Local<'g>],
    ) -> Result<(), Error> {
        self.invoke(DispatchKind::Virtual, method, dst, args)
    }

    /// Call an instance method without dispatch (constructors, private methods)
    pub fn invoke_direct(
        &mut self,
        method: MethodId<'g>,
        dst: Option<Local<'g>>,
        args: &[Local<'g>],
    ) -> Result<(), Error> {
        self.invoke(DispatchKind::Direct, method, dst, args)
    }

    /// Call the supertype's implementation of an instance method
    pub fn invoke_super(
        &mut self,
        method: MethodId<'g>,
        dst: Option<Local<'g>>,
        args: &[Local<'g>],
    ) -> Result<(), Error> {
        self.invoke(DispatchKind::Super, method, dst, args)
    }

    /// Call an interface method, dispatched by the receiver's runtime class
    pub fn invoke_interface(
        &mut self,
        method: MethodId<'g>,
        dst: Option<Local<'g>>,
        args: &[Local<'g>],
    ) -> Result<(), Error> {
        self.invoke(DispatchKind::Interface, method, dst, args)
    }

    /// Shared checks behind the five `invoke_*` entry points
    ///
    /// For every kind but `Static`, `args[0]` is the receiver and must be assignable to the
    /// callee's owner; the remaining arguments must exactly match the descriptor. `dst` absent
    /// means the result (if any) is discarded.
    fn invoke(
        &mut self,
        kind: DispatchKind,
        method: MethodId<'g>,
        dst: Option<Local<'g>>,
        args: &[Local<'g>],
    ) -> Result<(), Error> {
        for arg in args {
            self.check_local(*arg)?;
        }
        if let Some(dst) = dst {
            self.check_local(dst)?;
        }

        let takes_receiver = kind != DispatchKind::Static;
        let expected_count = method.descriptor.parameters.len() + usize::from(takes_receiver);
        if args.len() != expected_count {
            return Err(Error::ArgumentCountMismatch {
                method: format!("{:?}", method.0),
                expected: expected_count,
                found: args.len(),
            });
        }

        let positional = if takes_receiver {
            match args[0].ty {
                FieldType::Object(class) if is_assignable(class, method.class) => {}
                _ => {
                    return Err(Error::WrongReceiverType {
                        expected: FieldType::object(method.class).render(),
                        found: args[0].ty.render(),
                    })
                }
            }
            &args[1..]
        } else {
            args
        };
        for (offset, (arg, parameter)) in positional
            .iter()
            .zip(method.descriptor.parameters.iter())
            .enumerate()
        {
            if arg.ty != *parameter {
                return Err(Error::ArgumentTypeMismatch {
                    method: format!("{:?}", method.0),
                    index: offset + usize::from(takes_receiver),
                    expected: parameter.render(),
                    found: arg.ty.render(),
                });
            }
        }

        if let Some(dst) = dst {
            match &method.descriptor.return_type {
                Some(ret) if *ret == dst.ty => {}
                ret => {
                    return Err(Error::ResultTypeMismatch {
                        method: format!("{:?}", method.0),
                        expected: ret.map_or_else(|| "V".to_string(), |ret| ret.render()),
                        found: dst.ty.render(),
                    })
                }
            }
        }

        self.instructions.push(Instruction::Invoke {
            kind,
            method,
            dst,
            args: args.to_vec(),
        });
        Ok(())
    }

    /// Seal the body and attach it to the method
    ///
    /// The last instruction (ignoring trailing `Mark`s) must be a return or an unconditional
    /// jump, and the register table must fit in the image's `u16` register space.
    pub fn finish(self) -> Result<(), Error> {
        let terminated = self
            .instructions
            .iter()
            .rev()
            .find(|insn| !matches!(insn, Instruction::Mark { .. }))
            .map_or(false, Instruction::is_terminator);
        if !terminated {
            return Err(Error::BodyNotTerminated {
                method: format!("{:?}", self.method.0),
            });
        }
        // Register u16::MAX is the "no register" sentinel, so it must never be allocated
        if self.registers.len() > usize::from(u16::MAX) {
            return Err(Error::RegisterLimitExceeded {
                method: format!("{:?}", self.method.0),
            });
        }
        let code = Code {
            registers: self.registers,
            this_register: self.this_register,
            parameter_registers: self.parameter_registers,
            instructions: self.instructions,
            label_count: self.labels.count(),
        };
        self.method.0.attach_body(code)
    }
}
