//! Register interpreter over loaded method bodies

use crate::code::{BinaryOp, Comparison, DispatchKind, UnaryOp};
use crate::descriptors::{FieldType, ParseDescriptor, PrimitiveType};
use crate::image::{Const, Insn, MemberRef, NO_REGISTER};
use crate::names::{BinaryName, Name};
use crate::runtime::{LoadedMethod, Namespace, RuntimeError, Value};
use std::rc::Rc;

/// Execute one method activation
///
/// `receiver` must be present iff the body has a receiver register. Argument values are bound
/// to the parameter registers; every other register starts at its type's default value.
pub(crate) fn run(
    ns: &Namespace,
    method: &LoadedMethod,
    receiver: Option<Value>,
    args: Vec<Value>,
) -> Result<Option<Value>, RuntimeError> {
    log::trace!("entering {}.{}{}", method.class, method.name, method.descriptor_string);
    let body = match &method.body {
        Some(body) => body,

        // Intrinsic method (the root constructor): nothing to do
        None => return Ok(None),
    };

    let mut registers: Vec<Value> = body.registers.iter().map(Value::default_for).collect();
    match (body.this_register, receiver) {
        (Some(this_register), Some(receiver)) => {
            set(&mut registers, this_register, receiver)?;
        }
        (None, None) => {}
        _ => return Err(RuntimeError::Malformed("receiver mismatch".to_string())),
    }
    if args.len() != body.parameter_registers.len() {
        return Err(RuntimeError::Malformed("argument count mismatch".to_string()));
    }
    for (register, arg) in body.parameter_registers.iter().zip(args) {
        set(&mut registers, *register, arg)?;
    }

    let mut pc: usize = 0;
    loop {
        let insn = body.instructions.get(pc).ok_or_else(|| {
            RuntimeError::Malformed("control fell off the end of the body".to_string())
        })?;
        pc += 1;

        match insn {
            Insn::Const { dst, value } => {
                set(&mut registers, *dst, constant_value(value))?;
            }

            Insn::Move { dst, src } => {
                let value = get(&registers, *src)?;
                set(&mut registers, *dst, value)?;
            }

            Insn::Return { src } => {
                return if *src == NO_REGISTER {
                    Ok(None)
                } else {
                    Ok(Some(get(&registers, *src)?))
                };
            }

            Insn::Unary { op, dst, src } => {
                let value = unary(*op, &get(&registers, *src)?)?;
                set(&mut registers, *dst, value)?;
            }

            Insn::Binary { op, dst, a, b } => {
                let value = binary(*op, &get(&registers, *a)?, &get(&registers, *b)?)?;
                set(&mut registers, *dst, value)?;
            }

            Insn::NumericCast { dst, src } => {
                let target = match body.registers.get(*dst as usize) {
                    Some(FieldType::Primitive(prim)) => *prim,
                    _ => return Err(RuntimeError::Malformed("bad cast target".to_string())),
                };
                let value = cast(&get(&registers, *src)?, target)?;
                set(&mut registers, *dst, value)?;
            }

            Insn::Branch {
                comparison,
                a,
                b,
                target,
            } => {
                if compare(*comparison, &get(&registers, *a)?, &get(&registers, *b)?)? {
                    pc = *target as usize;
                }
            }

            Insn::Jump { target } => {
                pc = *target as usize;
            }

            Insn::Invoke {
                kind,
                method: callee,
                dst,
                args,
            } => {
                let mut arg_values = vec![];
                for arg in args {
                    arg_values.push(get(&registers, *arg)?);
                }
                let result = invoke(ns, method, *kind, callee, arg_values)?;
                if *dst != NO_REGISTER {
                    let value = result.ok_or_else(|| {
                        RuntimeError::Malformed("void callee with a result register".to_string())
                    })?;
                    set(&mut registers, *dst, value)?;
                }
            }

            Insn::StaticGet { field, dst } => {
                let value = ns.static_value(&field.class, &field.name)?;
                set(&mut registers, *dst, value)?;
            }

            Insn::StaticPut { field, src } => {
                let value = get(&registers, *src)?;
                ns.set_static_value(&field.class, &field.name, value)?;
            }

            Insn::InstanceGet { field, object, dst } => {
                let instance = instance_of_value(&get(&registers, *object)?)?;
                let key = (field.name.clone(), field.descriptor.clone());
                let value = match instance.fields.borrow().get(&key) {
                    Some(value) => value.clone(),
                    None => Value::default_for(&parse_field_type(&field.descriptor)?),
                };
                set(&mut registers, *dst, value)?;
            }

            Insn::InstancePut { field, object, src } => {
                let instance = instance_of_value(&get(&registers, *object)?)?;
                let value = get(&registers, *src)?;
                instance
                    .fields
                    .borrow_mut()
                    .insert((field.name.clone(), field.descriptor.clone()), value);
            }

            Insn::CheckCast { dst, src } => {
                let target = match body.registers.get(*dst as usize) {
                    Some(FieldType::Object(class)) => class.clone(),
                    _ => return Err(RuntimeError::Malformed("bad cast target".to_string())),
                };
                let value = get(&registers, *src)?;
                match value.class_name() {
                    None if matches!(value, Value::Null) => {}
                    Some(class) if ns.is_instance(class, target.as_str()) => {}
                    Some(class) => {
                        return Err(RuntimeError::ClassCastFailure {
                            from: class.to_string(),
                            to: target.as_str().to_string(),
                        })
                    }
                    None => {
                        return Err(RuntimeError::Malformed(
                            "checked cast of a primitive".to_string(),
                        ))
                    }
                }
                set(&mut registers, *dst, value)?;
            }

            Insn::InstanceOf { dst, object, class } => {
                let value = get(&registers, *object)?;
                let result = match value.class_name() {
                    Some(runtime_class) => ns.is_instance(runtime_class, class),
                    None if matches!(value, Value::Null) => false,
                    None => {
                        return Err(RuntimeError::Malformed(
                            "instance test of a primitive".to_string(),
                        ))
                    }
                };
                set(&mut registers, *dst, Value::Boolean(result))?;
            }
        }
    }
}

fn get(registers: &[Value], register: u16) -> Result<Value, RuntimeError> {
    registers
        .get(register as usize)
        .cloned()
        .ok_or_else(|| RuntimeError::Malformed(format!("register v{} out of range", register)))
}

fn set(registers: &mut [Value], register: u16, value: Value) -> Result<(), RuntimeError> {
    match registers.get_mut(register as usize) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(RuntimeError::Malformed(format!(
            "register v{} out of range",
            register
        ))),
    }
}

fn parse_field_type(descriptor: &str) -> Result<FieldType<BinaryName>, RuntimeError> {
    FieldType::parse(descriptor)
        .map_err(|_| RuntimeError::Malformed(format!("bad field descriptor '{}'", descriptor)))
}

pub(crate) fn constant_value(constant: &Const) -> Value {
    match constant {
        Const::Boolean(b) => Value::Boolean(*b),
        Const::Byte(b) => Value::Byte(*b),
        Const::Char(c) => Value::Char(*c),
        Const::Short(s) => Value::Short(*s),
        Const::Int(i) => Value::Int(*i),
        Const::Long(l) => Value::Long(*l),
        Const::Float(f) => Value::Float(*f),
        Const::Double(d) => Value::Double(*d),
        Const::String(s) => Value::Str(Rc::from(s.as_str())),
        Const::Class(c) => Value::ClassRef(Rc::from(c.as_str())),
        Const::Null => Value::Null,
    }
}

fn instance_of_value(value: &Value) -> Result<Rc<crate::runtime::Instance>, RuntimeError> {
    match value {
        Value::Object(instance) => Ok(Rc::clone(instance)),
        Value::Null => Err(RuntimeError::NullReceiver),
        _ => Err(RuntimeError::Malformed(
            "field access on a non-object value".to_string(),
        )),
    }
}

fn invoke(
    ns: &Namespace,
    caller: &LoadedMethod,
    kind: DispatchKind,
    callee: &MemberRef,
    mut args: Vec<Value>,
) -> Result<Option<Value>, RuntimeError> {
    if kind == DispatchKind::Static {
        let method = ns.resolve_exact(&callee.class, &callee.name, &callee.descriptor)?;
        return run(ns, &method, None, args);
    }

    if args.is_empty() {
        return Err(RuntimeError::Malformed("missing receiver".to_string()));
    }
    let receiver = args.remove(0);
    let receiver_class = match receiver.class_name() {
        Some(class) => class.to_string(),
        None if matches!(receiver, Value::Null) => return Err(RuntimeError::NullReceiver),
        None => {
            return Err(RuntimeError::Malformed(
                "primitive receiver".to_string(),
            ))
        }
    };

    let method = match kind {
        DispatchKind::Virtual | DispatchKind::Interface => {
            ns.resolve_virtual(&receiver_class, &callee.name, &callee.descriptor)?
        }
        DispatchKind::Direct => {
            ns.resolve_exact(&callee.class, &callee.name, &callee.descriptor)?
        }
        DispatchKind::Super => {
            let superclass = ns
                .class(&caller.class)?
                .superclass
                .clone()
                .ok_or_else(|| RuntimeError::UnresolvedMethod {
                    class: caller.class.clone(),
                    name: callee.name.clone(),
                    descriptor: callee.descriptor.clone(),
                })?;
            ns.resolve_virtual(&superclass, &callee.name, &callee.descriptor)?
        }
        DispatchKind::Static => unreachable!("handled above"),
    };
    run(ns, &method, Some(receiver), args)
}

fn unary(op: UnaryOp, value: &Value) -> Result<Value, RuntimeError> {
    let result = match (op, value) {
        (UnaryOp::Not, Value::Int(a)) => Value::Int(!a),
        (UnaryOp::Not, Value::Long(a)) => Value::Long(!a),
        (UnaryOp::Negate, Value::Int(a)) => Value::Int(a.wrapping_neg()),
        (UnaryOp::Negate, Value::Long(a)) => Value::Long(a.wrapping_neg()),
        (UnaryOp::Negate, Value::Float(a)) => Value::Float(-a),
        (UnaryOp::Negate, Value::Double(a)) => Value::Double(-a),
        _ => {
            return Err(RuntimeError::Malformed(format!(
                "unary operator on a {}",
                value.kind_name()
            )))
        }
    };
    Ok(result)
}

fn binary(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => int_binary(op, *a, *b),
        (Value::Long(a), Value::Long(b)) => long_binary(op, *a, *b),
        (Value::Float(a), Value::Float(b)) => float_binary(op, *a, *b).map(Value::Float),
        (Value::Double(a), Value::Double(b)) => double_binary(op, *a, *b).map(Value::Double),
        _ => Err(RuntimeError::Malformed(format!(
            "binary operator on {} and {}",
            a.kind_name(),
            b.kind_name()
        ))),
    }
}

/// Two's-complement wrapping everywhere; shift distances are taken mod 32
fn int_binary(op: BinaryOp, a: i32, b: i32) -> Result<Value, RuntimeError> {
    let result = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Subtract => a.wrapping_sub(b),
        BinaryOp::Multiply => a.wrapping_mul(b),
        BinaryOp::Divide => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        BinaryOp::Remainder => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::ShiftLeft => a.wrapping_shl(b as u32),
        BinaryOp::ShiftRight => a.wrapping_shr(b as u32),
        BinaryOp::UnsignedShiftRight => ((a as u32).wrapping_shr(b as u32)) as i32,
    };
    Ok(Value::Int(result))
}

/// Like [`int_binary`], with shift distances taken mod 64
fn long_binary(op: BinaryOp, a: i64, b: i64) -> Result<Value, RuntimeError> {
    let result = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Subtract => a.wrapping_sub(b),
        BinaryOp::Multiply => a.wrapping_mul(b),
        BinaryOp::Divide => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        BinaryOp::Remainder => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::ShiftLeft => a.wrapping_shl(b as u32),
        BinaryOp::ShiftRight => a.wrapping_shr(b as u32),
        BinaryOp::UnsignedShiftRight => ((a as u64).wrapping_shr(b as u32)) as i64,
    };
    Ok(Value::Long(result))
}

/// IEEE-754 arithmetic: division by zero gives an infinity, `0/0` gives NaN
fn float_binary(op: BinaryOp, a: f32, b: f32) -> Result<f32, RuntimeError> {
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Subtract => Ok(a - b),
        BinaryOp::Multiply => Ok(a * b),
        BinaryOp::Divide => Ok(a / b),
        BinaryOp::Remainder => Ok(a % b),
        _ => Err(RuntimeError::Malformed(
            "bitwise operator on a float".to_string(),
        )),
    }
}

fn double_binary(op: BinaryOp, a: f64, b: f64) -> Result<f64, RuntimeError> {
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Subtract => Ok(a - b),
        BinaryOp::Multiply => Ok(a * b),
        BinaryOp::Divide => Ok(a / b),
        BinaryOp::Remainder => Ok(a % b),
        _ => Err(RuntimeError::Malformed(
            "bitwise operator on a double".to_string(),
        )),
    }
}

/// NaN makes every ordered comparison false and `Ne` true
fn compare(comparison: Comparison, a: &Value, b: &Value) -> Result<bool, RuntimeError> {
    fn decide<T: PartialOrd>(comparison: Comparison, a: T, b: T) -> bool {
        match comparison {
            Comparison::Lt => a < b,
            Comparison::Le => a <= b,
            Comparison::Eq => a == b,
            Comparison::Ge => a >= b,
            Comparison::Gt => a > b,
            Comparison::Ne => a != b,
        }
    }
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Ok(decide(comparison, a, b)),
        (Value::Long(a), Value::Long(b)) => Ok(decide(comparison, a, b)),
        (Value::Float(a), Value::Float(b)) => Ok(decide(comparison, a, b)),
        (Value::Double(a), Value::Double(b)) => Ok(decide(comparison, a, b)),
        _ => Err(RuntimeError::Malformed(format!(
            "comparison of {} and {}",
            a.kind_name(),
            b.kind_name()
        ))),
    }
}

/// Numeric conversion
///
/// Integer sources widen through `i64` (sign-extending, except `char` which is unsigned and
/// zero-extends) and narrow by keeping low bits. Float to integer truncates toward zero, maps
/// NaN to zero, and saturates at the target bounds before any further narrowing.
fn cast(value: &Value, target: PrimitiveType) -> Result<Value, RuntimeError> {
    let malformed =
        || RuntimeError::Malformed(format!("numeric cast of a {}", value.kind_name()));

    // Integer sources, widened losslessly
    let as_long: Option<i64> = match value {
        Value::Byte(b) => Some(i64::from(*b)),
        Value::Char(c) => Some(i64::from(*c)),
        Value::Short(s) => Some(i64::from(*s)),
        Value::Int(i) => Some(i64::from(*i)),
        Value::Long(l) => Some(*l),
        _ => None,
    };
    if let Some(v) = as_long {
        let result = match target {
            PrimitiveType::Byte => Value::Byte(v as i8),
            PrimitiveType::Char => Value::Char(v as u16),
            PrimitiveType::Short => Value::Short(v as i16),
            PrimitiveType::Int => Value::Int(v as i32),
            PrimitiveType::Long => Value::Long(v),
            PrimitiveType::Float => Value::Float(v as f32),
            PrimitiveType::Double => Value::Double(v as f64),
            PrimitiveType::Boolean => return Err(malformed()),
        };
        return Ok(result);
    }

    // Float sources: conversions to small integer types go through `int` first
    let result = match value {
        Value::Float(f) => match target {
            PrimitiveType::Byte => Value::Byte((*f as i32) as i8),
            PrimitiveType::Char => Value::Char((*f as i32) as u16),
            PrimitiveType::Short => Value::Short((*f as i32) as i16),
            PrimitiveType::Int => Value::Int(*f as i32),
            PrimitiveType::Long => Value::Long(*f as i64),
            PrimitiveType::Double => Value::Double(f64::from(*f)),
            PrimitiveType::Float | PrimitiveType::Boolean => return Err(malformed()),
        },
        Value::Double(d) => match target {
            PrimitiveType::Byte => Value::Byte((*d as i32) as i8),
            PrimitiveType::Char => Value::Char((*d as i32) as u16),
            PrimitiveType::Short => Value::Short((*d as i32) as i16),
            PrimitiveType::Int => Value::Int(*d as i32),
            PrimitiveType::Long => Value::Long(*d as i64),
            PrimitiveType::Float => Value::Float(*d as f32),
            PrimitiveType::Double | PrimitiveType::Boolean => return Err(malformed()),
        },
        _ => return Err(malformed()),
    };
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn integer_narrowing_keeps_low_bits() {
        assert_eq!(
            cast(&Value::Int(0x1_23), PrimitiveType::Byte).unwrap(),
            Value::Byte(0x23)
        );
        assert_eq!(
            cast(&Value::Int(-1), PrimitiveType::Char).unwrap(),
            Value::Char(0xFFFF)
        );
        assert_eq!(
            cast(&Value::Long(0x1_0000_0001), PrimitiveType::Int).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            cast(&Value::Int(0x1_FFFF), PrimitiveType::Short).unwrap(),
            Value::Short(-1)
        );
    }

    #[test]
    fn integer_widening_extends_sign() {
        assert_eq!(
            cast(&Value::Byte(-1), PrimitiveType::Int).unwrap(),
            Value::Int(-1)
        );
        assert_eq!(
            cast(&Value::Short(-2), PrimitiveType::Long).unwrap(),
            Value::Long(-2)
        );

        // char is unsigned and zero-extends
        assert_eq!(
            cast(&Value::Char(0xFFFF), PrimitiveType::Int).unwrap(),
            Value::Int(0xFFFF)
        );
    }

    #[test]
    fn float_to_integer_truncates_and_saturates() {
        assert_eq!(
            cast(&Value::Float(2.9), PrimitiveType::Int).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            cast(&Value::Float(-2.9), PrimitiveType::Int).unwrap(),
            Value::Int(-2)
        );
        assert_eq!(
            cast(&Value::Float(f32::NAN), PrimitiveType::Int).unwrap(),
            Value::Int(0)
        );
        assert_eq!(
            cast(&Value::Float(f32::INFINITY), PrimitiveType::Int).unwrap(),
            Value::Int(i32::MAX)
        );
        assert_eq!(
            cast(&Value::Float(f32::NEG_INFINITY), PrimitiveType::Long).unwrap(),
            Value::Long(i64::MIN)
        );
        assert_eq!(
            cast(&Value::Double(1e100), PrimitiveType::Int).unwrap(),
            Value::Int(i32::MAX)
        );
    }

    #[test]
    fn double_to_float_can_overflow_to_infinity() {
        assert_eq!(
            cast(&Value::Double(1e100), PrimitiveType::Float).unwrap(),
            Value::Float(f32::INFINITY)
        );
    }

    #[test]
    fn integer_to_float_rounds() {
        assert_eq!(
            cast(&Value::Int(16_777_217), PrimitiveType::Float).unwrap(),
            Value::Float(16_777_216.0)
        );
        assert_eq!(
            cast(&Value::Long(i64::MAX), PrimitiveType::Double).unwrap(),
            Value::Double(9.223372036854776e18)
        );
    }

    #[test]
    fn shift_distance_is_masked() {
        assert_eq!(int_binary(BinaryOp::ShiftLeft, 1, 33).unwrap(), Value::Int(2));
        assert_eq!(
            long_binary(BinaryOp::ShiftLeft, 1, 65).unwrap(),
            Value::Long(2)
        );
        assert_eq!(
            int_binary(BinaryOp::UnsignedShiftRight, -1, 28).unwrap(),
            Value::Int(15)
        );
    }

    #[test]
    fn integer_division_edge_cases() {
        assert_eq!(
            int_binary(BinaryOp::Divide, i32::MIN, -1).unwrap(),
            Value::Int(i32::MIN)
        );
        assert_eq!(
            int_binary(BinaryOp::Remainder, i32::MIN, -1).unwrap(),
            Value::Int(0)
        );
        assert_eq!(
            int_binary(BinaryOp::Divide, 1, 0).unwrap_err(),
            RuntimeError::DivisionByZero
        );
        assert_eq!(
            long_binary(BinaryOp::Remainder, 1, 0).unwrap_err(),
            RuntimeError::DivisionByZero
        );
    }

    #[test]
    fn negation_wraps_at_the_minimum() {
        assert_eq!(
            unary(UnaryOp::Negate, &Value::Int(i32::MIN)).unwrap(),
            Value::Int(i32::MIN)
        );
        let negated_zero = unary(UnaryOp::Negate, &Value::Double(0.0)).unwrap();
        match negated_zero {
            Value::Double(d) => assert!(d == 0.0 && d.is_sign_negative()),
            other => panic!("expected a double, got {:?}", other),
        }
    }

    #[test]
    fn nan_comparisons() {
        let nan = Value::Float(f32::NAN);
        assert!(!compare(Comparison::Lt, &nan, &nan).unwrap());
        assert!(!compare(Comparison::Eq, &nan, &nan).unwrap());
        assert!(!compare(Comparison::Ge, &nan, &nan).unwrap());
        assert!(compare(Comparison::Ne, &nan, &nan).unwrap());
    }
}
