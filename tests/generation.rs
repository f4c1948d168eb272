use classgen::code::{BinaryOp, Comparison, ConstantValue};
use classgen::generator::{Generator, GeneratorArenas};
use classgen::runtime::{Loader, Namespace, RuntimeError, Value};
use classgen::{
    BinaryName, ClassAccessFlags, Error, FieldAccessFlags, FieldType, MethodAccessFlags,
    MethodDescriptor, Name, UnqualifiedName,
};

fn class_name(name: &'static str) -> BinaryName {
    BinaryName::from_str_unsafe(name)
}

fn member_name(name: &'static str) -> UnqualifiedName {
    UnqualifiedName::from_str_unsafe(name)
}

fn load(generator: &Generator) -> Namespace {
    let _ = env_logger::builder().is_test(true).try_init();
    let image = generator.materialize().unwrap();
    Loader::new().load(&image).unwrap()
}

#[test]
fn interning_is_reference_equality() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);

    let a = generator.class(class_name("t/Widget"));
    let b = generator.class(class_name("t/Widget"));
    let c = generator.class(class_name("t/Gadget"));
    assert!(a.same(b));
    assert!(!a.same(c));

    let descriptor = MethodDescriptor {
        parameters: vec![FieldType::int()],
        return_type: Some(FieldType::int()),
    };
    let m1 = generator.add_method(a, member_name("frob"), descriptor.clone());
    let m2 = generator.add_method(b, member_name("frob"), descriptor);
    assert!(m1.same(m2));

    let f1 = generator.add_field(a, member_name("size"), FieldType::long());
    let f2 = generator.add_field(a, member_name("size"), FieldType::long());
    assert!(f1.same(f2));
}

#[test]
fn class_declarations_happen_once() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Once"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let again = generator.declare_class(class, None, ClassAccessFlags::PUBLIC, core.object);
    assert!(matches!(again, Err(Error::DuplicateClassDeclaration(_))));
}

#[test]
fn members_need_a_declared_owner() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    generator.insert_core_classes();

    let class = generator.class(class_name("t/Forward"));
    let method = generator.add_method(
        class,
        member_name("go"),
        MethodDescriptor {
            parameters: vec![],
            return_type: None,
        },
    );
    let field = generator.add_field(class, member_name("x"), FieldType::int());

    let err = generator.declare_method(method, MethodAccessFlags::PUBLIC);
    assert!(matches!(err, Err(Error::UndeclaredClass(_))));
    let err = generator.declare_field(field, FieldAccessFlags::PUBLIC, None);
    assert!(matches!(err, Err(Error::UndeclaredClass(_))));
}

#[test]
fn parameter_lookup_is_checked() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Params"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let method = generator.add_method(
        class,
        member_name("two"),
        MethodDescriptor {
            parameters: vec![FieldType::int(), FieldType::double()],
            return_type: None,
        },
    );
    let code = generator
        .declare_method(method, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    assert!(code.method().same(method));

    let first = code.parameter(0, FieldType::int()).unwrap();
    assert_eq!(first.static_type(), FieldType::int());
    assert!(code.parameter(1, FieldType::double()).is_ok());
    assert!(matches!(
        code.parameter(2, FieldType::int()),
        Err(Error::ParameterIndexOutOfRange { index: 2, count: 2 })
    ));
    assert!(matches!(
        code.parameter(1, FieldType::float()),
        Err(Error::ParameterTypeMismatch { index: 1, .. })
    ));
    assert!(matches!(
        code.receiver(FieldType::object(class)),
        Err(Error::ReceiverOnStaticMethod)
    ));
}

#[test]
fn locals_and_labels_are_scoped_to_their_body() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Scopes"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let void = MethodDescriptor {
        parameters: vec![],
        return_type: None,
    };
    let first = generator.add_method(class, member_name("first"), void.clone());
    let second = generator.add_method(class, member_name("second"), void);

    let flags = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
    let mut first_code = generator.declare_method(first, flags).unwrap();
    let mut second_code = generator.declare_method(second, flags).unwrap();

    let stray_local = first_code.new_local(FieldType::int());
    let stray_label = first_code.fresh_label();

    assert!(matches!(
        second_code.load_constant(stray_local, ConstantValue::Int(1)),
        Err(Error::ForeignLocal { .. })
    ));
    assert!(matches!(
        second_code.jump(stray_label),
        Err(Error::ForeignLabel(_))
    ));
}

#[test]
fn min_of_two_ints() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Math"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let min = generator.add_method(
        class,
        member_name("min"),
        MethodDescriptor {
            parameters: vec![FieldType::int(), FieldType::int()],
            return_type: Some(FieldType::int()),
        },
    );
    let mut code = generator
        .declare_method(min, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    let a = code.parameter(0, FieldType::int()).unwrap();
    let b = code.parameter(1, FieldType::int()).unwrap();
    let a_wins = code.fresh_label();
    code.branch(Comparison::Le, a, b, a_wins).unwrap();
    code.return_value(b).unwrap();
    code.place_label(a_wins).unwrap();
    code.return_value(a).unwrap();
    code.finish().unwrap();

    let namespace = load(&generator);
    for (x, y, expected) in [(1, 2, 1), (2, 1, 1), (1, 1, 1)] {
        let got = namespace
            .invoke_static("t/Math", "min", "(II)I", &[Value::Int(x), Value::Int(y)])
            .unwrap();
        assert_eq!(got, Some(Value::Int(expected)));
    }
}

#[test]
fn iterative_fibonacci() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Math"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let fib = generator.add_method(
        class,
        member_name("fib"),
        MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: Some(FieldType::int()),
        },
    );
    let mut code = generator
        .declare_method(fib, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    let n = code.parameter(0, FieldType::int()).unwrap();
    let a = code.new_local(FieldType::int());
    let b = code.new_local(FieldType::int());
    let i = code.new_local(FieldType::int());
    let one = code.new_local(FieldType::int());
    let t = code.new_local(FieldType::int());
    code.load_constant(b, ConstantValue::Int(1)).unwrap();
    code.load_constant(one, ConstantValue::Int(1)).unwrap();

    let head = code.fresh_label();
    let done = code.fresh_label();
    code.place_label(head).unwrap();
    code.branch(Comparison::Ge, i, n, done).unwrap();
    code.binary_op(BinaryOp::Add, t, a, b).unwrap();
    code.copy(a, b).unwrap();
    code.copy(b, t).unwrap();
    code.binary_op(BinaryOp::Add, i, i, one).unwrap();
    code.jump(head).unwrap();
    code.place_label(done).unwrap();
    code.return_value(a).unwrap();
    code.finish().unwrap();

    let namespace = load(&generator);
    for (n, expected) in [(0, 0), (1, 1), (2, 1), (3, 2), (4, 3), (5, 5), (6, 8)] {
        let got = namespace
            .invoke_static("t/Math", "fib", "(I)I", &[Value::Int(n)])
            .unwrap();
        assert_eq!(got, Some(Value::Int(expected)), "fib({})", n);
    }
}

#[test]
fn recursive_fibonacci() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Math"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let fib = generator.add_method(
        class,
        member_name("fib"),
        MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: Some(FieldType::int()),
        },
    );

    // fib(n) = n for n < 2, else fib(n - 1) + fib(n - 2): two calls back into itself
    let mut code = generator
        .declare_method(fib, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    let n = code.parameter(0, FieldType::int()).unwrap();
    let one = code.new_local(FieldType::int());
    let two = code.new_local(FieldType::int());
    let arg = code.new_local(FieldType::int());
    let first = code.new_local(FieldType::int());
    let second = code.new_local(FieldType::int());
    code.load_constant(one, ConstantValue::Int(1)).unwrap();
    code.load_constant(two, ConstantValue::Int(2)).unwrap();

    let base_case = code.fresh_label();
    code.branch(Comparison::Lt, n, two, base_case).unwrap();
    code.binary_op(BinaryOp::Subtract, arg, n, one).unwrap();
    code.invoke_static(fib, Some(first), &[arg]).unwrap();
    code.binary_op(BinaryOp::Subtract, arg, n, two).unwrap();
    code.invoke_static(fib, Some(second), &[arg]).unwrap();
    code.binary_op(BinaryOp::Add, first, first, second).unwrap();
    code.return_value(first).unwrap();
    code.place_label(base_case).unwrap();
    code.return_value(n).unwrap();
    code.finish().unwrap();

    let namespace = load(&generator);
    for (n, expected) in [(0, 0), (1, 1), (2, 1), (3, 2), (4, 3), (5, 5), (6, 8)] {
        let got = namespace
            .invoke_static("t/Math", "fib", "(I)I", &[Value::Int(n)])
            .unwrap();
        assert_eq!(got, Some(Value::Int(expected)), "fib({})", n);
    }
}

#[test]
fn doubling_loop() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Math"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let double = generator.add_method(
        class,
        member_name("doubleTimes"),
        MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: Some(FieldType::int()),
        },
    );
    let mut code = generator
        .declare_method(double, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    let n = code.parameter(0, FieldType::int()).unwrap();
    let result = code.new_local(FieldType::int());
    let i = code.new_local(FieldType::int());
    let one = code.new_local(FieldType::int());
    code.load_constant(result, ConstantValue::Int(1)).unwrap();
    code.load_constant(one, ConstantValue::Int(1)).unwrap();

    let head = code.fresh_label();
    let done = code.fresh_label();
    code.place_label(head).unwrap();
    code.branch(Comparison::Ge, i, n, done).unwrap();
    code.binary_op(BinaryOp::Add, result, result, result).unwrap();
    code.binary_op(BinaryOp::Add, i, i, one).unwrap();
    code.jump(head).unwrap();
    code.place_label(done).unwrap();
    code.return_value(result).unwrap();
    code.finish().unwrap();

    let namespace = load(&generator);
    for (n, expected) in [(0, 1), (1, 2), (2, 4), (3, 8), (4, 16)] {
        let got = namespace
            .invoke_static("t/Math", "doubleTimes", "(I)I", &[Value::Int(n)])
            .unwrap();
        assert_eq!(got, Some(Value::Int(expected)), "doubleTimes({})", n);
    }
}

/// Build a one-cast static method `name` of shape `(src)dst`
fn cast_method<'g>(
    generator: &'g Generator<'g>,
    class: classgen::generator::ClassId<'g>,
    name: &'static str,
    src: FieldType<classgen::generator::ClassId<'g>>,
    dst: FieldType<classgen::generator::ClassId<'g>>,
) {
    let method = generator.add_method(
        class,
        member_name(name),
        MethodDescriptor {
            parameters: vec![src],
            return_type: Some(dst),
        },
    );
    let mut code = generator
        .declare_method(method, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    let input = code.parameter(0, src).unwrap();
    let output = code.new_local(dst);
    code.numeric_cast(output, input).unwrap();
    code.return_value(output).unwrap();
    code.finish().unwrap();
}

#[test]
fn numeric_casts_end_to_end() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Casts"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    cast_method(&generator, class, "f2i", FieldType::float(), FieldType::int());
    cast_method(&generator, class, "i2b", FieldType::int(), FieldType::byte());
    cast_method(&generator, class, "l2i", FieldType::long(), FieldType::int());
    cast_method(&generator, class, "c2i", FieldType::char(), FieldType::int());
    cast_method(&generator, class, "i2f", FieldType::int(), FieldType::float());
    cast_method(&generator, class, "d2f", FieldType::double(), FieldType::float());

    let namespace = load(&generator);
    let call = |name: &str, descriptor: &str, arg: Value| {
        namespace
            .invoke_static("t/Casts", name, descriptor, &[arg])
            .unwrap()
            .unwrap()
    };

    assert_eq!(call("f2i", "(F)I", Value::Float(2.9)), Value::Int(2));
    assert_eq!(call("f2i", "(F)I", Value::Float(f32::NAN)), Value::Int(0));
    assert_eq!(
        call("f2i", "(F)I", Value::Float(f32::INFINITY)),
        Value::Int(i32::MAX)
    );
    assert_eq!(call("i2b", "(I)B", Value::Int(0x123)), Value::Byte(0x23));
    assert_eq!(
        call("l2i", "(J)I", Value::Long(0x1_0000_0001)),
        Value::Int(1)
    );
    assert_eq!(call("c2i", "(C)I", Value::Char(0xFFFF)), Value::Int(0xFFFF));
    assert_eq!(
        call("i2f", "(I)F", Value::Int(16_777_217)),
        Value::Float(16_777_216.0)
    );
    assert_eq!(
        call("d2f", "(D)F", Value::Double(1e100)),
        Value::Float(f32::INFINITY)
    );
}

#[test]
fn division_by_zero_is_a_runtime_failure_only_for_integers() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Div"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();

    for (name, ty) in [("idiv", FieldType::int()), ("fdiv", FieldType::float())] {
        let method = generator.add_method(
            class,
            member_name(name),
            MethodDescriptor {
                parameters: vec![ty, ty],
                return_type: Some(ty),
            },
        );
        let mut code = generator
            .declare_method(method, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
            .unwrap();
        let a = code.parameter(0, ty).unwrap();
        let b = code.parameter(1, ty).unwrap();
        let out = code.new_local(ty);
        code.binary_op(BinaryOp::Divide, out, a, b).unwrap();
        code.return_value(out).unwrap();
        code.finish().unwrap();
    }

    let namespace = load(&generator);
    let err = namespace
        .invoke_static("t/Div", "idiv", "(II)I", &[Value::Int(1), Value::Int(0)])
        .unwrap_err();
    assert_eq!(err, RuntimeError::DivisionByZero);

    let got = namespace
        .invoke_static(
            "t/Div",
            "fdiv",
            "(FF)F",
            &[Value::Float(1.0), Value::Float(0.0)],
        )
        .unwrap();
    assert_eq!(got, Some(Value::Float(f32::INFINITY)));
}

#[test]
fn shift_distances_are_masked() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Shift"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let shl = generator.add_method(
        class,
        member_name("shl"),
        MethodDescriptor {
            parameters: vec![FieldType::int(), FieldType::int()],
            return_type: Some(FieldType::int()),
        },
    );
    let mut code = generator
        .declare_method(shl, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    let a = code.parameter(0, FieldType::int()).unwrap();
    let b = code.parameter(1, FieldType::int()).unwrap();
    let out = code.new_local(FieldType::int());
    code.binary_op(BinaryOp::ShiftLeft, out, a, b).unwrap();
    code.return_value(out).unwrap();
    code.finish().unwrap();

    let namespace = load(&generator);
    let got = namespace
        .invoke_static("t/Shift", "shl", "(II)I", &[Value::Int(1), Value::Int(33)])
        .unwrap();
    assert_eq!(got, Some(Value::Int(2)));
}

#[test]
fn copies_are_value_copies() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Copy"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let keep = generator.add_method(
        class,
        member_name("keep"),
        MethodDescriptor {
            parameters: vec![],
            return_type: Some(FieldType::int()),
        },
    );
    let mut code = generator
        .declare_method(keep, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    let a = code.new_local(FieldType::int());
    let b = code.new_local(FieldType::int());
    code.load_constant(a, ConstantValue::Int(5)).unwrap();
    code.copy(b, a).unwrap();
    code.load_constant(a, ConstantValue::Int(7)).unwrap();
    code.return_value(b).unwrap();
    code.finish().unwrap();

    let namespace = load(&generator);
    let got = namespace.invoke_static("t/Copy", "keep", "()I", &[]).unwrap();
    assert_eq!(got, Some(Value::Int(5)));
}

#[test]
fn static_constants_are_loaded_without_running_code() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Counters"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let counter = generator.add_field(class, member_name("counter"), FieldType::int());
    generator
        .declare_field(
            counter,
            FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC,
            Some(ConstantValue::Int(41)),
        )
        .unwrap();

    let bump = generator.add_method(
        class,
        member_name("bump"),
        MethodDescriptor {
            parameters: vec![],
            return_type: None,
        },
    );
    let mut code = generator
        .declare_method(bump, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    let value = code.new_local(FieldType::int());
    let one = code.new_local(FieldType::int());
    code.static_get(counter, value).unwrap();
    code.load_constant(one, ConstantValue::Int(1)).unwrap();
    code.binary_op(BinaryOp::Add, value, value, one).unwrap();
    code.static_put(counter, value).unwrap();
    code.return_void().unwrap();
    code.finish().unwrap();

    let namespace = load(&generator);
    assert_eq!(
        namespace.static_field("t/Counters", "counter").unwrap(),
        Value::Int(41)
    );
    namespace
        .invoke_static("t/Counters", "bump", "()V", &[])
        .unwrap();
    assert_eq!(
        namespace.static_field("t/Counters", "counter").unwrap(),
        Value::Int(42)
    );
}

#[test]
fn instance_constants_do_not_initialize_instances() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Slot"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let slot = generator.add_field(class, member_name("slot"), FieldType::int());
    generator
        .declare_field(slot, FieldAccessFlags::PUBLIC, Some(ConstantValue::Int(9)))
        .unwrap();

    let constructor = generator.add_constructor(class, vec![]);
    let mut code = generator
        .declare_method(constructor, MethodAccessFlags::PUBLIC)
        .unwrap();
    let this = code.receiver(FieldType::object(class)).unwrap();
    code.invoke_direct(core.object_init, None, &[this]).unwrap();
    code.return_void().unwrap();
    code.finish().unwrap();

    let get = generator.add_method(
        class,
        member_name("get"),
        MethodDescriptor {
            parameters: vec![],
            return_type: Some(FieldType::int()),
        },
    );
    let mut code = generator
        .declare_method(get, MethodAccessFlags::PUBLIC)
        .unwrap();
    let this = code.receiver(FieldType::object(class)).unwrap();
    let out = code.new_local(FieldType::int());
    code.instance_get(slot, this, out).unwrap();
    code.return_value(out).unwrap();
    code.finish().unwrap();

    let namespace = load(&generator);
    let instance = namespace.construct("t/Slot", "()V", &[]).unwrap();
    let got = namespace.call_method(&instance, "get", "()I", &[]).unwrap();
    assert_eq!(got, Some(Value::Int(0)));
}

#[test]
fn referenced_labels_must_be_bound() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Labels"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let dangling = generator.add_method(
        class,
        member_name("dangling"),
        MethodDescriptor {
            parameters: vec![],
            return_type: None,
        },
    );
    let mut code = generator
        .declare_method(dangling, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    let nowhere = code.fresh_label();
    code.jump(nowhere).unwrap();
    code.finish().unwrap();

    assert!(matches!(
        generator.materialize(),
        Err(Error::UnboundLabel { .. })
    ));
}

#[test]
fn labels_bind_at_most_once() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Labels"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let twice = generator.add_method(
        class,
        member_name("twice"),
        MethodDescriptor {
            parameters: vec![],
            return_type: None,
        },
    );
    let mut code = generator
        .declare_method(twice, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    let label = code.fresh_label();
    code.place_label(label).unwrap();
    code.return_void().unwrap();
    code.place_label(label).unwrap();
    code.finish().unwrap();

    assert!(matches!(
        generator.materialize(),
        Err(Error::LabelBoundTwice { .. })
    ));
}

#[test]
fn bodies_must_terminate_and_exist() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Bodies"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let void = MethodDescriptor {
        parameters: vec![],
        return_type: None,
    };

    let unterminated = generator.add_method(class, member_name("unterminated"), void.clone());
    let code = generator
        .declare_method(
            unterminated,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        )
        .unwrap();
    assert!(matches!(
        code.finish(),
        Err(Error::BodyNotTerminated { .. })
    ));

    // `unterminated` is now declared but never received a body
    assert!(matches!(
        generator.materialize(),
        Err(Error::MissingBody { .. })
    ));
}

#[test]
fn builder_type_checks_are_eager() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Checks"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let method = generator.add_method(
        class,
        member_name("checked"),
        MethodDescriptor {
            parameters: vec![],
            return_type: Some(FieldType::int()),
        },
    );
    let mut code = generator
        .declare_method(method, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();

    let int_local = code.new_local(FieldType::int());
    let long_local = code.new_local(FieldType::long());
    let bool_local = code.new_local(FieldType::boolean());
    let object_local = code.new_local(FieldType::object(core.object));

    assert!(matches!(
        code.load_constant(int_local, ConstantValue::Long(1)),
        Err(Error::ConstantTypeMismatch { .. })
    ));
    assert!(code
        .load_constant(object_local, ConstantValue::Null)
        .is_ok());
    assert!(matches!(
        code.binary_op(BinaryOp::Add, int_local, int_local, long_local),
        Err(Error::OperandTypeMismatch { .. })
    ));
    assert!(matches!(
        code.binary_op(BinaryOp::Add, bool_local, bool_local, bool_local),
        Err(Error::InvalidOperandType { .. })
    ));
    assert!(matches!(
        code.binary_op(BinaryOp::And, int_local, int_local, long_local),
        Err(Error::OperandTypeMismatch { .. })
    ));
    assert!(matches!(
        code.not(object_local, object_local),
        Err(Error::InvalidOperandType { .. })
    ));
    assert!(matches!(
        code.numeric_cast(int_local, int_local),
        Err(Error::IdenticalCastTypes(_))
    ));
    assert!(matches!(
        code.numeric_cast(bool_local, int_local),
        Err(Error::InvalidOperandType { .. })
    ));
    assert!(matches!(
        code.check_cast(object_local, int_local),
        Err(Error::NotAnObjectType { .. })
    ));
    assert!(matches!(
        code.return_value(long_local),
        Err(Error::ReturnTypeMismatch { .. })
    ));
    assert!(matches!(
        code.return_void(),
        Err(Error::ReturnTypeMismatch { .. })
    ));

    // Failed calls append nothing: the body can still be finished normally
    code.load_constant(int_local, ConstantValue::Int(3)).unwrap();
    code.return_value(int_local).unwrap();
    code.finish().unwrap();
}

#[test]
fn invokes_check_arity_and_types() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Calls"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let callee = generator.add_method(
        class,
        member_name("callee"),
        MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: Some(FieldType::long()),
        },
    );
    let caller = generator.add_method(
        class,
        member_name("caller"),
        MethodDescriptor {
            parameters: vec![],
            return_type: None,
        },
    );
    let mut code = generator
        .declare_method(caller, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    let int_local = code.new_local(FieldType::int());
    let long_local = code.new_local(FieldType::long());

    assert!(matches!(
        code.invoke_static(callee, None, &[]),
        Err(Error::ArgumentCountMismatch { .. })
    ));
    assert!(matches!(
        code.invoke_static(callee, None, &[long_local]),
        Err(Error::ArgumentTypeMismatch { .. })
    ));
    assert!(matches!(
        code.invoke_static(callee, Some(int_local), &[int_local]),
        Err(Error::ResultTypeMismatch { .. })
    ));
    assert!(code.invoke_static(callee, Some(long_local), &[int_local]).is_ok());
    assert!(code.invoke_static(callee, None, &[int_local]).is_ok());
}

#[test]
fn dispatch_virtual_super_and_casts() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let animal = generator.class(class_name("t/Animal"));
    let dog = generator.class(class_name("t/Dog"));
    generator
        .declare_class(animal, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    generator
        .declare_class(dog, None, ClassAccessFlags::PUBLIC, animal)
        .unwrap();

    let int_getter = MethodDescriptor {
        parameters: vec![],
        return_type: Some(FieldType::int()),
    };

    // Animal() and Animal.speak() -> 1
    let animal_init = generator.add_constructor(animal, vec![]);
    let mut code = generator
        .declare_method(animal_init, MethodAccessFlags::PUBLIC)
        .unwrap();
    let this = code.receiver(FieldType::object(animal)).unwrap();
    code.invoke_direct(core.object_init, None, &[this]).unwrap();
    code.return_void().unwrap();
    code.finish().unwrap();

    let animal_speak = generator.add_method(animal, member_name("speak"), int_getter.clone());
    let mut code = generator
        .declare_method(animal_speak, MethodAccessFlags::PUBLIC)
        .unwrap();
    let out = code.new_local(FieldType::int());
    code.load_constant(out, ConstantValue::Int(1)).unwrap();
    code.return_value(out).unwrap();
    code.finish().unwrap();

    // Dog() chains to Animal(); Dog.speak() -> 2; Dog.parentSpeak() -> super call
    let dog_init = generator.add_constructor(dog, vec![]);
    let mut code = generator
        .declare_method(dog_init, MethodAccessFlags::PUBLIC)
        .unwrap();
    let this = code.receiver(FieldType::object(dog)).unwrap();
    code.invoke_direct(animal_init, None, &[this]).unwrap();
    code.return_void().unwrap();
    code.finish().unwrap();

    let dog_speak = generator.add_method(dog, member_name("speak"), int_getter.clone());
    let mut code = generator
        .declare_method(dog_speak, MethodAccessFlags::PUBLIC)
        .unwrap();
    let out = code.new_local(FieldType::int());
    code.load_constant(out, ConstantValue::Int(2)).unwrap();
    code.return_value(out).unwrap();
    code.finish().unwrap();

    let parent_speak = generator.add_method(dog, member_name("parentSpeak"), int_getter);
    let mut code = generator
        .declare_method(parent_speak, MethodAccessFlags::PUBLIC)
        .unwrap();
    let this = code.receiver(FieldType::object(dog)).unwrap();
    let out = code.new_local(FieldType::int());
    code.invoke_super(animal_speak, Some(out), &[this]).unwrap();
    code.return_value(out).unwrap();
    code.finish().unwrap();

    // Static helpers exercising check_cast and instance_of through the root type
    let checks = generator.class(class_name("t/Checks"));
    generator
        .declare_class(checks, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let as_animal = generator.add_method(
        checks,
        member_name("asAnimal"),
        MethodDescriptor {
            parameters: vec![FieldType::object(core.object)],
            return_type: Some(FieldType::object(animal)),
        },
    );
    let mut code = generator
        .declare_method(as_animal, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    let input = code.parameter(0, FieldType::object(core.object)).unwrap();
    let out = code.new_local(FieldType::object(animal));
    code.check_cast(out, input).unwrap();
    code.return_value(out).unwrap();
    code.finish().unwrap();

    let is_animal = generator.add_method(
        checks,
        member_name("isAnimal"),
        MethodDescriptor {
            parameters: vec![FieldType::object(core.object)],
            return_type: Some(FieldType::boolean()),
        },
    );
    let mut code = generator
        .declare_method(is_animal, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    let input = code.parameter(0, FieldType::object(core.object)).unwrap();
    let out = code.new_local(FieldType::boolean());
    code.instance_of(out, input, animal).unwrap();
    code.return_value(out).unwrap();
    code.finish().unwrap();

    let namespace = load(&generator);

    let pet = namespace.construct("t/Dog", "()V", &[]).unwrap();
    assert_eq!(
        namespace.call_method(&pet, "speak", "()I", &[]).unwrap(),
        Some(Value::Int(2))
    );
    assert_eq!(
        namespace
            .call_method(&pet, "parentSpeak", "()I", &[])
            .unwrap(),
        Some(Value::Int(1))
    );

    // A dog is an animal; a string is not
    assert_eq!(
        namespace
            .invoke_static("t/Checks", "isAnimal", "(Lcore/Object;)Z", &[pet.clone()])
            .unwrap(),
        Some(Value::Boolean(true))
    );
    assert_eq!(
        namespace
            .invoke_static("t/Checks", "isAnimal", "(Lcore/Object;)Z", &[Value::Null])
            .unwrap(),
        Some(Value::Boolean(false))
    );

    let cast_back = namespace
        .invoke_static(
            "t/Checks",
            "asAnimal",
            "(Lcore/Object;)Lt/Animal;",
            &[pet.clone()],
        )
        .unwrap();
    assert_eq!(cast_back, Some(pet));

    let err = namespace
        .invoke_static(
            "t/Checks",
            "asAnimal",
            "(Lcore/Object;)Lt/Animal;",
            &[Value::Str("not a dog".into())],
        )
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ClassCastFailure { .. }));

    // Null always passes a checked cast
    assert_eq!(
        namespace
            .invoke_static(
                "t/Checks",
                "asAnimal",
                "(Lcore/Object;)Lt/Animal;",
                &[Value::Null],
            )
            .unwrap(),
        Some(Value::Null)
    );
}

#[test]
fn interface_dispatch_resolves_on_the_runtime_class() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    // The interface carries the contract but no bodies; `greet` stays a bare handle
    let greeter = generator.class(class_name("t/Greeter"));
    generator
        .declare_class(
            greeter,
            None,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
            core.object,
        )
        .unwrap();
    let int_getter = MethodDescriptor {
        parameters: vec![],
        return_type: Some(FieldType::int()),
    };
    let greet = generator.add_method(greeter, member_name("greet"), int_getter.clone());

    let console = generator.class(class_name("t/ConsoleGreeter"));
    generator
        .declare_class(console, None, ClassAccessFlags::PUBLIC, greeter)
        .unwrap();
    let console_init = generator.add_constructor(console, vec![]);
    let mut code = generator
        .declare_method(console_init, MethodAccessFlags::PUBLIC)
        .unwrap();
    let this = code.receiver(FieldType::object(console)).unwrap();
    code.invoke_direct(core.object_init, None, &[this]).unwrap();
    code.return_void().unwrap();
    code.finish().unwrap();

    let console_greet = generator.add_method(console, member_name("greet"), int_getter.clone());
    let mut code = generator
        .declare_method(console_greet, MethodAccessFlags::PUBLIC)
        .unwrap();
    let out = code.new_local(FieldType::int());
    code.load_constant(out, ConstantValue::Int(42)).unwrap();
    code.return_value(out).unwrap();
    code.finish().unwrap();

    // Static caller that only knows the receiver through the interface type
    let checks = generator.class(class_name("t/Checks"));
    generator
        .declare_class(checks, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let greet_through = generator.add_method(
        checks,
        member_name("greetThrough"),
        MethodDescriptor {
            parameters: vec![FieldType::object(greeter)],
            return_type: Some(FieldType::int()),
        },
    );
    let mut code = generator
        .declare_method(
            greet_through,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        )
        .unwrap();
    let target = code.parameter(0, FieldType::object(greeter)).unwrap();
    let out = code.new_local(FieldType::int());
    code.invoke_interface(greet, Some(out), &[target]).unwrap();
    code.return_value(out).unwrap();
    code.finish().unwrap();

    let namespace = load(&generator);
    let instance = namespace.construct("t/ConsoleGreeter", "()V", &[]).unwrap();
    let got = namespace
        .invoke_static("t/Checks", "greetThrough", "(Lt/Greeter;)I", &[instance])
        .unwrap();
    assert_eq!(got, Some(Value::Int(42)));
}

#[test]
fn null_receivers_fail_at_run_time() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    generator.insert_core_classes();
    let namespace = load(&generator);

    let err = namespace
        .call_method(&Value::Null, "speak", "()I", &[])
        .unwrap_err();
    assert_eq!(err, RuntimeError::NullReceiver);
}

#[test]
fn register_space_is_bounded() {
    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    let core = generator.insert_core_classes();

    let class = generator.class(class_name("t/Hoarder"));
    generator
        .declare_class(class, None, ClassAccessFlags::PUBLIC, core.object)
        .unwrap();
    let hoard = generator.add_method(
        class,
        member_name("hoard"),
        MethodDescriptor {
            parameters: vec![],
            return_type: None,
        },
    );
    let mut code = generator
        .declare_method(hoard, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .unwrap();
    for _ in 0..=usize::from(u16::MAX) {
        code.new_local(FieldType::int());
    }
    code.return_void().unwrap();
    assert!(matches!(
        code.finish(),
        Err(Error::RegisterLimitExceeded { .. })
    ));
}

#[test]
fn oversized_sequences_do_not_serialize() {
    use classgen::image::Serialize;

    let mut out = vec![];
    assert!(vec![0u8; 70_000].serialize(&mut out).is_err());
    assert!("x".repeat(70_000).serialize(&mut out).is_err());
    assert!(vec![0u8; 3].serialize(&mut out).is_ok());
}

#[test]
fn malformed_images_are_rejected() {
    let loader = Loader::new();
    assert!(loader.load(b"nope").is_err());
    assert!(loader.load(b"CGIM\xFF\xFF\x00\x00").is_err());

    let arenas = GeneratorArenas::new();
    let generator = Generator::new(&arenas);
    generator.insert_core_classes();
    let mut image = generator.materialize().unwrap();
    image.push(0);
    assert!(loader.load(&image).is_err());
}
