//! End-to-end tests of contextualized kernels.
//!
//! Each test builds a small program, wraps a kernel for a target and checks
//! the wrapped result against the unrewritten original.

use std::sync::Arc;
use std::thread;

use kernelctx::intrinsics::{ArithOp, Intrinsic, MathOp};
use kernelctx::mir::{
    AggregateKind, BinOp, BodyBuilder, Constant, ConstantKind, FloatMode, LocalId, MirBody, Operand, Place,
    Rvalue, StatementKind, SwitchTargets, TerminatorKind,
};
use kernelctx::{
    contextualize, Context, Cpu, Error, FnAttrs, Kernel, Program, RewriteConfig, RewriteError, Specialization,
    Type, Value,
};

#[cfg(feature = "accel")]
use kernelctx::Accel;
use tracing_subscriber::EnvFilter;

/// Route rewrite traces to the test output, filtered by `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Kernel builders
// ============================================================================

/// `name(x: T0) -> T0 { op(x) }`, or `-> bool` for predicates.
fn unary_math(op: MathOp) -> MirBody {
    let ret = if op.is_predicate() { Type::Bool } else { Type::Param(0) };
    let mut b = BodyBuilder::new(vec![Type::Param(0)], ret);
    let x = b.param(0);
    b.call(Operand::intrinsic(Intrinsic::Math(op)), vec![Operand::copy(x)], LocalId::RETURN);
    b.ret();
    b.finish()
}

/// `(a: T0, b: T0) -> T0 { a <op> b }`
fn binary(op: BinOp) -> MirBody {
    let mut b = BodyBuilder::new(vec![Type::Param(0), Type::Param(0)], Type::Param(0));
    let (x, y) = (b.param(0), b.param(1));
    b.assign(LocalId::RETURN, Rvalue::binary(op, Operand::copy(x), Operand::copy(y)));
    b.ret();
    b.finish()
}

fn single(name: &str, body: MirBody) -> Kernel {
    let mut program = Program::new();
    program.add(name, body);
    Arc::new(program).kernel(name).unwrap()
}

fn callees(body: &MirBody) -> Vec<ConstantKind> {
    body.basic_blocks
        .iter()
        .filter_map(|bb| match &bb.terminator.as_ref()?.kind {
            TerminatorKind::Call { func, .. } => func.as_constant().map(|c| c.kind.clone()),
            _ => None,
        })
        .collect()
}

fn entry(spec: &Specialization) -> &MirBody {
    spec.entry_body().expect("entry has a body")
}

const F32_EDGES: &[f32] = &[
    0.0,
    -0.0,
    1.0,
    -1.5,
    0.5,
    3.75,
    f32::NAN,
    f32::INFINITY,
    f32::NEG_INFINITY,
    f32::MIN_POSITIVE,
    1.0e-40, // subnormal
    f32::MAX,
];

const F64_EDGES: &[f64] = &[
    0.0,
    -0.0,
    1.0,
    -1.5,
    0.5,
    3.75,
    f64::NAN,
    f64::INFINITY,
    f64::NEG_INFINITY,
    f64::MIN_POSITIVE,
    5.0e-320, // subnormal
    f64::MAX,
];

// ============================================================================
// Concrete scenarios
// ============================================================================

#[test]
fn test_sin_on_cpu_is_unchanged() {
    init_tracing();
    let g = single("g", unary_math(MathOp::Sin));
    let wrapped = Context::default().contextualize(Cpu, g.clone());

    let spec = wrapped.specialize(&[Type::F32]).unwrap();
    assert!(matches!(callees(entry(&spec)).as_slice(), [ConstantKind::Intrinsic(Intrinsic::Math(MathOp::Sin))]));
    assert_eq!(spec.stats.substituted, 0);

    let out = wrapped.call(&[Value::F32(1.0)]).unwrap();
    assert!(out.bit_eq(&g.call_original(&[Value::F32(1.0)]).unwrap()));
}

#[cfg(feature = "accel")]
#[test]
fn test_sin_on_accel_uses_device_routine() {
    let g = single("g", unary_math(MathOp::Sin));
    let wrapped = Context::default().contextualize(Accel, g);

    let spec = wrapped.specialize(&[Type::F32]).unwrap();
    let routine = match callees(entry(&spec)).as_slice() {
        [ConstantKind::Routine(r)] => *r,
        other => panic!("expected a device routine, got {:?}", other),
    };
    assert_eq!(routine.name, "__accel_sinf");

    let out = wrapped.call(&[Value::F32(1.0)]).unwrap();
    assert_eq!(out, routine.call(&[Value::F32(1.0)]).unwrap());
}

#[cfg(feature = "accel")]
#[test]
fn test_add_on_accel_is_contracted() {
    let h = single("h", binary(BinOp::Add));
    let wrapped = Context::default().contextualize(Accel, h);

    assert_eq!(wrapped.call(&[Value::F32(1.0), Value::F32(2.0)]).unwrap(), Value::F32(3.0));
    let spec = wrapped.specialize(&[Type::F32, Type::F32]).unwrap();
    match &entry(&spec).basic_blocks[0].statements[0].kind {
        StatementKind::Assign(_, Rvalue::BinaryOp { op: BinOp::Add, mode, .. }) => assert_eq!(*mode, FloatMode::Contract),
        other => panic!("unexpected {:?}", other),
    }
}

#[cfg(feature = "accel")]
#[test]
fn test_add_of_literals_folds_at_rewrite_time() {
    // h() { let a = 1.0f32; let b = 2.0f32; a + b }
    let mut b = BodyBuilder::new(vec![], Type::F32);
    let (x, y) = (b.var("a", Type::F32), b.var("b", Type::F32));
    b.assign(x, Rvalue::Use(Operand::constant(Constant::f32(1.0))));
    b.assign(y, Rvalue::Use(Operand::constant(Constant::f32(2.0))));
    b.assign(LocalId::RETURN, Rvalue::binary(BinOp::Add, Operand::copy(x), Operand::copy(y)));
    b.ret();
    let wrapped = Context::default().contextualize(Accel, single("h", b.finish()));

    let spec = wrapped.specialize(&[]).unwrap();
    assert_eq!(spec.stats.folded, 1);
    let folded = entry(&spec).basic_blocks[0].statements.iter().any(|s| {
        matches!(&s.kind, StatementKind::Assign(p, Rvalue::Use(Operand::Constant(c)))
            if p.local == LocalId::RETURN && matches!(c.kind, ConstantKind::Float(v) if v == 3.0))
    });
    assert!(folded, "{}", entry(&spec));
    assert_eq!(wrapped.call(&[]).unwrap(), Value::F32(3.0));
}

// ============================================================================
// Table semantics
// ============================================================================

#[cfg(feature = "accel")]
#[test]
fn test_signature_must_match_exactly() {
    let context = Context::default();

    let g = context.contextualize(Accel, single("g", unary_math(MathOp::Sqrt)));
    let spec = g.specialize(&[Type::F64]).unwrap();
    assert!(matches!(callees(entry(&spec)).as_slice(), [ConstantKind::Routine(r)] if r.name == "__accel_sqrt"));

    // Integer arithmetic has no contracted form.
    let add = context.contextualize(Accel, single("add", binary(BinOp::Add)));
    let spec = add.specialize(&[Type::I32, Type::I32]).unwrap();
    assert_eq!(spec.stats.substituted, 0);
    match &entry(&spec).basic_blocks[0].statements[0].kind {
        StatementKind::Assign(_, Rvalue::BinaryOp { mode, .. }) => assert_eq!(*mode, FloatMode::Strict),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(add.call(&[Value::I32(i32::MAX), Value::I32(1)]).unwrap(), Value::I32(i32::MIN));
}

#[cfg(feature = "accel")]
#[test]
fn test_math_routines_match_host_on_edge_values() {
    let context = Context::default();
    for &op in MathOp::ALL {
        let kernel = single(op.name(), unary_math(op));
        let wrapped = context.contextualize(Accel, kernel.clone());
        for &x in F32_EDGES {
            let original = kernel.call_original(&[Value::F32(x)]).unwrap();
            let rewritten = wrapped.call(&[Value::F32(x)]).unwrap();
            assert!(rewritten.bit_eq(&original), "{}({:e}): {} vs {}", op.name(), x, rewritten, original);
        }
        for &x in F64_EDGES {
            let original = kernel.call_original(&[Value::F64(x)]).unwrap();
            let rewritten = wrapped.call(&[Value::F64(x)]).unwrap();
            assert!(rewritten.bit_eq(&original), "{}({:e}): {} vs {}", op.name(), x, rewritten, original);
        }
        assert_eq!(wrapped.specialize(&[Type::F32]).unwrap().stats.substituted, 1);
    }
}

#[cfg(feature = "accel")]
#[test]
fn test_arithmetic_matches_host_on_edge_values() {
    let context = Context::default();
    for op in ArithOp::ALL {
        let kernel = single(op.symbol(), binary(op.to_binop()));
        let wrapped = context.contextualize(Accel, kernel.clone());
        for &a in F32_EDGES {
            for &b in F32_EDGES {
                let args = [Value::F32(a), Value::F32(b)];
                let original = kernel.call_original(&args).unwrap();
                let rewritten = wrapped.call(&args).unwrap();
                assert!(rewritten.bit_eq(&original), "{:e} {} {:e}", a, op.symbol(), b);
            }
        }
    }
}

#[cfg(feature = "accel")]
#[test]
fn test_unlisted_operations_are_bit_exact() {
    let div = single("div", binary(BinOp::Div));
    let wrapped = Context::default().contextualize(Accel, div.clone());
    for &a in F64_EDGES {
        for &b in F64_EDGES {
            let args = [Value::F64(a), Value::F64(b)];
            assert!(wrapped.call(&args).unwrap().bit_eq(&div.call_original(&args).unwrap()));
        }
    }
    assert_eq!(wrapped.specialize(&[Type::F64, Type::F64]).unwrap().stats.substituted, 0);
}

#[cfg(feature = "accel")]
#[test]
fn test_multiply_add_is_fused() {
    // fma(a, b, c) = a * b + c
    let mut b = BodyBuilder::new(vec![Type::F64, Type::F64, Type::F64], Type::F64);
    let (x, y, z) = (b.param(0), b.param(1), b.param(2));
    let t = b.temp(Type::F64);
    b.assign(t, Rvalue::binary(BinOp::Mul, Operand::copy(x), Operand::copy(y)));
    b.assign(LocalId::RETURN, Rvalue::binary(BinOp::Add, Operand::copy(t), Operand::copy(z)));
    b.ret();
    let kernel = single("fma", b.finish());

    let fused = Context::default().contextualize(Accel, kernel.clone());
    let unfused = Context::new(RewriteConfig::builder().contraction(false).build().unwrap())
        .contextualize(Accel, kernel.clone());

    let sig = [Type::F64, Type::F64, Type::F64];
    assert_eq!(fused.specialize(&sig).unwrap().stats.fused, 1);
    assert_eq!(unfused.specialize(&sig).unwrap().stats.fused, 0);

    let (a, b, c) = (0.1f64, 10.0f64, -1.0f64);
    let args = [Value::F64(a), Value::F64(b), Value::F64(c)];
    let exact = kernel.call_original(&args).unwrap().as_f64().unwrap();
    let contracted = fused.call(&args).unwrap().as_f64().unwrap();
    assert_eq!(contracted, a.mul_add(b, c));
    assert!((contracted - exact).abs() <= 4.0 * f64::EPSILON);
    assert_eq!(unfused.call(&args).unwrap().as_f64().unwrap(), exact);
}

// ============================================================================
// Descent, inlining and passthrough
// ============================================================================

/// `k() -> i64 { frame_depth() }` plus callers using each kind of site.
fn depth_program(attrs: FnAttrs) -> Arc<Program> {
    let mut program = Program::new();
    let mut b = BodyBuilder::new(vec![], Type::I64);
    b.call(Operand::intrinsic(Intrinsic::FrameDepth), vec![], LocalId::RETURN);
    b.ret();
    let k = program.add_with_attrs("k", b.finish(), attrs);

    let mut b = BodyBuilder::new(vec![], Type::I64);
    b.call(Operand::item(k), vec![], LocalId::RETURN);
    b.ret();
    program.add("plain", b.finish());

    let mut b = BodyBuilder::new(vec![], Type::I64);
    b.call_noinline(Operand::item(k), vec![], LocalId::RETURN);
    b.ret();
    program.add("marked", b.finish());

    Arc::new(program)
}

#[test]
fn test_no_inline_sites_keep_their_frame() {
    let program = depth_program(FnAttrs::default());
    let context = Context::default();
    let plain = context.contextualize(Cpu, program.kernel("plain").unwrap());
    let marked = context.contextualize(Cpu, program.kernel("marked").unwrap());

    // Originals run k in its own frame.
    assert_eq!(plain.kernel().call_original(&[]).unwrap(), Value::I64(2));
    assert_eq!(marked.kernel().call_original(&[]).unwrap(), Value::I64(2));

    assert_eq!(plain.call(&[]).unwrap(), Value::I64(1));
    assert_eq!(marked.call(&[]).unwrap(), Value::I64(2));

    let stats = marked.specialize(&[]).unwrap().stats;
    assert_eq!((stats.descended, stats.no_inline, stats.inlined), (1, 1, 0));
}

#[test]
fn test_no_inline_callees_are_not_inlined() {
    let program = depth_program(FnAttrs::no_inline());
    let plain = Context::default().contextualize(Cpu, program.kernel("plain").unwrap());
    assert_eq!(plain.call(&[]).unwrap(), Value::I64(2));
}

#[cfg(feature = "accel")]
#[test]
fn test_passthrough_calls_are_untouched() {
    // p(x: T0) -> T0 {
    //   is_bits_value(x); is_primitive_type(T0); target_alignment(f64); kwfunc(x)
    // }
    let mut b = BodyBuilder::new(vec![Type::Param(0)], Type::Param(0));
    let x = b.param(0);
    let bits = b.temp(Type::Bool);
    let prim = b.temp(Type::Bool);
    let align = b.temp(Type::I64);
    b.call(Operand::intrinsic(Intrinsic::IsBitsValue), vec![Operand::copy(x)], bits);
    b.call(
        Operand::intrinsic(Intrinsic::IsPrimitiveType),
        vec![Operand::constant(Constant::type_value(Type::Param(0)))],
        prim,
    );
    b.call(
        Operand::intrinsic(Intrinsic::TargetAlignment),
        vec![Operand::constant(Constant::type_value(Type::F64))],
        align,
    );
    b.call(Operand::intrinsic(Intrinsic::KwFunc), vec![Operand::copy(x)], LocalId::RETURN);
    b.ret();
    let source = b.finish();
    let original_calls = callees(&source);
    let kernel = single("p", source);

    let wrapped = Context::default().contextualize(Accel, kernel.clone());
    let spec = wrapped.specialize(&[Type::F32]).unwrap();
    let rewritten_calls = callees(entry(&spec));
    assert_eq!(rewritten_calls.len(), original_calls.len());
    for (a, b) in rewritten_calls.iter().zip(&original_calls) {
        match (a, b) {
            (ConstantKind::Intrinsic(a), ConstantKind::Intrinsic(b)) => assert_eq!(a, b),
            other => panic!("passthrough changed: {:?}", other),
        }
    }
    assert_eq!(spec.stats.passthrough, 4);

    for &v in F32_EDGES {
        let args = [Value::F32(v)];
        assert!(wrapped.call(&args).unwrap().bit_eq(&kernel.call_original(&args).unwrap()));
    }
}

#[test]
fn test_opaque_callee_aborts_specialization() {
    init_tracing();
    let mut program = Program::new();
    let host = program.add_opaque("host_rand", "foreign function");
    let mut b = BodyBuilder::new(vec![Type::F32], Type::F32);
    let x = b.param(0);
    b.call(Operand::item(host), vec![Operand::copy(x)], LocalId::RETURN);
    b.ret();
    program.add("f", b.finish());
    let f = Arc::new(program).kernel("f").unwrap();

    let context = Context::default();
    let wrapped = context.contextualize(Cpu, f);
    let first = wrapped.specialize(&[Type::F32]).unwrap_err();
    assert!(matches!(&first, RewriteError::Extraction { name, .. } if name == "host_rand"));

    // Deterministic: the cached failure comes back, nothing is recomputed.
    let second = wrapped.specialize(&[Type::F32]).unwrap_err();
    assert_eq!(first, second);
    assert_eq!(context.cache_stats().misses, 1);

    match wrapped.call(&[Value::F32(1.0)]) {
        Err(Error::Rewrite(err)) => assert_eq!(err, first),
        other => panic!("expected a rewrite error, got {:?}", other),
    }
}

#[test]
fn test_recursive_kernel() {
    init_tracing();
    // fact(n: i64) -> i64 { if n <= 1 { 1 } else { n * fact(n - 1) } }
    let mut program = Program::new();
    let fact = program.declare("fact");
    let mut b = BodyBuilder::new(vec![Type::I64], Type::I64);
    let n = b.param(0);
    let small = b.temp(Type::Bool);
    let pred = b.temp(Type::I64);
    let rec = b.temp(Type::I64);
    b.assign(small, Rvalue::binary(BinOp::Le, Operand::copy(n), Operand::constant(Constant::int(1, Type::I64))));
    let (base, step) = (b.new_block(), b.new_block());
    b.switch_int(Operand::copy(small), SwitchTargets::if_true(base, step));
    b.switch_to(base);
    b.assign(LocalId::RETURN, Rvalue::Use(Operand::constant(Constant::int(1, Type::I64))));
    b.ret();
    b.switch_to(step);
    b.assign(pred, Rvalue::binary(BinOp::Sub, Operand::copy(n), Operand::constant(Constant::int(1, Type::I64))));
    b.call(Operand::item(fact), vec![Operand::copy(pred)], rec);
    b.assign(LocalId::RETURN, Rvalue::binary(BinOp::Mul, Operand::copy(n), Operand::copy(rec)));
    b.ret();
    program.define(fact, b.finish(), FnAttrs::default()).unwrap();

    let kernel = Arc::new(program).kernel("fact").unwrap();
    let wrapped = Context::default().contextualize(Cpu, kernel);
    assert_eq!(wrapped.call(&[Value::I64(10)]).unwrap(), Value::I64(3_628_800));

    let stats = wrapped.specialize(&[Type::I64]).unwrap().stats;
    assert_eq!((stats.functions, stats.recursive, stats.inlined), (1, 1, 0));
}

/// `nest(x: T0, n: i64) -> i64 { if n == 0 { 0 } else { nest((x,), n - 1) } }`
///
/// Every recursive call is a new instance, with `T0` one tuple deeper.
fn nest_kernel() -> Kernel {
    let mut program = Program::new();
    let nest = program.declare("nest");
    let mut b = BodyBuilder::new(vec![Type::Param(0), Type::I64], Type::I64);
    let (x, n) = (b.param(0), b.param(1));
    let done = b.temp(Type::Bool);
    let wrapped = b.temp(Type::Tuple(vec![Type::Param(0)]));
    let pred = b.temp(Type::I64);
    b.assign(done, Rvalue::binary(BinOp::Eq, Operand::copy(n), Operand::constant(Constant::int(0, Type::I64))));
    let (base, step) = (b.new_block(), b.new_block());
    b.switch_int(Operand::copy(done), SwitchTargets::if_true(base, step));
    b.switch_to(base);
    b.assign(LocalId::RETURN, Rvalue::Use(Operand::constant(Constant::int(0, Type::I64))));
    b.ret();
    b.switch_to(step);
    b.assign(wrapped, Rvalue::Aggregate { kind: AggregateKind::Tuple, operands: vec![Operand::copy(x)] });
    b.assign(pred, Rvalue::binary(BinOp::Sub, Operand::copy(n), Operand::constant(Constant::int(1, Type::I64))));
    b.call(Operand::item(nest), vec![Operand::copy(wrapped), Operand::copy(pred)], LocalId::RETURN);
    b.ret();
    program.define(nest, b.finish(), FnAttrs::default()).unwrap();
    Arc::new(program).kernel("nest").unwrap()
}

#[test]
fn test_unbounded_instance_nesting_is_an_error() {
    init_tracing();
    let kernel = nest_kernel();
    let args = [Value::F64(1.0), Value::I64(3)];
    assert_eq!(kernel.call_original(&args).unwrap(), Value::I64(0));

    match Context::default().contextualize(Cpu, kernel.clone()).call(&args) {
        Err(Error::Rewrite(RewriteError::InstanceDepth { name, limit })) => {
            assert_eq!(name, "nest");
            assert_eq!(limit, RewriteConfig::default().max_instance_depth);
        }
        other => panic!("expected an instance depth error, got {:?}", other),
    }

    let shallow = Context::new(RewriteConfig::builder().max_instance_depth(8).build().unwrap());
    let err = shallow.contextualize(Cpu, kernel).specialize(&[Type::F64, Type::I64]).unwrap_err();
    assert!(matches!(err, RewriteError::InstanceDepth { limit: 8, .. }), "{}", err);
}

#[test]
fn test_untyped_call_arguments_abort_specialization() {
    // f(x: f32) -> f32 { if false { host_rng(x.3) } else { x } }
    let mut program = Program::new();
    let host = program.add_opaque("host_rng", "foreign function");
    let mut b = BodyBuilder::new(vec![Type::F32], Type::F32);
    let x = b.param(0);
    let (dead, live) = (b.new_block(), b.new_block());
    b.switch_int(Operand::constant(Constant::bool(false)), SwitchTargets::if_true(dead, live));
    b.switch_to(dead);
    b.call(Operand::item(host), vec![Operand::copy(Place::local(x).field(3))], LocalId::RETURN);
    b.ret();
    b.switch_to(live);
    b.assign(LocalId::RETURN, Rvalue::Use(Operand::copy(x)));
    b.ret();
    program.add("f", b.finish());
    let f = Arc::new(program).kernel("f").unwrap();

    let err = Context::default().contextualize(Cpu, f).specialize(&[Type::F32]).unwrap_err();
    assert_eq!(err, RewriteError::UntypedCall { caller: "f".to_string(), callee: "host_rng".to_string() });
}

#[cfg(feature = "accel")]
#[test]
fn test_nested_calls_are_specialized_transitively() {
    // inner(x) = exp(x); outer(x) = inner(x) * x
    let mut program = Program::new();
    let inner = program.add("inner", unary_math(MathOp::Exp));
    let mut b = BodyBuilder::new(vec![Type::Param(0)], Type::Param(0));
    let x = b.param(0);
    let t = b.temp(Type::Param(0));
    b.call(Operand::item(inner), vec![Operand::copy(x)], t);
    b.assign(LocalId::RETURN, Rvalue::binary(BinOp::Mul, Operand::copy(t), Operand::copy(x)));
    b.ret();
    program.add("outer", b.finish());
    let outer = Arc::new(program).kernel("outer").unwrap();

    let wrapped = Context::default().contextualize(Accel, outer.clone());
    let spec = wrapped.specialize(&[Type::F64]).unwrap();
    assert_eq!(spec.stats.functions, 2);
    assert_eq!(spec.stats.inlined, 1);
    assert!(matches!(callees(entry(&spec)).as_slice(), [ConstantKind::Routine(r)] if r.name == "__accel_exp"));

    let args = [Value::F64(0.75)];
    assert!(wrapped.call(&args).unwrap().bit_eq(&outer.call_original(&args).unwrap()));
}

// ============================================================================
// Caching, configuration and concurrency
// ============================================================================

#[test]
fn test_contextualize_is_idempotent() {
    let g = single("g", unary_math(MathOp::Cos));
    let a = contextualize(Cpu, g.clone());
    let b = contextualize(Cpu, g);
    let sa = a.specialize(&[Type::F64]).unwrap();
    let sb = b.specialize(&[Type::F64]).unwrap();
    assert!(Arc::ptr_eq(&sa, &sb));
    assert_eq!(a.call(&[Value::F64(0.25)]).unwrap(), b.call(&[Value::F64(0.25)]).unwrap());
}

#[cfg(feature = "accel")]
#[test]
fn test_debug_fallback_guards_the_entry() {
    let g = single("g", unary_math(MathOp::Tanh));
    let with = Context::new(RewriteConfig::builder().debug_fallback(true).build().unwrap())
        .contextualize(Accel, g.clone());
    let without = Context::default().contextualize(Accel, g.clone());

    let spec = with.specialize(&[Type::F32]).unwrap();
    match &entry(&spec).basic_blocks[0].terminator.as_ref().unwrap().kind {
        TerminatorKind::SwitchInt { discr, .. } => {
            assert!(matches!(discr.as_constant().map(|c| &c.kind), Some(ConstantKind::Bool(false))));
        }
        other => panic!("expected the fallback guard, got {:?}", other),
    }
    assert!(spec.program.lookup("g").is_some());

    let args = [Value::F32(0.3)];
    assert!(with.call(&args).unwrap().bit_eq(&without.call(&args).unwrap()));
}

#[test]
fn test_fallback_is_not_installed_on_a_malformed_entry() {
    let mut body = BodyBuilder::new(vec![Type::F32], Type::F32).finish();
    body.basic_blocks.clear();
    let empty = single("empty", body);

    for fallback in [false, true] {
        let config = RewriteConfig::builder().debug_fallback(fallback).build().unwrap();
        let wrapped = Context::new(config).contextualize(Cpu, empty.clone());
        match wrapped.specialize(&[Type::F32]) {
            Err(RewriteError::Malformed { errors, .. }) => {
                assert!(errors.iter().any(|e| e.contains("no basic blocks")), "{:?}", errors);
            }
            other => panic!("expected a malformed body, got {:?}", other.map(|s| s.stats)),
        }
        assert!(matches!(wrapped.call(&[Value::F32(1.0)]), Err(Error::Rewrite(RewriteError::Malformed { .. }))));
    }
}

#[cfg(feature = "accel")]
#[test]
fn test_disabled_fallback_leaves_output_alone() {
    let g = single("g", unary_math(MathOp::Log));
    let a = Context::default().contextualize(Accel, g.clone()).specialize(&[Type::F64]).unwrap();
    let b = Context::new(RewriteConfig::builder().debug_fallback(false).build().unwrap())
        .contextualize(Accel, g)
        .specialize(&[Type::F64])
        .unwrap();
    assert_eq!(entry(&a).to_string(), entry(&b).to_string());
    assert_eq!(a.program.len(), 1);
}

#[test]
fn test_concurrent_calls_share_one_specialization() {
    init_tracing();
    let context = Context::default();
    let wrapped = context.contextualize(Cpu, single("g", unary_math(MathOp::Atan)));

    thread::scope(|s| {
        for i in 0..8 {
            let wrapped = wrapped.clone();
            s.spawn(move || {
                let x = i as f64 * 0.125;
                for _ in 0..16 {
                    assert_eq!(wrapped.call(&[Value::F64(x)]).unwrap(), Value::F64(x.atan()));
                    assert_eq!(wrapped.call(&[Value::F32(x as f32)]).unwrap(), Value::F32((x as f32).atan()));
                }
            });
        }
    });

    assert_eq!(context.cache_stats().entries, 2);
}

#[cfg(feature = "accel")]
#[test]
fn test_stats_serialize() {
    let wrapped = Context::default().contextualize(Accel, single("g", unary_math(MathOp::Sin)));
    let spec = wrapped.specialize(&[Type::F32]).unwrap();
    let json = serde_json::to_value(spec.stats).unwrap();
    assert_eq!(json["substituted"], 1);
    assert_eq!(json["functions"], 1);
}
