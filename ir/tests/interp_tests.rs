// Behavioural tests for the reference interpreter: arithmetic, memory,
// switches, calls and the typed failures it reports.

use std::rc::Rc;

use ir::{
    BinOp, Constant, Context, FunctionBuilder, InterpError, Interpreter, Linkage, Module, RtValue, Value,
};

fn module() -> Module {
    Module::new("interp", Rc::new(Context::default()))
}

#[test]
fn adds_two_arguments() {
    let mut m = module();
    let ctx = Rc::clone(m.context());
    let i32t = ctx.i32_type();
    let fty = ctx.function_type(i32t, &[i32t, i32t], false);
    let f = m.add_function("add", fty, Linkage::External);

    let mut b = FunctionBuilder::new(&mut m, f);
    let entry = b.create_block(Some("entry"));
    b.position_at_end(entry);
    let sum = b.binary(BinOp::Add, Value::Arg(0), Value::Arg(1), Some("sum"));
    b.ret(Some(sum));

    let mut interp = Interpreter::new(&m);
    let out = interp.call(f, &[RtValue::Int(40), RtValue::Int(2)]).unwrap();
    assert_eq!(out, RtValue::Int(42));
}

#[test]
fn i32_arithmetic_wraps() {
    let mut m = module();
    let ctx = Rc::clone(m.context());
    let i32t = ctx.i32_type();
    let fty = ctx.function_type(i32t, &[i32t], false);
    let f = m.add_function("inc", fty, Linkage::External);

    let mut b = FunctionBuilder::new(&mut m, f);
    let entry = b.create_block(None);
    b.position_at_end(entry);
    let one = Value::int(i32t, 1);
    let r = b.binary(BinOp::Add, Value::Arg(0), one, None);
    b.ret(Some(r));

    let mut interp = Interpreter::new(&m);
    let out = interp.call(f, &[RtValue::Int(i64::from(i32::MAX))]).unwrap();
    assert_eq!(out, RtValue::Int(i64::from(i32::MIN)));
}

#[test]
fn loads_struct_fields_through_gep() {
    let mut m = module();
    let ctx = Rc::clone(m.context());
    let i32t = ctx.i32_type();
    let pair = ctx.named_struct_type("struct.Pair", &[i32t, i32t], false);
    let pair_ptr = ctx.pointer_type(pair, 0);
    let fty = ctx.function_type(i32t, &[pair_ptr], false);
    let f = m.add_function("second", fty, Linkage::External);

    let mut b = FunctionBuilder::new(&mut m, f);
    let entry = b.create_block(Some("entry"));
    b.position_at_end(entry);
    let field = b.struct_gep(Value::Arg(0), 1, None);
    let v = b.load(field, None);
    b.ret(Some(v));

    let mut interp = Interpreter::new(&m);
    let p = interp.memory_mut().alloc(8, 4);
    interp.memory_mut().write_i32(p, 7).unwrap();
    interp.memory_mut().write_i32(p + 4, 9).unwrap();
    assert_eq!(interp.call(f, &[RtValue::Ptr(p)]).unwrap(), RtValue::Int(9));
}

#[test]
fn switch_takes_matching_case_or_default() {
    let mut m = module();
    let ctx = Rc::clone(m.context());
    let i32t = ctx.i32_type();
    let fty = ctx.function_type(i32t, &[i32t], false);
    let f = m.add_function("pick", fty, Linkage::External);

    let mut b = FunctionBuilder::new(&mut m, f);
    let entry = b.create_block(Some("entry"));
    let default = b.create_block(Some("default"));
    let three = b.create_block(Some("three"));
    b.position_at_end(entry);
    let switch = b.switch(Value::Arg(0), default);
    b.position_at_end(default);
    b.ret(Some(Value::int(i32t, -1)));
    b.position_at_end(three);
    b.ret(Some(Value::int(i32t, 30)));
    assert!(m.function_mut(f).add_switch_case(switch, 3, three));

    let mut interp = Interpreter::new(&m);
    assert_eq!(interp.call(f, &[RtValue::Int(3)]).unwrap(), RtValue::Int(30));
    assert_eq!(interp.call(f, &[RtValue::Int(4)]).unwrap(), RtValue::Int(-1));
}

#[test]
fn empty_default_block_is_reported() {
    let mut m = module();
    let ctx = Rc::clone(m.context());
    let i32t = ctx.i32_type();
    let fty = ctx.function_type(i32t, &[i32t], false);
    let f = m.add_function("dispatch", fty, Linkage::External);

    let mut b = FunctionBuilder::new(&mut m, f);
    let entry = b.create_block(Some("entry"));
    let default = b.create_block(None);
    b.position_at_end(entry);
    b.switch(Value::Arg(0), default);

    let mut interp = Interpreter::new(&m);
    let err = interp.call(f, &[RtValue::Int(0)]).unwrap_err();
    assert!(matches!(err, InterpError::FellOffBlock { block: 1, .. }));
}

#[test]
fn calls_forward_arguments_and_results() {
    let mut m = module();
    let ctx = Rc::clone(m.context());
    let i32t = ctx.i32_type();
    let unary = ctx.function_type(i32t, &[i32t], false);
    let double = m.add_function("double", unary, Linkage::Internal);
    let caller = m.add_function("caller", unary, Linkage::External);

    let mut b = FunctionBuilder::new(&mut m, double);
    let entry = b.create_block(None);
    b.position_at_end(entry);
    let r = b.binary(BinOp::Mul, Value::Arg(0), Value::int(i32t, 2), None);
    b.ret(Some(r));

    let mut b = FunctionBuilder::new(&mut m, caller);
    let entry = b.create_block(None);
    b.position_at_end(entry);
    let r = b.call(Value::function(double), &[Value::Arg(0)], Some("r"));
    b.ret(Some(r));

    let mut interp = Interpreter::new(&m);
    assert_eq!(interp.call_by_name("caller", &[RtValue::Int(21)]).unwrap(), RtValue::Int(42));
}

#[test]
fn calling_a_declaration_fails() {
    let mut m = module();
    let ctx = Rc::clone(m.context());
    let fty = ctx.function_type(ctx.void_type(), &[], false);
    let f = m.add_function("extern_fn", fty, Linkage::External);
    let mut interp = Interpreter::new(&m);
    assert_eq!(
        interp.call(f, &[]).unwrap_err(),
        InterpError::UndefinedFunction("extern_fn".to_owned())
    );
}

#[test]
fn globals_are_materialized_from_initializers() {
    let mut m = module();
    let ctx = Rc::clone(m.context());
    let i32t = ctx.i32_type();
    let pair = ctx.struct_type(&[i32t, i32t], false);
    let init = Constant::Aggregate {
        ty: pair,
        elements: vec![Constant::Int { ty: i32t, value: 5 }, Constant::Int { ty: i32t, value: 6 }],
    };
    let g = m.add_global("pair", pair, Linkage::Internal, Some(init));
    let fty = ctx.function_type(i32t, &[], false);
    let f = m.add_function("read", fty, Linkage::External);

    let mut b = FunctionBuilder::new(&mut m, f);
    let entry = b.create_block(None);
    b.position_at_end(entry);
    let field = b.struct_gep(Value::global(ir::GlobalRef::Variable(g)), 1, None);
    let v = b.load(field, None);
    b.ret(Some(v));

    let mut interp = Interpreter::new(&m);
    assert_eq!(interp.call(f, &[]).unwrap(), RtValue::Int(6));
}
