// Shared fixtures: small shader units built with the IR builder.
//
// The shape units follow the C++ lowering the linker expects: interface
// methods are undefined declarations on an opaque `class.IShape`, class
// methods are definitions taking a pointer to the class struct.

#![allow(dead_code)]

use std::rc::Rc;

use ir::{BinOp, Constant, FuncId, FunctionBuilder, Linkage, TypeId, Value};
use llair::{Context, Module};

pub const ISHAPE_AREA: &str = "_ZNK6IShape4areaEv";
pub const ISHAPE_SCALE: &str = "_ZN6IShape5scaleEf";
pub const SQUARE_AREA: &str = "_ZNK6Square4areaEv";
pub const CIRCLE_AREA: &str = "_ZNK6Circle4areaEv";
pub const ISHAPE_PERIMETER: &str = "_ZNK6IShape9perimeterEf";
pub const SQUARE_PERIMETER: &str = "_ZNK6Square9perimeterEf";

pub fn context() -> Rc<Context> {
    llair::logging::init();
    Context::with_defaults()
}

pub fn ishape(ctx: &Context) -> TypeId {
    ctx.ir().lookup_struct_type("class.IShape").unwrap_or_else(|| ctx.ir().opaque_struct_type("class.IShape"))
}

/// `float (class.IShape*)`
pub fn area_type(ctx: &Context, self_ty: TypeId) -> TypeId {
    let ir = ctx.ir();
    ir.function_type(ir.float_type(), &[ir.pointer_type(self_ty, 0)], false)
}

/// `float (class.IShape*, float)`
pub fn perimeter_type(ctx: &Context, self_ty: TypeId) -> TypeId {
    let ir = ctx.ir();
    ir.function_type(ir.float_type(), &[ir.pointer_type(self_ty, 0), ir.float_type()], false)
}

/// A unit that calls `IShape::area` from `measure` without defining it.
pub fn shape_user(ctx: &Rc<Context>) -> Module {
    let mut m = Module::new("user", ctx);
    let shape = ishape(ctx);
    let area = m.ir_mut().add_function(ISHAPE_AREA, area_type(ctx, shape), Linkage::External);

    let measure = m.ir_mut().add_function("measure", area_type(ctx, shape), Linkage::External);
    let mut b = FunctionBuilder::new(m.ir_mut(), measure);
    b.set_param_name(0, "shape");
    let entry = b.create_block(Some("entry"));
    b.position_at_end(entry);
    let result = b.call(Value::function(area), &[Value::Arg(0)], Some("area"));
    b.ret(Some(result));
    m
}

/// A unit defining a class `name` with a single float field and an `area`
/// method returning `field * field * factor`.
pub fn area_class(ctx: &Rc<Context>, name: &str, symbol: &str, factor: f64) -> Module {
    let mut m = Module::new(name.to_lowercase(), ctx);
    let ir = Rc::clone(ctx.ir());
    let float = ir.float_type();
    let class_ty = ir.named_struct_type(&format!("class.{name}"), &[float], false);
    let f = m.ir_mut().add_function(symbol, area_type(ctx, class_ty), Linkage::External);

    let mut b = FunctionBuilder::new(m.ir_mut(), f);
    b.set_param_name(0, "this");
    let entry = b.create_block(Some("entry"));
    b.position_at_end(entry);
    let field = b.struct_gep(Value::Arg(0), 0, Some("field.addr"));
    let v = b.load(field, Some("field"));
    let sq = b.binary(BinOp::FMul, v.clone(), v, Some("sq"));
    let scaled = b.binary(BinOp::FMul, sq, Value::Const(Constant::Float { ty: float, value: factor }), None);
    b.ret(Some(scaled));
    m
}

/// A unit that calls `IShape::perimeter` from `outline`, forwarding the
/// scale argument.
pub fn outline_user(ctx: &Rc<Context>) -> Module {
    let mut m = Module::new("outline", ctx);
    let shape = ishape(ctx);
    let ty = perimeter_type(ctx, shape);
    let perimeter = m.ir_mut().add_function(ISHAPE_PERIMETER, ty, Linkage::External);

    let outline = m.ir_mut().add_function("outline", ty, Linkage::External);
    let mut b = FunctionBuilder::new(m.ir_mut(), outline);
    b.set_param_name(0, "shape");
    b.set_param_name(1, "scale");
    let entry = b.create_block(Some("entry"));
    b.position_at_end(entry);
    let result = b.call(Value::function(perimeter), &[Value::Arg(0), Value::Arg(1)], Some("perimeter"));
    b.ret(Some(result));
    m
}

/// Adds a `perimeter` method returning `field * scale * sides` to the class
/// whose `area` method is `area_symbol`.
pub fn add_perimeter(module: &mut Module, area_symbol: &str, symbol: &str, sides: f64) -> FuncId {
    let ir = Rc::clone(module.ir().context());
    let area = module.ir().get_function(area_symbol).unwrap();
    let this = ir.function_params(module.ir().function(area).ty)[0];
    let float = ir.float_type();
    let ty = ir.function_type(float, &[this, float], false);
    let f = module.ir_mut().add_function(symbol, ty, Linkage::External);

    let mut b = FunctionBuilder::new(module.ir_mut(), f);
    b.set_param_name(0, "this");
    b.set_param_name(1, "scale");
    let entry = b.create_block(Some("entry"));
    b.position_at_end(entry);
    let field = b.struct_gep(Value::Arg(0), 0, Some("field.addr"));
    let v = b.load(field, Some("field"));
    let scaled = b.binary(BinOp::FMul, v, Value::Arg(1), Some("scaled"));
    let result = b.binary(BinOp::FMul, scaled, Value::Const(Constant::Float { ty: float, value: sides }), None);
    b.ret(Some(result));
    f
}

pub fn square_unit(ctx: &Rc<Context>) -> Module {
    area_class(ctx, "Square", SQUARE_AREA, 1.0)
}

pub fn circle_unit(ctx: &Rc<Context>) -> Module {
    area_class(ctx, "Circle", CIRCLE_AREA, 3.0)
}

/// Declares `name` in `module` with an empty `void ()` body when `define`.
pub fn void_function(module: &mut Module, name: &str, linkage: Linkage, define: bool) -> FuncId {
    let ir = Rc::clone(module.ir().context());
    let fty = ir.function_type(ir.void_type(), &[], false);
    let f = module.ir_mut().add_function(name, fty, linkage);
    if define {
        let mut b = FunctionBuilder::new(module.ir_mut(), f);
        let entry = b.create_block(Some("entry"));
        b.position_at_end(entry);
        b.ret(None);
    }
    f
}

/// Writes a tagged `{ i32 kind, float field }` object and returns its address.
pub fn tagged_object(interp: &mut ir::Interpreter<'_>, kind: i32, field: f32) -> u64 {
    let memory = interp.memory_mut();
    let p = memory.alloc(8, 4);
    memory.write_i32(p, kind).unwrap();
    memory.write_f32(p + 4, field).unwrap();
    p
}
