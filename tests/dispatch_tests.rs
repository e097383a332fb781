// Interfaces, classes and the dispatch functions emitted for them, checked
// by running the emitted IR with the reference interpreter.

mod common;

use std::rc::Rc;

use common::*;
use ir::{FunctionBuilder, InterpError, Interpreter, Linkage, RtValue, Value};
use llair::records::DispatcherRecord;
use llair::{
    Class, DispatcherError, Interface, ItaniumDecoder, Module, ModuleError, finalize_interfaces, link_modules,
};

fn area_interface(ctx: &Rc<llair::Context>) -> Rc<Interface> {
    let shape = ishape(ctx);
    Interface::get(ctx, shape, &["areaEv"], &[ISHAPE_AREA], &[area_type(ctx, shape)])
}

#[test]
fn interfaces_are_interned_by_structure() {
    let ctx = context();
    let shape = ishape(&ctx);
    let area = area_type(&ctx, shape);
    let scale = {
        let ir = ctx.ir();
        ir.function_type(ir.void_type(), &[ir.pointer_type(shape, 0), ir.float_type()], false)
    };

    let a = Interface::get(&ctx, shape, &["scaleEf", "areaEv"], &[ISHAPE_SCALE, ISHAPE_AREA], &[scale, area]);
    let b = Interface::get(&ctx, shape, &["areaEv", "scaleEf"], &[ISHAPE_AREA, ISHAPE_SCALE], &[area, scale]);
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(a.methods().iter().map(|m| m.name()).collect::<Vec<_>>(), vec!["areaEv", "scaleEf"]);
    assert_eq!(a.method_index("scaleEf"), Some(1));

    let only_area = area_interface(&ctx);
    assert_ne!(only_area.id(), a.id());
    assert_eq!(ctx.interface_count(), 2);
}

#[test]
fn duplicate_method_names_keep_the_first() {
    let ctx = context();
    let shape = ishape(&ctx);
    let area = area_type(&ctx, shape);
    let other = ctx.ir().function_type(ctx.ir().void_type(), &[ctx.ir().pointer_type(shape, 0)], false);

    let i = Interface::get(&ctx, shape, &["areaEv", "areaEv"], &[ISHAPE_AREA, "dup"], &[area, other]);
    assert_eq!(i.method_count(), 1);
    assert_eq!(i.methods()[0].qualified_name(), ISHAPE_AREA);
    assert_eq!(i.methods()[0].ty(), area);
}

#[test]
fn class_implements_interfaces_it_covers() {
    let ctx = context();
    let mut square = square_unit(&ctx);
    let id = square.get_or_load_class_from_abi("Square", &ItaniumDecoder).unwrap().unwrap();
    let class = square.class(id).unwrap();
    assert_eq!(class.name(), "Square");
    assert_eq!(class.methods().iter().map(|m| m.name()).collect::<Vec<_>>(), vec!["areaEv"]);
    assert!(class.does_implement(&area_interface(&ctx)));

    let shape = ishape(&ctx);
    let scale = ctx.ir().function_type(ctx.ir().void_type(), &[ctx.ir().pointer_type(shape, 0)], false);
    let wider = Interface::get(
        &ctx,
        shape,
        &["areaEv", "scaleEf"],
        &[ISHAPE_AREA, ISHAPE_SCALE],
        &[area_type(&ctx, shape), scale],
    );
    assert!(!class.does_implement(&wider));

    // Loading again finds the existing class.
    assert_eq!(square.get_or_load_class_from_abi("Square", &ItaniumDecoder).unwrap(), Some(id));
    assert_eq!(square.get_or_load_class_from_abi("Triangle", &ItaniumDecoder).unwrap(), None);
}

#[test]
fn class_layout_accounts_for_the_kind_tag() {
    let ctx = context();
    let mut square = square_unit(&ctx);
    let id = square.get_or_load_class_from_abi("Square", &ItaniumDecoder).unwrap().unwrap();
    let layout = square.class(id).unwrap().layout().unwrap();
    assert_eq!(layout.size, 4);
    assert_eq!(layout.size_with_kind, 8);
    assert_eq!(layout.offset_past_kind, 4);
}

#[test]
fn class_names_are_uniqued_within_a_module() {
    let ctx = context();
    let mut m = square_unit(&ctx);
    let f = m.ir().get_function(SQUARE_AREA).unwrap();
    let ty = ctx.ir().lookup_struct_type("class.Square").unwrap();
    let a = m.create_class(ty, &["areaEv"], &[f], "Square");
    let b = m.create_class(ty, &["areaEv"], &[f], "Square");
    assert_ne!(m.class(a).unwrap().name(), m.class(b).unwrap().name());
    assert_eq!(m.get_class("Square"), Some(a));

    let removed = m.remove_class(b).unwrap();
    assert!(removed.owner().is_none());
    assert_eq!(m.class_count(), 1);
    let back = m.insert_class(removed);
    assert_eq!(m.class(back).unwrap().owner(), Some(m.id()));
}

#[test]
fn empty_dispatcher_falls_off_its_default_block() {
    let ctx = context();
    let mut m = shape_user(&ctx);
    let id = m.create_dispatcher(area_interface(&ctx)).unwrap();
    let dispatcher = m.dispatcher(id).unwrap();
    let function = dispatcher.methods()[0].function();
    assert_eq!(m.ir().function(function).name(), ISHAPE_AREA);
    assert!(dispatcher.methods()[0].table().is_empty());

    let mut interp = Interpreter::new(m.ir());
    let p = tagged_object(&mut interp, 0, 2.0);
    let err = interp.call(function, &[RtValue::Ptr(p)]).unwrap_err();
    assert!(matches!(err, InterpError::FellOffBlock { .. }), "{err}");
}

#[test]
fn dispatcher_rejects_methods_without_pointer_self() {
    let ctx = context();
    let mut m = Module::new("m", &ctx);
    let ir = ctx.ir();
    let bad = ir.function_type(ir.void_type(), &[ir.i32_type()], false);
    let interface = Interface::get(&ctx, ishape(&ctx), &["fEi"], &["_ZN6IShape1fEi"], &[bad]);
    let err = m.create_dispatcher(interface).unwrap_err();
    assert!(matches!(err, ModuleError::Dispatcher(DispatcherError::InvalidSelfParameter { .. })));
    assert_eq!(m.dispatcher_count(), 0);
}

#[test]
fn dispatch_selects_the_class_by_kind() {
    let ctx = context();
    let mut program = Module::new("program", &ctx);
    link_modules(&mut program, &shape_user(&ctx)).unwrap();
    link_modules(&mut program, &square_unit(&ctx)).unwrap();
    link_modules(&mut program, &circle_unit(&ctx)).unwrap();

    let interfaces = program.interfaces_from_abi(&ItaniumDecoder).unwrap();
    assert_eq!(interfaces.len(), 1);
    let classes = program.get_or_load_all_classes_from_abi(&ItaniumDecoder).unwrap();
    assert_eq!(classes.len(), 2);

    let mut asked = Vec::new();
    finalize_interfaces(&mut program, &interfaces, |class: &Class| {
        asked.push(class.name().to_owned());
        if class.name() == "Square" { 0 } else { 1 }
    })
    .unwrap();
    asked.sort();
    assert_eq!(asked, vec!["Circle", "Square"]);

    let dispatcher = program.dispatcher(program.dispatcher_for(&interfaces[0]).unwrap()).unwrap();
    assert!(dispatcher.has_kind(0) && dispatcher.has_kind(1));

    let mut interp = Interpreter::new(program.ir());
    let square = tagged_object(&mut interp, 0, 3.0);
    let circle = tagged_object(&mut interp, 1, 2.0);
    assert_eq!(interp.call_by_name("measure", &[RtValue::Ptr(square)]).unwrap(), RtValue::Float(9.0));
    assert_eq!(interp.call_by_name("measure", &[RtValue::Ptr(circle)]).unwrap(), RtValue::Float(12.0));
}

#[test]
fn first_implementation_is_the_fallback() {
    let ctx = context();
    let mut m = square_unit(&ctx);
    let class = m.get_or_load_class_from_abi("Square", &ItaniumDecoder).unwrap().unwrap();
    let implementation = m.implementation(class).unwrap();
    let id = m.create_dispatcher(area_interface(&ctx)).unwrap();
    m.insert_implementation(id, 5, &implementation);

    let table = m.dispatcher(id).unwrap().methods()[0].table();
    assert_eq!(table.default_kind(), Some(5));
    assert!(table.cases().is_empty());

    let function = m.dispatcher(id).unwrap().methods()[0].function();
    let mut interp = Interpreter::new(m.ir());
    let unknown = tagged_object(&mut interp, 42, 4.0);
    assert_eq!(interp.call(function, &[RtValue::Ptr(unknown)]).unwrap(), RtValue::Float(16.0));
}

#[test]
fn dispatch_forwards_trailing_arguments_and_skips_partial_classes() {
    let ctx = context();
    let mut square = square_unit(&ctx);
    add_perimeter(&mut square, SQUARE_AREA, SQUARE_PERIMETER, 4.0);

    let mut program = Module::new("program", &ctx);
    link_modules(&mut program, &shape_user(&ctx)).unwrap();
    link_modules(&mut program, &outline_user(&ctx)).unwrap();
    link_modules(&mut program, &square).unwrap();
    link_modules(&mut program, &circle_unit(&ctx)).unwrap();

    let interfaces = program.interfaces_from_abi(&ItaniumDecoder).unwrap();
    assert_eq!(interfaces.len(), 1);
    assert_eq!(interfaces[0].methods().iter().map(|m| m.name()).collect::<Vec<_>>(), vec!["areaEv", "perimeterEf"]);
    assert_eq!(program.get_or_load_all_classes_from_abi(&ItaniumDecoder).unwrap().len(), 2);

    // Circle only has `area`, so it never implements the interface.
    let mut asked = Vec::new();
    finalize_interfaces(&mut program, &interfaces, |class: &Class| {
        asked.push(class.name().to_owned());
        0
    })
    .unwrap();
    assert_eq!(asked, vec!["Square"]);
    let dispatcher = program.dispatcher(program.dispatcher_for(&interfaces[0]).unwrap()).unwrap();
    assert_eq!(dispatcher.methods().len(), 2);
    assert_eq!(
        dispatcher.implementations().iter().map(|i| i.class_name.as_str()).collect::<Vec<_>>(),
        vec!["Square"]
    );

    let mut interp = Interpreter::new(program.ir());
    let square = tagged_object(&mut interp, 0, 3.0);
    assert_eq!(interp.call_by_name("measure", &[RtValue::Ptr(square)]).unwrap(), RtValue::Float(9.0));
    assert_eq!(
        interp.call_by_name("outline", &[RtValue::Ptr(square), RtValue::Float(2.0)]).unwrap(),
        RtValue::Float(24.0)
    );
}

#[test]
fn implementations_are_ordered_by_kind() {
    let ctx = context();
    let mut program = Module::new("program", &ctx);
    link_modules(&mut program, &square_unit(&ctx)).unwrap();
    link_modules(&mut program, &circle_unit(&ctx)).unwrap();
    let square = program.get_or_load_class_from_abi("Square", &ItaniumDecoder).unwrap().unwrap();
    let circle = program.get_or_load_class_from_abi("Circle", &ItaniumDecoder).unwrap().unwrap();

    let id = program.create_dispatcher(area_interface(&ctx)).unwrap();
    let circle = program.implementation(circle).unwrap();
    let square = program.implementation(square).unwrap();
    program.insert_implementation(id, 1, &circle);
    program.insert_implementation(id, 0, &square);

    let dispatcher = program.dispatcher(id).unwrap();
    assert_eq!(dispatcher.implementations().iter().map(|i| i.kind).collect::<Vec<_>>(), vec![0, 1]);
    let printed = dispatcher.display(ctx.ir()).to_string();
    assert!(printed.ends_with("{ 0: Square, 1: Circle }"), "{printed}");
    let record = DispatcherRecord::decode(program.ir(), dispatcher.record().unwrap()).unwrap();
    assert_eq!(record.implementations, dispatcher.implementations());

    // Circle went in first, so it owns the default block.
    assert_eq!(dispatcher.methods()[0].table().default_kind(), Some(1));
    let function = dispatcher.methods()[0].function();
    let mut interp = Interpreter::new(program.ir());
    let a = tagged_object(&mut interp, 0, 3.0);
    let b = tagged_object(&mut interp, 1, 2.0);
    assert_eq!(interp.call(function, &[RtValue::Ptr(a)]).unwrap(), RtValue::Float(9.0));
    assert_eq!(interp.call(function, &[RtValue::Ptr(b)]).unwrap(), RtValue::Float(12.0));
}

#[test]
#[should_panic(expected = "already registered")]
fn finalize_panics_when_two_classes_share_a_kind() {
    let ctx = context();
    let mut program = Module::new("program", &ctx);
    link_modules(&mut program, &shape_user(&ctx)).unwrap();
    link_modules(&mut program, &square_unit(&ctx)).unwrap();
    link_modules(&mut program, &circle_unit(&ctx)).unwrap();
    let interfaces = program.interfaces_from_abi(&ItaniumDecoder).unwrap();
    program.get_or_load_all_classes_from_abi(&ItaniumDecoder).unwrap();

    let _ = finalize_interfaces(&mut program, &interfaces, |_| 0);
}

#[test]
#[should_panic(expected = "already registered")]
fn inserting_a_kind_twice_panics() {
    let ctx = context();
    let mut m = square_unit(&ctx);
    let class = m.get_or_load_class_from_abi("Square", &ItaniumDecoder).unwrap().unwrap();
    let implementation = m.implementation(class).unwrap();
    let id = m.create_dispatcher(area_interface(&ctx)).unwrap();
    m.insert_implementation(id, 0, &implementation);
    m.insert_implementation(id, 0, &implementation);
}

#[test]
fn removed_dispatcher_takes_its_functions_along() {
    let ctx = context();
    let mut m = Module::new("m", &ctx);
    let interface = area_interface(&ctx);
    let id = m.create_dispatcher(Rc::clone(&interface)).unwrap();
    assert!(m.ir().get_function(ISHAPE_AREA).is_some());

    let mut removed = m.remove_dispatcher(id).unwrap().unwrap();
    assert!(removed.owner().is_none());
    assert!(m.ir().get_function(ISHAPE_AREA).is_none());
    assert_eq!(m.dispatcher_for(&interface), None);
    assert!(m.ir().metadata().named_or_empty(llair::records::DISPATCHER_LIST).is_empty());

    assert_eq!(removed.remove_implementation(3), Err(DispatcherError::RemovalUnsupported { kind: 3 }));
}

#[test]
fn dispatcher_in_use_cannot_be_removed() {
    let ctx = context();
    let mut m = Module::new("m", &ctx);
    let id = m.create_dispatcher(area_interface(&ctx)).unwrap();
    let dispatch = m.dispatcher(id).unwrap().methods()[0].function();

    let shape_ptr = ctx.ir().pointer_type(ishape(&ctx), 0);
    let caller_ty = ctx.ir().function_type(ctx.ir().void_type(), &[], false);
    let caller = m.ir_mut().add_function("caller", caller_ty, Linkage::External);
    let mut b = FunctionBuilder::new(m.ir_mut(), caller);
    let entry = b.create_block(None);
    b.position_at_end(entry);
    b.call(Value::function(dispatch), &[Value::Const(ir::Constant::Null(shape_ptr))], None);
    b.ret(None);

    let err = m.remove_dispatcher(id).unwrap_err();
    assert!(matches!(err, ModuleError::FunctionInUse(ref name) if name == ISHAPE_AREA));
    assert_eq!(m.dispatcher_count(), 1);
}

#[test]
fn unimplemented_interface_gets_no_dispatcher() {
    let ctx = context();
    let mut program = Module::new("program", &ctx);
    link_modules(&mut program, &shape_user(&ctx)).unwrap();
    let interfaces = program.interfaces_from_abi(&ItaniumDecoder).unwrap();

    let mut asked = 0;
    finalize_interfaces(&mut program, &interfaces, |_| {
        asked += 1;
        0
    })
    .unwrap();
    assert_eq!(asked, 0);
    assert_eq!(program.dispatcher_count(), 0);
    let area = program.ir().get_function(ISHAPE_AREA).unwrap();
    assert!(program.ir().function(area).is_declaration());
}
