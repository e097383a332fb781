// Symbol resolution, type merging and side-table merging across modules.

mod common;

use std::rc::Rc;

use common::*;
use ir::{Constant, Linkage, MdOperand};
use llair::linker::{STATIC_INIT_PRIORITY, STATIC_INIT_SECTION};
use llair::records::CLASS_LIST;
use llair::{
    Config, Context, ItaniumDecoder, LinkError, Module, RecordError, Version, canonical_name, link_modules,
};

fn vec3_unit(ctx: &Rc<Context>, name: &str, fields: usize) -> Module {
    let mut m = Module::new(name, ctx);
    let ir = Rc::clone(ctx.ir());
    let float = ir.float_type();
    let vec3 = ir.named_struct_type("struct.Vec3", &vec![float; fields], false);
    m.ir_mut().add_global(name, vec3, Linkage::External, Some(Constant::Zero(vec3)));
    m
}

fn vec3_types(m: &Module) -> Vec<String> {
    let ir = m.ir().context();
    m.ir()
        .identified_struct_types()
        .into_iter()
        .filter_map(|t| ir.struct_name(t))
        .filter(|n| canonical_name(n) == "Vec3")
        .collect()
}

#[test]
fn same_named_structs_merge_into_one() {
    let ctx = context();
    let a = vec3_unit(&ctx, "a", 3);
    let b = vec3_unit(&ctx, "b", 3);
    let (_, b_global) = b.ir().globals().next().unwrap();
    assert_eq!(ctx.ir().struct_name(b_global.value_type).as_deref(), Some("struct.Vec3.1"));

    let mut program = Module::new("program", &ctx);
    link_modules(&mut program, &a).unwrap();
    link_modules(&mut program, &b).unwrap();

    assert_eq!(vec3_types(&program), vec!["struct.Vec3"]);
    let types: Vec<_> = program.ir().globals().map(|(_, g)| g.value_type).collect();
    assert_eq!(types.len(), 2);
    assert_eq!(types[0], types[1]);
}

#[test]
fn conflicting_struct_bodies_are_rejected_before_any_change() {
    let ctx = context();
    let mut program = Module::new("program", &ctx);
    link_modules(&mut program, &vec3_unit(&ctx, "a", 3)).unwrap();

    let err = link_modules(&mut program, &vec3_unit(&ctx, "flat", 2)).unwrap_err();
    assert!(matches!(err, LinkError::IncompatibleType { .. }), "{err}");
    assert_eq!(program.ir().globals().count(), 1);
}

#[test]
fn malformed_records_are_rejected_before_any_change() {
    let ctx = context();
    let mut program = Module::new("program", &ctx);
    let mut unit = Module::new("unit", &ctx);
    void_function(&mut unit, "helper", Linkage::External, true);
    let md = unit.ir_mut().metadata_mut();
    let bogus = md.create_node(vec![MdOperand::string("Broken")]);
    md.push_named(CLASS_LIST, bogus);

    let err = link_modules(&mut program, &unit).unwrap_err();
    assert!(matches!(err, LinkError::Record(RecordError::Arity { expected: 3, found: 1, .. })), "{err}");
    assert!(program.ir().get_function("helper").is_none());
    assert!(program.ir().metadata().named_or_empty(CLASS_LIST).is_empty());

    // The destination stays usable.
    link_modules(&mut program, &Module::new("clean", &ctx)).unwrap();
    program.sync_metadata().unwrap();
}

#[test]
fn declaration_binds_to_the_existing_definition() {
    let ctx = context();
    let mut program = Module::new("program", &ctx);
    void_function(&mut program, "f", Linkage::External, true);
    let mut user = Module::new("user", &ctx);
    void_function(&mut user, "f", Linkage::External, false);

    link_modules(&mut program, &user).unwrap();
    assert_eq!(program.ir().functions().count(), 1);
    assert!(!program.ir().function(program.ir().get_function("f").unwrap()).is_declaration());
}

#[test]
fn definition_fills_an_existing_declaration() {
    let ctx = context();
    let mut program = Module::new("program", &ctx);
    let f = void_function(&mut program, "f", Linkage::External, false);
    let mut unit = Module::new("unit", &ctx);
    void_function(&mut unit, "f", Linkage::External, true);

    link_modules(&mut program, &unit).unwrap();
    assert_eq!(program.ir().get_function("f"), Some(f));
    assert!(!program.ir().function(f).is_declaration());
}

#[test]
fn strong_definition_replaces_a_weak_one() {
    let ctx = context();
    let mut program = Module::new("program", &ctx);
    let f = void_function(&mut program, "f", Linkage::Weak, true);
    let mut unit = Module::new("unit", &ctx);
    void_function(&mut unit, "f", Linkage::External, true);

    link_modules(&mut program, &unit).unwrap();
    assert_eq!(program.ir().function(f).linkage, Linkage::External);
}

#[test]
fn two_strong_definitions_collide() {
    let ctx = context();
    let mut program = Module::new("program", &ctx);
    void_function(&mut program, "f", Linkage::External, true);
    let mut unit = Module::new("unit", &ctx);
    void_function(&mut unit, "f", Linkage::External, true);
    void_function(&mut unit, "g", Linkage::External, true);

    let err = link_modules(&mut program, &unit).unwrap_err();
    assert!(matches!(err, LinkError::DuplicateDefinition(ref name) if name == "f"));
    assert!(program.ir().get_function("g").is_none());
}

#[test]
fn mismatched_signatures_are_rejected() {
    let ctx = context();
    let mut program = Module::new("program", &ctx);
    void_function(&mut program, "f", Linkage::External, true);
    let mut unit = Module::new("unit", &ctx);
    let i32_fn = ctx.ir().function_type(ctx.ir().i32_type(), &[], false);
    unit.ir_mut().add_function("f", i32_fn, Linkage::External);

    let err = link_modules(&mut program, &unit).unwrap_err();
    let LinkError::SignatureMismatch { name, src, dst } = err else {
        panic!("unexpected error {err}");
    };
    assert_eq!(name, "f");
    assert_ne!(src, dst);
}

#[test]
fn function_and_variable_cannot_share_a_name() {
    let ctx = context();
    let mut program = Module::new("program", &ctx);
    void_function(&mut program, "x", Linkage::External, true);
    let unit = vec3_unit(&ctx, "x", 3);

    let err = link_modules(&mut program, &unit).unwrap_err();
    assert!(matches!(err, LinkError::SymbolKindMismatch { src: "global variable", dst: "function", .. }), "{err}");
}

#[test]
fn local_symbols_are_kept_apart() {
    let ctx = context();
    let mut program = Module::new("program", &ctx);
    void_function(&mut program, "helper", Linkage::Internal, true);
    let mut unit = Module::new("unit", &ctx);
    void_function(&mut unit, "helper", Linkage::Internal, true);

    link_modules(&mut program, &unit).unwrap();
    let mut names: Vec<_> = program.ir().functions().map(|(_, f)| f.name().to_owned()).collect();
    names.sort();
    assert_eq!(names, vec!["helper", "helper.1"]);
}

#[test]
fn static_initializers_become_constructors() {
    let ctx = context();
    let mut unit = Module::new("unit", &ctx);
    let init = void_function(&mut unit, "init_globals", Linkage::Internal, true);
    unit.ir_mut().function_mut(init).section = Some(STATIC_INIT_SECTION.to_owned());

    let mut program = Module::new("program", &ctx);
    link_modules(&mut program, &unit).unwrap();

    let ctors = program.ir().global_ctors();
    assert_eq!(ctors.len(), 1);
    assert_eq!(ctors[0].priority, STATIC_INIT_PRIORITY);
    let f = program.ir().get_function("init_globals").unwrap();
    assert_eq!(ctors[0].function, Constant::function(f));
}

#[test]
fn singleton_lists_keep_the_first_writer() {
    let ctx = context();
    let mut program = Module::new("program", &ctx);

    let newer = Context::new(Config::default().with_version(Version::new(9, 9, 9)));
    for name in ["one", "two"] {
        let mut unit = Module::new(name, &newer);
        let md = unit.ir_mut().metadata_mut();
        let ident = md.create_node(vec![MdOperand::string(format!("compiler {name}"))]);
        md.push_named("llvm.ident", ident);
        let note = md.create_node(vec![MdOperand::string(name)]);
        md.push_named("notes", note);
        link_modules(&mut program, &unit).unwrap();
    }

    let md = program.ir().metadata();
    assert_eq!(program.version().unwrap(), Some(ctx.config().version));
    assert_eq!(md.named_or_empty("llvm.ident").len(), 1);
    assert_eq!(md.named_or_empty("notes").len(), 2);
}

#[test]
fn classes_move_between_contexts() -> anyhow::Result<()> {
    let ctx = context();
    let other = context();
    let mut unit = square_unit(&other);
    unit.get_or_load_all_classes_from_abi(&ItaniumDecoder)?;

    let mut program = Module::new("program", &ctx);
    link_modules(&mut program, &unit)?;

    let id = program.get_class("Square").unwrap();
    let class = program.class(id).unwrap();
    assert_eq!(class.owner(), Some(program.id()));
    assert_eq!(ctx.ir().struct_name(class.ty()).as_deref(), Some("class.Square"));
    let method = program.ir().function(class.methods()[0].function());
    assert_eq!(method.name(), SQUARE_AREA);
    assert!(!method.is_declaration());
    Ok(())
}

#[test]
fn same_class_from_two_units_is_uniqued() -> anyhow::Result<()> {
    let ctx = context();
    let mut a = square_unit(&ctx);
    a.get_or_load_all_classes_from_abi(&ItaniumDecoder)?;
    let mut b = area_class(&ctx, "Square", "_ZNK6Square5otherEv", 2.0);
    b.get_or_load_all_classes_from_abi(&ItaniumDecoder)?;

    let mut program = Module::new("program", &ctx);
    link_modules(&mut program, &a)?;
    link_modules(&mut program, &b)?;
    assert_eq!(program.class_count(), 2);
    let mut names: Vec<_> = program.classes().map(|(_, c)| c.name().to_owned()).collect();
    names.sort();
    assert_eq!(names[0], "Square");
    assert_ne!(names[1], "Square");
    Ok(())
}
