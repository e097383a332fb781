//! Merging one module into another.
//!
//! Linking runs in two phases. Planning maps every source type into the
//! destination's type space and decides, symbol by symbol, whether a source
//! global binds to a destination global, fills a destination declaration or
//! is cloned. Malformed source records and type and symbol conflicts
//! surface during planning, before the destination is touched. Committing
//! then clones globals, bodies, initializers, aliases and named metadata.

mod finalize;
mod type_mapper;

pub use finalize::finalize_interfaces;
pub use type_mapper::canonical_name;

use ir::ir_hasher::HashMap;
use ir::{Constant, GlobalRef, InstData, MdNodeId, MdOperand, Value};
use tracing::{debug, info};

use crate::algorithm::for_each_intersection;
use crate::errors::LinkError;
use crate::module::Module;

use type_mapper::TypeMapper;

/// Section whose functions run as global constructors.
pub const STATIC_INIT_SECTION: &str = "air.static_init";
pub const STATIC_INIT_PRIORITY: u32 = 65535;

/// Named lists only the first writer contributes to.
pub const SINGLETON_LISTS: [&str; 6] = [
    "air.version",
    "air.language_version",
    "air.compile_options",
    "air.source_file_name",
    "llvm.ident",
    "llvm.module.flags",
];

/// What happens to one source global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    /// Uses the destination global as is.
    Bind(GlobalRef),
    /// Moves the source definition into a destination declaration.
    Fill(GlobalRef),
    Clone,
}

struct Plan {
    types: TypeMapper,
    resolutions: HashMap<GlobalRef, Resolution>,
}

/// Links source modules into one destination.
pub struct Linker<'a> {
    dst: &'a mut Module,
}

impl<'a> Linker<'a> {
    pub fn new(dst: &'a mut Module) -> Self {
        Self { dst }
    }

    /// Copies `src`'s globals and side table into the destination, then
    /// synchronizes the destination's objects with the merged side table.
    #[tracing::instrument(skip_all, fields(dst = %self.dst.name(), src = %src.name()))]
    pub fn link_module(&mut self, src: &Module) -> Result<(), LinkError> {
        src.check_records()?;
        let plan = self.plan(src.ir())?;
        let cloned = plan.resolutions.values().filter(|r| **r == Resolution::Clone).count();
        self.commit(src.ir(), plan)?;
        self.dst.sync_metadata()?;
        info!(
            cloned,
            classes = self.dst.class_count(),
            dispatchers = self.dst.dispatcher_count(),
            "linked module"
        );
        Ok(())
    }

    fn plan(&self, src: &ir::Module) -> Result<Plan, LinkError> {
        let dst = self.dst.ir();
        let mut types = TypeMapper::new(src, dst);
        for ty in src.referenced_types() {
            types.remap(ty)?;
        }

        let mut resolutions: HashMap<GlobalRef, Resolution> = HashMap::default();
        for (_, g) in src.global_values_by_name() {
            resolutions.insert(g, Resolution::Clone);
        }

        let mut same_named = Vec::new();
        for_each_intersection(
            src.global_values_by_name(),
            dst.global_values_by_name(),
            |a, b| a.0.cmp(b.0),
            |(name, s), (_, d)| same_named.push((name, s, d)),
        );
        for (name, s, d) in same_named {
            let resolution = resolve(src, dst, &mut types, name, s, d)?;
            debug!(symbol = name, ?resolution, "resolved");
            resolutions.insert(s, resolution);
        }
        Ok(Plan { types, resolutions })
    }

    fn commit(&mut self, src: &ir::Module, plan: Plan) -> Result<(), LinkError> {
        let Plan { mut types, resolutions } = plan;
        types.complete_opaque_structs();
        let dst = self.dst.ir_mut();
        let resolution = |g: GlobalRef| resolutions.get(&g).copied().unwrap_or(Resolution::Clone);

        let mut cloner = Cloner { src, types, values: HashMap::default(), nodes: HashMap::default() };

        // Globals first, so bodies, initializers and metadata can refer to
        // any of them.
        for (id, g) in src.globals() {
            let key = GlobalRef::Variable(id);
            let target = match resolution(key) {
                Resolution::Bind(d) | Resolution::Fill(d) => d,
                Resolution::Clone => {
                    let ty = cloner.types.remap(g.value_type)?;
                    let new = dst.add_global(g.name(), ty, g.linkage, None);
                    let ng = dst.global_mut(new);
                    ng.constant = g.constant;
                    ng.address_space = g.address_space;
                    ng.section = g.section.clone();
                    GlobalRef::Variable(new)
                }
            };
            cloner.values.insert(key, target);
        }
        for (id, f) in src.functions() {
            let key = GlobalRef::Function(id);
            let target = match resolution(key) {
                Resolution::Bind(d) | Resolution::Fill(d) => d,
                Resolution::Clone => {
                    let ty = cloner.types.remap(f.ty)?;
                    let new = dst.add_function(f.name(), ty, f.linkage);
                    let nf = dst.function_mut(new);
                    nf.section = f.section.clone();
                    nf.param_names = f.param_names.clone();
                    GlobalRef::Function(new)
                }
            };
            cloner.values.insert(key, target);
        }
        for (id, a) in src.aliases() {
            let ty = cloner.types.remap(a.value_type)?;
            let new = dst.add_alias(a.name(), ty, a.linkage, Constant::Undef(ty));
            dst.alias_mut(new).address_space = a.address_space;
            cloner.values.insert(GlobalRef::Alias(id), GlobalRef::Alias(new));
        }

        // Bodies.
        for (id, f) in src.functions() {
            if f.is_declaration() || matches!(resolution(GlobalRef::Function(id)), Resolution::Bind(_)) {
                continue;
            }
            let Some(target) = cloner.values[&GlobalRef::Function(id)].as_function() else {
                continue;
            };
            let (insts, blocks) = f.body();
            let insts = insts.iter().map(|data| cloner.inst(data)).collect::<Result<Vec<_>, _>>()?;
            let nf = dst.function_mut(target);
            nf.set_body(insts, blocks.to_vec());
            nf.linkage = f.linkage;
            nf.section = f.section.clone();
            nf.param_names = f.param_names.clone();
            if f.section.as_deref() == Some(STATIC_INIT_SECTION) {
                dst.add_global_ctor(STATIC_INIT_PRIORITY, target);
            }
        }

        // Initializers.
        for (id, g) in src.globals() {
            let Some(init) = &g.initializer else {
                continue;
            };
            if matches!(resolution(GlobalRef::Variable(id)), Resolution::Bind(_)) {
                continue;
            }
            let GlobalRef::Variable(target) = cloner.values[&GlobalRef::Variable(id)] else {
                continue;
            };
            let init = cloner.constant(init)?;
            let ng = dst.global_mut(target);
            ng.initializer = Some(init);
            ng.linkage = g.linkage;
            ng.constant = g.constant;
        }

        for (id, a) in src.aliases() {
            let GlobalRef::Alias(target) = cloner.values[&GlobalRef::Alias(id)] else {
                continue;
            };
            let aliasee = cloner.constant(&a.aliasee)?;
            dst.alias_mut(target).aliasee = aliasee;
        }

        // Named metadata.
        for list in src.metadata().named_lists() {
            let singleton = SINGLETON_LISTS.contains(&list.name.as_str());
            if singleton && !dst.metadata().named_or_empty(&list.name).is_empty() {
                continue;
            }
            let mut copied = Vec::with_capacity(list.nodes.len());
            for &node in &list.nodes {
                copied.push(cloner.node(dst, node)?);
            }
            dst.metadata_mut().get_or_insert_named(&list.name).extend(copied);
        }
        Ok(())
    }
}

/// Links `src` into `dst`; `dst` is synchronized afterwards.
pub fn link_modules(dst: &mut Module, src: &Module) -> Result<(), LinkError> {
    Linker::new(dst).link_module(src)
}

fn resolve(
    src: &ir::Module,
    dst: &ir::Module,
    types: &mut TypeMapper,
    name: &str,
    s: GlobalRef,
    d: GlobalRef,
) -> Result<Resolution, LinkError> {
    if matches!(s, GlobalRef::Alias(_)) || src.linkage(s).is_local() || dst.linkage(d).is_local() {
        return Ok(Resolution::Clone);
    }
    if s.kind_name() != d.kind_name() {
        return Err(LinkError::SymbolKindMismatch { name: name.to_owned(), src: s.kind_name(), dst: d.kind_name() });
    }
    let src_ty = types.remap(src.global_value_type(s))?;
    let dst_ty = dst.global_value_type(d);
    if src_ty != dst_ty {
        let ctx = dst.context();
        return Err(LinkError::SignatureMismatch {
            name: name.to_owned(),
            src: ctx.type_name(src_ty),
            dst: ctx.type_name(dst_ty),
        });
    }

    let src_strong = src.is_strong_definition_for_linker(s);
    if src.is_declaration_for_linker(s) {
        Ok(Resolution::Bind(d))
    } else if dst.is_declaration_for_linker(d) || (src_strong && dst.linkage(d).is_overridable()) {
        Ok(Resolution::Fill(d))
    } else if src_strong && dst.is_strong_definition_for_linker(d) {
        Err(LinkError::DuplicateDefinition(name.to_owned()))
    } else {
        Ok(Resolution::Bind(d))
    }
}

/// Rewrites source entities in terms of the destination.
struct Cloner<'s> {
    src: &'s ir::Module,
    types: TypeMapper,
    values: HashMap<GlobalRef, GlobalRef>,
    nodes: HashMap<MdNodeId, MdNodeId>,
}

impl Cloner<'_> {
    fn constant(&mut self, c: &Constant) -> Result<Constant, LinkError> {
        Ok(match c {
            Constant::Int { ty, value } => Constant::Int { ty: self.types.remap(*ty)?, value: *value },
            Constant::Float { ty, value } => Constant::Float { ty: self.types.remap(*ty)?, value: *value },
            Constant::Null(ty) => Constant::Null(self.types.remap(*ty)?),
            Constant::Undef(ty) => Constant::Undef(self.types.remap(*ty)?),
            Constant::Zero(ty) => Constant::Zero(self.types.remap(*ty)?),
            Constant::Aggregate { ty, elements } => Constant::Aggregate {
                ty: self.types.remap(*ty)?,
                elements: elements.iter().map(|e| self.constant(e)).collect::<Result<_, _>>()?,
            },
            Constant::Global(g) => Constant::Global(
                *self
                    .values
                    .get(g)
                    .ok_or_else(|| LinkError::UnmappedValue(self.src.global_name(*g).to_owned()))?,
            ),
        })
    }

    fn inst(&mut self, data: &InstData) -> Result<InstData, LinkError> {
        let mut data = data.clone();
        data.ty = self.types.remap(data.ty)?;
        for op in data.inst.operands_mut() {
            if let Value::Const(c) = op {
                *c = self.constant(c)?;
            }
        }
        Ok(data)
    }

    /// Copies a node once; shared sub-records stay shared.
    fn node(&mut self, dst: &mut ir::Module, id: MdNodeId) -> Result<MdNodeId, LinkError> {
        if let Some(&copied) = self.nodes.get(&id) {
            return Ok(copied);
        }
        let copy = dst.metadata_mut().create_node(Vec::new());
        self.nodes.insert(id, copy);

        let operands = match self.src.metadata().node(id) {
            Some(node) => node.operands.clone(),
            None => Vec::new(),
        };
        let mut mapped = Vec::with_capacity(operands.len());
        for op in operands {
            mapped.push(match op {
                MdOperand::Type(t) => MdOperand::Type(self.types.remap(t)?),
                MdOperand::Value(c) => MdOperand::Value(self.constant(&c)?),
                MdOperand::Node(n) => MdOperand::Node(self.node(dst, n)?),
                other => other,
            });
        }
        if let Some(node) = dst.metadata_mut().node_mut(copy) {
            node.operands = mapped;
        }
        Ok(copy)
    }
}
