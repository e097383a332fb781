//! An IR module plus the classes, dispatchers and entry points it owns.
//!
//! Membership in one of the module's containers is the only source of truth
//! for ownership. Inserting an object attaches it (owner, side-table record,
//! layout facts); removing it detaches it and drops its record from the
//! named list. The side table is a write-through mirror of the containers,
//! and [`Module::sync_metadata`] rebuilds the containers from it after the
//! IR module was produced elsewhere or merged into.

use std::fmt;
use std::rc::Rc;

use enum_ordinalize::Ordinalize;
use ir::ir_hasher::HashMap;
use ir::{FuncId, MdNodeId, SymbolTable, TypeId};
use tracing::debug;

use crate::algorithm::for_each_symmetric_difference;
use crate::class::{Class, ClassLayout, Implementation};
use crate::config::{Language, Version};
use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::entry_point::{EntryPoint, EntryPointArgument, EntryPointKind};
use crate::errors::{ModuleError, RecordError};
use crate::interface::{Interface, InterfaceId};
use crate::members::Members;
use crate::records::{self, ClassRecord, CLASS_LIST, DISPATCHER_LIST};

/// Identity of a [`Module`] within its context; recorded as object owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) u32);

macro_rules! member_id {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u32);
        )*
    };
}

member_id!(ClassId, DispatcherId, EntryPointId);

pub struct Module {
    id: ModuleId,
    context: Rc<Context>,
    ir: ir::Module,
    classes: Members<Class>,
    class_symbols: SymbolTable<ClassId>,
    dispatchers: Members<Dispatcher>,
    dispatchers_by_interface: HashMap<InterfaceId, DispatcherId>,
    entry_points: Members<EntryPoint>,
}

impl Module {
    /// An empty module stamped with the context's version and language.
    pub fn new(name: impl Into<String>, context: &Rc<Context>) -> Self {
        let mut ir = ir::Module::new(name, Rc::clone(context.ir()));
        records::write_version(ir.metadata_mut(), context.config().version);
        records::write_language(ir.metadata_mut(), &context.config().language);
        Self::wrap(context, ir)
    }

    /// Adopts an IR module built on `context`'s type space and loads every
    /// object its side table describes.
    pub fn from_ir(context: &Rc<Context>, ir: ir::Module) -> Result<Self, ModuleError> {
        if !Rc::ptr_eq(ir.context(), context.ir()) {
            return Err(ModuleError::ContextMismatch);
        }
        let mut module = Self::wrap(context, ir);
        module.sync_metadata()?;
        Ok(module)
    }

    fn wrap(context: &Rc<Context>, ir: ir::Module) -> Self {
        Self {
            id: context.next_module_id(),
            context: Rc::clone(context),
            ir,
            classes: Members::default(),
            class_symbols: SymbolTable::new(),
            dispatchers: Members::default(),
            dispatchers_by_interface: HashMap::default(),
            entry_points: Members::default(),
        }
    }

    /// Releases the IR module; side-table records stay in place.
    pub fn into_ir(self) -> ir::Module {
        self.ir
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn context(&self) -> &Rc<Context> {
        &self.context
    }

    pub fn name(&self) -> &str {
        self.ir.name()
    }

    pub fn ir(&self) -> &ir::Module {
        &self.ir
    }

    pub fn ir_mut(&mut self) -> &mut ir::Module {
        &mut self.ir
    }

    pub fn version(&self) -> Result<Option<Version>, RecordError> {
        records::read_version(&self.ir)
    }

    pub fn set_version(&mut self, version: Version) {
        records::write_version(self.ir.metadata_mut(), version);
    }

    pub fn language(&self) -> Result<Option<Language>, RecordError> {
        records::read_language(&self.ir)
    }

    pub fn set_language(&mut self, language: &Language) {
        records::write_language(self.ir.metadata_mut(), language);
    }

    // =====================================================
    // Classes
    // =====================================================

    pub fn create_class(
        &mut self,
        ty: TypeId,
        names: &[impl AsRef<str>],
        functions: &[FuncId],
        name: impl Into<String>,
    ) -> ClassId {
        let class = Class::new(&self.context, ty, names, functions, name);
        self.insert_class(class)
    }

    /// Takes ownership of a detached class. A taken name is uniqued.
    pub fn insert_class(&mut self, class: Class) -> ClassId {
        self.attach_class(class, None)
    }

    fn attach_class(&mut self, mut class: Class, record: Option<MdNodeId>) -> ClassId {
        assert!(class.owner().is_none(), "class {} already has an owner", class.name());
        let id = ClassId(self.classes.next_id());
        let unique = self.class_symbols.insert_unique(class.name(), id);
        let renamed = !unique.is_empty() && unique != class.name();
        if renamed {
            class.set_name(unique);
        }

        let md = self.ir.metadata_mut();
        let node = match record {
            Some(node) => {
                if renamed {
                    ClassRecord::rename(md, node, class.name());
                }
                node
            }
            None => {
                let node = class.to_record().encode(md);
                md.push_named(CLASS_LIST, node);
                node
            }
        };
        let layout = ClassLayout::compute(self.ir.context(), class.ty());
        class.attach(self.id, node, layout);
        debug!(module = self.name(), class = class.name(), "attached class");
        let inserted = self.classes.insert(class);
        debug_assert_eq!(inserted, id.0);
        id
    }

    pub fn remove_class(&mut self, id: ClassId) -> Option<Class> {
        let mut class = self.classes.remove(id.0)?;
        if self.class_symbols.lookup(class.name()) == Some(id) {
            self.class_symbols.remove(class.name());
        }
        if let Some(node) = class.record() {
            self.ir.metadata_mut().remove_from_named(CLASS_LIST, node);
        }
        class.detach();
        Some(class)
    }

    pub fn class(&self, id: ClassId) -> Option<&Class> {
        self.classes.get(id.0)
    }

    pub fn get_class(&self, name: &str) -> Option<ClassId> {
        self.class_symbols.lookup(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &Class)> {
        self.classes.iter().map(|(k, c)| (ClassId(k), c))
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// The class as a dispatcher in any module on this context can use it.
    pub fn implementation(&self, id: ClassId) -> Option<Implementation> {
        self.class(id).map(|c| c.implementation(&self.ir))
    }

    // =====================================================
    // Dispatchers
    // =====================================================

    /// Emits dispatch functions for `interface` and takes ownership of them.
    pub fn create_dispatcher(&mut self, interface: Rc<Interface>) -> Result<DispatcherId, ModuleError> {
        let dispatcher = Dispatcher::emit(&mut self.ir, interface)?;
        Ok(self.attach_dispatcher(dispatcher, None))
    }

    pub fn get_or_insert_dispatcher(&mut self, interface: Rc<Interface>) -> Result<DispatcherId, ModuleError> {
        match self.dispatcher_for(&interface) {
            Some(id) => Ok(id),
            None => self.create_dispatcher(interface),
        }
    }

    fn attach_dispatcher(&mut self, mut dispatcher: Dispatcher, record: Option<MdNodeId>) -> DispatcherId {
        assert!(dispatcher.owner().is_none(), "dispatcher already has an owner");
        let node = record.unwrap_or_else(|| {
            let md = self.ir.metadata_mut();
            let node = dispatcher.to_record().encode(md);
            md.push_named(DISPATCHER_LIST, node);
            node
        });
        dispatcher.attach(self.id, node);
        let interface = dispatcher.interface().id();
        debug!(module = self.name(), methods = dispatcher.methods().len(), "attached dispatcher");
        let id = DispatcherId(self.dispatchers.insert(dispatcher));
        self.dispatchers_by_interface.entry(interface).or_insert(id);
        id
    }

    pub fn dispatcher(&self, id: DispatcherId) -> Option<&Dispatcher> {
        self.dispatchers.get(id.0)
    }

    pub fn dispatcher_for(&self, interface: &Interface) -> Option<DispatcherId> {
        self.dispatchers_by_interface.get(&interface.id()).copied()
    }

    pub fn dispatchers(&self) -> impl Iterator<Item = (DispatcherId, &Dispatcher)> {
        self.dispatchers.iter().map(|(k, d)| (DispatcherId(k), d))
    }

    pub fn dispatcher_count(&self) -> usize {
        self.dispatchers.len()
    }

    /// Registers `class` under `kind` with dispatcher `id`.
    ///
    /// Panics if `id` is not in this module or the insertion preconditions
    /// of [`Dispatcher::insert_implementation`] do not hold.
    pub fn insert_implementation(&mut self, id: DispatcherId, kind: u32, class: &Implementation) {
        let Some(dispatcher) = self.dispatchers.get_mut(id.0) else {
            panic!("stale dispatcher handle {id:?}");
        };
        dispatcher.insert_implementation(&mut self.ir, kind, class);
    }

    /// Removes a dispatcher and its dispatch functions. Fails without
    /// changes if any dispatch function still has a use.
    pub fn remove_dispatcher(&mut self, id: DispatcherId) -> Result<Option<Dispatcher>, ModuleError> {
        let Some(dispatcher) = self.dispatchers.get(id.0) else {
            return Ok(None);
        };
        for m in dispatcher.methods() {
            if self.ir.function_use_count(m.function()) != 0 {
                return Err(ModuleError::FunctionInUse(self.ir.function(m.function()).name().to_owned()));
            }
        }

        let Some(mut dispatcher) = self.dispatchers.remove(id.0) else {
            return Ok(None);
        };
        for m in dispatcher.methods() {
            self.ir.remove_function(m.function());
        }
        if let Some(node) = dispatcher.record() {
            self.ir.metadata_mut().remove_from_named(DISPATCHER_LIST, node);
        }
        let interface = dispatcher.interface().id();
        if self.dispatchers_by_interface.get(&interface) == Some(&id) {
            self.dispatchers_by_interface.remove(&interface);
        }
        dispatcher.detach();
        Ok(Some(dispatcher))
    }

    // =====================================================
    // Entry points
    // =====================================================

    pub fn create_entry_point(
        &mut self,
        kind: EntryPointKind,
        function: FuncId,
        arguments: Vec<EntryPointArgument>,
    ) -> EntryPointId {
        self.insert_entry_point(EntryPoint::new(kind, function, arguments))
    }

    pub fn insert_entry_point(&mut self, entry_point: EntryPoint) -> EntryPointId {
        self.attach_entry_point(entry_point, None)
    }

    fn attach_entry_point(&mut self, mut entry_point: EntryPoint, record: Option<MdNodeId>) -> EntryPointId {
        assert!(entry_point.owner().is_none(), "entry point already has an owner");
        let node = record.unwrap_or_else(|| {
            let md = self.ir.metadata_mut();
            let node = entry_point.to_record().encode(md);
            md.push_named(entry_point.kind().metadata_name(), node);
            node
        });
        entry_point.attach(self.id, node);
        debug!(module = self.name(), kind = ?entry_point.kind(), "attached entry point");
        EntryPointId(self.entry_points.insert(entry_point))
    }

    pub fn remove_entry_point(&mut self, id: EntryPointId) -> Option<EntryPoint> {
        let mut entry_point = self.entry_points.remove(id.0)?;
        if let Some(node) = entry_point.record() {
            self.ir.metadata_mut().remove_from_named(entry_point.kind().metadata_name(), node);
        }
        entry_point.detach();
        Some(entry_point)
    }

    pub fn entry_point(&self, id: EntryPointId) -> Option<&EntryPoint> {
        self.entry_points.get(id.0)
    }

    /// Entry point whose function is called `name`.
    pub fn get_entry_point(&self, name: &str) -> Option<EntryPointId> {
        let function = self.ir.get_function(name)?;
        self.entry_points
            .iter()
            .find(|(_, e)| e.function() == function)
            .map(|(k, _)| EntryPointId(k))
    }

    pub fn entry_points(&self) -> impl Iterator<Item = (EntryPointId, &EntryPoint)> {
        self.entry_points.iter().map(|(k, e)| (EntryPointId(k), e))
    }

    // =====================================================
    // Side-table synchronization
    // =====================================================

    /// Decodes every listed class, dispatcher and entry point record
    /// without attaching anything.
    pub(crate) fn check_records(&self) -> Result<(), RecordError> {
        let md = self.ir.metadata();
        for &node in md.named_or_empty(CLASS_LIST) {
            ClassRecord::decode(&self.ir, node)?;
        }
        for &node in md.named_or_empty(DISPATCHER_LIST) {
            Dispatcher::from_record(&self.context, &self.ir, node)?;
        }
        for kind in EntryPointKind::VARIANTS.iter().copied() {
            for &node in md.named_or_empty(kind.metadata_name()) {
                EntryPoint::from_record(&self.context, &self.ir, kind, node)?;
            }
        }
        Ok(())
    }

    /// Materializes a wrapper for every persisted record no member owns.
    ///
    /// Members whose record is already listed, and members created here
    /// (their records were attached on insertion), are left alone. All
    /// missing records are decoded before any wrapper is attached, so a
    /// malformed record leaves the module unchanged.
    pub fn sync_metadata(&mut self) -> Result<(), ModuleError> {
        let md = self.ir.metadata();

        let mut owned: Vec<MdNodeId> = self.classes.iter().filter_map(|(_, c)| c.record()).collect();
        let classes = missing_records(md.named_or_empty(CLASS_LIST), &mut owned)
            .into_iter()
            .map(|node| Ok((Class::from_record(ClassRecord::decode(&self.ir, node)?), node)))
            .collect::<Result<Vec<_>, RecordError>>()?;

        let mut owned: Vec<MdNodeId> = self.dispatchers.iter().filter_map(|(_, d)| d.record()).collect();
        let dispatchers = missing_records(md.named_or_empty(DISPATCHER_LIST), &mut owned)
            .into_iter()
            .map(|node| Ok((Dispatcher::from_record(&self.context, &self.ir, node)?, node)))
            .collect::<Result<Vec<_>, RecordError>>()?;

        let mut entry_points = Vec::new();
        for kind in EntryPointKind::VARIANTS.iter().copied() {
            let mut owned: Vec<MdNodeId> = self
                .entry_points
                .iter()
                .filter(|(_, e)| e.kind() == kind)
                .filter_map(|(_, e)| e.record())
                .collect();
            for node in missing_records(md.named_or_empty(kind.metadata_name()), &mut owned) {
                entry_points.push((EntryPoint::from_record(&self.context, &self.ir, kind, node)?, node));
            }
        }

        if classes.is_empty() && dispatchers.is_empty() && entry_points.is_empty() {
            return Ok(());
        }
        debug!(
            module = self.name(),
            classes = classes.len(),
            dispatchers = dispatchers.len(),
            entry_points = entry_points.len(),
            "materializing side-table records"
        );
        for (class, node) in classes {
            self.attach_class(class, Some(node));
        }
        for (dispatcher, node) in dispatchers {
            self.attach_dispatcher(dispatcher, Some(node));
        }
        for (entry_point, node) in entry_points {
            self.attach_entry_point(entry_point, Some(node));
        }
        Ok(())
    }
}

/// Records of `listed` that no member owns, in record order.
fn missing_records(listed: &[MdNodeId], owned: &mut Vec<MdNodeId>) -> Vec<MdNodeId> {
    let mut listed = listed.to_vec();
    listed.sort_unstable();
    listed.dedup();
    owned.sort_unstable();

    let mut missing = Vec::new();
    for_each_symmetric_difference(listed, owned.iter().copied(), |a, b| a.cmp(b), |node| missing.push(node), |_| {});
    missing
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ctx = self.ir.context();
        for (_, class) in self.classes() {
            writeln!(f, "; {}", class.display(&self.ir))?;
        }
        for (_, dispatcher) in self.dispatchers() {
            writeln!(f, "; {}", dispatcher.display(ctx))?;
        }
        write!(f, "{}", self.ir)
    }
}
