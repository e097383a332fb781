use std::rc::Rc;

use crate::context::Context;
use crate::function::{Function, Linkage};
use crate::global::{GlobalAlias, GlobalCtor, GlobalVariable};
use crate::layout::DataLayout;
use crate::metadata::{MdOperand, MetadataTable};
use crate::symbol_table::SymbolTable;
use crate::types::{Type, TypeId};
use crate::value::{AliasId, Constant, FuncId, GlobalId, GlobalRef, Value};

/// A compilation unit: functions, globals, aliases and side-table metadata,
/// all typed against a shared [`Context`].
pub struct Module {
    context: Rc<Context>,
    name: String,
    pub data_layout: DataLayout,
    pub target_triple: String,
    functions: Vec<Option<Function>>,
    globals: Vec<Option<GlobalVariable>>,
    aliases: Vec<Option<GlobalAlias>>,
    symbols: SymbolTable<GlobalRef>,
    metadata: MetadataTable,
    global_ctors: Vec<GlobalCtor>,
}

impl Module {
    pub fn new(name: impl Into<String>, context: Rc<Context>) -> Self {
        let data_layout = context.data_layout();
        let target_triple = context.target_triple().to_owned();
        Self {
            context,
            name: name.into(),
            data_layout,
            target_triple,
            functions: Vec::new(),
            globals: Vec::new(),
            aliases: Vec::new(),
            symbols: SymbolTable::new(),
            metadata: MetadataTable::default(),
            global_ctors: Vec::new(),
        }
    }

    pub fn context(&self) -> &Rc<Context> {
        &self.context
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &MetadataTable {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut MetadataTable {
        &mut self.metadata
    }

    pub fn global_ctors(&self) -> &[GlobalCtor] {
        &self.global_ctors
    }

    pub fn add_global_ctor(&mut self, priority: u32, function: FuncId) {
        self.global_ctors.push(GlobalCtor { priority, function: Constant::function(function) });
    }

    // =====================================================
    // Functions
    // =====================================================

    /// Adds a function; a taken name is uniqued.
    pub fn add_function(&mut self, name: &str, ty: TypeId, linkage: Linkage) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        let unique = self.symbols.insert_unique(name, GlobalRef::Function(id));
        self.functions.push(Some(Function::new(unique, ty, linkage)));
        id
    }

    /// Panics if `id` was removed.
    pub fn function(&self, id: FuncId) -> &Function {
        match self.functions.get(id.index()) {
            Some(Some(f)) => f,
            _ => panic!("stale function handle {id:?}"),
        }
    }

    /// Panics if `id` was removed.
    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        match self.functions.get_mut(id.index()) {
            Some(Some(f)) => f,
            _ => panic!("stale function handle {id:?}"),
        }
    }

    pub fn try_function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.index()).and_then(Option::as_ref)
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.as_ref().map(|f| (FuncId(i as u32), f)))
    }

    pub fn get_function(&self, name: &str) -> Option<FuncId> {
        self.symbols.lookup(name).and_then(GlobalRef::as_function)
    }

    /// Returns the function called `name`, declaring it with `ty` if absent.
    pub fn get_or_insert_function(&mut self, name: &str, ty: TypeId) -> FuncId {
        match self.get_function(name) {
            Some(id) => id,
            None => self.add_function(name, ty, Linkage::External),
        }
    }

    pub fn remove_function(&mut self, id: FuncId) -> Option<Function> {
        let f = self.functions.get_mut(id.index())?.take()?;
        if self.symbols.lookup(&f.name) == Some(GlobalRef::Function(id)) {
            self.symbols.remove(&f.name);
        }
        Some(f)
    }

    // =====================================================
    // Global variables and aliases
    // =====================================================

    pub fn add_global(
        &mut self,
        name: &str,
        value_type: TypeId,
        linkage: Linkage,
        initializer: Option<Constant>,
    ) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        let unique = self.symbols.insert_unique(name, GlobalRef::Variable(id));
        self.globals.push(Some(GlobalVariable {
            name: unique,
            value_type,
            constant: false,
            linkage,
            initializer,
            address_space: 0,
            section: None,
        }));
        id
    }

    /// Panics if `id` was removed.
    pub fn global(&self, id: GlobalId) -> &GlobalVariable {
        match self.globals.get(id.index()) {
            Some(Some(g)) => g,
            _ => panic!("stale global handle {id:?}"),
        }
    }

    /// Panics if `id` was removed.
    pub fn global_mut(&mut self, id: GlobalId) -> &mut GlobalVariable {
        match self.globals.get_mut(id.index()) {
            Some(Some(g)) => g,
            _ => panic!("stale global handle {id:?}"),
        }
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &GlobalVariable)> {
        self.globals
            .iter()
            .enumerate()
            .filter_map(|(i, g)| g.as_ref().map(|g| (GlobalId(i as u32), g)))
    }

    pub fn add_alias(&mut self, name: &str, value_type: TypeId, linkage: Linkage, aliasee: Constant) -> AliasId {
        let id = AliasId(self.aliases.len() as u32);
        let unique = self.symbols.insert_unique(name, GlobalRef::Alias(id));
        self.aliases.push(Some(GlobalAlias { name: unique, value_type, linkage, address_space: 0, aliasee }));
        id
    }

    /// Panics if `id` was removed.
    pub fn alias(&self, id: AliasId) -> &GlobalAlias {
        match self.aliases.get(id.index()) {
            Some(Some(a)) => a,
            _ => panic!("stale alias handle {id:?}"),
        }
    }

    /// Panics if `id` was removed.
    pub fn alias_mut(&mut self, id: AliasId) -> &mut GlobalAlias {
        match self.aliases.get_mut(id.index()) {
            Some(Some(a)) => a,
            _ => panic!("stale alias handle {id:?}"),
        }
    }

    pub fn aliases(&self) -> impl Iterator<Item = (AliasId, &GlobalAlias)> {
        self.aliases
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.as_ref().map(|a| (AliasId(i as u32), a)))
    }

    // =====================================================
    // Global values
    // =====================================================

    pub fn named_value(&self, name: &str) -> Option<GlobalRef> {
        self.symbols.lookup(name)
    }

    /// Every live global value, sorted by name.
    pub fn global_values_by_name(&self) -> Vec<(&str, GlobalRef)> {
        self.symbols.sorted()
    }

    pub fn global_name(&self, global: GlobalRef) -> &str {
        match global {
            GlobalRef::Function(f) => self.function(f).name(),
            GlobalRef::Variable(g) => self.global(g).name(),
            GlobalRef::Alias(a) => self.alias(a).name(),
        }
    }

    /// Function type for functions, value type otherwise.
    pub fn global_value_type(&self, global: GlobalRef) -> TypeId {
        match global {
            GlobalRef::Function(f) => self.function(f).ty,
            GlobalRef::Variable(g) => self.global(g).value_type,
            GlobalRef::Alias(a) => self.alias(a).value_type,
        }
    }

    pub fn global_address_space(&self, global: GlobalRef) -> u32 {
        match global {
            GlobalRef::Function(_) => 0,
            GlobalRef::Variable(g) => self.global(g).address_space,
            GlobalRef::Alias(a) => self.alias(a).address_space,
        }
    }

    /// Type of the global's address.
    pub fn global_pointer_type(&self, global: GlobalRef) -> TypeId {
        self.context
            .pointer_type(self.global_value_type(global), self.global_address_space(global))
    }

    pub fn linkage(&self, global: GlobalRef) -> Linkage {
        match global {
            GlobalRef::Function(f) => self.function(f).linkage,
            GlobalRef::Variable(g) => self.global(g).linkage,
            GlobalRef::Alias(a) => self.alias(a).linkage,
        }
    }

    pub fn is_declaration_for_linker(&self, global: GlobalRef) -> bool {
        match global {
            GlobalRef::Function(f) => self.function(f).is_declaration_for_linker(),
            GlobalRef::Variable(g) => self.global(g).is_declaration_for_linker(),
            GlobalRef::Alias(_) => false,
        }
    }

    pub fn is_strong_definition_for_linker(&self, global: GlobalRef) -> bool {
        match global {
            GlobalRef::Function(f) => self.function(f).is_strong_definition_for_linker(),
            GlobalRef::Variable(g) => self.global(g).is_strong_definition_for_linker(),
            GlobalRef::Alias(a) => !self.alias(a).linkage.is_overridable(),
        }
    }

    // =====================================================
    // Typing
    // =====================================================

    pub fn constant_type(&self, constant: &Constant) -> TypeId {
        match constant {
            Constant::Int { ty, .. }
            | Constant::Float { ty, .. }
            | Constant::Null(ty)
            | Constant::Undef(ty)
            | Constant::Zero(ty)
            | Constant::Aggregate { ty, .. } => *ty,
            Constant::Global(g) => self.global_pointer_type(*g),
        }
    }

    /// Type of `value` as an operand inside function `func`.
    pub fn value_type(&self, func: FuncId, value: &Value) -> TypeId {
        match value {
            Value::Arg(n) => {
                let params = self.context.function_params(self.function(func).ty);
                params[*n as usize]
            }
            Value::Inst(id) => self.function(func).inst(*id).ty,
            Value::Const(c) => self.constant_type(c),
        }
    }

    // =====================================================
    // Uses
    // =====================================================

    /// Number of references to `id` from code, initializers, aliases and
    /// constructors. Metadata references are not uses.
    pub fn function_use_count(&self, id: FuncId) -> usize {
        let target = GlobalRef::Function(id);
        let mut count = 0usize;
        let mut visit = |g: GlobalRef| {
            if g == target {
                count += 1;
            }
        };
        for (_, f) in self.functions() {
            for (_, data) in f.insts() {
                for op in data.inst.operands() {
                    if let Value::Const(c) = op {
                        c.for_each_global(&mut visit);
                    }
                }
            }
        }
        for (_, g) in self.globals() {
            if let Some(init) = &g.initializer {
                init.for_each_global(&mut visit);
            }
        }
        for (_, a) in self.aliases() {
            a.aliasee.for_each_global(&mut visit);
        }
        for ctor in &self.global_ctors {
            ctor.function.for_each_global(&mut visit);
        }
        count
    }

    // =====================================================
    // Types in use
    // =====================================================

    /// Every type referenced by the module's globals, code and metadata.
    pub fn referenced_types(&self) -> Vec<TypeId> {
        let mut roots = Vec::new();
        for (_, f) in self.functions() {
            roots.push(f.ty);
            for (_, data) in f.insts() {
                roots.push(data.ty);
                for op in data.inst.operands() {
                    if let Value::Const(c) = op {
                        collect_constant_types(c, &mut roots);
                    }
                }
            }
        }
        for (_, g) in self.globals() {
            roots.push(g.value_type);
            if let Some(init) = &g.initializer {
                collect_constant_types(init, &mut roots);
            }
        }
        for (_, a) in self.aliases() {
            roots.push(a.value_type);
            collect_constant_types(&a.aliasee, &mut roots);
        }
        for (_, node) in self.metadata.nodes() {
            for op in &node.operands {
                match op {
                    MdOperand::Type(t) => roots.push(*t),
                    MdOperand::Value(c) => collect_constant_types(c, &mut roots),
                    _ => {}
                }
            }
        }
        roots
    }

    /// Named struct types reachable from anything in the module, in a
    /// deterministic order.
    pub fn identified_struct_types(&self) -> Vec<TypeId> {
        let mut out = Vec::new();
        self.context.walk_types(self.referenced_types(), |id, ty| {
            if let Type::Struct(s) = ty {
                if s.name.is_some() {
                    out.push(id);
                }
            }
        });
        out
    }
}

fn collect_constant_types(c: &Constant, roots: &mut Vec<TypeId>) {
    match c {
        Constant::Int { ty, .. } | Constant::Float { ty, .. } | Constant::Null(ty) | Constant::Undef(ty) | Constant::Zero(ty) => {
            roots.push(*ty)
        }
        Constant::Aggregate { ty, elements } => {
            roots.push(*ty);
            for e in elements {
                collect_constant_types(e, roots);
            }
        }
        Constant::Global(_) => {}
    }
}
