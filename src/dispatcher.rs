//! Switch-based virtual dispatch.
//!
//! Every interface method gets one dispatch function in the dispatcher's
//! module:
//!
//! ```text
//! entry:
//!   %tagged = bitcast %Iface* %0 to { i32 }*
//!   %kind.addr = getelementptr %tagged, 0, 0
//!   %kind = load i32* %kind.addr
//!   switch i32 %kind, label %default [ i32 <kind>, label %<Class> ... ]
//! default:
//!   ; first implementation, empty until one is inserted
//! ```
//!
//! A case body reinterprets `self` as `{ i32, ClassTy }*`, takes the payload
//! address, casts it to the concrete method's own `self` type if needed and
//! tail-forwards the remaining arguments.

use std::fmt;
use std::rc::Rc;

use ir::{BlockId, FuncId, FunctionBuilder, Inst, InstId, Linkage, MdNodeId, Value};
use smallvec::SmallVec;
use tracing::debug;

use crate::algorithm::for_each_intersection;
use crate::class::{ConcreteMethod, Implementation};
use crate::context::Context;
use crate::errors::{DispatcherError, RecordError};
use crate::interface::Interface;
use crate::module::ModuleId;
use crate::records::{DispatcherRecord, ImplementationRecord};

/// The multi-way branch of one dispatch function, as it is being built.
///
/// The default destination is the first implementation's body; every later
/// implementation is an explicit case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTable {
    switch: InstId,
    default: BlockId,
    default_kind: Option<u32>,
    cases: SmallVec<[(u32, BlockId); 4]>,
}

impl DispatchTable {
    pub fn switch(&self) -> InstId {
        self.switch
    }

    pub fn default_block(&self) -> BlockId {
        self.default
    }

    /// Kind whose body occupies the default destination.
    pub fn default_kind(&self) -> Option<u32> {
        self.default_kind
    }

    pub fn cases(&self) -> &[(u32, BlockId)] {
        &self.cases
    }

    pub fn is_empty(&self) -> bool {
        self.default_kind.is_none() && self.cases.is_empty()
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.default_kind == Some(tag) || self.cases.iter().any(|(k, _)| *k == tag)
    }

    /// Registers `target` under `tag` and writes the case into `function`'s
    /// switch.
    pub fn add_case(&mut self, function: &mut ir::Function, tag: u32, target: BlockId) {
        assert!(!self.contains(tag), "kind {tag} already dispatched");
        let written = function.add_switch_case(self.switch, i64::from(tag), target);
        assert!(written, "dispatch table does not point at a switch");
        self.cases.push((tag, target));
    }

    fn fill_default(&mut self, tag: u32) {
        assert!(self.is_empty(), "default destination already taken");
        self.default_kind = Some(tag);
    }

    /// Reads the table back from the entry block's terminator. The default
    /// destination belongs to the first implementation without a case.
    fn from_function(function: &ir::Function, implementations: &[ImplementationRecord]) -> Result<Self, RecordError> {
        let missing = || RecordError::MissingSwitch(function.name().to_owned());
        let entry = function.entry_block().ok_or_else(missing)?;
        let switch = function.terminator(entry).ok_or_else(missing)?;
        let Inst::Switch { default, cases, .. } = &function.inst(switch).inst else {
            return Err(missing());
        };
        let cases: SmallVec<[(u32, BlockId); 4]> = cases.iter().map(|&(k, b)| (k as u32, b)).collect();
        let default_kind = if function.block(*default).insts.is_empty() {
            None
        } else {
            implementations
                .iter()
                .map(|i| i.kind)
                .find(|k| cases.iter().all(|(c, _)| c != k))
        };
        Ok(Self { switch, default: *default, default_kind, cases })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherMethod {
    function: FuncId,
    table: DispatchTable,
}

impl DispatcherMethod {
    pub fn function(&self) -> FuncId {
        self.function
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }
}

/// Dispatch functions for one interface within one module.
///
/// `methods` is index-aligned with the interface's sorted method list.
#[derive(Debug)]
pub struct Dispatcher {
    interface: Rc<Interface>,
    methods: Vec<DispatcherMethod>,
    implementations: Vec<ImplementationRecord>,
    owner: Option<ModuleId>,
    record: Option<MdNodeId>,
}

impl Dispatcher {
    /// Emits the dispatch functions into `module`.
    pub(crate) fn emit(module: &mut ir::Module, interface: Rc<Interface>) -> Result<Self, DispatcherError> {
        let ctx = Rc::clone(module.context());
        for m in interface.methods() {
            let takes_pointer = ctx.function_params(m.ty()).first().is_some_and(|&p| ctx.is_pointer(p));
            if !takes_pointer {
                return Err(DispatcherError::InvalidSelfParameter { method: m.qualified_name().to_owned() });
            }
        }

        let i32t = ctx.i32_type();
        let kind_only = ctx.struct_type(&[i32t], false);
        let mut methods = Vec::with_capacity(interface.method_count());
        for m in interface.methods() {
            let function = match module.get_function(m.qualified_name()) {
                Some(f) if module.function(f).is_declaration() && module.function(f).ty == m.ty() => f,
                _ => module.add_function(m.qualified_name(), m.ty(), Linkage::External),
            };
            let self_ty = ctx.function_params(m.ty())[0];
            let address_space = ctx.address_space(self_ty).unwrap_or(0);

            let mut b = FunctionBuilder::new(module, function);
            b.set_param_name(0, "self");
            let entry = b.create_block(Some("entry"));
            let default = b.create_block(Some("default"));
            b.position_at_end(entry);
            let tagged = b.bitcast(Value::Arg(0), ctx.pointer_type(kind_only, address_space), Some("tagged"));
            let kind_addr = b.gep(tagged, &[0, 0], Some("kind.addr"));
            let kind = b.load(kind_addr, Some("kind"));
            let switch = b.switch(kind, default);

            debug!(function = m.qualified_name(), "emitted dispatch function");
            methods.push(DispatcherMethod {
                function,
                table: DispatchTable { switch, default, default_kind: None, cases: SmallVec::new() },
            });
        }

        Ok(Self { interface, methods, implementations: Vec::new(), owner: None, record: None })
    }

    pub(crate) fn from_record(ctx: &Context, module: &ir::Module, node: MdNodeId) -> Result<Self, RecordError> {
        let record = DispatcherRecord::decode(module, node)?;
        let interface = Interface::from_interface_record(ctx, &record.interface);
        if record.functions.len() != interface.method_count() {
            // Duplicates in the persisted interface collapse when interned.
            return Err(RecordError::MethodCount { expected: interface.method_count(), found: record.functions.len() });
        }

        let methods = record
            .functions
            .iter()
            .map(|&f| {
                let table = DispatchTable::from_function(module.function(f), &record.implementations)?;
                Ok(DispatcherMethod { function: f, table })
            })
            .collect::<Result<Vec<_>, RecordError>>()?;

        let mut implementations = record.implementations;
        implementations.sort_by_key(|i| i.kind);
        Ok(Self { interface, methods, implementations, owner: None, record: None })
    }

    pub fn to_record(&self) -> DispatcherRecord {
        DispatcherRecord {
            interface: self.interface.to_record(),
            functions: self.methods.iter().map(|m| m.function).collect(),
            implementations: self.implementations.clone(),
        }
    }

    pub fn interface(&self) -> &Rc<Interface> {
        &self.interface
    }

    pub fn methods(&self) -> &[DispatcherMethod] {
        &self.methods
    }

    /// Registered `(kind, class name)` pairs, ordered by kind.
    pub fn implementations(&self) -> &[ImplementationRecord] {
        &self.implementations
    }

    pub fn has_kind(&self, kind: u32) -> bool {
        self.implementations.binary_search_by_key(&kind, |i| i.kind).is_ok()
    }

    pub fn owner(&self) -> Option<ModuleId> {
        self.owner
    }

    pub fn record(&self) -> Option<MdNodeId> {
        self.record
    }

    pub(crate) fn attach(&mut self, owner: ModuleId, record: MdNodeId) {
        self.owner = Some(owner);
        self.record = Some(record);
    }

    pub(crate) fn detach(&mut self) {
        self.owner = None;
        self.record = None;
    }

    /// Adds a case for `kind` to every dispatch function.
    ///
    /// Panics if the class does not implement the interface or `kind` is
    /// already registered.
    pub fn insert_implementation(&mut self, module: &mut ir::Module, kind: u32, class: &Implementation) {
        assert!(
            class.does_implement(&self.interface),
            "class {} does not implement the dispatched interface",
            class.name
        );
        assert!(!self.has_kind(kind), "kind {kind} is already registered");

        let mut matched: Vec<(usize, &ConcreteMethod)> = Vec::with_capacity(self.interface.method_count());
        for_each_intersection(
            self.interface.methods().iter().enumerate(),
            &class.methods,
            |(_, m), c| m.name().cmp(&c.name),
            |(index, _), c| matched.push((index, c)),
        );

        let ctx = Rc::clone(module.context());
        let tagged = ctx.struct_type(&[ctx.i32_type(), class.ty], false);
        for (index, concrete) in matched {
            let method = &mut self.methods[index];
            let callee = module.get_or_insert_function(&concrete.symbol, concrete.function_type);
            let dispatch_ty = module.function(method.function).ty;
            let params = ctx.function_params(dispatch_ty);
            let address_space = ctx.address_space(params[0]).unwrap_or(0);
            let callee_self = ctx.function_params(concrete.function_type).first().copied();

            let first = method.table.is_empty();
            let mut b = FunctionBuilder::new(module, method.function);
            let block = if first { method.table.default } else { b.create_block(Some(&class.name)) };
            b.position_at_end(block);
            let this = b.bitcast(Value::Arg(0), ctx.pointer_type(tagged, address_space), None);
            let mut payload = b.gep(this, &[0, 1], Some("payload"));
            if let Some(self_ty) = callee_self {
                if b.value_type(&payload) != self_ty {
                    payload = b.bitcast(payload, self_ty, None);
                }
            }
            let mut args: SmallVec<[Value; 8]> = SmallVec::with_capacity(params.len());
            args.push(payload);
            args.extend((1..params.len() as u32).map(Value::Arg));
            let result = b.call(Value::function(callee), &args, Some("result"));
            let returns_void = ctx.function_return(concrete.function_type).is_none_or(|r| ctx.is_void(r));
            b.ret(if returns_void { None } else { Some(result) });

            if first {
                method.table.fill_default(kind);
            } else {
                method.table.add_case(module.function_mut(method.function), kind, block);
            }
        }

        let at = self.implementations.partition_point(|i| i.kind < kind);
        self.implementations.insert(at, ImplementationRecord { kind, class_name: class.name.clone() });
        if let Some(node) = self.record {
            DispatcherRecord::replace_implementations(module.metadata_mut(), node, &self.implementations);
        }
        debug!(kind, class = %class.name, "inserted implementation");
    }

    /// Dispatch tables only grow; removal always fails and changes nothing.
    pub fn remove_implementation(&mut self, kind: u32) -> Result<(), DispatcherError> {
        Err(DispatcherError::RemovalUnsupported { kind })
    }

    pub fn display<'a>(&'a self, ctx: &'a ir::Context) -> impl fmt::Display + 'a {
        DispatcherDisplay { dispatcher: self, ctx }
    }
}

struct DispatcherDisplay<'a> {
    dispatcher: &'a Dispatcher,
    ctx: &'a ir::Context,
}

impl fmt::Display for DispatcherDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dispatcher ({}) {{", self.ctx.display_type(self.dispatcher.interface.ty()))?;
        for (i, imp) in self.dispatcher.implementations.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{}: {}", imp.kind, imp.class_name)?;
        }
        if !self.dispatcher.implementations.is_empty() {
            f.write_str(" ")?;
        }
        f.write_str("}")
    }
}
