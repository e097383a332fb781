use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::config::Config;
use crate::interface::InterfaceRegistry;
use crate::module::ModuleId;

/// One compilation pipeline: the IR type space, the interface intern table
/// and the configuration new modules start from.
///
/// Contexts are never shared between threads or merged; only modules are.
pub struct Context {
    ir: Rc<ir::Context>,
    config: Config,
    interfaces: RefCell<InterfaceRegistry>,
    next_module: Cell<u32>,
}

impl Context {
    pub fn new(config: Config) -> Rc<Self> {
        let ir = Rc::new(ir::Context::new(config.data_layout, config.target_triple.clone()));
        Rc::new(Self {
            ir,
            config,
            interfaces: RefCell::new(InterfaceRegistry::default()),
            next_module: Cell::new(0),
        })
    }

    pub fn with_defaults() -> Rc<Self> {
        Self::new(Config::default())
    }

    pub fn ir(&self) -> &Rc<ir::Context> {
        &self.ir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of distinct interfaces interned so far.
    pub fn interface_count(&self) -> usize {
        self.interfaces.borrow().len()
    }

    pub(crate) fn interfaces(&self) -> &RefCell<InterfaceRegistry> {
        &self.interfaces
    }

    pub(crate) fn next_module_id(&self) -> ModuleId {
        let id = self.next_module.get();
        self.next_module.set(id + 1);
        ModuleId(id)
    }
}
