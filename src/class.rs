use std::fmt;

use ir::{FuncId, MdNodeId, TypeId};
use tracing::warn;

use crate::algorithm::for_each_intersection;
use crate::context::Context;
use crate::interface::Interface;
use crate::module::ModuleId;
use crate::records::{ClassMethodRecord, ClassRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMethod {
    name: String,
    function: FuncId,
}

impl ClassMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> FuncId {
        self.function
    }
}

/// Sizes of the class type and of its tagged form `{ i32, T }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassLayout {
    pub type_with_kind: TypeId,
    pub size: u64,
    pub size_with_kind: u64,
    pub offset_past_kind: u64,
}

impl ClassLayout {
    /// `None` for unsized (opaque) class types.
    pub(crate) fn compute(ctx: &ir::Context, ty: TypeId) -> Option<Self> {
        let dl = ctx.data_layout();
        let size = dl.size_of(ctx, ty).ok()?;
        let type_with_kind = ctx.struct_type(&[ctx.i32_type(), ty], false);
        let tagged = dl.struct_layout(ctx, type_with_kind).ok()?;
        Some(Self {
            type_with_kind,
            size,
            size_with_kind: tagged.size,
            offset_past_kind: tagged.offsets[1],
        })
    }
}

/// A named aggregate type plus its concrete methods, sorted by name.
///
/// Method functions live in the IR module of the owning [`crate::Module`].
#[derive(Debug)]
pub struct Class {
    name: String,
    ty: TypeId,
    methods: Box<[ClassMethod]>,
    owner: Option<ModuleId>,
    record: Option<MdNodeId>,
    layout: Option<ClassLayout>,
}

impl Class {
    /// Creates a detached class; `names` and `functions` pair up by index.
    pub fn new(
        ctx: &Context,
        ty: TypeId,
        names: &[impl AsRef<str>],
        functions: &[FuncId],
        name: impl Into<String>,
    ) -> Self {
        assert!(ctx.ir().is_struct(ty), "class type {} is not a struct", ctx.ir().type_name(ty));
        let name = name.into();
        if names.len() != functions.len() {
            warn!(class = %name, names = names.len(), functions = functions.len(), "class method lists differ in length");
        }
        let methods = names
            .iter()
            .zip(functions)
            .map(|(n, &function)| ClassMethod { name: n.as_ref().to_owned(), function })
            .collect();
        Self::from_methods(name, ty, methods)
    }

    fn from_methods(name: String, ty: TypeId, mut methods: Vec<ClassMethod>) -> Self {
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        let before = methods.len();
        methods.dedup_by(|later, earlier| later.name == earlier.name);
        if methods.len() != before {
            warn!(class = %name, dropped = before - methods.len(), "duplicate class method names");
        }
        Self { name, ty, methods: methods.into_boxed_slice(), owner: None, record: None, layout: None }
    }

    pub(crate) fn from_record(record: ClassRecord) -> Self {
        let methods = record
            .methods
            .into_iter()
            .map(|m| ClassMethod { name: m.name, function: m.function })
            .collect();
        Self::from_methods(record.name, record.ty, methods)
    }

    pub fn to_record(&self) -> ClassRecord {
        ClassRecord {
            name: self.name.clone(),
            ty: self.ty,
            methods: self
                .methods
                .iter()
                .map(|m| ClassMethodRecord { name: m.name.clone(), function: m.function })
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    pub fn methods(&self) -> &[ClassMethod] {
        &self.methods
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn find_method(&self, name: &str) -> Option<&ClassMethod> {
        self.methods
            .binary_search_by(|m| m.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.methods[i])
    }

    /// Every interface method has a same-named class method.
    pub fn does_implement(&self, interface: &Interface) -> bool {
        covers(self.methods.iter().map(|m| m.name.as_str()), interface)
    }

    pub fn owner(&self) -> Option<ModuleId> {
        self.owner
    }

    pub fn record(&self) -> Option<MdNodeId> {
        self.record
    }

    /// Present while owned by a module and sized.
    pub fn layout(&self) -> Option<&ClassLayout> {
        self.layout.as_ref()
    }

    pub(crate) fn attach(&mut self, owner: ModuleId, record: MdNodeId, layout: Option<ClassLayout>) {
        self.owner = Some(owner);
        self.record = Some(record);
        self.layout = layout;
    }

    pub(crate) fn detach(&mut self) {
        self.owner = None;
        self.record = None;
        self.layout = None;
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Resolves methods to symbols of `module`, which must hold them.
    pub fn implementation(&self, module: &ir::Module) -> Implementation {
        Implementation {
            name: self.name.clone(),
            ty: self.ty,
            methods: self
                .methods
                .iter()
                .map(|m| {
                    let f = module.function(m.function);
                    ConcreteMethod { name: m.name.clone(), symbol: f.name().to_owned(), function_type: f.ty }
                })
                .collect(),
        }
    }

    pub fn display<'a>(&'a self, module: &'a ir::Module) -> impl fmt::Display + 'a {
        ClassDisplay { class: self, module }
    }
}

fn covers<'a>(names: impl IntoIterator<Item = &'a str>, interface: &Interface) -> bool {
    let mut matched = 0;
    for_each_intersection(
        names,
        interface.methods(),
        |name, m| (*name).cmp(m.name()),
        |_, _| matched += 1,
    );
    matched == interface.method_count()
}

/// A class method as a dispatcher in another module sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteMethod {
    pub name: String,
    pub symbol: String,
    pub function_type: TypeId,
}

/// Module-independent view of a class; methods sorted by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implementation {
    pub name: String,
    pub ty: TypeId,
    pub methods: Vec<ConcreteMethod>,
}

impl Implementation {
    pub fn does_implement(&self, interface: &Interface) -> bool {
        covers(self.methods.iter().map(|m| m.name.as_str()), interface)
    }
}

struct ClassDisplay<'a> {
    class: &'a Class,
    module: &'a ir::Module,
}

impl fmt::Display for ClassDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ctx = self.module.context();
        write!(f, "class {} ({}) {{", self.class.name, ctx.display_type(self.class.ty))?;
        for (i, m) in self.class.methods.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            match self.module.try_function(m.function) {
                Some(func) => write!(f, "{sep}{}: @{}", m.name, func.name())?,
                None => write!(f, "{sep}{}: <removed>", m.name)?,
            }
        }
        if !self.class.methods.is_empty() {
            f.write_str(" ")?;
        }
        f.write_str("}")
    }
}
