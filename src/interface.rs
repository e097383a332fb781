//! Interned abstract method sets.

use std::fmt;
use std::rc::Rc;

use ir::ir_hasher::{fx_hash, HashMap};
use ir::{MdNodeId, TypeId};
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::context::Context;
use crate::errors::RecordError;
use crate::records::{InterfaceMethodRecord, InterfaceRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceId(pub(crate) u32);

impl InterfaceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceMethod {
    name: String,
    qualified_name: String,
    ty: TypeId,
}

impl InterfaceMethod {
    /// Leaf name used for matching against class methods.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Symbol the dispatch function for this method is emitted under.
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Function type, `self` pointer first.
    pub fn ty(&self) -> TypeId {
        self.ty
    }
}

/// A named aggregate type plus a name-sorted, duplicate-free method set.
///
/// Instances are interned per [`Context`]: equal requests return the same
/// `Rc`, so identity comparison is enough.
#[derive(Debug)]
pub struct Interface {
    id: InterfaceId,
    ty: TypeId,
    methods: Box<[InterfaceMethod]>,
}

impl Interface {
    /// Returns the interface for `ty` with the given methods, in any order.
    ///
    /// Mismatched list lengths are truncated to the shortest list and
    /// duplicate names keep their first occurrence; both are logged.
    pub fn get(
        ctx: &Context,
        ty: TypeId,
        names: &[impl AsRef<str>],
        qualified_names: &[impl AsRef<str>],
        types: &[TypeId],
    ) -> Rc<Interface> {
        let count = names.len().min(qualified_names.len()).min(types.len());
        if count != names.len() || count != qualified_names.len() || count != types.len() {
            warn!(
                names = names.len(),
                qualified_names = qualified_names.len(),
                types = types.len(),
                "interface method lists differ in length; truncating to {count}"
            );
        }

        let mut methods: Vec<InterfaceMethod> = (0..count)
            .map(|i| InterfaceMethod {
                name: names[i].as_ref().to_owned(),
                qualified_name: qualified_names[i].as_ref().to_owned(),
                ty: types[i],
            })
            .collect();
        // Stable, so the first of equal names survives the dedup.
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        let before = methods.len();
        methods.dedup_by(|later, earlier| later.name == earlier.name);
        if methods.len() != before {
            warn!(dropped = before - methods.len(), "duplicate interface method names");
        }

        ctx.interfaces().borrow_mut().intern(ty, methods)
    }

    /// Rebuilds an interface from its persisted record.
    pub fn from_record(ctx: &Context, module: &ir::Module, node: MdNodeId) -> Result<Rc<Interface>, RecordError> {
        let record = InterfaceRecord::decode(module, node)?;
        Ok(Self::from_interface_record(ctx, &record))
    }

    pub fn from_interface_record(ctx: &Context, record: &InterfaceRecord) -> Rc<Interface> {
        let names: Vec<&str> = record.methods.iter().map(|m| m.name.as_str()).collect();
        let qualified: Vec<&str> = record.methods.iter().map(|m| m.qualified_name.as_str()).collect();
        let types: Vec<TypeId> = record.methods.iter().map(|m| m.ty).collect();
        Self::get(ctx, record.ty, &names, &qualified, &types)
    }

    pub fn to_record(&self) -> InterfaceRecord {
        InterfaceRecord {
            ty: self.ty,
            methods: self
                .methods
                .iter()
                .map(|m| InterfaceMethodRecord {
                    name: m.name.clone(),
                    qualified_name: m.qualified_name.clone(),
                    ty: m.ty,
                })
                .collect(),
        }
    }

    pub fn id(&self) -> InterfaceId {
        self.id
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    pub fn methods(&self) -> &[InterfaceMethod] {
        &self.methods
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn find_method(&self, name: &str) -> Option<&InterfaceMethod> {
        self.method_index(name).map(|i| &self.methods[i])
    }

    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.binary_search_by(|m| m.name.as_str().cmp(name)).ok()
    }

    pub fn display<'a>(&'a self, ctx: &'a ir::Context) -> impl fmt::Display + 'a {
        InterfaceDisplay { interface: self, ctx }
    }
}

impl PartialEq for Interface {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Interface {}

struct InterfaceDisplay<'a> {
    interface: &'a Interface,
    ctx: &'a ir::Context,
}

impl fmt::Display for InterfaceDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interface ({}) {{", self.ctx.display_type(self.interface.ty))?;
        for (i, m) in self.interface.methods.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{}: {}", m.name, self.ctx.display_type(m.ty))?;
        }
        if !self.interface.methods.is_empty() {
            f.write_str(" ")?;
        }
        f.write_str("}")
    }
}

/// Hash-consing table behind [`Interface::get`].
#[derive(Default)]
pub(crate) struct InterfaceRegistry {
    buckets: HashMap<u64, SmallVec<[Rc<Interface>; 1]>>,
    len: usize,
}

impl InterfaceRegistry {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    fn intern(&mut self, ty: TypeId, methods: Vec<InterfaceMethod>) -> Rc<Interface> {
        let hash = fx_hash(&(ty, methods.as_slice()));
        let bucket = self.buckets.entry(hash).or_default();
        if let Some(existing) = bucket.iter().find(|i| i.ty == ty && *i.methods == *methods) {
            trace!(id = existing.id.0, "interface already interned");
            return Rc::clone(existing);
        }

        let interface = Rc::new(Interface {
            id: InterfaceId(self.len as u32),
            ty,
            methods: methods.into_boxed_slice(),
        });
        bucket.push(Rc::clone(&interface));
        self.len += 1;
        trace!(id = interface.id.0, methods = interface.methods.len(), "interned interface");
        interface
    }
}
