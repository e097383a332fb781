use std::rc::Rc;

use enum_ordinalize::Ordinalize;
use ir::{FuncId, MdNodeId};

use crate::context::Context;
use crate::errors::RecordError;
use crate::interface::Interface;
use crate::module::ModuleId;
use crate::records::{ArgumentRecord, EntryPointRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ordinalize)]
#[repr(u8)]
pub enum EntryPointKind {
    Vertex,
    Fragment,
    Compute,
}

impl EntryPointKind {
    const LISTS: [&'static str; 3] = ["air.vertex", "air.fragment", "air.kernel"];

    /// Named list the kind's records are kept in.
    pub fn metadata_name(self) -> &'static str {
        Self::LISTS[self.ordinal() as usize]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryPointArgument {
    pub index: u32,
    pub name: String,
    pub type_name: String,
    pub interface: Option<Rc<Interface>>,
}

/// A shader or kernel function plus the arguments that refer to interfaces.
#[derive(Debug)]
pub struct EntryPoint {
    kind: EntryPointKind,
    function: FuncId,
    arguments: Vec<EntryPointArgument>,
    owner: Option<ModuleId>,
    record: Option<MdNodeId>,
}

impl EntryPoint {
    pub fn new(kind: EntryPointKind, function: FuncId, arguments: Vec<EntryPointArgument>) -> Self {
        Self { kind, function, arguments, owner: None, record: None }
    }

    pub(crate) fn from_record(
        ctx: &Context,
        module: &ir::Module,
        kind: EntryPointKind,
        node: MdNodeId,
    ) -> Result<Self, RecordError> {
        let record = EntryPointRecord::decode(module, node)?;
        let arguments = record
            .arguments
            .into_iter()
            .map(|a| EntryPointArgument {
                index: a.index,
                name: a.name,
                type_name: a.type_name,
                interface: a.interface.map(|i| Interface::from_interface_record(ctx, &i)),
            })
            .collect();
        Ok(Self::new(kind, record.function, arguments))
    }

    pub fn to_record(&self) -> EntryPointRecord {
        EntryPointRecord {
            function: self.function,
            arguments: self
                .arguments
                .iter()
                .map(|a| ArgumentRecord {
                    index: a.index,
                    name: a.name.clone(),
                    type_name: a.type_name.clone(),
                    interface: a.interface.as_ref().map(|i| i.to_record()),
                })
                .collect(),
        }
    }

    pub fn kind(&self) -> EntryPointKind {
        self.kind
    }

    pub fn function(&self) -> FuncId {
        self.function
    }

    pub fn arguments(&self) -> &[EntryPointArgument] {
        &self.arguments
    }

    /// Interfaces reachable from the arguments, in argument order.
    pub fn interfaces(&self) -> impl Iterator<Item = &Rc<Interface>> {
        self.arguments.iter().filter_map(|a| a.interface.as_ref())
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
}

#[cfg(test)]
mod tests {
    use super::EntryPointKind;

    #[test]
    fn kinds_map_to_their_lists() {
        assert_eq!(EntryPointKind::Vertex.metadata_name(), "air.vertex");
        assert_eq!(EntryPointKind::Fragment.metadata_name(), "air.fragment");
        assert_eq!(EntryPointKind::Compute.metadata_name(), "air.kernel");
    }
}
