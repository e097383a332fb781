use crate::ir_hasher::HashMap;
use crate::types::TypeId;
use crate::value::Constant;

/// Identity of a metadata node within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MdNodeId(pub(crate) u32);

impl MdNodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MdOperand {
    Null,
    String(String),
    Int { bits: u32, value: i64 },
    /// Reference to a type of the module's context.
    Type(TypeId),
    Value(Constant),
    Node(MdNodeId),
}

impl MdOperand {
    pub fn string(s: impl Into<String>) -> Self {
        MdOperand::String(s.into())
    }

    pub fn i32(value: i64) -> Self {
        MdOperand::Int { bits: 32, value }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MdNode {
    pub operands: Vec<MdOperand>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedMetadata {
    pub name: String,
    pub nodes: Vec<MdNodeId>,
}

/// Node arena plus the module's named lists, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    nodes: Vec<MdNode>,
    named: Vec<NamedMetadata>,
    by_name: HashMap<String, usize>,
}

impl MetadataTable {
    pub fn create_node(&mut self, operands: Vec<MdOperand>) -> MdNodeId {
        let id = MdNodeId(self.nodes.len() as u32);
        self.nodes.push(MdNode { operands });
        id
    }

    pub fn node(&self, id: MdNodeId) -> Option<&MdNode> {
        self.nodes.get(id.index())
    }

    pub fn node_mut(&mut self, id: MdNodeId) -> Option<&mut MdNode> {
        self.nodes.get_mut(id.index())
    }

    pub fn nodes(&self) -> impl Iterator<Item = (MdNodeId, &MdNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (MdNodeId(i as u32), n))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Replaces one operand in place, keeping the node's identity.
    pub fn replace_operand(&mut self, id: MdNodeId, index: usize, operand: MdOperand) -> bool {
        match self.nodes.get_mut(id.index()).and_then(|n| n.operands.get_mut(index)) {
            Some(slot) => {
                *slot = operand;
                true
            }
            None => false,
        }
    }

    pub fn named(&self, name: &str) -> Option<&[MdNodeId]> {
        self.by_name.get(name).map(|&i| self.named[i].nodes.as_slice())
    }

    pub fn named_or_empty(&self, name: &str) -> &[MdNodeId] {
        self.named(name).unwrap_or(&[])
    }

    pub fn get_or_insert_named(&mut self, name: &str) -> &mut Vec<MdNodeId> {
        let index = match self.by_name.get(name) {
            Some(&i) => i,
            None => {
                self.named.push(NamedMetadata { name: name.to_owned(), nodes: Vec::new() });
                let i = self.named.len() - 1;
                self.by_name.insert(name.to_owned(), i);
                i
            }
        };
        &mut self.named[index].nodes
    }

    pub fn push_named(&mut self, name: &str, node: MdNodeId) {
        self.get_or_insert_named(name).push(node);
    }

    /// Removes every occurrence of `node` from the list `name`.
    pub fn remove_from_named(&mut self, name: &str, node: MdNodeId) -> bool {
        match self.by_name.get(name) {
            Some(&i) => {
                let nodes = &mut self.named[i].nodes;
                let before = nodes.len();
                nodes.retain(|n| *n != node);
                nodes.len() != before
            }
            None => false,
        }
    }

    pub fn named_lists(&self) -> impl Iterator<Item = &NamedMetadata> {
        self.named.iter()
    }
}
