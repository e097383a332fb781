use crate::instruction::{Inst, InstData};
use crate::types::TypeId;
use crate::value::{BlockId, InstId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Linkage {
    #[default]
    External,
    AvailableExternally,
    LinkOnce,
    Weak,
    ExternalWeak,
    Internal,
    Private,
}

impl Linkage {
    pub fn is_local(self) -> bool {
        matches!(self, Linkage::Internal | Linkage::Private)
    }

    /// Definitions with this linkage may be replaced by another definition.
    pub fn is_overridable(self) -> bool {
        matches!(self, Linkage::LinkOnce | Linkage::Weak | Linkage::ExternalWeak)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Linkage::External => "",
            Linkage::AvailableExternally => "available_externally ",
            Linkage::LinkOnce => "linkonce ",
            Linkage::Weak => "weak ",
            Linkage::ExternalWeak => "extern_weak ",
            Linkage::Internal => "internal ",
            Linkage::Private => "private ",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicBlock {
    pub name: Option<String>,
    pub insts: Vec<InstId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub(crate) name: String,
    pub ty: TypeId,
    pub linkage: Linkage,
    pub section: Option<String>,
    pub param_names: Vec<Option<String>>,
    pub(crate) insts: Vec<InstData>,
    pub(crate) blocks: Vec<BasicBlock>,
}

impl Function {
    pub(crate) fn new(name: String, ty: TypeId, linkage: Linkage) -> Self {
        Self {
            name,
            ty,
            linkage,
            section: None,
            param_names: Vec::new(),
            insts: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn is_declaration_for_linker(&self) -> bool {
        self.is_declaration() || self.linkage == Linkage::AvailableExternally
    }

    pub fn is_strong_definition_for_linker(&self) -> bool {
        !self.is_declaration_for_linker() && !self.linkage.is_overridable()
    }

    pub fn add_block(&mut self, name: Option<&str>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock { name: name.map(str::to_owned), insts: Vec::new() });
        id
    }

    pub fn push_inst(&mut self, block: BlockId, data: InstData) -> InstId {
        let id = InstId(self.insts.len() as u32);
        self.insts.push(data);
        self.blocks[block.index()].insts.push(id);
        id
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        (!self.blocks.is_empty()).then_some(BlockId(0))
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks.iter().enumerate().map(|(i, b)| (BlockId(i as u32), b))
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn inst(&self, id: InstId) -> &InstData {
        &self.insts[id.index()]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut InstData {
        &mut self.insts[id.index()]
    }

    pub fn insts(&self) -> impl Iterator<Item = (InstId, &InstData)> {
        self.insts.iter().enumerate().map(|(i, d)| (InstId(i as u32), d))
    }

    pub fn insts_mut(&mut self) -> impl Iterator<Item = &mut InstData> {
        self.insts.iter_mut()
    }

    /// Last instruction of `block` if it ends the block.
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let last = *self.block(block).insts.last()?;
        self.inst(last).inst.is_terminator().then_some(last)
    }

    /// Appends a case to a switch. Returns `false` if `switch` is not one.
    pub fn add_switch_case(&mut self, switch: InstId, value: i64, dest: BlockId) -> bool {
        match &mut self.insts[switch.index()].inst {
            Inst::Switch { cases, .. } => {
                cases.push((value, dest));
                true
            }
            _ => false,
        }
    }

    /// Drops the body, turning a definition into a declaration.
    pub fn delete_body(&mut self) {
        self.insts.clear();
        self.blocks.clear();
    }

    /// Replaces the body wholesale.
    pub fn set_body(&mut self, insts: Vec<InstData>, blocks: Vec<BasicBlock>) {
        self.insts = insts;
        self.blocks = blocks;
    }

    pub fn body(&self) -> (&[InstData], &[BasicBlock]) {
        (&self.insts, &self.blocks)
    }
}
