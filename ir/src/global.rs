use crate::function::Linkage;
use crate::types::TypeId;
use crate::value::Constant;

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVariable {
    pub(crate) name: String,
    pub value_type: TypeId,
    pub constant: bool,
    pub linkage: Linkage,
    /// `None` for a declaration.
    pub initializer: Option<Constant>,
    pub address_space: u32,
    pub section: Option<String>,
}

impl GlobalVariable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_declaration(&self) -> bool {
        self.initializer.is_none()
    }

    pub fn is_declaration_for_linker(&self) -> bool {
        self.is_declaration() || self.linkage == Linkage::AvailableExternally
    }

    pub fn is_strong_definition_for_linker(&self) -> bool {
        !self.is_declaration_for_linker() && !self.linkage.is_overridable()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalAlias {
    pub(crate) name: String,
    pub value_type: TypeId,
    pub linkage: Linkage,
    pub address_space: u32,
    pub aliasee: Constant,
}

impl GlobalAlias {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Entry of a module's static constructor list.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalCtor {
    pub priority: u32,
    pub function: Constant,
}
