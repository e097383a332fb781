use crate::types::TypeId;

macro_rules! entity_id {
    ($($(#[$meta:meta])* $name:ident;)*) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    )*};
}

entity_id! {
    /// Slot of a function in its module.
    FuncId;
    /// Slot of a global variable in its module.
    GlobalId;
    /// Slot of an alias in its module.
    AliasId;
    /// Basic block of a function.
    BlockId;
    /// Instruction of a function.
    InstId;
}

/// Any global value of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GlobalRef {
    Function(FuncId),
    Variable(GlobalId),
    Alias(AliasId),
}

impl GlobalRef {
    pub fn kind_name(self) -> &'static str {
        match self {
            GlobalRef::Function(_) => "function",
            GlobalRef::Variable(_) => "global variable",
            GlobalRef::Alias(_) => "alias",
        }
    }

    pub fn as_function(self) -> Option<FuncId> {
        match self {
            GlobalRef::Function(f) => Some(f),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int { ty: TypeId, value: i64 },
    Float { ty: TypeId, value: f64 },
    Null(TypeId),
    Undef(TypeId),
    Zero(TypeId),
    Aggregate { ty: TypeId, elements: Vec<Constant> },
    /// Address of a global value.
    Global(GlobalRef),
}

impl Constant {
    pub fn function(id: FuncId) -> Self {
        Constant::Global(GlobalRef::Function(id))
    }

    pub fn as_global(&self) -> Option<GlobalRef> {
        match self {
            Constant::Global(g) => Some(*g),
            _ => None,
        }
    }

    /// Calls `f` for every global referenced, including nested ones.
    pub fn for_each_global(&self, f: &mut impl FnMut(GlobalRef)) {
        match self {
            Constant::Global(g) => f(*g),
            Constant::Aggregate { elements, .. } => {
                for e in elements {
                    e.for_each_global(f);
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Arg(u32),
    Inst(InstId),
    Const(Constant),
}

impl Value {
    pub fn int(ty: TypeId, value: i64) -> Self {
        Value::Const(Constant::Int { ty, value })
    }

    pub fn function(id: FuncId) -> Self {
        Value::Const(Constant::function(id))
    }

    pub fn global(global: GlobalRef) -> Self {
        Value::Const(Constant::Global(global))
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Value::Const(c) => Some(c),
            _ => None,
        }
    }
}
