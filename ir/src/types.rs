use smallvec::SmallVec;
use std::fmt;

use crate::ir_hasher::HashMap;

/// Handle to a type owned by a [`crate::Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub type TypeList = SmallVec<[TypeId; 8]>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Int(u32),
    Float,
    Double,
    Pointer { pointee: TypeId, address_space: u32 },
    Array { element: TypeId, len: u64 },
    Function { ret: TypeId, params: TypeList, var_arg: bool },
    Struct(StructType),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: Option<String>,
    /// `None` while the struct is opaque.
    pub body: Option<TypeList>,
    pub packed: bool,
}

impl Type {
    #[inline]
    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    #[inline]
    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer { .. })
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function { .. })
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            Type::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Types directly contained in this one.
    pub fn subtypes(&self) -> TypeList {
        match self {
            Type::Void | Type::Int(_) | Type::Float | Type::Double => TypeList::new(),
            Type::Pointer { pointee, .. } => smallvec::smallvec![*pointee],
            Type::Array { element, .. } => smallvec::smallvec![*element],
            Type::Function { ret, params, .. } => {
                let mut out = TypeList::with_capacity(params.len() + 1);
                out.push(*ret);
                out.extend(params.iter().copied());
                out
            }
            Type::Struct(s) => s.body.clone().unwrap_or_default(),
        }
    }
}

/// Storage for every type of a context.
///
/// Literal types are hash-consed; named structs are identities whose names
/// are uniqued with a `.N` suffix.
#[derive(Debug, Default)]
pub(crate) struct TypeArena {
    types: Vec<Type>,
    literals: HashMap<Type, TypeId>,
    named: HashMap<String, TypeId>,
    last_unique: u32,
}

impl TypeArena {
    pub(crate) fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    pub(crate) fn len(&self) -> usize {
        self.types.len()
    }

    fn push(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub(crate) fn intern(&mut self, ty: Type) -> TypeId {
        debug_assert!(
            !matches!(&ty, Type::Struct(StructType { name: Some(_), .. })),
            "named structs are not interned"
        );
        if let Some(&id) = self.literals.get(&ty) {
            return id;
        }
        let id = self.push(ty.clone());
        self.literals.insert(ty, id);
        id
    }

    pub(crate) fn create_named(&mut self, name: &str, body: Option<TypeList>, packed: bool) -> TypeId {
        let unique = self.unique_name(name);
        let id = self.push(Type::Struct(StructType { name: Some(unique.clone()), body, packed }));
        self.named.insert(unique, id);
        id
    }

    pub(crate) fn lookup_named(&self, name: &str) -> Option<TypeId> {
        self.named.get(name).copied()
    }

    pub(crate) fn set_body(&mut self, id: TypeId, body: TypeList, packed: bool) -> bool {
        match &mut self.types[id.index()] {
            Type::Struct(s) if s.name.is_some() => {
                s.body = Some(body);
                s.packed = packed;
                true
            }
            _ => false,
        }
    }

    fn unique_name(&mut self, name: &str) -> String {
        if !self.named.contains_key(name) {
            return name.to_owned();
        }
        loop {
            self.last_unique += 1;
            let candidate = format!("{name}.{}", self.last_unique);
            if !self.named.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

/// Borrowing view used to render a type as text.
pub struct TypeDisplay<'a> {
    pub(crate) arena: std::cell::Ref<'a, TypeArena>,
    pub(crate) id: TypeId,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_type(&self.arena, self.id, f)
    }
}

pub(crate) fn write_type(arena: &TypeArena, id: TypeId, f: &mut dyn fmt::Write) -> fmt::Result {
    match arena.get(id) {
        Type::Void => f.write_str("void"),
        Type::Int(bits) => write!(f, "i{bits}"),
        Type::Float => f.write_str("float"),
        Type::Double => f.write_str("double"),
        Type::Pointer { pointee, address_space } => {
            write_type(arena, *pointee, f)?;
            if *address_space != 0 {
                write!(f, " addrspace({address_space})")?;
            }
            f.write_str("*")
        }
        Type::Array { element, len } => {
            write!(f, "[{len} x ")?;
            write_type(arena, *element, f)?;
            f.write_str("]")
        }
        Type::Function { ret, params, var_arg } => {
            write_type(arena, *ret, f)?;
            f.write_str(" (")?;
            for (i, param) in params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_type(arena, *param, f)?;
            }
            if *var_arg {
                f.write_str(if params.is_empty() { "..." } else { ", ..." })?;
            }
            f.write_str(")")
        }
        Type::Struct(s) => match &s.name {
            Some(name) => write!(f, "%{name}"),
            None => write_struct_body(arena, s, f),
        },
    }
}

pub(crate) fn write_struct_body(arena: &TypeArena, s: &StructType, f: &mut dyn fmt::Write) -> fmt::Result {
    let Some(body) = &s.body else {
        return f.write_str("opaque");
    };
    let (open, close) = if s.packed { ("<{", "}>") } else { ("{", "}") };
    f.write_str(open)?;
    for (i, field) in body.iter().enumerate() {
        f.write_str(if i == 0 { " " } else { ", " })?;
        write_type(arena, *field, f)?;
    }
    if !body.is_empty() {
        f.write_str(" ")?;
    }
    f.write_str(close)
}
