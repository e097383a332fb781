use std::cell::RefCell;

use smallvec::SmallVec;

use crate::layout::DataLayout;
use crate::types::{StructType, Type, TypeArena, TypeDisplay, TypeId, TypeList};

/// Owns the type space shared by every module created on it.
///
/// A context is single-threaded; modules keep it alive through an `Rc`.
pub struct Context {
    types: RefCell<TypeArena>,
    data_layout: DataLayout,
    target_triple: String,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(DataLayout::default(), "")
    }
}

impl Context {
    pub fn new(data_layout: DataLayout, target_triple: impl Into<String>) -> Self {
        Self {
            types: RefCell::new(TypeArena::default()),
            data_layout,
            target_triple: target_triple.into(),
        }
    }

    pub fn data_layout(&self) -> DataLayout {
        self.data_layout
    }

    pub fn target_triple(&self) -> &str {
        &self.target_triple
    }

    /// Returns a copy of the type behind `id`.
    pub fn ty(&self, id: TypeId) -> Type {
        self.types.borrow().get(id).clone()
    }

    pub fn type_count(&self) -> usize {
        self.types.borrow().len()
    }

    fn intern(&self, ty: Type) -> TypeId {
        self.types.borrow_mut().intern(ty)
    }

    // =====================================================
    // Constructors
    // =====================================================

    pub fn void_type(&self) -> TypeId {
        self.intern(Type::Void)
    }

    pub fn int_type(&self, bits: u32) -> TypeId {
        self.intern(Type::Int(bits))
    }

    pub fn i1_type(&self) -> TypeId {
        self.int_type(1)
    }

    pub fn i8_type(&self) -> TypeId {
        self.int_type(8)
    }

    pub fn i32_type(&self) -> TypeId {
        self.int_type(32)
    }

    pub fn i64_type(&self) -> TypeId {
        self.int_type(64)
    }

    pub fn float_type(&self) -> TypeId {
        self.intern(Type::Float)
    }

    pub fn double_type(&self) -> TypeId {
        self.intern(Type::Double)
    }

    pub fn pointer_type(&self, pointee: TypeId, address_space: u32) -> TypeId {
        self.intern(Type::Pointer { pointee, address_space })
    }

    pub fn array_type(&self, element: TypeId, len: u64) -> TypeId {
        self.intern(Type::Array { element, len })
    }

    pub fn function_type(&self, ret: TypeId, params: &[TypeId], var_arg: bool) -> TypeId {
        self.intern(Type::Function { ret, params: SmallVec::from_slice(params), var_arg })
    }

    /// Literal (unnamed) struct, uniqued by structure.
    pub fn struct_type(&self, fields: &[TypeId], packed: bool) -> TypeId {
        self.intern(Type::Struct(StructType {
            name: None,
            body: Some(SmallVec::from_slice(fields)),
            packed,
        }))
    }

    /// Creates a new identified struct. A taken name gets a `.N` suffix.
    pub fn named_struct_type(&self, name: &str, fields: &[TypeId], packed: bool) -> TypeId {
        self.types
            .borrow_mut()
            .create_named(name, Some(SmallVec::from_slice(fields)), packed)
    }

    pub fn opaque_struct_type(&self, name: &str) -> TypeId {
        self.types.borrow_mut().create_named(name, None, false)
    }

    /// Gives a named struct its body. Returns `false` for any other type.
    pub fn set_struct_body(&self, id: TypeId, fields: &[TypeId], packed: bool) -> bool {
        self.types.borrow_mut().set_body(id, SmallVec::from_slice(fields), packed)
    }

    pub fn lookup_struct_type(&self, name: &str) -> Option<TypeId> {
        self.types.borrow().lookup_named(name)
    }

    // =====================================================
    // Queries
    // =====================================================

    pub fn is_void(&self, id: TypeId) -> bool {
        matches!(self.types.borrow().get(id), Type::Void)
    }

    pub fn is_struct(&self, id: TypeId) -> bool {
        self.types.borrow().get(id).is_struct()
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        self.types.borrow().get(id).is_pointer()
    }

    pub fn is_function(&self, id: TypeId) -> bool {
        self.types.borrow().get(id).is_function()
    }

    pub fn int_width(&self, id: TypeId) -> Option<u32> {
        match self.types.borrow().get(id) {
            Type::Int(bits) => Some(*bits),
            _ => None,
        }
    }

    pub fn struct_name(&self, id: TypeId) -> Option<String> {
        match self.types.borrow().get(id) {
            Type::Struct(s) => s.name.clone(),
            _ => None,
        }
    }

    /// Field types, or `None` for opaque structs and non-structs.
    pub fn struct_fields(&self, id: TypeId) -> Option<TypeList> {
        match self.types.borrow().get(id) {
            Type::Struct(s) => s.body.clone(),
            _ => None,
        }
    }

    pub fn pointee_type(&self, id: TypeId) -> Option<TypeId> {
        match self.types.borrow().get(id) {
            Type::Pointer { pointee, .. } => Some(*pointee),
            _ => None,
        }
    }

    pub fn address_space(&self, id: TypeId) -> Option<u32> {
        match self.types.borrow().get(id) {
            Type::Pointer { address_space, .. } => Some(*address_space),
            _ => None,
        }
    }

    /// `(return, params, var_arg)` of a function type.
    pub fn function_signature(&self, id: TypeId) -> Option<(TypeId, TypeList, bool)> {
        match self.types.borrow().get(id) {
            Type::Function { ret, params, var_arg } => Some((*ret, params.clone(), *var_arg)),
            _ => None,
        }
    }

    pub fn function_params(&self, id: TypeId) -> TypeList {
        self.function_signature(id).map(|(_, params, _)| params).unwrap_or_default()
    }

    pub fn function_return(&self, id: TypeId) -> Option<TypeId> {
        self.function_signature(id).map(|(ret, _, _)| ret)
    }

    /// Type reached by indexing into an aggregate with a constant index.
    pub fn element_type(&self, id: TypeId, index: u32) -> Option<TypeId> {
        match self.types.borrow().get(id) {
            Type::Struct(s) => s.body.as_ref().and_then(|b| b.get(index as usize).copied()),
            Type::Array { element, .. } => Some(*element),
            _ => None,
        }
    }

    pub fn display_type(&self, id: TypeId) -> TypeDisplay<'_> {
        TypeDisplay { arena: self.types.borrow(), id }
    }

    pub fn type_name(&self, id: TypeId) -> String {
        self.display_type(id).to_string()
    }

    /// Renders the body of a named struct, e.g. `{ i32, float }`.
    pub fn struct_body_string(&self, id: TypeId) -> String {
        let arena = self.types.borrow();
        let mut out = String::new();
        if let Type::Struct(s) = arena.get(id) {
            let _ = crate::types::write_struct_body(&arena, s, &mut out);
        }
        out
    }

    pub(crate) fn with_types<R>(&self, f: impl FnOnce(&TypeArena) -> R) -> R {
        f(&self.types.borrow())
    }

    /// Every type reachable from `roots`, each visited once. The visitor runs
    /// while the type arena is borrowed and must not create types.
    pub fn walk_types(&self, roots: impl IntoIterator<Item = TypeId>, mut visit: impl FnMut(TypeId, &Type)) {
        self.with_types(|arena| {
            let mut seen = vec![false; arena.len()];
            let mut stack: Vec<TypeId> = roots.into_iter().collect();
            while let Some(id) = stack.pop() {
                if std::mem::replace(&mut seen[id.index()], true) {
                    continue;
                }
                let ty = arena.get(id);
                visit(id, ty);
                stack.extend(ty.subtypes());
            }
        });
    }
}
