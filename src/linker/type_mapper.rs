use std::rc::Rc;

use ir::ir_hasher::HashMap;
use ir::{StructType, Type, TypeId, TypeList};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

use crate::errors::LinkError;

lazy_static! {
    static ref CXX_IDENTIFIER: Regex =
        Regex::new(r"(struct|class)\.([a-zA-Z_][a-zA-Z0-9_:]*(\.[a-zA-Z_:]+)*)(\.[0-9]+)*").expect("identifier regex");
}

/// Name two struct types must share to be the same logical type:
/// the C++ identifier of `struct.`/`class.` names, otherwise the name
/// without its disambiguating `.N` suffixes.
pub fn canonical_name(name: &str) -> &str {
    if let Some(m) = CXX_IDENTIFIER.captures(name).and_then(|c| c.get(2)) {
        return m.as_str();
    }
    let mut name = name;
    while let Some((head, tail)) = name.rsplit_once('.') {
        if head.is_empty() || tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
            break;
        }
        name = head;
    }
    name
}

/// Maps types of a source module onto the destination's type space.
///
/// Named structs are matched by canonical name against the structs the
/// destination module uses. Unmatched ones are reused as-is when both
/// modules share a context and nothing inside them moves; otherwise they
/// are rebuilt, opaque first so recursive types close over themselves.
pub(crate) struct TypeMapper {
    src: Rc<ir::Context>,
    dst: Rc<ir::Context>,
    shared: bool,
    map: HashMap<TypeId, TypeId>,
    counterparts: HashMap<String, TypeId>,
    rebuild: HashMap<TypeId, bool>,
    completions: Vec<(TypeId, TypeList, bool)>,
}

impl TypeMapper {
    pub(crate) fn new(src: &ir::Module, dst: &ir::Module) -> Self {
        let dst_ctx = Rc::clone(dst.context());
        let mut counterparts = HashMap::default();
        for id in dst.identified_struct_types() {
            if let Some(name) = dst_ctx.struct_name(id) {
                counterparts.entry(canonical_name(&name).to_owned()).or_insert(id);
            }
        }
        Self {
            shared: Rc::ptr_eq(src.context(), dst.context()),
            src: Rc::clone(src.context()),
            dst: dst_ctx,
            map: HashMap::default(),
            counterparts,
            rebuild: HashMap::default(),
            completions: Vec::new(),
        }
    }

    pub(crate) fn remap(&mut self, ty: TypeId) -> Result<TypeId, LinkError> {
        if let Some(&mapped) = self.map.get(&ty) {
            return Ok(mapped);
        }
        let mapped = match self.src.ty(ty) {
            Type::Void => self.dst.void_type(),
            Type::Int(bits) => self.dst.int_type(bits),
            Type::Float => self.dst.float_type(),
            Type::Double => self.dst.double_type(),
            Type::Pointer { pointee, address_space } => {
                let pointee = self.remap(pointee)?;
                self.dst.pointer_type(pointee, address_space)
            }
            Type::Array { element, len } => {
                let element = self.remap(element)?;
                self.dst.array_type(element, len)
            }
            Type::Function { ret, params, var_arg } => {
                let ret = self.remap(ret)?;
                let params = self.remap_all(&params)?;
                self.dst.function_type(ret, &params, var_arg)
            }
            Type::Struct(StructType { name: Some(name), body, packed }) => {
                return self.remap_named(ty, &name, body, packed);
            }
            Type::Struct(StructType { name: None, body, packed }) => {
                let fields = self.remap_all(&body.unwrap_or_default())?;
                self.dst.struct_type(&fields, packed)
            }
        };
        self.map.insert(ty, mapped);
        Ok(mapped)
    }

    fn remap_all(&mut self, types: &[TypeId]) -> Result<TypeList, LinkError> {
        types.iter().map(|&t| self.remap(t)).collect()
    }

    fn remap_named(
        &mut self,
        ty: TypeId,
        name: &str,
        body: Option<TypeList>,
        packed: bool,
    ) -> Result<TypeId, LinkError> {
        let canonical = canonical_name(name).to_owned();
        if let Some(&target) = self.counterparts.get(&canonical) {
            self.map.insert(ty, target);
            if target != ty {
                self.reconcile(name, target, body, packed)?;
            }
            trace!(src = name, "matched named struct");
            return Ok(target);
        }

        if self.shared && !self.needs_rebuild(ty) {
            self.map.insert(ty, ty);
            self.counterparts.insert(canonical, ty);
            return Ok(ty);
        }

        let rebuilt = self.dst.opaque_struct_type(name);
        self.map.insert(ty, rebuilt);
        self.counterparts.insert(canonical, rebuilt);
        if let Some(fields) = body {
            let fields = self.remap_all(&fields)?;
            self.dst.set_struct_body(rebuilt, &fields, packed);
        }
        trace!(src = name, "rebuilt named struct");
        Ok(rebuilt)
    }

    /// Checks a source struct against its destination counterpart.
    fn reconcile(&mut self, name: &str, target: TypeId, body: Option<TypeList>, packed: bool) -> Result<(), LinkError> {
        let Some(fields) = body else {
            return Ok(());
        };
        let fields = self.remap_all(&fields)?;
        let Type::Struct(existing) = self.dst.ty(target) else {
            return Err(LinkError::IncompatibleType { name: name.to_owned(), reason: "counterpart is not a struct".into() });
        };
        let Some(dst_fields) = existing.body else {
            self.completions.push((target, fields, packed));
            return Ok(());
        };

        let incompatible = |reason: String| LinkError::IncompatibleType { name: name.to_owned(), reason };
        if existing.packed != packed {
            return Err(incompatible("packing differs".into()));
        }
        if dst_fields.len() != fields.len() {
            return Err(incompatible(format!("{} field(s) against {}", fields.len(), dst_fields.len())));
        }
        if let Some(i) = (0..fields.len()).find(|&i| fields[i] != dst_fields[i]) {
            return Err(incompatible(format!(
                "field {i} is {} against {}",
                self.dst.type_name(fields[i]),
                self.dst.type_name(dst_fields[i])
            )));
        }
        Ok(())
    }

    /// A named struct with no counterpart must be rebuilt if anything it
    /// contains maps elsewhere.
    fn needs_rebuild(&mut self, ty: TypeId) -> bool {
        if let Some(&memo) = self.rebuild.get(&ty) {
            return memo;
        }
        // Cycles close on the assumption that nothing moves.
        self.rebuild.insert(ty, false);
        let subtypes = self.src.ty(ty).subtypes();
        let result = subtypes.into_iter().any(|sub| self.moves(sub));
        self.rebuild.insert(ty, result);
        result
    }

    fn moves(&mut self, ty: TypeId) -> bool {
        if let Some(&mapped) = self.map.get(&ty) {
            return mapped != ty;
        }
        if let Some(name) = self.src.struct_name(ty) {
            if let Some(&target) = self.counterparts.get(canonical_name(&name)) {
                return target != ty;
            }
        }
        self.needs_rebuild(ty)
    }

    /// Gives bodies to opaque destination structs whose source side had one.
    pub(crate) fn complete_opaque_structs(&mut self) {
        for (target, fields, packed) in self.completions.drain(..) {
            if self.dst.struct_fields(target).is_none() {
                self.dst.set_struct_body(target, &fields, packed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::canonical_name;

    #[test]
    fn canonical_names() {
        assert_eq!(canonical_name("struct.Vec3"), "Vec3");
        assert_eq!(canonical_name("struct.Vec3.12"), "Vec3");
        assert_eq!(canonical_name("class.geo::Shape.1"), "geo::Shape");
        assert_eq!(canonical_name("class.Outer.Inner.3"), "Outer.Inner");
        assert_eq!(canonical_name("Vec3.2.1"), "Vec3");
        assert_eq!(canonical_name("plain"), "plain");
    }
}
