//! Interface and class discovery from mangled symbol names.
//!
//! Undefined method declarations are grouped into interfaces and strong
//! method definitions into classes, keyed by the owning type's qualified
//! name. The `self` type is the struct the first parameter points at.

use std::collections::BTreeMap;
use std::rc::Rc;

use ir::{FuncId, Function, TypeId};

use crate::errors::AbiError;
use crate::interface::Interface;
use crate::module::{ClassId, Module};

/// A method symbol split into its owner and its leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedName {
    /// Owner path joined with `::`.
    pub qualified_name: String,
    pub path: Vec<String>,
    /// Leaf identifier through the end of the symbol, parameters included.
    pub method_name: String,
}

pub trait NameDecoder {
    /// `None` for symbols that are not plain nested method names.
    fn decode(&self, symbol: &str) -> Option<DecodedName>;
}

/// Decoder for Itanium C++ nested names: `_ZN [r][V][K] [R|O] <len id>+ E ...`.
///
/// Templates, substitutions, constructors, destructors and operators are
/// not methods an interface can be built from and decode to `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItaniumDecoder;

impl NameDecoder for ItaniumDecoder {
    fn decode(&self, symbol: &str) -> Option<DecodedName> {
        if !symbol.starts_with("_ZN") {
            return None;
        }
        let bytes = symbol.as_bytes();
        let mut pos = 3;

        for qualifier in [b'r', b'V', b'K'] {
            if bytes.get(pos) == Some(&qualifier) {
                pos += 1;
            }
        }
        if matches!(bytes.get(pos), Some(b'R' | b'O')) {
            pos += 1;
        }

        // (start of identifier, identifier)
        let mut parts: Vec<(usize, &str)> = Vec::new();
        loop {
            match bytes.get(pos)? {
                b'E' => break,
                b'0'..=b'9' => {
                    let digits = bytes[pos..].iter().take_while(|b| b.is_ascii_digit()).count();
                    let start = pos.checked_add(digits)?;
                    let len: usize = symbol.get(pos..start)?.parse().ok()?;
                    let end = start.checked_add(len)?;
                    let ident = symbol.get(start..end)?;
                    parts.push((start, ident));
                    pos = end;
                }
                _ => return None,
            }
        }

        let (&(leaf_start, _), path) = parts.split_last()?;
        if path.is_empty() {
            return None;
        }
        let path: Vec<String> = path.iter().map(|(_, p)| (*p).to_owned()).collect();
        Some(DecodedName {
            qualified_name: path.join("::"),
            path,
            method_name: symbol[leaf_start..].to_owned(),
        })
    }
}

struct Group {
    self_ty: TypeId,
    names: Vec<String>,
    qualified_names: Vec<String>,
    functions: Vec<FuncId>,
    types: Vec<TypeId>,
}

/// Struct the first parameter of `function` points at.
fn self_type(ctx: &ir::Context, function: &Function) -> Option<TypeId> {
    let first = *ctx.function_params(function.ty).first()?;
    let pointee = ctx.pointee_type(first)?;
    ctx.is_struct(pointee).then_some(pointee)
}

fn group_methods(
    module: &ir::Module,
    decoder: &impl NameDecoder,
    select: impl Fn(&Function) -> bool,
) -> Result<BTreeMap<String, Group>, AbiError> {
    let ctx = module.context();
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();
    for (id, function) in module.functions() {
        if !select(function) {
            continue;
        }
        let Some(decoded) = decoder.decode(function.name()) else {
            continue;
        };
        let Some(self_ty) = self_type(ctx, function) else {
            continue;
        };
        let group = groups.entry(decoded.qualified_name.clone()).or_insert_with(|| Group {
            self_ty,
            names: Vec::new(),
            qualified_names: Vec::new(),
            functions: Vec::new(),
            types: Vec::new(),
        });
        if group.self_ty != self_ty {
            return Err(AbiError::InconsistentSelfType {
                qualified_name: decoded.qualified_name,
                symbol: function.name().to_owned(),
            });
        }
        group.names.push(decoded.method_name);
        group.qualified_names.push(function.name().to_owned());
        group.functions.push(id);
        group.types.push(function.ty);
    }
    Ok(groups)
}

impl Module {
    /// One interface per owner type of the module's undefined methods.
    pub fn interfaces_from_abi(&self, decoder: &impl NameDecoder) -> Result<Vec<Rc<Interface>>, AbiError> {
        let groups = group_methods(self.ir(), decoder, Function::is_declaration_for_linker)?;
        Ok(groups
            .into_values()
            .map(|g| Interface::get(self.context(), g.self_ty, &g.names, &g.qualified_names, &g.types))
            .collect())
    }

    /// The class called `name`, creating it from the module's strong method
    /// definitions if it does not exist yet.
    pub fn get_or_load_class_from_abi(
        &mut self,
        name: &str,
        decoder: &impl NameDecoder,
    ) -> Result<Option<ClassId>, AbiError> {
        if let Some(id) = self.get_class(name) {
            return Ok(Some(id));
        }
        let mut groups = group_methods(self.ir(), decoder, Function::is_strong_definition_for_linker)?;
        Ok(groups
            .remove(name)
            .map(|g| self.create_class(g.self_ty, &g.names, &g.functions, name)))
    }

    /// Every class the module's strong method definitions describe, reusing
    /// classes that already exist by name.
    pub fn get_or_load_all_classes_from_abi(&mut self, decoder: &impl NameDecoder) -> Result<Vec<ClassId>, AbiError> {
        let groups = group_methods(self.ir(), decoder, Function::is_strong_definition_for_linker)?;
        let mut classes = Vec::with_capacity(groups.len());
        for (name, g) in groups {
            let id = match self.get_class(&name) {
                Some(id) => id,
                None => self.create_class(g.self_ty, &g.names, &g.functions, name),
            };
            classes.push(id);
        }
        Ok(classes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(symbol: &str) -> Option<DecodedName> {
        ItaniumDecoder.decode(symbol)
    }

    #[test]
    fn splits_const_method() {
        let d = decode("_ZNK5Shape4areaEv").unwrap();
        assert_eq!(d.qualified_name, "Shape");
        assert_eq!(d.path, vec!["Shape"]);
        assert_eq!(d.method_name, "areaEv");
    }

    #[test]
    fn joins_namespaces() {
        let d = decode("_ZN3geo6detail5Shape5scaleEf").unwrap();
        assert_eq!(d.qualified_name, "geo::detail::Shape");
        assert_eq!(d.method_name, "scaleEf");
    }

    #[test]
    fn keeps_overloads_apart() {
        let a = decode("_ZN5Shape5scaleEf").unwrap();
        let b = decode("_ZN5Shape5scaleEff").unwrap();
        assert_ne!(a.method_name, b.method_name);
    }

    #[test]
    fn rejects_non_method_names() {
        assert_eq!(decode("main"), None);
        assert_eq!(decode("_Z4freev"), None);
        assert_eq!(decode("_ZN5ShapeC2Ev"), None);
        assert_eq!(decode("_ZN5Shape4areaIiEEvv"), None);
        assert_eq!(decode("_ZN4areaEv"), None);
        assert_eq!(decode("_ZN5Sha"), None);
    }

    #[test]
    fn oversized_lengths_do_not_decode() {
        assert_eq!(decode("_ZN18446744073709551615aE"), None);
        assert_eq!(decode("_ZN99999999999999999999999aE"), None);
        assert_eq!(decode("_ZN5Shape4294967295areaEv"), None);
    }
}
