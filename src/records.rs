//! Typed side-table schema.
//!
//! Every persisted object has a record type here with an `encode` that
//! writes metadata nodes and a `decode` that validates arity and operand
//! kinds before building anything.

use ir::{Constant, FuncId, GlobalRef, MdNodeId, MdOperand, MetadataTable, TypeId};

use crate::config::{Language, Version};
use crate::errors::RecordError;

pub const CLASS_LIST: &str = "llair.class";
pub const DISPATCHER_LIST: &str = "llair.dispatcher";
pub const VERSION_LIST: &str = "air.version";
pub const LANGUAGE_VERSION_LIST: &str = "air.language_version";

pub(crate) const ARG_NAME_KEY: &str = "air.arg_name";
pub(crate) const ARG_TYPE_NAME_KEY: &str = "air.arg_type_name";
pub(crate) const INTERFACE_KEY: &str = "air.interface";

// =====================================================
// Operand access
// =====================================================

/// Checked view over the operands of one record node.
pub(crate) struct Reader<'a> {
    record: &'static str,
    node: MdNodeId,
    operands: &'a [MdOperand],
    module: &'a ir::Module,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(module: &'a ir::Module, node: MdNodeId, record: &'static str) -> Result<Self, RecordError> {
        let md = module
            .metadata()
            .node(node)
            .ok_or(RecordError::MissingNode { record, node: node.index() as u32 })?;
        Ok(Self { record, node, operands: &md.operands, module })
    }

    pub(crate) fn len(&self) -> usize {
        self.operands.len()
    }

    pub(crate) fn expect_len(&self, expected: usize) -> Result<(), RecordError> {
        if self.operands.len() == expected {
            Ok(())
        } else {
            Err(self.arity(expected))
        }
    }

    pub(crate) fn expect_min_len(&self, expected: usize) -> Result<(), RecordError> {
        if self.operands.len() >= expected {
            Ok(())
        } else {
            Err(self.arity(expected))
        }
    }

    fn arity(&self, expected: usize) -> RecordError {
        RecordError::Arity {
            record: self.record,
            node: self.node.index() as u32,
            expected,
            found: self.operands.len(),
        }
    }

    fn operand_error(&self, index: usize, expected: &'static str) -> RecordError {
        RecordError::Operand { record: self.record, node: self.node.index() as u32, index, expected }
    }

    fn get(&self, index: usize, expected: &'static str) -> Result<&'a MdOperand, RecordError> {
        self.operands.get(index).ok_or_else(|| self.operand_error(index, expected))
    }

    pub(crate) fn string(&self, index: usize) -> Result<&'a str, RecordError> {
        match self.get(index, "string")? {
            MdOperand::String(s) => Ok(s),
            _ => Err(self.operand_error(index, "string")),
        }
    }

    pub(crate) fn int(&self, index: usize) -> Result<i64, RecordError> {
        match self.get(index, "integer")? {
            MdOperand::Int { value, .. } => Ok(*value),
            _ => Err(self.operand_error(index, "integer")),
        }
    }

    pub(crate) fn ty(&self, index: usize) -> Result<TypeId, RecordError> {
        match self.get(index, "type")? {
            MdOperand::Type(t) => Ok(*t),
            _ => Err(self.operand_error(index, "type")),
        }
    }

    pub(crate) fn node(&self, index: usize) -> Result<MdNodeId, RecordError> {
        match self.get(index, "node")? {
            MdOperand::Node(n) => Ok(*n),
            _ => Err(self.operand_error(index, "node")),
        }
    }

    pub(crate) fn function(&self, index: usize) -> Result<FuncId, RecordError> {
        match self.get(index, "function")? {
            MdOperand::Value(Constant::Global(GlobalRef::Function(f))) => {
                self.module.try_function(*f).ok_or(RecordError::DanglingFunction)?;
                Ok(*f)
            }
            _ => Err(self.operand_error(index, "function")),
        }
    }

    /// Reader over the node referenced by operand `index`.
    pub(crate) fn child(&self, index: usize, record: &'static str) -> Result<Reader<'a>, RecordError> {
        Reader::new(self.module, self.node(index)?, record)
    }
}

fn function_operand(f: FuncId) -> MdOperand {
    MdOperand::Value(Constant::function(f))
}

fn int_operand(value: u32) -> MdOperand {
    MdOperand::i32(i64::from(value))
}

// =====================================================
// Interface
// =====================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceMethodRecord {
    pub name: String,
    pub qualified_name: String,
    pub ty: TypeId,
}

/// `(type, (method...))`, method = `(name, qualified name, type)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    pub ty: TypeId,
    pub methods: Vec<InterfaceMethodRecord>,
}

impl InterfaceRecord {
    pub fn encode(&self, md: &mut MetadataTable) -> MdNodeId {
        let methods = self
            .methods
            .iter()
            .map(|m| {
                let node = md.create_node(vec![
                    MdOperand::string(&m.name),
                    MdOperand::string(&m.qualified_name),
                    MdOperand::Type(m.ty),
                ]);
                MdOperand::Node(node)
            })
            .collect();
        let methods = md.create_node(methods);
        md.create_node(vec![MdOperand::Type(self.ty), MdOperand::Node(methods)])
    }

    pub fn decode(module: &ir::Module, node: MdNodeId) -> Result<Self, RecordError> {
        let r = Reader::new(module, node, "interface")?;
        r.expect_len(2)?;
        let list = r.child(1, "interface method list")?;
        let mut methods = Vec::with_capacity(list.len());
        for i in 0..list.len() {
            let m = list.child(i, "interface method")?;
            m.expect_len(3)?;
            methods.push(InterfaceMethodRecord {
                name: m.string(0)?.to_owned(),
                qualified_name: m.string(1)?.to_owned(),
                ty: m.ty(2)?,
            });
        }
        Ok(Self { ty: r.ty(0)?, methods })
    }
}

// =====================================================
// Class
// =====================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMethodRecord {
    pub name: String,
    pub function: FuncId,
}

/// `(name, type, (method...))`, method = `(name, function)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRecord {
    pub name: String,
    pub ty: TypeId,
    pub methods: Vec<ClassMethodRecord>,
}

impl ClassRecord {
    pub fn encode(&self, md: &mut MetadataTable) -> MdNodeId {
        let methods = self
            .methods
            .iter()
            .map(|m| MdOperand::Node(md.create_node(vec![MdOperand::string(&m.name), function_operand(m.function)])))
            .collect();
        let methods = md.create_node(methods);
        md.create_node(vec![MdOperand::string(&self.name), MdOperand::Type(self.ty), MdOperand::Node(methods)])
    }

    pub fn decode(module: &ir::Module, node: MdNodeId) -> Result<Self, RecordError> {
        let r = Reader::new(module, node, "class")?;
        r.expect_len(3)?;
        let list = r.child(2, "class method list")?;
        let mut methods = Vec::with_capacity(list.len());
        for i in 0..list.len() {
            let m = list.child(i, "class method")?;
            m.expect_len(2)?;
            methods.push(ClassMethodRecord { name: m.string(0)?.to_owned(), function: m.function(1)? });
        }
        Ok(Self { name: r.string(0)?.to_owned(), ty: r.ty(1)?, methods })
    }

    /// Rewrites only the name operand, keeping the node's identity.
    pub(crate) fn rename(md: &mut MetadataTable, node: MdNodeId, name: &str) {
        md.replace_operand(node, 0, MdOperand::string(name));
    }
}

// =====================================================
// Dispatcher
// =====================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplementationRecord {
    pub kind: u32,
    pub class_name: String,
}

/// `(interface record, (function...), (implementation...))`,
/// implementation = `(i32 kind, class name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherRecord {
    pub interface: InterfaceRecord,
    pub functions: Vec<FuncId>,
    pub implementations: Vec<ImplementationRecord>,
}

impl DispatcherRecord {
    pub fn encode(&self, md: &mut MetadataTable) -> MdNodeId {
        let interface = self.interface.encode(md);
        let functions = md.create_node(self.functions.iter().copied().map(function_operand).collect());
        let implementations = Self::encode_implementations(md, &self.implementations);
        md.create_node(vec![
            MdOperand::Node(interface),
            MdOperand::Node(functions),
            MdOperand::Node(implementations),
        ])
    }

    pub fn encode_implementations(md: &mut MetadataTable, implementations: &[ImplementationRecord]) -> MdNodeId {
        let entries = implementations
            .iter()
            .map(|i| MdOperand::Node(md.create_node(vec![int_operand(i.kind), MdOperand::string(&i.class_name)])))
            .collect();
        md.create_node(entries)
    }

    /// Points an existing record at a fresh implementation list.
    pub(crate) fn replace_implementations(
        md: &mut MetadataTable,
        node: MdNodeId,
        implementations: &[ImplementationRecord],
    ) {
        let list = Self::encode_implementations(md, implementations);
        md.replace_operand(node, 2, MdOperand::Node(list));
    }

    pub fn decode(module: &ir::Module, node: MdNodeId) -> Result<Self, RecordError> {
        let r = Reader::new(module, node, "dispatcher")?;
        r.expect_len(3)?;
        let interface = InterfaceRecord::decode(module, r.node(0)?)?;

        let list = r.child(1, "dispatcher method list")?;
        let functions = (0..list.len()).map(|i| list.function(i)).collect::<Result<Vec<_>, _>>()?;
        if functions.len() != interface.methods.len() {
            return Err(RecordError::MethodCount { expected: interface.methods.len(), found: functions.len() });
        }

        let list = r.child(2, "implementation list")?;
        let mut implementations = Vec::with_capacity(list.len());
        for i in 0..list.len() {
            let entry = list.child(i, "implementation")?;
            entry.expect_len(2)?;
            implementations.push(ImplementationRecord {
                kind: entry.int(0)? as u32,
                class_name: entry.string(1)?.to_owned(),
            });
        }
        Ok(Self { interface, functions, implementations })
    }
}

// =====================================================
// Entry point
// =====================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentRecord {
    pub index: u32,
    pub name: String,
    pub type_name: String,
    pub interface: Option<InterfaceRecord>,
}

/// `(function, (), (argument...))`, argument = `(i32 index, "air.arg_name",
/// name, "air.arg_type_name", type name [, "air.interface", interface])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPointRecord {
    pub function: FuncId,
    pub arguments: Vec<ArgumentRecord>,
}

impl EntryPointRecord {
    pub fn encode(&self, md: &mut MetadataTable) -> MdNodeId {
        let outputs = md.create_node(Vec::new());
        let arguments = self
            .arguments
            .iter()
            .map(|a| {
                let mut ops = vec![
                    int_operand(a.index),
                    MdOperand::string(ARG_NAME_KEY),
                    MdOperand::string(&a.name),
                    MdOperand::string(ARG_TYPE_NAME_KEY),
                    MdOperand::string(&a.type_name),
                ];
                if let Some(interface) = &a.interface {
                    let node = interface.encode(md);
                    ops.push(MdOperand::string(INTERFACE_KEY));
                    ops.push(MdOperand::Node(node));
                }
                MdOperand::Node(md.create_node(ops))
            })
            .collect();
        let arguments = md.create_node(arguments);
        md.create_node(vec![function_operand(self.function), MdOperand::Node(outputs), MdOperand::Node(arguments)])
    }

    pub fn decode(module: &ir::Module, node: MdNodeId) -> Result<Self, RecordError> {
        let r = Reader::new(module, node, "entry point")?;
        r.expect_len(3)?;
        let function = r.function(0)?;
        r.node(1)?;

        let list = r.child(2, "argument list")?;
        let mut arguments = Vec::with_capacity(list.len());
        for i in 0..list.len() {
            let a = list.child(i, "argument")?;
            a.expect_min_len(1)?;
            let mut argument = ArgumentRecord {
                index: a.int(0)? as u32,
                name: String::new(),
                type_name: String::new(),
                interface: None,
            };
            // Keyed pairs; unknown keys belong to the wider argument schema.
            let mut k = 1;
            while k + 1 < a.len() {
                match a.string(k) {
                    Ok(ARG_NAME_KEY) => argument.name = a.string(k + 1)?.to_owned(),
                    Ok(ARG_TYPE_NAME_KEY) => argument.type_name = a.string(k + 1)?.to_owned(),
                    Ok(INTERFACE_KEY) => argument.interface = Some(InterfaceRecord::decode(module, a.node(k + 1)?)?),
                    _ => {}
                }
                k += 2;
            }
            arguments.push(argument);
        }
        Ok(Self { function, arguments })
    }
}

// =====================================================
// Module scalars
// =====================================================

pub fn write_version(md: &mut MetadataTable, version: Version) {
    let node = md.create_node(vec![
        int_operand(version.major),
        int_operand(version.minor),
        int_operand(version.patch),
    ]);
    *md.get_or_insert_named(VERSION_LIST) = vec![node];
}

pub fn read_version(module: &ir::Module) -> Result<Option<Version>, RecordError> {
    let Some(&node) = module.metadata().named_or_empty(VERSION_LIST).first() else {
        return Ok(None);
    };
    let r = Reader::new(module, node, "version")?;
    r.expect_len(3)?;
    Ok(Some(Version::new(r.int(0)? as u32, r.int(1)? as u32, r.int(2)? as u32)))
}

pub fn write_language(md: &mut MetadataTable, language: &Language) {
    let node = md.create_node(vec![
        MdOperand::string(&language.name),
        int_operand(language.version.major),
        int_operand(language.version.minor),
        int_operand(language.version.patch),
    ]);
    *md.get_or_insert_named(LANGUAGE_VERSION_LIST) = vec![node];
}

pub fn read_language(module: &ir::Module) -> Result<Option<Language>, RecordError> {
    let Some(&node) = module.metadata().named_or_empty(LANGUAGE_VERSION_LIST).first() else {
        return Ok(None);
    };
    let r = Reader::new(module, node, "language version")?;
    r.expect_len(4)?;
    Ok(Some(Language {
        name: r.string(0)?.to_owned(),
        version: Version::new(r.int(1)? as u32, r.int(2)? as u32, r.int(3)? as u32),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn module() -> ir::Module {
        ir::Module::new("records", Rc::new(ir::Context::default()))
    }

    #[test]
    fn class_record_survives_encode_decode() {
        let mut m = module();
        let ctx = Rc::clone(m.context());
        let ty = ctx.named_struct_type("struct.Square", &[ctx.float_type()], false);
        let fty = ctx.function_type(ctx.float_type(), &[ctx.pointer_type(ty, 0)], false);
        let f = m.add_function("_ZNK6Square4areaEv", fty, ir::Linkage::External);
        let record = ClassRecord {
            name: "Square".into(),
            ty,
            methods: vec![ClassMethodRecord { name: "areaEv".into(), function: f }],
        };
        let node = record.encode(m.metadata_mut());
        assert_eq!(ClassRecord::decode(&m, node).unwrap(), record);
    }

    #[test]
    fn wrong_arity_is_reported() {
        let mut m = module();
        let node = m.metadata_mut().create_node(vec![MdOperand::string("only a name")]);
        let err = ClassRecord::decode(&m, node).unwrap_err();
        assert!(matches!(err, RecordError::Arity { record: "class", expected: 3, found: 1, .. }));
    }

    #[test]
    fn wrong_operand_kind_is_reported() {
        let mut m = module();
        let list = m.metadata_mut().create_node(Vec::new());
        let node = m.metadata_mut().create_node(vec![
            MdOperand::i32(4),
            MdOperand::Null,
            MdOperand::Node(list),
        ]);
        let err = ClassRecord::decode(&m, node).unwrap_err();
        assert!(matches!(err, RecordError::Operand { index: 1, expected: "type", .. }));
    }

    #[test]
    fn versions_replace_the_previous_record() {
        let mut m = module();
        write_version(m.metadata_mut(), Version::new(2, 4, 0));
        write_version(m.metadata_mut(), Version::new(2, 5, 0));
        assert_eq!(m.metadata().named_or_empty(VERSION_LIST).len(), 1);
        assert_eq!(read_version(&m).unwrap(), Some(Version::new(2, 5, 0)));
    }
}
