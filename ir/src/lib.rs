//! Host IR substrate: a typed, LLVM-shaped module representation with
//! side-table metadata, a function builder, a text printer and a reference
//! interpreter.

pub mod builder;
pub mod context;
pub mod errors;
pub mod function;
pub mod global;
pub mod instruction;
pub mod interp;
pub mod ir_hasher;
pub mod layout;
pub mod metadata;
pub mod module;
pub mod pretty;
pub mod symbol_table;
pub mod types;
pub mod value;

pub use builder::FunctionBuilder;
pub use context::Context;
pub use errors::{InterpError, LayoutError};
pub use function::{BasicBlock, Function, Linkage};
pub use global::{GlobalAlias, GlobalCtor, GlobalVariable};
pub use instruction::{BinOp, CastOp, Inst, InstData};
pub use interp::{Interpreter, Memory, RtValue};
pub use layout::{DataLayout, Layout, StructLayout};
pub use metadata::{MdNode, MdNodeId, MdOperand, MetadataTable, NamedMetadata};
pub use module::Module;
pub use symbol_table::SymbolTable;
pub use types::{StructType, Type, TypeId, TypeList};
pub use value::{AliasId, BlockId, Constant, FuncId, GlobalId, GlobalRef, InstId, Value};
