//! Link-time support for interface dispatch in LLVM-shaped GPU modules.
//!
//! Source units declare interface methods and define class methods. A
//! [`Module`] keeps the classes, dispatchers and entry points it owns in sync
//! with metadata records in its IR module, so that records survive linking.
//! [`finalize_interfaces`] emits a dispatcher for every implemented interface
//! and links it into the program: each dispatch function loads the `i32`
//! kind tag at the front of `self` and calls the matching class method.

pub mod abi;
pub mod algorithm;
pub mod class;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod entry_point;
pub mod errors;
pub mod interface;
pub mod linker;
pub mod logging;
mod members;
pub mod module;
pub mod records;

pub use abi::{DecodedName, ItaniumDecoder, NameDecoder};
pub use class::{Class, ClassLayout, ClassMethod, ConcreteMethod, Implementation};
pub use config::{Config, Language, Version};
pub use context::Context;
pub use dispatcher::{DispatchTable, Dispatcher, DispatcherMethod};
pub use entry_point::{EntryPoint, EntryPointArgument, EntryPointKind};
pub use errors::{AbiError, DispatcherError, LinkError, ModuleError, RecordError};
pub use interface::{Interface, InterfaceId, InterfaceMethod};
pub use linker::{Linker, canonical_name, finalize_interfaces, link_modules};
pub use module::{ClassId, DispatcherId, EntryPointId, Module, ModuleId};
