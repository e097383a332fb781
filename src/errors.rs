use thiserror::Error;

/// A persisted side-table record does not have the expected shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("{record} record {node} has {found} operand(s), expected {expected}")]
    Arity { record: &'static str, node: u32, expected: usize, found: usize },

    #[error("{record} record {node}: operand {index} is not a {expected}")]
    Operand { record: &'static str, node: u32, index: usize, expected: &'static str },

    #[error("{record} record refers to missing node {node}")]
    MissingNode { record: &'static str, node: u32 },

    #[error("dispatch function {0} has no switch on its kind")]
    MissingSwitch(String),

    #[error("dispatcher record lists {found} function(s) for an interface with {expected} method(s)")]
    MethodCount { expected: usize, found: usize },

    #[error("record refers to a function that no longer exists")]
    DanglingFunction,
}

/// A dispatcher could not be built or changed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatcherError {
    // Every interface method needs a pointer `self` to load the kind from.
    #[error("interface method {method} does not take a pointer as its first parameter")]
    InvalidSelfParameter { method: String },

    // Dispatch tables only grow; see `Dispatcher::remove_implementation`.
    #[error("removing implementation {kind} is not supported")]
    RemovalUnsupported { kind: u32 },
}

/// Name-based discovery of interfaces and classes failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("{symbol} disagrees with the other methods of {qualified_name} about the self type")]
    InconsistentSelfType { qualified_name: String, symbol: String },
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("IR module was built on a different context")]
    ContextMismatch,

    #[error("dispatch function {0} still has uses")]
    FunctionInUse(String),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),

    #[error(transparent)]
    Abi(#[from] AbiError),
}

/// Linking failed. Conflicts are reported before the destination changes.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("type {name} cannot be reconciled with its counterpart: {reason}")]
    IncompatibleType { name: String, reason: String },

    #[error("{name} is a {src} in the source but a {dst} in the destination")]
    SymbolKindMismatch { name: String, src: &'static str, dst: &'static str },

    #[error("{name} has type {src} in the source but {dst} in the destination")]
    SignatureMismatch { name: String, src: String, dst: String },

    #[error("{0} is defined in both modules")]
    DuplicateDefinition(String),

    #[error("source value {0} was never mapped")]
    UnmappedValue(String),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
}
