use thiserror::Error;

/// A type could not be laid out in memory.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    // Opaque structs, functions and `void` have no size.
    #[error("type {0} is unsized")]
    Unsized(String),

    #[error("type {0} is not an aggregate")]
    NotAStruct(String),

    #[error("index {index} is out of range for {ty}")]
    FieldOutOfRange { ty: String, index: u32 },

    #[error("layout size overflow")]
    Overflow,
}

/// A failure while executing IR with the reference interpreter.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InterpError {
    #[error("no function named {0}")]
    UnknownFunction(String),

    // Calling something that only has a declaration.
    #[error("call to undefined function {0}")]
    UndefinedFunction(String),

    #[error("global {0} has no initializer")]
    UndefinedGlobal(String),

    #[error("{function}: block {block} has no terminator")]
    FellOffBlock { function: String, block: u32 },

    #[error("{0}: reached unreachable")]
    Unreachable(String),

    #[error("{function}: expected {expected} argument(s), got {found}")]
    ArgumentCount { function: String, expected: usize, found: usize },

    #[error("memory access of {len} byte(s) at {addr:#x} is out of bounds")]
    OutOfBounds { addr: u64, len: u64 },

    #[error("null pointer dereference")]
    NullDereference,

    #[error("callee is not a function")]
    BadCallee,

    #[error("division by zero")]
    DivisionByZero,

    #[error("operand kind mismatch in {0}")]
    TypeMismatch(&'static str),

    #[error("call depth limit of {0} exceeded")]
    StackOverflow(usize),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}
