pub mod error;

pub use error::{InterpError, LayoutError};
