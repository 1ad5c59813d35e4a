pub mod ast;
pub mod cast;
pub mod config;
pub mod error;

pub use ast::{Compiler, CompiledQuery, DialectKind, Node};
pub use config::Config;
pub use error::{CompileError, Result};
