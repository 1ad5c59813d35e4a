use thiserror::Error;

use crate::cast::CastError;

/// Failure of a single compile call. Any text accumulated before the error
/// must be discarded.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The node kind has no rendering in the selected dialect, which means the
    /// tree was built for a different database.
    #[error("{node} is not supported by the {dialect} dialect")]
    Unsupported {
        node: &'static str,
        dialect: &'static str,
    },
    #[error(transparent)]
    Cast(#[from] CastError),
}

pub type Result<T, E = CompileError> = std::result::Result<T, E>;
