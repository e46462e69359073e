//! Error types for the execution context and its utilities.

use thiserror::Error;

/// Errors raised while building or mutating an [`ExecutionContext`](crate::ExecutionContext).
///
/// Failures of the evaluated code itself are never reported through this
/// type; they are folded into the captured diagnostic text.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Lua VM operation failed.
    #[error("lua error: {0}")]
    Lua(#[from] mlua::Error),

    /// A binding name is unusable.
    #[error("invalid binding name: {0:?}")]
    InvalidName(String),
}

/// Validation failures of the context utility library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UtilityError {
    /// Pattern exceeds the length limit.
    #[error("pattern too long: {length} characters (max {max})")]
    PatternTooLong { length: usize, max: usize },

    /// Pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
