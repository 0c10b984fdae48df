//! Error types for the Ink runtime.

use thiserror::Error;

/// Errors that can occur while loading a story image or running it.
///
/// Every fatal condition from the runtime's error-handling design has its own
/// variant so callers can match on the kind of failure rather than parse a
/// message string.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// The story image bytes are malformed or use an unsupported version.
    #[error("malformed story image: {0}")]
    Format(String),

    /// A fixed-capacity structure (eval stack, output stream, callstack,
    /// string table, list table) would exceed its configured bound.
    #[error("{what} capacity exceeded (limit {limit})")]
    Bounds {
        /// Which structure overflowed, e.g. `"eval stack"`.
        what: &'static str,
        /// The configured limit that was hit.
        limit: usize,
    },

    /// An operator was applied to an incompatible pair of operand types.
    #[error("type error: {op} not supported between {left} and {right}")]
    Type {
        /// The operator being applied.
        op: &'static str,
        /// Type name of the left operand.
        left: &'static str,
        /// Type name of the right operand.
        right: &'static str,
    },

    /// A call referenced an external function that was never bound.
    #[error("unknown external function: {0}")]
    UnknownFunction(String),

    /// A divert or variable reference named a container/global that does not
    /// exist in the loaded image.
    #[error("unknown name: {0}")]
    UnknownName(String),

    /// The output stream's save/restore checkpoint discipline was violated
    /// (double save, restore without save, or a read below the save point).
    /// This only happens on a VM-internal logic error, never from story
    /// content or host input.
    #[error("stream checkpoint misuse: {0}")]
    StreamMisuse(&'static str),

    /// A host-bound external function reported failure.
    #[error("external function `{name}` failed: {message}")]
    External {
        /// Name of the external function that failed.
        name: String,
        /// The failure message the binding supplied.
        message: String,
    },

    /// The instruction budget configured via [`crate::Limits`] was exceeded.
    #[error("instruction limit exceeded ({0} instructions)")]
    InstructionLimitExceeded(u64),

    /// Division, modulo, or floor-division by a zero operand.
    #[error("division by zero")]
    DivisionByZero,

    /// Catch-all for runtime conditions that don't warrant their own
    /// variant (malformed divert target, empty callstack pop, etc).
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
