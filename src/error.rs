//! Exposes the deimos error type

use thiserror::Error;

use crate::graph::frame_graph::Phase;

/// Error type that deimos can return.
#[derive(Error, Debug)]
pub enum Error {
    /// A declaration targeted a handle that was renamed away by a later write.
    #[error("Stale handle to resource `{name}`: handle has version {version}, resource is at version {current}")]
    InvalidHandle {
        name: String,
        version: u32,
        current: u32,
    },
    /// An execution callback accessed a resource its pass never declared.
    #[error("Pass `{pass}` accessed resource `{name}` without declaring it")]
    UndeclaredAccess { pass: String, name: String },
    /// A typed accessor was invoked with a resource kind different from the stored one.
    #[error("Resource `{0}` was requested as a different kind than it was registered with")]
    WrongKind(String),
    /// An operation was attempted in a lifecycle phase where it is not legal.
    #[error("`{operation}` is not legal in the {phase:?} phase")]
    WrongPhase {
        operation: &'static str,
        phase: Phase,
    },
    /// An execution callback captures more state than the inline limit allows.
    #[error("Execution callback of pass `{pass}` captures {size} bytes, the limit is {limit}")]
    CaptureTooLarge {
        pass: String,
        size: usize,
        limit: usize,
    },
    /// A pass declared a read on a resource it already creates or writes.
    #[error("Pass `{pass}` declares a read on `{name}`, which it already creates or writes")]
    ConflictingAccess { pass: String, name: String },
    /// Handle does not belong to this graph.
    #[error("Unknown resource handle. Was it obtained from a different graph?")]
    NodeNotFound,
}
