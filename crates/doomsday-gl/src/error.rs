//! Deferred GL error types.

use thiserror::Error;

/// Errors from the deferred GL queue and the reserved name pool.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferError {
    /// The queue has not been initialized.
    #[error("deferred GL queue used before init")]
    NotInitialized,

    /// `init` was called twice.
    #[error("deferred GL queue already initialized")]
    AlreadyInitialized,

    /// A GL-thread-only operation was called from another thread.
    #[error("operation must run on the GL thread")]
    WrongThread,

    /// The GL thread asked for a reserved name while the pool was empty.
    /// Only the GL thread refills the pool, so waiting would never end.
    #[error("GL thread would wait on its own name pool")]
    WouldDeadlock,

    /// The queue shut down while the caller was waiting.
    #[error("deferred GL queue shut down")]
    ShutDown,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, DeferError>;
