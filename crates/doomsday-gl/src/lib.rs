//! Deferred GL work for the Doomsday engine.
//!
//! This crate provides:
//! - A FIFO of GL tasks enqueued from any thread and drained on the GL thread
//! - A pool of reserved texture names for threads without a GL context
//! - Busy-mode routing of texture uploads

pub mod busy;
pub mod deferred;
pub mod driver;
pub mod error;
pub mod task;

pub use busy::{BusyMode, TextureUploader, UploadRoute};
pub use deferred::{DeferredConfig, DeferredGl, QueueState};
pub use driver::{GlDriver, PixelFormat, TextureContent};
pub use error::{DeferError, Result};
pub use task::{DeferredTask, GlCall};
