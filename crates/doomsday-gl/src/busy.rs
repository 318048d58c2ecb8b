//! Choosing between immediate and deferred texture uploads.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;

use crate::deferred::DeferredGl;
use crate::driver::{GlDriver, TextureContent};
use crate::error::Result;

/// Process-wide "busy mode" flag, set while a loading screen owns the GL
/// thread and uploads must go through the queue.
#[derive(Debug, Default)]
pub struct BusyMode(AtomicBool);

impl BusyMode {
    pub const fn new(active: bool) -> Self {
        Self(AtomicBool::new(active))
    }

    pub fn set(&self, active: bool) {
        self.0.store(active, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How an upload request was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadRoute {
    Immediate,
    Deferred,
}

/// Routes texture uploads to the driver or the deferred queue.
#[derive(Clone, Copy, Debug)]
pub struct TextureUploader<'a> {
    queue: &'a DeferredGl,
    busy: &'a BusyMode,
}

impl<'a> TextureUploader<'a> {
    pub const fn new(queue: &'a DeferredGl, busy: &'a BusyMode) -> Self {
        Self { queue, busy }
    }

    /// Upload now when not busy and a driver is at hand; queue a copy
    /// otherwise. The choice is made once per call.
    pub fn upload(
        &self,
        content: &TextureContent,
        driver: Option<&mut dyn GlDriver>,
    ) -> Result<UploadRoute> {
        match driver {
            Some(driver) if !self.busy.is_active() => {
                driver.upload_texture(content);
                trace!(name = content.name, "Uploaded texture immediately");
                Ok(UploadRoute::Immediate)
            }
            _ => {
                self.queue.enqueue_texture_upload(content)?;
                trace!(name = content.name, "Deferred texture upload");
                Ok(UploadRoute::Deferred)
            }
        }
    }
}
