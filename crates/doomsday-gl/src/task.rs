//! Deferred task payloads.

use std::fmt;

use crate::driver::{GlDriver, TextureContent};

/// A raw GL call captured with its arguments.
///
/// The queue does not know which entry point the function wraps; arrays are
/// owned copies so the caller's buffers need not outlive the call.
#[derive(Clone)]
pub enum GlCall {
    Enum(fn(u32), u32),
    Int(fn(i32), i32),
    EnumFloat(fn(u32, f32), u32, f32),
    EnumFloatArray(fn(u32, &[f32]), u32, Vec<f32>),
    UintArray(fn(&[u32]), Vec<u32>),
}

impl GlCall {
    fn invoke(&self) {
        match self {
            Self::Enum(f, e) => f(*e),
            Self::Int(f, i) => f(*i),
            Self::EnumFloat(f, e, v) => f(*e, *v),
            Self::EnumFloatArray(f, e, values) => f(*e, values),
            Self::UintArray(f, values) => f(values),
        }
    }

    const fn shape(&self) -> &'static str {
        match self {
            Self::Enum(..) => "enum",
            Self::Int(..) => "int",
            Self::EnumFloat(..) => "enum_float",
            Self::EnumFloatArray(..) => "enum_float_array",
            Self::UintArray(..) => "uint_array",
        }
    }
}

impl fmt::Debug for GlCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("GlCall");
        s.field("shape", &self.shape());
        match self {
            Self::Enum(_, e) => s.field("enum", e),
            Self::Int(_, i) => s.field("int", i),
            Self::EnumFloat(_, e, v) => s.field("enum", e).field("value", v),
            Self::EnumFloatArray(_, e, values) => s.field("enum", e).field("values", &values.len()),
            Self::UintArray(_, values) => s.field("values", &values.len()),
        };
        s.finish()
    }
}

/// A pending GL operation, owned by the queue until drained or purged.
#[derive(Clone, Debug)]
pub enum DeferredTask {
    UploadTexture(Box<TextureContent>),
    SetVsync(bool),
    Call(GlCall),
}

impl DeferredTask {
    /// Run the task on the GL thread, consuming it.
    pub(crate) fn execute(self, driver: &mut dyn GlDriver) {
        match self {
            Self::UploadTexture(content) => driver.upload_texture(&content),
            Self::SetVsync(on) => driver.set_vsync(on),
            Self::Call(call) => call.invoke(),
        }
    }
}
