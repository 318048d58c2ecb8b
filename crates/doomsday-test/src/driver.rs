//! A GL driver that records calls instead of touching a GPU.

use doomsday_gl::{GlDriver, TextureContent};

/// One recorded driver call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverEvent {
    Upload { name: u32, bytes: usize },
    Vsync(bool),
    Generated(Vec<u32>),
    Deleted(Vec<u32>),
}

/// Hands out texture names 1, 2, 3, ... and records every call.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    last_name: u32,
    pub events: Vec<DriverEvent>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of uploaded textures, in upload order.
    pub fn uploads(&self) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DriverEvent::Upload { name, .. } => Some(*name),
                _ => None,
            })
            .collect()
    }

    /// Total names generated so far.
    pub const fn generated_count(&self) -> u32 {
        self.last_name
    }
}

impl GlDriver for RecordingDriver {
    fn upload_texture(&mut self, content: &TextureContent) {
        self.events.push(DriverEvent::Upload {
            name: content.name,
            bytes: content.pixels.len(),
        });
    }

    fn set_vsync(&mut self, on: bool) {
        self.events.push(DriverEvent::Vsync(on));
    }

    fn generate_texture_names(&mut self, count: usize) -> Vec<u32> {
        let first = self.last_name + 1;
        self.last_name += count as u32;
        let names: Vec<u32> = (first..=self.last_name).collect();
        self.events.push(DriverEvent::Generated(names.clone()));
        names
    }

    fn delete_texture_names(&mut self, names: &[u32]) {
        self.events.push(DriverEvent::Deleted(names.to_vec()));
    }
}
