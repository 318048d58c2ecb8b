//! The GL call surface used by drained tasks.

use serde::{Deserialize, Serialize};

/// Pixel layout of texture content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Luminance,
    LuminanceAlpha,
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Luminance => 1,
            Self::LuminanceAlpha => 2,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

/// Pixels to upload into an already named texture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureContent {
    /// GL texture name, typically taken from the reserved pool.
    pub name: u32,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub generate_mipmaps: bool,
    pub pixels: Vec<u8>,
}

impl TextureContent {
    /// Copy typed pixel data into new texture content.
    pub fn from_pixels<T: bytemuck::Pod>(
        name: u32,
        format: PixelFormat,
        width: u32,
        height: u32,
        pixels: &[T],
    ) -> Self {
        Self {
            name,
            format,
            width,
            height,
            generate_mipmaps: false,
            pixels: bytemuck::cast_slice(pixels).to_vec(),
        }
    }

    #[must_use]
    pub const fn with_mipmaps(mut self, generate: bool) -> Self {
        self.generate_mipmaps = generate;
        self
    }

    /// Bytes the dimensions and format call for.
    pub const fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Whether `pixels` holds exactly one full image.
    pub fn is_complete(&self) -> bool {
        self.pixels.len() == self.expected_len()
    }
}

/// Graphics API entry points. Every method runs on the GL thread.
pub trait GlDriver {
    /// Upload pixels into `content.name`.
    fn upload_texture(&mut self, content: &TextureContent);

    fn set_vsync(&mut self, on: bool);

    /// Allocate `count` fresh texture names in one call.
    fn generate_texture_names(&mut self, count: usize) -> Vec<u32>;

    fn delete_texture_names(&mut self, names: &[u32]);
}
