//! GPU backend abstraction consumed by the texture importer.
//!
//! The renderer owns the real graphics device; the pipeline only needs a
//! narrow, synchronous surface for creating textures and getting pixels
//! into them. Implementations must be callable from any thread.

use crate::color::PixelFormat;
use crate::error::GpuError;
use crate::packet::{Bitmap, NativeFrame};

/// Opaque GPU texture handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Which external payloads the backend can import without a CPU copy.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ZeroCopySupport {
    pub native_frames: bool,
    pub bitmaps: bool,
}

/// Narrow texture interface implemented by the rendering backend.
pub trait GpuBackend: Send + Sync {
    /// Allocate a 2D texture.
    fn create_texture(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<TextureHandle, GpuError>;

    /// Upload tightly packed pixels covering the whole texture.
    fn upload_pixels(&self, texture: TextureHandle, pixels: &[u8]) -> Result<(), GpuError>;

    /// Copy a platform decoder frame into the texture on the GPU.
    fn import_video_frame(
        &self,
        texture: TextureHandle,
        frame: &dyn NativeFrame,
    ) -> Result<(), GpuError>;

    /// Copy a captured bitmap into the texture on the GPU.
    fn import_image_bitmap(&self, texture: TextureHandle, bitmap: &dyn Bitmap) -> Result<(), GpuError>;

    fn destroy_texture(&self, texture: TextureHandle);

    fn zero_copy_support(&self) -> ZeroCopySupport;

    /// Whether textures of this format can be created and sampled.
    fn supports_format(&self, format: PixelFormat) -> bool {
        !format.is_planar()
    }
}
