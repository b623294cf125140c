//! Pixel formats of decoded frames and GPU textures.

use serde::{Deserialize, Serialize};

/// Pixel format in memory or on GPU.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 4 channels, 8 bits each.
    Rgba8,
    /// BGRA8 (some platform decoders and GPU APIs prefer this ordering).
    Bgra8,
    /// NV12: Y plane + interleaved UV at half resolution (HW decoder output).
    Nv12,
    /// I420: Y, U and V planes, chroma at half resolution.
    I420,
    /// 4 channels, 16-bit float.
    Rgba16F,
}

impl PixelFormat {
    pub fn is_planar(self) -> bool {
        matches!(self, Self::Nv12 | Self::I420)
    }

    /// Size in bytes of one tightly packed frame in this format.
    pub fn frame_byte_size(self, width: u32, height: u32) -> usize {
        let w = width as usize;
        let h = height as usize;
        match self {
            Self::Rgba8 | Self::Bgra8 => w * h * 4,
            Self::Rgba16F => w * h * 8,
            // Chroma planes round up for odd dimensions.
            Self::Nv12 => w * h + w.div_ceil(2) * 2 * h.div_ceil(2),
            Self::I420 => w * h + 2 * (w.div_ceil(2) * h.div_ceil(2)),
        }
    }
}
