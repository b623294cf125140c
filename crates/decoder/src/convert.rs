//! CPU NV12 → RGBA8 conversion for backends that cannot sample planar textures.
//!
//! Input is a tightly packed NV12 buffer as produced by
//! [`PixelFormat::Nv12`](fp_common::PixelFormat): a `width * height` luma
//! plane followed by interleaved UV at half resolution (rounded up for odd
//! dimensions). BT.709 limited range, fixed-point with 10 fractional bits:
//!
//! ```text
//! R = 1.164 (Y - 16) + 1.793 (V - 128)
//! G = 1.164 (Y - 16) - 0.213 (U - 128) - 0.533 (V - 128)
//! B = 1.164 (Y - 16) + 2.112 (U - 128)
//! ```

use fp_common::PixelFormat;
use thiserror::Error;

const Y_SCALE: i32 = 1192; // 1.164 * 1024
const V_TO_R: i32 = 1836; // 1.793 * 1024
const U_TO_G: i32 = 218; // 0.213 * 1024
const V_TO_G: i32 = 546; // 0.533 * 1024
const U_TO_B: i32 = 2163; // 2.112 * 1024
const ROUND: i32 = 512;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("NV12 buffer has {got} bytes, expected {expected}")]
    LengthMismatch { expected: usize, got: usize },
}

#[inline(always)]
fn clamp_u8(val: i32) -> u8 {
    val.clamp(0, 255) as u8
}

/// Chroma contribution shared by the pixels of one 2x2 block.
#[derive(Copy, Clone)]
struct Chroma {
    r: i32,
    g: i32,
    b: i32,
}

impl Chroma {
    #[inline]
    fn new(u: u8, v: u8) -> Self {
        let u = u as i32 - 128;
        let v = v as i32 - 128;
        Self {
            r: V_TO_R * v,
            g: -U_TO_G * u - V_TO_G * v,
            b: U_TO_B * u,
        }
    }

    #[inline]
    fn apply(self, y: u8, out: &mut [u8]) {
        let luma = Y_SCALE * (y as i32 - 16);
        out[0] = clamp_u8((luma + self.r + ROUND) >> 10);
        out[1] = clamp_u8((luma + self.g + ROUND) >> 10);
        out[2] = clamp_u8((luma + self.b + ROUND) >> 10);
        out[3] = 255;
    }
}

/// Convert a tightly packed NV12 frame into a newly allocated RGBA8 buffer.
pub fn nv12_to_rgba(nv12: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ConvertError> {
    if width == 0 || height == 0 {
        return Err(ConvertError::InvalidDimensions { width, height });
    }
    let expected = PixelFormat::Nv12.frame_byte_size(width, height);
    if nv12.len() != expected {
        return Err(ConvertError::LengthMismatch {
            expected,
            got: nv12.len(),
        });
    }

    let w = width as usize;
    let h = height as usize;
    let uv_stride = w.div_ceil(2) * 2;
    let (y_plane, uv_plane) = nv12.split_at(w * h);

    let mut rgba = vec![0u8; w * h * 4];
    for (row, out_row) in rgba.chunks_exact_mut(w * 4).enumerate() {
        let luma = &y_plane[row * w..(row + 1) * w];
        let chroma_row = &uv_plane[(row / 2) * uv_stride..(row / 2 + 1) * uv_stride];

        // Each UV pair covers two luma samples on this row.
        for ((pair, uv), out) in luma
            .chunks(2)
            .zip(chroma_row.chunks_exact(2))
            .zip(out_row.chunks_mut(8))
        {
            let chroma = Chroma::new(uv[0], uv[1]);
            for (i, y) in pair.iter().enumerate() {
                chroma.apply(*y, &mut out[i * 4..i * 4 + 4]);
            }
        }
    }
    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, y: u8, u: u8, v: u8) -> Vec<u8> {
        let luma = (width * height) as usize;
        let chroma_pairs = (width.div_ceil(2) * height.div_ceil(2)) as usize;
        let mut buf = vec![y; luma];
        for _ in 0..chroma_pairs {
            buf.push(u);
            buf.push(v);
        }
        buf
    }

    #[test]
    fn black_and_white() {
        let black = nv12_to_rgba(&solid(4, 2, 16, 128, 128), 4, 2).unwrap();
        assert!(black.chunks(4).all(|p| p == [0, 0, 0, 255]));

        let white = nv12_to_rgba(&solid(4, 2, 235, 128, 128), 4, 2).unwrap();
        assert!(white.chunks(4).all(|p| p == [255, 255, 255, 255]));
    }

    #[test]
    fn red_dominates_with_high_v() {
        let rgba = nv12_to_rgba(&solid(2, 2, 81, 90, 240), 2, 2).unwrap();
        let px = &rgba[..4];
        assert!(px[0] > 200, "red {}", px[0]);
        assert!(px[1] < 60, "green {}", px[1]);
        assert!(px[2] < 60, "blue {}", px[2]);
    }

    #[test]
    fn odd_dimensions() {
        let rgba = nv12_to_rgba(&solid(3, 3, 126, 128, 128), 3, 3).unwrap();
        assert_eq!(rgba.len(), 3 * 3 * 4);
        assert!(rgba.chunks(4).all(|p| p[0] == p[1] && p[1] == p[2] && p[3] == 255));
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(
            nv12_to_rgba(&[0u8; 10], 4, 2),
            Err(ConvertError::LengthMismatch {
                expected: 12,
                got: 10
            })
        );
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!(matches!(
            nv12_to_rgba(&[], 0, 2),
            Err(ConvertError::InvalidDimensions { .. })
        ));
    }
}
