use crate::error::FrameError;
use crate::frame::{ChromaOrder, PixelBuffer, RawFrame};
use tracing::trace;

const OPAQUE: u32 = 0xFF00_0000;

/// Semi-planar 4:2:0 to packed pixel conversion
pub struct FrameConverter;

impl FrameConverter {
    /// Convert a raw semi-planar frame into packed pixels.
    ///
    /// Each 2x2 luma block shares one chroma pair. With `flip` set the whole
    /// pixel sequence is reversed (a 180 degree turn, not a mirror).
    pub fn convert(raw: &RawFrame, flip: bool) -> Result<PixelBuffer, FrameError> {
        raw.validate()?;

        let width = raw.width as usize;
        let height = raw.height as usize;
        let luma_len = raw.luma_len();
        let last = luma_len - 1;
        let data = raw.data.as_slice();

        let mut pixels = vec![0u32; luma_len];

        for row in (0..height).step_by(2) {
            let chroma_row = luma_len + (row / 2) * width;

            for col in (0..width).step_by(2) {
                let pair = chroma_row + col;
                let (u, v) = match raw.chroma_order {
                    ChromaOrder::Vu => (data[pair + 1], data[pair]),
                    ChromaOrder::Uv => (data[pair], data[pair + 1]),
                };
                let u = u as i32 - 128;
                let v = v as i32 - 128;

                let top = row * width + col;
                let bottom = top + width;
                for index in [top, top + 1, bottom, bottom + 1] {
                    let out = if flip { last - index } else { index };
                    pixels[out] = yuv_to_packed(data[index], u, v);
                }
            }
        }

        trace!(
            "Converted frame {} ({}x{}, flip: {})",
            raw.id,
            raw.width,
            raw.height,
            flip
        );

        Ok(PixelBuffer::new(raw.id, raw.width, raw.height, flip, pixels))
    }
}

/// Convert one luma sample with centred chroma offsets.
///
/// Luma is used as-is, without a black-level offset. The red and blue chroma
/// terms are truncated toward zero on their own; green truncates the sum of
/// its two chroma terms. Clamping happens last.
pub fn yuv_to_packed(y: u8, u: i32, v: i32) -> u32 {
    let y = y as i32;
    let u = u as f32;
    let v = v as f32;

    let r = y + (1.772 * v) as i32;
    let g = y - (0.344 * u + 0.714 * v) as i32;
    let b = y + (1.402 * u) as i32;

    pack_rgb(clamp_channel(r), clamp_channel(g), clamp_channel(b))
}

/// Opaque alpha, then red in the lowest byte, green, blue.
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    OPAQUE | r as u32 | (g as u32) << 8 | (b as u32) << 16
}

fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}
