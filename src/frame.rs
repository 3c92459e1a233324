use crate::error::FrameError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Direction the sensor points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Selfie camera
    Front,
    Back,
}

impl Facing {
    /// Host constant (`CAMERA_TYPE_FRONT` / `CAMERA_TYPE_BACK`)
    pub fn code(&self) -> i32 {
        match self {
            Facing::Front => 0,
            Facing::Back => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Facing::Front),
            1 => Some(Facing::Back),
            _ => None,
        }
    }
}

/// Coarse selector over the device's supported preview sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    /// Host constant (`CAPTURE_QUALITY_LOW` .. `CAPTURE_QUALITY_HIGH`)
    pub fn code(&self) -> i32 {
        match self {
            Quality::Low => 0,
            Quality::Medium => 1,
            Quality::High => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Quality::Low),
            1 => Some(Quality::Medium),
            2 => Some(Quality::High),
            _ => None,
        }
    }

    /// Pick a resolution from `sizes`.
    ///
    /// Sizes are ordered by pixel area first, so `Low` is the smallest and
    /// `High` the largest. `Medium` takes index `ceil(count / 2)`, clamped to
    /// the last entry.
    pub fn select(&self, sizes: &[Resolution]) -> Option<Resolution> {
        if sizes.is_empty() {
            return None;
        }

        let mut ordered = sizes.to_vec();
        ordered.sort_by_key(|size| (size.area(), size.width));

        let count = ordered.len();
        let index = match self {
            Quality::Low => 0,
            Quality::High => count - 1,
            Quality::Medium => count.div_ceil(2).min(count - 1),
        };

        Some(ordered[index])
    }
}

/// Capture resolution in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Byte order of each interleaved chroma pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChromaOrder {
    /// V then U (NV21)
    #[default]
    Vu,
    /// U then V (NV12)
    Uv,
}

/// Display rotation reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    /// Get rotation angle in degrees
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Rotate0 => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Rotation::Rotate0),
            90 => Some(Rotation::Rotate90),
            180 => Some(Rotation::Rotate180),
            270 => Some(Rotation::Rotate270),
            _ => None,
        }
    }

    /// Whether frames are delivered reversed for this rotation.
    ///
    /// Only a full buffer reversal is applied. 270 degrees is grouped with
    /// 180; a true quarter turn would need a transpose, which is not done.
    pub fn flips(&self) -> bool {
        matches!(self, Rotation::Rotate180 | Rotation::Rotate270)
    }
}

/// Raw semi-planar 4:2:0 frame as delivered by the hardware callback
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Sequence number assigned by the device
    pub id: u64,
    /// Time the device handed the frame over
    pub timestamp: SystemTime,
    /// Luma plane followed by the interleaved chroma plane
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub chroma_order: ChromaOrder,
}

impl RawFrame {
    /// Create an NV21 frame
    pub fn new(id: u64, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id,
            timestamp: SystemTime::now(),
            data,
            width,
            height,
            chroma_order: ChromaOrder::Vu,
        }
    }

    pub fn with_chroma_order(mut self, chroma_order: ChromaOrder) -> Self {
        self.chroma_order = chroma_order;
        self
    }

    /// Byte length of a `width` x `height` semi-planar 4:2:0 buffer
    pub fn expected_size(width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        luma + luma / 2
    }

    /// Pack strided planes into a tightly packed frame.
    ///
    /// Each plane is given as `(bytes, stride)`; only the first `width` bytes
    /// of every row are kept.
    pub fn from_planes(
        id: u64,
        width: u32,
        height: u32,
        luma: (&[u8], usize),
        chroma: (&[u8], usize),
    ) -> Result<Self, FrameError> {
        let row = width as usize;
        let rows = height as usize;
        let expected = Self::expected_size(width, height);

        let planes = [(luma, rows), (chroma, rows / 2)];
        for ((bytes, stride), count) in planes {
            let needed = if count == 0 { 0 } else { stride * (count - 1) + row };
            if stride < row || bytes.len() < needed {
                return Err(FrameError::Malformed {
                    width,
                    height,
                    expected,
                    actual: luma.0.len() + chroma.0.len(),
                });
            }
        }

        let mut data = Vec::with_capacity(expected);
        for ((bytes, stride), count) in planes {
            for line in 0..count {
                let start = line * stride;
                data.extend_from_slice(&bytes[start..start + row]);
            }
        }

        Ok(Self::new(id, data, width, height))
    }

    pub fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Check dimensions and buffer length before any byte is read
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(FrameError::OddDimensions {
                width: self.width,
                height: self.height,
            });
        }

        let expected = Self::expected_size(self.width, self.height);
        if self.data.len() != expected {
            return Err(FrameError::Malformed {
                width: self.width,
                height: self.height,
                expected,
                actual: self.data.len(),
            });
        }

        Ok(())
    }
}

/// Packed 32-bit pixels, one per luma sample.
///
/// Each value is `0xFF000000 | R | G << 8 | B << 16`: red in the lowest byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    /// Id of the raw frame this buffer was converted from
    pub frame_id: u64,
    pub width: u32,
    pub height: u32,
    /// Whether the pixel sequence was reversed
    pub flipped: bool,
    pixels: Vec<u32>,
}

impl PixelBuffer {
    pub(crate) fn new(frame_id: u64, width: u32, height: u32, flipped: bool, pixels: Vec<u32>) -> Self {
        Self {
            frame_id,
            width,
            height,
            flipped,
            pixels,
        }
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u32> {
        self.pixels
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Pixel at column `x`, row `y` of the buffer as stored
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Unpack one packed value into `(r, g, b, a)`
    pub fn channels(pixel: u32) -> (u8, u8, u8, u8) {
        (
            (pixel & 0xFF) as u8,
            ((pixel >> 8) & 0xFF) as u8,
            ((pixel >> 16) & 0xFF) as u8,
            (pixel >> 24) as u8,
        )
    }

    /// Expand to 3 bytes per pixel, R G B
    pub fn to_rgb24(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.pixels.len() * 3);
        for &pixel in &self.pixels {
            let (r, g, b, _) = Self::channels(pixel);
            rgb.extend_from_slice(&[r, g, b]);
        }
        rgb
    }
}
