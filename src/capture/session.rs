use crate::frame::{Facing, Quality, Resolution};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Bytes in one packed output pixel
pub const BYTES_PER_PIXEL: u32 = 4;

/// The active capture: which device, at what size
#[derive(Debug, Clone, Serialize)]
pub struct CaptureSession {
    pub id: Uuid,
    pub device_id: u32,
    pub facing: Facing,
    pub quality: Quality,
    pub resolution: Resolution,
    pub started_at: DateTime<Utc>,
}

impl CaptureSession {
    pub fn new(device_id: u32, facing: Facing, quality: Quality, resolution: Resolution) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
            facing,
            quality,
            resolution,
            started_at: Utc::now(),
        }
    }

    pub fn info(&self) -> CaptureInfo {
        CaptureInfo {
            width: self.resolution.width,
            height: self.resolution.height,
            bytes_per_pixel: BYTES_PER_PIXEL,
            facing: Some(self.facing),
        }
    }
}

/// Capture description handed to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureInfo {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    pub facing: Option<Facing>,
}

impl Default for CaptureInfo {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            bytes_per_pixel: BYTES_PER_PIXEL,
            facing: None,
        }
    }
}
