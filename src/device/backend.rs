use crate::error::Result;
use crate::frame::{Facing, RawFrame, Resolution};
use std::sync::Arc;

/// Invoked by the device for every captured frame, on a thread the device owns.
///
/// Calls never overlap for one device.
pub type FrameCallback = Arc<dyn Fn(RawFrame) + Send + Sync>;

/// Enumerated physical camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: u32,
    pub facing: Facing,
}

/// Parameter set applied before streaming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceParameters {
    pub preview_size: Resolution,
    /// Still size, kept equal to the preview size
    pub picture_size: Resolution,
    pub focus_mode: String,
}

impl DeviceParameters {
    pub fn for_preview(size: Resolution, focus_mode: &str) -> Self {
        Self {
            preview_size: size,
            picture_size: size,
            focus_mode: focus_mode.to_string(),
        }
    }
}

/// Camera subsystem: enumerates and opens devices
pub trait CameraBackend: Send + Sync {
    /// Physical cameras in enumeration order
    fn devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Open a device for exclusive use
    fn open(&self, id: u32) -> Result<Box<dyn CameraDevice>>;
}

/// An open hardware handle
pub trait CameraDevice: Send {
    fn info(&self) -> DeviceInfo;

    fn supported_preview_sizes(&self) -> Result<Vec<Resolution>>;

    fn configure(&mut self, params: &DeviceParameters) -> Result<()>;

    /// Bind the preview target, register `callback` and start delivering frames
    fn start_streaming(&mut self, callback: FrameCallback) -> Result<()>;

    /// Stop delivering frames. Returns once no further callback will start.
    fn stop_streaming(&mut self) -> Result<()>;

    /// Give the hardware back to the system
    fn release(&mut self);
}
