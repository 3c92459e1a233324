use super::backend::{CameraDevice, DeviceInfo, DeviceParameters, FrameCallback};
use crate::error::{CameraError, Result};
use crate::frame::Resolution;
use tracing::{debug, info, warn};

/// Owns an open device and guarantees it is released exactly once.
///
/// Dropping a handle that was not released explicitly stops streaming and
/// releases the device.
pub struct DeviceHandle {
    device: Option<Box<dyn CameraDevice>>,
    info: DeviceInfo,
    streaming: bool,
}

impl DeviceHandle {
    pub fn new(device: Box<dyn CameraDevice>) -> Self {
        let info = device.info();
        debug!("Acquired camera handle {} ({:?})", info.id, info.facing);
        Self {
            device: Some(device),
            info,
            streaming: false,
        }
    }

    pub fn info(&self) -> DeviceInfo {
        self.info
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn device_mut(&mut self) -> Result<&mut Box<dyn CameraDevice>> {
        self.device.as_mut().ok_or_else(|| {
            CameraError::InvalidState {
                details: format!("camera {} was already released", self.info.id),
            }
            .into()
        })
    }

    pub fn supported_preview_sizes(&mut self) -> Result<Vec<Resolution>> {
        self.device_mut()?.supported_preview_sizes()
    }

    pub fn configure(&mut self, params: &DeviceParameters) -> Result<()> {
        self.device_mut()?.configure(params)
    }

    pub fn start_streaming(&mut self, callback: FrameCallback) -> Result<()> {
        self.device_mut()?.start_streaming(callback)?;
        self.streaming = true;
        Ok(())
    }

    /// Stop streaming and release the device
    pub fn release(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(mut device) = self.device.take() else {
            return;
        };

        if self.streaming {
            if let Err(e) = device.stop_streaming() {
                warn!("Failed to stop camera {} cleanly: {}", self.info.id, e);
            }
            self.streaming = false;
        }

        device.release();
        info!("Released camera handle {}", self.info.id);
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if self.device.is_some() {
            debug!("Camera handle {} dropped while open", self.info.id);
            self.shutdown();
        }
    }
}
