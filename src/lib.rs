pub mod capture;
pub mod config;
pub mod converter;
pub mod device;
pub mod error;
pub mod events;
pub mod frame;
pub mod host;

pub use capture::{
    CaptureController, CaptureControllerBuilder, CaptureInfo, CaptureSession, CaptureState,
    CaptureStats, PermissionState, StartOutcome,
};
pub use config::CamcaptureConfig;
pub use converter::FrameConverter;
pub use device::{CameraBackend, CameraDevice, DeviceHandle, MockCameraBackend};
#[cfg(all(target_os = "linux", feature = "gstreamer"))]
pub use device::GstCameraBackend;
pub use error::{CamcaptureError, ErrorKind, Result};
pub use events::{CameraEvent, CameraMessage, EventBus, EventFilter, EventReceiver};
pub use frame::{ChromaOrder, Facing, PixelBuffer, Quality, RawFrame, Resolution, Rotation};
pub use host::{
    FixedRotation, PermissionProvider, PermissionResponse, RotationProvider, ScriptedPermission,
};
