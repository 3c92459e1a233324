mod backend;
#[cfg(all(target_os = "linux", feature = "gstreamer"))]
mod gst;
mod handle;
mod mock;

pub use backend::{CameraBackend, CameraDevice, DeviceInfo, DeviceParameters, FrameCallback};
#[cfg(all(target_os = "linux", feature = "gstreamer"))]
pub use gst::GstCameraBackend;
pub use handle::DeviceHandle;
pub use mock::{synthetic_frame, FailurePoint, MockCameraBackend};
