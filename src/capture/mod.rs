mod builder;
mod controller;
mod session;
mod state;
mod stats;
#[cfg(test)]
mod tests;

pub use builder::CaptureControllerBuilder;
pub use controller::{CaptureController, StartOutcome};
pub use session::{CaptureInfo, CaptureSession, BYTES_PER_PIXEL};
pub use state::{CaptureState, PermissionState};
pub use stats::CaptureStats;
