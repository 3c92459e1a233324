use crate::error::ErrorKind;
use serde::Serialize;

/// Lifecycle of the capture controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CaptureState {
    #[default]
    Idle,
    AwaitingPermission,
    Opening,
    Capturing,
    /// The last start attempt failed; a new start is allowed
    Error(ErrorKind),
}

impl CaptureState {
    /// A start attempt is in flight
    pub fn is_starting(&self) -> bool {
        matches!(self, CaptureState::AwaitingPermission | CaptureState::Opening)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, CaptureState::Capturing)
    }

    /// Idle or failed, so a new start may begin
    pub fn can_start(&self) -> bool {
        matches!(self, CaptureState::Idle | CaptureState::Error(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::AwaitingPermission => "awaiting_permission",
            CaptureState::Opening => "opening",
            CaptureState::Capturing => "capturing",
            CaptureState::Error(_) => "error",
        }
    }
}

/// What the controller knows about the camera permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
}
