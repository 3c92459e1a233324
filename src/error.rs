use crate::frame::Facing;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CamcaptureError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },
}

impl CamcaptureError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Session-fatal errors end the current start attempt; frame errors only drop one frame.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(self, CamcaptureError::Frame(_))
    }

    /// Classification carried by `CAMERA_ERROR` notifications.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CamcaptureError::Camera(e) => e.kind(),
            CamcaptureError::Frame(_) => ErrorKind::MalformedFrame,
            _ => ErrorKind::DeviceConfigurationFailure,
        }
    }
}

/// Camera lifecycle failures
#[derive(Error, Debug, Clone)]
pub enum CameraError {
    #[error("Camera permission was not granted")]
    NotPermitted,

    #[error("No camera facing {facing:?} is available")]
    NoMatchingDevice { facing: Facing },

    #[error("Device configuration failed: {details}")]
    DeviceConfiguration { details: String },

    #[error("Invalid controller state: {details}")]
    InvalidState { details: String },
}

impl CameraError {
    pub fn configuration<S: Into<String>>(details: S) -> Self {
        Self::DeviceConfiguration {
            details: details.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CameraError::NotPermitted => ErrorKind::NotPermitted,
            CameraError::NoMatchingDevice { .. } => ErrorKind::NoMatchingDevice,
            CameraError::DeviceConfiguration { .. } | CameraError::InvalidState { .. } => {
                ErrorKind::DeviceConfigurationFailure
            }
        }
    }
}

/// Per-frame failures. These never end a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Malformed {width}x{height} frame: expected {expected} bytes, got {actual}")]
    Malformed {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Frame dimensions {width}x{height} must be even and non-zero")]
    OddDimensions { width: u32, height: u32 },
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {count} events")]
    Lagged { count: u64 },

    #[error("Event bus closed")]
    ChannelClosed,
}

/// Host-facing error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotPermitted,
    NoMatchingDevice,
    DeviceConfigurationFailure,
    MalformedFrame,
}

pub type Result<T> = std::result::Result<T, CamcaptureError>;
