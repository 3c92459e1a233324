use crate::error::{ErrorKind, EventBusError};
use crate::frame::{Facing, PixelBuffer};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Host-visible message codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMessage {
    Started,
    Stopped,
    NotPermitted,
    Error,
    ShowPermissionRationale,
}

impl CameraMessage {
    /// Numeric value handed to the host (`CAMERA_STARTED` = 0 ...)
    pub fn code(&self) -> i32 {
        match self {
            CameraMessage::Started => 0,
            CameraMessage::Stopped => 1,
            CameraMessage::NotPermitted => 2,
            CameraMessage::Error => 3,
            CameraMessage::ShowPermissionRationale => 4,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(CameraMessage::Started),
            1 => Some(CameraMessage::Stopped),
            2 => Some(CameraMessage::NotPermitted),
            3 => Some(CameraMessage::Error),
            4 => Some(CameraMessage::ShowPermissionRationale),
            _ => None,
        }
    }

    /// Constant name as exposed to host scripts
    pub fn name(&self) -> &'static str {
        match self {
            CameraMessage::Started => "CAMERA_STARTED",
            CameraMessage::Stopped => "CAMERA_STOPPED",
            CameraMessage::NotPermitted => "CAMERA_NOT_PERMITTED",
            CameraMessage::Error => "CAMERA_ERROR",
            CameraMessage::ShowPermissionRationale => "CAMERA_SHOW_PERMISSION_RATIONALE",
        }
    }
}

/// Notifications emitted to the host
#[derive(Debug, Clone)]
pub enum CameraEvent {
    /// Capture is live (also re-sent when start is called while capturing)
    Started {
        session_id: Uuid,
        width: u32,
        height: u32,
        facing: Facing,
    },
    /// Capture ended after an explicit stop
    Stopped { session_id: Uuid },
    /// Terminal failure for one start attempt
    Error { kind: ErrorKind, details: String },
    /// The host should explain why the camera is needed before asking again
    ShowPermissionRationale,
    /// A converted frame
    FrameUpdate { frame: Arc<PixelBuffer> },
}

impl CameraEvent {
    /// Message code for lifecycle events; frame updates have none
    pub fn message(&self) -> Option<CameraMessage> {
        match self {
            CameraEvent::Started { .. } => Some(CameraMessage::Started),
            CameraEvent::Stopped { .. } => Some(CameraMessage::Stopped),
            CameraEvent::Error { .. } => Some(CameraMessage::Error),
            CameraEvent::ShowPermissionRationale => Some(CameraMessage::ShowPermissionRationale),
            CameraEvent::FrameUpdate { .. } => None,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            CameraEvent::Started {
                width,
                height,
                facing,
                ..
            } => format!("Camera started ({:?}, {}x{})", facing, width, height),
            CameraEvent::Stopped { session_id } => format!("Camera stopped (session {})", session_id),
            CameraEvent::Error { kind, details } => format!("Camera error {:?}: {}", kind, details),
            CameraEvent::ShowPermissionRationale => "Permission rationale requested".to_string(),
            CameraEvent::FrameUpdate { frame } => format!(
                "Frame {} ready ({}x{})",
                frame.frame_id, frame.width, frame.height
            ),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            CameraEvent::Started { .. } => "camera_started",
            CameraEvent::Stopped { .. } => "camera_stopped",
            CameraEvent::Error { .. } => "camera_error",
            CameraEvent::ShowPermissionRationale => "show_permission_rationale",
            CameraEvent::FrameUpdate { .. } => "frame_update",
        }
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, CameraEvent::FrameUpdate { .. })
    }
}

/// Broadcast channel carrying notifications to any number of host listeners.
///
/// Publishing is synchronous so it can happen on the hardware callback thread.
pub struct EventBus {
    sender: broadcast::Sender<CameraEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter applied on receive
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: CameraEvent) -> Result<usize, EventBusError> {
        match &event {
            CameraEvent::Started { width, height, .. } => {
                info!("Camera started at {}x{}", width, height);
            }
            CameraEvent::Stopped { .. } => info!("Camera stopped"),
            CameraEvent::Error { kind, details } => {
                error!("Camera error {:?}: {}", kind, details);
            }
            CameraEvent::ShowPermissionRationale => {
                warn!("Camera permission rationale requested");
            }
            CameraEvent::FrameUpdate { .. } => trace!("Event: {}", event.description()),
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Lifecycle notifications only, no frame updates
    Lifecycle,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&CameraEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &CameraEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Lifecycle => !event.is_frame(),
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<CameraEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<CameraEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<CameraEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { count: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<CameraEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { count: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
