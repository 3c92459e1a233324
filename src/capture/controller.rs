use super::session::{CaptureInfo, CaptureSession};
use super::state::{CaptureState, PermissionState};
use super::stats::CaptureStats;
use crate::converter::FrameConverter;
use crate::device::{CameraBackend, DeviceHandle, DeviceParameters, FrameCallback};
use crate::error::{CamcaptureError, CameraError, ErrorKind, Result};
use crate::events::{CameraEvent, EventBus, EventFilter, EventReceiver};
use crate::frame::{Facing, PixelBuffer, Quality, RawFrame};
use crate::host::{PermissionProvider, PermissionResponse, RotationProvider};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Values fixed when the controller is built
#[derive(Debug, Clone)]
pub(crate) struct ControllerSettings {
    pub permission: String,
    pub focus_mode: String,
}

/// Result of a start call that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session is capturing
    Started(CaptureInfo),
    /// A session was already capturing; `CAMERA_STARTED` was sent again
    AlreadyCapturing(CaptureInfo),
    /// Another start attempt is still waiting on permission or the device
    Pending,
}

#[derive(Default)]
struct Inner {
    state: CaptureState,
    permission: PermissionState,
    session: Option<CaptureSession>,
    device: Option<DeviceHandle>,
    latest_frame: Option<Arc<PixelBuffer>>,
    /// Bumped when a start attempt begins and when a session ends.
    /// Frame callbacks carry the value they were registered under.
    generation: u64,
}

struct Shared {
    /// Serializes device open against teardown. Never taken by frame callbacks.
    lifecycle: Mutex<()>,
    inner: Mutex<Inner>,
    stats: Mutex<CaptureStats>,
    backend: Arc<dyn CameraBackend>,
    permissions: Arc<dyn PermissionProvider>,
    rotation: Arc<dyn RotationProvider>,
    events: EventBus,
    settings: ControllerSettings,
    runtime: Handle,
}

impl Shared {
    fn emit(&self, event: CameraEvent) {
        if let Err(e) = self.events.publish(event) {
            trace!("Notification not delivered: {}", e);
        }
    }

    /// Runs on the device's callback thread
    fn on_frame(&self, generation: u64, frame: RawFrame) {
        self.stats.lock().record_frame_received();

        if !self.is_live(generation) {
            trace!("Discarding frame {} from an ended session", frame.id);
            self.stats.lock().record_discarded_frame();
            return;
        }

        let flip = self.rotation.current_rotation().flips();
        let pixels = match FrameConverter::convert(&frame, flip) {
            Ok(pixels) => Arc::new(pixels),
            Err(e) => {
                warn!("Dropping frame {}: {}", frame.id, e);
                self.stats.lock().record_malformed_frame();
                return;
            }
        };

        let mut inner = self.inner.lock();
        if !(inner.state.is_capturing() && inner.generation == generation) {
            drop(inner);
            trace!("Session ended while converting frame {}", frame.id);
            self.stats.lock().record_discarded_frame();
            return;
        }

        inner.latest_frame = Some(Arc::clone(&pixels));
        self.emit(CameraEvent::FrameUpdate { frame: pixels });
        drop(inner);

        self.stats.lock().record_frame_converted();
    }

    fn is_live(&self, generation: u64) -> bool {
        let inner = self.inner.lock();
        inner.state.is_capturing() && inner.generation == generation
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.get_mut().device.take() {
            debug!("Capture controller dropped with an open camera");
            handle.release();
        }
    }
}

/// Drives one camera through permission, open, streaming and teardown.
///
/// Clones share the same session. The device is released when the session
/// stops, fails, or when the last clone is dropped.
#[derive(Clone)]
pub struct CaptureController {
    shared: Arc<Shared>,
}

impl CaptureController {
    pub(crate) fn new(
        backend: Arc<dyn CameraBackend>,
        permissions: Arc<dyn PermissionProvider>,
        rotation: Arc<dyn RotationProvider>,
        events: EventBus,
        settings: ControllerSettings,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(()),
                inner: Mutex::new(Inner::default()),
                stats: Mutex::new(CaptureStats::default()),
                backend,
                permissions,
                rotation,
                events,
                settings,
                runtime,
            }),
        }
    }

    /// Begin a start attempt in the background and return immediately.
    ///
    /// The outcome is reported through notifications.
    pub fn start_capture(&self, facing: Facing, quality: Quality) -> JoinHandle<()> {
        let controller = self.clone();
        self.shared.runtime.spawn(async move {
            if let Err(e) = controller.start(facing, quality).await {
                debug!("Start of {:?} camera ended without capture: {}", facing, e);
            }
        })
    }

    /// Run one start attempt to completion.
    ///
    /// Device open and configuration run on the blocking pool. Dropping the
    /// returned future before it completes abandons the attempt and puts the
    /// controller back to `Idle`.
    pub async fn start(&self, facing: Facing, quality: Quality) -> Result<StartOutcome> {
        let (attempt, needs_permission) = {
            let mut inner = self.shared.inner.lock();
            let state = inner.state;

            if state.is_capturing() {
                let session = inner.session.clone();
                let info = session.as_ref().map(CaptureSession::info).unwrap_or_default();
                if let Some(session) = session {
                    debug!("Start requested while capturing; re-sending start notification");
                    self.shared.emit(started_event(&session));
                }
                return Ok(StartOutcome::AlreadyCapturing(info));
            }

            if !state.can_start() {
                debug!("Start requested while {}; ignoring", state.name());
                return Ok(StartOutcome::Pending);
            }

            inner.generation += 1;
            let needs_permission = inner.permission != PermissionState::Granted;
            inner.state = if needs_permission {
                CaptureState::AwaitingPermission
            } else {
                CaptureState::Opening
            };
            info!(
                "Starting {:?} camera at {:?} quality (attempt {})",
                facing, quality, inner.generation
            );
            (inner.generation, needs_permission)
        };
        let _abandon = AbandonOnDrop {
            shared: &self.shared,
            attempt,
        };

        if needs_permission {
            let response = self
                .shared
                .permissions
                .request_permission(&self.shared.settings.permission)
                .await;
            self.apply_permission(attempt, response)?;
        }

        let controller = self.clone();
        self.shared
            .runtime
            .spawn_blocking(move || {
                let _lifecycle = controller.shared.lifecycle.lock();
                if !controller.is_current(attempt, CaptureState::Opening) {
                    return Err(superseded());
                }
                let opened = controller.open_session(attempt, facing, quality);
                controller.finish_start(attempt, opened)
            })
            .await
            .map_err(|e| CamcaptureError::system(format!("Camera open task failed: {}", e)))?
    }

    fn apply_permission(&self, attempt: u64, response: PermissionResponse) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        if inner.generation != attempt || inner.state != CaptureState::AwaitingPermission {
            return Err(superseded());
        }

        if response.is_granted() {
            debug!("Camera permission granted");
            inner.permission = PermissionState::Granted;
            inner.state = CaptureState::Opening;
            return Ok(());
        }

        inner.permission = PermissionState::Denied;
        inner.state = CaptureState::Error(ErrorKind::NotPermitted);
        drop(inner);

        warn!("Camera permission denied ({:?})", response);
        if response == PermissionResponse::ShowRationale {
            self.shared.emit(CameraEvent::ShowPermissionRationale);
        }
        let error = CameraError::NotPermitted;
        self.shared.emit(CameraEvent::Error {
            kind: error.kind(),
            details: error.to_string(),
        });
        Err(error.into())
    }

    /// Select, open and configure a device, then start streaming into the converter.
    /// An error drops the handle, which releases the device.
    fn open_session(
        &self,
        attempt: u64,
        facing: Facing,
        quality: Quality,
    ) -> Result<(DeviceHandle, CaptureSession)> {
        let device = self
            .shared
            .backend
            .devices()?
            .into_iter()
            .find(|device| device.facing == facing)
            .ok_or(CameraError::NoMatchingDevice { facing })?;

        let mut handle = DeviceHandle::new(self.shared.backend.open(device.id)?);

        let sizes = handle.supported_preview_sizes()?;
        for size in &sizes {
            debug!("Camera {} supports preview size {}", device.id, size);
        }
        let resolution = quality.select(&sizes).ok_or_else(|| {
            CameraError::configuration(format!("camera {} reported no preview sizes", device.id))
        })?;

        handle.configure(&DeviceParameters::for_preview(
            resolution,
            &self.shared.settings.focus_mode,
        ))?;
        handle.start_streaming(self.frame_callback(attempt))?;

        info!(
            "Opened {:?} camera {} at {} ({:?} quality)",
            facing, device.id, resolution, quality
        );
        Ok((handle, CaptureSession::new(device.id, facing, quality, resolution)))
    }

    fn finish_start(
        &self,
        attempt: u64,
        opened: Result<(DeviceHandle, CaptureSession)>,
    ) -> Result<StartOutcome> {
        let mut inner = self.shared.inner.lock();
        let current = inner.generation == attempt && inner.state == CaptureState::Opening;

        match opened {
            Ok((handle, session)) => {
                if !current {
                    drop(inner);
                    handle.release();
                    return Err(superseded());
                }

                let info = session.info();
                let event = started_event(&session);
                inner.device = Some(handle);
                inner.session = Some(session);
                inner.state = CaptureState::Capturing;
                self.shared.stats.lock().record_session_opened();
                // Published under the lock so no frame update can precede it
                self.shared.emit(event);
                Ok(StartOutcome::Started(info))
            }
            Err(e) => {
                if !current {
                    return Err(e);
                }
                let kind = e.kind();
                inner.state = CaptureState::Error(kind);
                drop(inner);

                self.shared.emit(CameraEvent::Error {
                    kind,
                    details: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn frame_callback(&self, generation: u64) -> FrameCallback {
        let shared = Arc::downgrade(&self.shared);
        Arc::new(move |frame: RawFrame| {
            if let Some(shared) = shared.upgrade() {
                shared.on_frame(generation, frame);
            }
        })
    }

    fn is_current(&self, attempt: u64, state: CaptureState) -> bool {
        let inner = self.shared.inner.lock();
        inner.generation == attempt && inner.state == state
    }

    /// End the active session. Returns false when nothing was capturing.
    pub fn stop(&self) -> bool {
        let _lifecycle = self.shared.lifecycle.lock();
        let (handle, session) = {
            let mut inner = self.shared.inner.lock();
            if !inner.state.is_capturing() {
                debug!("Stop requested while {}; nothing to do", inner.state.name());
                return false;
            }
            inner.state = CaptureState::Idle;
            inner.generation += 1;
            inner.latest_frame = None;
            (inner.device.take(), inner.session.take())
        };

        if let Some(handle) = handle {
            handle.release();
        }
        self.shared.stats.lock().record_session_released();

        if let Some(session) = session {
            info!(
                "Capture session {} stopped after {}s",
                session.id,
                (Utc::now() - session.started_at).num_seconds()
            );
            self.shared.emit(CameraEvent::Stopped {
                session_id: session.id,
            });
        }
        true
    }

    /// The host withdrew the camera permission.
    ///
    /// An active session is torn down and reported as `NotPermitted`.
    pub fn on_permission_revoked(&self) -> bool {
        let _lifecycle = self.shared.lifecycle.lock();
        let handle = {
            let mut inner = self.shared.inner.lock();
            inner.permission = PermissionState::Denied;
            if !inner.state.is_capturing() {
                return false;
            }
            inner.state = CaptureState::Error(ErrorKind::NotPermitted);
            inner.generation += 1;
            inner.latest_frame = None;
            inner.session = None;
            inner.device.take()
        };

        warn!("Camera permission revoked during capture");
        if let Some(handle) = handle {
            handle.release();
        }
        self.shared.stats.lock().record_session_released();

        let error = CameraError::NotPermitted;
        self.shared.emit(CameraEvent::Error {
            kind: error.kind(),
            details: error.to_string(),
        });
        true
    }

    /// Host teardown: release everything without notifying
    pub fn shutdown(&self) {
        let _lifecycle = self.shared.lifecycle.lock();
        let (handle, was_capturing) = {
            let mut inner = self.shared.inner.lock();
            let was_capturing = inner.state.is_capturing();
            inner.state = CaptureState::Idle;
            inner.generation += 1;
            inner.latest_frame = None;
            inner.session = None;
            (inner.device.take(), was_capturing)
        };

        if let Some(handle) = handle {
            handle.release();
        }
        if was_capturing {
            self.shared.stats.lock().record_session_released();
        }
        info!("Capture controller shut down");
    }

    pub fn state(&self) -> CaptureState {
        self.shared.inner.lock().state
    }

    pub fn permission_state(&self) -> PermissionState {
        self.shared.inner.lock().permission
    }

    pub fn session(&self) -> Option<CaptureSession> {
        self.shared.inner.lock().session.clone()
    }

    /// Size and pixel format of the active session, zeroed when idle
    pub fn info(&self) -> CaptureInfo {
        self.shared
            .inner
            .lock()
            .session
            .as_ref()
            .map(CaptureSession::info)
            .unwrap_or_default()
    }

    pub fn width(&self) -> u32 {
        self.info().width
    }

    pub fn height(&self) -> u32 {
        self.info().height
    }

    /// Most recent converted frame of the active session
    pub fn latest_frame(&self) -> Option<Arc<PixelBuffer>> {
        self.shared.inner.lock().latest_frame.clone()
    }

    pub fn stats(&self) -> CaptureStats {
        self.shared.stats.lock().clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.shared.events.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        self.shared.events.subscribe_filtered(filter, name)
    }
}

/// Returns an unfinished start attempt to `Idle` when its future is dropped
struct AbandonOnDrop<'a> {
    shared: &'a Shared,
    attempt: u64,
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        if inner.generation == self.attempt && inner.state.is_starting() {
            debug!("Start attempt {} abandoned while {}", self.attempt, inner.state.name());
            inner.state = CaptureState::Idle;
        }
    }
}

fn started_event(session: &CaptureSession) -> CameraEvent {
    CameraEvent::Started {
        session_id: session.id,
        width: session.resolution.width,
        height: session.resolution.height,
        facing: session.facing,
    }
}

fn superseded() -> CamcaptureError {
    CameraError::InvalidState {
        details: "start attempt superseded by teardown".to_string(),
    }
    .into()
}
