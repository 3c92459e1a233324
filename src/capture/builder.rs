use super::controller::{CaptureController, ControllerSettings};
use crate::config::CamcaptureConfig;
use crate::device::CameraBackend;
use crate::error::{CamcaptureError, Result};
use crate::events::EventBus;
use crate::host::{FixedRotation, PermissionProvider, RotationProvider};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Builder for the capture controller
pub struct CaptureControllerBuilder {
    backend: Option<Arc<dyn CameraBackend>>,
    permissions: Option<Arc<dyn PermissionProvider>>,
    rotation: Option<Arc<dyn RotationProvider>>,
    event_bus: Option<EventBus>,
    config: Option<CamcaptureConfig>,
    runtime: Option<Handle>,
}

impl CaptureControllerBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            permissions: None,
            rotation: None,
            event_bus: None,
            config: None,
            runtime: None,
        }
    }

    pub fn backend<B: CameraBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    pub fn shared_backend(mut self, backend: Arc<dyn CameraBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Defaults to a fixed upright rotation
    pub fn rotation(mut self, rotation: Arc<dyn RotationProvider>) -> Self {
        self.rotation = Some(rotation);
        self
    }

    /// Share an existing bus instead of creating one from the configuration
    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(mut self, config: CamcaptureConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Runtime used by `start_capture`; defaults to the current one
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<CaptureController> {
        let backend = self
            .backend
            .ok_or_else(|| CamcaptureError::system("Camera backend must be specified"))?;
        let permissions = self
            .permissions
            .ok_or_else(|| CamcaptureError::system("Permission provider must be specified"))?;
        let rotation = self
            .rotation
            .unwrap_or_else(|| Arc::new(FixedRotation::default()));

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| {
                CamcaptureError::system(format!("Capture controller needs a tokio runtime: {}", e))
            })?,
        };

        let config = self.config.unwrap_or_default();
        let events = self
            .event_bus
            .unwrap_or_else(|| EventBus::new(config.system.event_bus_capacity));

        Ok(CaptureController::new(
            backend,
            permissions,
            rotation,
            events,
            ControllerSettings {
                permission: config.system.permission,
                focus_mode: config.camera.focus_mode,
            },
            runtime,
        ))
    }
}

impl Default for CaptureControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
