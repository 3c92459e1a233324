use super::backend::{CameraBackend, CameraDevice, DeviceInfo, DeviceParameters, FrameCallback};
use crate::config::MockConfig;
use crate::error::{CameraError, Result};
use crate::frame::{ChromaOrder, Facing, RawFrame, Resolution};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Step at which a mock device reports a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Enumerate,
    Open,
    QuerySizes,
    Configure,
    /// Binding the preview target when streaming starts
    PreviewTarget,
}

struct MockShared {
    failure: Mutex<Option<FailurePoint>>,
    active: Mutex<Option<FrameCallback>>,
    last_parameters: Mutex<Option<DeviceParameters>>,
    opened: AtomicUsize,
    released: AtomicUsize,
    frame_counter: AtomicU64,
}

/// Simulated camera subsystem for running without hardware.
///
/// Frames are pushed by the test through [`MockCameraBackend::deliver_frame`],
/// or generated on a background thread when a frame rate is set.
#[derive(Clone)]
pub struct MockCameraBackend {
    devices: Vec<DeviceInfo>,
    sizes: Vec<Resolution>,
    chroma_order: ChromaOrder,
    fps: Option<u32>,
    shared: Arc<MockShared>,
}

impl MockCameraBackend {
    /// One back and one front camera
    pub fn new(sizes: Vec<Resolution>) -> Self {
        Self::with_devices(
            vec![
                DeviceInfo {
                    id: 0,
                    facing: Facing::Back,
                },
                DeviceInfo {
                    id: 1,
                    facing: Facing::Front,
                },
            ],
            sizes,
        )
    }

    pub fn with_devices(devices: Vec<DeviceInfo>, sizes: Vec<Resolution>) -> Self {
        Self {
            devices,
            sizes,
            chroma_order: ChromaOrder::Vu,
            fps: None,
            shared: Arc::new(MockShared {
                failure: Mutex::new(None),
                active: Mutex::new(None),
                last_parameters: Mutex::new(None),
                opened: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                frame_counter: AtomicU64::new(0),
            }),
        }
    }

    /// Build from the `[mock]` configuration section, streaming at its fps
    pub fn from_config(config: &MockConfig, chroma_order: ChromaOrder) -> Self {
        Self::new(config.resolutions())
            .with_chroma_order(chroma_order)
            .with_frame_rate(config.fps)
    }

    pub fn with_chroma_order(mut self, chroma_order: ChromaOrder) -> Self {
        self.chroma_order = chroma_order;
        self
    }

    /// Generate synthetic frames on a background thread while streaming
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.fps = Some(fps.max(1));
        self
    }

    /// Make the next device operation at `point` fail
    pub fn fail_at(&self, point: FailurePoint) {
        *self.shared.failure.lock() = Some(point);
    }

    pub fn clear_failure(&self) {
        *self.shared.failure.lock() = None;
    }

    /// Devices opened so far
    pub fn open_count(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Devices released so far
    pub fn release_count(&self) -> usize {
        self.shared.released.load(Ordering::SeqCst)
    }

    /// Handles currently held
    pub fn handles_in_use(&self) -> usize {
        self.open_count() - self.release_count()
    }

    /// Parameters applied by the last `configure` call
    pub fn last_parameters(&self) -> Option<DeviceParameters> {
        self.shared.last_parameters.lock().clone()
    }

    /// Callback registered by the streaming device, if any
    pub fn active_callback(&self) -> Option<FrameCallback> {
        self.shared.active.lock().clone()
    }

    /// Push `frame` through the registered callback. Returns false when nothing is streaming.
    pub fn deliver_frame(&self, frame: RawFrame) -> bool {
        match self.active_callback() {
            Some(callback) => {
                callback(frame);
                true
            }
            None => false,
        }
    }

    /// Push a generated frame of the configured preview size
    pub fn deliver_synthetic_frame(&self) -> bool {
        let Some(params) = self.last_parameters() else {
            return false;
        };
        let id = self.shared.frame_counter.fetch_add(1, Ordering::Relaxed);
        self.deliver_frame(synthetic_frame(id, params.preview_size, self.chroma_order))
    }

    fn check_failure(&self, point: FailurePoint) -> Result<()> {
        let mut failure = self.shared.failure.lock();
        if *failure == Some(point) {
            *failure = None;
            return Err(CameraError::configuration(format!("mock failure at {:?}", point)).into());
        }
        Ok(())
    }
}

impl CameraBackend for MockCameraBackend {
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        self.check_failure(FailurePoint::Enumerate)?;
        Ok(self.devices.clone())
    }

    fn open(&self, id: u32) -> Result<Box<dyn CameraDevice>> {
        self.check_failure(FailurePoint::Open)?;

        let info = self
            .devices
            .iter()
            .find(|device| device.id == id)
            .copied()
            .ok_or_else(|| CameraError::configuration(format!("mock camera {} does not exist", id)))?;

        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        debug!("Opened mock camera {}", id);

        Ok(Box::new(MockDevice {
            backend: self.clone(),
            info,
            configured: None,
            stream: None,
            released: false,
        }))
    }
}

struct StreamThread {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

struct MockDevice {
    backend: MockCameraBackend,
    info: DeviceInfo,
    configured: Option<DeviceParameters>,
    stream: Option<StreamThread>,
    released: bool,
}

impl MockDevice {
    fn spawn_stream(&self, callback: FrameCallback, size: Resolution, fps: u32) -> StreamThread {
        let (stop, stopped) = channel::bounded::<()>(1);
        let ticker = channel::tick(Duration::from_millis(1000 / fps as u64));
        let shared = Arc::clone(&self.backend.shared);
        let chroma_order = self.backend.chroma_order;

        let handle = std::thread::spawn(move || {
            info!("Mock capture loop started at {} fps", fps);
            loop {
                let stop_requested = crossbeam::select! {
                    recv(stopped) -> _ => true,
                    recv(ticker) -> _ => {
                        let id = shared.frame_counter.fetch_add(1, Ordering::Relaxed);
                        trace!("Generated mock frame {} ({})", id, size);
                        callback(synthetic_frame(id, size, chroma_order));
                        false
                    }
                };
                if stop_requested {
                    break;
                }
            }
            info!("Mock capture loop stopped");
        });

        StreamThread { stop, handle }
    }
}

impl CameraDevice for MockDevice {
    fn info(&self) -> DeviceInfo {
        self.info
    }

    fn supported_preview_sizes(&self) -> Result<Vec<Resolution>> {
        self.backend.check_failure(FailurePoint::QuerySizes)?;
        Ok(self.backend.sizes.clone())
    }

    fn configure(&mut self, params: &DeviceParameters) -> Result<()> {
        self.backend.check_failure(FailurePoint::Configure)?;

        if !self.backend.sizes.contains(&params.preview_size) {
            return Err(CameraError::configuration(format!(
                "unsupported preview size {}",
                params.preview_size
            ))
            .into());
        }

        *self.backend.shared.last_parameters.lock() = Some(params.clone());
        self.configured = Some(params.clone());
        Ok(())
    }

    fn start_streaming(&mut self, callback: FrameCallback) -> Result<()> {
        self.backend.check_failure(FailurePoint::PreviewTarget)?;

        let params = self.configured.clone().ok_or_else(|| CameraError::InvalidState {
            details: "mock camera streamed before configure".to_string(),
        })?;

        *self.backend.shared.active.lock() = Some(Arc::clone(&callback));

        if let Some(fps) = self.backend.fps {
            self.stream = Some(self.spawn_stream(callback, params.preview_size, fps));
        }

        debug!("Mock camera {} streaming at {}", self.info.id, params.preview_size);
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<()> {
        self.backend.shared.active.lock().take();

        if let Some(stream) = self.stream.take() {
            let _ = stream.stop.send(());
            // Released from inside its own callback; the loop exits on the stop message
            if stream.handle.thread().id() == std::thread::current().id() {
                return Ok(());
            }
            if stream.handle.join().is_err() {
                warn!("Mock capture thread panicked");
            }
        }

        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.backend.shared.released.fetch_add(1, Ordering::SeqCst);
        debug!("Released mock camera {}", self.info.id);
    }
}

/// Deterministic NV21/NV12 test pattern: a luma gradient with chroma drifting per frame
pub fn synthetic_frame(id: u64, size: Resolution, chroma_order: ChromaOrder) -> RawFrame {
    let width = size.width as usize;
    let height = size.height as usize;
    let mut data = Vec::with_capacity(RawFrame::expected_size(size.width, size.height));

    for y in 0..height {
        for x in 0..width {
            data.push(((x + y + id as usize) % 220 + 16) as u8);
        }
    }

    let shift = (id % 64) as u8;
    for _ in 0..height / 2 {
        for x in (0..width).step_by(2) {
            let first = 96u8.wrapping_add(shift).wrapping_add((x % 32) as u8);
            data.push(first);
            data.push(160u8.wrapping_sub(shift));
        }
    }

    RawFrame::new(id, data, size.width, size.height).with_chroma_order(chroma_order)
}
