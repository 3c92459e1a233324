use super::backend::{CameraBackend, CameraDevice, DeviceInfo, DeviceParameters, FrameCallback};
use crate::config::DeviceConfig;
use crate::error::{CameraError, Result};
use crate::frame::{ChromaOrder, RawFrame, Resolution};
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::{VideoFrameRef, VideoInfo};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// V4L2 cameras driven through GStreamer, emitting semi-planar frames
pub struct GstCameraBackend {
    devices: Vec<DeviceConfig>,
    chroma_order: ChromaOrder,
}

impl GstCameraBackend {
    pub fn new(devices: Vec<DeviceConfig>, chroma_order: ChromaOrder) -> Result<Self> {
        gstreamer::init().map_err(|e| {
            CameraError::configuration(format!("Failed to initialize GStreamer: {}", e))
        })?;

        Ok(Self {
            devices,
            chroma_order,
        })
    }
}

fn device_path(index: u32) -> String {
    format!("/dev/video{}", index)
}

impl CameraBackend for GstCameraBackend {
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self
            .devices
            .iter()
            .filter(|device| Path::new(&device_path(device.index)).exists())
            .map(|device| DeviceInfo {
                id: device.index,
                facing: device.facing,
            })
            .collect())
    }

    fn open(&self, id: u32) -> Result<Box<dyn CameraDevice>> {
        let config = self
            .devices
            .iter()
            .find(|device| device.index == id)
            .ok_or_else(|| CameraError::configuration(format!("camera {} is not configured", id)))?;

        info!("Opening GStreamer camera {}", device_path(id));

        Ok(Box::new(GstDevice {
            info: DeviceInfo {
                id,
                facing: config.facing,
            },
            chroma_order: self.chroma_order,
            configured: None,
            pipeline: None,
        }))
    }
}

struct GstDevice {
    info: DeviceInfo,
    chroma_order: ChromaOrder,
    configured: Option<DeviceParameters>,
    pipeline: Option<Pipeline>,
}

impl GstDevice {
    fn launch(description: &str) -> Result<Pipeline> {
        debug!("Creating GStreamer pipeline: {}", description);

        gstreamer::parse::launch(description)
            .map_err(|e| CameraError::configuration(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::configuration("Failed to downcast to Pipeline").into())
    }

    fn format_name(&self) -> &'static str {
        match self.chroma_order {
            ChromaOrder::Vu => "NV21",
            ChromaOrder::Uv => "NV12",
        }
    }
}

impl CameraDevice for GstDevice {
    fn info(&self) -> DeviceInfo {
        self.info
    }

    fn supported_preview_sizes(&self) -> Result<Vec<Resolution>> {
        let pipeline = Self::launch(&format!(
            "v4l2src name=src device={} ! fakesink",
            device_path(self.info.id)
        ))?;

        pipeline
            .set_state(gstreamer::State::Ready)
            .map_err(|e| CameraError::configuration(format!("Failed to probe camera: {}", e)))?;

        let caps = pipeline
            .by_name("src")
            .and_then(|src| src.static_pad("src"))
            .map(|pad| pad.query_caps(None));

        let _ = pipeline.set_state(gstreamer::State::Null);

        let caps = caps.ok_or_else(|| CameraError::configuration("Failed to query camera caps"))?;

        let mut sizes = Vec::new();
        for structure in caps.iter() {
            if !structure.has_name("video/x-raw") {
                continue;
            }
            let (Ok(width), Ok(height)) = (
                structure.get::<i32>("width"),
                structure.get::<i32>("height"),
            ) else {
                continue;
            };
            let size = Resolution::new(width as u32, height as u32);
            if size.width % 2 == 0 && size.height % 2 == 0 && !sizes.contains(&size) {
                debug!("Supported preview size: {}", size);
                sizes.push(size);
            }
        }

        Ok(sizes)
    }

    fn configure(&mut self, params: &DeviceParameters) -> Result<()> {
        if params.focus_mode != "continuous-picture" {
            warn!(
                "Focus mode {} is not controllable through v4l2src; using driver default",
                params.focus_mode
            );
        }
        self.configured = Some(params.clone());
        Ok(())
    }

    fn start_streaming(&mut self, callback: FrameCallback) -> Result<()> {
        let params = self.configured.clone().ok_or_else(|| CameraError::InvalidState {
            details: "camera streamed before configure".to_string(),
        })?;
        let size = params.preview_size;

        let pipeline = Self::launch(&format!(
            "v4l2src device={} ! \
             video/x-raw,format={},width={},height={} ! \
             appsink name=sink sync=false max-buffers=2 drop=true emit-signals=false",
            device_path(self.info.id),
            self.format_name(),
            size.width,
            size.height
        ))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::configuration("Failed to get appsink"))?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::configuration("Failed to downcast to AppSink"))?;

        let chroma_order = self.chroma_order;
        let frame_counter = Arc::new(AtomicU64::new(0));

        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gstreamer::FlowError::Error)?;
                    let caps = sample.caps().ok_or(gstreamer::FlowError::Error)?;
                    let video_info =
                        VideoInfo::from_caps(caps).map_err(|_| gstreamer::FlowError::Error)?;
                    let frame = VideoFrameRef::from_buffer_ref_readable(buffer, &video_info)
                        .map_err(|_| gstreamer::FlowError::Error)?;
                    let strides = frame.plane_stride();
                    let luma = frame
                        .plane_data(0)
                        .map_err(|_| gstreamer::FlowError::Error)?;
                    let chroma = frame
                        .plane_data(1)
                        .map_err(|_| gstreamer::FlowError::Error)?;

                    let id = frame_counter.fetch_add(1, Ordering::Relaxed);
                    trace!(
                        "Captured frame {} ({}x{}, strides {:?})",
                        id,
                        video_info.width(),
                        video_info.height(),
                        strides
                    );

                    // Rows may be padded to the driver's alignment
                    match RawFrame::from_planes(
                        id,
                        video_info.width(),
                        video_info.height(),
                        (luma, strides[0] as usize),
                        (chroma, strides[1] as usize),
                    ) {
                        Ok(raw) => callback(raw.with_chroma_order(chroma_order)),
                        Err(e) => warn!("Dropping frame {}: {}", id, e),
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::configuration(format!("Failed to start pipeline: {}", e)))?;

        info!("GStreamer camera {} streaming at {}", self.info.id, size);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<()> {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.set_state(gstreamer::State::Null).map_err(|e| {
                CameraError::configuration(format!("Failed to stop pipeline: {}", e))
            })?;
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Err(e) = self.stop_streaming() {
            warn!("Error while releasing camera {}: {}", self.info.id, e);
        }
        self.configured = None;
    }
}
