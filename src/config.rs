use crate::error::Result;
use crate::frame::{ChromaOrder, Facing, Quality, Resolution};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CamcaptureConfig {
    pub camera: CameraConfig,
    pub mock: MockConfig,
    pub system: SystemConfig,

    /// Physical devices and the direction each one faces
    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Camera to open when the host does not say
    #[serde(default = "default_facing")]
    pub facing: Facing,

    /// Preview size tier
    #[serde(default = "default_quality")]
    pub quality: Quality,

    /// Chroma byte order of the sensor output (vu = NV21, uv = NV12)
    #[serde(default)]
    pub chroma_order: ChromaOrder,

    /// Focus mode requested when the device is configured
    #[serde(default = "default_focus_mode")]
    pub focus_mode: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Device index (e.g., 0 for /dev/video0)
    pub index: u32,
    pub facing: Facing,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MockConfig {
    /// Preview sizes advertised by simulated devices
    #[serde(default = "default_mock_sizes")]
    pub sizes: Vec<(u32, u32)>,

    /// Synthetic frame rate
    #[serde(default = "default_mock_fps")]
    pub fps: u32,
}

impl MockConfig {
    pub fn resolutions(&self) -> Vec<Resolution> {
        self.sizes
            .iter()
            .map(|&(width, height)| Resolution::new(width, height))
            .collect()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Notification channel capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Permission identifier passed to the host
    #[serde(default = "default_permission")]
    pub permission: String,
}

impl CamcaptureConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from_file("camcapture.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.facing", "back")?
            .set_default("camera.quality", "medium")?
            .set_default("camera.chroma_order", "vu")?
            .set_default("camera.focus_mode", default_focus_mode())?
            .set_default("mock.fps", default_mock_fps())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("system.permission", default_permission())?
            .add_source(File::with_name(&path_str).required(false))
            // Nested keys use a double underscore, e.g. CAMCAPTURE_CAMERA__QUALITY
            .add_source(
                Environment::with_prefix("CAMCAPTURE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: CamcaptureConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.permission.is_empty() {
            return Err(ConfigError::Message(
                "Permission identifier must not be empty".to_string(),
            ));
        }

        if self.mock.fps == 0 {
            return Err(ConfigError::Message(
                "Mock fps must be greater than 0".to_string(),
            ));
        }

        if self.mock.sizes.is_empty() {
            return Err(ConfigError::Message(
                "Mock preview sizes must not be empty".to_string(),
            ));
        }

        for &(width, height) in &self.mock.sizes {
            if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
                return Err(ConfigError::Message(format!(
                    "Mock preview size {}x{} must be even and non-zero",
                    width, height
                )));
            }
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.index) {
                return Err(ConfigError::Message(format!(
                    "Device index {} is listed more than once",
                    device.index
                )));
            }
        }

        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for CamcaptureConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                facing: default_facing(),
                quality: default_quality(),
                chroma_order: ChromaOrder::default(),
                focus_mode: default_focus_mode(),
            },
            mock: MockConfig {
                sizes: default_mock_sizes(),
                fps: default_mock_fps(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                permission: default_permission(),
            },
            devices: default_devices(),
        }
    }
}

// Default value functions
fn default_facing() -> Facing {
    Facing::Back
}
fn default_quality() -> Quality {
    Quality::Medium
}
fn default_focus_mode() -> String {
    "continuous-picture".to_string()
}

fn default_devices() -> Vec<DeviceConfig> {
    vec![
        DeviceConfig {
            index: 0,
            facing: Facing::Back,
        },
        DeviceConfig {
            index: 1,
            facing: Facing::Front,
        },
    ]
}

fn default_mock_sizes() -> Vec<(u32, u32)> {
    vec![(320, 240), (640, 480), (1280, 720)]
}
fn default_mock_fps() -> u32 {
    30
}

fn default_event_bus_capacity() -> usize {
    64
}
fn default_permission() -> String {
    "android.permission.CAMERA".to_string()
}
