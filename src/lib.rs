pub mod bridge;
pub mod capture;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod utils;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

pub use bridge::{Bridge, TeardownReport};
pub use capture::{CaptureKind, Frame, FrameGeometry, FrameSource};
pub use error::{BridgeError, Result};
pub use pipeline::{Delivery, DeliveryController, FrameQueue, FrameSink, StatsCounter};

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Prefix of environment overrides, e.g. `FRAMEBRIDGE__DELIVERY__MAX_BUFFER_SIZE`
const ENV_PREFIX: &str = "FRAMEBRIDGE";

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub streams: Vec<StreamConfig>,
    pub delivery: DeliveryConfig,
    pub dump: DumpConfig,
}

/// One capture stream served by its own bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub name: String,
    pub kind: CaptureKind,
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    pub fps: u32,
    pub queue_capacity: usize,
    /// V4L2 node; the synthetic source is used when unset
    pub device: Option<String>,
    /// Pin the capture thread to this CPU
    pub cpu_core: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Largest frame the sink accepts; larger frames are truncated
    pub max_buffer_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    /// Write delivered bytes to `<path>.<stream>.raw`
    pub path: Option<PathBuf>,
}

/// Validated, immutable construction parameters of one bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    pub name: String,
    pub capacity: NonZeroUsize,
    pub kind: CaptureKind,
    pub geometry: FrameGeometry,
    pub cpu_core: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            streams: vec![StreamConfig::depth(), StreamConfig::color()],
            delivery: DeliveryConfig::default(),
            dump: DumpConfig::default(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::depth()
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 1025 * 1024,
        }
    }
}

impl StreamConfig {
    /// 640x480 Z16 depth at 30 fps
    pub fn depth() -> Self {
        Self {
            name: "depth".into(),
            kind: CaptureKind::Depth,
            width: 640,
            height: 480,
            bytes_per_pixel: 2,
            fps: 30,
            queue_capacity: 10,
            device: None,
            cpu_core: None,
        }
    }

    /// 424x240 RGB8 color at 30 fps
    pub fn color() -> Self {
        Self {
            name: "color".into(),
            kind: CaptureKind::Color,
            width: 424,
            height: 240,
            bytes_per_pixel: 3,
            fps: 30,
            queue_capacity: 10,
            device: None,
            cpu_core: None,
        }
    }

    pub fn geometry(&self) -> Result<FrameGeometry> {
        FrameGeometry::new(self.width, self.height, self.bytes_per_pixel)
    }

    /// Validate into bridge construction parameters
    pub fn bridge_settings(&self) -> Result<BridgeSettings> {
        pipeline::queue::check_capacity(self.queue_capacity)?;
        let capacity = NonZeroUsize::new(self.queue_capacity).ok_or(BridgeError::ZeroCapacity)?;
        Ok(BridgeSettings {
            name: self.name.clone(),
            capacity,
            kind: self.kind,
            geometry: self.geometry()?,
            cpu_core: self.cpu_core,
        })
    }
}

impl Config {
    /// Load defaults, then an optional TOML file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}
