//! Error types for bridge construction and configuration

use thiserror::Error;

/// Errors raised while building or starting a bridge.
///
/// Everything here is a construction-time failure. Once a bridge is running,
/// capture misses, queue overflow and empty pulls are normal conditions and
/// are logged rather than returned.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("queue capacity must be greater than zero")]
    ZeroCapacity,

    #[error("queue capacity {capacity} exceeds the maximum of {max} frames")]
    CapacityTooLarge { capacity: usize, max: usize },

    #[error("expected frame size is zero ({width}x{height}x{bytes_per_pixel})")]
    EmptyFrame {
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
    },

    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("capture device error: {0}")]
    Device(String),
}

/// Result type alias using [`BridgeError`]
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
