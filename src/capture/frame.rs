use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::error::{BridgeError, Result};

/// One captured image, owned by exactly one stage of the pipeline at a time.
///
/// `Frame` is deliberately not `Clone`: it moves from the capture thread into
/// the queue and from the queue into the delivery controller, where it is
/// dropped once its bytes have been copied into the sink.
pub struct Frame {
    /// Frame payload, sized to the stream's expected frame size
    data: Bytes,

    /// Wall-clock capture time, propagated to the sink as presentation time
    timestamp: SystemTime,

    /// Per-stream capture counter
    sequence: u64,
}

impl Frame {
    pub fn new(data: Bytes, timestamp: SystemTime, sequence: u64) -> Self {
        Self {
            data,
            timestamp,
            sequence,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Consume the frame and take its payload
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("size", &self.data.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Which image a bridge pulls out of each capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Depth,
    Color,
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureKind::Depth => f.write_str("depth"),
            CaptureKind::Color => f.write_str("color"),
        }
    }
}

/// Fixed frame dimensions of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
}

impl FrameGeometry {
    /// Build a geometry, rejecting dimensions that describe an empty frame
    pub fn new(width: u32, height: u32, bytes_per_pixel: u32) -> Result<Self> {
        let geometry = Self {
            width,
            height,
            bytes_per_pixel,
        };
        if geometry.frame_size() == 0 {
            return Err(BridgeError::EmptyFrame {
                width,
                height,
                bytes_per_pixel,
            });
        }
        Ok(geometry)
    }

    /// Expected byte size of one frame: width × height × bytes-per-pixel
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel as usize
    }
}
