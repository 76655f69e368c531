//! V4L2 frame source using memory-mapped streaming

use tracing::{debug, info, instrument};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::frame::{CaptureKind, FrameGeometry};
use super::source::FrameSource;
use crate::error::{BridgeError, Result};

/// Number of kernel buffers requested for streaming
const BUFFER_COUNT: u32 = 4;

/// Pixel format requested from the driver for each capture kind
pub fn fourcc_for(kind: CaptureKind) -> FourCC {
    match kind {
        CaptureKind::Depth => FourCC::new(b"Z16 "),
        CaptureKind::Color => FourCC::new(b"RGB3"),
    }
}

/// Capture from a single V4L2 node.
///
/// Depth cameras expose depth and color as separate nodes, so one source
/// serves exactly one kind; requests for the other kind return no payload.
pub struct V4l2Source {
    _device: Box<Device>,
    stream: MmapStream<'static>,
    kind: CaptureKind,
}

impl V4l2Source {
    #[instrument]
    pub fn open(path: &str, kind: CaptureKind, geometry: FrameGeometry) -> Result<Self> {
        info!("Opening V4L2 {} source: {}", kind, path);

        let device = Device::with_path(path)
            .map_err(|e| BridgeError::Device(format!("{path}: {e}")))?;

        let caps = device
            .query_caps()
            .map_err(|e| BridgeError::Device(format!("{path}: {e}")))?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(BridgeError::Device(format!(
                "{path} doesn't support video capture"
            )));
        }

        let mut fmt = device
            .format()
            .map_err(|e| BridgeError::Device(format!("{path}: {e}")))?;
        fmt.width = geometry.width;
        fmt.height = geometry.height;
        fmt.fourcc = fourcc_for(kind);
        device
            .set_format(&fmt)
            .map_err(|e| BridgeError::Device(format!("{path}: {e}")))?;

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| BridgeError::Device(format!("{path}: {e}")))?;
        info!("Capture stream started with {} buffers", BUFFER_COUNT);

        Ok(Self {
            _device: Box::new(device),
            stream,
            kind,
        })
    }
}

impl FrameSource for V4l2Source {
    fn wait_for_next_capture(&mut self, kind: CaptureKind) -> Option<&[u8]> {
        if kind != self.kind {
            debug!("V4L2 source serves {} frames, not {}", self.kind, kind);
            return None;
        }
        match self.stream.next() {
            Ok((buf, _meta)) => Some(buf),
            Err(e) => {
                debug!("V4L2 dequeue failed: {}", e);
                None
            }
        }
    }
}
