//! Boundary to the hardware frame producer

use super::frame::CaptureKind;

/// A blocking producer of raw captures.
///
/// Implementations block until the device hands over the next capture and
/// return the payload for the requested kind, or `None` when the capture
/// carried no data for it. The returned slice is only borrowed; the capture
/// loop copies it into an owned frame before calling back in.
pub trait FrameSource: Send + 'static {
    fn wait_for_next_capture(&mut self, kind: CaptureKind) -> Option<&[u8]>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn wait_for_next_capture(&mut self, kind: CaptureKind) -> Option<&[u8]> {
        (**self).wait_for_next_capture(kind)
    }
}
