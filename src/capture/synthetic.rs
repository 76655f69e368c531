//! Paced synthetic frame source for running without a camera

use std::time::{Duration, Instant};

use tracing::info;

use super::frame::{CaptureKind, FrameGeometry};
use super::source::FrameSource;

/// Produces a moving gradient at a fixed rate.
///
/// Each call sleeps until the next frame deadline, so the capture loop sees
/// the same blocking behaviour as with a real device.
pub struct PatternSource {
    buffer: Vec<u8>,
    interval: Duration,
    next_deadline: Option<Instant>,
    tick: u8,
}

impl PatternSource {
    pub fn new(geometry: FrameGeometry, fps: u32) -> Self {
        info!(
            "Pattern source {}x{}x{} at {} fps",
            geometry.width, geometry.height, geometry.bytes_per_pixel, fps
        );
        Self {
            buffer: vec![0; geometry.frame_size()],
            interval: Duration::from_secs(1) / fps.max(1),
            next_deadline: None,
            tick: 0,
        }
    }

    fn render(&mut self, kind: CaptureKind) {
        let offset = match kind {
            CaptureKind::Depth => 0,
            CaptureKind::Color => 128,
        };
        for (i, byte) in self.buffer.iter_mut().enumerate() {
            *byte = (i as u8).wrapping_add(self.tick).wrapping_add(offset);
        }
        self.tick = self.tick.wrapping_add(1);
    }
}

impl FrameSource for PatternSource {
    fn wait_for_next_capture(&mut self, kind: CaptureKind) -> Option<&[u8]> {
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        // Don't try to catch up after a stall
        self.next_deadline = Some(deadline.max(now) + self.interval);

        self.render(kind);
        Some(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_fills_expected_size() {
        let geometry = FrameGeometry::new(4, 2, 3).unwrap();
        let mut source = PatternSource::new(geometry, 1000);
        let data = source.wait_for_next_capture(CaptureKind::Color).unwrap();
        assert_eq!(data.len(), 24);
        assert_eq!(data[0], 128);
    }

    #[test]
    fn pattern_moves_between_frames() {
        let geometry = FrameGeometry::new(2, 2, 1).unwrap();
        let mut source = PatternSource::new(geometry, 1000);
        let first = source
            .wait_for_next_capture(CaptureKind::Depth)
            .unwrap()
            .to_vec();
        let second = source
            .wait_for_next_capture(CaptureKind::Depth)
            .unwrap()
            .to_vec();
        assert_ne!(first, second);
    }

    #[test]
    fn pattern_is_paced() {
        let geometry = FrameGeometry::new(1, 1, 1).unwrap();
        let mut source = PatternSource::new(geometry, 50);
        let start = Instant::now();
        for _ in 0..3 {
            source.wait_for_next_capture(CaptureKind::Depth);
        }
        // first capture is immediate, the next two wait 20ms each
        assert!(start.elapsed() >= Duration::from_millis(35));
    }
}
