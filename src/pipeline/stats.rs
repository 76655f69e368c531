//! One-second throughput windows for the capture and delivery sides

use tracing::info;

/// Throughput of one completed one-second window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Throughput {
    pub label: String,
    pub second: u64,
    pub fps: u32,
    pub bytes: u64,
}

impl Throughput {
    /// Bandwidth in kbps (bytes × 8 / 1024)
    pub fn kbps(&self) -> u64 {
        self.bytes / 128
    }
}

/// Counts frames and bytes per wall-clock second.
///
/// Not synchronised: the capture thread and the event loop each own one.
#[derive(Debug)]
pub struct StatsCounter {
    label: String,
    window_second: Option<u64>,
    frames: u32,
    bytes: u64,
}

impl StatsCounter {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            window_second: None,
            frames: 0,
            bytes: 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Record one frame observed during `second`.
    ///
    /// When `second` moves past the current window, the finished window is
    /// logged and returned, and counting restarts with this frame.
    pub fn notify(&mut self, second: u64, size: usize) -> Option<Throughput> {
        let finished = match self.window_second {
            Some(current) if current != second => {
                let window = Throughput {
                    label: self.label.clone(),
                    second: current,
                    fps: self.frames,
                    bytes: self.bytes,
                };
                info!(
                    "{} tv_sec:{} fps:{} bandwidth:{}kbps",
                    window.label,
                    window.second,
                    window.fps,
                    window.kbps()
                );
                metrics::gauge!("throughput_fps", "counter" => self.label.clone())
                    .set(f64::from(window.fps));
                self.frames = 0;
                self.bytes = 0;
                Some(window)
            }
            _ => None,
        };

        self.window_second = Some(second);
        self.frames += 1;
        self.bytes += size as u64;
        finished
    }
}
