//! Dedicated capture thread: blocking captures in, owned frames out

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use bytes::BytesMut;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::queue::FrameQueue;
use super::stats::StatsCounter;
use super::wakeup::Wakeup;
use crate::capture::{CaptureKind, Frame, FrameGeometry, FrameSource};
use crate::error::Result;
use crate::utils::unix_second;
use crate::BridgeSettings;

/// What the capture thread did before it was stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub frames_captured: u64,
    pub capture_misses: u64,
}

/// Owned handle to a running capture thread.
///
/// The thread checks its cancellation token before every capture. A capture
/// already blocked inside the source cannot be interrupted, so stopping may
/// take up to one capture interval. Dropping the handle cancels and joins.
pub struct CaptureLoop {
    name: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<CaptureSummary>>,
}

impl CaptureLoop {
    /// Start capturing on a new named thread
    pub fn spawn<S: FrameSource>(
        settings: &BridgeSettings,
        source: S,
        queue: Arc<FrameQueue>,
        wakeup: Wakeup,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let worker = Worker {
            name: settings.name.clone(),
            kind: settings.kind,
            geometry: settings.geometry,
            cpu_core: settings.cpu_core,
            queue,
            wakeup,
            cancel: cancel.clone(),
        };

        let handle = thread::Builder::new()
            .name(format!("capture-{}", settings.name))
            .spawn(move || worker.run(source))?;

        Ok(Self {
            name: settings.name.clone(),
            cancel,
            handle: Some(handle),
        })
    }

    /// True once the thread has returned
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancel and wait for the thread to exit
    pub fn join(mut self) -> CaptureSummary {
        self.stop()
    }

    fn stop(&mut self) -> CaptureSummary {
        self.cancel.cancel();
        let Some(handle) = self.handle.take() else {
            return CaptureSummary::default();
        };
        debug!("Joining capture thread for {}", self.name);
        match handle.join() {
            Ok(summary) => summary,
            Err(_) => {
                error!("Capture thread for {} panicked", self.name);
                CaptureSummary::default()
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    name: String,
    kind: CaptureKind,
    geometry: FrameGeometry,
    cpu_core: Option<usize>,
    queue: Arc<FrameQueue>,
    wakeup: Wakeup,
    cancel: CancellationToken,
}

impl Worker {
    fn run<S: FrameSource>(self, mut source: S) -> CaptureSummary {
        info!("begin capture thread {} ({})", self.name, self.kind);
        if let Some(core) = self.cpu_core {
            pin_to_core(core);
        }

        let frame_size = self.geometry.frame_size();
        let mut stats = StatsCounter::new(format!("{} in", self.name));
        let mut summary = CaptureSummary::default();
        let mut sequence = 0u64;
        let mut consumer_gone = false;

        while !self.cancel.is_cancelled() {
            let payload = source.wait_for_next_capture(self.kind);
            let timestamp = SystemTime::now();
            stats.notify(unix_second(timestamp), frame_size);

            let Some(raw) = payload else {
                debug!("{} frame arrived\ttimestamp:{:?}\tN/A", self.name, timestamp);
                summary.capture_misses += 1;
                metrics::counter!("capture_misses", "stream" => self.name.clone()).increment(1);
                continue;
            };

            if raw.len() != frame_size {
                warn!(
                    "{} payload is {} bytes, expected {}",
                    self.name,
                    raw.len(),
                    frame_size
                );
            }
            let mut buf = BytesMut::zeroed(frame_size);
            let copied = raw.len().min(frame_size);
            buf[..copied].copy_from_slice(&raw[..copied]);

            sequence += 1;
            let frame = Frame::new(buf.freeze(), timestamp, sequence);
            debug!(
                "{} frame arrived\ttimestamp:{:?}\tseq:{}\tsize:{}",
                self.name, timestamp, sequence, frame_size
            );

            let evicted = self.queue.push(frame);
            summary.frames_captured += 1;
            metrics::counter!("frames_captured", "stream" => self.name.clone()).increment(1);
            if evicted > 0 {
                metrics::counter!("frames_dropped", "stream" => self.name.clone())
                    .increment(evicted as u64);
            }

            if !self.wakeup.signal() && !consumer_gone {
                trace!("{} event loop no longer listening for wakeups", self.name);
                consumer_gone = true;
            }
        }

        info!(
            "end capture thread {} ({} frames, {} misses)",
            self.name, summary.frames_captured, summary.capture_misses
        );
        summary
    }
}

fn pin_to_core(core: usize) {
    let pinned = core_affinity::get_core_ids()
        .and_then(|ids| ids.into_iter().find(|id| id.id == core))
        .map(core_affinity::set_for_current)
        .unwrap_or(false);
    if pinned {
        info!("Capture thread pinned to core {}", core);
    } else {
        warn!("Could not pin capture thread to core {}", core);
    }
}
