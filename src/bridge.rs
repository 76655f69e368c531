//! One capture stream: capture thread, frame queue and delivery controller

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::capture::FrameSource;
use crate::error::Result;
use crate::pipeline::{
    wakeup_channel, CaptureLoop, CaptureSummary, DeliveryController, FrameQueue, FrameSink,
    QueueStats, WakeupReceiver,
};
use crate::BridgeSettings;

/// Final accounting returned by [`Bridge::shutdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    pub capture: CaptureSummary,
    pub queue: QueueStats,
    /// Frames still queued at shutdown and released undelivered
    pub frames_discarded: usize,
}

/// A running capture stream.
///
/// The capture thread starts with the bridge. The delivery side is driven by
/// the owning event loop, either through [`run`](Self::run) or by calling the
/// controller and [`handle_wakeups`](Self::handle_wakeups) directly.
///
/// Dropping the bridge stops and joins the capture thread before the queue
/// and its frames are released.
pub struct Bridge<S> {
    // dropped first so the thread is joined before the queue goes away
    capture: CaptureLoop,
    settings: BridgeSettings,
    queue: Arc<FrameQueue>,
    controller: DeliveryController<S>,
    wakeups: WakeupReceiver,
    cancel: CancellationToken,
}

impl<S: FrameSink> Bridge<S> {
    /// Start capturing.
    ///
    /// The bridge stops when `cancel` (or the bridge itself) is cancelled.
    #[instrument(skip_all, fields(stream = %settings.name, kind = %settings.kind))]
    pub fn start<F: FrameSource>(
        settings: BridgeSettings,
        source: F,
        sink: S,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let queue = Arc::new(FrameQueue::new(settings.capacity.get())?);
        let (wakeup, wakeups) = wakeup_channel();
        let cancel = cancel.child_token();

        let capture =
            CaptureLoop::spawn(&settings, source, Arc::clone(&queue), wakeup, cancel.clone())?;
        let controller = DeliveryController::new(settings.name.clone(), Arc::clone(&queue), sink);

        info!(
            "Bridge started: {}x{}x{} frames of {} bytes, queue of {}",
            settings.geometry.width,
            settings.geometry.height,
            settings.geometry.bytes_per_pixel,
            settings.geometry.frame_size(),
            settings.capacity
        );

        Ok(Self {
            capture,
            settings,
            queue,
            controller,
            wakeups,
            cancel,
        })
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn queue(&self) -> &Arc<FrameQueue> {
        &self.queue
    }

    pub fn controller(&self) -> &DeliveryController<S> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut DeliveryController<S> {
        &mut self.controller
    }

    /// Token stopping this bridge only
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Handle every wakeup already posted, without waiting.
    ///
    /// Returns how many frames were delivered.
    pub fn handle_wakeups(&mut self) -> usize {
        let mut delivered = 0;
        while self.wakeups.try_recv() {
            if self.controller.on_wakeup().is_some() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Drive deliveries on the current event loop until cancelled.
    ///
    /// The sink is asked for a frame again right after each delivery, so it
    /// receives frames as fast as they are captured. Wakeups are handled here,
    /// on the task awaiting this future, never on the capture thread.
    pub async fn run(&mut self) {
        let Self {
            controller,
            wakeups,
            cancel,
            settings,
            ..
        } = self;
        info!("{} delivery loop started", settings.name);

        loop {
            if !controller.is_awaiting_data() {
                controller.pull_next_frame();
                if !controller.is_awaiting_data() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    // let other streams on this loop run between frames
                    tokio::task::yield_now().await;
                    continue;
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                woke = wakeups.recv() => {
                    if !woke {
                        warn!("{} capture thread is gone", settings.name);
                        break;
                    }
                    controller.on_wakeup();
                }
            }
        }

        controller.stop_getting_frames();
        info!("{} delivery loop stopped", settings.name);
    }

    /// Stop the capture thread, join it, then release queued frames.
    ///
    /// Blocks until the capture in progress returns.
    pub fn shutdown(self) -> TeardownReport {
        let Self {
            capture,
            settings,
            queue,
            mut controller,
            cancel,
            ..
        } = self;

        controller.stop_getting_frames();
        cancel.cancel();
        let capture = capture.join();
        let frames_discarded = queue.drain();

        let report = TeardownReport {
            capture,
            queue: queue.stats(),
            frames_discarded,
        };
        info!(
            "{} shut down: captured {} missed {} dropped {} delivered {} discarded {}",
            settings.name,
            report.capture.frames_captured,
            report.capture.capture_misses,
            report.queue.frames_dropped,
            report.queue.frames_read,
            report.frames_discarded
        );
        report
    }
}
