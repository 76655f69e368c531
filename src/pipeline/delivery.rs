//! Event-loop side of the bridge: answers "give me the next frame" requests

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, trace};

use super::queue::FrameQueue;
use super::stats::StatsCounter;
use crate::capture::Frame;
use crate::utils::{elapsed_between, unix_second};

/// Outcome of one delivery, handed to the sink after its buffer was filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Bytes written into the sink buffer
    pub frame_size: usize,
    /// Bytes of the frame that did not fit
    pub truncated_bytes: usize,
    /// Capture time of the frame
    pub presentation_time: SystemTime,
    /// Capture-to-delivery delay
    pub latency: Duration,
    /// Capture sequence number
    pub sequence: u64,
}

/// Consumer of delivered frames.
///
/// Called only from the event loop that owns the [`DeliveryController`].
pub trait FrameSink {
    /// Destination for the next frame. Its length is the sink's maximum
    /// frame size; larger frames are truncated to fit.
    fn buffer(&mut self) -> &mut [u8];

    /// The buffer holds a new frame
    fn after_getting(&mut self, delivery: Delivery);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// No pull request outstanding
    Idle,
    /// The sink asked for a frame and none was queued
    AwaitingData,
}

/// Pull-driven state machine between the frame queue and a sink.
///
/// Lives on the event loop and never blocks: a pull is served from the
/// queue if possible, otherwise it is parked until the capture thread's
/// wakeup is handled through [`on_wakeup`](Self::on_wakeup).
pub struct DeliveryController<S> {
    name: String,
    queue: Arc<FrameQueue>,
    sink: S,
    state: DeliveryState,
    stats: StatsCounter,
}

impl<S: FrameSink> DeliveryController<S> {
    pub fn new(name: impl Into<String>, queue: Arc<FrameQueue>, sink: S) -> Self {
        let name = name.into();
        Self {
            stats: StatsCounter::new(format!("{name} out")),
            name,
            queue,
            sink,
            state: DeliveryState::Idle,
        }
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    pub fn is_awaiting_data(&self) -> bool {
        self.state == DeliveryState::AwaitingData
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Sink asks for the next frame.
    ///
    /// Returns the delivery if a frame was queued. A second pull while one is
    /// already parked is ignored; the pending wakeup will serve it.
    pub fn pull_next_frame(&mut self) -> Option<Delivery> {
        debug!("{} pull request", self.name);
        if self.is_awaiting_data() {
            trace!("{} pull already pending", self.name);
            return None;
        }

        match self.queue.pop_front() {
            Some(frame) => self.deliver(frame),
            None => {
                self.state = DeliveryState::AwaitingData;
                None
            }
        }
    }

    /// Capture thread signalled that data may be ready
    pub fn on_wakeup(&mut self) -> Option<Delivery> {
        if !self.is_awaiting_data() {
            debug!("{} sink wasn't asking", self.name);
            return None;
        }

        debug!("{} sink is asking", self.name);
        let frame = self.queue.pop_front()?;
        self.state = DeliveryState::Idle;
        self.deliver(frame)
    }

    /// Sink stopped asking; a parked pull is dropped without delivery
    pub fn stop_getting_frames(&mut self) {
        debug!("{} stop getting frames", self.name);
        self.state = DeliveryState::Idle;
    }

    fn deliver(&mut self, frame: Frame) -> Option<Delivery> {
        let now = SystemTime::now();
        self.stats.notify(unix_second(now), frame.size());

        let buffer = self.sink.buffer();
        let (frame_size, truncated_bytes) = fit(frame.size(), buffer.len());
        buffer[..frame_size].copy_from_slice(&frame.data()[..frame_size]);

        let latency = elapsed_between(frame.timestamp(), now);
        debug!(
            "{} deliverFrame\tseq:{}\tsize:{}\tdiff:{}ms\tqueue:{}\tframe:{}\tmax:{}",
            self.name,
            frame.sequence(),
            frame_size,
            latency.as_millis(),
            self.queue.len(),
            frame.size(),
            buffer.len()
        );
        metrics::histogram!("frame_latency_ms", "stream" => self.name.clone())
            .record(latency.as_secs_f64() * 1000.0);
        if truncated_bytes > 0 {
            metrics::counter!("bytes_truncated", "stream" => self.name.clone())
                .increment(truncated_bytes as u64);
        }

        let delivery = Delivery {
            frame_size,
            truncated_bytes,
            presentation_time: frame.timestamp(),
            latency,
            sequence: frame.sequence(),
        };
        // frame released here, its bytes now live in the sink buffer
        drop(frame);

        if frame_size == 0 {
            return None;
        }
        metrics::counter!("frames_delivered", "stream" => self.name.clone()).increment(1);
        self.sink.after_getting(delivery);
        Some(delivery)
    }
}

/// Split a frame into delivered and truncated byte counts for a sink buffer
pub fn fit(frame_size: usize, max_size: usize) -> (usize, usize) {
    let delivered = frame_size.min(max_size);
    (delivered, frame_size - delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[derive(Default)]
    struct RecordingSink {
        buffer: Vec<u8>,
        deliveries: Vec<(Delivery, Vec<u8>)>,
    }

    impl RecordingSink {
        fn with_max(max: usize) -> Self {
            Self {
                buffer: vec![0; max],
                deliveries: Vec::new(),
            }
        }
    }

    impl FrameSink for RecordingSink {
        fn buffer(&mut self) -> &mut [u8] {
            &mut self.buffer
        }

        fn after_getting(&mut self, delivery: Delivery) {
            let bytes = self.buffer[..delivery.frame_size].to_vec();
            self.deliveries.push((delivery, bytes));
        }
    }

    fn frame(sequence: u64, size: usize) -> Frame {
        Frame::new(
            Bytes::from(vec![sequence as u8; size]),
            SystemTime::now(),
            sequence,
        )
    }

    fn controller(max: usize) -> (Arc<FrameQueue>, DeliveryController<RecordingSink>) {
        let queue = Arc::new(FrameQueue::new(4).unwrap());
        let controller =
            DeliveryController::new("test", Arc::clone(&queue), RecordingSink::with_max(max));
        (queue, controller)
    }

    #[test]
    fn fit_truncates_to_sink_size() {
        assert_eq!(fit(1500, 1000), (1000, 500));
        assert_eq!(fit(800, 1000), (800, 0));
        assert_eq!(fit(1000, 1000), (1000, 0));
    }

    #[test]
    fn pull_serves_queued_frame_immediately() {
        let (queue, mut controller) = controller(16);
        queue.push(frame(1, 8));

        let delivery = controller.pull_next_frame().unwrap();
        assert_eq!(delivery.frame_size, 8);
        assert_eq!(delivery.truncated_bytes, 0);
        assert_eq!(delivery.sequence, 1);
        assert_eq!(controller.state(), DeliveryState::Idle);
        assert_eq!(controller.sink().deliveries.len(), 1);
        assert_eq!(controller.sink().deliveries[0].1, vec![1; 8]);
    }

    #[test]
    fn empty_pull_parks_until_wakeup() {
        let (queue, mut controller) = controller(16);

        assert!(controller.pull_next_frame().is_none());
        assert!(controller.is_awaiting_data());

        // wakeup with nothing queued keeps the pull parked
        assert!(controller.on_wakeup().is_none());
        assert!(controller.is_awaiting_data());

        queue.push(frame(3, 4));
        let delivery = controller.on_wakeup().unwrap();
        assert_eq!(delivery.sequence, 3);
        assert_eq!(controller.state(), DeliveryState::Idle);
        assert_eq!(controller.sink().deliveries.len(), 1);

        // no second delivery without a new pull
        queue.push(frame(4, 4));
        assert!(controller.on_wakeup().is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn repeated_pull_while_parked_does_not_deliver() {
        let (queue, mut controller) = controller(16);
        assert!(controller.pull_next_frame().is_none());

        queue.push(frame(1, 4));
        assert!(controller.pull_next_frame().is_none());
        assert_eq!(queue.len(), 1);

        assert!(controller.on_wakeup().is_some());
        assert!(queue.is_empty());
        assert_eq!(controller.sink().deliveries.len(), 1);
    }

    #[test]
    fn oversized_frame_is_truncated() {
        let (queue, mut controller) = controller(1000);
        queue.push(frame(1, 1500));

        let delivery = controller.pull_next_frame().unwrap();
        assert_eq!(delivery.frame_size, 1000);
        assert_eq!(delivery.truncated_bytes, 500);
    }

    #[test]
    fn presentation_time_is_capture_time() {
        let (queue, mut controller) = controller(16);
        let captured = SystemTime::UNIX_EPOCH + Duration::from_secs(42);
        queue.push(Frame::new(Bytes::from_static(b"xy"), captured, 1));

        let delivery = controller.pull_next_frame().unwrap();
        assert_eq!(delivery.presentation_time, captured);
        assert!(delivery.latency > Duration::ZERO);
    }

    #[test]
    fn zero_sized_delivery_is_not_reported() {
        let (queue, mut controller) = controller(0);
        queue.push(frame(1, 4));

        assert!(controller.pull_next_frame().is_none());
        assert!(queue.is_empty());
        assert!(controller.sink().deliveries.is_empty());
        assert_eq!(controller.state(), DeliveryState::Idle);
    }

    #[test]
    fn stop_discards_parked_pull() {
        let (queue, mut controller) = controller(16);
        controller.pull_next_frame();
        controller.stop_getting_frames();
        assert_eq!(controller.state(), DeliveryState::Idle);

        queue.push(frame(1, 4));
        assert!(controller.on_wakeup().is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn frames_are_delivered_in_capture_order() {
        let (queue, mut controller) = controller(16);
        for seq in 1..=3 {
            queue.push(frame(seq, 4));
        }
        let order: Vec<u64> = std::iter::from_fn(|| controller.pull_next_frame())
            .map(|d| d.sequence)
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(controller.is_awaiting_data());
    }
}
