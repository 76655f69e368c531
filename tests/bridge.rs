//! End-to-end tests driving a bridge with a hand-fed frame source

use std::num::NonZeroUsize;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use framebridge::pipeline::DeliveryState;
use framebridge::{
    Bridge, BridgeSettings, CaptureKind, Delivery, FrameGeometry, FrameSink, FrameSource,
};
use tokio_util::sync::CancellationToken;

/// Blocks until the test feeds a payload; reports a miss every 10ms so the
/// capture thread can observe cancellation.
struct FedSource {
    rx: mpsc::Receiver<Vec<u8>>,
    current: Vec<u8>,
}

impl FrameSource for FedSource {
    fn wait_for_next_capture(&mut self, _kind: CaptureKind) -> Option<&[u8]> {
        match self.rx.recv_timeout(Duration::from_millis(10)) {
            Ok(data) => {
                self.current = data;
                Some(&self.current)
            }
            Err(_) => None,
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    buffer: Vec<u8>,
    deliveries: Vec<(Delivery, Vec<u8>)>,
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

fn settings(capacity: usize, geometry: FrameGeometry) -> BridgeSettings {
    BridgeSettings {
        name: "fed".into(),
        capacity: NonZeroUsize::new(capacity).unwrap(),
        kind: CaptureKind::Depth,
        geometry,
        cpu_core: None,
    }
}

fn start(
    capacity: usize,
    geometry: FrameGeometry,
    sink_size: usize,
) -> (mpsc::Sender<Vec<u8>>, Bridge<RecordingSink>) {
    let (tx, rx) = mpsc::channel();
    let source = FedSource {
        rx,
        current: Vec::new(),
    };
    let sink = RecordingSink {
        buffer: vec![0; sink_size],
        deliveries: Vec::new(),
    };
    let bridge = Bridge::start(
        settings(capacity, geometry),
        source,
        sink,
        &CancellationToken::new(),
    )
    .unwrap();
    (tx, bridge)
}

fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("condition not reached");
}

fn small() -> FrameGeometry {
    FrameGeometry::new(2, 2, 1).unwrap()
}

#[test]
fn parked_pull_is_served_by_wakeup() {
    let (tx, mut bridge) = start(4, small(), 4);

    assert!(bridge.controller_mut().pull_next_frame().is_none());
    assert_eq!(bridge.controller().state(), DeliveryState::AwaitingData);

    tx.send(vec![7, 7, 7, 7]).unwrap();
    let mut delivered = 0;
    wait_for(|| {
        delivered += bridge.handle_wakeups();
        delivered > 0
    });

    assert_eq!(delivered, 1);
    assert_eq!(bridge.controller().state(), DeliveryState::Idle);
    let deliveries = &bridge.controller().sink().deliveries;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].1, vec![7, 7, 7, 7]);
    assert_eq!(deliveries[0].0.sequence, 1);

    bridge.shutdown();
}

#[test]
fn unrequested_frames_wait_in_queue() {
    let (tx, mut bridge) = start(4, small(), 4);

    tx.send(vec![1; 4]).unwrap();
    wait_for(|| bridge.queue().len() == 1);
    std::thread::sleep(Duration::from_millis(20));

    // wakeup arrives while nobody is asking
    assert_eq!(bridge.handle_wakeups(), 0);
    assert_eq!(bridge.queue().len(), 1);

    let delivery = bridge.controller_mut().pull_next_frame().unwrap();
    assert_eq!(delivery.sequence, 1);
    bridge.shutdown();
}

#[test]
fn overflow_keeps_newest_frames() {
    let (tx, mut bridge) = start(2, small(), 4);

    for value in 1..=5u8 {
        tx.send(vec![value; 4]).unwrap();
    }
    wait_for(|| bridge.queue().stats().frames_written == 5);
    assert_eq!(bridge.queue().len(), 2);
    assert_eq!(bridge.queue().stats().frames_dropped, 3);

    let controller = bridge.controller_mut();
    assert_eq!(controller.pull_next_frame().unwrap().sequence, 4);
    assert_eq!(controller.pull_next_frame().unwrap().sequence, 5);
    assert!(controller.pull_next_frame().is_none());
    assert!(controller.is_awaiting_data());

    let data: Vec<u8> = controller
        .sink()
        .deliveries
        .iter()
        .map(|(_, bytes)| bytes[0])
        .collect();
    assert_eq!(data, vec![4, 5]);
    bridge.shutdown();
}

#[test]
fn large_frames_are_truncated_for_small_sinks() {
    let geometry = FrameGeometry::new(50, 10, 3).unwrap();
    let (tx, mut bridge) = start(2, geometry, 1000);

    tx.send((0..1500).map(|i| i as u8).collect()).unwrap();
    wait_for(|| bridge.queue().len() == 1);

    let delivery = bridge.controller_mut().pull_next_frame().unwrap();
    assert_eq!(delivery.frame_size, 1000);
    assert_eq!(delivery.truncated_bytes, 500);
    let bytes = &bridge.controller().sink().deliveries[0].1;
    assert_eq!(bytes.len(), 1000);
    assert_eq!(bytes[999], (999 % 256) as u8);
    bridge.shutdown();
}

#[test]
fn shutdown_joins_capture_and_releases_frames() {
    let (tx, bridge) = start(4, small(), 4);
    for value in 0..3u8 {
        tx.send(vec![value; 4]).unwrap();
    }
    wait_for(|| bridge.queue().len() == 3);

    let queue = Arc::clone(bridge.queue());
    let report = bridge.shutdown();

    assert_eq!(report.capture.frames_captured, 3);
    assert_eq!(report.frames_discarded, 3);
    assert_eq!(report.queue.frames_read, 0);
    assert!(queue.is_empty());

    // the source went away with the joined thread
    assert!(tx.send(vec![9; 4]).is_err());
    assert!(queue.is_empty());
}

#[tokio::test]
async fn run_loop_delivers_fed_frames_and_stops_on_cancel() {
    let (tx, mut bridge) = start(8, small(), 4);
    let stop = bridge.cancel_token().clone();

    let feeder = std::thread::spawn(move || {
        for value in 1..=3u8 {
            tx.send(vec![value; 4]).unwrap();
            std::thread::sleep(Duration::from_millis(15));
        }
        tx
    });

    let runner = async {
        bridge.run().await;
    };
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        stop.cancel();
    };
    tokio::join!(runner, canceller);

    let sequences: Vec<u64> = bridge
        .controller()
        .sink()
        .deliveries
        .iter()
        .map(|(d, _)| d.sequence)
        .collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(bridge.controller().state(), DeliveryState::Idle);

    let report = bridge.shutdown();
    assert_eq!(report.frames_discarded, 0);
    drop(feeder.join().unwrap());
}
