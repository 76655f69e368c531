//! Bounded drop-oldest frame queue shared between capture thread and event loop

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam::utils::CachePadded;
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;
use tracing::{debug, warn};

use crate::capture::Frame;
use crate::error::{BridgeError, Result};

/// Largest accepted queue capacity; the ring reserves every slot up front
pub const MAX_CAPACITY: usize = 4096;

/// Mutex-protected FIFO of owned frames.
///
/// The lock is held only for the push/pop/evict body. A push into a full
/// queue evicts the oldest frame first, so the length never exceeds the
/// capacity.
pub struct FrameQueue {
    ring: Mutex<HeapRb<Frame>>,
    capacity: usize,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_written: AtomicU64,
    frames_read: AtomicU64,
    frames_dropped: AtomicU64,
}

/// Snapshot of queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub frames_written: u64,
    pub frames_read: u64,
    pub frames_dropped: u64,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Result<Self> {
        check_capacity(capacity)?;
        Ok(Self {
            ring: Mutex::new(HeapRb::new(capacity)),
            capacity,
            stats: CachePadded::new(Stats::default()),
        })
    }

    // Frames are only ever moved in and out whole, so a panic elsewhere
    // while holding the lock cannot leave the ring half-updated.
    fn lock(&self) -> MutexGuard<'_, HeapRb<Frame>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer: append a frame, evicting the oldest ones while full.
    ///
    /// Returns the number of frames evicted.
    pub fn push(&self, frame: Frame) -> usize {
        let mut evicted = 0;
        let mut ring = self.lock();

        while ring.is_full() {
            let Some(oldest) = ring.try_pop() else {
                break;
            };
            debug!(
                "Queue full size drop frame seq:{} queue:{}",
                oldest.sequence(),
                ring.occupied_len() + 1
            );
            evicted += 1;
        }

        if let Err(rejected) = ring.try_push(frame) {
            // ring was just made non-full
            warn!("Queue rejected frame seq:{}", rejected.sequence());
            evicted += 1;
        } else {
            self.stats.frames_written.fetch_add(1, Ordering::Relaxed);
        }
        drop(ring);

        self.stats
            .frames_dropped
            .fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    /// Consumer: take the oldest frame, if any
    pub fn pop_front(&self) -> Option<Frame> {
        let frame = self.lock().try_pop();
        match &frame {
            Some(_) => {
                self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
            }
            None => debug!("Queue is empty"),
        }
        frame
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Release every queued frame, returning how many were discarded
    pub fn drain(&self) -> usize {
        let mut ring = self.lock();
        let mut released = 0;
        while ring.try_pop().is_some() {
            released += 1;
        }
        released
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            frames_written: self.stats.frames_written.load(Ordering::Relaxed),
            frames_read: self.stats.frames_read.load(Ordering::Relaxed),
            frames_dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Reject capacities outside `1..=MAX_CAPACITY`
pub fn check_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 {
        return Err(BridgeError::ZeroCapacity);
    }
    if capacity > MAX_CAPACITY {
        return Err(BridgeError::CapacityTooLarge {
            capacity,
            max: MAX_CAPACITY,
        });
    }
    Ok(())
}
