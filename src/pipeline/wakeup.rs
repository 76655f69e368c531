//! Cross-thread "data may be ready" notification

use flume::{Receiver, Sender, TryRecvError, TrySendError};

/// Create a coalescing wakeup pair.
///
/// The channel holds at most one pending wakeup. Signalling while one is
/// already pending is a no-op: the pending wakeup is consumed after the
/// frame that triggered the new signal was queued, so no data goes unnoticed.
pub fn wakeup_channel() -> (Wakeup, WakeupReceiver) {
    let (tx, rx) = flume::bounded(1);
    (Wakeup { tx }, WakeupReceiver { rx })
}

/// Producer half, safe to signal from any thread
#[derive(Clone)]
pub struct Wakeup {
    tx: Sender<()>,
}

impl Wakeup {
    /// Post a wakeup. Returns `false` once the event-loop side is gone.
    pub fn signal(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => false,
        }
    }
}

/// Event-loop half; wakeups are handled wherever this is awaited
pub struct WakeupReceiver {
    rx: Receiver<()>,
}

impl WakeupReceiver {
    /// Wait for the next wakeup. Returns `false` once every producer is gone
    /// and no wakeup is pending.
    pub async fn recv(&self) -> bool {
        self.rx.recv_async().await.is_ok()
    }

    /// Take a pending wakeup without waiting
    pub fn try_recv(&self) -> bool {
        match self.rx.try_recv() {
            Ok(()) => true,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => false,
        }
    }
}
