pub mod capture_loop;
pub mod delivery;
pub mod queue;
pub mod stats;
pub mod wakeup;

pub use capture_loop::{CaptureLoop, CaptureSummary};
pub use delivery::{Delivery, DeliveryController, DeliveryState, FrameSink};
pub use queue::{FrameQueue, QueueStats};
pub use stats::{StatsCounter, Throughput};
pub use wakeup::{wakeup_channel, Wakeup, WakeupReceiver};
