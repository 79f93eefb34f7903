pub mod bitmap;
pub mod concurrent_mark;
pub mod queue;

pub use bitmap::RegionMarkState;
pub use concurrent_mark::{ConcurrentMark, MarkCyclePhase};
pub use queue::{MarkQueueSet, WorkerMarkQueue};
