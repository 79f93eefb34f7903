pub mod address;
pub mod constants;
pub mod conversions;
pub mod logger;
pub mod options;
pub mod statistics;

pub use self::address::{Address, ObjectReference};
pub use self::options::Options;
pub use self::statistics::{Counters, HeapSummary, NullTracer, Tracer};
