//! Plain-integer counters, a `Tracer` capability trait for structured pause
//! events, and a `HeapSummary` read-only snapshot query.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Heap-wide plain-integer counters, snapshotted on demand. Grounded on the
/// teacher's plain atomic counters in `plan/global.rs` (`get_used_pages`,
/// `incremental_collection_count`) rather than a histogram/metrics crate.
#[derive(Default)]
pub struct Counters {
    pub young_pause_count: AtomicU64,
    pub mixed_pause_count: AtomicU64,
    pub full_pause_count: AtomicU64,
    pub concurrent_cycle_count: AtomicU64,
    pub evacuation_failure_count: AtomicU64,
    pub mark_stack_overflow_count: AtomicU64,
    pub bytes_copied: AtomicU64,
    pub bytes_allocated: AtomicU64,
    pub regions_reclaimed: AtomicUsize,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            young_pause_count: self.young_pause_count.load(Ordering::Relaxed),
            mixed_pause_count: self.mixed_pause_count.load(Ordering::Relaxed),
            full_pause_count: self.full_pause_count.load(Ordering::Relaxed),
            concurrent_cycle_count: self.concurrent_cycle_count.load(Ordering::Relaxed),
            evacuation_failure_count: self.evacuation_failure_count.load(Ordering::Relaxed),
            mark_stack_overflow_count: self.mark_stack_overflow_count.load(Ordering::Relaxed),
            bytes_copied: self.bytes_copied.load(Ordering::Relaxed),
            bytes_allocated: self.bytes_allocated.load(Ordering::Relaxed),
            regions_reclaimed: self.regions_reclaimed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub young_pause_count: u64,
    pub mixed_pause_count: u64,
    pub full_pause_count: u64,
    pub concurrent_cycle_count: u64,
    pub evacuation_failure_count: u64,
    pub mark_stack_overflow_count: u64,
    pub bytes_copied: u64,
    pub bytes_allocated: u64,
    pub regions_reclaimed: usize,
}

/// Structured pause/cycle events, emitted only when `is_enabled()` returns
/// `true`. A cheap gate-before-build, matching the teacher's probe-based
/// tracing in spirit without depending on a USDT/Dtrace crate.
pub trait Tracer: Send + Sync {
    fn is_enabled(&self) -> bool {
        false
    }

    fn pause_start(&self, _kind: &str) {}
    fn pause_end(&self, _kind: &str, _duration_millis: f64) {}
    fn concurrent_cycle_start(&self) {}
    fn concurrent_cycle_end(&self, _aborted: bool) {}
    fn evacuation_failure(&self, _region_index: usize) {}
}

/// The default tracer: every method is a no-op and `is_enabled` is `false`,
/// so callers can skip building event payloads entirely.
#[derive(Default)]
pub struct NullTracer;

impl Tracer for NullTracer {}

/// Per-region-role committed/used byte and region-count snapshot, independent
/// of any `Tracer`, so tests can assert invariants without a tracer wired up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapSummary {
    pub committed_bytes: usize,
    pub used_bytes: usize,
    pub eden_regions: usize,
    pub survivor_regions: usize,
    pub old_regions: usize,
    pub humongous_regions: usize,
    pub free_regions: usize,
}
