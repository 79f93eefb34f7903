//! The pause-kind state machine (component C10). Grounded on
//! `plan/g1/g1.rs`'s `collection_phase` match over a similar set of booleans
//! (`gcsAreYoung`/`lastGCWasYoung`/`duringInitialMarkPause` in the source
//! this crate is rewritten from) and `global_state.rs`'s `GcStatus`
//! enum/lock-guarded-boolean idiom, restructured into an explicit state
//! machine per the design notes ("replace the phase-table DSL with an
//! explicit match"). The actual pause *sequencing* (steps 1-7 of
//! `spec.md` §4.10) lives on `G1Heap::collect` in `lib.rs`, since it needs
//! mutable access to every other component; this module only holds the
//! booleans that decide which kind of pause is running and derives
//! `during_concurrent_mark` from them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Which kind of safepoint pause is about to run / just ran. A `Mixed` pause
/// also evacuates young regions; the distinction from `Young` is only
/// whether `CollectionSet::finalize_old_part` is allowed to admit old-gen
/// candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    Young,
    Mixed,
    /// A young pause piggybacking the initial-mark STW phase of a new
    /// concurrent cycle.
    InitialMark,
}

impl PauseKind {
    pub fn is_mixed(self) -> bool {
        matches!(self, PauseKind::Mixed)
    }

    pub fn is_initial_mark(self) -> bool {
        matches!(self, PauseKind::InitialMark)
    }
}

/// `spec.md` §4.10's state booleans, each guarded by the safepoint (only the
/// pause driver thread mutates them while the world is stopped) or, where
/// noted, by their own lock because a concurrent marking/refinement thread
/// reads or writes them between pauses.
pub struct CollectorState {
    gcs_are_young: AtomicBool,
    last_gc_was_young: AtomicBool,
    during_initial_mark_pause: AtomicBool,
    initiate_conc_mark_if_possible: AtomicBool,
    during_marking: AtomicBool,
    mark_in_progress: AtomicBool,
    in_marking_window: AtomicBool,
    in_marking_window_im: AtomicBool,
    full_collection: AtomicBool,
    /// Oldest-to-newest cause of the GC about to run/that just ran, read by
    /// the tracer. A plain `Mutex<String>` rather than an enum: causes are
    /// open-ended (`"Allocation Failure"`, `"System.gc()"`, ...) exactly as
    /// the teacher's `GCTriggerCause` values are free-form strings passed
    /// through to the tracer.
    cause: Mutex<String>,
}

impl Default for CollectorState {
    fn default() -> Self {
        CollectorState {
            gcs_are_young: AtomicBool::new(true),
            last_gc_was_young: AtomicBool::new(true),
            during_initial_mark_pause: AtomicBool::new(false),
            initiate_conc_mark_if_possible: AtomicBool::new(false),
            during_marking: AtomicBool::new(false),
            mark_in_progress: AtomicBool::new(false),
            in_marking_window: AtomicBool::new(false),
            in_marking_window_im: AtomicBool::new(false),
            full_collection: AtomicBool::new(false),
            cause: Mutex::new(String::from("Allocation Failure")),
        }
    }
}

impl CollectorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gcs_are_young(&self) -> bool {
        self.gcs_are_young.load(Ordering::Acquire)
    }

    pub fn set_gcs_are_young(&self, value: bool) {
        self.gcs_are_young.store(value, Ordering::Release);
    }

    pub fn last_gc_was_young(&self) -> bool {
        self.last_gc_was_young.load(Ordering::Acquire)
    }

    pub fn set_last_gc_was_young(&self, value: bool) {
        self.last_gc_was_young.store(value, Ordering::Release);
    }

    pub fn during_initial_mark_pause(&self) -> bool {
        self.during_initial_mark_pause.load(Ordering::Acquire)
    }

    pub fn set_during_initial_mark_pause(&self, value: bool) {
        self.during_initial_mark_pause.store(value, Ordering::Release);
    }

    pub fn initiate_conc_mark_if_possible(&self) -> bool {
        self.initiate_conc_mark_if_possible.load(Ordering::Acquire)
    }

    pub fn set_initiate_conc_mark_if_possible(&self, value: bool) {
        self.initiate_conc_mark_if_possible.store(value, Ordering::Release);
    }

    pub fn during_marking(&self) -> bool {
        self.during_marking.load(Ordering::Acquire)
    }

    pub fn set_during_marking(&self, value: bool) {
        self.during_marking.store(value, Ordering::Release);
    }

    pub fn mark_in_progress(&self) -> bool {
        self.mark_in_progress.load(Ordering::Acquire)
    }

    pub fn set_mark_in_progress(&self, value: bool) {
        self.mark_in_progress.store(value, Ordering::Release);
    }

    pub fn in_marking_window(&self) -> bool {
        self.in_marking_window.load(Ordering::Acquire)
    }

    pub fn set_in_marking_window(&self, value: bool) {
        self.in_marking_window.store(value, Ordering::Release);
    }

    pub fn in_marking_window_im(&self) -> bool {
        self.in_marking_window_im.load(Ordering::Acquire)
    }

    pub fn set_in_marking_window_im(&self, value: bool) {
        self.in_marking_window_im.store(value, Ordering::Release);
    }

    pub fn full_collection(&self) -> bool {
        self.full_collection.load(Ordering::Acquire)
    }

    pub fn set_full_collection(&self, value: bool) {
        self.full_collection.store(value, Ordering::Release);
    }

    /// Derived: `during_marking && in_marking_window && !in_marking_window_im`.
    pub fn during_concurrent_mark(&self) -> bool {
        self.in_marking_window() && !self.in_marking_window_im()
    }

    pub fn cause(&self) -> String {
        self.cause.lock().unwrap().clone()
    }

    pub fn set_cause(&self, cause: impl Into<String>) {
        *self.cause.lock().unwrap() = cause.into();
    }

    /// Decide which kind of pause is about to run, given whether a mixed
    /// cycle is active and whether the policy wants to piggyback initial
    /// mark on this pause. Mirrors `spec.md` §4.10's three-way pause
    /// sequence selection.
    pub fn decide_pause_kind(&self, mixed_mode_active: bool) -> PauseKind {
        if self.initiate_conc_mark_if_possible() && !self.mark_in_progress() {
            PauseKind::InitialMark
        } else if mixed_mode_active && !self.gcs_are_young() {
            PauseKind::Mixed
        } else {
            PauseKind::Young
        }
    }

    /// Pause prologue bookkeeping common to all three pause kinds (`spec.md`
    /// §4.10 step 1): record whether this pause piggybacks initial mark, and
    /// bump `in_marking_window`/`in_marking_window_im` to reflect it.
    pub fn prologue(&self, kind: PauseKind) {
        let is_initial_mark = kind.is_initial_mark();
        self.set_during_initial_mark_pause(is_initial_mark);
        if is_initial_mark {
            self.set_mark_in_progress(true);
            self.set_in_marking_window(true);
            self.set_in_marking_window_im(true);
        }
    }

    /// Pause epilogue bookkeeping (`spec.md` §4.10 step 7): clear the
    /// initial-mark flag (the STW portion of that phase is over; concurrent
    /// marking proper continues outside any pause) and record what kind of
    /// pause just completed for the next pause's decision.
    pub fn epilogue(&self, kind: PauseKind) {
        self.set_during_initial_mark_pause(false);
        if kind.is_initial_mark() {
            self.set_in_marking_window_im(false);
            self.set_during_marking(true);
        }
        self.set_last_gc_was_young(!kind.is_mixed());
        self.set_gcs_are_young(!kind.is_mixed());
        self.set_initiate_conc_mark_if_possible(false);
    }

    /// Called once the concurrent-mark cycle's cleanup phase finishes
    /// (outside any pause): marking is no longer in progress.
    pub fn conclude_marking_cycle(&self) {
        self.set_mark_in_progress(false);
        self.set_during_marking(false);
        self.set_in_marking_window(false);
        self.set_in_marking_window_im(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_mark_takes_priority_over_mixed() {
        let state = CollectorState::new();
        state.set_initiate_conc_mark_if_possible(true);
        assert_eq!(state.decide_pause_kind(true), PauseKind::InitialMark);
    }

    #[test]
    fn mixed_requires_gcs_are_young_false() {
        let state = CollectorState::new();
        state.set_gcs_are_young(false);
        assert_eq!(state.decide_pause_kind(true), PauseKind::Mixed);
        assert_eq!(state.decide_pause_kind(false), PauseKind::Young);
    }

    #[test]
    fn prologue_epilogue_roundtrip_initial_mark() {
        let state = CollectorState::new();
        state.prologue(PauseKind::InitialMark);
        assert!(state.during_initial_mark_pause());
        assert!(state.mark_in_progress());
        assert!(state.during_concurrent_mark());
        state.epilogue(PauseKind::InitialMark);
        assert!(!state.during_initial_mark_pause());
        assert!(state.during_marking());
        assert!(!state.during_concurrent_mark());
    }

    #[test]
    fn conclude_marking_cycle_resets_window_flags() {
        let state = CollectorState::new();
        state.prologue(PauseKind::InitialMark);
        state.epilogue(PauseKind::InitialMark);
        state.conclude_marking_cycle();
        assert!(!state.mark_in_progress());
        assert!(!state.in_marking_window());
    }
}
