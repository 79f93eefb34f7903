//! Incremental collection-set construction and pause-time-budgeted finalize
//! (component C7). Grounded on `plan/g1/collection.rs`'s young/mixed-pause
//! split and `plan/generational/global.rs`'s nursery-full-vs-whole-heap
//! decision idiom, restructured into an explicit build/finalize API per the
//! design notes' call for an explicit state machine over the teacher's
//! declarative phase-table DSL.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

/// A young region's predicted cost, sampled from the policy's model at the
/// time it joined the incremental CSet.
#[derive(Debug, Clone, Copy)]
pub struct RegionPrediction {
    pub region_index: usize,
    pub predicted_rs_length: usize,
    pub predicted_elapsed_ms: f64,
}

/// An old-gen mixed-collection candidate, ordered by reclaimable bytes so the
/// `CSetChooser` priority queue pops the most profitable region first.
#[derive(Debug, Clone, Copy)]
pub struct CSetCandidate {
    pub region_index: usize,
    pub reclaimable_bytes: usize,
    pub predicted_elapsed_ms: f64,
}

impl PartialEq for CSetCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.region_index == other.region_index
    }
}
impl Eq for CSetCandidate {}

impl PartialOrd for CSetCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CSetCandidate {
    /// Primary key: more reclaimable bytes sorts greater (pops first from the
    /// max-heap). Tie-break: of two regions with equal reclaim, the one with
    /// smaller predicted cost sorts greater, so it is preferred.
    fn cmp(&self, other: &Self) -> Ordering {
        self.reclaimable_bytes
            .cmp(&other.reclaimable_bytes)
            .then_with(|| other.predicted_elapsed_ms.total_cmp(&self.predicted_elapsed_ms))
    }
}

/// Incremental young-generation CSet plus the old-gen `CSetChooser` priority
/// queue, built across the mutator phase and finalized at the start of each
/// pause under a soft time budget.
pub struct CollectionSet {
    young: Vec<RegionPrediction>,
    eden_count: usize,
    pending_survivors: Vec<RegionPrediction>,
    rs_length_diffs: Mutex<Vec<(usize, i64)>>,
    time_diffs: Mutex<Vec<(usize, f64)>>,

    chooser: BinaryHeap<CSetCandidate>,
    old: Vec<usize>,

    base_time_prediction_ms: f64,
    young_prediction_ms: f64,
}

impl Default for CollectionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionSet {
    pub fn new() -> Self {
        CollectionSet {
            young: Vec::new(),
            eden_count: 0,
            pending_survivors: Vec::new(),
            rs_length_diffs: Mutex::new(Vec::new()),
            time_diffs: Mutex::new(Vec::new()),
            chooser: BinaryHeap::new(),
            old: Vec::new(),
            base_time_prediction_ms: 0.0,
            young_prediction_ms: 0.0,
        }
    }

    /// A mutator region just turned into eden: append it to the incremental
    /// young CSet.
    pub fn add_eden_region(&mut self, region_index: usize, predicted_rs_length: usize, predicted_elapsed_ms: f64) {
        self.young.push(RegionPrediction {
            region_index,
            predicted_rs_length,
            predicted_elapsed_ms,
        });
        self.eden_count += 1;
    }

    /// A survivor from the last pause, queued for the next pause's prologue
    /// (appended to the right end of the young list at `finalize_young_part`,
    /// not here, since survivors are only known once the previous pause ends).
    pub fn add_survivor_region(&mut self, region_index: usize, predicted_rs_length: usize, predicted_elapsed_ms: f64) {
        self.pending_survivors.push(RegionPrediction {
            region_index,
            predicted_rs_length,
            predicted_elapsed_ms,
        });
    }

    /// Concurrent refinement's sample of a region's rset growth, deposited
    /// without touching `young` so refinement workers never contend with the
    /// mutator thread appending new eden regions.
    pub fn record_rs_length_diff(&self, region_index: usize, delta: i64) {
        self.rs_length_diffs.lock().unwrap().push((region_index, delta));
    }

    pub fn record_time_diff(&self, region_index: usize, delta_ms: f64) {
        self.time_diffs.lock().unwrap().push((region_index, delta_ms));
    }

    /// Fold all diffs accumulated since the last finalize into `young`'s
    /// per-region predictions. Called once, under the heap lock, before a
    /// pause's prologue reads predictions.
    pub fn finalize_incremental_building(&mut self) {
        for (region_index, delta) in self.rs_length_diffs.lock().unwrap().drain(..) {
            if let Some(entry) = self.young.iter_mut().find(|r| r.region_index == region_index) {
                entry.predicted_rs_length = entry.predicted_rs_length.saturating_add_signed(delta as isize);
            }
        }
        for (region_index, delta) in self.time_diffs.lock().unwrap().drain(..) {
            if let Some(entry) = self.young.iter_mut().find(|r| r.region_index == region_index) {
                entry.predicted_elapsed_ms = (entry.predicted_elapsed_ms + delta).max(0.0);
            }
        }
    }

    /// Fold diffs, append pending survivors (tagged as eden for CSet
    /// purposes), and compute how much of `target_pause_ms` remains for the
    /// old-gen part. `base_time_prediction_ms` is the policy's estimate of
    /// fixed per-pause overhead plus pending-card-scan cost.
    pub fn finalize_young_part(&mut self, target_pause_ms: f64, base_time_prediction_ms: f64) -> f64 {
        self.finalize_incremental_building();
        self.young.append(&mut self.pending_survivors);

        self.base_time_prediction_ms = base_time_prediction_ms;
        self.young_prediction_ms = self.young.iter().map(|r| r.predicted_elapsed_ms).sum();

        (target_pause_ms - base_time_prediction_ms - self.young_prediction_ms).max(0.0)
    }

    /// Register an old region as a mixed-collection candidate, e.g. when
    /// cleanup finds it has non-trivial garbage.
    pub fn add_old_candidate(&mut self, candidate: CSetCandidate) {
        self.chooser.push(candidate);
    }

    pub fn chooser_len(&self) -> usize {
        self.chooser.len()
    }

    /// Drain old-gen candidates from the chooser until any of the stopping
    /// rules fires. `region_size_bytes` sizes the reclaimable-percentage
    /// check; `target_pause_ms` bounds the absolute worst case regardless of
    /// `min_old_cset_length`.
    pub fn finalize_old_part(
        &mut self,
        mixed_mode: bool,
        mut time_remaining_ms: f64,
        region_size_bytes: usize,
        waste_threshold_pct: u8,
        max_old_cset_length: usize,
        min_old_cset_length: usize,
        target_pause_ms: f64,
    ) {
        self.old.clear();
        if !mixed_mode {
            return;
        }

        let mut predicted_total_ms = self.base_time_prediction_ms + self.young_prediction_ms;
        while let Some(candidate) = self.chooser.peek().copied() {
            if self.old.len() >= max_old_cset_length {
                break;
            }
            let reclaimable_pct = (candidate.reclaimable_bytes as f64 / region_size_bytes as f64) * 100.0;
            if reclaimable_pct < waste_threshold_pct as f64 {
                break;
            }
            let tentative_total_ms = predicted_total_ms + candidate.predicted_elapsed_ms;
            if tentative_total_ms > 2.0 * target_pause_ms {
                log::debug!(
                    "stopping old CSet build: region {} would push predicted pause to {:.2}ms (budget {:.2}ms)",
                    candidate.region_index,
                    tentative_total_ms,
                    2.0 * target_pause_ms
                );
                break;
            }
            if time_remaining_ms <= 0.0 && self.old.len() >= min_old_cset_length {
                break;
            }

            self.chooser.pop();
            self.old.push(candidate.region_index);
            predicted_total_ms = tentative_total_ms;
            time_remaining_ms -= candidate.predicted_elapsed_ms;
        }
    }

    pub fn young_region_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.young.iter().map(|r| r.region_index)
    }

    pub fn eden_count(&self) -> usize {
        self.eden_count
    }

    pub fn survivor_count(&self) -> usize {
        self.young.len() - self.eden_count
    }

    pub fn old_region_indices(&self) -> &[usize] {
        &self.old
    }

    pub fn all_region_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.young_region_indices().chain(self.old.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.young.len() + self.old.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset after a pause has evacuated this CSet. The chooser is untouched:
    /// regions not selected stay queued for the next mixed pause.
    pub fn clear(&mut self) {
        self.young.clear();
        self.eden_count = 0;
        self.old.clear();
        self.base_time_prediction_ms = 0.0;
        self.young_prediction_ms = 0.0;
    }
}
