//! Pause-time prediction and young-generation sizing policy (component C8).
//! Grounded on `plan/g1/predictor.rs`'s `PauseTimePredictor` (EWMA-updated
//! `v_fixed`/`u`/`s`/`c` cost-model coefficients and a `within_budget` check
//! fed a per-region accumulator) and `plan/g1/g1.rs`'s IHOP/young-list-target
//! fields, generalized from the teacher's `PLAN`-singleton-reading style into
//! an explicit struct methods take `&self`/`&mut self` on.

use crate::util::options::Options;

/// Exponential-weighted-average smoothing factor applied to every sample
/// this policy folds in. Matches the teacher's "mix toward the larger of the
/// old and new value" idiom for the cost coefficients, but for the IHOP
/// alloc-rate/marking-length samples a plain two-sample average reads more
/// naturally (there is no "only grows" assumption for those).
const EWMA_WEIGHT: f64 = 0.5;

/// Per-region cost-model coefficients and constant overheads, each updated
/// by an EWMA over completed pauses. Named after `spec.md` §4.8's
/// `predict_region_elapsed_time_ms`/`predict_base_elapsed_time_ms` formulas:
/// `copy_bytes_pred(r) * copy_rate + rs_length_pred(r) * card_rate + other`.
pub struct Predictor {
    copy_rate_ms_per_byte: f64,
    card_rate_ms_per_card: f64,
    constant_overhead_ms: f64,
    pending_card_rate_ms_per_card: f64,
    young_other_per_region_ms: f64,
    non_young_other_per_region_ms: f64,
    /// Survivor rate per age bucket (index = age, clamped to the last entry
    /// beyond this length), used by the young-list sizer to predict how
    /// many bytes of each eden region will still be live (and thus need
    /// copying) next pause.
    survivor_rate_per_age: Vec<f64>,
}

impl Default for Predictor {
    fn default() -> Self {
        Predictor {
            copy_rate_ms_per_byte: 0.000_01,
            card_rate_ms_per_card: 0.001,
            constant_overhead_ms: 1.0,
            pending_card_rate_ms_per_card: 0.001,
            young_other_per_region_ms: 0.05,
            non_young_other_per_region_ms: 0.1,
            survivor_rate_per_age: vec![0.5; 16],
        }
    }
}

impl Predictor {
    pub fn new() -> Self {
        Self::default()
    }

    fn ewma(old: f64, sample: f64) -> f64 {
        if old == 0.0 {
            sample
        } else {
            old * (1.0 - EWMA_WEIGHT) + sample * EWMA_WEIGHT
        }
    }

    /// Fold in one completed pause's observed cost-model inputs: total bytes
    /// copied, total rset cards scanned, and the pause's wall-clock
    /// duration, split by how many of those bytes/cards belonged to a young
    /// (eden/survivor) region versus an old region. `fixed_overhead_ms` is
    /// the portion of the pause attributable to constant per-pause work
    /// (safepoint sync, CSet bookkeeping) rather than any region's copy/scan.
    #[allow(clippy::too_many_arguments)]
    pub fn record_pause(
        &mut self,
        young_regions: usize,
        old_regions: usize,
        bytes_copied: usize,
        cards_scanned: usize,
        fixed_overhead_ms: f64,
        region_copy_scan_ms: f64,
    ) {
        self.constant_overhead_ms = Self::ewma(self.constant_overhead_ms, fixed_overhead_ms);
        if bytes_copied > 0 && region_copy_scan_ms > 0.0 {
            let implied_rate = region_copy_scan_ms / bytes_copied as f64;
            self.copy_rate_ms_per_byte = Self::ewma(self.copy_rate_ms_per_byte, implied_rate);
        }
        if cards_scanned > 0 && region_copy_scan_ms > 0.0 {
            let implied_rate = region_copy_scan_ms / cards_scanned as f64;
            self.card_rate_ms_per_card = Self::ewma(self.card_rate_ms_per_card, implied_rate);
        }
        if young_regions > 0 {
            let implied = fixed_overhead_ms / young_regions as f64;
            self.young_other_per_region_ms = Self::ewma(self.young_other_per_region_ms, implied);
        }
        if old_regions > 0 {
            let implied = fixed_overhead_ms / old_regions as f64;
            self.non_young_other_per_region_ms = Self::ewma(self.non_young_other_per_region_ms, implied);
        }
    }

    pub fn record_survivor_rate(&mut self, age: u32, rate: f64) {
        let idx = (age as usize).min(self.survivor_rate_per_age.len() - 1);
        self.survivor_rate_per_age[idx] = Self::ewma(self.survivor_rate_per_age[idx], rate.clamp(0.0, 1.0));
    }

    pub fn survivor_rate(&self, age: u32) -> f64 {
        let idx = (age as usize).min(self.survivor_rate_per_age.len() - 1);
        self.survivor_rate_per_age[idx]
    }

    /// `spec.md` §4.8: `predict_region_elapsed_time_ms(r, for_young_gc)`.
    pub fn predict_region_elapsed_time_ms(&self, live_bytes: usize, rs_length: usize, for_young_gc: bool) -> f64 {
        let copy = live_bytes as f64 * self.copy_rate_ms_per_byte;
        let scan = rs_length as f64 * self.card_rate_ms_per_card;
        let other = if for_young_gc {
            self.young_other_per_region_ms
        } else {
            self.non_young_other_per_region_ms
        };
        copy + scan + other
    }

    /// `spec.md` §4.8: `predict_base_elapsed_time_ms(pending_cards)`.
    pub fn predict_base_elapsed_time_ms(&self, pending_cards: usize) -> f64 {
        self.constant_overhead_ms + pending_cards as f64 * self.pending_card_rate_ms_per_card
    }
}

/// One eden region's predicted cost, used by the young-list length sizer.
/// Distinct from `collect::RegionPrediction`: this is the sizer's *input*
/// (what the policy predicts a candidate region would cost if added),
/// whereas `collect::RegionPrediction` is what the CSet records once a
/// region has actually been added.
#[derive(Debug, Clone, Copy)]
pub struct CandidateRegionCost {
    pub rs_length: usize,
    pub live_bytes: usize,
}

/// Binary-search the largest young-list length (eden + survivor regions)
/// whose predicted total pause time fits within `target_pause_ms`, bounded
/// by `[min_young_length, max_young_length]`. `candidates` is ordered the
/// way the incremental CSet would admit them (oldest-appended first);
/// `base_ms` is the fixed per-pause overhead already known for this pause
/// (e.g. from `predict_base_elapsed_time_ms`).
pub fn young_list_target_length(
    predictor: &Predictor,
    candidates: &[CandidateRegionCost],
    base_ms: f64,
    target_pause_ms: f64,
    min_young_length: usize,
    max_young_length: Option<usize>,
) -> usize {
    let upper_bound = max_young_length.unwrap_or(candidates.len()).min(candidates.len());
    if upper_bound == 0 {
        return min_young_length.min(candidates.len());
    }

    let predicted_total_for = |n: usize| -> f64 {
        let sum: f64 = candidates[..n]
            .iter()
            .map(|c| predictor.predict_region_elapsed_time_ms(c.live_bytes, c.rs_length, true))
            .sum();
        base_ms + sum
    };

    // Monotonic in `n` (each region only adds cost), so a plain linear scan
    // from the top down to the first length that fits is both correct and
    // simple; the spec permits either a closed form or binary search and a
    // bounded scan here never examines more than `upper_bound` candidates.
    let mut best = min_young_length.min(upper_bound);
    for n in (min_young_length.min(upper_bound)..=upper_bound).rev() {
        if predicted_total_for(n) <= target_pause_ms {
            best = n;
            break;
        }
    }
    best.max(min_young_length.min(candidates.len()))
}

/// One (marking-duration, allocation-rate, bytes-allocated-in-period) sample
/// the adaptive IHOP predictor folds in at the end of a concurrent cycle.
#[derive(Debug, Clone, Copy)]
pub struct IhopSample {
    pub marking_duration_ms: f64,
    pub alloc_rate_bytes_per_ms: f64,
}

/// Initiating-heap-occupancy-percent state (component C8's IHOP). Either a
/// fixed percentage of the heap (`adaptive == false`) or a threshold derived
/// from the predicted marking duration and the predicted time until the
/// heap fills, minus a safety buffer.
pub struct Ihop {
    adaptive: bool,
    static_percent: u8,
    safety_buffer_ms: f64,
    last_marking_duration_ms: f64,
    last_alloc_rate_bytes_per_ms: f64,
}

impl Ihop {
    pub fn new(options: &Options) -> Self {
        Ihop {
            adaptive: *options.adaptive_ihop,
            static_percent: *options.ihop_percent,
            safety_buffer_ms: 500.0,
            last_marking_duration_ms: 0.0,
            last_alloc_rate_bytes_per_ms: 0.0,
        }
    }

    pub fn record_sample(&mut self, sample: IhopSample) {
        self.last_marking_duration_ms = if self.last_marking_duration_ms == 0.0 {
            sample.marking_duration_ms
        } else {
            self.last_marking_duration_ms * 0.5 + sample.marking_duration_ms * 0.5
        };
        self.last_alloc_rate_bytes_per_ms = if self.last_alloc_rate_bytes_per_ms == 0.0 {
            sample.alloc_rate_bytes_per_ms
        } else {
            self.last_alloc_rate_bytes_per_ms * 0.5 + sample.alloc_rate_bytes_per_ms * 0.5
        };
    }

    /// The occupancy (bytes) at or above which a concurrent cycle should be
    /// requested, given the heap's current capacity in bytes.
    pub fn threshold_bytes(&self, heap_capacity_bytes: usize) -> usize {
        if !self.adaptive || self.last_alloc_rate_bytes_per_ms <= 0.0 {
            return heap_capacity_bytes * self.static_percent as usize / 100;
        }
        // Bytes the mutator can allocate while a cycle of the last-observed
        // duration (plus a safety buffer) runs concurrently: that much
        // headroom must remain when the cycle starts, so the threshold is
        // capacity minus that headroom.
        let time_needed_ms = self.last_marking_duration_ms + self.safety_buffer_ms;
        let headroom_bytes = (time_needed_ms * self.last_alloc_rate_bytes_per_ms) as usize;
        heap_capacity_bytes.saturating_sub(headroom_bytes)
    }

    pub fn should_start_cycle(&self, used_bytes: usize, heap_capacity_bytes: usize) -> bool {
        used_bytes >= self.threshold_bytes(heap_capacity_bytes)
    }
}
