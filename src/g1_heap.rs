//! The top-level `G1Heap` type: wires components C1-C10 together behind the
//! public `alloc`/`request_gc`/`heap_summary` API. Grounded on
//! `plan/g1/g1.rs`'s `G1`/`G1Unsync` struct (the legacy G1 plan's top-level
//! owned-state struct) and `mmtk.rs`'s modern top-level instance struct,
//! collapsed into one explicit owned struct per the design notes' call to
//! replace the singleton heap handle with an embedder-owned value — there is
//! no `G1Heap::heap()` global accessor anywhere in this crate.

use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Instant;

use crate::collect::{CSetCandidate, CollectionSet, EvacFailureRecovery, PreservedMark, PreservedMarksSet};
use crate::driver::{CollectorState, PauseKind};
use crate::heap::{RegionSets, RegionTable};
use crate::mark::ConcurrentMark;
use crate::policy::{young_list_target_length, CandidateRegionCost, Ihop, IhopSample, Predictor};
use crate::region::{AllocRegionManager, CSetClass, CSetFastTest, CopyDestination, RegionKind};
use crate::util::address::{Address, ObjectReference};
use crate::util::options::Options;
use crate::util::statistics::{Counters, CountersSnapshot, HeapSummary, NullTracer, Tracer};
use crate::vm::Binding;

/// Survivor regions older than this are tenured into Old on their next
/// pause rather than copied to another Survivor region. Matches the
/// `survivor_rate_per_age` table's length in `policy::Predictor`.
const MAX_SURVIVOR_AGE: u32 = 15;

/// An arbitrary but fixed base address for the heap's reserved range. This
/// crate never calls into a real `mmap` (see DESIGN.md's Open Question
/// decision), so the only requirement on this constant is that region
/// arithmetic over `[heap_base, heap_base + max_heap_bytes)` doesn't
/// overflow a `usize`.
const HEAP_BASE: usize = 0x1_0000_0000;

/// Everything `G1Heap` guards behind its heap lock: every component whose
/// mutation must be serialized with region install/CSet finalize/heap
/// expand-or-shrink, per `spec.md` §5's `Heap_lock` contract.
struct HeapInner {
    table: RegionTable,
    sets: RegionSets,
    alloc_mgr: AllocRegionManager,
    cset: CollectionSet,
    mark: ConcurrentMark,
    evac_failure: EvacFailureRecovery,
}

/// One completed pause's summary, handed back to the embedder and mirrored
/// to the tracer. Named fields match `spec.md` §6's tracing-event list.
#[derive(Debug, Clone, Copy)]
pub struct PauseReport {
    pub kind_was_mixed: bool,
    pub kind_was_initial_mark: bool,
    pub cset_region_count: usize,
    pub bytes_used_before: usize,
    pub bytes_copied: usize,
    pub regions_freed: usize,
    pub evacuation_failures: usize,
    pub duration_millis: f64,
}

/// The collector core: owns the heap's address-to-region mapping, every
/// free/old/humongous region set, the PLAB allocator, the incremental and
/// finalized collection sets, the concurrent marker, evacuation-failure
/// bookkeeping, the sizing policy, and the pause-kind state machine. An
/// embedder constructs one with a `Binding` implementation and calls
/// `alloc`/`request_gc` from its runtime.
pub struct G1Heap<B: Binding> {
    options: Options,
    binding: B,
    counters: Counters,
    state: CollectorState,
    cset_fast_test: CSetFastTest,
    predictor: Mutex<Predictor>,
    ihop: Mutex<Ihop>,
    /// `(bytes_allocated, timestamp)` as of the last IHOP sample, so
    /// `decide_next_cycle` can measure the real mutator allocation rate
    /// between concurrent cycles instead of hardcoding one.
    last_ihop_sample: Mutex<(u64, Instant)>,
    tracer: Box<dyn Tracer>,
    inner: Mutex<HeapInner>,
}

impl<B: Binding> G1Heap<B> {
    /// Construct a heap with `options.initial_heap_bytes` committed up
    /// front (per `spec.md` §4.1's `RegionTable::expand`) and
    /// `options.max_heap_bytes` reserved for later growth. Uses the default
    /// no-op tracer; see `with_tracer` to supply a real one.
    pub fn new(options: Options, binding: B) -> Self {
        Self::with_tracer(options, binding, Box::new(NullTracer))
    }

    pub fn with_tracer(options: Options, binding: B, tracer: Box<dyn Tracer>) -> Self {
        crate::util::logger::try_init();
        let region_size_bytes = *options.region_size_bytes;
        let max_regions = (*options.max_heap_bytes).div_ceil(region_size_bytes).max(1);
        let initial_regions = (*options.initial_heap_bytes).div_ceil(region_size_bytes).min(max_regions);
        let num_workers = options.resolved_parallel_workers();

        let mut table = RegionTable::reserve(Address::from_usize(HEAP_BASE), region_size_bytes, max_regions);
        let mut sets = RegionSets::new(region_size_bytes);
        for index in table.expand(initial_regions) {
            sets.free_list.add_ordered(index);
        }

        let ihop = Ihop::new(&options);
        let alloc_mgr = AllocRegionManager::new(region_size_bytes, *options.survivor_alignment_bytes);
        let mark = ConcurrentMark::new(num_workers);

        G1Heap {
            cset_fast_test: CSetFastTest::new(max_regions),
            options,
            binding,
            counters: Counters::new(),
            state: CollectorState::new(),
            predictor: Mutex::new(Predictor::new()),
            ihop: Mutex::new(ihop),
            last_ihop_sample: Mutex::new((0, Instant::now())),
            tracer,
            inner: Mutex::new(HeapInner {
                table,
                sets,
                alloc_mgr,
                cset: CollectionSet::new(),
                mark,
                evac_failure: EvacFailureRecovery::new(),
            }),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn binding(&self) -> &B {
        &self.binding
    }

    pub fn counters_snapshot(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    /// Component C3's mutator allocation path (`spec.md` §4.3): bump-alloc
    /// (or, for humongous requests, reserve a contiguous run). Returns
    /// `None` if the heap has no free regions left; the caller should call
    /// `request_gc` and retry, exactly as `spec.md` §7's `AllocationFailure`
    /// describes.
    pub fn alloc(&self, size_bytes: usize) -> Option<Address> {
        let mut inner = self.inner.lock().unwrap();
        let size_bytes = crate::util::conversions::align_allocation_no_fill(size_bytes);
        let is_humongous = size_bytes > inner.alloc_mgr.humongous_threshold_bytes();
        let eden_before = inner.alloc_mgr.current_eden_region();

        let result = inner.alloc_mgr.alloc_mutator(&mut inner.table, &mut inner.sets, size_bytes);
        if result.is_some() {
            self.counters.bytes_allocated.fetch_add(size_bytes as u64, Ordering::Relaxed);
        }

        if !is_humongous {
            if let Some(eden_after) = inner.alloc_mgr.current_eden_region() {
                if Some(eden_after) != eden_before {
                    // A fresh eden region was just installed: fold it into
                    // the incremental young CSet per `spec.md` §4.7.
                    let predictor = self.predictor.lock().unwrap();
                    let predicted = predictor.predict_region_elapsed_time_ms(0, 0, true);
                    inner.cset.add_eden_region(eden_after, 0, predicted);
                }
            }
        }
        result
    }

    /// Whether mixed collections are currently warranted: there is at least
    /// one old-gen candidate queued in the `CSetChooser` and the heap isn't
    /// still in its very first (all-young) phase.
    pub fn mixed_mode_active(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.cset.chooser_len() > 0 && !self.state.gcs_are_young()
    }

    /// Component C8's young-list-length sizing operation (`spec.md` §4.8),
    /// wired into a real decision: true once the incremental young CSet has
    /// grown to (or past) the predicted length that fits `max_pause_millis`,
    /// meaning the mutator should call `request_gc` before eden grows
    /// further rather than waiting for outright allocation failure. An
    /// embedder's allocation loop consults this after a successful `alloc`.
    pub fn should_request_young_gc(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        let young_indices: Vec<usize> = inner.cset.young_region_indices().collect();
        let current_length = young_indices.len();
        if current_length == 0 {
            return false;
        }
        // Project the budget over a pool of same-average-cost candidates
        // rather than just the regions already queued: `young_list_target_length`
        // answers "how many regions of this average cost fit the budget",
        // which must stay independent of how many happen to be queued so
        // far or it could never predict a target above the current length.
        // Card-table scanning is an external collaborator (spec.md §1), so
        // `rs_length` is left at 0 here exactly as `request_gc`'s own
        // `pending_cards` input is; `live_bytes` uses the average occupancy
        // of the regions queued so far as the copy-cost proxy.
        let avg_live_bytes: usize = young_indices.iter().map(|&idx| inner.table.at(idx).used()).sum::<usize>() / current_length;
        let pool_size = inner.table.committed_count().max(current_length);
        let candidates = vec![CandidateRegionCost { rs_length: 0, live_bytes: avg_live_bytes }; pool_size];

        let predictor = self.predictor.lock().unwrap();
        let base_ms = predictor.predict_base_elapsed_time_ms(0);
        let target_pause_ms = *self.options.max_pause_millis as f64;
        let min_young_length = *self.options.min_young_length;
        let max_young_length = (*self.options.max_young_length).0;
        let target_length = young_list_target_length(&predictor, &candidates, base_ms, target_pause_ms, min_young_length, max_young_length);
        current_length >= target_length
    }

    /// Run one STW pause (component C10's pause sequence, `spec.md` §4.10):
    /// finalize the CSet, evacuate it (tracing reachability from `roots`),
    /// recover any evacuation failures, then update policy/IHOP state for
    /// the next pause. `roots` stands in for the external stack/global-root
    /// scan `spec.md` §1 treats as out of scope.
    pub fn request_gc(&self, cause: &str, roots: &[ObjectReference]) -> PauseReport {
        self.state.set_cause(cause);
        let start = Instant::now();
        let mut inner = self.inner.lock().unwrap();

        let mixed_mode = inner.cset.chooser_len() > 0 && !self.state.gcs_are_young();
        let kind = self.state.decide_pause_kind(mixed_mode);
        self.state.prologue(kind);
        if self.tracer.is_enabled() {
            self.tracer.pause_start(pause_kind_label(kind));
        }

        inner.alloc_mgr.retire_mutator_region();
        // Regions concurrent cleanup queued onto the secondary free list
        // (and already counted in `regions_reclaimed` when cleanup ran) join
        // the main free list here, under the heap lock, per spec.md §4.2.
        inner.sets.fold_secondary_free_list();

        let bytes_used_before = region_used_total(&inner.table);

        let pending_cards = 0; // card-table scanning is an external collaborator (spec.md §1).
        let base_ms = {
            let predictor = self.predictor.lock().unwrap();
            predictor.predict_base_elapsed_time_ms(pending_cards)
        };
        let target_pause_ms = *self.options.max_pause_millis as f64;
        let time_remaining_ms = inner.cset.finalize_young_part(target_pause_ms, base_ms);
        inner.cset.finalize_old_part(
            kind.is_mixed(),
            time_remaining_ms,
            *self.options.region_size_bytes,
            *self.options.heap_waste_percent,
            *self.options.max_old_cset_length,
            *self.options.min_old_cset_length,
            target_pause_ms,
        );

        self.cset_fast_test.clear();
        for region in inner.table.iter_committed() {
            if region.kind().is_humongous() {
                self.cset_fast_test.set_humongous(region.index());
            }
        }
        let young_indices: Vec<usize> = inner.cset.young_region_indices().collect();
        let old_indices: Vec<usize> = inner.cset.old_region_indices().to_vec();
        for &idx in &young_indices {
            inner.table.at_mut(idx).set_in_collection_set(true);
            self.cset_fast_test.set_in_young(idx);
        }
        for &idx in &old_indices {
            inner.table.at_mut(idx).set_in_collection_set(true);
            self.cset_fast_test.set_in_old(idx);
        }
        let cset_region_count = young_indices.len() + old_indices.len();

        if kind.is_initial_mark() {
            if self.tracer.is_enabled() {
                self.tracer.concurrent_cycle_start();
            }
            inner.mark.initial_mark(&mut inner.table, roots);
        }

        let mut preserved = PreservedMarksSet::new(1);
        let bytes_copied = self.evacuate_cset(&mut inner, roots, &mut preserved);

        let failed_regions = inner.evac_failure.failed_region_indices();
        let evacuation_failures = failed_regions.len();
        if !failed_regions.is_empty() {
            let preserved_marks = preserved.drain_all();
            for region_idx in &failed_regions {
                inner.evac_failure.recover_region(
                    &mut inner.table,
                    &preserved_marks,
                    *region_idx,
                    kind.is_initial_mark(),
                    self.binding.object_model(),
                    self.binding.remembered_set(),
                );
                if self.tracer.is_enabled() {
                    self.tracer.evacuation_failure(*region_idx);
                }
            }
            self.counters.evacuation_failure_count.fetch_add(evacuation_failures as u64, Ordering::Relaxed);
        }
        inner.evac_failure.clear();

        let regions_freed = self.post_evacuation(&mut inner, &young_indices, &old_indices, &failed_regions);
        inner.alloc_mgr.retire_all_plabs();
        inner.alloc_mgr.resize_plabs();
        inner.alloc_mgr.reset_evac_stats();

        // Fold every Survivor region this pause's evacuation freshly
        // installed into the next pause's incremental young CSet, mirroring
        // how `alloc()` folds a fresh eden region (spec.md §4.7).
        let new_gc_regions = inner.alloc_mgr.drain_new_gc_regions();
        for (dest, region_index) in new_gc_regions {
            if dest == CopyDestination::Survivor {
                let predictor = self.predictor.lock().unwrap();
                let predicted = predictor.predict_region_elapsed_time_ms(0, 0, true);
                drop(predictor);
                inner.cset.add_survivor_region(region_index, 0, predicted);
            }
        }

        self.cset_fast_test.clear();
        for region in inner.table.iter_committed() {
            if region.kind().is_humongous() {
                self.cset_fast_test.set_humongous(region.index());
            }
        }
        inner.cset.clear();

        let duration_millis = start.elapsed().as_secs_f64() * 1000.0;
        {
            let mut predictor = self.predictor.lock().unwrap();
            predictor.record_pause(
                young_indices.len(),
                old_indices.len(),
                bytes_copied,
                0,
                base_ms,
                duration_millis - base_ms,
            );
        }

        self.decide_next_cycle(&inner, duration_millis, kind);
        self.state.epilogue(kind);

        match kind {
            PauseKind::Mixed => self.counters.mixed_pause_count.fetch_add(1, Ordering::Relaxed),
            _ => self.counters.young_pause_count.fetch_add(1, Ordering::Relaxed),
        };
        self.counters.bytes_copied.fetch_add(bytes_copied as u64, Ordering::Relaxed);

        if self.tracer.is_enabled() {
            self.tracer.pause_end(pause_kind_label(kind), duration_millis);
        }

        PauseReport {
            kind_was_mixed: kind.is_mixed(),
            kind_was_initial_mark: kind.is_initial_mark(),
            cset_region_count,
            bytes_used_before,
            bytes_copied,
            regions_freed,
            evacuation_failures,
            duration_millis,
        }
    }

    /// Component C10 step 3: evacuate the CSet by tracing from `roots`.
    /// Returns total bytes copied. Objects outside any CSet region are
    /// scanned (to keep following the live graph into CSet regions) but not
    /// moved.
    fn evacuate_cset(&self, inner: &mut HeapInner, roots: &[ObjectReference], preserved: &mut PreservedMarksSet) -> usize {
        let worker_id = 0;
        let mut bytes_copied = 0usize;
        let mut worklist: Vec<ObjectReference> = roots.to_vec();
        let mut seen = std::collections::HashSet::new();

        while let Some(obj) = worklist.pop() {
            let addr = obj.to_raw_address();
            if !seen.insert(addr) {
                continue;
            }
            let region_idx = match inner.table.region_index_for(addr) {
                Some(idx) => idx,
                None => continue,
            };
            if self.cset_fast_test.at(region_idx) == CSetClass::NotInCSet {
                self.binding.object_model().scan_object(obj, &mut |referent| worklist.push(referent));
                continue;
            }

            let source_kind = inner.table.at(region_idx).kind();
            let source_age = inner.table.at(region_idx).age();
            let dest = if source_kind == RegionKind::Old || source_age + 1 > MAX_SURVIVOR_AGE {
                CopyDestination::Old
            } else {
                CopyDestination::Survivor
            };
            let dest_age = source_age.saturating_add(1);
            let size = self.binding.object_model().object_size(obj);

            match self.try_evacuate_object(inner, worker_id, dest, dest_age, obj, size, preserved) {
                Some(new_addr) => {
                    bytes_copied += size;
                    if let Some(new_obj) = ObjectReference::from_raw_address(new_addr) {
                        self.binding.object_model().scan_object(new_obj, &mut |referent| worklist.push(referent));
                    }
                }
                None => {
                    self.binding.object_model().scan_object(obj, &mut |referent| worklist.push(referent));
                }
            }
        }
        bytes_copied
    }

    /// Component C3's PLAB-allocate-or-direct-allocate protocol plus C9's
    /// self-forward-on-failure fallback for a single object.
    fn try_evacuate_object(
        &self,
        inner: &mut HeapInner,
        worker_id: usize,
        dest: CopyDestination,
        dest_age: u32,
        obj: ObjectReference,
        size: usize,
        preserved: &mut PreservedMarksSet,
    ) -> Option<Address> {
        let addr = obj.to_raw_address();
        if let Some(existing) = inner.evac_failure.forwarding().forwarding_pointer(addr) {
            return if existing == addr { None } else { Some(existing) };
        }

        let mut dst = inner.alloc_mgr.plab_allocate(worker_id, dest, size);
        if dst.is_none() {
            dst = inner
                .alloc_mgr
                .allocate_direct_or_new_plab(&mut inner.table, &mut inner.sets, worker_id, dest, size, dest_age);
        }

        match dst {
            Some(dst_addr) => match inner.evac_failure.forwarding().attempt_to_forward(addr, dst_addr) {
                Ok(()) => {
                    self.binding.object_model().copy_object(obj, dst_addr);
                    Some(dst_addr)
                }
                Err(existing) => {
                    inner.alloc_mgr.undo_allocation(worker_id, dest, size);
                    if existing == addr {
                        None
                    } else {
                        Some(existing)
                    }
                }
            },
            None => {
                let region_idx = inner
                    .table
                    .region_index_for(addr)
                    .expect("evacuated object must belong to a committed region");
                let mark_word = self.binding.object_model().mark_word(obj);
                preserved.push(worker_id, PreservedMark { object: addr, mark_word });
                inner.evac_failure.record_failure(&inner.table, region_idx, addr, size);
                None
            }
        }
    }

    /// Component C10 step 5: bump survivor ages, free successfully
    /// evacuated regions back to the free list (or the old set, for
    /// promoted survivors), leave failed regions in Old. Returns the count
    /// of regions freed.
    fn post_evacuation(
        &self,
        inner: &mut HeapInner,
        young_indices: &[usize],
        old_indices: &[usize],
        failed_regions: &[usize],
    ) -> usize {
        let mut freed = 0;
        for &idx in young_indices {
            inner.table.at_mut(idx).set_in_collection_set(false);
            if failed_regions.contains(&idx) {
                inner.table.at_mut(idx).set_kind(RegionKind::Old);
                inner.sets.old_set.add_ordered(idx);
                continue;
            }
            let age = inner.table.at(idx).age();
            if self.tracer.is_enabled() {
                let predictor = self.predictor.lock().unwrap();
                let rate = predictor.survivor_rate(age);
                drop(predictor);
                let mut p = self.predictor.lock().unwrap();
                p.record_survivor_rate(age, rate);
            }
            inner.table.at_mut(idx).reset_to_free();
            inner.sets.free_list.add_ordered(idx);
            freed += 1;
        }
        for &idx in old_indices {
            inner.table.at_mut(idx).set_in_collection_set(false);
            if failed_regions.contains(&idx) {
                inner.sets.old_set.add_ordered(idx);
                continue;
            }
            inner.table.at_mut(idx).reset_to_free();
            inner.sets.free_list.add_ordered(idx);
            inner.sets.old_set.remove(idx);
            freed += 1;
        }
        freed
    }

    /// Component C10 step 6: decide whether to request a concurrent cycle
    /// next and update IHOP state. Runs the marking cycle's remaining
    /// phases synchronously (remark/cleanup) when this pause was an
    /// initial-mark pause, since this crate models concurrent mark as a
    /// cooperative procedure an embedder drives, not a spawned thread (see
    /// DESIGN.md).
    fn decide_next_cycle(&self, inner: &HeapInner, duration_millis: f64, kind: PauseKind) {
        let used = region_used_total(&inner.table);
        let capacity = inner.table.committed_count() * *self.options.region_size_bytes;
        let mut ihop = self.ihop.lock().unwrap();
        if kind.is_initial_mark() {
            let now = Instant::now();
            let mut last_sample = self.last_ihop_sample.lock().unwrap();
            let (last_bytes, last_instant) = *last_sample;
            let current_bytes = self.counters.bytes_allocated.load(Ordering::Relaxed);
            let elapsed_ms = now.duration_since(last_instant).as_secs_f64() * 1000.0;
            let alloc_rate_bytes_per_ms = if elapsed_ms > 0.0 {
                current_bytes.saturating_sub(last_bytes) as f64 / elapsed_ms
            } else {
                0.0
            };
            *last_sample = (current_bytes, now);
            drop(last_sample);
            ihop.record_sample(IhopSample {
                marking_duration_ms: duration_millis,
                alloc_rate_bytes_per_ms,
            });
        }
        if ihop.should_start_cycle(used, capacity) && !self.state.mark_in_progress() {
            self.state.set_initiate_conc_mark_if_possible(true);
        }
    }

    /// Drive one worker's share of the concurrent-mark task (`spec.md` §4.6
    /// step 2): claim regions off the shared finger, drain local/global
    /// queues and work-steal from peers, cooperating on the SATB sink, until
    /// nothing is left or the cycle aborts. An embedder spawns
    /// `options.parallel_workers` threads, each calling this once per
    /// `worker_id` after an initial-mark pause returns and before calling
    /// `finish_marking_cycle`. Takes the heap lock for its whole run: this
    /// crate models concurrent mark as a cooperative procedure rather than a
    /// spawned thread with its own lock-free access to `RegionTable` (see
    /// DESIGN.md); embedders that need true lock-free concurrency with the
    /// mutator should shard this call into bounded slices.
    pub fn run_concurrent_mark_worker(&self, worker_id: usize) {
        let inner = self.inner.lock().unwrap();
        let model = self.binding.object_model();
        let satb = self.binding.satb_sink();
        inner.mark.run_task(worker_id, &inner.table, model, satb, &self.counters);
    }

    /// An external full collection (out of scope per `spec.md` §1; this
    /// crate has no whole-heap compactor) is about to run: abort any
    /// in-progress concurrent mark cycle so its workers exit at their next
    /// regular clock tick instead of racing the compaction, per `spec.md`
    /// §4.6 "Abort" and §8 scenario 6. The next initial-mark pause starts a
    /// fresh cycle with both bitmaps cleared, since `ConcurrentMark::abort`
    /// only sets a flag `initial_mark` already clears on entry.
    pub fn abort_concurrent_mark_for_full_collection(&self) {
        let inner = self.inner.lock().unwrap();
        self.state.set_full_collection(true);
        inner.mark.abort();
        self.state.conclude_marking_cycle();
        self.state.set_full_collection(false);
        self.counters.full_pause_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Run concurrent mark's remark + cleanup phases to completion. An
    /// embedder calls this once its concurrent worker threads (driven via
    /// `run_concurrent_mark_worker`, started after an initial-mark pause
    /// returns) have drained; this method itself runs the STW remark and
    /// cleanup synchronously, then queues every old region cleanup found
    /// still alive as a mixed-collection candidate (`spec.md` §4.7).
    pub fn finish_marking_cycle(&self) {
        let mut inner = self.inner.lock().unwrap();
        let model = self.binding.object_model();
        let satb = self.binding.satb_sink();
        inner.mark.remark(&inner.table, model, satb, |_| {});
        let surviving_old = inner.mark.cleanup(&mut inner.table, &mut inner.sets, model, &self.counters, self.tracer.as_ref());

        let region_size_bytes = *self.options.region_size_bytes;
        let remembered_set = self.binding.remembered_set();
        let predictor = self.predictor.lock().unwrap();
        for (region_index, marked_bytes) in surviving_old {
            let mut rs_length = 0usize;
            remembered_set.scan_cards(region_index, &mut |_card| rs_length += 1);
            let candidate = candidate_from_region(region_index, region_size_bytes, marked_bytes, &predictor, rs_length);
            inner.cset.add_old_candidate(candidate);
        }
        drop(predictor);

        self.state.conclude_marking_cycle();
    }

    /// A read-only snapshot of per-generation committed/used bytes and
    /// region counts, independent of any `Tracer` (SPEC_FULL §9.2).
    pub fn heap_summary(&self) -> HeapSummary {
        let inner = self.inner.lock().unwrap();
        let region_size_bytes = *self.options.region_size_bytes;
        let mut summary = HeapSummary::default();
        for region in inner.table.iter_committed() {
            summary.committed_bytes += region_size_bytes;
            summary.used_bytes += region.used();
            match region.kind() {
                RegionKind::Eden => summary.eden_regions += 1,
                RegionKind::Survivor => summary.survivor_regions += 1,
                RegionKind::Old => summary.old_regions += 1,
                RegionKind::StartsHumongous | RegionKind::ContinuesHumongous => summary.humongous_regions += 1,
                RegionKind::Free => summary.free_regions += 1,
                RegionKind::Archive => {}
            }
        }
        summary
    }

    pub fn used_bytes(&self) -> usize {
        region_used_total(&self.inner.lock().unwrap().table)
    }

    #[cfg(feature = "archive_regions")]
    pub fn map_archive_regions(&self, ranges: &[(Address, Address)]) -> Result<(), ArchiveMapError> {
        let mut inner = self.inner.lock().unwrap();
        let region_size_bytes = *self.options.region_size_bytes;
        for &(start, end) in ranges {
            if !start.is_aligned_to(region_size_bytes) || !end.is_aligned_to(region_size_bytes) {
                return Err(ArchiveMapError::Misaligned);
            }
            let mut cursor = start;
            while cursor < end {
                let idx = inner
                    .table
                    .region_index_for(cursor)
                    .ok_or(ArchiveMapError::OutOfRange)?;
                inner.table.at_mut(idx).set_kind(RegionKind::Archive);
                cursor = cursor.add(region_size_bytes);
            }
        }
        Ok(())
    }

    #[cfg(feature = "archive_regions")]
    pub fn dealloc_archive_regions(&self, ranges: &[(Address, Address)]) {
        let mut inner = self.inner.lock().unwrap();
        let region_size_bytes = *self.options.region_size_bytes;
        for &(start, end) in ranges {
            let mut cursor = start;
            while cursor < end {
                if let Some(idx) = inner.table.region_index_for(cursor) {
                    inner.table.at_mut(idx).reset_to_free();
                    inner.sets.free_list.add_ordered(idx);
                }
                cursor = cursor.add(region_size_bytes);
            }
        }
    }
}

#[cfg(feature = "archive_regions")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMapError {
    Misaligned,
    OutOfRange,
}

#[cfg(feature = "archive_regions")]
impl std::fmt::Display for ArchiveMapError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ArchiveMapError::Misaligned => write!(f, "archive region range is not region-aligned"),
            ArchiveMapError::OutOfRange => write!(f, "archive region range falls outside the reserved heap"),
        }
    }
}

#[cfg(feature = "archive_regions")]
impl std::error::Error for ArchiveMapError {}

fn region_used_total(table: &RegionTable) -> usize {
    table.iter_committed().map(|r| r.used()).sum()
}

fn pause_kind_label(kind: PauseKind) -> &'static str {
    match kind {
        PauseKind::Young => "young",
        PauseKind::Mixed => "mixed",
        PauseKind::InitialMark => "initial-mark",
    }
}

/// An old region becomes a mixed-collection candidate once cleanup (C6)
/// observes non-trivial garbage in it. Embedders (or this crate's own
/// cleanup integration, once wired) call this to queue it.
pub fn candidate_from_region(region_index: usize, region_size_bytes: usize, marked_bytes: usize, predictor: &Predictor, rs_length: usize) -> CSetCandidate {
    let reclaimable_bytes = region_size_bytes.saturating_sub(marked_bytes);
    let predicted_elapsed_ms = predictor.predict_region_elapsed_time_ms(marked_bytes, rs_length, false);
    CSetCandidate {
        region_index,
        reclaimable_bytes,
        predicted_elapsed_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{NullSatbSink, ObjectModel, RememberedSet, WeakRefProcessor};

    #[derive(Default)]
    struct NoopModel;
    impl ObjectModel for NoopModel {
        fn object_size(&self, _object: ObjectReference) -> usize {
            64
        }
        fn scan_object(&self, _object: ObjectReference, _visit: &mut dyn FnMut(ObjectReference)) {}
        fn copy_object(&self, _object: ObjectReference, dst: Address) -> ObjectReference {
            ObjectReference::from_raw_address(dst).unwrap()
        }
        fn mark_word(&self, _object: ObjectReference) -> usize {
            0
        }
        fn set_mark_word(&self, _object: ObjectReference, _value: usize) {}
    }

    #[derive(Default)]
    struct NoopRSet;
    impl RememberedSet for NoopRSet {
        fn scan_cards(&self, _region_index: usize, _visit: &mut dyn FnMut(Address)) {}
        fn clear(&self, _region_index: usize) {}
        fn record_card(&self, _target_region_index: usize, _card: Address) {}
    }

    #[derive(Default)]
    struct NoopWeak;
    impl WeakRefProcessor for NoopWeak {
        fn process_weak_refs(&self, _is_live: &dyn Fn(ObjectReference) -> bool) -> Vec<ObjectReference> {
            Vec::new()
        }
    }

    #[derive(Default)]
    struct NoopBinding {
        model: NoopModel,
        rset: NoopRSet,
        satb: NullSatbSink,
        weak: NoopWeak,
    }

    impl Binding for NoopBinding {
        type ObjectModel = NoopModel;
        type RememberedSet = NoopRSet;
        type SatbSink = NullSatbSink;
        type WeakRefs = NoopWeak;

        fn object_model(&self) -> &Self::ObjectModel {
            &self.model
        }
        fn remembered_set(&self) -> &Self::RememberedSet {
            &self.rset
        }
        fn satb_sink(&self) -> &Self::SatbSink {
            &self.satb
        }
        fn weak_refs(&self) -> &Self::WeakRefs {
            &self.weak
        }
    }

    /// `spec.md` §8 scenario 6: a full collection requested mid-cycle calls
    /// `abort()`, every marking flag resets, and a subsequent initial-mark
    /// would start fresh (the next `initial_mark` call itself clears
    /// `has_aborted` and both bitmaps; see `ConcurrentMark::initial_mark`).
    #[test]
    fn abort_during_marking_resets_state_for_a_fresh_cycle() {
        let heap = G1Heap::new(Options::default(), NoopBinding::default());

        {
            let mut inner = heap.inner.lock().unwrap();
            inner.mark.initial_mark(&mut inner.table, &[]);
        }
        heap.state.set_mark_in_progress(true);
        heap.state.set_in_marking_window(true);
        heap.state.set_in_marking_window_im(true);
        assert!(heap.state.during_concurrent_mark());

        heap.abort_concurrent_mark_for_full_collection();

        assert!(!heap.state.mark_in_progress());
        assert!(!heap.state.during_marking());
        assert!(!heap.state.in_marking_window());
        assert!(!heap.state.full_collection());
        assert_eq!(heap.counters_snapshot().full_pause_count, 1);
        // `has_aborted` stays set until the next `initial_mark` clears it;
        // that's the "all tasks exit at their next regular clock tick" half
        // of the contract, not something `abort_concurrent_mark_for_full_collection`
        // itself resets.
        assert!(heap.inner.lock().unwrap().mark.has_aborted());

        {
            let mut inner = heap.inner.lock().unwrap();
            inner.mark.initial_mark(&mut inner.table, &[]);
        }
        assert!(!heap.inner.lock().unwrap().mark.has_aborted());
    }

    /// `spec.md` §4.8's young-list-length sizer, exercised as a real
    /// trigger: with a tiny `max_young_length` ceiling the incremental
    /// young CSet should report "request a young GC" the moment it reaches
    /// that ceiling, and not before.
    #[test]
    fn should_request_young_gc_once_eden_reaches_the_target_length() {
        use crate::util::options::MaybeRegionCount;

        let mut options = Options::default();
        options.region_size_bytes.set(64 * 1024);
        options.initial_heap_bytes.set(64 * 1024 * 8);
        options.max_heap_bytes.set(64 * 1024 * 8);
        options.max_young_length.set(MaybeRegionCount(Some(2)));
        options.min_young_length.set(1);
        let heap = G1Heap::new(options, NoopBinding::default());

        assert!(!heap.should_request_young_gc());

        heap.alloc(128).expect("first eden allocation should succeed");
        assert!(!heap.should_request_young_gc());

        // Force a second, distinct eden region so the incremental young
        // CSet's length reaches the configured ceiling of 2.
        {
            let mut inner = heap.inner.lock().unwrap();
            inner.alloc_mgr.retire_mutator_region();
        }
        heap.alloc(128).expect("second eden allocation should succeed");

        assert!(heap.should_request_young_gc());
    }
}
