//! The multi-phase SATB marking cycle (component C6): initial-mark, the
//! concurrent marking tasks, remark, and cleanup. Grounded on
//! `scheduler/gc_work.rs`/`scheduler/work.rs`'s `GCWork` task-draining loop
//! shape and `plan/g1/g1collector.rs::concurrent_collection_phase`'s
//! cooperative "regular clock" idiom (checked every so many words scanned or
//! refs visited, not an async suspension point).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Barrier;

use crate::heap::{RegionSets, RegionTable};
use crate::region::RegionKind;
use crate::util::address::{Address, ObjectReference};
use crate::util::statistics::{Counters, Tracer};
use crate::vm::{ObjectModel, SatbBarrierSink};

/// Words scanned between "regular clock" checks (time budget, abort flag,
/// global overflow, safepoint request).
pub const WORDS_SCANNED_CLOCK: usize = 12 * 1024;
/// References visited between clock checks, for tasks dominated by
/// reference-dense objects rather than raw scan distance.
pub const REFS_VISITED_CLOCK: usize = 384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkCyclePhase {
    Idle,
    InitialMark,
    Concurrent,
    Remark,
    Cleanup,
}

/// Owns the marking queues, the monotonically-advancing finger, and the
/// abort flag for one marking cycle. Reused across cycles (reset at the next
/// initial mark).
pub struct ConcurrentMark {
    queues: super::queue::MarkQueueSet,
    finger: AtomicUsize,
    has_aborted: AtomicBool,
    overflow_barrier: Barrier,
}

impl ConcurrentMark {
    pub fn new(num_workers: usize) -> Self {
        ConcurrentMark {
            queues: super::queue::MarkQueueSet::new(num_workers),
            finger: AtomicUsize::new(0),
            has_aborted: AtomicBool::new(false),
            overflow_barrier: Barrier::new(num_workers.max(1)),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.queues.num_workers()
    }

    pub fn has_aborted(&self) -> bool {
        self.has_aborted.load(Ordering::Acquire)
    }

    /// External collaborator (e.g. a full GC) requests that marking stop at
    /// the next regular clock tick.
    pub fn abort(&self) {
        self.has_aborted.store(true, Ordering::Release);
    }

    fn mark_referent(&self, table: &RegionTable, referent: ObjectReference) -> bool {
        let addr = referent.to_raw_address();
        match table.region_index_for(addr) {
            Some(idx) => {
                let region = table.at(idx);
                !region.is_archive() && region.mark_state().par_mark_next(addr)
            }
            None => false,
        }
    }

    fn trace_object(
        &self,
        worker_id: usize,
        table: &RegionTable,
        obj: ObjectReference,
        model: &dyn ObjectModel,
        refs_visited: &mut usize,
    ) {
        model.scan_object(obj, &mut |referent| {
            if self.mark_referent(table, referent) {
                self.queues.push_local(worker_id, referent.to_raw_address());
            }
            *refs_visited += 1;
        });
    }

    /// **Initial mark** (STW, piggybacked on an evacuation pause): set
    /// `next_tams := top` for every region, clear the next bitmap, reset the
    /// finger to the heap base, and mark strong roots into the next bitmap.
    pub fn initial_mark(&self, table: &mut RegionTable, roots: &[ObjectReference]) {
        for region in table.iter_committed_mut() {
            if region.is_archive() {
                continue;
            }
            region.mark_state_mut().clear_next();
            region.set_next_tams(region.top());
        }
        self.has_aborted.store(false, Ordering::Release);
        self.finger.store(table.heap_base().as_usize(), Ordering::Release);
        for &root in roots {
            self.mark_referent(table, root);
        }
    }

    /// Atomically claim the next unscanned region by bumping the finger one
    /// region at a time. The finger never decreases between its
    /// initialization at `initial_mark` and the end of concurrent mark.
    pub fn claim_region(&self, table: &RegionTable) -> Option<usize> {
        let heap_end = table.heap_base().as_usize() + table.max_regions() * table.region_size_bytes();
        loop {
            let cur = self.finger.load(Ordering::Acquire);
            if cur >= heap_end {
                return None;
            }
            let next = cur + table.region_size_bytes();
            if self
                .finger
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return table.region_index_for(Address::from_usize(cur));
            }
        }
    }

    pub fn finger(&self) -> Address {
        Address::from_usize(self.finger.load(Ordering::Acquire))
    }

    fn scan_range(
        &self,
        worker_id: usize,
        table: &RegionTable,
        start: Address,
        end: Address,
        model: &dyn ObjectModel,
        words_scanned: &mut usize,
        refs_visited: &mut usize,
    ) -> bool {
        let region_idx = match table.region_index_for(start) {
            Some(idx) => idx,
            None => return true,
        };
        let region = table.at(region_idx);
        if region.is_archive() {
            return true;
        }
        let mut cursor = start;
        while cursor < end {
            if region.mark_state().next_is_marked(cursor) {
                if let Some(obj) = ObjectReference::from_raw_address(cursor) {
                    self.trace_object(worker_id, table, obj, model, refs_visited);
                    let size = model.object_size(obj).max(crate::util::constants::BYTES_IN_WORD);
                    cursor = cursor.add(size);
                    *words_scanned += size / crate::util::constants::BYTES_IN_WORD;
                    if self.has_aborted() {
                        return false;
                    }
                    if *words_scanned >= WORDS_SCANNED_CLOCK || *refs_visited >= REFS_VISITED_CLOCK {
                        *words_scanned = 0;
                        *refs_visited = 0;
                        if self.queues.has_overflown() {
                            return false;
                        }
                    }
                    continue;
                }
            }
            cursor = cursor.add(crate::util::constants::BYTES_IN_WORD);
            *words_scanned += 1;
        }
        true
    }

    /// One worker's concurrent-mark task: drains newly-claimed regions, its
    /// local queue, the global overflow stack, the SATB sink, and finally
    /// tries work-stealing from peers before entering the termination
    /// protocol. Returns when nothing is left anywhere (or the cycle
    /// aborted).
    pub fn run_task(
        &self,
        worker_id: usize,
        table: &RegionTable,
        model: &dyn ObjectModel,
        satb: &dyn SatbBarrierSink,
        counters: &Counters,
    ) {
        let mut words_scanned = 0usize;
        let mut refs_visited = 0usize;
        loop {
            if self.has_aborted() {
                return;
            }

            while let Some(old_value) = satb.drain_one() {
                if self.mark_referent(table, old_value) {
                    self.queues.push_local(worker_id, old_value.to_raw_address());
                }
            }

            if let Some(region_idx) = self.claim_region(table) {
                let region = table.at(region_idx);
                let (bottom, tams) = (region.bottom(), region.next_tams());
                if !self.scan_range(worker_id, table, bottom, tams, model, &mut words_scanned, &mut refs_visited) {
                    if self.queues.has_overflown() {
                        self.handle_overflow(worker_id, table, model, counters);
                    }
                }
                continue;
            }

            if let Some(addr) = self.queues.pop_local(worker_id) {
                if let Some(obj) = ObjectReference::from_raw_address(addr) {
                    self.trace_object(worker_id, table, obj, model, &mut refs_visited);
                }
                continue;
            }

            if self.queues.has_overflown() {
                self.handle_overflow(worker_id, table, model, counters);
                continue;
            }

            if let Some(addr) = self.queues.pop_global() {
                if let Some(obj) = ObjectReference::from_raw_address(addr) {
                    self.trace_object(worker_id, table, obj, model, &mut refs_visited);
                }
                continue;
            }

            if let Some(addr) = self.queues.steal_from_peers(worker_id) {
                if let Some(obj) = ObjectReference::from_raw_address(addr) {
                    self.trace_object(worker_id, table, obj, model, &mut refs_visited);
                }
                continue;
            }

            return;
        }
    }

    /// Global-overflow recovery: quiesce at a barrier, have one worker
    /// replace the (now-unreliable) global stack with a full rescan of every
    /// committed region via the coarser region stack, synchronize again,
    /// then everyone replays until the region stack drains.
    fn handle_overflow(&self, worker_id: usize, table: &RegionTable, model: &dyn ObjectModel, counters: &Counters) {
        self.overflow_barrier.wait();
        if worker_id == 0 {
            counters.mark_stack_overflow_count.fetch_add(1, Ordering::Relaxed);
            for region in table.iter_committed() {
                if !region.is_archive() {
                    self.queues.push_region(region.bottom(), region.next_tams());
                }
            }
            self.queues.drain_global_and_clear_overflow();
        }
        self.overflow_barrier.wait();

        let mut words_scanned = 0usize;
        let mut refs_visited = 0usize;
        while let Some((start, end)) = self.queues.pop_region() {
            self.scan_range(worker_id, table, start, end, model, &mut words_scanned, &mut refs_visited);
        }
    }

    /// **Remark** (STW): drain whatever SATB entries remain, tracing any
    /// previously-unmarked overwritten values, then hand off to the
    /// embedder's reference processing via `finish`.
    pub fn remark<F: FnMut(ObjectReference)>(&self, table: &RegionTable, model: &dyn ObjectModel, satb: &dyn SatbBarrierSink, mut finish: F) {
        while let Some(old_value) = satb.drain_one() {
            if self.mark_referent(table, old_value) {
                finish(old_value);
            }
        }
        let mut refs_visited = 0usize;
        loop {
            let mut drained_any = false;
            for worker_id in 0..self.queues.num_workers() {
                while let Some(addr) = self.queues.pop_local(worker_id) {
                    drained_any = true;
                    if let Some(obj) = ObjectReference::from_raw_address(addr) {
                        self.trace_object(worker_id, table, obj, model, &mut refs_visited);
                    }
                }
            }
            while let Some(addr) = self.queues.pop_global() {
                drained_any = true;
                if let Some(obj) = ObjectReference::from_raw_address(addr) {
                    self.trace_object(0, table, obj, model, &mut refs_visited);
                }
            }
            if !drained_any {
                break;
            }
        }
    }

    /// **Cleanup**: compute `next_marked_bytes` per region from the next
    /// bitmap, return fully-dead old regions to the free list via the
    /// secondary free list, then swap prev/next bitmaps and TAMS values.
    /// Returns `(region_index, marked_bytes)` for every old region that
    /// survived (had some live bytes left) so the caller can queue it as a
    /// mixed-collection candidate in the `CSetChooser` (`spec.md` §4.7).
    pub fn cleanup(&self, table: &mut RegionTable, sets: &mut RegionSets, model: &dyn ObjectModel, counters: &Counters, tracer: &dyn Tracer) -> Vec<(usize, usize)> {
        let mut newly_dead = Vec::new();
        let mut surviving_old = Vec::new();
        for region in table.iter_committed_mut() {
            if region.is_archive() {
                continue;
            }
            let marked_bytes = compute_marked_bytes(region, model);
            region.set_next_marked_bytes(marked_bytes);
            if region.kind() == RegionKind::Old {
                if marked_bytes == 0 {
                    newly_dead.push(region.index());
                } else {
                    surviving_old.push((region.index(), marked_bytes));
                }
            }
        }
        for &idx in &newly_dead {
            table.at_mut(idx).reset_to_free();
            sets.old_set.remove(idx);
            sets.append_secondary_free_list(idx);
        }
        counters
            .regions_reclaimed
            .fetch_add(newly_dead.len(), Ordering::Relaxed);
        for region in table.iter_committed_mut() {
            if !region.is_archive() {
                region.swap_mark_state();
            }
        }
        counters.concurrent_cycle_count.fetch_add(1, Ordering::Relaxed);
        if tracer.is_enabled() {
            tracer.concurrent_cycle_end(self.has_aborted());
        }
        surviving_old
    }
}

fn compute_marked_bytes(region: &crate::region::Region, model: &dyn ObjectModel) -> usize {
    let mut cursor = region.bottom();
    let tams = region.next_tams();
    let mut total = 0usize;
    while cursor < tams {
        if region.mark_state().next_is_marked(cursor) {
            if let Some(obj) = ObjectReference::from_raw_address(cursor) {
                let size = model.object_size(obj).max(crate::util::constants::BYTES_IN_WORD);
                total += size;
                cursor = cursor.add(size);
                continue;
            }
        }
        cursor = cursor.add(crate::util::constants::BYTES_IN_WORD);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::BYTES_IN_MBYTE;
    use std::collections::HashMap;

    /// A trivial object graph: a fixed-size header plus an explicit
    /// adjacency list, keyed by address. Good enough to exercise marking
    /// without a real VM binding.
    struct FakeGraph {
        edges: HashMap<usize, Vec<ObjectReference>>,
        object_size: usize,
    }

    impl ObjectModel for FakeGraph {
        fn object_size(&self, _object: ObjectReference) -> usize {
            self.object_size
        }
        fn scan_object(&self, object: ObjectReference, visit: &mut dyn FnMut(ObjectReference)) {
            if let Some(refs) = self.edges.get(&object.to_raw_address().as_usize()) {
                for &r in refs {
                    visit(r);
                }
            }
        }
        fn copy_object(&self, _object: ObjectReference, dst: Address) -> ObjectReference {
            ObjectReference::from_raw_address(dst).unwrap()
        }
        fn mark_word(&self, _object: ObjectReference) -> usize {
            0
        }
        fn set_mark_word(&self, _object: ObjectReference, _value: usize) {}
    }

    fn table_with_chain(region_size: usize, num_regions: usize) -> RegionTable {
        let mut table = RegionTable::reserve(Address::from_usize(0x2_0000_0000), region_size, num_regions);
        for i in 0..num_regions {
            table.commit(i);
            table.at_mut(i).set_kind(crate::region::RegionKind::Old);
            table.at_mut(i).set_used(region_size);
        }
        table
    }

    #[test]
    fn claim_region_is_monotonic_and_exhausts() {
        let table = table_with_chain(0x1000, 4);
        let cm = ConcurrentMark::new(1);
        cm.finger_reset_for_test(table.heap_base());
        let mut seen = vec![];
        while let Some(idx) = cm.claim_region(&table) {
            seen.push(idx);
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn initial_mark_sets_tams_to_top() {
        let mut table = table_with_chain(0x1000, 2);
        let cm = ConcurrentMark::new(1);
        cm.initial_mark(&mut table, &[]);
        for r in table.iter_committed() {
            assert_eq!(r.next_tams(), r.top());
        }
    }

    impl ConcurrentMark {
        fn finger_reset_for_test(&self, addr: Address) {
            self.finger.store(addr.as_usize(), Ordering::Release);
        }
    }

    #[test]
    fn marking_a_root_and_tracing_finds_its_referent() {
        let mut table = table_with_chain(BYTES_IN_MBYTE, 1);
        let root_addr = table.at(0).bottom();
        let child_addr = root_addr.add(64);
        let root = ObjectReference::from_raw_address(root_addr).unwrap();
        let child = ObjectReference::from_raw_address(child_addr).unwrap();

        let mut edges = HashMap::new();
        edges.insert(root_addr.as_usize(), vec![child]);
        let model = FakeGraph { edges, object_size: 64 };

        let cm = ConcurrentMark::new(1);
        cm.initial_mark(&mut table, &[root]);
        let mut refs_visited = 0;
        cm.trace_object(0, &table, root, &model, &mut refs_visited);

        let region = table.at(0);
        assert!(region.mark_state().next_is_marked(root_addr));
        assert!(region.mark_state().next_is_marked(child_addr));
    }

    #[test]
    fn cleanup_reclaims_fully_dead_old_regions() {
        let mut table = table_with_chain(0x1000, 2);
        let mut sets = RegionSets::new(0x1000);
        table.at_mut(0).set_next_tams(table.at(0).bottom());
        table.at_mut(1).set_next_tams(table.at(1).bottom());
        let model = FakeGraph { edges: HashMap::new(), object_size: 8 };
        let cm = ConcurrentMark::new(1);
        let counters = Counters::new();
        let tracer = crate::util::statistics::NullTracer;
        cm.cleanup(&mut table, &mut sets, &model, &counters, &tracer);
        assert_eq!(table.at(0).kind(), crate::region::RegionKind::Free);
        assert_eq!(table.at(1).kind(), crate::region::RegionKind::Free);
    }

    /// Builds a single-region linear chain of `len` objects (each pointing
    /// only to its successor) so a single `run_task` pass traces enough
    /// referents to exceed `GLOBAL_MARK_STACK_CAPACITY`, forcing at least one
    /// `handle_overflow` region-stack replay.
    fn chain_graph(root_addr: Address, object_size: usize, len: usize) -> (FakeGraph, Vec<ObjectReference>) {
        let mut edges = HashMap::new();
        let mut objects = Vec::with_capacity(len);
        for i in 0..len {
            let addr = root_addr.add(i * object_size);
            objects.push(ObjectReference::from_raw_address(addr).unwrap());
        }
        for i in 0..len - 1 {
            edges.insert(objects[i].to_raw_address().as_usize(), vec![objects[i + 1]]);
        }
        (FakeGraph { edges, object_size }, objects)
    }

    #[test]
    fn a_marking_cycle_survives_global_mark_stack_overflow() {
        const OBJECT_SIZE: usize = 32;
        const CHAIN_LEN: usize = 6000;

        let mut table = table_with_chain(BYTES_IN_MBYTE, 1);
        let root_addr = table.at(0).bottom();
        let (model, objects) = chain_graph(root_addr, OBJECT_SIZE, CHAIN_LEN);

        let cm = ConcurrentMark::new(1);
        let counters = Counters::new();
        let satb = crate::vm::NullSatbSink;
        cm.initial_mark(&mut table, &[objects[0]]);
        cm.run_task(0, &table, &model, &satb, &counters);

        assert!(
            counters.mark_stack_overflow_count.load(Ordering::Relaxed) > 0,
            "test is only meaningful if it actually drove the overflow path"
        );
        assert!(cm.queues.region_stack_is_empty());
        assert!(cm.queues.all_empty());
        assert!(!cm.queues.has_overflown());

        let region = table.at(0);
        for obj in &objects {
            assert!(
                region.mark_state().next_is_marked(obj.to_raw_address()),
                "object at {:?} was not marked after overflow recovery",
                obj.to_raw_address()
            );
        }

        // An uninterrupted (non-overflowing) scan of this exact chain would
        // mark every object exactly once, for a total of CHAIN_LEN *
        // OBJECT_SIZE live bytes. Overflow recovery must land on the same
        // total: nothing double-counted, nothing left unmarked.
        assert_eq!(compute_marked_bytes(region, &model), CHAIN_LEN * OBJECT_SIZE);
    }
}
