//! Bump-pointer mutator allocation, humongous allocation, and the GC-path
//! PLAB refill/direct-alloc/undo protocol (component C3). Grounded on
//! `util/heap/monotonepageresource.rs`'s bump-then-retire idiom and
//! `plan/g1/g1collector.rs::alloc_copy`'s per-destination PLAB dispatch.
//!
//! This type holds no heap-wide state itself (no region table, no region
//! sets): it is handed `&mut RegionTable`/`&mut RegionSets` by its caller
//! (`G1Heap`) on every call, so that `G1Heap` remains the single owner of the
//! heap's address space and region bookkeeping, per the "singleton replaced
//! by an explicit owned struct" redesign.

use std::collections::HashMap;

use crate::heap::{RegionSets, RegionTable};
use crate::region::plab::{CopyDestination, EvacStats, Plab};
use crate::region::region::RegionKind;
use crate::util::address::Address;

/// Threshold above which an allocation request is humongous: more than half
/// a region.
pub fn humongous_threshold_bytes(region_size_bytes: usize) -> usize {
    region_size_bytes / 2
}

pub struct AllocRegionManager {
    region_size_bytes: usize,
    current_eden_region: Option<usize>,
    /// Per-worker, per-destination PLABs, keyed by `(worker_id, destination)`.
    plabs: HashMap<(usize, CopyDestination), Plab>,
    plab_size_survivor: usize,
    plab_size_old: usize,
    /// Requests at or above this size bypass PLAB refill and allocate
    /// directly from a GC alloc region.
    plab_direct_threshold: usize,
    survivor_alignment_bytes: usize,
    stats_survivor: EvacStats,
    stats_old: EvacStats,
    /// Every region freshly installed as a GC alloc region this pause, so
    /// the caller can fold new Survivor regions into the next pause's
    /// incremental CSet (`spec.md` §4.7's `add_survivor_region`) once
    /// evacuation finishes. Drained and cleared once per pause.
    new_gc_regions: Vec<(CopyDestination, usize)>,
}

impl AllocRegionManager {
    pub fn new(region_size_bytes: usize, survivor_alignment_bytes: usize) -> Self {
        AllocRegionManager {
            region_size_bytes,
            current_eden_region: None,
            plabs: HashMap::new(),
            plab_size_survivor: region_size_bytes / 16,
            plab_size_old: region_size_bytes / 16,
            plab_direct_threshold: region_size_bytes / 8,
            survivor_alignment_bytes,
            stats_survivor: EvacStats::default(),
            stats_old: EvacStats::default(),
            new_gc_regions: Vec::new(),
        }
    }

    pub fn humongous_threshold_bytes(&self) -> usize {
        humongous_threshold_bytes(self.region_size_bytes)
    }

    /// The region currently being bump-allocated into by the mutator, if
    /// any. Exposed so a caller can notice when `alloc_mutator` installs a
    /// fresh eden region and fold it into the incremental young CSet.
    pub fn current_eden_region(&self) -> Option<usize> {
        self.current_eden_region
    }

    /// Mutator allocation path (component C3, step 1-2). Returns `None` if
    /// the heap has no more free regions to retire into.
    pub fn alloc_mutator(
        &mut self,
        table: &mut RegionTable,
        sets: &mut RegionSets,
        size_bytes: usize,
    ) -> Option<Address> {
        if size_bytes > self.humongous_threshold_bytes() {
            return self.alloc_humongous(table, sets, size_bytes);
        }

        loop {
            if let Some(index) = self.current_eden_region {
                if let Some(addr) = table.at(index).try_bump_alloc(size_bytes) {
                    return Some(addr);
                }
            }
            // Current region (if any) is full and stays Eden; the pause
            // driver folds it into the young list at the next pause.
            self.current_eden_region = None;
            let fresh = sets.free_list.pop_first()?;
            table.at_mut(fresh).set_kind(RegionKind::Eden);
            self.current_eden_region = Some(fresh);
        }
    }

    /// Humongous allocation path (component C3, step 3): reserve
    /// `ceil(size_bytes / region_size_bytes)` contiguous free regions.
    fn alloc_humongous(
        &mut self,
        table: &mut RegionTable,
        sets: &mut RegionSets,
        size_bytes: usize,
    ) -> Option<Address> {
        let needed = size_bytes.div_ceil(self.region_size_bytes);
        let free: Vec<usize> = sets.free_list.iterate().collect();
        let run = find_contiguous_run(&free, needed)?;
        for &index in &run {
            sets.free_list.remove(index);
        }
        table.at_mut(run[0]).set_kind(RegionKind::StartsHumongous);
        for &index in &run[1..] {
            table.at_mut(index).set_kind(RegionKind::ContinuesHumongous);
        }
        for &index in &run {
            sets.humongous_set.add_ordered(index);
            table.at_mut(index).set_used(self.region_size_bytes.min(size_bytes));
        }
        Some(table.at(run[0]).bottom())
    }

    /// Release a humongous run (the reverse of `alloc_humongous`), returning
    /// all of its regions to the free list as a block.
    pub fn free_humongous_run(&mut self, table: &mut RegionTable, sets: &mut RegionSets, start_index: usize) {
        let mut index = start_index;
        loop {
            sets.humongous_set.remove(index);
            table.at_mut(index).reset_to_free();
            sets.free_list.add_ordered(index);
            index += 1;
            if index >= table.max_regions() || table.at(index).kind() != RegionKind::ContinuesHumongous {
                break;
            }
        }
    }

    /// GC path: bump-allocate `size_bytes` from `worker_id`'s PLAB for
    /// `dest`. Returns `None` on a PLAB miss (caller should then call
    /// `allocate_direct_or_new_plab`).
    pub fn plab_allocate(&mut self, worker_id: usize, dest: CopyDestination, size_bytes: usize) -> Option<Address> {
        self.plabs.get_mut(&(worker_id, dest))?.allocate(size_bytes)
    }

    /// `allocate_direct_or_new_plab`: serve a PLAB miss either by allocating
    /// directly from a fresh GC alloc region (large requests) or by refilling
    /// the worker's PLAB with a new region and retrying the bump.
    /// `dest_age` is the age to stamp on a freshly installed Survivor region
    /// (`source_age + 1`, per `spec.md` §4.10 step 5); ignored for `Old`.
    pub fn allocate_direct_or_new_plab(
        &mut self,
        table: &mut RegionTable,
        sets: &mut RegionSets,
        worker_id: usize,
        dest: CopyDestination,
        size_bytes: usize,
        dest_age: u32,
    ) -> Option<Address> {
        if size_bytes >= self.plab_direct_threshold {
            let index = sets.free_list.pop_first()?;
            self.install_gc_alloc_region(table, index, dest, dest_age);
            return table.at(index).try_bump_alloc(size_bytes);
        }

        let index = sets.free_list.pop_first()?;
        self.install_gc_alloc_region(table, index, dest, dest_age);
        let plab_size = match dest {
            CopyDestination::Survivor => self.plab_size_survivor,
            CopyDestination::Old => self.plab_size_old,
        };
        let alignment_reserve = match dest {
            CopyDestination::Survivor => self.survivor_alignment_bytes,
            CopyDestination::Old => 0,
        };
        let new_plab = Plab::new(table.at(index).bottom(), plab_size.min(self.region_size_bytes), alignment_reserve);
        let mut plab = new_plab;
        let addr = plab.allocate(size_bytes);
        self.plabs.insert((worker_id, dest), plab);
        addr
    }

    fn install_gc_alloc_region(&mut self, table: &mut RegionTable, index: usize, dest: CopyDestination, dest_age: u32) {
        let kind = match dest {
            CopyDestination::Survivor => RegionKind::Survivor,
            CopyDestination::Old => RegionKind::Old,
        };
        let region = table.at_mut(index);
        region.set_kind(kind);
        if dest == CopyDestination::Survivor {
            region.set_age(dest_age);
        }
        self.new_gc_regions.push((dest, index));
    }

    /// Every region freshly installed as a GC alloc region since the last
    /// call, consumed once per pause (after evacuation, before the next
    /// pause's incremental CSet build reads `pending_survivors`).
    pub fn drain_new_gc_regions(&mut self) -> Vec<(CopyDestination, usize)> {
        std::mem::take(&mut self.new_gc_regions)
    }

    pub fn undo_allocation(&mut self, worker_id: usize, dest: CopyDestination, size_bytes: usize) {
        if let Some(plab) = self.plabs.get_mut(&(worker_id, dest)) {
            plab.undo_allocation(size_bytes);
        }
    }

    /// Retire every outstanding PLAB at the end of a pause, aggregating
    /// their stats into the per-destination `EvacStats` used to size the
    /// next pause's PLABs.
    pub fn retire_all_plabs(&mut self) {
        for ((_, dest), plab) in self.plabs.iter_mut() {
            let stats = plab.retire();
            match dest {
                CopyDestination::Survivor => self.stats_survivor.merge(&stats),
                CopyDestination::Old => self.stats_old.merge(&stats),
            }
        }
        self.plabs.clear();
    }

    pub fn evac_stats(&self, dest: CopyDestination) -> EvacStats {
        match dest {
            CopyDestination::Survivor => self.stats_survivor,
            CopyDestination::Old => self.stats_old,
        }
    }

    pub fn reset_evac_stats(&mut self) {
        self.stats_survivor = EvacStats::default();
        self.stats_old = EvacStats::default();
    }

    /// Resize both destinations' PLABs off this pause's retirement stats
    /// (`spec.md` §4's "Retirement": `EvacStats` is "used to resize future
    /// PLABs"), before `reset_evac_stats` clears them. A PLAB that wasted more
    /// than a tenth of what it handed out shrinks; a tight one that wasted
    /// little grows, so the common case converges on "few refills, low
    /// waste". Always clamped back into `[region_size/64, region_size/4]`, the
    /// same band `plab_direct_threshold` and the `new()` defaults already
    /// live in.
    pub fn resize_plabs(&mut self) {
        let region_size_bytes = self.region_size_bytes;
        self.plab_size_survivor = Self::resized_plab_size(self.plab_size_survivor, &self.stats_survivor, region_size_bytes);
        self.plab_size_old = Self::resized_plab_size(self.plab_size_old, &self.stats_old, region_size_bytes);
    }

    fn resized_plab_size(current: usize, stats: &EvacStats, region_size_bytes: usize) -> usize {
        let min_size = (region_size_bytes / 64).max(1);
        let max_size = region_size_bytes / 4;
        if stats.allocated == 0 {
            return current.clamp(min_size, max_size);
        }
        let waste = stats.wasted + stats.undo_wasted + stats.unused_tail;
        let waste_percent = (waste * 100) / (stats.allocated + waste);
        let adjusted = if waste_percent > 10 {
            current - current / 8
        } else {
            current + current / 8
        };
        adjusted.clamp(min_size, max_size)
    }

    /// Retire the current mutator (eden) region without installing a
    /// replacement, e.g. at a pause prologue.
    pub fn retire_mutator_region(&mut self) -> Option<usize> {
        self.current_eden_region.take()
    }
}

fn find_contiguous_run(sorted_free: &[usize], needed: usize) -> Option<Vec<usize>> {
    if needed == 0 {
        return Some(Vec::new());
    }
    for window in sorted_free.windows(needed) {
        if window
            .windows(2)
            .all(|pair| pair[1] == pair[0] + 1)
        {
            return Some(window.to_vec());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_run_found() {
        let free = vec![0, 1, 2, 5, 6, 7, 8];
        assert_eq!(find_contiguous_run(&free, 3), Some(vec![5, 6, 7]));
        assert_eq!(find_contiguous_run(&free, 4), Some(vec![5, 6, 7, 8]));
        assert_eq!(find_contiguous_run(&free, 5), None);
    }

    #[test]
    fn mutator_alloc_retires_and_installs_region() {
        let mut table = RegionTable::reserve(Address::from_usize(0x1_0000_0000), 0x1000, 4);
        let mut sets = RegionSets::new(0x1000);
        for i in 0..4 {
            table.commit(i);
            sets.free_list.add_ordered(i);
        }
        let mut mgr = AllocRegionManager::new(0x1000, 0);
        assert!(mgr.alloc_mutator(&mut table, &mut sets, 0x800).is_some());
        assert!(mgr.alloc_mutator(&mut table, &mut sets, 0x800).is_some());
        // Third request needs a fresh region.
        assert!(mgr.alloc_mutator(&mut table, &mut sets, 0x800).is_some());
    }

    #[test]
    fn humongous_allocates_contiguous_block() {
        let mut table = RegionTable::reserve(Address::from_usize(0x1_0000_0000), 0x1000, 4);
        let mut sets = RegionSets::new(0x1000);
        for i in 0..4 {
            table.commit(i);
            sets.free_list.add_ordered(i);
        }
        let mut mgr = AllocRegionManager::new(0x1000, 0);
        let addr = mgr.alloc_mutator(&mut table, &mut sets, 0x1800);
        assert!(addr.is_some());
        assert_eq!(sets.humongous_set.length(), 2);
    }

    #[test]
    fn heavy_waste_shrinks_and_light_waste_grows_plab_size() {
        let region_size_bytes = 0x10000;
        let mut mgr = AllocRegionManager::new(region_size_bytes, 0);
        let starting_size = mgr.plab_size_survivor;

        mgr.stats_survivor = EvacStats {
            allocated: 100,
            wasted: 50,
            undo_wasted: 0,
            unused_tail: 0,
        };
        mgr.resize_plabs();
        assert!(mgr.plab_size_survivor < starting_size);

        let shrunk_size = mgr.plab_size_survivor;
        mgr.stats_survivor = EvacStats {
            allocated: 1000,
            wasted: 1,
            undo_wasted: 0,
            unused_tail: 0,
        };
        mgr.resize_plabs();
        assert!(mgr.plab_size_survivor > shrunk_size);
    }

    #[test]
    fn resized_plab_size_stays_within_region_fraction_bounds() {
        let region_size_bytes = 0x10000;
        let min_size = region_size_bytes / 64;
        let max_size = region_size_bytes / 4;
        let busy = EvacStats {
            allocated: 10,
            wasted: 0,
            undo_wasted: 0,
            unused_tail: 0,
        };
        let mut size = min_size;
        for _ in 0..50 {
            size = AllocRegionManager::resized_plab_size(size, &busy, region_size_bytes);
        }
        assert!(size <= max_size);

        let wasteful = EvacStats {
            allocated: 1,
            wasted: 100,
            undo_wasted: 0,
            unused_tail: 0,
        };
        let mut size = max_size;
        for _ in 0..50 {
            size = AllocRegionManager::resized_plab_size(size, &wasteful, region_size_bytes);
        }
        assert!(size >= min_size);
    }
}
