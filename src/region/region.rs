//! The `Region` data model (component C1's unit of storage). Grounded on
//! `policy/regionspace/region.rs`'s `Region`/`MetaData` split and
//! `plan/g1/g1.rs`'s field names (`rs_survivor`/`rs_old` destinations,
//! `evacuation_failed`), generalized from the teacher's chunk-embedded
//! metadata scheme to a plain struct per region stored in `RegionTable`'s
//! `Vec<Region>`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::mark::bitmap::RegionMarkState;
use crate::util::address::Address;

/// The generational/structural role a region currently plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Free,
    Eden,
    Survivor,
    Old,
    StartsHumongous,
    ContinuesHumongous,
    Archive,
}

impl RegionKind {
    pub fn is_young(self) -> bool {
        matches!(self, RegionKind::Eden | RegionKind::Survivor)
    }

    pub fn is_humongous(self) -> bool {
        matches!(
            self,
            RegionKind::StartsHumongous | RegionKind::ContinuesHumongous
        )
    }
}

/// A fixed-size contiguous span of heap memory: the unit of allocation,
/// reclamation, and remembered-set granularity.
pub struct Region {
    index: usize,
    bottom: Address,
    end: Address,
    top: AtomicUsize,
    kind: RegionKind,

    prev_tams: Address,
    next_tams: Address,
    prev_marked_bytes: usize,
    next_marked_bytes: usize,

    age: u32,
    evacuation_failed: AtomicBool,
    in_collection_set: bool,

    mark_state: RegionMarkState,
}

impl Region {
    pub fn new(index: usize, bottom: Address, size_bytes: usize) -> Self {
        let end = bottom.add(size_bytes);
        Region {
            index,
            bottom,
            end,
            top: AtomicUsize::new(bottom.as_usize()),
            kind: RegionKind::Free,
            prev_tams: bottom,
            next_tams: bottom,
            prev_marked_bytes: 0,
            next_marked_bytes: 0,
            age: 0,
            evacuation_failed: AtomicBool::new(false),
            in_collection_set: false,
            mark_state: RegionMarkState::new(bottom, end),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn bottom(&self) -> Address {
        self.bottom
    }

    pub fn end(&self) -> Address {
        self.end
    }

    pub fn size_bytes(&self) -> usize {
        self.end - self.bottom
    }

    pub fn top(&self) -> Address {
        Address::from_usize(self.top.load(Ordering::Acquire))
    }

    pub fn set_top(&self, top: Address) {
        self.top.store(top.as_usize(), Ordering::Release);
    }

    /// Attempt to bump `top` by `size_bytes`. Returns the old top on success,
    /// or `None` if the bump would cross `end`. Lock-free: callers retry
    /// under the heap lock only after this fails, per the mutator path.
    pub fn try_bump_alloc(&self, size_bytes: usize) -> Option<Address> {
        loop {
            let cur = self.top.load(Ordering::Acquire);
            let new_top = cur.checked_add(size_bytes)?;
            if new_top > self.end.as_usize() {
                return None;
            }
            if self
                .top
                .compare_exchange_weak(cur, new_top, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(Address::from_usize(cur));
            }
        }
    }

    pub fn used(&self) -> usize {
        self.top() - self.bottom
    }

    pub fn set_used(&mut self, used: usize) {
        self.top.store(self.bottom.as_usize() + used, Ordering::Relaxed);
    }

    pub fn free_bytes(&self) -> usize {
        self.end - self.top()
    }

    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: RegionKind) {
        self.kind = kind;
    }

    pub fn is_archive(&self) -> bool {
        self.kind == RegionKind::Archive
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn bump_age(&mut self) {
        self.age += 1;
    }

    /// Stamp this region's age directly, e.g. when it is freshly installed
    /// as an evacuation destination and should carry `source_age + 1`
    /// forward (`spec.md` §4.10 step 5's survivor age table).
    pub fn set_age(&mut self, age: u32) {
        self.age = age;
    }

    pub fn reset_age(&mut self) {
        self.age = 0;
    }

    pub fn evacuation_failed(&self) -> bool {
        self.evacuation_failed.load(Ordering::Acquire)
    }

    /// Does not require `&mut self`: evacuation workers race to copy distinct
    /// objects out of the same region in parallel, so recording a failure
    /// must not take the region lock the rest of this API assumes.
    pub fn set_evacuation_failed(&self, failed: bool) {
        self.evacuation_failed.store(failed, Ordering::Release);
    }

    pub fn in_collection_set(&self) -> bool {
        self.in_collection_set
    }

    pub fn set_in_collection_set(&mut self, in_cset: bool) {
        self.in_collection_set = in_cset;
    }

    pub fn prev_tams(&self) -> Address {
        self.prev_tams
    }

    pub fn next_tams(&self) -> Address {
        self.next_tams
    }

    pub fn set_next_tams(&mut self, tams: Address) {
        self.next_tams = tams;
    }

    pub fn prev_marked_bytes(&self) -> usize {
        self.prev_marked_bytes
    }

    pub fn next_marked_bytes(&self) -> usize {
        self.next_marked_bytes
    }

    pub fn set_next_marked_bytes(&mut self, bytes: usize) {
        self.next_marked_bytes = bytes;
    }

    /// Swap prev/next TAMS and marked-byte counts at the end of a completed
    /// marking cycle (component C6's cleanup phase).
    pub fn swap_mark_state(&mut self) {
        self.prev_tams = self.next_tams;
        self.prev_marked_bytes = self.next_marked_bytes;
        self.mark_state.swap();
    }

    pub fn mark_state(&self) -> &RegionMarkState {
        &self.mark_state
    }

    pub fn mark_state_mut(&mut self) -> &mut RegionMarkState {
        &mut self.mark_state
    }

    /// `allocated_since_prev_marking(obj) := obj >= prev_tams`.
    pub fn allocated_since_prev_marking(&self, obj: Address) -> bool {
        obj >= self.prev_tams
    }

    /// `allocated_since_next_marking(obj) := obj >= next_tams`.
    pub fn allocated_since_next_marking(&self, obj: Address) -> bool {
        obj >= self.next_tams
    }

    /// `is_obj_dead`: liveness query against the previous cycle's bitmap.
    pub fn is_obj_dead(&self, obj: Address) -> bool {
        !self.is_archive()
            && !self.allocated_since_prev_marking(obj)
            && !self.mark_state.prev_is_marked(obj)
    }

    /// `is_obj_ill`: liveness query against the in-progress cycle's bitmap.
    pub fn is_obj_ill(&self, obj: Address) -> bool {
        !self.is_archive()
            && !self.allocated_since_next_marking(obj)
            && !self.mark_state.next_is_marked(obj)
    }

    /// Return this region to `Free`, resetting occupancy, TAMS, and mark
    /// state. Called when (un)committing a slot in `RegionTable` and when
    /// the free list reclaims a region after a pause.
    pub fn reset_to_free(&mut self) {
        self.top.store(self.bottom.as_usize(), Ordering::Relaxed);
        self.kind = RegionKind::Free;
        self.prev_tams = self.bottom;
        self.next_tams = self.bottom;
        self.prev_marked_bytes = 0;
        self.next_marked_bytes = 0;
        self.age = 0;
        self.evacuation_failed.store(false, Ordering::Relaxed);
        self.in_collection_set = false;
        self.mark_state.clear();
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("bottom", &self.bottom)
            .field("top", &self.top())
            .field("end", &self.end)
            .finish()
    }
}
