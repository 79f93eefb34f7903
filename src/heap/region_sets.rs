//! Ordered free/old/humongous region sets plus the secondary free list
//! concurrent cleanup folds into the primary free list (component C2).
//! Grounded on `policy/regionspace/regionspace.rs`'s `regions: RwLock<HashSet<Region>>`
//! release-path folding and the `SecondaryFreeList_lock` convention referenced
//! in `util/heap/gc_trigger.rs`.

use std::collections::BTreeSet;
use std::sync::Mutex;

/// An ordered set of region indices, supporting the bulk operations C2
/// requires. Backed by a `BTreeSet` so `add_ordered`/`iterate` naturally
/// produce ascending-address order without a separate sort step.
#[derive(Default)]
pub struct RegionSet {
    indices: BTreeSet<usize>,
    total_capacity_bytes: usize,
    region_size_bytes: usize,
}

impl RegionSet {
    pub fn new(region_size_bytes: usize) -> Self {
        RegionSet {
            indices: BTreeSet::new(),
            total_capacity_bytes: 0,
            region_size_bytes,
        }
    }

    pub fn add_ordered(&mut self, index: usize) {
        if self.indices.insert(index) {
            self.total_capacity_bytes += self.region_size_bytes;
        }
    }

    pub fn remove(&mut self, index: usize) -> bool {
        if self.indices.remove(&index) {
            self.total_capacity_bytes -= self.region_size_bytes;
            true
        } else {
            false
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn length(&self) -> usize {
        self.indices.len()
    }

    pub fn total_capacity_bytes(&self) -> usize {
        self.total_capacity_bytes
    }

    pub fn iterate(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    /// Remove and return the lowest-indexed region, if any (the free list's
    /// allocation order).
    pub fn pop_first(&mut self) -> Option<usize> {
        let first = *self.indices.iter().next()?;
        self.remove(first);
        Some(first)
    }
}

/// The three region sets C2 owns, plus the lock-guarded secondary free list
/// that concurrent cleanup appends to without contending with mutators on
/// the primary free list.
pub struct RegionSets {
    pub free_list: RegionSet,
    pub old_set: RegionSet,
    pub humongous_set: RegionSet,
    secondary_free_list: Mutex<Vec<usize>>,
}

impl RegionSets {
    pub fn new(region_size_bytes: usize) -> Self {
        RegionSets {
            free_list: RegionSet::new(region_size_bytes),
            old_set: RegionSet::new(region_size_bytes),
            humongous_set: RegionSet::new(region_size_bytes),
            secondary_free_list: Mutex::new(Vec::new()),
        }
    }

    /// Concurrent cleanup deposits a reclaimed region here, off the hot path.
    pub fn append_secondary_free_list(&self, index: usize) {
        self.secondary_free_list.lock().unwrap().push(index);
    }

    /// Fold all pending secondary-free-list entries into the primary free
    /// list. Called under the heap lock, typically at the start of the next
    /// pause prologue.
    pub fn fold_secondary_free_list(&mut self) -> usize {
        let mut pending = self.secondary_free_list.lock().unwrap();
        let count = pending.len();
        for index in pending.drain(..) {
            self.free_list.add_ordered(index);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_tracks_capacity() {
        let mut set = RegionSet::new(0x1000);
        set.add_ordered(3);
        set.add_ordered(1);
        assert_eq!(set.total_capacity_bytes(), 0x2000);
        assert_eq!(set.iterate().collect::<Vec<_>>(), vec![1, 3]);
        assert!(set.remove(1));
        assert_eq!(set.total_capacity_bytes(), 0x1000);
    }

    #[test]
    fn secondary_free_list_folds_under_lock() {
        let mut sets = RegionSets::new(0x1000);
        sets.append_secondary_free_list(5);
        sets.append_secondary_free_list(2);
        let folded = sets.fold_secondary_free_list();
        assert_eq!(folded, 2);
        assert!(sets.free_list.contains(5));
        assert!(sets.free_list.contains(2));
    }

    #[test]
    fn pop_first_is_ascending() {
        let mut set = RegionSet::new(0x1000);
        set.add_ordered(4);
        set.add_ordered(0);
        set.add_ordered(2);
        assert_eq!(set.pop_first(), Some(0));
        assert_eq!(set.pop_first(), Some(2));
    }
}
