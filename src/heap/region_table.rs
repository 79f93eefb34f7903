//! The heap's address-to-region mapping and commit/uncommit bookkeeping
//! (component C1). Grounded on `policy/regionspace/regionspace.rs`'s
//! `acquire_new_region`/`release` commit accounting and
//! `util/heap/freelistpageresource.rs`'s page-granularity bookkeeping, but
//! without a real `mmap`: committed state is tracked in a bitset over a
//! reserved `Vec<u8>`-backed address range rather than by calling into the
//! OS's virtual memory layer (see DESIGN.md's Open Question decisions).

use crate::region::Region;
use crate::util::address::Address;
use crate::util::conversions;

/// A fixed-capacity table of `Region`s backed by one contiguous reservation.
/// Indices are stable for the table's lifetime: `Region`s are never moved
/// once constructed, only their `RegionKind`/occupancy fields mutate.
pub struct RegionTable {
    heap_base: Address,
    region_size_bytes: usize,
    max_regions: usize,
    committed: Vec<bool>,
    regions: Vec<Region>,
}

impl RegionTable {
    /// Reserve address space for up to `max_regions` of `region_size_bytes`
    /// each, starting at `heap_base`. No regions are committed yet.
    pub fn reserve(heap_base: Address, region_size_bytes: usize, max_regions: usize) -> Self {
        assert!(region_size_bytes.is_power_of_two());
        let regions = (0..max_regions)
            .map(|i| {
                let start = conversions::region_start(i, heap_base, region_size_bytes);
                Region::new(i, start, region_size_bytes)
            })
            .collect();
        RegionTable {
            heap_base,
            region_size_bytes,
            max_regions,
            committed: vec![false; max_regions],
            regions,
        }
    }

    pub fn region_size_bytes(&self) -> usize {
        self.region_size_bytes
    }

    pub fn max_regions(&self) -> usize {
        self.max_regions
    }

    pub fn heap_base(&self) -> Address {
        self.heap_base
    }

    #[inline]
    pub fn at(&self, index: usize) -> &Region {
        &self.regions[index]
    }

    #[inline]
    pub fn at_mut(&mut self, index: usize) -> &mut Region {
        &mut self.regions[index]
    }

    pub fn is_committed(&self, index: usize) -> bool {
        self.committed[index]
    }

    /// Commit region `index`, making it available for allocation. Resets its
    /// occupancy and kind to `Free`.
    pub fn commit(&mut self, index: usize) {
        if !self.committed[index] {
            self.committed[index] = true;
            self.regions[index].reset_to_free();
        }
    }

    /// Uncommit region `index`, returning it to reserved-but-unbacked state.
    pub fn uncommit(&mut self, index: usize) {
        if self.committed[index] {
            self.committed[index] = false;
            self.regions[index].reset_to_free();
        }
    }

    /// Commit the next `count` uncommitted regions (in index order),
    /// returning the indices committed. Used to grow the heap toward
    /// `initial_heap_bytes`/on-demand expansion up to `max_heap_bytes`.
    pub fn expand(&mut self, count: usize) -> Vec<usize> {
        let mut expanded = Vec::with_capacity(count);
        for i in 0..self.max_regions {
            if expanded.len() == count {
                break;
            }
            if !self.committed[i] {
                self.commit(i);
                expanded.push(i);
            }
        }
        expanded
    }

    /// Uncommit the given regions, e.g. to shrink the heap after a pause
    /// reclaims them and the sizing policy decides to give memory back.
    pub fn shrink_by(&mut self, indices: &[usize]) {
        for &i in indices {
            self.uncommit(i);
        }
    }

    pub fn committed_count(&self) -> usize {
        self.committed.iter().filter(|&&c| c).count()
    }

    /// The region index containing `addr`, if `addr` falls within the
    /// reserved range.
    pub fn region_index_for(&self, addr: Address) -> Option<usize> {
        if addr < self.heap_base {
            return None;
        }
        let index = conversions::region_index_for(addr, self.heap_base, self.region_size_bytes);
        if index < self.max_regions {
            Some(index)
        } else {
            None
        }
    }

    pub fn heap_region_containing(&self, addr: Address) -> Option<&Region> {
        self.region_index_for(addr).map(|i| &self.regions[i])
    }

    pub fn iter_committed(&self) -> impl Iterator<Item = &Region> {
        self.regions
            .iter()
            .enumerate()
            .filter(move |(i, _)| self.committed[*i])
            .map(|(_, r)| r)
    }

    pub fn iter_committed_mut(&mut self) -> impl Iterator<Item = &mut Region> {
        let committed = &self.committed;
        self.regions
            .iter_mut()
            .enumerate()
            .filter(move |(i, _)| committed[*i])
            .map(|(_, r)| r)
    }
}
