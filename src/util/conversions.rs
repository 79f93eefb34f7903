//! Byte/region/word rounding helpers shared by the heap layout and region
//! bookkeeping code.

use super::address::Address;
use super::constants::*;

/// Round `bytes` up to the next multiple of `region_size_bytes`.
#[inline]
pub fn region_align_up(bytes: usize, region_size_bytes: usize) -> usize {
    (bytes + region_size_bytes - 1) & !(region_size_bytes - 1)
}

/// Round `bytes` down to a multiple of `region_size_bytes`.
#[inline]
pub fn region_align_down(bytes: usize, region_size_bytes: usize) -> usize {
    bytes & !(region_size_bytes - 1)
}

/// Number of whole regions needed to cover `bytes`.
#[inline]
pub fn bytes_to_regions_up(bytes: usize, region_size_bytes: usize) -> usize {
    (bytes + region_size_bytes - 1) / region_size_bytes
}

/// Byte extent of `regions` whole regions.
#[inline]
pub fn regions_to_bytes(regions: usize, region_size_bytes: usize) -> usize {
    regions * region_size_bytes
}

/// The region index that `addr` falls in, given the heap's base address and
/// region size. `addr` must be `>= heap_base`.
#[inline]
pub fn region_index_for(addr: Address, heap_base: Address, region_size_bytes: usize) -> usize {
    (addr - heap_base) / region_size_bytes
}

/// The first address of region `index` within a heap starting at `heap_base`.
#[inline]
pub fn region_start(index: usize, heap_base: Address, region_size_bytes: usize) -> Address {
    heap_base.add(index * region_size_bytes)
}

/// Round `bytes` up to the next whole machine word.
#[inline]
pub fn bytes_to_words_up(bytes: usize) -> usize {
    (bytes + BYTES_IN_WORD - 1) >> LOG_BYTES_IN_WORD
}

/// Round `bytes` up to `MIN_OBJECT_ALIGNMENT`.
#[inline]
pub fn align_allocation_no_fill(bytes: usize) -> usize {
    (bytes + MIN_OBJECT_ALIGNMENT - 1) & !(MIN_OBJECT_ALIGNMENT - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_rounding() {
        let region_size = 2 * BYTES_IN_MBYTE;
        assert_eq!(region_align_up(1, region_size), region_size);
        assert_eq!(region_align_up(region_size, region_size), region_size);
        assert_eq!(region_align_down(region_size + 1, region_size), region_size);
        assert_eq!(bytes_to_regions_up(region_size + 1, region_size), 2);
        assert_eq!(regions_to_bytes(3, region_size), 3 * region_size);
    }

    #[test]
    fn region_index_roundtrip() {
        let base = Address::from_usize(0x1_0000_0000);
        let region_size = 2 * BYTES_IN_MBYTE;
        let addr = base.add(5 * region_size + 17);
        assert_eq!(region_index_for(addr, base, region_size), 5);
        assert_eq!(region_start(5, base, region_size), base.add(5 * region_size));
    }
}
