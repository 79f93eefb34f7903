//! End-to-end region-lifecycle and humongous-allocation scenarios from
//! `spec.md` §8 ("Boundary behaviors" and end-to-end scenario 2), driven
//! through the public `G1Heap` API against the `common::TestBinding`.

mod common;

use common::TestBinding;
use g1gc::region::alloc_region_manager::humongous_threshold_bytes;
use g1gc::util::constants::BYTES_IN_MBYTE;
use g1gc::{Binding, G1Heap, Options};

fn options_with(region_size_bytes: usize, heap_regions: usize) -> Options {
    let mut options = Options::default();
    options.region_size_bytes.set(region_size_bytes);
    options.initial_heap_bytes.set(region_size_bytes * heap_regions);
    options.max_heap_bytes.set(region_size_bytes * heap_regions);
    options.parallel_workers.set(1);
    options
}

#[test]
fn allocation_at_exactly_the_humongous_threshold_is_not_humongous() {
    let region_size = BYTES_IN_MBYTE;
    let heap = G1Heap::new(options_with(region_size, 2), TestBinding::new());
    let threshold = humongous_threshold_bytes(region_size);

    let addr = heap.alloc(threshold).expect("allocation should succeed");
    let obj = addr.to_object_reference().unwrap();
    heap.binding().object_model().register(obj, threshold);

    let summary = heap.heap_summary();
    assert_eq!(summary.humongous_regions, 0);
    assert_eq!(summary.eden_regions, 1);
}

#[test]
fn allocation_one_byte_over_the_humongous_threshold_is_humongous() {
    let region_size = BYTES_IN_MBYTE;
    let heap = G1Heap::new(options_with(region_size, 2), TestBinding::new());
    let threshold = humongous_threshold_bytes(region_size);

    let addr = heap.alloc(threshold + 1).expect("allocation should succeed");
    let obj = addr.to_object_reference().unwrap();
    heap.binding().object_model().register(obj, threshold + 1);

    let summary = heap.heap_summary();
    assert_eq!(summary.humongous_regions, 1);
    assert_eq!(summary.eden_regions, 0);
    assert_eq!(summary.free_regions, 1);
}

#[test]
fn humongous_object_spanning_two_regions_is_allocated_as_one_contiguous_run() {
    // region_size = 1 MiB; a 1.5 MiB request needs StartsHumongous +
    // ContinuesHumongous (2 regions), per spec.md §8 scenario 2.
    let region_size = BYTES_IN_MBYTE;
    let heap = G1Heap::new(options_with(region_size, 4), TestBinding::new());

    let small = heap.alloc(700 * 1024).expect("700 KiB request should succeed");
    heap.binding().object_model().register(small.to_object_reference().unwrap(), 700 * 1024);
    assert_eq!(heap.heap_summary().humongous_regions, 1);
    assert_eq!(heap.heap_summary().free_regions, 3);

    let large_size = region_size + region_size / 2;
    let large = heap.alloc(large_size).expect("1.5 MiB request should succeed");
    heap.binding().object_model().register(large.to_object_reference().unwrap(), large_size);

    let summary = heap.heap_summary();
    assert_eq!(summary.humongous_regions, 1 + 2);
    assert_eq!(summary.free_regions, 1);
    assert_eq!(summary.eden_regions, 0);
}

#[test]
fn allocation_fails_once_every_region_is_committed_and_full() {
    let region_size = BYTES_IN_MBYTE;
    let heap = G1Heap::new(options_with(region_size, 1), TestBinding::new());

    // Fill the single region with word-aligned 64-byte objects.
    let mut allocated = 0usize;
    while let Some(addr) = heap.alloc(64) {
        heap.binding().object_model().register(addr.to_object_reference().unwrap(), 64);
        allocated += 64;
        if allocated > region_size {
            panic!("allocated past the committed heap without hitting exhaustion");
        }
    }

    // A further humongous request (bigger than the whole heap) must also
    // fail rather than panic.
    assert!(heap.alloc(region_size * 2).is_none());
}
