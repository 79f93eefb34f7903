//! Randomized work-stealing conservation check for `MarkQueueSet` (component
//! C6's queueing machinery): every address pushed is drained exactly once
//! through some combination of local pop, peer steal, and global-stack pop,
//! regardless of which (seeded, reproducible) interleaving of operations a
//! run picks. Grounded on the teacher's `tests/scheduler.rs` random work
//! distribution test and `benches/bulk_meta/bscan.rs`'s seeded-`ChaCha8Rng`
//! idiom for deterministic randomized coverage.

use std::collections::HashSet;

use g1gc::mark::MarkQueueSet;
use g1gc::util::constants::BYTES_IN_WORD;
use g1gc::Address;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn drain_everything(set: &MarkQueueSet, rng: &mut ChaCha8Rng) -> HashSet<Address> {
    let mut drained = HashSet::new();
    loop {
        let mut progressed = false;
        for worker in 0..set.num_workers() {
            while let Some(addr) = set.pop_local(worker) {
                assert!(drained.insert(addr), "address {addr:?} drained twice");
                progressed = true;
            }
            if rng.random_bool(0.5) {
                if let Some(addr) = set.steal_from_peers(worker) {
                    assert!(drained.insert(addr), "address {addr:?} drained twice");
                    progressed = true;
                }
            }
        }
        while let Some(addr) = set.pop_global() {
            assert!(drained.insert(addr), "address {addr:?} drained twice");
            progressed = true;
        }
        if !progressed {
            break;
        }
    }
    drained
}

#[test]
fn every_pushed_address_is_drained_exactly_once_under_random_interleaving() {
    for seed in 0..8u64 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let num_workers = 4;
        let set = MarkQueueSet::new(num_workers);

        let mut expected = HashSet::new();
        for i in 0..2000usize {
            let worker = rng.random_range(0..num_workers);
            let addr = Address::from_usize(0x1_0000_0000 + i * BYTES_IN_WORD);
            set.push_local(worker, addr);
            expected.insert(addr);

            // Interleave partial drains so the run exercises both a fully
            // built-up queue and one drained concurrently with pushes.
            if rng.random_bool(0.1) {
                for worker in 0..num_workers {
                    if let Some(drained) = set.pop_local(worker) {
                        assert!(expected.contains(&drained));
                        expected.remove(&drained);
                    }
                }
            }
        }

        let drained = drain_everything(&set, &mut rng);
        assert!(set.all_empty());
        assert!(!set.has_overflown());
        assert_eq!(drained, expected, "seed {seed}: lost or duplicated an address");
    }
}

#[test]
fn region_stack_replay_survives_random_push_pop_order() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let set = MarkQueueSet::new(1);
    let mut expected = Vec::new();

    for i in 0..50usize {
        let start = Address::from_usize(0x2_0000_0000 + i * 0x1000);
        let end = start.add(0x1000);
        set.push_region(start, end);
        expected.push((start, end));

        if rng.random_bool(0.3) {
            if let Some(popped) = set.pop_region() {
                assert_eq!(popped, expected.pop().unwrap());
            }
        }
    }

    while let Some(popped) = set.pop_region() {
        assert_eq!(popped, expected.pop().unwrap());
    }
    assert!(set.region_stack_is_empty());
    assert!(expected.is_empty());
}
