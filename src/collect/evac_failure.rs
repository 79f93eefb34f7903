//! Self-forwarding detection and post-pause recovery when evacuation cannot
//! find copy space for some object (component C9). Grounded on
//! `util/object_forwarding.rs`'s CAS forwarding-bits state machine
//! (`attempt_to_forward`/`spin_and_get_forwarded_object`), collapsed from its
//! header-bit-packed encoding into an explicit concurrent map since this
//! crate's objects have no reserved header bits of their own. The teacher's
//! `policy/region/blockoffsettable.rs` walks a block-offset table to
//! rediscover object starts in the failed region; this crate already knows
//! every object evacuation attempted to copy (each failure is recorded as it
//! happens), so recovery replays that recorded list instead of reconstructing
//! it from a BOT (see DESIGN.md).

use std::collections::HashMap;
use std::sync::Mutex;

use crate::heap::region_table::RegionTable;
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectModel, RememberedSet};

/// One object's forwarding state, keyed by its address. A self-forward is an
/// entry whose value equals its key.
#[derive(Default)]
pub struct ForwardingTable {
    entries: Mutex<HashMap<Address, Address>>,
}

impl ForwardingTable {
    pub fn new() -> Self {
        ForwardingTable::default()
    }

    /// Attempt to install `target` as `object`'s forwarding pointer. Returns
    /// `Ok(())` if this caller won the race (no prior entry existed), or
    /// `Err(existing)` if another worker had already forwarded it. Holding the
    /// table's lock for the whole check-and-insert plays the role of the
    /// teacher's CAS loop; this crate has no header bits to spin on.
    pub fn attempt_to_forward(&self, object: Address, target: Address) -> Result<(), Address> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(&object) {
            Some(&existing) => Err(existing),
            None => {
                entries.insert(object, target);
                Ok(())
            }
        }
    }

    /// Install a self-forward: `object.forwardee = object`.
    pub fn record_self_forward(&self, object: Address) {
        self.entries.lock().unwrap().insert(object, object);
    }

    pub fn forwarding_pointer(&self, object: Address) -> Option<Address> {
        self.entries.lock().unwrap().get(&object).copied()
    }

    pub fn is_self_forwarded(&self, object: Address) -> bool {
        self.forwarding_pointer(object) == Some(object)
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// A mark word preserved before a self-forward overwrote it, so recovery can
/// put it back.
#[derive(Debug, Clone, Copy)]
pub struct PreservedMark {
    pub object: Address,
    pub mark_word: usize,
}

/// Per-worker partitions of preserved mark words. Kept separate rather than
/// merged under one shared lock: each evacuation worker only ever appends to
/// its own partition, so no synchronization is needed until recovery reads
/// all of them back (see DESIGN.md's Open Question decision).
pub struct PreservedMarksSet {
    per_worker: Vec<Vec<PreservedMark>>,
}

impl PreservedMarksSet {
    pub fn new(num_workers: usize) -> Self {
        PreservedMarksSet {
            per_worker: (0..num_workers.max(1)).map(|_| Vec::new()).collect(),
        }
    }

    pub fn push(&mut self, worker_id: usize, mark: PreservedMark) {
        self.per_worker[worker_id].push(mark);
    }

    /// Flatten every worker's partition into one list, consuming them. Called
    /// once recovery starts; a fresh pause starts with fresh partitions.
    pub fn drain_all(&mut self) -> Vec<PreservedMark> {
        self.per_worker.iter_mut().flat_map(|v| v.drain(..)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.per_worker.iter().all(|v| v.is_empty())
    }
}

#[derive(Debug, Clone, Copy)]
struct FailedObject {
    object: Address,
    size: usize,
}

/// Tracks regions tagged `evacuation_failed` and drives their recovery after
/// a pause's evacuation phase.
#[derive(Default)]
pub struct EvacFailureRecovery {
    forwarding: ForwardingTable,
    failed_by_region: Mutex<HashMap<usize, Vec<FailedObject>>>,
    bytes_filled: Mutex<HashMap<usize, usize>>,
}

impl EvacFailureRecovery {
    pub fn new() -> Self {
        EvacFailureRecovery::default()
    }

    pub fn forwarding(&self) -> &ForwardingTable {
        &self.forwarding
    }

    /// Called from the evacuation copy loop when no destination space could
    /// be found for `object` (`size_bytes` long) in `region_index`. Installs
    /// the self-forward and tags the region so it is picked up by `recover`.
    pub fn record_failure(&self, table: &RegionTable, region_index: usize, object: Address, size_bytes: usize) {
        self.forwarding.record_self_forward(object);
        table.at(region_index).set_evacuation_failed(true);
        self.failed_by_region
            .lock()
            .unwrap()
            .entry(region_index)
            .or_default()
            .push(FailedObject {
                object,
                size: size_bytes,
            });
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_by_region.lock().unwrap().is_empty()
    }

    pub fn failed_region_indices(&self) -> Vec<usize> {
        self.failed_by_region.lock().unwrap().keys().copied().collect()
    }

    /// Recover one failed region (pause driver step 4, run per region claimed
    /// by a worker): re-establish each self-forwarded object as live, restore
    /// its preserved mark word, dirty rset cards for its references, account
    /// for the dead-object gaps between surviving objects, and clear the
    /// region's `evacuation_failed` flag. Returning the region to the Old set
    /// is the driver's job once every failed region has been recovered.
    pub fn recover_region<M: ObjectModel, RS: RememberedSet>(
        &self,
        table: &mut RegionTable,
        preserved: &[PreservedMark],
        region_index: usize,
        during_initial_mark: bool,
        object_model: &M,
        remembered_set: &RS,
    ) {
        let mut failed = {
            let mut map = self.failed_by_region.lock().unwrap();
            match map.remove(&region_index) {
                Some(v) => v,
                None => return,
            }
        };
        failed.sort_by_key(|f| f.object.as_usize());

        let region_bottom = table.at(region_index).bottom();
        let mut cursor = region_bottom;
        let mut gap_bytes = 0usize;

        for failed_object in &failed {
            if failed_object.object > cursor {
                gap_bytes += failed_object.object - cursor;
            }

            {
                let region = table.at_mut(region_index);
                if during_initial_mark {
                    region.mark_state_mut().par_mark_next(failed_object.object);
                }
                region.mark_state_mut().par_mark_prev(failed_object.object);
            }

            if let Some(mark) = preserved.iter().find(|m| m.object == failed_object.object) {
                if let Some(object_ref) = ObjectReference::from_raw_address(failed_object.object) {
                    object_model.set_mark_word(object_ref, mark.mark_word);
                }
            }

            if let Some(object_ref) = ObjectReference::from_raw_address(failed_object.object) {
                object_model.scan_object(object_ref, &mut |referent| {
                    if let Some(target_region) = table.region_index_for(referent.to_raw_address()) {
                        remembered_set.record_card(target_region, failed_object.object);
                    }
                });
            }

            cursor = failed_object.object.add(failed_object.size);
        }

        let region_top = table.at(region_index).top();
        if region_top > cursor {
            gap_bytes += region_top - cursor;
        }
        self.bytes_filled.lock().unwrap().insert(region_index, gap_bytes);

        remembered_set.clear(region_index);
        table.at(region_index).set_evacuation_failed(false);
    }

    /// Bytes of dead-object gaps a recovered region needed filler objects
    /// for. Exposed for tracing/statistics; this crate has no real backing
    /// memory to write filler object headers into, so recovery only accounts
    /// for the space rather than materializing fillers.
    pub fn bytes_filled_in(&self, region_index: usize) -> usize {
        self.bytes_filled.lock().unwrap().get(&region_index).copied().unwrap_or(0)
    }

    /// Reset all bookkeeping after every failed region from a pause has been
    /// recovered.
    pub fn clear(&self) {
        self.forwarding.clear();
        self.failed_by_region.lock().unwrap().clear();
        self.bytes_filled.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::BYTES_IN_MBYTE;
    use std::sync::Mutex as StdMutex;

    struct FakeModel {
        mark_words: StdMutex<HashMap<Address, usize>>,
        refs: HashMap<Address, Vec<ObjectReference>>,
    }

    impl ObjectModel for FakeModel {
        fn object_size(&self, _object: ObjectReference) -> usize {
            64
        }
        fn scan_object(&self, object: ObjectReference, visit: &mut dyn FnMut(ObjectReference)) {
            if let Some(refs) = self.refs.get(&object.to_raw_address()) {
                for &r in refs {
                    visit(r);
                }
            }
        }
        fn copy_object(&self, object: ObjectReference, _dst: Address) -> ObjectReference {
            object
        }
        fn mark_word(&self, object: ObjectReference) -> usize {
            *self.mark_words.lock().unwrap().get(&object.to_raw_address()).unwrap_or(&0)
        }
        fn set_mark_word(&self, object: ObjectReference, value: usize) {
            self.mark_words.lock().unwrap().insert(object.to_raw_address(), value);
        }
    }

    struct FakeRSet {
        cards: StdMutex<Vec<(usize, Address)>>,
        cleared: StdMutex<Vec<usize>>,
    }

    impl RememberedSet for FakeRSet {
        fn scan_cards(&self, _region_index: usize, _visit: &mut dyn FnMut(Address)) {}
        fn clear(&self, region_index: usize) {
            self.cleared.lock().unwrap().push(region_index);
        }
        fn record_card(&self, target_region_index: usize, card: Address) {
            self.cards.lock().unwrap().push((target_region_index, card));
        }
    }

    fn table() -> RegionTable {
        let mut t = RegionTable::reserve(Address::from_usize(0x1_0000_0000), 2 * BYTES_IN_MBYTE, 4);
        t.expand(4);
        t
    }

    #[test]
    fn self_forward_is_detected() {
        let fwd = ForwardingTable::new();
        let obj = Address::from_usize(0x1000);
        fwd.record_self_forward(obj);
        assert!(fwd.is_self_forwarded(obj));
    }

    #[test]
    fn attempt_to_forward_loses_race_to_existing_entry() {
        let fwd = ForwardingTable::new();
        let obj = Address::from_usize(0x1000);
        let dst = Address::from_usize(0x9000);
        assert!(fwd.attempt_to_forward(obj, dst).is_ok());
        assert_eq!(fwd.attempt_to_forward(obj, Address::from_usize(0xa000)), Err(dst));
    }

    #[test]
    fn recover_region_marks_live_restores_mark_word_and_dirties_cards() {
        let mut t = table();
        let region_bottom = t.at(0).bottom();
        let failed_obj = region_bottom.add(64);
        let referent_obj = region_bottom.add(256);

        let recovery = EvacFailureRecovery::new();
        recovery.record_failure(&t, 0, failed_obj, 64);
        assert!(recovery.has_failures());

        let model = FakeModel {
            mark_words: StdMutex::new(HashMap::new()),
            refs: HashMap::from([(
                failed_obj,
                vec![ObjectReference::from_raw_address(referent_obj).unwrap()],
            )]),
        };
        let rset = FakeRSet {
            cards: StdMutex::new(Vec::new()),
            cleared: StdMutex::new(Vec::new()),
        };
        let preserved = vec![PreservedMark {
            object: failed_obj,
            mark_word: 0xABCD,
        }];

        recovery.recover_region(&mut t, &preserved, 0, false, &model, &rset);

        assert!(t.at(0).mark_state().prev_is_marked(failed_obj));
        assert!(!t.at(0).evacuation_failed());
        assert_eq!(
            model.mark_word(ObjectReference::from_raw_address(failed_obj).unwrap()),
            0xABCD
        );
        assert_eq!(rset.cards.lock().unwrap().len(), 1);
        assert_eq!(rset.cleared.lock().unwrap(), &vec![0]);
        assert!(!recovery.has_failures());
    }

    #[test]
    fn preserved_marks_set_partitions_by_worker_and_drains_all() {
        let mut set = PreservedMarksSet::new(2);
        set.push(0, PreservedMark {
            object: Address::from_usize(0x1000),
            mark_word: 1,
        });
        set.push(1, PreservedMark {
            object: Address::from_usize(0x2000),
            mark_word: 2,
        });
        assert!(!set.is_empty());
        let all = set.drain_all();
        assert_eq!(all.len(), 2);
        assert!(set.is_empty());
    }
}
