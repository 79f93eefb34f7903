//! The capability seam this crate needs from its embedder.
//!
//! Collapsed from the teacher's generic `VM: VMBinding` architecture (a
//! family of associated traits threaded through every type) into a single
//! object-safe trait set, per the design notes' call to collapse
//! inheritance/virtual dispatch into concrete types where a crate has only
//! one collector plan to support. An embedder implements `Binding` and hands
//! `G1Heap` a `&dyn Binding`; nothing about object layout, language runtime,
//! or VM thread model is assumed beyond what's needed to read/write a word,
//! get an object's size, and iterate its references.

use crate::util::{Address, ObjectReference};

/// Object layout queries. The collector never interprets object contents
/// beyond what this trait exposes.
pub trait ObjectModel: Send + Sync {
    /// Total size in bytes of the object at `object`, including its header.
    fn object_size(&self, object: ObjectReference) -> usize;

    /// Invoke `visit` once for every reference field in `object`.
    fn scan_object(&self, object: ObjectReference, visit: &mut dyn FnMut(ObjectReference));

    /// Copy `object` to `dst` (which has at least `object_size(object)` bytes
    /// available) and return a reference to the copy. Used by evacuation.
    fn copy_object(&self, object: ObjectReference, dst: Address) -> ObjectReference;

    /// Read the embedder's opaque header word (identity hash, lock bits, GC
    /// age, ...) for `object`. Preserved before a self-forward is installed so
    /// evacuation-failure recovery can restore it once the pause ends.
    fn mark_word(&self, object: ObjectReference) -> usize;

    /// Overwrite the mark word, e.g. to restore a value a preserved-marks
    /// stack is holding.
    fn set_mark_word(&self, object: ObjectReference, value: usize);
}

/// A single remembered-set entry: a card-sized region of old-gen memory that
/// may contain a pointer into the region being tracked.
pub type CardIndex = usize;

/// Per-region remembered-set storage and scanning. The collector treats
/// remembered sets as opaque; the embedder owns their representation
/// (typically a per-region sparse card-table variant) and is responsible for
/// keeping them populated via write barriers between pauses.
pub trait RememberedSet: Send + Sync {
    /// Iterate the cards currently recorded against `region_index`, calling
    /// `visit` with each card's base address.
    fn scan_cards(&self, region_index: usize, visit: &mut dyn FnMut(Address));

    /// Drop all entries recorded against `region_index`, e.g. because the
    /// region was reclaimed.
    fn clear(&self, region_index: usize);

    /// Record that `card` (an old-gen card address) may point into
    /// `target_region_index`. Called by the embedder's write barrier, not by
    /// the collector itself, but declared here so `G1Heap` can expose a
    /// `record_card` passthrough for bindings that don't want to manage
    /// remembered-set storage directly.
    fn record_card(&self, target_region_index: usize, card: Address);
}

/// Sink for the SATB (snapshot-at-the-beginning) write barrier's
/// pre-write values, buffered by the embedder and drained into the
/// concurrent marker's global queue at a safepoint.
pub trait SatbBarrierSink: Send + Sync {
    /// Called by the embedder's write barrier for the overwritten value of a
    /// reference field, while an SATB cycle is in progress.
    fn enqueue_pre_write_value(&self, old_value: ObjectReference);

    /// Drain one buffered entry for a marking task to trace. Marking tasks
    /// call this at every "regular clock" tick until it returns `None`.
    fn drain_one(&self) -> Option<ObjectReference>;

    /// Whether the sink currently holds entries a marking task hasn't drained
    /// yet. Used for a task's termination check alongside the mark queues.
    fn has_pending(&self) -> bool;
}

/// A SATB sink with nothing buffered. Useful for tests and for embedders
/// that drive the write barrier entirely outside this crate.
#[derive(Default)]
pub struct NullSatbSink;

impl SatbBarrierSink for NullSatbSink {
    fn enqueue_pre_write_value(&self, _old_value: ObjectReference) {}
    fn drain_one(&self) -> Option<ObjectReference> {
        None
    }
    fn has_pending(&self) -> bool {
        false
    }
}

/// Weak reference / finalizer processing, run by the embedder between the
/// marking and sweep phases of a cycle. The collector calls this once
/// liveness is known and before regions are reclaimed.
pub trait WeakRefProcessor: Send + Sync {
    /// Given a liveness predicate, clear or resolve all registered weak
    /// references and return finalizable objects that are now unreachable.
    fn process_weak_refs(&self, is_live: &dyn Fn(ObjectReference) -> bool) -> Vec<ObjectReference>;
}

/// The full set of services an embedder supplies. A heap is constructed with
/// one of these; there is no global/singleton binding instance.
pub trait Binding: Send + Sync {
    type ObjectModel: ObjectModel;
    type RememberedSet: RememberedSet;
    type SatbSink: SatbBarrierSink;
    type WeakRefs: WeakRefProcessor;

    fn object_model(&self) -> &Self::ObjectModel;
    fn remembered_set(&self) -> &Self::RememberedSet;
    fn satb_sink(&self) -> &Self::SatbSink;
    fn weak_refs(&self) -> &Self::WeakRefs;
}
