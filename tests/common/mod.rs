//! Shared test-only `Binding` implementation for the end-to-end tests in
//! this directory. There is no real backing object memory here (this crate
//! never calls into a real `mmap`, see `DESIGN.md`), so `TestObjectModel`
//! tracks each live object's size/mark-word/outgoing-references in plain
//! maps keyed by address rather than reading real memory.

use std::collections::HashMap;
use std::sync::Mutex;

use g1gc::vm::NullSatbSink;
use g1gc::{Address, Binding, ObjectModel, ObjectReference, RememberedSet, WeakRefProcessor};

#[derive(Default)]
pub struct TestObjectModel {
    sizes: Mutex<HashMap<Address, usize>>,
    mark_words: Mutex<HashMap<Address, usize>>,
    refs: Mutex<HashMap<Address, Vec<ObjectReference>>>,
}

impl TestObjectModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly-allocated object's size, as the test harness (not
    /// a real write barrier) is the one that knows it.
    pub fn register(&self, object: ObjectReference, size: usize) {
        self.sizes.lock().unwrap().insert(object.to_raw_address(), size);
    }

    /// Register that `object` holds a reference to `referent`, so
    /// `scan_object` reports it during evacuation.
    pub fn add_reference(&self, object: ObjectReference, referent: ObjectReference) {
        self.refs.lock().unwrap().entry(object.to_raw_address()).or_default().push(referent);
    }
}

impl ObjectModel for TestObjectModel {
    fn object_size(&self, object: ObjectReference) -> usize {
        *self
            .sizes
            .lock()
            .unwrap()
            .get(&object.to_raw_address())
            .expect("test object size was never registered")
    }

    fn scan_object(&self, object: ObjectReference, visit: &mut dyn FnMut(ObjectReference)) {
        if let Some(refs) = self.refs.lock().unwrap().get(&object.to_raw_address()) {
            for &r in refs {
                visit(r);
            }
        }
    }

    fn copy_object(&self, object: ObjectReference, dst: Address) -> ObjectReference {
        let size = self.object_size(object);
        self.sizes.lock().unwrap().insert(dst, size);
        if let Some(refs) = self.refs.lock().unwrap().remove(&object.to_raw_address()) {
            self.refs.lock().unwrap().insert(dst, refs);
        }
        ObjectReference::from_raw_address(dst).unwrap()
    }

    fn mark_word(&self, object: ObjectReference) -> usize {
        *self.mark_words.lock().unwrap().get(&object.to_raw_address()).unwrap_or(&0)
    }

    fn set_mark_word(&self, object: ObjectReference, value: usize) {
        self.mark_words.lock().unwrap().insert(object.to_raw_address(), value);
    }
}

#[derive(Default)]
pub struct NullRememberedSet;

impl RememberedSet for NullRememberedSet {
    fn scan_cards(&self, _region_index: usize, _visit: &mut dyn FnMut(Address)) {}
    fn clear(&self, _region_index: usize) {}
    fn record_card(&self, _target_region_index: usize, _card: Address) {}
}

#[derive(Default)]
pub struct NullWeakRefs;

impl WeakRefProcessor for NullWeakRefs {
    fn process_weak_refs(&self, _is_live: &dyn Fn(ObjectReference) -> bool) -> Vec<ObjectReference> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct TestBinding {
    model: TestObjectModel,
    rset: NullRememberedSet,
    satb: NullSatbSink,
    weak: NullWeakRefs,
}

impl TestBinding {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Binding for TestBinding {
    type ObjectModel = TestObjectModel;
    type RememberedSet = NullRememberedSet;
    type SatbSink = NullSatbSink;
    type WeakRefs = NullWeakRefs;

    fn object_model(&self) -> &Self::ObjectModel {
        &self.model
    }
    fn remembered_set(&self) -> &Self::RememberedSet {
        &self.rset
    }
    fn satb_sink(&self) -> &Self::SatbSink {
        &self.satb
    }
    fn weak_refs(&self) -> &Self::WeakRefs {
        &self.weak
    }
}
