//! A Garbage-First (G1) style region-based collector core: region
//! lifecycle and allocation, incremental collection-set construction,
//! concurrent SATB marking, evacuation with self-forwarding recovery, and a
//! pause-time-predicting sizing policy.
//!
//! Logically, this crate includes:
//! * [Regions](region/region/struct.Region.html) and the
//!   [region table](heap/region_table/struct.RegionTable.html)/[region
//!   sets](heap/region_sets/struct.RegionSets.html) that track them.
//! * The [allocation path](region/alloc_region_manager/struct.AllocRegionManager.html)
//!   for both mutator bump-allocation and the GC-time PLAB protocol.
//! * [Collection-set construction](collect/collection_set/struct.CollectionSet.html)
//!   and [evacuation-failure recovery](collect/evac_failure/struct.EvacFailureRecovery.html).
//! * [Concurrent marking](mark/concurrent_mark/struct.ConcurrentMark.html).
//! * The [sizing policy](policy/struct.Predictor.html) and IHOP.
//! * The [pause-kind state machine](driver/struct.CollectorState.html) and the
//!   top-level [`G1Heap`] that wires everything together.
//! * The [`Binding`](vm/trait.Binding.html) capability trait an embedder
//!   implements to supply object layout, remembered sets, an SATB sink, and
//!   weak reference processing.

#[macro_use]
pub mod util;
pub mod build_info;
pub mod collect;
pub mod driver;
mod g1_heap;
pub mod heap;
pub mod mark;
pub mod policy;
pub mod region;
pub mod vm;

pub use crate::driver::{CollectorState, PauseKind};
pub use crate::g1_heap::{G1Heap, PauseReport};
pub use crate::util::{Address, ObjectReference, Options};
pub use crate::vm::{Binding, ObjectModel, RememberedSet, SatbBarrierSink, WeakRefProcessor};

#[cfg(feature = "archive_regions")]
pub use crate::g1_heap::ArchiveMapError;
