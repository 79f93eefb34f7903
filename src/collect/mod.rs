pub mod collection_set;
pub mod evac_failure;

pub use collection_set::{CSetCandidate, CollectionSet, RegionPrediction};
pub use evac_failure::{EvacFailureRecovery, ForwardingTable, PreservedMark, PreservedMarksSet};
