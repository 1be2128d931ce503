//! Feature Input Module
//!
//! Speaker-level feature streams, utterance boundary tables and the stores
//! they are read from. HTK parameter files are the supported on-disk format.

pub mod stream;
pub mod htk;
pub mod store;

pub use stream::{FeatureStream, UtteranceBoundary, BoundaryTable, utterance_key, is_plain_component};
pub use htk::{HtkFile, HtkHeader};
pub use store::{FeatureStore, MemoryFeatureStore, HtkFeatureStore};
