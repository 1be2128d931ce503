//! Output Storage Module
//!
//! Sinks for normalized utterance matrices, the frame-count index and
//! training statistics. Matrix writes happen concurrently from the write
//! pass, one key per utterance.

pub mod retry;
pub mod records;
pub mod memory;
pub mod directory;

use ndarray::Array2;
use crate::error::Result;
use crate::processing::StatisticsSet;

pub use retry::RetryPolicy;
pub use records::{FrameCountEntry, FrameCountIndex};
pub use memory::MemoryStore;
pub use directory::DirectoryStore;

/// Per-utterance feature matrices
pub trait ArrayStore: Send + Sync {
    fn put_matrix(&self, speaker: &str, utterance_id: &str, matrix: &Array2<f32>) -> Result<()>;
}

/// Run-level records
pub trait RecordStore: Send + Sync {
    fn put_frame_counts(&self, index: &FrameCountIndex) -> Result<()>;

    fn put_statistics(&self, statistics: &StatisticsSet) -> Result<()>;

    /// `None` when no training run has persisted statistics here.
    fn load_statistics(&self) -> Result<Option<StatisticsSet>>;
}
