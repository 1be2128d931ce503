//! In-memory store

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use ndarray::Array2;
use crate::error::{FeatNormError, Result};
use crate::processing::StatisticsSet;
use super::{ArrayStore, FrameCountIndex, RecordStore};

#[derive(Debug, Default)]
struct Inner {
    matrices: BTreeMap<String, Array2<f32>>,
    frame_counts: Option<FrameCountIndex>,
    statistics: Option<StatisticsSet>,
}

/// Keeps every artifact in memory, keyed by utterance id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with statistics from an earlier training run
    pub fn with_statistics(statistics: StatisticsSet) -> Self {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.lock() {
            inner.statistics = Some(statistics);
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| FeatNormError::store("Memory store lock poisoned"))
    }

    pub fn matrix(&self, utterance_id: &str) -> Option<Array2<f32>> {
        self.lock().ok()?.matrices.get(utterance_id).cloned()
    }

    pub fn matrix_ids(&self) -> Vec<String> {
        self.lock().map(|inner| inner.matrices.keys().cloned().collect()).unwrap_or_default()
    }

    pub fn matrix_count(&self) -> usize {
        self.lock().map(|inner| inner.matrices.len()).unwrap_or(0)
    }

    pub fn frame_counts(&self) -> Option<FrameCountIndex> {
        self.lock().ok()?.frame_counts.clone()
    }

    pub fn statistics(&self) -> Option<StatisticsSet> {
        self.lock().ok()?.statistics.clone()
    }
}

impl ArrayStore for MemoryStore {
    fn put_matrix(&self, _speaker: &str, utterance_id: &str, matrix: &Array2<f32>) -> Result<()> {
        self.lock()?.matrices.insert(utterance_id.to_string(), matrix.clone());
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn put_frame_counts(&self, index: &FrameCountIndex) -> Result<()> {
        self.lock()?.frame_counts = Some(index.clone());
        Ok(())
    }

    fn put_statistics(&self, statistics: &StatisticsSet) -> Result<()> {
        self.lock()?.statistics = Some(statistics.clone());
        Ok(())
    }

    fn load_statistics(&self) -> Result<Option<StatisticsSet>> {
        Ok(self.lock()?.statistics.clone())
    }
}
