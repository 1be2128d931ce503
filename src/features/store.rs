//! Read-only access to speaker feature streams

use std::collections::HashMap;
use std::path::PathBuf;
use ndarray::Array2;
use crate::error::{FeatNormError, Result};
use super::{FeatureStream, HtkFile};

/// Source of speaker-level feature streams.
///
/// Implementations are shared across worker threads during the per-speaker
/// passes, so reads take `&self`.
pub trait FeatureStore: Send + Sync {
    fn contains(&self, speaker: &str) -> bool;

    fn read(&self, speaker: &str) -> Result<FeatureStream>;
}

/// In-memory streams keyed by speaker.
#[derive(Debug, Default, Clone)]
pub struct MemoryFeatureStore {
    streams: HashMap<String, Array2<f32>>,
}

impl MemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, speaker: S, frames: Array2<f32>) {
        self.streams.insert(speaker.into(), frames);
    }

    pub fn with_stream<S: Into<String>>(mut self, speaker: S, frames: Array2<f32>) -> Self {
        self.insert(speaker, frames);
        self
    }
}

impl FeatureStore for MemoryFeatureStore {
    fn contains(&self, speaker: &str) -> bool {
        self.streams.contains_key(speaker)
    }

    fn read(&self, speaker: &str) -> Result<FeatureStream> {
        self.streams
            .get(speaker)
            .map(|frames| FeatureStream::new(speaker, frames.clone()))
            .ok_or_else(|| FeatNormError::store(format!("Unknown speaker: {}", speaker)))
    }
}

/// HTK files on disk, one per speaker.
#[derive(Debug, Default, Clone)]
pub struct HtkFeatureStore {
    paths: HashMap<String, PathBuf>,
}

impl HtkFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>, P: Into<PathBuf>>(&mut self, speaker: S, path: P) {
        self.paths.insert(speaker.into(), path.into());
    }

    pub fn path(&self, speaker: &str) -> Option<&PathBuf> {
        self.paths.get(speaker)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FeatureStore for HtkFeatureStore {
    fn contains(&self, speaker: &str) -> bool {
        self.paths.contains_key(speaker)
    }

    fn read(&self, speaker: &str) -> Result<FeatureStream> {
        let path = self.paths
            .get(speaker)
            .ok_or_else(|| FeatNormError::store(format!("Unknown speaker: {}", speaker)))?;

        let file = std::fs::read(path)
            .map_err(|e| FeatNormError::io(format!("Cannot read {}: {}", path.display(), e)))?;
        let htk = HtkFile::from_bytes(&file, speaker)?;

        log::debug!("Read {}: {} frames x {} dims", speaker, htk.frame_count(), htk.dim());
        Ok(FeatureStream::new(speaker, htk.data))
    }
}
