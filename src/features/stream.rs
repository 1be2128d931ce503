//! Speaker feature streams and utterance boundary tables

use std::collections::HashSet;
use ndarray::{Array2, ArrayView1, ArrayView2};
use crate::error::{FeatNormError, Result};

/// Full frame sequence of one speaker, stored as a `(frames × dim)` matrix.
#[derive(Debug, Clone)]
pub struct FeatureStream {
    speaker: String,
    frames: Array2<f32>,
}

impl FeatureStream {
    pub fn new<S: Into<String>>(speaker: S, frames: Array2<f32>) -> Self {
        Self { speaker: speaker.into(), frames }
    }

    /// Build a stream from per-frame vectors, rejecting ragged input.
    pub fn from_frames<S: Into<String>>(speaker: S, frames: &[Vec<f32>], dim: usize) -> Result<Self> {
        let speaker = speaker.into();
        let mut flat = Vec::with_capacity(frames.len() * dim);
        for frame in frames {
            if frame.len() != dim {
                return Err(FeatNormError::DimensionMismatch {
                    speaker,
                    expected: dim,
                    found: frame.len(),
                });
            }
            flat.extend_from_slice(frame);
        }
        let frames = Array2::from_shape_vec((frames.len(), dim), flat)
            .map_err(|e| FeatNormError::format(format!("Cannot shape stream: {}", e)))?;
        Ok(Self { speaker, frames })
    }

    pub fn speaker(&self) -> &str {
        &self.speaker
    }

    pub fn frame_count(&self) -> usize {
        self.frames.nrows()
    }

    pub fn dim(&self) -> usize {
        self.frames.ncols()
    }

    pub fn frame(&self, index: usize) -> Option<ArrayView1<'_, f32>> {
        (index < self.frame_count()).then(|| self.frames.row(index))
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.frames.view()
    }

    /// Check the stream against the corpus-wide dimension.
    pub fn ensure_dim(&self, expected: usize) -> Result<()> {
        if self.dim() != expected {
            return Err(FeatNormError::DimensionMismatch {
                speaker: self.speaker.clone(),
                expected,
                found: self.dim(),
            });
        }
        Ok(())
    }
}

/// One labelled utterance: `[start_frame, end_frame)` plus an opaque transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtteranceBoundary {
    pub id: String,
    pub start_frame: usize,
    pub end_frame: usize,
    pub transcript: String,
}

impl UtteranceBoundary {
    pub fn new<S: Into<String>, T: Into<String>>(id: S, start_frame: usize, end_frame: usize, transcript: T) -> Self {
        Self { id: id.into(), start_frame, end_frame, transcript: transcript.into() }
    }
}

/// Ordered utterance boundaries of one speaker.
#[derive(Debug, Clone)]
pub struct BoundaryTable {
    speaker: String,
    entries: Vec<UtteranceBoundary>,
}

impl BoundaryTable {
    /// Utterance ids must be unique within the speaker.
    /// Speaker and utterance ids name output files, so they must be plain
    /// path components.
    pub fn new<S: Into<String>>(speaker: S, entries: Vec<UtteranceBoundary>) -> Result<Self> {
        let speaker = speaker.into();
        if !is_plain_component(&speaker) {
            return Err(FeatNormError::boundary(speaker.clone(), "speaker name is not a plain file name"));
        }
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !is_plain_component(&entry.id) {
                return Err(FeatNormError::boundary(
                    utterance_key(&speaker, &entry.id),
                    "utterance id is not a plain file name",
                ));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(FeatNormError::boundary(
                    utterance_key(&speaker, &entry.id),
                    "duplicate utterance id",
                ));
            }
        }
        Ok(Self { speaker, entries })
    }

    pub fn speaker(&self) -> &str {
        &self.speaker
    }

    pub fn entries(&self) -> &[UtteranceBoundary] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Non-empty, not `.`/`..`, and free of path separators.
pub fn is_plain_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Corpus-wide utterance key `<speaker>_<local id>`.
pub fn utterance_key(speaker: &str, local_id: &str) -> String {
    format!("{}_{}", speaker, local_id)
}
