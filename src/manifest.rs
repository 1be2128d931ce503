//! Corpus manifest
//!
//! A TOML file listing every speaker of a run with its feature file,
//! optional cohort label and utterance boundaries:
//!
//! ```toml
//! [[speakers]]
//! name = "A01F0055"
//! features = "feats/A01F0055.htk"
//! cohort = "female"
//!
//! [[speakers.utterances]]
//! id = "0001"
//! start = 0
//! end = 412
//! transcript = "..."
//! ```
//!
//! Relative feature paths are resolved against the manifest's directory.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::{FeatNormError, Result};
use crate::features::{BoundaryTable, HtkFeatureStore, UtteranceBoundary};
use crate::processing::CohortTable;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub speakers: Vec<SpeakerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerEntry {
    pub name: String,
    pub features: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cohort: Option<String>,
    #[serde(default)]
    pub utterances: Vec<UtteranceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtteranceEntry {
    pub id: String,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub transcript: String,
}

impl Manifest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| FeatNormError::io(format!("Cannot read manifest {}: {}", path.display(), e)))?;
        let mut manifest = Self::from_toml(&content)?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for speaker in &mut manifest.speakers {
            if speaker.features.is_relative() {
                speaker.features = base.join(&speaker.features);
            }
        }
        log::debug!("Loaded manifest {} with {} speakers", path.display(), manifest.speakers.len());
        Ok(manifest)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| FeatNormError::format(format!("Invalid manifest: {}", e)))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| FeatNormError::format(format!("Cannot serialize manifest: {}", e)))
    }

    pub fn len(&self) -> usize {
        self.speakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speakers.is_empty()
    }

    pub fn feature_store(&self) -> HtkFeatureStore {
        let mut store = HtkFeatureStore::new();
        for speaker in &self.speakers {
            store.insert(speaker.name.clone(), speaker.features.clone());
        }
        store
    }

    /// Boundary tables in manifest order
    pub fn boundary_tables(&self) -> Result<Vec<BoundaryTable>> {
        self.speakers
            .iter()
            .map(|speaker| {
                let entries = speaker.utterances
                    .iter()
                    .map(|u| UtteranceBoundary::new(u.id.clone(), u.start, u.end, u.transcript.clone()))
                    .collect();
                BoundaryTable::new(speaker.name.clone(), entries)
            })
            .collect()
    }

    /// Explicit cohort labels; speakers without one are left unassigned.
    pub fn cohort_table(&self) -> CohortTable {
        let mut table = CohortTable::new();
        for speaker in &self.speakers {
            if let Some(cohort) = &speaker.cohort {
                table.assign(speaker.name.clone(), cohort.clone());
            }
        }
        table
    }
}
