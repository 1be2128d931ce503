//! Frame-count index and statistics records (TOML)

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use crate::error::{FeatNormError, Result};
use crate::processing::{NormalizationStatistics, StatisticsSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameCountEntry {
    pub id: String,
    pub frames: usize,
}

/// Ordered `utterance id → frame count` index of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameCountIndex {
    utterances: Vec<FrameCountEntry>,
}

impl FrameCountIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<S: Into<String>>(&mut self, id: S, frames: usize) {
        self.utterances.push(FrameCountEntry { id: id.into(), frames });
    }

    pub fn entries(&self) -> &[FrameCountEntry] {
        &self.utterances
    }

    pub fn get(&self, id: &str) -> Option<usize> {
        self.utterances.iter().find(|e| e.id == id).map(|e| e.frames)
    }

    pub fn total_frames(&self) -> usize {
        self.utterances.iter().map(|e| e.frames).sum()
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| FeatNormError::store(format!("Failed to serialize frame counts: {}", e)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| FeatNormError::store(format!("Failed to parse frame counts: {}", e)))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CohortRecord {
    label: String,
    frames: usize,
    mean: Vec<f64>,
    std: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatisticsFile {
    cohorts: Vec<CohortRecord>,
}

pub fn statistics_to_toml(set: &StatisticsSet) -> Result<String> {
    let file = StatisticsFile {
        cohorts: set.iter()
            .map(|s| CohortRecord {
                label: s.cohort.clone(),
                frames: s.frame_count,
                mean: s.mean.to_vec(),
                std: s.std.to_vec(),
            })
            .collect(),
    };
    toml::to_string_pretty(&file)
        .map_err(|e| FeatNormError::store(format!("Failed to serialize statistics: {}", e)))
}

pub fn statistics_from_toml(content: &str) -> Result<StatisticsSet> {
    let file: StatisticsFile = toml::from_str(content)
        .map_err(|e| FeatNormError::store(format!("Failed to parse statistics: {}", e)))?;

    let mut set = StatisticsSet::new();
    for record in file.cohorts {
        if record.mean.len() != record.std.len() {
            return Err(FeatNormError::store(format!(
                "Cohort {} has {} means but {} deviations",
                record.label, record.mean.len(), record.std.len()
            )));
        }
        set.insert(NormalizationStatistics::new(
            record.label,
            record.frames,
            Array1::from(record.mean),
            Array1::from(record.std),
        ));
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_frame_count_index() {
        let mut index = FrameCountIndex::new();
        index.push("S02_0001", 120);
        index.push("S01_0001", 80);

        assert_eq!(index.len(), 2);
        assert_eq!(index.get("S01_0001"), Some(80));
        assert_eq!(index.total_frames(), 200);

        let parsed = FrameCountIndex::from_toml(&index.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, index);
        // Insertion order survives serialization
        assert_eq!(parsed.entries()[0].id, "S02_0001");
    }

    #[test]
    fn test_statistics_records() {
        let mut set = StatisticsSet::new();
        set.insert(NormalizationStatistics::new("male", 500, array![1.5, -0.25], array![2.0, 0.125]));
        set.insert(NormalizationStatistics::new("female", 300, array![0.5, 0.75], array![1.0, 3.0]));

        let text = statistics_to_toml(&set).unwrap();
        assert!(text.contains("label = \"female\""));

        let parsed = statistics_from_toml(&text).unwrap();
        assert_eq!(parsed, set);
    }

    #[test]
    fn test_inconsistent_record_rejected() {
        let text = "[[cohorts]]\nlabel = \"x\"\nframes = 3\nmean = [0.0, 1.0]\nstd = [1.0]\n";
        assert!(statistics_from_toml(text).is_err());
    }
}
