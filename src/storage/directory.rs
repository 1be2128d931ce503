//! Directory-backed store
//!
//! Layout under the root:
//!   `<speaker>/<utterance id>.htk`  normalized utterance matrices
//!   `frame_num.toml`                frame-count index
//!   `statistics.toml`               training statistics

use std::fs;
use std::path::{Path, PathBuf};
use ndarray::Array2;
use crate::error::{FeatNormError, Result};
use crate::features::{is_plain_component, HtkFile};
use crate::processing::StatisticsSet;
use super::records::{statistics_from_toml, statistics_to_toml};
use super::{ArrayStore, FrameCountIndex, RecordStore};

pub const FRAME_COUNT_FILE: &str = "frame_num.toml";
pub const STATISTICS_FILE: &str = "statistics.toml";

#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn matrix_path(&self, speaker: &str, utterance_id: &str) -> PathBuf {
        self.root.join(speaker).join(format!("{}.htk", utterance_id))
    }

    pub fn frame_count_path(&self) -> PathBuf {
        self.root.join(FRAME_COUNT_FILE)
    }

    pub fn statistics_path(&self) -> PathBuf {
        self.root.join(STATISTICS_FILE)
    }

    pub fn read_matrix(&self, speaker: &str, utterance_id: &str) -> Result<Array2<f32>> {
        Ok(HtkFile::from_file(self.matrix_path(speaker, utterance_id))?.data)
    }

    pub fn read_frame_counts(&self) -> Result<FrameCountIndex> {
        let path = self.frame_count_path();
        let content = fs::read_to_string(&path)
            .map_err(|e| FeatNormError::io(format!("Cannot read {}: {}", path.display(), e)))?;
        FrameCountIndex::from_toml(&content)
    }

    fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        fs::create_dir_all(&self.root)
            .map_err(|e| FeatNormError::io(format!("Cannot create {}: {}", self.root.display(), e)))?;
        fs::write(path, content)
            .map_err(|e| FeatNormError::io(format!("Cannot write {}: {}", path.display(), e)))
    }
}

impl ArrayStore for DirectoryStore {
    fn put_matrix(&self, speaker: &str, utterance_id: &str, matrix: &Array2<f32>) -> Result<()> {
        if !is_plain_component(speaker) || !is_plain_component(utterance_id) {
            return Err(FeatNormError::store(format!(
                "Refusing to write {}/{} outside {}", speaker, utterance_id, self.root.display()
            )));
        }
        HtkFile::new(matrix.clone())?.save_to_file(self.matrix_path(speaker, utterance_id))
    }
}

impl RecordStore for DirectoryStore {
    fn put_frame_counts(&self, index: &FrameCountIndex) -> Result<()> {
        self.write_text(&self.frame_count_path(), &index.to_toml()?)
    }

    fn put_statistics(&self, statistics: &StatisticsSet) -> Result<()> {
        self.write_text(&self.statistics_path(), &statistics_to_toml(statistics)?)
    }

    fn load_statistics(&self) -> Result<Option<StatisticsSet>> {
        let path = self.statistics_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| FeatNormError::io(format!("Cannot read {}: {}", path.display(), e)))?;
        statistics_from_toml(&content).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::TempDir;
    use crate::processing::NormalizationStatistics;

    #[test]
    fn test_matrix_layout() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(temp_dir.path().join("out"));

        let m = array![[0.5f32, 1.5], [2.5, 3.5]];
        store.put_matrix("S01", "S01_0001", &m).unwrap();

        assert!(temp_dir.path().join("out/S01/S01_0001.htk").exists());
        assert_eq!(store.read_matrix("S01", "S01_0001").unwrap(), m);
    }

    #[test]
    fn test_rejects_unwritable_matrices() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(temp_dir.path().join("out"));

        let m = array![[1.0f32]];
        assert!(matches!(store.put_matrix("..", "x", &m), Err(FeatNormError::Store { .. })));
        assert!(matches!(store.put_matrix("S01", "../../x", &m), Err(FeatNormError::Store { .. })));
        assert!(!temp_dir.path().join("x.htk").exists());

        let wide = Array2::<f32>::zeros((1, 9000));
        assert!(matches!(store.put_matrix("S01", "S01_0001", &wide), Err(FeatNormError::Format { .. })));
        assert!(!store.matrix_path("S01", "S01_0001").exists());
    }

    #[test]
    fn test_records() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(temp_dir.path());

        assert!(store.load_statistics().unwrap().is_none());

        let mut set = StatisticsSet::new();
        set.insert(NormalizationStatistics::new("global", 10, array![1.0, 2.0], array![0.5, 4.0]));
        store.put_statistics(&set).unwrap();
        assert_eq!(store.load_statistics().unwrap(), Some(set));

        let mut index = FrameCountIndex::new();
        index.push("S01_0001", 7);
        store.put_frame_counts(&index).unwrap();
        assert_eq!(store.read_frame_counts().unwrap(), index);
    }
}
