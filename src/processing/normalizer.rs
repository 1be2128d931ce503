//! Mean/variance normalization of utterance matrices

use std::collections::BTreeMap;
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};
use crate::error::{FeatNormError, Result};
use super::MomentAccumulator;

/// Scope whose statistics normalize an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationMode {
    /// One cohort spanning the whole training corpus
    Global,
    /// One cohort per gender label
    Gender,
    /// Each speaker normalized by its own statistics
    Speaker,
    /// Each utterance normalized by its own statistics
    Utterance,
}

impl NormalizationMode {
    pub fn name(&self) -> &'static str {
        match self {
            NormalizationMode::Global => "global",
            NormalizationMode::Gender => "gender",
            NormalizationMode::Speaker => "speaker",
            NormalizationMode::Utterance => "utterance",
        }
    }

    /// Global and gender modes share statistics across speakers and must
    /// reuse training statistics outside of training.
    pub fn uses_cohort_statistics(&self) -> bool {
        matches!(self, NormalizationMode::Global | NormalizationMode::Gender)
    }
}

/// Finalized `(mean, std)` of one cohort
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationStatistics {
    pub cohort: String,
    pub frame_count: usize,
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

impl NormalizationStatistics {
    pub fn new<S: Into<String>>(cohort: S, frame_count: usize, mean: Array1<f64>, std: Array1<f64>) -> Self {
        Self { cohort: cohort.into(), frame_count, mean, std }
    }

    /// Statistics of a single matrix, both passes over the same frames.
    pub fn from_frames<S: Into<String>>(cohort: S, frames: ArrayView2<f32>) -> Result<Self> {
        let cohort = cohort.into();
        let first = MomentAccumulator::from_frames(frames);
        let mean = first.mean()
            .ok_or_else(|| FeatNormError::EmptyCohort { cohort: cohort.clone() })?;

        let mut second = MomentAccumulator::new(frames.ncols());
        second.accumulate_deviations(frames, &mean);
        let n = second.frame_count() as f64;
        let std = second.sum_sq_dev().mapv(|v| (v / n).sqrt());

        Ok(Self::new(cohort, first.frame_count(), mean, std))
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.std.len() != self.mean.len() {
            return Err(FeatNormError::DimensionMismatch {
                speaker: self.cohort.clone(),
                expected: self.mean.len(),
                found: self.std.len(),
            });
        }
        if let Some(dimension) = self.std.iter().position(|&s| s == 0.0) {
            return Err(FeatNormError::ZeroVariance { cohort: self.cohort.clone(), dimension });
        }
        Ok(())
    }
}

/// Finalized statistics keyed by cohort label, in label order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsSet {
    cohorts: BTreeMap<String, NormalizationStatistics>,
}

impl StatisticsSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stats: NormalizationStatistics) {
        self.cohorts.insert(stats.cohort.clone(), stats);
    }

    pub fn get(&self, cohort: &str) -> Option<&NormalizationStatistics> {
        self.cohorts.get(cohort)
    }

    /// Statistics that a non-training run needs and cannot invent.
    pub fn require(&self, cohort: &str) -> Result<&NormalizationStatistics> {
        self.get(cohort)
            .ok_or_else(|| FeatNormError::MissingStatistics { cohort: cohort.to_string() })
    }

    pub fn labels(&self) -> Vec<String> {
        self.cohorts.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NormalizationStatistics> {
        self.cohorts.values()
    }

    pub fn len(&self) -> usize {
        self.cohorts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cohorts.is_empty()
    }
}

/// Column-wise `(x - mean) / std`.
///
/// Not idempotent: a second application with the same statistics keeps
/// transforming the data.
pub struct Normalizer;

impl Normalizer {
    /// In-place normalization
    pub fn normalize(matrix: &mut Array2<f32>, stats: &NormalizationStatistics) -> Result<()> {
        stats.validate()?;
        if matrix.ncols() != stats.dim() {
            return Err(FeatNormError::DimensionMismatch {
                speaker: stats.cohort.clone(),
                expected: stats.dim(),
                found: matrix.ncols(),
            });
        }

        for mut row in matrix.axis_iter_mut(Axis(0)) {
            Zip::from(&mut row).and(&stats.mean).and(&stats.std).for_each(|x, &m, &s| {
                *x = ((*x as f64 - m) / s) as f32;
            });
        }
        Ok(())
    }

    /// Allocating variant that leaves the input untouched
    pub fn normalized(matrix: ArrayView2<f32>, stats: &NormalizationStatistics) -> Result<Array2<f32>> {
        let mut out = matrix.to_owned();
        Self::normalize(&mut out, stats)?;
        Ok(out)
    }

    /// Utterance scope: the matrix is its own cohort.
    pub fn normalize_by_self(matrix: &mut Array2<f32>, cohort: &str) -> Result<NormalizationStatistics> {
        let stats = NormalizationStatistics::from_frames(cohort, matrix.view())?;
        Self::normalize(matrix, &stats)?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn column_moments(m: &Array2<f32>) -> (Vec<f64>, Vec<f64>) {
        let stats = NormalizationStatistics::from_frames("check", m.view()).unwrap();
        (stats.mean.to_vec(), stats.std.to_vec())
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(NormalizationMode::Gender.name(), "gender");
        assert!(NormalizationMode::Global.uses_cohort_statistics());
        assert!(!NormalizationMode::Utterance.uses_cohort_statistics());
    }

    #[test]
    fn test_normalize_broadcasts_per_column() {
        let stats = NormalizationStatistics::new("c", 4, array![1.0, 10.0], array![2.0, 5.0]);
        let mut m = array![[1.0f32, 10.0], [5.0, 20.0], [-3.0, 0.0]];
        Normalizer::normalize(&mut m, &stats).unwrap();
        assert_eq!(m, array![[0.0f32, 0.0], [2.0, 2.0], [-2.0, -2.0]]);
    }

    #[test]
    fn test_utterance_scope_gives_zero_mean_unit_std() {
        let mut m = array![
            [0.3f32, 120.0, -4.0],
            [1.7, 80.0, -2.5],
            [2.2, 95.0, -9.0],
            [0.9, 110.0, 1.0],
            [1.1, 101.0, -3.0]
        ];
        Normalizer::normalize_by_self(&mut m, "S01_0001").unwrap();

        let (mean, std) = column_moments(&m);
        for j in 0..3 {
            assert!(mean[j].abs() < 1e-6, "mean[{}] = {}", j, mean[j]);
            assert!((std[j] - 1.0).abs() < 1e-5, "std[{}] = {}", j, std[j]);
        }
    }

    #[test]
    fn test_second_application_changes_data() {
        let stats = NormalizationStatistics::new("c", 3, array![2.0], array![4.0]);
        let once = Normalizer::normalized(array![[10.0f32], [6.0]].view(), &stats).unwrap();
        let twice = Normalizer::normalized(once.view(), &stats).unwrap();

        // Normalization is an affine map, not a projection.
        assert_eq!(once, array![[2.0f32], [1.0]]);
        assert_eq!(twice, array![[0.0f32], [-0.25]]);
        assert_ne!(once, twice);
    }

    #[test]
    fn test_zero_variance_rejected() {
        let stats = NormalizationStatistics::new("male", 3, array![1.0, 2.0], array![1.0, 0.0]);
        let mut m = array![[1.0f32, 2.0]];
        match Normalizer::normalize(&mut m, &stats) {
            Err(FeatNormError::ZeroVariance { cohort, dimension }) => {
                assert_eq!(cohort, "male");
                assert_eq!(dimension, 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // Input untouched on failure
        assert_eq!(m, array![[1.0f32, 2.0]]);
    }

    #[test]
    fn test_constant_utterance_is_zero_variance() {
        let mut m = Array2::from_elem((4, 2), 3.0f32);
        assert!(matches!(
            Normalizer::normalize_by_self(&mut m, "S01_0001"),
            Err(FeatNormError::ZeroVariance { .. })
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let stats = NormalizationStatistics::new("c", 1, array![0.0], array![1.0]);
        let mut m = array![[1.0f32, 2.0]];
        assert!(matches!(
            Normalizer::normalize(&mut m, &stats),
            Err(FeatNormError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_statistics_set_require() {
        let mut set = StatisticsSet::new();
        set.insert(NormalizationStatistics::new("female", 1, array![0.0], array![1.0]));
        assert!(set.require("female").is_ok());
        assert!(matches!(
            set.require("male"),
            Err(FeatNormError::MissingStatistics { cohort }) if cohort == "male"
        ));
        assert_eq!(set.labels(), vec!["female".to_string()]);
    }
}
