//! Two-pass cohort statistics
//!
//! Pass 1 folds per-speaker frame sums into cohort means. Pass 2 folds
//! squared deviations from the finalized cohort mean. Accumulation is done
//! in `f64` regardless of the `f32` frame storage.

use std::collections::BTreeMap;
use ndarray::{Array1, ArrayView2, Axis, Zip};
use crate::error::{FeatNormError, Result};
use super::{NormalizationStatistics, StatisticsSet};

/// Partial first/second moment statistics for one speaker or cohort.
///
/// Merging is element-wise addition, so partial results can be combined in
/// any order.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentAccumulator {
    sum: Array1<f64>,
    sum_sq_dev: Array1<f64>,
    frame_count: usize,
}

impl MomentAccumulator {
    pub fn new(dim: usize) -> Self {
        Self {
            sum: Array1::zeros(dim),
            sum_sq_dev: Array1::zeros(dim),
            frame_count: 0,
        }
    }

    pub fn from_frames(frames: ArrayView2<f32>) -> Self {
        let mut acc = Self::new(frames.ncols());
        acc.accumulate_frames(frames);
        acc
    }

    pub fn dim(&self) -> usize {
        self.sum.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn sum(&self) -> &Array1<f64> {
        &self.sum
    }

    pub fn sum_sq_dev(&self) -> &Array1<f64> {
        &self.sum_sq_dev
    }

    /// Pass 1: add frames to the running sum.
    pub fn accumulate_frames(&mut self, frames: ArrayView2<f32>) {
        for row in frames.axis_iter(Axis(0)) {
            Zip::from(&mut self.sum).and(&row).for_each(|s, &x| *s += x as f64);
        }
        self.frame_count += frames.nrows();
    }

    /// Pass 2: add squared deviations from an already finalized mean.
    pub fn accumulate_deviations(&mut self, frames: ArrayView2<f32>, mean: &Array1<f64>) {
        for row in frames.axis_iter(Axis(0)) {
            Zip::from(&mut self.sum_sq_dev).and(&row).and(mean).for_each(|acc, &x, &m| {
                let d = x as f64 - m;
                *acc += d * d;
            });
        }
        self.frame_count += frames.nrows();
    }

    pub fn merge(&mut self, other: &MomentAccumulator) -> Result<()> {
        if other.dim() != self.dim() {
            return Err(FeatNormError::phase(format!(
                "cannot merge accumulators of dimension {} and {}", self.dim(), other.dim()
            )));
        }
        self.sum += &other.sum;
        self.sum_sq_dev += &other.sum_sq_dev;
        self.frame_count += other.frame_count;
        Ok(())
    }

    /// `None` when no frames were accumulated.
    pub fn mean(&self) -> Option<Array1<f64>> {
        (self.frame_count > 0).then(|| &self.sum / self.frame_count as f64)
    }
}

/// Statistics phases. Calls that arrive out of order are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CollectingMeans,
    MeansFinalized,
    CollectingVariances,
    StatisticsFinalized,
    Normalizing,
}

#[derive(Debug, Clone)]
struct CohortMoments {
    mean_pass: MomentAccumulator,
    mean: Option<Array1<f64>>,
    variance_pass: MomentAccumulator,
}

impl CohortMoments {
    fn new(dim: usize) -> Self {
        Self {
            mean_pass: MomentAccumulator::new(dim),
            mean: None,
            variance_pass: MomentAccumulator::new(dim),
        }
    }
}

/// Single-owner reduction of per-speaker partials into cohort statistics.
#[derive(Debug, Clone)]
pub struct StatisticsAccumulator {
    dim: usize,
    phase: Phase,
    cohorts: BTreeMap<String, CohortMoments>,
}

impl StatisticsAccumulator {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            phase: Phase::CollectingMeans,
            cohorts: BTreeMap::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cohorts(&self) -> impl Iterator<Item = &str> {
        self.cohorts.keys().map(|k| k.as_str())
    }

    fn expect_phase(&self, allowed: &[Phase], operation: &str) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(FeatNormError::phase(format!("{} is not allowed in phase {:?}", operation, self.phase)))
        }
    }

    fn cohort(&self, label: &str) -> Result<&CohortMoments> {
        self.cohorts
            .get(label)
            .ok_or_else(|| FeatNormError::phase(format!("unknown cohort {}", label)))
    }

    /// Declare a cohort up front so that an empty bucket is reported at
    /// mean finalization instead of going unnoticed.
    pub fn register_cohort(&mut self, label: &str) -> Result<()> {
        self.expect_phase(&[Phase::CollectingMeans], "register_cohort")?;
        let dim = self.dim;
        self.cohorts.entry(label.to_string()).or_insert_with(|| CohortMoments::new(dim));
        Ok(())
    }

    pub fn add_mean_contribution(&mut self, label: &str, partial: &MomentAccumulator) -> Result<()> {
        self.expect_phase(&[Phase::CollectingMeans], "add_mean_contribution")?;
        let dim = self.dim;
        self.cohorts
            .entry(label.to_string())
            .or_insert_with(|| CohortMoments::new(dim))
            .mean_pass
            .merge(partial)
    }

    pub fn finalize_means(&mut self) -> Result<()> {
        self.expect_phase(&[Phase::CollectingMeans], "finalize_means")?;

        for (label, cohort) in self.cohorts.iter_mut() {
            let mean = cohort.mean_pass
                .mean()
                .ok_or_else(|| FeatNormError::EmptyCohort { cohort: label.clone() })?;
            log::debug!("Cohort {}: mean over {} frames", label, cohort.mean_pass.frame_count());
            cohort.mean = Some(mean);
        }

        self.phase = Phase::MeansFinalized;
        Ok(())
    }

    pub fn mean(&self, label: &str) -> Result<&Array1<f64>> {
        self.expect_phase(&[Phase::MeansFinalized, Phase::CollectingVariances], "mean")?;
        self.cohort(label)?
            .mean
            .as_ref()
            .ok_or_else(|| FeatNormError::phase(format!("mean of cohort {} was never finalized", label)))
    }

    /// Snapshot of all finalized means, handed to variance-pass workers.
    pub fn means(&self) -> Result<BTreeMap<String, Array1<f64>>> {
        self.cohorts
            .keys()
            .map(|label| self.mean(label).map(|m| (label.clone(), m.clone())))
            .collect()
    }

    /// `partial` must hold squared deviations from this cohort's finalized mean.
    pub fn add_variance_contribution(&mut self, label: &str, partial: &MomentAccumulator) -> Result<()> {
        self.expect_phase(
            &[Phase::MeansFinalized, Phase::CollectingVariances],
            "add_variance_contribution",
        )?;
        self.cohorts
            .get_mut(label)
            .ok_or_else(|| FeatNormError::phase(format!("unknown cohort {}", label)))?
            .variance_pass
            .merge(partial)?;
        self.phase = Phase::CollectingVariances;
        Ok(())
    }

    pub fn finalize(&mut self) -> Result<StatisticsSet> {
        self.expect_phase(&[Phase::MeansFinalized, Phase::CollectingVariances], "finalize")?;

        let mut set = StatisticsSet::new();
        for (label, cohort) in &self.cohorts {
            let n = cohort.mean_pass.frame_count();
            let covered = cohort.variance_pass.frame_count();
            if covered != n {
                return Err(FeatNormError::phase(format!(
                    "variance pass of cohort {} covered {} frames, mean pass {}", label, covered, n
                )));
            }
            let mean = cohort.mean
                .clone()
                .ok_or_else(|| FeatNormError::phase(format!("mean of cohort {} was never finalized", label)))?;
            let std = cohort.variance_pass.sum_sq_dev().mapv(|v| (v / n as f64).sqrt());

            log::info!("Cohort {}: {} frames", label, n);
            set.insert(NormalizationStatistics::new(label.clone(), n, mean, std));
        }

        self.phase = Phase::StatisticsFinalized;
        Ok(set)
    }

    pub fn begin_normalizing(&mut self) -> Result<()> {
        self.expect_phase(&[Phase::StatisticsFinalized], "begin_normalizing")?;
        self.phase = Phase::Normalizing;
        Ok(())
    }
}
