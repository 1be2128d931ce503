//! Corpus builder
//!
//! Drives segmentation, cohort statistics and normalization across every
//! speaker of a run. Per-speaker work runs on a rayon pool; workers return
//! private results which are merged here in input order.
//!
//! Every run makes a scan pass first (reading, dimension checks,
//! segmentation and, in speaker and utterance scope, variance checks for all
//! speakers), so corrupt inputs abort the batch before anything is written. Speakers are re-read in later passes instead of
//! holding the corpus in memory.

use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};
use ndarray::Array1;
use rayon::prelude::*;

use crate::features::{BoundaryTable, FeatureStore};
use crate::storage::{ArrayStore, FrameCountIndex, RecordStore, RetryPolicy};
use crate::error::{FeatNormError, Result};
use super::cohort::{CohortResolver, GLOBAL_COHORT};
use super::{
    MomentAccumulator, NormalizationMode, NormalizationStatistics, Normalizer, Phase,
    SegmentationConfig, SegmentedSpeaker, Segmenter, StatisticsAccumulator, StatisticsSet,
};

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub mode: NormalizationMode,
    /// Training runs compute and persist cohort statistics
    pub training: bool,
    pub segmentation: SegmentationConfig,
    /// Corpus-wide frame dimension; taken from the first speaker when unset
    pub feature_dim: Option<usize>,
    pub retry: RetryPolicy,
    pub workers: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            mode: NormalizationMode::Global,
            training: true,
            segmentation: SegmentationConfig::default(),
            feature_dim: None,
            retry: RetryPolicy::default(),
            workers: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub speakers: usize,
    pub utterances: usize,
    pub frames: usize,
    pub cohorts: Vec<String>,
    /// Cohort statistics used for normalization (global and gender modes)
    pub statistics: Option<StatisticsSet>,
    pub frame_counts: FrameCountIndex,
    pub processing_time: Duration,
}

/// Scan-pass result of one speaker
#[derive(Debug)]
struct SpeakerScan {
    dim: usize,
    utterances: usize,
    moments: MomentAccumulator,
}

pub struct CorpusBuilder<'a> {
    config: BuilderConfig,
    segmenter: Segmenter,
    features: &'a dyn FeatureStore,
    arrays: &'a dyn ArrayStore,
    records: &'a dyn RecordStore,
    cohorts: Option<&'a dyn CohortResolver>,
    statistics: Option<StatisticsSet>,
    phase: Phase,
}

impl<'a> CorpusBuilder<'a> {
    pub fn new(
        config: BuilderConfig,
        features: &'a dyn FeatureStore,
        arrays: &'a dyn ArrayStore,
        records: &'a dyn RecordStore,
    ) -> Self {
        Self {
            segmenter: Segmenter::new(config.segmentation.clone()),
            config,
            features,
            arrays,
            records,
            cohorts: None,
            statistics: None,
            phase: Phase::CollectingMeans,
        }
    }

    /// Gender assignment, required in gender mode
    pub fn with_cohorts(mut self, resolver: &'a dyn CohortResolver) -> Self {
        self.cohorts = Some(resolver);
        self
    }

    /// Training statistics for evaluation runs. Without them, statistics are
    /// loaded from the record store.
    pub fn with_statistics(mut self, statistics: StatisticsSet) -> Self {
        self.statistics = Some(statistics);
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn run(&mut self, tables: &[BoundaryTable]) -> Result<RunSummary> {
        let start = Instant::now();
        let mode = self.config.mode;
        log::info!("Building corpus: {} speakers, mode {}, {}",
                   tables.len(), mode.name(), if self.config.training { "training" } else { "evaluation" });

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .build()
            .map_err(|e| FeatNormError::config(format!("Cannot build worker pool: {}", e)))?;

        self.check_inputs(tables)?;
        let labels = tables.iter()
            .map(|t| self.cohort_label(t.speaker()))
            .collect::<Result<Vec<_>>>()?;

        // Scan pass: segmentation and frame sums
        self.phase = Phase::CollectingMeans;
        let scans = {
            let this = &*self;
            pool.install(|| {
                tables.par_iter()
                    .map(|table| this.scan_speaker(table))
                    .collect::<Result<Vec<_>>>()
            })?
        };
        let dim = self.corpus_dim(tables, &scans)?;

        let statistics = if mode.uses_cohort_statistics() {
            let set = if self.config.training {
                self.collect_statistics(&pool, tables, &labels, &scans, dim)?
            } else {
                self.training_statistics(&labels, dim)?
            };
            for stats in set.iter() {
                stats.validate()?;
            }
            Some(set)
        } else {
            None
        };

        // Write pass
        self.phase = Phase::Normalizing;
        let written = {
            let this = &*self;
            pool.install(|| {
                tables.par_iter()
                    .zip(labels.par_iter())
                    .map(|(table, label)| this.write_speaker(table, label, statistics.as_ref()))
                    .collect::<Result<Vec<_>>>()
            })?
        };

        let mut frame_counts = FrameCountIndex::new();
        for (id, frames) in written.into_iter().flatten() {
            frame_counts.push(id, frames);
        }
        self.config.retry.run("write frame counts", || self.records.put_frame_counts(&frame_counts))?;

        // Only persisted once every speaker has been written
        if self.config.training {
            if let Some(set) = &statistics {
                self.config.retry.run("write statistics", || self.records.put_statistics(set))?;
            }
        }

        let mut cohorts: Vec<String> = labels.clone();
        cohorts.sort();
        cohorts.dedup();

        let summary = RunSummary {
            speakers: tables.len(),
            utterances: scans.iter().map(|s| s.utterances).sum(),
            frames: frame_counts.total_frames(),
            cohorts,
            statistics,
            frame_counts,
            processing_time: start.elapsed(),
        };
        log::info!("Wrote {} utterances ({} frames) in {:.2}s",
                   summary.utterances, summary.frames, summary.processing_time.as_secs_f64());
        Ok(summary)
    }

    fn check_inputs(&self, tables: &[BoundaryTable]) -> Result<()> {
        let mut seen = HashSet::with_capacity(tables.len());
        for table in tables {
            let speaker = table.speaker();
            if !seen.insert(speaker) {
                return Err(FeatNormError::config(format!("Speaker {} listed twice", speaker)));
            }
            if !self.features.contains(speaker) {
                let id = table.entries()
                    .first()
                    .map(|b| crate::features::utterance_key(speaker, &b.id))
                    .unwrap_or_else(|| speaker.to_string());
                return Err(FeatNormError::boundary(id, format!("speaker {} has no feature stream", speaker)));
            }
        }
        Ok(())
    }

    fn cohort_label(&self, speaker: &str) -> Result<String> {
        match self.config.mode {
            NormalizationMode::Global => Ok(GLOBAL_COHORT.to_string()),
            NormalizationMode::Gender => {
                let resolver = self.cohorts
                    .ok_or_else(|| FeatNormError::config("Gender normalization needs a cohort assignment"))?;
                resolver
                    .cohort_of(speaker)
                    .ok_or_else(|| FeatNormError::UnassignedSpeaker { speaker: speaker.to_string() })
            }
            NormalizationMode::Speaker | NormalizationMode::Utterance => Ok(speaker.to_string()),
        }
    }

    fn load_speaker(&self, table: &BoundaryTable) -> Result<SegmentedSpeaker> {
        let speaker = table.speaker();
        let stream = self.config.retry.run(&format!("read {}", speaker), || self.features.read(speaker))?;
        if let Some(dim) = self.config.feature_dim {
            stream.ensure_dim(dim)?;
        }
        self.segmenter.segment(&stream, table)
    }

    fn scan_speaker(&self, table: &BoundaryTable) -> Result<SpeakerScan> {
        let segmented = self.load_speaker(table)?;

        // Self-contained scopes are checked here so the write pass cannot fail on data
        match self.config.mode {
            NormalizationMode::Speaker => speaker_statistics(&segmented)?.validate()?,
            NormalizationMode::Utterance => {
                for utterance in &segmented.utterances {
                    NormalizationStatistics::from_frames(utterance.id.as_str(), utterance.features.view())?
                        .validate()?;
                }
            }
            NormalizationMode::Global | NormalizationMode::Gender => {}
        }

        Ok(SpeakerScan {
            dim: segmented.moments.dim(),
            utterances: segmented.utterance_count(),
            moments: segmented.moments,
        })
    }

    fn corpus_dim(&self, tables: &[BoundaryTable], scans: &[SpeakerScan]) -> Result<usize> {
        let dim = match (self.config.feature_dim, scans.first()) {
            (Some(dim), _) => dim,
            (None, Some(first)) => first.dim,
            (None, None) => 0,
        };
        for (table, scan) in tables.iter().zip(scans) {
            if scan.dim != dim {
                return Err(FeatNormError::DimensionMismatch {
                    speaker: table.speaker().to_string(),
                    expected: dim,
                    found: scan.dim,
                });
            }
        }
        Ok(dim)
    }

    fn collect_statistics(
        &mut self,
        pool: &rayon::ThreadPool,
        tables: &[BoundaryTable],
        labels: &[String],
        scans: &[SpeakerScan],
        dim: usize,
    ) -> Result<StatisticsSet> {
        let mut accumulator = StatisticsAccumulator::new(dim);
        match self.config.mode {
            NormalizationMode::Global => accumulator.register_cohort(GLOBAL_COHORT)?,
            _ => {
                if let Some(resolver) = self.cohorts {
                    for label in resolver.labels() {
                        accumulator.register_cohort(&label)?;
                    }
                }
            }
        }

        for (scan, label) in scans.iter().zip(labels) {
            accumulator.add_mean_contribution(label, &scan.moments)?;
        }
        accumulator.finalize_means()?;
        self.phase = accumulator.phase();
        log::info!("Cohort means finalized");

        let means = accumulator.means()?;
        let deviations = {
            let this = &*self;
            pool.install(|| {
                tables.par_iter()
                    .zip(labels.par_iter())
                    .map(|(table, label)| this.speaker_deviations(table, &means[label.as_str()]))
                    .collect::<Result<Vec<_>>>()
            })?
        };

        for (partial, label) in deviations.iter().zip(labels) {
            accumulator.add_variance_contribution(label, partial)?;
        }
        self.phase = accumulator.phase();

        let statistics = accumulator.finalize()?;
        accumulator.begin_normalizing()?;
        self.phase = Phase::StatisticsFinalized;
        log::info!("Statistics finalized for {} cohorts", statistics.len());
        Ok(statistics)
    }

    fn speaker_deviations(&self, table: &BoundaryTable, mean: &Array1<f64>) -> Result<MomentAccumulator> {
        let segmented = self.load_speaker(table)?;
        let mut partial = MomentAccumulator::new(mean.len());
        for utterance in &segmented.utterances {
            partial.accumulate_deviations(utterance.features.view(), mean);
        }
        Ok(partial)
    }

    fn training_statistics(&self, labels: &[String], dim: usize) -> Result<StatisticsSet> {
        let set = match &self.statistics {
            Some(set) => Some(set.clone()),
            None => self.config.retry.run("load statistics", || self.records.load_statistics())?,
        };

        let required: BTreeSet<&str> = labels.iter().map(|l| l.as_str()).collect();
        let set = match set {
            Some(set) => set,
            None => {
                let cohort = required.iter().next().copied().unwrap_or(GLOBAL_COHORT);
                return Err(FeatNormError::MissingStatistics { cohort: cohort.to_string() });
            }
        };

        for label in &required {
            let stats = set.require(label)?;
            if stats.dim() != dim {
                return Err(FeatNormError::DimensionMismatch {
                    speaker: label.to_string(),
                    expected: dim,
                    found: stats.dim(),
                });
            }
        }
        log::info!("Using training statistics for {} cohorts", required.len());
        Ok(set)
    }

    fn write_speaker(
        &self,
        table: &BoundaryTable,
        label: &str,
        statistics: Option<&StatisticsSet>,
    ) -> Result<Vec<(String, usize)>> {
        let segmented = self.load_speaker(table)?;
        let speaker = segmented.speaker.as_str();

        let own_stats = match self.config.mode {
            NormalizationMode::Speaker => Some(speaker_statistics(&segmented)?),
            _ => None,
        };
        let shared = match (self.config.mode, statistics) {
            (NormalizationMode::Global | NormalizationMode::Gender, Some(set)) => Some(set.require(label)?),
            (NormalizationMode::Global | NormalizationMode::Gender, None) => {
                return Err(FeatNormError::MissingStatistics { cohort: label.to_string() });
            }
            _ => None,
        };

        let stats = own_stats.as_ref().or(shared);
        let mut written = Vec::with_capacity(segmented.utterances.len());
        for mut utterance in segmented.utterances {
            match stats {
                Some(stats) => Normalizer::normalize(&mut utterance.features, stats)?,
                None => {
                    Normalizer::normalize_by_self(&mut utterance.features, &utterance.id)?;
                }
            }

            self.config.retry.run(&format!("write {}", utterance.id), || {
                self.arrays.put_matrix(speaker, &utterance.id, &utterance.features)
            })?;
            written.push((utterance.id, utterance.features.nrows()));
        }

        log::debug!("Wrote {}: {} utterances", speaker, written.len());
        Ok(written)
    }
}

/// Speaker scope: both passes over the speaker's own utterance frames.
fn speaker_statistics(segmented: &SegmentedSpeaker) -> Result<NormalizationStatistics> {
    let mean = segmented.moments
        .mean()
        .ok_or_else(|| FeatNormError::EmptyCohort { cohort: segmented.speaker.clone() })?;

    let mut deviations = MomentAccumulator::new(mean.len());
    for utterance in &segmented.utterances {
        deviations.accumulate_deviations(utterance.features.view(), &mean);
    }
    let n = deviations.frame_count() as f64;
    let std = deviations.sum_sq_dev().mapv(|v| (v / n).sqrt());

    Ok(NormalizationStatistics::new(segmented.speaker.clone(), segmented.frame_count(), mean, std))
}
