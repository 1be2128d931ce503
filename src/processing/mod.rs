//! Segmentation, Statistics and Normalization Pipeline

pub mod segmenter;
pub mod statistics;
pub mod normalizer;
pub mod cohort;
pub mod builder;

pub use segmenter::{Segmenter, SegmentationConfig, SegmentedSpeaker, Utterance};
pub use statistics::{MomentAccumulator, StatisticsAccumulator, Phase};
pub use normalizer::{Normalizer, NormalizationMode, NormalizationStatistics, StatisticsSet};
pub use cohort::{CohortResolver, CohortTable, NamingConvention, GLOBAL_COHORT};
pub use builder::{CorpusBuilder, BuilderConfig, RunSummary};
