//! Error Types

use thiserror::Error;

/// Main error type
#[derive(Debug, Clone, Error)]
pub enum FeatNormError {
    #[error("Dimension mismatch for speaker {speaker}: expected {expected}, found {found}")]
    DimensionMismatch { speaker: String, expected: usize, found: usize },

    #[error("Boundary out of range for utterance {utterance_id}: {message}")]
    BoundaryOutOfRange { utterance_id: String, message: String },

    #[error("Cohort {cohort} has no frames")]
    EmptyCohort { cohort: String },

    #[error("Cohort {cohort} has zero variance in dimension {dimension}")]
    ZeroVariance { cohort: String, dimension: usize },

    #[error("Missing statistics for cohort {cohort}: evaluation runs must reuse training statistics")]
    MissingStatistics { cohort: String },

    #[error("No cohort assigned to speaker {speaker}")]
    UnassignedSpeaker { speaker: String },

    #[error("Phase error: {message}")]
    Phase { message: String },

    #[error("Format error: {message}")]
    Format { message: String },

    #[error("Config error: {message}")]
    Config { message: String },

    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Store error: {message}")]
    Store { message: String },
}

impl FeatNormError {
    pub fn boundary<S: Into<String>, M: Into<String>>(utterance_id: S, msg: M) -> Self {
        Self::BoundaryOutOfRange { utterance_id: utterance_id.into(), message: msg.into() }
    }
    pub fn phase<S: Into<String>>(msg: S) -> Self { Self::Phase { message: msg.into() } }
    pub fn format<S: Into<String>>(msg: S) -> Self { Self::Format { message: msg.into() } }
    pub fn config<S: Into<String>>(msg: S) -> Self { Self::Config { message: msg.into() } }
    pub fn io<S: Into<String>>(msg: S) -> Self { Self::Io { message: msg.into() } }
    pub fn store<S: Into<String>>(msg: S) -> Self { Self::Store { message: msg.into() } }

    /// Only local I/O faults may be retried; everything else is terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

pub type Result<T> = std::result::Result<T, FeatNormError>;

impl From<std::io::Error> for FeatNormError {
    fn from(err: std::io::Error) -> Self { Self::io(err.to_string()) }
}
