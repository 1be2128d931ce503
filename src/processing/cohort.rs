//! Speaker to cohort assignment
//!
//! The core never guesses a speaker's gender. Callers pass a resolver: either
//! an explicit table or a configured naming convention.

use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const GLOBAL_COHORT: &str = "global";

/// Maps a speaker name to the label of its gender cohort.
pub trait CohortResolver: Send + Sync {
    fn cohort_of(&self, speaker: &str) -> Option<String>;

    /// Labels expected to be populated. Each becomes a cohort even if no
    /// speaker lands in it.
    fn labels(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Explicit speaker → label table.
#[derive(Debug, Clone, Default)]
pub struct CohortTable {
    assignments: HashMap<String, String>,
}

impl CohortTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign<S: Into<String>, L: Into<String>>(&mut self, speaker: S, label: L) {
        self.assignments.insert(speaker.into(), label.into());
    }

    pub fn with<S: Into<String>, L: Into<String>>(mut self, speaker: S, label: L) -> Self {
        self.assign(speaker, label);
        self
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl CohortResolver for CohortTable {
    fn cohort_of(&self, speaker: &str) -> Option<String> {
        self.assignments.get(speaker).cloned()
    }

    fn labels(&self) -> Vec<String> {
        let unique: BTreeSet<_> = self.assignments.values().cloned().collect();
        unique.into_iter().collect()
    }
}

/// Label taken from the character at a fixed position of the speaker name,
/// e.g. position 3 of `A01M0097` → `M`.
///
/// Corpus-specific; only use it where the naming convention is known to hold.
#[derive(Debug, Clone)]
pub struct NamingConvention {
    position: usize,
    labels: BTreeMap<char, String>,
}

impl NamingConvention {
    pub fn new(position: usize, labels: BTreeMap<char, String>) -> Self {
        Self { position, labels }
    }
}

impl CohortResolver for NamingConvention {
    fn cohort_of(&self, speaker: &str) -> Option<String> {
        speaker
            .chars()
            .nth(self.position)
            .and_then(|c| self.labels.get(&c).cloned())
    }

    fn labels(&self) -> Vec<String> {
        let unique: BTreeSet<_> = self.labels.values().cloned().collect();
        unique.into_iter().collect()
    }
}
