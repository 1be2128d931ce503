//! Utterance segmentation
//!
//! Cuts a speaker's continuous frame stream into per-utterance matrices
//! according to its boundary table, with symmetric padding clipped at the
//! stream edges.

use ndarray::{s, Array2};
use crate::features::{BoundaryTable, FeatureStream, UtteranceBoundary, utterance_key};
use crate::error::{FeatNormError, Result};
use super::MomentAccumulator;

/// Segmentation configuration
#[derive(Debug, Clone, Default)]
pub struct SegmentationConfig {
    /// Frames of context added on each side of a labelled boundary
    pub pad_frames: usize,
}

/// One utterance cut out of a speaker stream
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Position in the speaker's boundary table
    pub index: usize,
    /// Corpus-wide key, `<speaker>_<local id>`
    pub id: String,
    pub start_frame: usize,
    pub end_frame: usize,
    pub transcript: String,
    pub features: Array2<f32>,
}

impl Utterance {
    pub fn frame_count(&self) -> usize {
        self.features.nrows()
    }
}

/// Segmenter output for one speaker
#[derive(Debug, Clone)]
pub struct SegmentedSpeaker {
    pub speaker: String,
    pub utterances: Vec<Utterance>,
    /// Frame sum and count over every emitted utterance frame
    pub moments: MomentAccumulator,
}

impl SegmentedSpeaker {
    pub fn frame_count(&self) -> usize {
        self.moments.frame_count()
    }

    pub fn utterance_count(&self) -> usize {
        self.utterances.len()
    }
}

/// Boundary-table driven segmenter
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmentationConfig,
}

impl Segmenter {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn with_padding(pad_frames: usize) -> Self {
        Self::new(SegmentationConfig { pad_frames })
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Emitted range `[max(0, start - pad), min(len, end + pad))`.
    pub fn padded_range(&self, boundary: &UtteranceBoundary, stream_len: usize) -> (usize, usize) {
        let pad = self.config.pad_frames;
        let start = boundary.start_frame.saturating_sub(pad);
        let end = boundary.end_frame.saturating_add(pad).min(stream_len);
        (start, end)
    }

    /// Segment one speaker. Each utterance is an independent copy, so padded
    /// windows may overlap.
    pub fn segment(&self, stream: &FeatureStream, table: &BoundaryTable) -> Result<SegmentedSpeaker> {
        let speaker = stream.speaker();
        if table.speaker() != speaker {
            return Err(FeatNormError::boundary(
                table.speaker(),
                format!("boundary table does not belong to stream {}", speaker),
            ));
        }

        let stream_len = stream.frame_count();
        let frames = stream.view();
        let mut moments = MomentAccumulator::new(stream.dim());
        let mut utterances = Vec::with_capacity(table.len());

        for (index, boundary) in table.entries().iter().enumerate() {
            let id = utterance_key(speaker, &boundary.id);

            if boundary.start_frame > boundary.end_frame || boundary.end_frame > stream_len {
                return Err(FeatNormError::boundary(id, format!(
                    "labelled range [{}, {}) lies outside stream of {} frames",
                    boundary.start_frame, boundary.end_frame, stream_len
                )));
            }

            let (start, end) = self.padded_range(boundary, stream_len);
            if start >= end {
                return Err(FeatNormError::boundary(id, format!(
                    "empty range [{}, {}) after padding", start, end
                )));
            }

            let features = frames.slice(s![start..end, ..]).to_owned();
            moments.accumulate_frames(features.view());

            utterances.push(Utterance {
                index,
                id,
                start_frame: start,
                end_frame: end,
                transcript: boundary.transcript.clone(),
                features,
            });
        }

        log::debug!("Segmented {}: {} utterances, {} frames",
                    speaker, utterances.len(), moments.frame_count());

        Ok(SegmentedSpeaker {
            speaker: speaker.to_string(),
            utterances,
            moments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_stream(speaker: &str, len: usize) -> FeatureStream {
        let frames = Array2::from_shape_fn((len, 2), |(i, j)| (i * 10 + j) as f32);
        FeatureStream::new(speaker, frames)
    }

    fn table(speaker: &str, ranges: &[(usize, usize)]) -> BoundaryTable {
        let entries = ranges.iter().enumerate()
            .map(|(i, &(s, e))| UtteranceBoundary::new(format!("{:04}", i + 1), s, e, format!("utt {}", i)))
            .collect();
        BoundaryTable::new(speaker, entries).unwrap()
    }

    #[test]
    fn test_no_padding_exact_range() {
        let stream = ramp_stream("S01", 20);
        let segmented = Segmenter::default()
            .segment(&stream, &table("S01", &[(2, 5), (8, 14)]))
            .unwrap();

        assert_eq!(segmented.utterance_count(), 2);
        let first = &segmented.utterances[0];
        assert_eq!((first.start_frame, first.end_frame), (2, 5));
        assert_eq!(first.frame_count(), 3);
        assert_eq!(first.features[[0, 1]], 21.0);
        assert_eq!(first.transcript, "utt 0");
        assert_eq!(segmented.utterances[1].frame_count(), 6);
        assert_eq!(segmented.frame_count(), 9);
    }

    #[test]
    fn test_padding_clipped_at_edges() {
        let stream = ramp_stream("S01", 20);
        let segmenter = Segmenter::with_padding(3);
        let segmented = segmenter
            .segment(&stream, &table("S01", &[(1, 4), (9, 11), (15, 19)]))
            .unwrap();

        let ranges: Vec<_> = segmented.utterances.iter()
            .map(|u| (u.start_frame, u.end_frame))
            .collect();
        assert_eq!(ranges, vec![(0, 7), (6, 14), (12, 20)]);
        for u in &segmented.utterances {
            assert_eq!(u.frame_count(), u.end_frame - u.start_frame);
        }
    }

    #[test]
    fn test_overlapping_windows_are_independent() {
        let stream = ramp_stream("S01", 10);
        let mut segmented = Segmenter::with_padding(2)
            .segment(&stream, &table("S01", &[(2, 4), (5, 7)]))
            .unwrap();

        // Frames 3..6 belong to both windows.
        segmented.utterances[0].features.fill(0.0);
        assert_eq!(segmented.utterances[1].features[[0, 0]], 30.0);
    }

    #[test]
    fn test_keys_and_order() {
        let stream = ramp_stream("A01M0097", 30);
        let segmented = Segmenter::default()
            .segment(&stream, &table("A01M0097", &[(20, 25), (0, 5), (10, 12)]))
            .unwrap();

        let ids: Vec<_> = segmented.utterances.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["A01M0097_0001", "A01M0097_0002", "A01M0097_0003"]);
        let indices: Vec<_> = segmented.utterances.iter().map(|u| u.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_boundary_is_an_error() {
        let stream = ramp_stream("S01", 20);
        let err = Segmenter::default()
            .segment(&stream, &table("S01", &[(2, 5), (7, 7)]))
            .unwrap_err();

        match err {
            FeatNormError::BoundaryOutOfRange { utterance_id, .. } => assert_eq!(utterance_id, "S01_0002"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_boundary_past_stream_end() {
        let stream = ramp_stream("S01", 10);
        let result = Segmenter::with_padding(5).segment(&stream, &table("S01", &[(8, 12)]));
        assert!(matches!(result, Err(FeatNormError::BoundaryOutOfRange { .. })));
    }

    #[test]
    fn test_sum_matches_emitted_frames() {
        let stream = FeatureStream::new("S01", Array2::from_elem((6, 1), 2.0f32));
        let segmented = Segmenter::default()
            .segment(&stream, &table("S01", &[(0, 2), (3, 6)]))
            .unwrap();

        assert_eq!(segmented.moments.frame_count(), 5);
        assert_eq!(segmented.moments.sum()[0], 10.0);
    }

    #[test]
    fn test_mismatched_table() {
        let stream = ramp_stream("S01", 10);
        let result = Segmenter::default().segment(&stream, &table("S02", &[(0, 2)]));
        assert!(result.is_err());
    }
}
