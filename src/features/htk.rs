//! HTK parameter file reading and writing

use std::fs;
use std::path::Path;
use ndarray::Array2;
use crate::error::{FeatNormError, Result};

const HEADER_BYTES: usize = 12;
const COMPRESSED_FLAG: i16 = 0o2000;

/// USER parameter kind
pub const PARM_KIND_USER: i16 = 9;
/// 10 ms in HTK's 100 ns units
pub const DEFAULT_SAMPLE_PERIOD: i32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtkHeader {
    pub n_samples: i32,
    pub sample_period: i32,
    pub sample_size: i16,
    pub parm_kind: i16,
}

impl HtkHeader {
    /// Fails when the shape does not fit the header's integer fields.
    pub fn new(n_samples: usize, dim: usize) -> Result<Self> {
        let n_samples = i32::try_from(n_samples)
            .map_err(|_| FeatNormError::format(format!("Too many frames for HTK: {}", n_samples)))?;
        let sample_size = dim
            .checked_mul(4)
            .and_then(|bytes| i16::try_from(bytes).ok())
            .ok_or_else(|| FeatNormError::format(format!("Frame dimension too large for HTK: {}", dim)))?;
        Ok(Self {
            n_samples,
            sample_period: DEFAULT_SAMPLE_PERIOD,
            sample_size,
            parm_kind: PARM_KIND_USER,
        })
    }

    pub fn dim(&self) -> usize {
        (self.sample_size / 4) as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_samples < 0 {
            return Err(FeatNormError::format(format!("Negative frame count: {}", self.n_samples)));
        }
        if self.sample_size <= 0 || self.sample_size % 4 != 0 {
            return Err(FeatNormError::format(format!(
                "Sample size {} is not a positive multiple of 4", self.sample_size
            )));
        }
        if self.parm_kind & COMPRESSED_FLAG != 0 {
            return Err(FeatNormError::format("Compressed HTK files are not supported"));
        }
        Ok(())
    }

    fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_BYTES {
            return Err(FeatNormError::format(format!(
                "Truncated header: {} bytes", bytes.len()
            )));
        }
        Ok(Self {
            n_samples: i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            sample_period: i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            sample_size: i16::from_be_bytes([bytes[8], bytes[9]]),
            parm_kind: i16::from_be_bytes([bytes[10], bytes[11]]),
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.n_samples.to_be_bytes());
        out.extend_from_slice(&self.sample_period.to_be_bytes());
        out.extend_from_slice(&self.sample_size.to_be_bytes());
        out.extend_from_slice(&self.parm_kind.to_be_bytes());
    }
}

/// Decoded HTK file: header plus `(n_samples × dim)` frames.
#[derive(Debug, Clone)]
pub struct HtkFile {
    pub header: HtkHeader,
    pub data: Array2<f32>,
}

impl HtkFile {
    pub fn new(data: Array2<f32>) -> Result<Self> {
        let header = HtkHeader::new(data.nrows(), data.ncols())?;
        Ok(Self { header, data })
    }

    /// `label` names the stream in dimension errors (usually the speaker).
    pub fn from_bytes(bytes: &[u8], label: &str) -> Result<Self> {
        let header = HtkHeader::parse(bytes)?;
        header.validate()?;

        let dim = header.dim();
        let frames = header.n_samples as usize;
        let payload = &bytes[HEADER_BYTES..];
        let expected = frames * dim * 4;

        if payload.len() != expected {
            // The declared sample size is trusted; report what the payload implies.
            let found = if frames == 0 { 0 } else { payload.len() / 4 / frames };
            return Err(FeatNormError::DimensionMismatch {
                speaker: label.to_string(),
                expected: dim,
                found,
            });
        }

        let values: Vec<f32> = payload
            .chunks_exact(4)
            .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let data = Array2::from_shape_vec((frames, dim), values)
            .map_err(|e| FeatNormError::format(format!("Cannot shape HTK payload: {}", e)))?;

        Ok(Self { header, data })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_BYTES + self.data.len() * 4);
        self.header.write(&mut out);
        for &v in self.data.iter() {
            out.extend_from_slice(&v.to_be_bytes());
        }
        out
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| FeatNormError::io(format!("Cannot read {}: {}", path.display(), e)))?;
        let label = path.file_stem().and_then(|s| s.to_str()).unwrap_or("<unknown>");
        Self::from_bytes(&bytes, label)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| FeatNormError::io(format!("Cannot create {}: {}", parent.display(), e)))?;
        }
        fs::write(path, self.to_bytes())
            .map_err(|e| FeatNormError::io(format!("Cannot write {}: {}", path.display(), e)))
    }

    pub fn frame_count(&self) -> usize {
        self.data.nrows()
    }

    pub fn dim(&self) -> usize {
        self.data.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::TempDir;

    #[test]
    fn test_header_dim() {
        let header = HtkHeader::new(10, 40).unwrap();
        assert_eq!(header.sample_size, 160);
        assert_eq!(header.dim(), 40);
        assert!(header.validate().is_ok());
    }

    #[test]
    fn test_header_rejects_oversized_shapes() {
        assert!(HtkHeader::new(1, 8191).is_ok());
        assert!(matches!(HtkHeader::new(1, 8192), Err(FeatNormError::Format { .. })));
        assert!(matches!(HtkHeader::new(i32::MAX as usize + 1, 2), Err(FeatNormError::Format { .. })));
        assert!(matches!(HtkFile::new(Array2::zeros((1, 9000))), Err(FeatNormError::Format { .. })));
    }

    #[test]
    fn test_header_validation() {
        let mut header = HtkHeader::new(10, 3).unwrap();
        header.sample_size = 10;
        assert!(header.validate().is_err());

        let mut header = HtkHeader::new(10, 3).unwrap();
        header.parm_kind |= COMPRESSED_FLAG;
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("S01.htk");

        let original = HtkFile::new(array![[0.5f32, -1.25], [3.0, 4.5], [1e-3, -7.0]]).unwrap();
        original.save_to_file(&path).unwrap();

        let loaded = HtkFile::from_file(&path).unwrap();
        assert_eq!(loaded.header, original.header);
        assert_eq!(loaded.data, original.data);
    }

    #[test]
    fn test_truncated_header() {
        let result = HtkFile::from_bytes(&[0u8; 7], "S01");
        assert!(matches!(result, Err(FeatNormError::Format { .. })));
    }

    #[test]
    fn test_payload_disagrees_with_declared_dim() {
        let mut bytes = HtkFile::new(array![[1.0f32, 2.0], [3.0, 4.0]]).unwrap().to_bytes();
        bytes.truncate(bytes.len() - 8);

        let result = HtkFile::from_bytes(&bytes, "S01");
        match result {
            Err(FeatNormError::DimensionMismatch { speaker, expected, found }) => {
                assert_eq!(speaker, "S01");
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
