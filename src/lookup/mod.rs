//! External identification services, behind traits so the reconciler can be
//! exercised without network access.

use std::path::Path;
use std::time::{Duration, Instant};

use thiserror::Error;

pub mod acoustid;
pub mod musicbrainz;
pub mod recognition;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("fingerprint computation failed: {0}")]
    Fingerprint(String),

    #[error("service request failed: {0}")]
    Service(String),
}

/// One ranked result of a fingerprint identification.
#[derive(Debug, Clone)]
pub struct RecordingCandidate {
    /// fingerprint confidence in [0, 1]
    pub score: f64,
    pub recording_id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
}

/// Release data looked up for a recording id.
#[derive(Debug, Clone, Default)]
pub struct ReleaseInfo {
    pub album: Option<String>,
    pub year: Option<String>,
}

/// A single hit from the acoustic recognition service.
#[derive(Debug, Clone)]
pub struct RecognizedTrack {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub year: Option<String>,
}

/// Source A: fingerprint-based recording identification.
pub trait FingerprintLookup {
    fn identify(&self, path: &Path) -> Result<Vec<RecordingCandidate>, LookupError>;
}

/// Recording id -> release metadata.
pub trait ReleaseLookup {
    fn release_for(&self, recording_id: &str) -> Result<ReleaseInfo, LookupError>;
}

/// Source B: acoustic recognition, at most one candidate.
pub trait RecognitionLookup {
    fn recognize(&self, path: &Path) -> Result<Option<RecognizedTrack>, LookupError>;
}

/// Enforces a minimum delay between calls to one upstream service.
///
/// The wait is a plain blocking sleep, paid once per call regardless of the
/// call's outcome.
pub struct RateGate {
    min_gap: Duration,
    last_call: Option<Instant>,
}

impl RateGate {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last_call: None,
        }
    }

    pub fn wait(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_gap {
                std::thread::sleep(self.min_gap - elapsed);
            }
        }
        self.last_call = Some(Instant::now());
    }
}
