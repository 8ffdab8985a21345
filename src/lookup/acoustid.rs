//! AcoustID client: fingerprints a file with the external `fpcalc` tool and
//! looks the fingerprint up against the AcoustID web service.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;

use crate::lookup::{FingerprintLookup, LookupError, RecordingCandidate};

const LOOKUP_URL: &str = "https://api.acoustid.org/v2/lookup";

pub struct AcoustidClient {
    api_key: String,
    fpcalc: PathBuf,
    agent: ureq::Agent,
}

impl AcoustidClient {
    pub fn new(api_key: &str, fpcalc: Option<&Path>) -> Self {
        Self {
            api_key: api_key.to_string(),
            fpcalc: fpcalc.unwrap_or(Path::new("fpcalc")).to_path_buf(),
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(5))
                .timeout_read(Duration::from_secs(15))
                .build(),
        }
    }

    fn fingerprint(&self, path: &Path) -> Result<Fingerprint, LookupError> {
        let output = Command::new(&self.fpcalc)
            .arg("-json")
            .arg(path)
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    LookupError::BackendUnavailable(format!(
                        "fpcalc not found at {}",
                        self.fpcalc.display()
                    ))
                } else {
                    LookupError::BackendUnavailable(e.to_string())
                }
            })?;

        if !output.status.success() {
            return Err(LookupError::Fingerprint(format!(
                "fpcalc exited with {} for {}",
                output.status,
                path.display()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| LookupError::Fingerprint(format!("unreadable fpcalc output: {e}")))
    }
}

impl FingerprintLookup for AcoustidClient {
    fn identify(&self, path: &Path) -> Result<Vec<RecordingCandidate>, LookupError> {
        let fingerprint = self.fingerprint(path)?;

        let response: LookupResponse = self
            .agent
            .get(LOOKUP_URL)
            .query("client", &self.api_key)
            .query("meta", "recordings")
            .query("duration", &format!("{:.0}", fingerprint.duration))
            .query("fingerprint", &fingerprint.fingerprint)
            .call()
            .map_err(|e| LookupError::Service(e.to_string()))?
            .into_json()
            .map_err(|e| LookupError::Service(format!("unreadable lookup response: {e}")))?;

        if response.status != "ok" {
            return Err(LookupError::Service(format!(
                "lookup returned status {:?}",
                response.status
            )));
        }

        let mut candidates = Vec::new();
        for result in response.results {
            for recording in result.recordings {
                candidates.push(RecordingCandidate {
                    score: result.score,
                    recording_id: recording.id,
                    title: recording.title,
                    artist: join_artists(&recording.artists),
                });
            }
        }
        Ok(candidates)
    }
}

fn join_artists(artists: &[ArtistCredit]) -> Option<String> {
    if artists.is_empty() {
        return None;
    }
    Some(
        artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join("; "),
    )
}

#[derive(Debug, Deserialize)]
struct Fingerprint {
    duration: f64,
    fingerprint: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    status: String,
    #[serde(default)]
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    score: f64,
    #[serde(default)]
    recordings: Vec<Recording>,
}

#[derive(Debug, Deserialize)]
struct Recording {
    id: String,
    title: Option<String>,
    #[serde(default)]
    artists: Vec<ArtistCredit>,
}

#[derive(Debug, Deserialize)]
struct ArtistCredit {
    name: String,
}
