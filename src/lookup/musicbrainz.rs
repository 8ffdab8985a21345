//! MusicBrainz client for resolving a recording id to release data.

use std::time::Duration;

use serde::Deserialize;

use crate::domain::metadata::year_from_date;
use crate::lookup::{LookupError, ReleaseInfo, ReleaseLookup};

const BASE_URL: &str = "https://musicbrainz.org/ws/2";

pub struct MusicBrainzClient {
    agent: ureq::Agent,
    user_agent: String,
}

impl MusicBrainzClient {
    /// MusicBrainz requires a User-Agent identifying the application and a
    /// contact address.
    pub fn new(app_name: &str, app_version: &str, contact: Option<&str>) -> Self {
        let user_agent = match contact {
            Some(contact) => format!("{app_name}/{app_version} ( {contact} )"),
            None => format!("{app_name}/{app_version}"),
        };
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(5))
                .timeout_read(Duration::from_secs(15))
                .build(),
            user_agent,
        }
    }
}

impl ReleaseLookup for MusicBrainzClient {
    fn release_for(&self, recording_id: &str) -> Result<ReleaseInfo, LookupError> {
        let url = format!("{BASE_URL}/recording/{recording_id}?inc=releases&fmt=json");

        let recording: RecordingResponse = self
            .agent
            .get(&url)
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| LookupError::Service(e.to_string()))?
            .into_json()
            .map_err(|e| LookupError::Service(format!("unreadable recording response: {e}")))?;

        // the first listed release is taken as authoritative
        let Some(first) = recording.releases.first() else {
            return Ok(ReleaseInfo::default());
        };

        Ok(ReleaseInfo {
            album: Some(first.title.trim().to_string()).filter(|t| !t.is_empty()),
            year: first.date.as_deref().and_then(year_from_date),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RecordingResponse {
    #[serde(default)]
    releases: Vec<Release>,
}

#[derive(Debug, Deserialize)]
struct Release {
    title: String,
    date: Option<String>,
}
