//! Acoustic recognition client (Source B).
//!
//! Posts the raw audio bytes to a configured recognition endpoint and decodes
//! the track/subtitle/sections payload it answers with. The album name or a
//! release date, when present, hide inside the first section's metadata
//! items.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::metadata::year_from_date;
use crate::lookup::{LookupError, RecognitionLookup, RecognizedTrack};

pub struct HttpRecognizer {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpRecognizer {
    pub fn new(endpoint: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(5))
                // recognition uploads the whole file and waits for analysis
                .timeout_read(Duration::from_secs(30))
                .build(),
            endpoint: endpoint.to_string(),
        }
    }
}

impl RecognitionLookup for HttpRecognizer {
    fn recognize(&self, path: &Path) -> Result<Option<RecognizedTrack>, LookupError> {
        let bytes = std::fs::read(path).map_err(|e| {
            LookupError::Fingerprint(format!("cannot read {}: {e}", path.display()))
        })?;

        let response: RecognizeResponse = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/octet-stream")
            .send_bytes(&bytes)
            .map_err(|e| LookupError::Service(e.to_string()))?
            .into_json()
            .map_err(|e| LookupError::Service(format!("unreadable recognition response: {e}")))?;

        Ok(response.track.map(track_to_hit))
    }
}

fn track_to_hit(track: TrackPayload) -> RecognizedTrack {
    let mut album = None;
    let mut year = None;

    if let Some(section) = track.sections.first() {
        for item in &section.metadata {
            if item.title == "Album" {
                album = Some(item.text.trim().to_string()).filter(|a| !a.is_empty());
                break;
            }
            if item.title.eq_ignore_ascii_case("released") {
                year = year_from_date(&item.text);
                break;
            }
        }
    }

    RecognizedTrack {
        title: track.title.trim().to_string(),
        artist: track.subtitle.trim().to_string(),
        album,
        year,
    }
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    track: Option<TrackPayload>,
}

#[derive(Debug, Deserialize)]
struct TrackPayload {
    title: String,
    /// the artist credit rides in the subtitle field
    subtitle: String,
    #[serde(default)]
    sections: Vec<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    #[serde(default)]
    metadata: Vec<SectionItem>,
}

#[derive(Debug, Deserialize)]
struct SectionItem {
    title: String,
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(body: &str) -> RecognizeResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn no_track_means_no_match() {
        let parsed = payload(r#"{"matches": []}"#);
        assert!(parsed.track.is_none());
    }

    #[test]
    fn album_is_pulled_from_section_metadata() {
        let parsed = payload(
            r#"{"track": {
                "title": " Song ",
                "subtitle": "Band",
                "sections": [{"metadata": [
                    {"title": "Album", "text": "The Album"},
                    {"title": "Released", "text": "1997-05-21"}
                ]}]
            }}"#,
        );
        let hit = track_to_hit(parsed.track.unwrap());
        assert_eq!(hit.title, "Song");
        assert_eq!(hit.artist, "Band");
        assert_eq!(hit.album.as_deref(), Some("The Album"));
        // album wins over the release date when both are present
        assert_eq!(hit.year, None);
    }

    #[test]
    fn release_date_yields_a_year_when_album_is_absent() {
        let parsed = payload(
            r#"{"track": {
                "title": "Song",
                "subtitle": "Band",
                "sections": [{"metadata": [{"title": "Released", "text": "2003"}]}]
            }}"#,
        );
        let hit = track_to_hit(parsed.track.unwrap());
        assert_eq!(hit.album, None);
        assert_eq!(hit.year.as_deref(), Some("2003"));
    }

    #[test]
    fn missing_sections_still_recognize() {
        let parsed = payload(r#"{"track": {"title": "Song", "subtitle": "Band"}}"#);
        let hit = track_to_hit(parsed.track.unwrap());
        assert_eq!(hit.album, None);
        assert_eq!(hit.year, None);
    }
}
