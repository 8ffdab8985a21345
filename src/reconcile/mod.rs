//! Reconciles on-disk metadata with two independent external lookups.
//!
//! Per file the reconciler builds at most one candidate record per source,
//! then works through a fixed acceptance ladder: cross-source agreement,
//! each source against the seed, or no match at all.

use std::path::Path;
use std::time::Duration;

use crate::domain::metadata::MetadataRecord;
use crate::domain::similarity;
use crate::lookup::{
    FingerprintLookup, RateGate, RecognitionLookup, RecordingCandidate, ReleaseLookup,
};
use crate::tags::TagSummary;

/// Metadata derived purely from on-disk tags and the filename, before any
/// external lookup, plus the flags recording which fields were genuinely
/// tagged as opposed to guessed.
#[derive(Debug, Clone)]
pub struct Seed {
    pub record: MetadataRecord,
    /// title came from tags, not the file stem
    pub title_tagged: bool,
    /// album came from tags, not the parent directory name
    pub album_tagged: bool,
    /// artist came from tags and is not a various/unknown placeholder
    pub artist_trusted: bool,
}

impl Seed {
    pub fn needs_lookup(&self) -> bool {
        // a missing year alone is not worth a lookup
        !self.title_tagged || !self.album_tagged || !self.artist_trusted
    }
}

/// Builds the seed record for a file from its tag summary, falling back to
/// path-derived guesses the way the tags are usually laid out on disk: the
/// file stem stands in for the title, the parent directory for the album,
/// and the album for the artist.
pub fn build_seed(path: &Path, tags: &TagSummary) -> Option<Seed> {
    let stem = path.file_stem()?.to_string_lossy();
    let filetype = path.extension()?.to_string_lossy().to_lowercase();

    let (title, title_tagged) = match &tags.title {
        Some(title) => (title.clone(), true),
        None => (stem.into_owned(), false),
    };

    let parent_name = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned());
    let (album, album_tagged) = match &tags.album {
        Some(album) => (Some(album.clone()), true),
        None => (parent_name, false),
    };

    let artist_trusted = tags
        .artist
        .as_deref()
        .is_some_and(|a| !is_placeholder_artist(a));
    let artists = tags.artist.clone().or_else(|| album.clone());

    let year = tags
        .date
        .as_deref()
        .and_then(crate::domain::metadata::year_from_date);

    let record = MetadataRecord::new(
        &title,
        artists.as_deref(),
        album.as_deref(),
        year.as_deref(),
        &filetype,
    )
    .ok()?;

    Some(Seed {
        record,
        title_tagged,
        album_tagged,
        artist_trusted,
    })
}

/// Known limitation: this substring check also fires on artists whose real
/// name contains the word "unknown" or "various".
fn is_placeholder_artist(artist: &str) -> bool {
    let lower = artist.to_lowercase();
    lower.contains("various") || lower.contains("unknown")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Candidate accepted on both artist and title; the record replaces the
    /// seed wholesale.
    Confident(MetadataRecord),
    /// Only one field passed the threshold; the record is the seed with that
    /// single field applied. `artist_applied` tells the caller whether that
    /// field was the artist, which resolves an untrusted seed artist.
    Partial {
        record: MetadataRecord,
        artist_applied: bool,
    },
    /// No acceptable candidate. The caller keeps the seed and routes the
    /// file to manual sorting if the artist is still untrusted.
    NoMatch,
}

pub struct Reconciler {
    fingerprint: Option<Box<dyn FingerprintLookup>>,
    releases: Option<Box<dyn ReleaseLookup>>,
    recognizer: Option<Box<dyn RecognitionLookup>>,
    threshold: f64,
    update_from_source: bool,
    fingerprint_gate: RateGate,
    recognizer_gate: RateGate,
}

impl Reconciler {
    pub fn new(
        fingerprint: Option<Box<dyn FingerprintLookup>>,
        releases: Option<Box<dyn ReleaseLookup>>,
        recognizer: Option<Box<dyn RecognitionLookup>>,
        threshold: f64,
        update_from_source: bool,
        lookup_delay: Duration,
    ) -> Self {
        Self {
            fingerprint,
            releases,
            recognizer,
            threshold,
            update_from_source,
            fingerprint_gate: RateGate::new(lookup_delay),
            recognizer_gate: RateGate::new(lookup_delay),
        }
    }

    fn has_sources(&self) -> bool {
        self.fingerprint.is_some() || self.recognizer.is_some()
    }

    pub fn reconcile(&mut self, path: &Path, seed: &Seed) -> Outcome {
        if !self.has_sources() {
            if seed.needs_lookup() {
                log::warn!(
                    "metadata for {} is incomplete but no lookup service is configured",
                    path.display()
                );
            }
            return Outcome::NoMatch;
        }
        if !self.update_from_source && !seed.needs_lookup() {
            return Outcome::NoMatch;
        }

        let recognized = self.query_recognizer(path, seed);
        let identified = self.query_fingerprint(path, seed);

        // cross-source agreement first: two independent services landing on
        // the same artist and title is stronger evidence than the seed
        if let (Some(a), Some(b)) = (&identified, &recognized) {
            if self.fields_match(a, b, "between fingerprint and recognition") {
                log::info!(
                    "fingerprint and recognition agree for {}; merging, preferring fingerprint data",
                    path.display()
                );
                return Outcome::Confident(a.merged_with(b));
            }
            log::warn!(
                "fingerprint and recognition disagree for {}; checking each against the seed",
                path.display()
            );
        }

        for (candidate, label) in [(identified, "fingerprint"), (recognized, "recognition")] {
            let Some(candidate) = candidate else { continue };
            match self.accept_against_seed(&candidate, seed, label) {
                Outcome::NoMatch => {
                    log::warn!(
                        "{label} result does not match seed artist/title for {}",
                        path.display()
                    );
                }
                outcome => return outcome,
            }
        }

        Outcome::NoMatch
    }

    /// Source B: at most one candidate, trusted as-is.
    fn query_recognizer(&mut self, path: &Path, seed: &Seed) -> Option<MetadataRecord> {
        if self.recognizer.is_none() {
            return None;
        }
        self.recognizer_gate.wait();
        let recognizer = self.recognizer.as_ref()?;

        let hit = match recognizer.recognize(path) {
            Ok(Some(hit)) => hit,
            Ok(None) => {
                log::info!("no recognition match for {}", path.display());
                return None;
            }
            Err(e) => {
                log::warn!("recognition lookup failed for {}: {e}", path.display());
                return None;
            }
        };

        let record = MetadataRecord::new(
            &hit.title,
            Some(&hit.artist),
            hit.album.as_deref(),
            hit.year.as_deref(),
            seed.record.filetype(),
        );
        match record {
            Ok(record) => {
                log::info!("recognition metadata for {}: {record}", path.display());
                Some(record)
            }
            Err(e) => {
                log::warn!("discarding recognition result for {}: {e}", path.display());
                None
            }
        }
    }

    /// Source A: pick the best-scoring candidate recording, then resolve its
    /// release data. A failed release lookup drops the source entirely.
    fn query_fingerprint(&mut self, path: &Path, seed: &Seed) -> Option<MetadataRecord> {
        if self.fingerprint.is_none() {
            return None;
        }
        self.fingerprint_gate.wait();
        let fingerprint = self.fingerprint.as_ref()?;

        let candidates = match fingerprint.identify(path) {
            Ok(candidates) => candidates,
            Err(e) => {
                log::warn!("fingerprint lookup failed for {}: {e}", path.display());
                return None;
            }
        };

        let best = self.best_candidate(&candidates, seed)?;
        log::info!(
            "fingerprint match for {}: recording {} ({:?} / {:?})",
            path.display(),
            best.recording_id,
            best.title,
            best.artist,
        );

        let release = match &self.releases {
            Some(releases) => match releases.release_for(&best.recording_id) {
                Ok(release) => release,
                Err(e) => {
                    log::warn!(
                        "release lookup failed for recording {}: {e}",
                        best.recording_id
                    );
                    return None;
                }
            },
            None => Default::default(),
        };

        let record = MetadataRecord::new(
            best.title.as_deref().unwrap_or_default(),
            best.artist.as_deref(),
            release.album.as_deref(),
            release.year.as_deref(),
            seed.record.filetype(),
        );
        match record {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("discarding fingerprint result for {}: {e}", path.display());
                None
            }
        }
    }

    /// Combined score weights title similarity over artist similarity 3:2,
    /// since a wrong title misfiles a song more severely than a wrong
    /// artist. Strictly-highest wins; ties leave the earlier candidate out.
    fn best_candidate<'a>(
        &self,
        candidates: &'a [RecordingCandidate],
        seed: &Seed,
    ) -> Option<&'a RecordingCandidate> {
        let mut best: Option<&RecordingCandidate> = None;
        let mut best_combined = 0.0;

        for candidate in candidates {
            let artist_score = similarity::score(
                candidate.artist.as_deref(),
                Some(seed.record.artists()),
            );
            let title_score =
                similarity::score(candidate.title.as_deref(), Some(seed.record.title()));
            let combined = candidate.score + 2.0 * artist_score + 3.0 * title_score;

            if combined > best_combined {
                best_combined = combined;
                best = Some(candidate);
            }
        }

        if let Some(best) = best {
            // normalized by the maximum attainable weight sum, for the log only
            log::info!(
                "best fingerprint candidate {} with combined score {:.0}%",
                best.recording_id,
                best_combined / 6.0 * 100.0
            );
        }
        best
    }

    fn fields_match(&self, candidate: &MetadataRecord, target: &MetadataRecord, context: &str) -> bool {
        self.artist_matches(candidate, target, context) && self.title_matches(candidate, target, context)
    }

    fn artist_matches(&self, candidate: &MetadataRecord, target: &MetadataRecord, context: &str) -> bool {
        let score = similarity::score(Some(candidate.artists()), Some(target.artists()));
        log::info!("artist score {context}: {score:.2}");
        score >= self.threshold
    }

    fn title_matches(&self, candidate: &MetadataRecord, target: &MetadataRecord, context: &str) -> bool {
        let score = similarity::score(Some(candidate.title()), Some(target.title()));
        log::info!("title score {context}: {score:.2}");
        score >= self.threshold
    }

    fn accept_against_seed(
        &self,
        candidate: &MetadataRecord,
        seed: &Seed,
        label: &str,
    ) -> Outcome {
        let context = format!("for {label}");
        let artist_ok = self.artist_matches(candidate, &seed.record, &context);
        let title_ok = self.title_matches(candidate, &seed.record, &context);

        if artist_ok && title_ok {
            // backfill fields the candidate does not know from the seed;
            // a known seed field never overwrites a known candidate field
            return Outcome::Confident(candidate.merged_with(&seed.record));
        }
        if artist_ok {
            return Outcome::Partial {
                record: seed.record.with_artists(candidate.artists()),
                artist_applied: true,
            };
        }
        if title_ok {
            return Outcome::Partial {
                record: seed.record.with_title(candidate.title()),
                artist_applied: false,
            };
        }
        Outcome::NoMatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{LookupError, RecognizedTrack, ReleaseInfo};
    use std::path::PathBuf;

    struct StubFingerprint(Vec<RecordingCandidate>);

    impl FingerprintLookup for StubFingerprint {
        fn identify(&self, _path: &Path) -> Result<Vec<RecordingCandidate>, LookupError> {
            Ok(self.0.clone())
        }
    }

    struct StubReleases(ReleaseInfo);

    impl ReleaseLookup for StubReleases {
        fn release_for(&self, _recording_id: &str) -> Result<ReleaseInfo, LookupError> {
            Ok(self.0.clone())
        }
    }

    struct StubRecognizer(Option<RecognizedTrack>);

    impl RecognitionLookup for StubRecognizer {
        fn recognize(&self, _path: &Path) -> Result<Option<RecognizedTrack>, LookupError> {
            Ok(self.0.clone())
        }
    }

    struct FailingFingerprint;

    impl FingerprintLookup for FailingFingerprint {
        fn identify(&self, _path: &Path) -> Result<Vec<RecordingCandidate>, LookupError> {
            Err(LookupError::Service("boom".to_string()))
        }
    }

    fn seed(title: &str, artist: &str) -> Seed {
        Seed {
            record: MetadataRecord::new(title, Some(artist), None, None, "mp3").unwrap(),
            title_tagged: true,
            album_tagged: false,
            artist_trusted: true,
        }
    }

    fn candidate(score: f64, title: &str, artist: &str) -> RecordingCandidate {
        RecordingCandidate {
            score,
            recording_id: "rid".to_string(),
            title: Some(title.to_string()),
            artist: Some(artist.to_string()),
        }
    }

    fn reconciler(
        fingerprint: Option<Box<dyn FingerprintLookup>>,
        releases: Option<Box<dyn ReleaseLookup>>,
        recognizer: Option<Box<dyn RecognitionLookup>>,
    ) -> Reconciler {
        Reconciler::new(
            fingerprint,
            releases,
            recognizer,
            0.8,
            false,
            Duration::ZERO,
        )
    }

    fn file() -> PathBuf {
        PathBuf::from("song.mp3")
    }

    #[test]
    fn no_sources_is_a_trivial_no_match() {
        let mut r = reconciler(None, None, None);
        assert_eq!(r.reconcile(&file(), &seed("Song", "Band")), Outcome::NoMatch);
    }

    #[test]
    fn complete_seed_skips_lookup_unless_forced() {
        let mut complete = seed("Song", "Band");
        complete.album_tagged = true;
        // a source is configured but the seed is fully known
        let mut r = reconciler(
            Some(Box::new(StubFingerprint(vec![candidate(0.9, "Song", "Band")]))),
            None,
            None,
        );
        assert_eq!(r.reconcile(&file(), &complete), Outcome::NoMatch);

        let mut forced = Reconciler::new(
            Some(Box::new(StubFingerprint(vec![candidate(0.9, "Song", "Band")]))),
            None,
            None,
            0.8,
            true,
            Duration::ZERO,
        );
        assert!(matches!(
            forced.reconcile(&file(), &complete),
            Outcome::Confident(_)
        ));
    }

    #[test]
    fn exact_fingerprint_match_is_confident() {
        let mut r = reconciler(
            Some(Box::new(StubFingerprint(vec![candidate(0.9, "Song", "Band")]))),
            Some(Box::new(StubReleases(ReleaseInfo {
                album: Some("Album".to_string()),
                year: Some("1997".to_string()),
            }))),
            None,
        );

        match r.reconcile(&file(), &seed("Song", "Band")) {
            Outcome::Confident(record) => {
                assert_eq!(record.title(), "Song");
                assert_eq!(record.artists(), "Band");
                assert_eq!(record.album(), "Album");
                assert_eq!(record.year(), "1997");
            }
            other => panic!("expected confident outcome, got {other:?}"),
        }
    }

    #[test]
    fn best_candidate_uses_weighted_combined_score() {
        let candidates = vec![
            candidate(1.0, "Wrong Title Entirely", "Band"),
            candidate(0.5, "Song", "Band"),
        ];
        let r = reconciler(None, None, None);
        let best = r.best_candidate(&candidates, &seed("Song", "Band")).unwrap();
        // the 3x title weight must beat the higher raw fingerprint score
        assert_eq!(best.title.as_deref(), Some("Song"));
    }

    #[test]
    fn empty_candidate_list_yields_none() {
        let r = reconciler(None, None, None);
        assert!(r.best_candidate(&[], &seed("Song", "Band")).is_none());
    }

    #[test]
    fn artist_only_match_is_a_partial_update() {
        let mut r = reconciler(
            Some(Box::new(StubFingerprint(vec![candidate(
                0.9,
                "Totally Different",
                "Band",
            )]))),
            Some(Box::new(StubReleases(ReleaseInfo::default()))),
            None,
        );

        match r.reconcile(&file(), &seed("Song", "Band")) {
            Outcome::Partial {
                record,
                artist_applied,
            } => {
                // the title stays the seed's; only the artist was applied
                assert_eq!(record.title(), "Song");
                assert_eq!(record.artists(), "Band");
                assert!(artist_applied);
            }
            other => panic!("expected partial outcome, got {other:?}"),
        }
    }

    #[test]
    fn agreeing_sources_beat_a_disagreeing_seed() {
        // both sources say the same thing; the seed says something else
        let mut r = reconciler(
            Some(Box::new(StubFingerprint(vec![candidate(
                0.9,
                "Real Title",
                "Real Artist",
            )]))),
            Some(Box::new(StubReleases(ReleaseInfo {
                album: None,
                year: Some("1997".to_string()),
            }))),
            Some(Box::new(StubRecognizer(Some(RecognizedTrack {
                title: "Real Title".to_string(),
                artist: "Real Artist".to_string(),
                album: Some("Real Album".to_string()),
                year: None,
            })))),
        );

        match r.reconcile(&file(), &seed("Mislabeled", "Nobody")) {
            Outcome::Confident(record) => {
                assert_eq!(record.title(), "Real Title");
                assert_eq!(record.artists(), "Real Artist");
                // merged field-by-field: album from recognition, year from fingerprint
                assert_eq!(record.album(), "Real Album");
                assert_eq!(record.year(), "1997");
            }
            other => panic!("expected confident outcome, got {other:?}"),
        }
    }

    #[test]
    fn seed_backfills_candidate_unknowns() {
        let mut incomplete = Seed {
            record: MetadataRecord::new(
                "Song",
                Some("Band"),
                Some("Seed Album"),
                Some("2001"),
                "mp3",
            )
            .unwrap(),
            title_tagged: false,
            album_tagged: true,
            artist_trusted: true,
        };
        incomplete.title_tagged = false;

        let mut r = reconciler(
            Some(Box::new(StubFingerprint(vec![candidate(0.9, "Song", "Band")]))),
            Some(Box::new(StubReleases(ReleaseInfo::default()))),
            None,
        );

        match r.reconcile(&file(), &incomplete) {
            Outcome::Confident(record) => {
                assert_eq!(record.album(), "Seed Album");
                assert_eq!(record.year(), "2001");
            }
            other => panic!("expected confident outcome, got {other:?}"),
        }
    }

    #[test]
    fn source_failure_degrades_to_no_result() {
        let mut r = reconciler(Some(Box::new(FailingFingerprint)), None, None);
        assert_eq!(r.reconcile(&file(), &seed("Song", "Band")), Outcome::NoMatch);
    }

    #[test]
    fn build_seed_falls_back_to_path_parts() {
        let tags = TagSummary::default();
        let seed = build_seed(Path::new("/music/Greatest Hits/Track 01.MP3"), &tags).unwrap();
        assert_eq!(seed.record.title(), "Track 01");
        assert_eq!(seed.record.album(), "Greatest Hits");
        // artist falls back to the album guess
        assert_eq!(seed.record.artists(), "Greatest Hits");
        assert_eq!(seed.record.filetype(), "mp3");
        assert!(!seed.title_tagged);
        assert!(!seed.album_tagged);
        assert!(!seed.artist_trusted);
        assert!(seed.needs_lookup());
    }

    #[test]
    fn build_seed_trusts_real_tags() {
        let tags = TagSummary {
            title: Some("Song".to_string()),
            artist: Some("Band".to_string()),
            album: Some("Album".to_string()),
            date: Some("1997-05-21".to_string()),
        };
        let seed = build_seed(Path::new("/music/x.flac"), &tags).unwrap();
        assert!(seed.title_tagged);
        assert!(seed.album_tagged);
        assert!(seed.artist_trusted);
        assert!(!seed.needs_lookup());
        assert_eq!(seed.record.year(), "1997");
    }

    #[test]
    fn placeholder_artists_are_not_trusted() {
        for artist in ["Various Artists", "unknown", "Unknown Artist"] {
            let tags = TagSummary {
                title: Some("Song".to_string()),
                artist: Some(artist.to_string()),
                album: Some("Album".to_string()),
                date: None,
            };
            let seed = build_seed(Path::new("x.mp3"), &tags).unwrap();
            assert!(!seed.artist_trusted, "{artist} should not be trusted");
        }
    }
}
