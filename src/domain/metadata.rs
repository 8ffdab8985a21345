use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_YEAR: &str = "Unknown Year";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title cannot be empty")]
    EmptyTitle,
    #[error("filetype cannot be empty")]
    EmptyFiletype,
}

/// Canonical metadata for one audio file.
///
/// Title and filetype are always present; artist, album and year are kept
/// as options so "actually known" checks stay distinguishable from the
/// `Unknown ...` sentinels the accessors hand out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    title: String,
    artists: Option<String>,
    album: Option<String>,
    year: Option<String>,
    filetype: String,
}

impl MetadataRecord {
    /// Validates once on construction; the record is immutable afterwards.
    pub fn new(
        title: &str,
        artists: Option<&str>,
        album: Option<&str>,
        year: Option<&str>,
        filetype: &str,
    ) -> Result<Self, ValidationError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        let filetype = filetype.trim().trim_start_matches('.').to_lowercase();
        if filetype.is_empty() {
            return Err(ValidationError::EmptyFiletype);
        }

        let non_blank = |s: Option<&str>| {
            s.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Ok(Self {
            title: title.to_string(),
            artists: non_blank(artists),
            album: non_blank(album),
            year: non_blank(year),
            filetype,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artists(&self) -> &str {
        self.artists.as_deref().unwrap_or(UNKNOWN_ARTIST)
    }

    pub fn artists_known(&self) -> bool {
        self.artists.is_some()
    }

    pub fn album(&self) -> &str {
        self.album.as_deref().unwrap_or(UNKNOWN_ALBUM)
    }

    pub fn album_known(&self) -> bool {
        self.album.is_some()
    }

    pub fn year(&self) -> &str {
        self.year.as_deref().unwrap_or(UNKNOWN_YEAR)
    }

    pub fn year_known(&self) -> bool {
        self.year.is_some()
    }

    pub fn year_number(&self) -> Option<u32> {
        self.year.as_deref().and_then(|y| y.parse().ok())
    }

    /// e.g. "1990s"
    pub fn decade(&self) -> Option<String> {
        self.year_number().map(|y| format!("{}s", (y / 10) * 10))
    }

    pub fn filetype(&self) -> &str {
        &self.filetype
    }

    pub fn filename(&self) -> String {
        format!("{}.{}", sanitize_name(&self.title), self.filetype)
    }

    /// filetype / artists / [year] / album
    pub fn relative_dir(&self, include_year: bool) -> PathBuf {
        let mut dir = PathBuf::from(&self.filetype);
        dir.push(sanitize_name(self.artists()));
        if include_year {
            dir.push(sanitize_name(self.year()));
        }
        dir.push(sanitize_name(self.album()));
        dir
    }

    pub fn relative_path(&self, include_year: bool) -> PathBuf {
        self.relative_dir(include_year).join(self.filename())
    }

    /// Field-by-field merge, preferring `self`'s known values.
    pub fn merged_with(&self, other: &Self) -> Self {
        Self {
            title: self.title.clone(),
            artists: self.artists.clone().or_else(|| other.artists.clone()),
            album: self.album.clone().or_else(|| other.album.clone()),
            year: self.year.clone().or_else(|| other.year.clone()),
            filetype: self.filetype.clone(),
        }
    }

    pub fn with_artists(&self, artists: &str) -> Self {
        let mut record = self.clone();
        record.artists = Some(artists.to_string());
        record
    }

    pub fn with_title(&self, title: &str) -> Self {
        let mut record = self.clone();
        record.title = title.to_string();
        record
    }
}

impl std::fmt::Display for MetadataRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Title: {} / Artists: {} / Album: {} / Year: {} / Filetype: {}",
            self.title(),
            self.artists(),
            self.album(),
            self.year(),
            self.filetype()
        )
    }
}

/// Extracts a four-digit year from a tag date value like "1997-05-21" or "1997".
pub fn year_from_date(date: &str) -> Option<String> {
    let date = date.trim();
    if let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        return Some(parsed.year().to_string());
    }
    let digits: String = date.chars().take_while(char::is_ascii_digit).collect();
    if digits.len() == 4 { Some(digits) } else { None }
}

/// Makes a name safe to use as a single path segment.
///
/// Deterministic and total over any input; idempotent; the output never
/// contains path separators, control characters or repeated spaces.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '/' | '\\' | ':' | '|' => out.push_str(" - "),
            '?' | '%' | '*' | '<' | '>' => {}
            '"' => out.push('\''),
            '&' => out.push_str("and"),
            '.' => out.push(' '),
            c if c.is_whitespace() || c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
