//! Reading and writing on-disk audio tags with `lofty`.

use std::path::Path;

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use lofty::tag::{ItemKey, Tag};
use thiserror::Error;

use crate::domain::metadata::MetadataRecord;

#[derive(Debug, Error)]
pub enum TagError {
    #[error("tag I/O failed: {0}")]
    Lofty(#[from] lofty::error::LoftyError),
}

/// Tag fields as found on disk; `None` means the field was not present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSummary {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub date: Option<String>,
}

/// Seam for the tag library, so the driver can be tested without real
/// audio files.
pub trait TagIo {
    fn read(&self, path: &Path) -> Result<TagSummary, TagError>;
    fn write(&self, path: &Path, record: &MetadataRecord) -> Result<(), TagError>;
}

pub struct LoftyTagIo;

impl TagIo for LoftyTagIo {
    fn read(&self, path: &Path) -> Result<TagSummary, TagError> {
        let tagged = lofty::read_from_path(path)?;
        let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
            return Ok(TagSummary::default());
        };

        let non_blank = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
        let date = tag
            .get_string(&ItemKey::RecordingDate)
            .map(str::to_string)
            .or_else(|| tag.year().map(|y| y.to_string()));

        Ok(TagSummary {
            title: non_blank(tag.title().map(|s| s.to_string())),
            artist: non_blank(tag.artist().map(|s| s.to_string())),
            album: non_blank(tag.album().map(|s| s.to_string())),
            date: non_blank(date),
        })
    }

    fn write(&self, path: &Path, record: &MetadataRecord) -> Result<(), TagError> {
        let mut tagged = lofty::read_from_path(path)?;
        if tagged.primary_tag().is_none() {
            let tag_type = tagged.file_type().primary_tag_type();
            tagged.insert_tag(Tag::new(tag_type));
        }
        if let Some(tag) = tagged.primary_tag_mut() {
            tag.set_title(record.title().to_string());
            tag.set_artist(record.artists().to_string());
            tag.set_album(record.album().to_string());
            if let Some(year) = record.year_number() {
                tag.set_year(year);
            }
        }
        tagged.save_to_path(path, WriteOptions::default())?;
        Ok(())
    }
}
