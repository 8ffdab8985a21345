//! Batch driver: walks the source trees bottom-up, reconciles metadata per
//! file and copies each file to its canonical destination.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use crate::config::{DestConfig, SourceConfig};
use crate::domain::metadata::MetadataRecord;
use crate::interrupt::CancelFlag;
use crate::progress::ProgressLog;
use crate::reconcile::{Outcome, Reconciler, Seed, build_seed};
use crate::tags::TagIo;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "ogg", "aac", "opus", "wma"];

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Report {
    /// audio files looked at this run
    pub processed: usize,
    pub copied: usize,
    /// skipped because already done or already present at the destination
    pub skipped: usize,
    /// copied, but under the manual-sorting label
    pub unsorted: usize,
    pub failed: usize,
    pub interrupted: bool,
}

enum Disposition {
    Copied { unsorted: bool },
    AlreadyAtDestination,
}

pub struct Organizer {
    dest: DestConfig,
    tags: Box<dyn TagIo>,
    reconciler: Reconciler,
    progress: Option<ProgressLog>,
    cancel: CancelFlag,
}

impl Organizer {
    pub fn new(
        dest: DestConfig,
        tags: Box<dyn TagIo>,
        reconciler: Reconciler,
        progress: Option<ProgressLog>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            dest,
            tags,
            reconciler,
            progress,
            cancel,
        }
    }

    /// Processes every configured source root sequentially, one file at a
    /// time. Walks contents-first so a directory is only marked done after
    /// everything beneath it has been resolved.
    pub fn run(&mut self, source: &SourceConfig) -> anyhow::Result<Report> {
        let mut report = Report::default();
        let bar = progress_bar(count_audio_files(source));

        'roots: for root in &source.roots {
            if self.check_done(root) {
                log::info!("skipping already processed source root {}", root.display());
                continue;
            }

            let walker = WalkDir::new(root)
                .contents_first(true)
                .into_iter()
                .filter_entry(|entry| !is_ignored(entry.path(), &source.ignored_dirs));
            for entry in walker {
                if self.cancel.cancelled() {
                    log::warn!("interrupted; stopping after the last completed file");
                    report.interrupted = true;
                    break 'roots;
                }

                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::warn!("error while walking {}, skipping an entry: {e}", root.display());
                        continue;
                    }
                };
                let path = entry.path();

                if entry.file_type().is_dir() {
                    // contents-first ordering: everything beneath was visited
                    self.mark_done(path, None);
                    continue;
                }

                if !is_audio_file(path) {
                    log::debug!("skipping non-audio file {}", path.display());
                    continue;
                }

                bar.inc(1);
                if self.check_done(path) {
                    log::info!("skipping already processed file {}", path.display());
                    report.skipped += 1;
                    continue;
                }

                bar.set_message(path.display().to_string());
                report.processed += 1;
                match self.process_file(path) {
                    Ok(Disposition::Copied { unsorted }) => {
                        report.copied += 1;
                        if unsorted {
                            report.unsorted += 1;
                        }
                    }
                    Ok(Disposition::AlreadyAtDestination) => report.skipped += 1,
                    Err(e) => {
                        log::error!("error processing {}: {e:#}", path.display());
                        report.failed += 1;
                    }
                }
            }
        }

        bar.finish_and_clear();
        Ok(report)
    }

    fn process_file(&mut self, path: &Path) -> anyhow::Result<Disposition> {
        let tags = self
            .tags
            .read(path)
            .with_context(|| format!("cannot read tags of {}", path.display()))?;
        let seed = build_seed(path, &tags)
            .with_context(|| format!("cannot derive metadata for {}", path.display()))?;
        log::info!("extracted metadata for {}: {}", path.display(), seed.record);

        let outcome = self.reconciler.reconcile(path, &seed);
        let (record, artist_resolved) = match outcome {
            Outcome::Confident(record) => (record, true),
            Outcome::Partial {
                record,
                artist_applied,
            } => (record, seed.artist_trusted || artist_applied),
            Outcome::NoMatch => (seed.record.clone(), seed.artist_trusted),
        };

        // a partial match that applied the artist resolves an untrusted seed
        // artist; everything still unresolved goes under the manual-sorting
        // label instead
        let unsorted = !artist_resolved;
        let record = if unsorted {
            record.with_artists(&self.dest.unsorted_label)
        } else {
            record
        };

        let dest = self
            .dest
            .root
            .join(record.relative_path(self.dest.include_year_dir));

        if dest.exists() && !self.dest.overwrite {
            log::warn!(
                "destination {} already exists, skipping copy of {}",
                dest.display(),
                path.display()
            );
            self.mark_done(path, Some(&dest));
            return Ok(Disposition::AlreadyAtDestination);
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create directory {}", parent.display()))?;
        }
        fs::copy(path, &dest)
            .with_context(|| format!("cannot copy to {}", dest.display()))?;
        log::info!("copied {} to {}", path.display(), dest.display());

        // updated fields go into the copy, never into the source file
        if !unsorted && self.improves_tags(&seed, &record) {
            if let Err(e) = self.tags.write(&dest, &record) {
                log::warn!("could not write tags to {}: {e}", dest.display());
            }
        }

        // after the tag write, which bumps the destination's own mtime
        copy_modified_time(path, &dest);

        self.mark_done(path, Some(&dest));
        Ok(Disposition::Copied { unsorted })
    }

    fn improves_tags(&self, seed: &Seed, record: &MetadataRecord) -> bool {
        record != &seed.record || !seed.title_tagged || !seed.album_tagged
    }

    fn check_done(&self, path: &Path) -> bool {
        self.progress.as_ref().is_some_and(|p| p.is_done(path))
    }

    fn mark_done(&mut self, path: &Path, copy_path: Option<&Path>) {
        if let Some(progress) = &mut self.progress {
            if let Err(e) = progress.mark(path, true, copy_path) {
                log::error!("failed to persist progress for {}: {e}", path.display());
            }
        }
    }
}

/// Carries the source's modification time over to the copy. Best effort;
/// the copy itself already succeeded.
fn copy_modified_time(source: &Path, dest: &Path) {
    let applied = fs::metadata(source)
        .and_then(|m| m.modified())
        .and_then(|mtime| fs::File::options().write(true).open(dest)?.set_modified(mtime));
    if let Err(e) = applied {
        log::warn!(
            "could not preserve modification time of {} on {}: {e}",
            source.display(),
            dest.display()
        );
    }
}

fn is_ignored(path: &Path, ignored_dirs: &[PathBuf]) -> bool {
    ignored_dirs.iter().any(|ignored| path.starts_with(ignored))
}

fn count_audio_files(source: &SourceConfig) -> u64 {
    source
        .roots
        .iter()
        .flat_map(|root| {
            WalkDir::new(root)
                .into_iter()
                .filter_entry(|entry| !is_ignored(entry.path(), &source.ignored_dirs))
                .filter_map(Result::ok)
        })
        .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
        .count() as u64
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar
}
