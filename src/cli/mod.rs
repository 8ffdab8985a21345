use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use walkdir::WalkDir;

use crate::config::{self, Config};
use crate::interrupt::CancelFlag;
use crate::lookup::acoustid::AcoustidClient;
use crate::lookup::musicbrainz::MusicBrainzClient;
use crate::lookup::recognition::HttpRecognizer;
use crate::organize::{Organizer, is_audio_file};
use crate::progress::{ProgressError, ProgressLog};
use crate::reconcile::{Reconciler, build_seed};
use crate::tags::{LoftyTagIo, TagIo};

#[derive(Parser)]
#[command(name = "tunesort")]
#[command(version = config::APP_VERSION)]
#[command(about = "Organize audio files into a canonical library layout")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Walk the source roots, reconcile metadata and copy files into place
    Organize,
    /// Show how much of the source tree is already processed
    Status,
    /// Print the metadata and destination a single file would get, without
    /// any network lookups
    Inspect { file: PathBuf },
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match &cli.command {
        Commands::Organize => organize(cfg),
        Commands::Status => status(cfg),
        Commands::Inspect { file } => inspect(cfg, file),
    }
}

fn organize(cfg: Config) -> anyhow::Result<()> {
    let progress = match &cfg.progress.save_file {
        Some(path) => Some(open_progress(path)?),
        None => None,
    };

    let cancel = CancelFlag::new();
    if let Err(e) = cancel.install() {
        log::warn!("could not install Ctrl-C handler: {e}");
    }

    let mut organizer = Organizer::new(
        cfg.dest,
        Box::new(LoftyTagIo),
        build_reconciler(&cfg.services, &cfg.matching),
        progress,
        cancel,
    );
    let report = organizer.run(&cfg.source)?;

    println!("Processed {} files: {} copied ({} to the manual-sorting bucket), {} skipped, {} failed",
        report.processed, report.copied, report.unsorted, report.skipped, report.failed);
    if report.interrupted {
        println!("Interrupted; run again to resume where this run stopped.");
    }
    Ok(())
}

fn status(cfg: Config) -> anyhow::Result<()> {
    let progress = match &cfg.progress.save_file {
        Some(path) => Some(open_progress(path)?),
        None => None,
    };

    let mut total = 0usize;
    let mut done = 0usize;
    for root in &cfg.source.roots {
        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            if entry.file_type().is_file() && is_audio_file(entry.path()) {
                total += 1;
                if progress.as_ref().is_some_and(|p| p.is_done(entry.path())) {
                    done += 1;
                }
            }
        }
    }

    println!("Source roots contain {total} audio files, {done} already processed");
    if let Some(progress) = &progress {
        if let Ok(modified) = std::fs::metadata(progress.path()).and_then(|m| m.modified()) {
            let local: DateTime<Local> = modified.into();
            println!(
                "Progress file {} last written {}",
                progress.path().display(),
                local.format("%Y-%m-%d %H:%M:%S")
            );
        }
    } else {
        println!("No progress file configured; every run starts from scratch");
    }
    Ok(())
}

fn inspect(cfg: Config, file: &Path) -> anyhow::Result<()> {
    let tags = LoftyTagIo
        .read(file)
        .with_context(|| format!("cannot read tags of {}", file.display()))?;
    let seed = build_seed(file, &tags)
        .with_context(|| format!("cannot derive metadata for {}", file.display()))?;

    println!("{}", seed.record);
    println!(
        "Tagged fields: title={} album={} artist trusted={}",
        seed.title_tagged, seed.album_tagged, seed.artist_trusted
    );
    let record = if seed.artist_trusted {
        seed.record
    } else {
        seed.record.with_artists(&cfg.dest.unsorted_label)
    };
    println!(
        "Destination: {}",
        cfg.dest
            .root
            .join(record.relative_path(cfg.dest.include_year_dir))
            .display()
    );
    Ok(())
}

fn build_reconciler(
    services: &config::ServicesConfig,
    matching: &config::MatchingConfig,
) -> Reconciler {
    let (fingerprint, releases) = match &services.acoustid_api_key {
        Some(key) => (
            Some(Box::new(AcoustidClient::new(key, services.fpcalc_path.as_deref()))
                as Box<dyn crate::lookup::FingerprintLookup>),
            Some(Box::new(MusicBrainzClient::new(
                config::APP_NAME,
                config::APP_VERSION,
                services.contact.as_deref(),
            )) as Box<dyn crate::lookup::ReleaseLookup>),
        ),
        None => (None, None),
    };
    let recognizer = services.recognizer_url.as_deref().map(|url| {
        Box::new(HttpRecognizer::new(url)) as Box<dyn crate::lookup::RecognitionLookup>
    });

    Reconciler::new(
        fingerprint,
        releases,
        recognizer,
        matching.threshold,
        matching.update_from_source,
        Duration::from_millis(matching.lookup_delay_ms),
    )
}

/// Loads the progress tree; a corrupt file is only discarded after explicit
/// confirmation.
fn open_progress(path: &Path) -> anyhow::Result<ProgressLog> {
    match ProgressLog::load(path.to_path_buf()) {
        Ok(progress) => Ok(progress),
        Err(ProgressError::Corrupt(e)) => {
            log::error!("could not read progress file {}: {e}", path.display());
            if prompt_confirm("Continue, overwriting the progress file?")? {
                Ok(ProgressLog::create(path.to_path_buf())?)
            } else {
                bail!("refusing to discard corrupt progress file {}", path.display());
            }
        }
        Err(e) => Err(e).with_context(|| format!("cannot open progress file {}", path.display())),
    }
}

fn prompt_confirm(message: &str) -> anyhow::Result<bool> {
    let stdin = std::io::stdin();
    loop {
        print!("{message} (y/n): ");
        std::io::stdout().flush()?;
        let mut response = String::new();
        stdin.read_line(&mut response)?;
        match response.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => println!("Please enter 'y' or 'n'."),
        }
    }
}
