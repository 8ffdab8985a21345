use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "tunesort";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub dest: DestConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| "failed to parse config TOML")
    }
}

#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    pub roots: Vec<PathBuf>,
    #[serde(default)]
    pub ignored_dirs: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct DestConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub overwrite: bool,
    /// insert a year directory between artist and album
    #[serde(default = "default_true")]
    pub include_year_dir: bool,
    /// artist directory used when no confident match resolves the artist
    #[serde(default = "default_unsorted_label")]
    pub unsorted_label: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// minimum artist/title similarity for accepting a candidate; the single
    /// most consequential tunable: too low misfiles songs, too high forces
    /// manual sorting
    pub threshold: f64,
    /// reconcile even when on-disk tags look complete
    pub update_from_source: bool,
    /// minimum delay between calls to one lookup service
    pub lookup_delay_ms: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            update_from_source: false,
            lookup_delay_ms: 300,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ServicesConfig {
    /// AcoustID application key; fingerprint lookups are disabled without it
    pub acoustid_api_key: Option<String>,
    /// contact address for the MusicBrainz User-Agent
    pub contact: Option<String>,
    pub fpcalc_path: Option<PathBuf>,
    /// acoustic recognition endpoint; recognition is disabled without it
    pub recognizer_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ProgressConfig {
    /// where to persist the progress tree; no resume support without it
    pub save_file: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_unsorted_label() -> String {
    "! Sort".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_minimal_config() -> anyhow::Result<()> {
        let toml_str = r#"
[source]
roots = ["/home/me/Downloads/music"]

[dest]
root = "/home/me/Music"
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        assert_eq!(
            cfg.source.roots,
            vec![PathBuf::from("/home/me/Downloads/music")]
        );
        assert!(cfg.source.ignored_dirs.is_empty());
        assert_eq!(cfg.dest.root, PathBuf::from("/home/me/Music"));
        assert!(!cfg.dest.overwrite);
        assert!(cfg.dest.include_year_dir);
        assert_eq!(cfg.dest.unsorted_label, "! Sort");
        assert_eq!(cfg.matching.threshold, 0.8);
        assert_eq!(cfg.matching.lookup_delay_ms, 300);
        assert!(cfg.services.acoustid_api_key.is_none());
        assert!(cfg.progress.save_file.is_none());

        Ok(())
    }

    #[test]
    fn test_parse_full_config() -> anyhow::Result<()> {
        let toml_str = r#"
[source]
roots = ["/srv/incoming", "/srv/backlog"]
ignored_dirs = ["/srv/incoming/podcasts"]

[dest]
root = "/srv/library"
overwrite = true
include_year_dir = false
unsorted_label = "_unsorted"

[matching]
threshold = 0.5
update_from_source = true
lookup_delay_ms = 500

[services]
acoustid_api_key = "abc123"
contact = "me@example.com"
fpcalc_path = "/usr/bin/fpcalc"
recognizer_url = "http://localhost:9000/recognize"

[progress]
save_file = "/srv/library/.tunesort-progress.json"
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        assert_eq!(cfg.source.roots.len(), 2);
        assert!(cfg.dest.overwrite);
        assert!(!cfg.dest.include_year_dir);
        assert_eq!(cfg.dest.unsorted_label, "_unsorted");
        assert_eq!(cfg.matching.threshold, 0.5);
        assert!(cfg.matching.update_from_source);
        assert_eq!(cfg.services.acoustid_api_key.as_deref(), Some("abc123"));
        assert_eq!(
            cfg.services.fpcalc_path,
            Some(PathBuf::from("/usr/bin/fpcalc"))
        );
        assert_eq!(
            cfg.progress.save_file,
            Some(PathBuf::from("/srv/library/.tunesort-progress.json"))
        );

        Ok(())
    }
}
