// User settings: JSON file plus environment overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::downloader::batch::{default_concurrency, BatchOptions, DEFAULT_MAX_BATCH, MAX_CONCURRENCY};
use crate::downloader::extractors::ExtractorMode;
use crate::downloader::{DownloadError, DownloaderConfig, NetworkConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where finished files land
    pub output_dir: PathBuf,
    /// Parent of per-task scratch directories
    pub work_dir: PathBuf,
    pub concurrency: usize,
    pub max_batch: usize,
    /// Per-item wall-clock cap; none means unbounded
    pub item_timeout_secs: Option<u64>,
    pub transcode: bool,
    pub auto_credential_retry: bool,
    pub ytdlp_path: Option<String>,
    pub python: Option<String>,
    pub launcher: ExtractorMode,
    pub ffmpeg_path: Option<String>,
    pub network: NetworkConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: dirs::download_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            work_dir: std::env::temp_dir(),
            concurrency: default_concurrency(),
            max_batch: DEFAULT_MAX_BATCH,
            item_timeout_secs: None,
            transcode: true,
            auto_credential_retry: true,
            ytdlp_path: None,
            python: None,
            launcher: ExtractorMode::Auto,
            ffmpeg_path: None,
            network: NetworkConfig::default(),
        }
    }
}

impl Settings {
    /// `<config_dir>/tubefetch/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tubefetch").join("settings.json"))
    }

    /// Load from `path`, or from the default location when it exists.
    /// A missing default file is not an error; a missing explicit one is.
    pub fn load(path: Option<&Path>) -> Result<Self, DownloadError> {
        let settings = match path {
            Some(path) => Self::load_from_path(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::load_from_path(&path)?,
                None => Self::default(),
            },
        };
        Ok(settings.with_env_overrides().normalized())
    }

    pub fn load_from_path(path: &Path) -> Result<Self, DownloadError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DownloadError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let settings = serde_json::from_str(&contents).map_err(|e| {
            DownloadError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        debug!("[settings] loaded {}", path.display());
        Ok(settings)
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(path) = non_empty_env("TUBEFETCH_YTDLP") {
            self.ytdlp_path = Some(path);
        }
        if let Some(path) = non_empty_env("TUBEFETCH_FFMPEG") {
            self.ffmpeg_path = Some(path);
        }
        if let Some(python) = non_empty_env("YTDLP_PYTHON") {
            self.python = Some(python);
        }
        self
    }

    fn normalized(mut self) -> Self {
        self.concurrency = self.concurrency.clamp(1, MAX_CONCURRENCY);
        self.max_batch = self.max_batch.max(1);
        self
    }

    pub fn item_timeout(&self) -> Option<Duration> {
        self.item_timeout_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }

    pub fn downloader_config(&self) -> DownloaderConfig {
        DownloaderConfig {
            work_dir: self.work_dir.clone(),
            output_dir: self.output_dir.clone(),
            transcode: self.transcode,
            item_timeout: self.item_timeout(),
            network: self.network.clone(),
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.concurrency,
            max_batch: self.max_batch,
            auto_credential_retry: self.auto_credential_retry,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"output_dir": "/srv/media", "item_timeout_secs": 600, "network": {"proxy": "socks5://127.0.0.1:1080"}}"#,
        )
        .unwrap();

        let settings = Settings::load_from_path(&path).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("/srv/media"));
        assert_eq!(settings.item_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(settings.max_batch, 10);
        assert!(settings.transcode);
        assert_eq!(settings.network.retries, 3);
        assert_eq!(settings.network.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
    }

    #[test]
    fn explicit_missing_file_is_a_config_error() {
        let err = Settings::load(Some(Path::new("/nonexistent/tubefetch.json"))).unwrap_err();
        assert!(matches!(err, DownloadError::Config(_)));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{ not json").unwrap();
        assert!(matches!(
            Settings::load_from_path(file.path()),
            Err(DownloadError::Config(_))
        ));
    }

    #[test]
    fn concurrency_is_clamped_and_zero_timeout_disables_cap() {
        let settings = Settings {
            concurrency: 64,
            item_timeout_secs: Some(0),
            ..Settings::default()
        }
        .normalized();
        assert_eq!(settings.concurrency, MAX_CONCURRENCY);
        assert_eq!(settings.item_timeout(), None);
        assert_eq!(settings.batch_options().concurrency, MAX_CONCURRENCY);
    }

    #[test]
    fn launcher_parses_lowercase() {
        let settings: Settings = serde_json::from_str(r#"{"launcher": "python"}"#).unwrap();
        assert_eq!(settings.launcher, ExtractorMode::Python);
    }
}
