// ExtractionBackend trait and common types

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::downloader::errors::DownloadError;
use crate::downloader::models::{MediaKind, NetworkConfig};
use crate::downloader::traits::ProgressEmitter;

/// How the extractor is launched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorMode {
    /// Python module yt_dlp (`python3 -m yt_dlp`)
    Python,
    /// Native yt-dlp binary
    Binary,
    /// Binary when present, otherwise the Python module
    #[default]
    Auto,
}

impl fmt::Display for ExtractorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::Binary => write!(f, "binary"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Per-call configuration for the extractor
#[derive(Debug, Clone, Default)]
pub struct ExtractorConfig {
    /// Path to cookies.txt file
    pub cookies_path: Option<PathBuf>,
    pub network: NetworkConfig,
}

impl ExtractorConfig {
    pub fn new(network: NetworkConfig) -> Self {
        Self {
            cookies_path: None,
            network,
        }
    }

    pub fn with_cookies_path(mut self, path: Option<PathBuf>) -> Self {
        self.cookies_path = path;
        self
    }
}

/// What to download and where to put it
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub url: String,
    pub media_kind: MediaKind,
    /// yt-dlp format expression
    pub format: String,
    /// yt-dlp output template, e.g. `<task dir>/<task id>.%(ext)s`
    pub output_template: PathBuf,
}

/// Format information from yt-dlp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedFormat {
    /// Format ID (e.g., "137", "140")
    pub format_id: String,
    /// File extension (mp4, webm, m4a)
    pub ext: String,
    /// Video height in pixels
    pub height: Option<u32>,
    /// Frames per second
    pub fps: Option<f32>,
    /// Video codec (avc1, vp9, av01, none)
    pub vcodec: Option<String>,
    /// Audio codec (mp4a, opus, none)
    pub acodec: Option<String>,
}

impl ExtendedFormat {
    pub fn has_video(&self) -> bool {
        self.vcodec
            .as_deref()
            .map_or(self.height.is_some(), |v| v != "none" && !v.is_empty())
    }
}

/// Metadata from a probe; transient, never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub duration_seconds: u64,
    pub webpage_url: String,
    pub formats: Vec<ExtendedFormat>,
}

impl ProbeResult {
    /// Distinct heights of formats carrying video
    pub fn video_heights(&self) -> BTreeSet<u32> {
        self.formats
            .iter()
            .filter(|f| f.has_video())
            .filter_map(|f| f.height)
            .collect()
    }

    /// Parse `--dump-json` output
    pub fn from_json(stdout: &[u8]) -> Result<Self, DownloadError> {
        let json: serde_json::Value = serde_json::from_slice(stdout)
            .map_err(|e| DownloadError::Parse(format!("Invalid JSON: {}", e)))?;

        // Single-file extractors report no formats array, only top-level fields
        let formats = match json["formats"].as_array() {
            Some(array) => array.iter().map(parse_format).collect(),
            None => vec![parse_format(&json)],
        };

        Ok(Self {
            id: json["id"].as_str().unwrap_or("unknown").to_string(),
            title: json["title"].as_str().unwrap_or("Unknown").to_string(),
            uploader: json["uploader"].as_str().unwrap_or("Unknown").to_string(),
            duration_seconds: json["duration"].as_f64().unwrap_or(0.0) as u64,
            webpage_url: json["webpage_url"].as_str().unwrap_or("").to_string(),
            formats,
        })
    }
}

fn parse_format(f: &serde_json::Value) -> ExtendedFormat {
    ExtendedFormat {
        format_id: f["format_id"].as_str().unwrap_or("").to_string(),
        ext: f["ext"].as_str().unwrap_or("").to_string(),
        height: f["height"].as_u64().map(|h| h as u32),
        fps: f["fps"].as_f64().map(|fps| fps as f32),
        vcodec: f["vcodec"].as_str().map(|s| s.to_string()),
        acodec: f["acodec"].as_str().map(|s| s.to_string()),
    }
}

/// External media-extraction tool
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Metadata-only query; downloads nothing
    async fn probe(&self, url: &str, config: &ExtractorConfig) -> Result<ProbeResult, DownloadError>;

    /// Download per `job`, returning the path of the produced file
    async fn download(
        &self,
        job: &DownloadJob,
        config: &ExtractorConfig,
        progress: &ProgressEmitter,
    ) -> Result<PathBuf, DownloadError>;
}

/// Resolve the produced file when the extractor did not print it
pub fn find_output_for_template(template: &Path) -> Option<PathBuf> {
    let dir = template.parent()?;
    let stem = template.file_name()?.to_str()?.split('.').next()?.to_string();

    std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(&stem) && !n.ends_with(".part"))
        })
        .max_by_key(|path| std::fs::metadata(path).map(|m| m.len()).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_JSON: &str = r#"{
        "id": "abc123",
        "title": "Some clip",
        "uploader": "someone",
        "duration": 212.4,
        "webpage_url": "https://www.youtube.com/watch?v=abc123",
        "formats": [
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2"},
            {"format_id": "160", "ext": "mp4", "height": 144, "vcodec": "avc1.4d400c", "acodec": "none"},
            {"format_id": "18", "ext": "mp4", "height": 360, "vcodec": "avc1.42001E", "acodec": "mp4a.40.2"},
            {"format_id": "137", "ext": "mp4", "height": 1080, "fps": 30, "vcodec": "avc1.640028", "acodec": "none"},
            {"format_id": "248", "ext": "webm", "height": 1080, "vcodec": "vp9", "acodec": "none"}
        ]
    }"#;

    #[test]
    fn parses_probe_and_collects_distinct_video_heights() {
        let probe = ProbeResult::from_json(PROBE_JSON.as_bytes()).unwrap();
        assert_eq!(probe.id, "abc123");
        assert_eq!(probe.duration_seconds, 212);
        assert_eq!(probe.formats.len(), 5);
        assert_eq!(probe.video_heights().into_iter().collect::<Vec<_>>(), vec![144, 360, 1080]);
    }

    #[test]
    fn missing_formats_array_uses_top_level_entry() {
        let probe = ProbeResult::from_json(br#"{"id":"x","title":"t","ext":"mp4","height":720,"vcodec":"h264"}"#).unwrap();
        assert_eq!(probe.formats.len(), 1);
        assert!(probe.video_heights().contains(&720));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            ProbeResult::from_json(b"not json"),
            Err(DownloadError::Parse(_))
        ));
    }

    #[test]
    fn finds_finished_output_and_skips_partials() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("task.webm.part"), b"partial").unwrap();
        std::fs::write(dir.path().join("task.mp4"), b"done").unwrap();
        std::fs::write(dir.path().join("other.mp4"), b"unrelated-and-bigger").unwrap();

        let found = find_output_for_template(&dir.path().join("task.%(ext)s")).unwrap();
        assert_eq!(found, dir.path().join("task.mp4"));
    }
}
