// yt-dlp extraction backend
//
// Launches either the native `yt-dlp` binary or `python3 -m yt_dlp`.
// Auto mode prefers the binary and falls back to the Python module when no
// binary can be located.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use super::traits::{
    find_output_for_template, DownloadJob, ExtractionBackend, ExtractorConfig, ExtractorMode,
    ProbeResult,
};
use crate::downloader::errors::DownloadError;
use crate::downloader::models::MediaKind;
use crate::downloader::tools;
use crate::downloader::traits::{ProgressEmitter, ProgressEvent};
use crate::downloader::utils::{get_network_args, run_output_with_timeout, run_streaming};

/// Default cap for a metadata probe
const PROBE_TIMEOUT_SECS: u64 = 120;

/// yt-dlp based backend
#[derive(Debug, Clone)]
pub struct YtDlpBackend {
    program: String,
    prefix_args: Vec<String>,
    mode: ExtractorMode,
}

impl YtDlpBackend {
    /// Resolve the launcher for `mode`. Explicit paths win over discovery.
    pub fn new(mode: ExtractorMode, ytdlp_path: Option<String>, python: Option<String>) -> Self {
        let binary = || ytdlp_path.clone().or_else(tools::find_ytdlp);
        let python = || python.clone().unwrap_or_else(tools::python_cmd);

        let (program, prefix_args, mode) = match mode {
            ExtractorMode::Binary => (
                binary().unwrap_or_else(|| "yt-dlp".to_string()),
                Vec::new(),
                ExtractorMode::Binary,
            ),
            ExtractorMode::Python => (python(), Self::python_prefix(), ExtractorMode::Python),
            ExtractorMode::Auto => match binary() {
                Some(path) => (path, Vec::new(), ExtractorMode::Binary),
                None => (python(), Self::python_prefix(), ExtractorMode::Python),
            },
        };

        Self {
            program,
            prefix_args,
            mode,
        }
    }

    fn python_prefix() -> Vec<String> {
        vec!["-m".to_string(), "yt_dlp".to_string()]
    }

    /// Launcher actually in use (never Auto)
    pub fn mode(&self) -> ExtractorMode {
        self.mode
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn base_args(&self, config: &ExtractorConfig) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        args.push("--no-playlist".to_string());
        args.extend(get_network_args(&config.network));
        if let Some(path) = &config.cookies_path {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().to_string());
        }
        args
    }

    /// Build probe arguments
    pub fn probe_args(&self, url: &str, config: &ExtractorConfig) -> Vec<String> {
        let mut args = self.base_args(config);
        args.push("--dump-json".to_string());
        args.push("--no-warnings".to_string());
        args.push(url.to_string());
        args
    }

    /// Build download arguments
    pub fn download_args(&self, job: &DownloadJob, config: &ExtractorConfig) -> Vec<String> {
        let mut args = self.base_args(config);
        args.extend([
            "-f".to_string(),
            job.format.clone(),
            "-o".to_string(),
            job.output_template.to_string_lossy().to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--no-simulate".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
        ]);

        match job.media_kind {
            MediaKind::Audio => args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
                "--audio-quality".to_string(),
                "0".to_string(),
            ]),
            MediaKind::Video => args.extend([
                "--merge-output-format".to_string(),
                "mp4".to_string(),
            ]),
        }

        args.push(job.url.clone());
        args
    }
}

impl Default for YtDlpBackend {
    fn default() -> Self {
        Self::new(ExtractorMode::Auto, None, None)
    }
}

#[async_trait]
impl ExtractionBackend for YtDlpBackend {
    fn name(&self) -> &'static str {
        match self.mode {
            ExtractorMode::Python => "python-yt-dlp",
            _ => "cli-yt-dlp",
        }
    }

    async fn probe(&self, url: &str, config: &ExtractorConfig) -> Result<ProbeResult, DownloadError> {
        let args = self.probe_args(url, config);
        debug!("[{}] probe: {} {}", self.name(), self.program, args.join(" "));

        let output = run_output_with_timeout(&self.program, args, Some(PROBE_TIMEOUT_SECS)).await?;
        if !output.status.success() {
            return Err(DownloadError::from(output.stderr_lossy()));
        }

        ProbeResult::from_json(&output.stdout)
    }

    async fn download(
        &self,
        job: &DownloadJob,
        config: &ExtractorConfig,
        progress: &ProgressEmitter,
    ) -> Result<PathBuf, DownloadError> {
        let args = self.download_args(job, config);
        debug!("[{}] download: {} {}", self.name(), self.program, args.join(" "));

        let url = job.url.clone();
        let mut printed: Option<PathBuf> = None;
        let output = run_streaming(&self.program, args, |line| {
            if let Some((percent, status)) = parse_ytdlp_progress(line) {
                progress.emit(ProgressEvent::Progress {
                    url: url.clone(),
                    percent,
                    status,
                });
            } else if let Some(path) = printed_path(line) {
                printed = Some(path);
            }
        })
        .await?;

        if !output.status.success() {
            return Err(DownloadError::from(output.stderr_lossy()));
        }

        let produced = printed
            .filter(|p| p.exists())
            .or_else(|| find_output_for_template(&job.output_template))
            .ok_or_else(|| {
                DownloadError::Backend(format!(
                    "yt-dlp reported success but no file matches {}",
                    job.output_template.display()
                ))
            })?;

        info!("[{}] downloaded {}", self.name(), produced.display());
        Ok(produced)
    }
}

/// Lines printed by `--print after_move:filepath` are bare absolute paths
fn printed_path(line: &str) -> Option<PathBuf> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('[') {
        return None;
    }
    let path = Path::new(trimmed);
    path.is_absolute().then(|| path.to_path_buf())
}

/// Parse yt-dlp progress line like:
/// [download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32 (frag 29/454)
/// Returns (percent, status_string)
pub fn parse_ytdlp_progress(line: &str) -> Option<(f32, String)> {
    lazy_static::lazy_static! {
        static ref PROGRESS_RE: Regex = Regex::new(
            r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*\s*\w+)(?:\s+at\s+(\S+\s*\S*/s))?(?:\s+ETA\s+(\S+))?"
        ).unwrap();
        static ref DEST_RE: Regex = Regex::new(r"\[download\]\s+Destination:\s+(.+)").unwrap();
        static ref MERGE_RE: Regex = Regex::new(r"\[Merger?\]\s+Merging").unwrap();
        static ref EXTRACT_RE: Regex = Regex::new(r"\[ExtractAudio\]\s+Destination").unwrap();
    }

    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        let size = caps.get(2).map(|m| m.as_str()).unwrap_or("?");
        let status = match (caps.get(3), caps.get(4)) {
            (Some(speed), Some(eta)) => format!(
                "{:.1}% of {} @ {} ETA {}",
                percent,
                size,
                speed.as_str(),
                eta.as_str()
            ),
            (Some(speed), None) => format!("{:.1}% of {} @ {}", percent, size, speed.as_str()),
            _ => format!("{:.1}% of {}", percent, size),
        };
        return Some((percent, status));
    }

    if let Some(caps) = DEST_RE.captures(line) {
        let filename = caps.get(1).map(|m| m.as_str()).unwrap_or("file");
        let short_name = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| filename.to_string());
        return Some((0.0, format!("Starting: {}", short_name)));
    }

    if MERGE_RE.is_match(line) {
        return Some((99.0, "Merging video and audio".to_string()));
    }

    if EXTRACT_RE.is_match(line) {
        return Some((99.0, "Extracting audio".to_string()));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::NetworkConfig;

    fn backend() -> YtDlpBackend {
        YtDlpBackend::new(ExtractorMode::Binary, Some("/usr/bin/yt-dlp".into()), None)
    }

    fn job(kind: MediaKind) -> DownloadJob {
        DownloadJob {
            url: "https://youtu.be/abc".into(),
            media_kind: kind,
            format: "bestaudio/best".into(),
            output_template: PathBuf::from("/tmp/tubefetch-x/x.%(ext)s"),
        }
    }

    #[test]
    fn test_progress_parsing() {
        let line = "[download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)";
        let (percent, status) = parse_ytdlp_progress(line).unwrap();
        assert!((percent - 12.5).abs() < f32::EPSILON);
        assert!(status.contains("ETA 11:59"));

        let done = parse_ytdlp_progress("[download] 100% of   3.20MiB in 00:00:01 at 2.50MiB/s").unwrap();
        assert!((done.0 - 100.0).abs() < f32::EPSILON);

        assert!(parse_ytdlp_progress("[youtube] abc: Downloading webpage").is_none());
        assert_eq!(
            parse_ytdlp_progress("[Merger] Merging formats into \"x.mp4\"").map(|p| p.0),
            Some(99.0)
        );
    }

    #[test]
    fn python_mode_prefixes_module_invocation() {
        let py = YtDlpBackend::new(ExtractorMode::Python, None, Some("python3".into()));
        assert_eq!(py.program(), "python3");
        assert_eq!(py.mode(), ExtractorMode::Python);
        let args = py.probe_args("https://youtu.be/abc", &ExtractorConfig::default());
        assert_eq!(&args[..2], ["-m", "yt_dlp"]);
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/abc"));
    }

    #[test]
    fn audio_download_extracts_mp3_and_passes_cookies() {
        let config = ExtractorConfig::new(NetworkConfig::default())
            .with_cookies_path(Some(PathBuf::from("/tmp/cookies.txt")));
        let args = backend().download_args(&job(MediaKind::Audio), &config);

        assert!(args.windows(2).any(|w| w == ["--cookies", "/tmp/cookies.txt"]));
        assert!(args.windows(2).any(|w| w == ["--audio-format", "mp3"]));
        assert!(args.windows(2).any(|w| w == ["-f", "bestaudio/best"]));
        assert!(args.windows(2).any(|w| w == ["-o", "/tmp/tubefetch-x/x.%(ext)s"]));
        assert!(!args.contains(&"--merge-output-format".to_string()));
    }

    #[test]
    fn video_download_merges_into_mp4_without_cookies() {
        let args = backend().download_args(&job(MediaKind::Video), &ExtractorConfig::default());
        assert!(args.windows(2).any(|w| w == ["--merge-output-format", "mp4"]));
        assert!(!args.contains(&"--cookies".to_string()));
        assert!(!args.contains(&"-x".to_string()));
    }

    #[test]
    fn printed_path_ignores_bracketed_lines() {
        assert!(printed_path("[download] Destination: /tmp/a.mp4").is_none());
        assert!(printed_path("relative/a.mp4").is_none());
        assert_eq!(printed_path("/tmp/a.mp4 "), Some(PathBuf::from("/tmp/a.mp4")));
    }
}
