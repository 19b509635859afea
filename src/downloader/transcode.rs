// Transcoding through ffmpeg: normalizes video to H.264 + AAC in MP4

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::downloader::errors::DownloadError;
use crate::downloader::tools;
use crate::downloader::utils::run_output_with_timeout;

#[async_trait]
pub trait Transcoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Re-encode `input` into `output`. On failure no partial output remains.
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), DownloadError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: Option<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path
                .or_else(tools::find_ffmpeg)
                .unwrap_or_else(|| "ffmpeg".to_string()),
        }
    }

    pub fn build_args(input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Remove a partially written file, ignoring "already gone"
pub async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("[transcode] removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("[transcode] could not remove {}: {}", path.display(), e),
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), DownloadError> {
        let args = Self::build_args(input, output);
        debug!("[transcode] {} {}", self.ffmpeg_path, args.join(" "));

        let result = run_output_with_timeout(&self.ffmpeg_path, args, None).await;
        let output_result = match result {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => Err(DownloadError::Transcode(format!(
                "ffmpeg exited with {}: {}",
                out.status,
                out.stderr_lossy().trim()
            ))),
            Err(e) => Err(e),
        };

        if let Err(e) = output_result {
            discard_partial(output).await;
            return Err(e);
        }

        let size = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            discard_partial(output).await;
            return Err(DownloadError::Transcode(
                "ffmpeg produced an empty file".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_target_h264_aac() {
        let args = FfmpegTranscoder::build_args(Path::new("/w/in.mkv"), Path::new("/w/out.mp4"));
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert!(args.windows(2).any(|w| w == ["-i", "/w/in.mkv"]));
        assert_eq!(args.last().map(String::as_str), Some("/w/out.mp4"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_tool_leaves_no_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        let output = dir.path().join("out.mp4");
        std::fs::write(&input, b"video").unwrap();
        std::fs::write(&output, b"half-written").unwrap();

        // `false` ignores its arguments and exits non-zero
        let transcoder = FfmpegTranscoder::new(Some("false".to_string()));
        let err = transcoder.transcode(&input, &output).await.unwrap_err();

        assert!(matches!(err, DownloadError::Transcode(_)));
        assert!(!output.exists());
        assert!(input.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zero_exit_with_empty_output_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        let output = dir.path().join("out.mp4");
        std::fs::write(&input, b"video").unwrap();

        let transcoder = FfmpegTranscoder::new(Some("true".to_string()));
        let err = transcoder.transcode(&input, &output).await.unwrap_err();
        assert!(matches!(err, DownloadError::Transcode(_)));
    }
}
