// Single-URL orchestration: probe -> select -> download -> transcode -> deliver
//
// Every failure is converted into a DownloadOutcome here; nothing from the
// backend or the transcoder escapes as an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::diagnostics::{self, FailureCause};
use super::errors::DownloadError;
use super::extractors::{DownloadJob, ExtractionBackend, ExtractorConfig, ProbeResult};
use super::format_selector::{self, FormatSelector};
use super::models::{DownloadOutcome, DownloadRequest, MediaKind, NetworkConfig};
use super::traits::{ProgressEmitter, ProgressEvent};
use super::transcode::{discard_partial, Transcoder};
use super::workspace::{deliver, TaskWorkspace};

/// Knobs for one orchestration run
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Parent of the per-task scratch directories
    pub work_dir: PathBuf,
    /// Where finished files are handed over
    pub output_dir: PathBuf,
    /// Re-encode video to H.264 + AAC
    pub transcode: bool,
    /// Hard wall-clock cap per item
    pub item_timeout: Option<Duration>,
    pub network: NetworkConfig,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir(),
            output_dir: PathBuf::from("."),
            transcode: true,
            item_timeout: None,
            network: NetworkConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct Downloader {
    backend: Arc<dyn ExtractionBackend>,
    transcoder: Arc<dyn Transcoder>,
    config: DownloaderConfig,
}

impl Downloader {
    pub fn new(
        backend: Arc<dyn ExtractionBackend>,
        transcoder: Arc<dyn Transcoder>,
        config: DownloaderConfig,
    ) -> Self {
        Self {
            backend,
            transcoder,
            config,
        }
    }

    fn extractor_config(&self, request: &DownloadRequest) -> ExtractorConfig {
        ExtractorConfig::new(self.config.network.clone())
            .with_cookies_path(request.credential_path().map(Path::to_path_buf))
    }

    /// Metadata plus the expression the selector would use
    pub async fn probe(&self, request: &DownloadRequest) -> Result<(ProbeResult, String), DownloadError> {
        let probe = self
            .backend
            .probe(request.url(), &self.extractor_config(request))
            .await?;
        let format = FormatSelector::select(
            request.media_kind(),
            request.quality_tier(),
            &probe.video_heights(),
        );
        Ok((probe, format))
    }

    /// Run one request to a terminal outcome
    pub async fn fetch(&self, request: &DownloadRequest, progress: &ProgressEmitter) -> DownloadOutcome {
        progress.emit(ProgressEvent::Started {
            url: request.url().to_string(),
        });

        let outcome = match self.config.item_timeout {
            Some(cap) => match tokio::time::timeout(cap, self.run(request, progress)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    // The dropped future took its workspace and child processes with it
                    warn!("[Downloader] {} timed out after {:?}", request.url(), cap);
                    DownloadOutcome::error(
                        FailureCause::Unknown,
                        DownloadError::Timeout(cap.as_secs()).raw_message(),
                    )
                }
            },
            None => self.run(request, progress).await,
        };

        progress.emit(ProgressEvent::Finished {
            url: request.url().to_string(),
            status: outcome.status(),
        });
        outcome
    }

    async fn run(&self, request: &DownloadRequest, progress: &ProgressEmitter) -> DownloadOutcome {
        let url = request.url();
        if url.is_empty() {
            return DownloadOutcome::error(FailureCause::Unknown, "empty URL");
        }
        let config = self.extractor_config(request);

        // 1. Probe
        let probe = match self.backend.probe(url, &config).await {
            Ok(probe) => probe,
            Err(e) => return self.failure("probe", url, &e),
        };

        // 2. Select
        let heights = probe.video_heights();
        let format = FormatSelector::select(request.media_kind(), request.quality_tier(), &heights);
        info!(
            "[Downloader] {} '{}' heights={:?} format={}",
            url, probe.title, heights, format
        );

        let workspace = match TaskWorkspace::create(&self.config.work_dir) {
            Ok(ws) => ws,
            Err(e) => {
                return DownloadOutcome::error(
                    FailureCause::Unknown,
                    format!("cannot create workspace: {}", e),
                )
            }
        };

        // 3. Download, with a single unrestricted retry for missing formats
        let mut job = DownloadJob {
            url: url.to_string(),
            media_kind: request.media_kind(),
            format,
            output_template: workspace.output_template(),
        };
        let downloaded = match self.backend.download(&job, &config, progress).await {
            Ok(path) => path,
            Err(e) if diagnostics::classify(&e.raw_message()) == FailureCause::FormatUnavailable => {
                warn!(
                    "[Downloader] {} format '{}' unavailable, retrying with '{}'",
                    url,
                    job.format,
                    format_selector::FALLBACK
                );
                job.format = format_selector::FALLBACK.to_string();
                match self.backend.download(&job, &config, progress).await {
                    Ok(path) => path,
                    Err(e) => return self.failure("download", url, &e),
                }
            }
            Err(e) => return self.failure("download", url, &e),
        };

        // 4. Transcode (video only)
        let artifact = if request.media_kind() == MediaKind::Video && self.config.transcode {
            let target = workspace.transcoded_path();
            if let Err(e) = self.transcoder.transcode(&downloaded, &target).await {
                discard_partial(&target).await;
                warn!("[Downloader] {} {} failed: {}", url, self.transcoder.name(), e);
                return DownloadOutcome::error(FailureCause::Unknown, e.raw_message());
            }
            discard_partial(&downloaded).await;
            target
        } else {
            downloaded
        };

        // 5. Hand over and clean up
        let ext = artifact
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_else(|| request.media_kind().extension())
            .to_string();
        let delivered = deliver(&artifact, &self.config.output_dir, &probe.title, &ext).await;
        workspace.close();

        match delivered {
            Ok(path) => {
                info!("[Downloader] ✓ {} -> {}", url, path.display());
                DownloadOutcome::ok(path)
            }
            Err(e) => DownloadOutcome::error(
                FailureCause::Unknown,
                format!("cannot move result into {}: {}", self.config.output_dir.display(), e),
            ),
        }
    }

    fn failure(&self, stage: &str, url: &str, error: &DownloadError) -> DownloadOutcome {
        let raw = error.raw_message();
        let diagnosis = diagnostics::diagnose(&raw);
        warn!(
            "[Downloader] ✗ {} {} via {} failed: {} ({:?})",
            url,
            stage,
            self.backend.name(),
            diagnosis.cause,
            diagnosis.matched_pattern
        );
        DownloadOutcome::from_failure(diagnosis.cause, raw)
    }
}
