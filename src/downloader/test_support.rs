// Scripted extractor and transcoder for orchestration tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::DownloadError;
use super::extractors::{DownloadJob, ExtendedFormat, ExtractionBackend, ExtractorConfig, ProbeResult};
use super::traits::{ProgressEmitter, ProgressEvent};
use super::transcode::Transcoder;

pub const AGE_GATE: &str =
    "ERROR: [youtube] abc: Sign in to confirm your age. This video may be inappropriate for some users.";
pub const FORMAT_MISSING: &str = "ERROR: [youtube] abc: Requested format is not available";

/// One recorded `download` call
#[derive(Debug, Clone)]
pub struct RecordedDownload {
    pub url: String,
    pub format: String,
    pub output_template: PathBuf,
    pub cookies: Option<PathBuf>,
}

pub struct FakeBackend {
    title: String,
    heights: Vec<u32>,
    gated: HashSet<String>,
    probe_failures: HashMap<String, String>,
    download_failures: Mutex<HashMap<String, VecDeque<String>>>,
    download_delay: Option<Duration>,
    probes: Mutex<Vec<String>>,
    downloads: Mutex<Vec<RecordedDownload>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            title: "Same Title".to_string(),
            heights: vec![360, 720, 1080],
            gated: HashSet::new(),
            probe_failures: HashMap::new(),
            download_failures: Mutex::new(HashMap::new()),
            download_delay: None,
            probes: Mutex::new(Vec::new()),
            downloads: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Probe fails with an age gate unless a cookie file is attached
    pub fn credential_gated(mut self, url: &str) -> Self {
        self.gated.insert(url.to_string());
        self
    }

    pub fn probe_failure(mut self, url: &str, message: &str) -> Self {
        self.probe_failures.insert(url.to_string(), message.to_string());
        self
    }

    /// Successive download calls for `url` fail with these messages, then succeed
    pub fn download_failures(self, url: &str, messages: &[&str]) -> Self {
        self.download_failures
            .lock()
            .unwrap()
            .insert(url.to_string(), messages.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = Some(delay);
        self
    }

    pub fn with_heights(mut self, heights: &[u32]) -> Self {
        self.heights = heights.to_vec();
        self
    }

    pub fn downloads(&self) -> Vec<RecordedDownload> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn probe_count(&self, url: &str) -> usize {
        self.probes.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    /// Highest number of downloads seen running at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self, url: &str, config: &ExtractorConfig) -> Result<ProbeResult, DownloadError> {
        self.probes.lock().unwrap().push(url.to_string());
        if let Some(message) = self.probe_failures.get(url) {
            return Err(DownloadError::Backend(message.clone()));
        }
        if self.gated.contains(url) && config.cookies_path.is_none() {
            return Err(DownloadError::Backend(AGE_GATE.to_string()));
        }
        Ok(ProbeResult {
            id: "fake".to_string(),
            title: self.title.clone(),
            uploader: "tester".to_string(),
            duration_seconds: 1,
            webpage_url: url.to_string(),
            formats: self
                .heights
                .iter()
                .map(|&h| ExtendedFormat {
                    format_id: h.to_string(),
                    ext: "mp4".to_string(),
                    height: Some(h),
                    fps: None,
                    vcodec: Some("avc1".to_string()),
                    acodec: Some("none".to_string()),
                })
                .collect(),
        })
    }

    async fn download(
        &self,
        job: &DownloadJob,
        config: &ExtractorConfig,
        progress: &ProgressEmitter,
    ) -> Result<PathBuf, DownloadError> {
        self.downloads.lock().unwrap().push(RecordedDownload {
            url: job.url.clone(),
            format: job.format.clone(),
            output_template: job.output_template.clone(),
            cookies: config.cookies_path.clone(),
        });

        let scripted = self
            .download_failures
            .lock()
            .unwrap()
            .get_mut(&job.url)
            .and_then(VecDeque::pop_front);
        if let Some(message) = scripted {
            return Err(DownloadError::Backend(message));
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.download_delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        progress.emit(ProgressEvent::Progress {
            url: job.url.clone(),
            percent: 100.0,
            status: "done".to_string(),
        });

        let path = PathBuf::from(
            job.output_template
                .to_string_lossy()
                .replace("%(ext)s", job.media_kind.extension()),
        );
        tokio::fs::write(&path, job.url.as_bytes()).await?;
        Ok(path)
    }
}

pub struct FakeTranscoder {
    failure: Option<String>,
    calls: AtomicUsize,
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self {
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Leaves a partial output behind, then fails
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    fn name(&self) -> &'static str {
        "fake-transcoder"
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            tokio::fs::write(output, b"partial").await?;
            return Err(DownloadError::Transcode(message.clone()));
        }
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}
