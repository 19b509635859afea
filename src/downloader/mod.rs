// Downloader module - resilient yt-dlp/ffmpeg orchestration
//
// Layers, bottom up:
// - extractors: yt-dlp process wrapper (probe + download)
// - transcode: ffmpeg re-encode to H.264 + AAC
// - diagnostics / format_selector: pure classification and selection
// - orchestrator: one URL to a terminal DownloadOutcome
// - batch: bounded fan-out plus the one-shot cookie retry

pub mod batch;
pub mod cookies;
pub mod diagnostics;
pub mod errors;
pub mod extractors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod tools;
pub mod traits;
pub mod transcode;
pub mod utils;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_support;

pub use batch::{BatchDownloader, BatchEntry, BatchOptions, BatchReport};
pub use cookies::CookieFile;
pub use diagnostics::{classify, diagnose, Diagnosis, FailureCause};
pub use errors::DownloadError;
pub use format_selector::FormatSelector;
pub use models::{DownloadOutcome, DownloadRequest, MediaKind, NetworkConfig, OutcomeStatus, QualityTier};
pub use orchestrator::{Downloader, DownloaderConfig};
pub use traits::{ProgressEmitter, ProgressEvent};
pub use transcode::{FfmpegTranscoder, Transcoder};
