// Error types for the extraction backend, transcoder and orchestration layer

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// yt-dlp, python or ffmpeg not found in system
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The extractor ran and reported a failure; holds its stderr verbatim
    #[error("{0}")]
    Backend(String),

    /// Command could not be spawned or awaited
    #[error("Execution error: {0}")]
    Execution(String),

    /// Failed to parse yt-dlp JSON output
    #[error("Parse error: {0}")]
    Parse(String),

    /// Wall-clock cap exceeded
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// ffmpeg failed or produced no output
    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Rejected before any work started (empty or oversized batch)
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Text handed to the classifier and preserved in outcomes.
    pub fn raw_message(&self) -> String {
        match self {
            Self::Backend(msg) | Self::InvalidUrl(msg) => msg.trim().to_string(),
            other => other.to_string(),
        }
    }
}

// Extractor stderr arrives as a String; keep it untouched for classification.
// A missing executable is detected at spawn time, never from stderr.
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        if s.contains("Unsupported URL") || s.contains("is not a valid URL") {
            return Self::InvalidUrl(s);
        }
        Self::Backend(s)
    }
}
