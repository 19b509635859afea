// Common data models for the downloader

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::diagnostics::FailureCause;

/// What the caller wants out of a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio-only, extracted to MP3
    Audio,
    /// Video with audio, delivered as MP4
    #[default]
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "audio" | "mp3" => Ok(Self::Audio),
            "video" | "mp4" => Ok(Self::Video),
            other => Err(format!("unknown media kind '{}' (expected audio or video)", other)),
        }
    }
}

impl MediaKind {
    /// Extension of the file handed back to the caller
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Audio => "mp3",
            Self::Video => "mp4",
        }
    }
}

/// Coarse target resolution bucket (video only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    High,
    #[default]
    Normal,
    Low,
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" | "alta" | "best" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" | "baja" | "worst" => Ok(Self::Low),
            other => Err(format!(
                "unknown quality tier '{}' (expected high, normal or low)",
                other
            )),
        }
    }
}

/// One URL to fetch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    url: String,
    media_kind: MediaKind,
    quality_tier: QualityTier,
    credential_path: Option<PathBuf>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, media_kind: MediaKind, quality_tier: QualityTier) -> Self {
        Self {
            url: url.into().trim().to_string(),
            media_kind,
            quality_tier,
            credential_path: None,
        }
    }

    pub fn audio(url: impl Into<String>) -> Self {
        Self::new(url, MediaKind::Audio, QualityTier::default())
    }

    pub fn video(url: impl Into<String>, quality_tier: QualityTier) -> Self {
        Self::new(url, MediaKind::Video, quality_tier)
    }

    /// Copy of this request with a cookie file attached
    pub fn with_credential(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            credential_path: Some(path.into()),
            ..self.clone()
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    pub fn quality_tier(&self) -> QualityTier {
        self.quality_tier
    }

    pub fn credential_path(&self) -> Option<&Path> {
        self.credential_path.as_deref()
    }
}

/// Terminal state of one orchestration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Ok,
    NeedsCredentials,
    Error,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::NeedsCredentials => write!(f, "needs credentials"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Result of one orchestration run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    status: OutcomeStatus,
    file_path: Option<PathBuf>,
    failure_cause: Option<FailureCause>,
    raw_message: Option<String>,
}

impl DownloadOutcome {
    pub fn ok(file_path: impl Into<PathBuf>) -> Self {
        Self {
            status: OutcomeStatus::Ok,
            file_path: Some(file_path.into()),
            failure_cause: None,
            raw_message: None,
        }
    }

    pub fn needs_credentials(cause: FailureCause, raw_message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::NeedsCredentials,
            file_path: None,
            failure_cause: Some(cause),
            raw_message: Some(raw_message.into()),
        }
    }

    pub fn error(cause: FailureCause, raw_message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            file_path: None,
            failure_cause: Some(cause),
            raw_message: Some(raw_message.into()),
        }
    }

    /// Map a classified failure to its terminal state
    pub fn from_failure(cause: FailureCause, raw_message: impl Into<String>) -> Self {
        if cause.needs_credentials() {
            Self::needs_credentials(cause, raw_message)
        } else {
            Self::error(cause, raw_message)
        }
    }

    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == OutcomeStatus::Ok
    }

    pub fn needs_credentials_retry(&self) -> bool {
        self.status == OutcomeStatus::NeedsCredentials
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn failure_cause(&self) -> Option<FailureCause> {
        self.failure_cause
    }

    pub fn raw_message(&self) -> Option<&str> {
        self.raw_message.as_deref()
    }
}

/// Network-robustness flags forwarded to the extractor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Retry count handled by the extractor itself
    pub retries: u32,

    /// Socket timeout in seconds
    pub socket_timeout: Option<u32>,

    pub geo_bypass: bool,

    /// Skip TLS certificate validation
    pub no_check_certificates: bool,

    /// SOCKS5/HTTP proxy URL (e.g., "socks5://127.0.0.1:1080")
    pub proxy: Option<String>,

    pub user_agent: Option<String>,

    /// Extra request headers as (name, value)
    pub headers: Vec<(String, String)>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            socket_timeout: Some(30),
            geo_bypass: true,
            no_check_certificates: true,
            proxy: None,
            user_agent: None,
            headers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_trims_url_and_attaches_credential_on_copy() {
        let req = DownloadRequest::video("  https://youtu.be/abc \n", QualityTier::Low);
        assert_eq!(req.url(), "https://youtu.be/abc");
        assert!(req.credential_path().is_none());

        let with_cookie = req.with_credential("/tmp/cookies.txt");
        assert_eq!(with_cookie.credential_path(), Some(Path::new("/tmp/cookies.txt")));
        assert_eq!(with_cookie.quality_tier(), QualityTier::Low);
        assert!(req.credential_path().is_none());
    }

    #[test]
    fn tier_and_kind_parse_form_labels() {
        assert_eq!("Alta".parse::<QualityTier>().unwrap(), QualityTier::High);
        assert_eq!("normal".parse::<QualityTier>().unwrap(), QualityTier::Normal);
        assert_eq!("Baja".parse::<QualityTier>().unwrap(), QualityTier::Low);
        assert_eq!("MP3".parse::<MediaKind>().unwrap(), MediaKind::Audio);
        assert!("flac".parse::<MediaKind>().is_err());
    }

    #[test]
    fn failure_maps_to_needs_credentials_only_for_access_causes() {
        let gated = DownloadOutcome::from_failure(FailureCause::GeoBlocked, "not available in your country");
        assert_eq!(gated.status(), OutcomeStatus::NeedsCredentials);

        let broken = DownloadOutcome::from_failure(FailureCause::Unknown, "boom");
        assert_eq!(broken.status(), OutcomeStatus::Error);
        assert_eq!(broken.raw_message(), Some("boom"));
    }

    #[test]
    fn outcome_serializes_status_in_caps() {
        let json = serde_json::to_value(DownloadOutcome::ok("/out/a.mp4")).unwrap();
        assert_eq!(json["status"], "OK");
        assert_eq!(json["file_path"], "/out/a.mp4");
    }
}
