// Failure diagnostics - maps raw extractor messages to a coarse cause
//
// The table is evaluated top to bottom and the first matching row wins, so
// a message mentioning both "private" and "403" is PRIVATE. When the message
// carries `ERROR:` lines only those are matched; retry warnings printed
// before the failure never decide the cause.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a download failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCause {
    /// Sign-in required to confirm age
    AgeRestricted,

    /// Private or members-only content
    Private,

    /// Not available in the caller's country/region
    GeoBlocked,

    /// HTTP 403 Forbidden
    Forbidden,

    /// Requested format expression matched nothing
    FormatUnavailable,

    Unknown,
}

impl FailureCause {
    /// Whether a cookie file might unlock the content
    pub fn needs_credentials(&self) -> bool {
        matches!(
            self,
            Self::AgeRestricted | Self::Private | Self::GeoBlocked | Self::Forbidden
        )
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::AgeRestricted => "Age-restricted content",
            Self::Private => "Private or members-only content",
            Self::GeoBlocked => "Geographic restriction",
            Self::Forbidden => "Access denied (HTTP 403)",
            Self::FormatUnavailable => "Requested format not available",
            Self::Unknown => "Unknown error",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::AgeRestricted => {
                "Export cookies.txt from a browser logged into an 18+ account and retry with --cookies"
            }
            Self::Private => {
                "Use cookies from an account that has access (owner, invited viewer or channel member)"
            }
            Self::GeoBlocked => "Use cookies from an account in an allowed region, or a proxy there",
            Self::Forbidden => "Refresh cookies (re-login), wait a while, or try a different network",
            Self::FormatUnavailable => "Try another quality tier",
            Self::Unknown => "Check the URL and try again later",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AgeRestricted => "AGE_RESTRICTED",
            Self::Private => "PRIVATE",
            Self::GeoBlocked => "GEO_BLOCKED",
            Self::Forbidden => "FORBIDDEN",
            Self::FormatUnavailable => "FORMAT_UNAVAILABLE",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// Ordered (pattern, cause) rules; patterns are lowercase.
const RULES: &[(&str, FailureCause)] = &[
    ("confirm your age", FailureCause::AgeRestricted),
    ("age-restricted", FailureCause::AgeRestricted),
    ("age restricted", FailureCause::AgeRestricted),
    ("age_verification", FailureCause::AgeRestricted),
    ("inappropriate for some users", FailureCause::AgeRestricted),
    ("private", FailureCause::Private),
    ("members-only", FailureCause::Private),
    ("members only", FailureCause::Private),
    ("join this channel", FailureCause::Private),
    ("available to members", FailureCause::Private),
    ("granted access", FailureCause::Private),
    ("not available in your country", FailureCause::GeoBlocked),
    ("blocked in your country", FailureCause::GeoBlocked),
    ("not made this video available in your country", FailureCause::GeoBlocked),
    ("not available in your region", FailureCause::GeoBlocked),
    ("geo restricted", FailureCause::GeoBlocked),
    ("geo-restricted", FailureCause::GeoBlocked),
    ("georestricted", FailureCause::GeoBlocked),
    ("403", FailureCause::Forbidden),
    ("forbidden", FailureCause::Forbidden),
    ("format not available", FailureCause::FormatUnavailable),
    ("format is not available", FailureCause::FormatUnavailable),
    ("no video formats found", FailureCause::FormatUnavailable),
];

/// Cause plus the rule that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnosis {
    pub cause: FailureCause,
    pub matched_pattern: Option<&'static str>,
}

/// `ERROR:` lines of a message, or the whole message when there are none
fn error_scope(message: &str) -> String {
    let errors: Vec<&str> = message
        .lines()
        .map(str::trim)
        .filter(|line| is_error_line(line))
        .collect();
    if errors.is_empty() {
        message.to_string()
    } else {
        errors.join("\n")
    }
}

fn is_error_line(line: &str) -> bool {
    line.get(..6)
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case("error:"))
}

/// Analyze an error message and report which rule fired
pub fn diagnose(message: &str) -> Diagnosis {
    let lower = error_scope(message).to_lowercase();

    RULES
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|&(pattern, cause)| Diagnosis {
            cause,
            matched_pattern: Some(pattern),
        })
        .unwrap_or(Diagnosis {
            cause: FailureCause::Unknown,
            matched_pattern: None,
        })
}

pub fn classify(message: &str) -> FailureCause {
    diagnose(message).cause
}

/// First line that looks like the actual error, for compact display
pub fn headline(message: &str) -> &str {
    message
        .lines()
        .map(str::trim)
        .find(|line| is_error_line(line))
        .or_else(|| message.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("")
}
