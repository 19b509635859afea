// Batch orchestration over the single-URL Downloader
//
// Items run on a bounded pool and report progress as they complete. One
// item's failure never cancels the others. The report is keyed by URL and
// iterates in submission order.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use super::cookies::CookieFile;
use super::errors::DownloadError;
use super::models::{DownloadOutcome, DownloadRequest, MediaKind, OutcomeStatus, QualityTier};
use super::orchestrator::Downloader;
use super::traits::{ProgressEmitter, ProgressEvent};

pub const DEFAULT_MAX_BATCH: usize = 10;
pub const MAX_CONCURRENCY: usize = 8;

/// Available parallelism clamped to 1..=8
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .clamp(1, MAX_CONCURRENCY)
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Items in flight at once (1 = sequential)
    pub concurrency: usize,
    pub max_batch: usize,
    /// Retry credential-gated items right away when a cookie came with the batch
    pub auto_credential_retry: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_batch: DEFAULT_MAX_BATCH,
            auto_credential_retry: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub url: String,
    pub outcome: DownloadOutcome,
    /// Whether the outcome came from the cookie retry
    pub retried: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    media_kind: MediaKind,
    quality_tier: QualityTier,
    entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn outcome(&self, url: &str) -> Option<&DownloadOutcome> {
        self.entries.iter().find(|e| e.url == url).map(|e| &e.outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// URLs still waiting for a cookie file
    pub fn needs_credentials(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.outcome.needs_credentials_retry())
            .map(|e| e.url.as_str())
            .collect()
    }

    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.entries.iter().filter(|e| e.outcome.status() == status).count()
    }

    pub fn all_ok(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_ok())
    }
}

pub struct BatchDownloader {
    downloader: Downloader,
    options: BatchOptions,
}

impl BatchDownloader {
    pub fn new(downloader: Downloader, options: BatchOptions) -> Self {
        Self { downloader, options }
    }

    /// Trim, drop blanks and duplicates, then enforce the size limit
    pub fn prepare<S: AsRef<str>>(&self, urls: &[S]) -> Result<Vec<String>, DownloadError> {
        let mut seen = HashSet::new();
        let links: Vec<String> = urls
            .iter()
            .map(|u| u.as_ref().trim())
            .filter(|u| !u.is_empty())
            .filter(|u| seen.insert(u.to_string()))
            .map(str::to_string)
            .collect();

        if links.is_empty() {
            return Err(DownloadError::InvalidBatch("no links provided".to_string()));
        }
        if links.len() > self.options.max_batch {
            return Err(DownloadError::InvalidBatch(format!(
                "{} links exceed the limit of {}",
                links.len(),
                self.options.max_batch
            )));
        }
        Ok(links)
    }

    /// Run every URL to a terminal outcome
    pub async fn run<S: AsRef<str>>(
        &self,
        urls: &[S],
        media_kind: MediaKind,
        quality_tier: QualityTier,
        cookie: Option<&CookieFile>,
        progress: &ProgressEmitter,
    ) -> Result<BatchReport, DownloadError> {
        let links = self.prepare(urls)?;
        info!(
            "[Batch] {} links, kind={} tier={} concurrency={}",
            links.len(),
            media_kind,
            quality_tier,
            self.concurrency()
        );

        let requests: Vec<DownloadRequest> = links
            .iter()
            .map(|url| DownloadRequest::new(url.as_str(), media_kind, quality_tier))
            .collect();
        let outcomes = self.fetch_all(&requests, progress).await;

        let mut report = BatchReport {
            media_kind,
            quality_tier,
            entries: links
                .into_iter()
                .zip(outcomes)
                .map(|(url, outcome)| BatchEntry {
                    url,
                    outcome,
                    retried: false,
                })
                .collect(),
        };

        if let Some(cookie) = cookie {
            if self.options.auto_credential_retry {
                self.retry_with_credentials(&mut report, cookie, progress).await;
            }
        }

        info!(
            "[Batch] done: {} ok, {} need credentials, {} failed",
            report.count(OutcomeStatus::Ok),
            report.count(OutcomeStatus::NeedsCredentials),
            report.count(OutcomeStatus::Error)
        );
        Ok(report)
    }

    /// Re-run the NEEDS_CREDENTIALS items once with `cookie` attached and
    /// replace their outcomes. Items already retried are left alone.
    pub async fn retry_with_credentials(
        &self,
        report: &mut BatchReport,
        cookie: &CookieFile,
        progress: &ProgressEmitter,
    ) -> usize {
        let pending: Vec<usize> = report
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.outcome.needs_credentials_retry() && !e.retried)
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return 0;
        }

        info!("[Batch] retrying {} items with cookies", pending.len());
        let requests: Vec<DownloadRequest> = pending
            .iter()
            .map(|&i| {
                let url = report.entries[i].url.as_str();
                progress.emit(ProgressEvent::Retrying { url: url.to_string() });
                DownloadRequest::new(url, report.media_kind, report.quality_tier)
                    .with_credential(cookie.path())
            })
            .collect();
        let outcomes = self.fetch_all(&requests, progress).await;

        for (i, outcome) in pending.iter().copied().zip(outcomes) {
            let entry = &mut report.entries[i];
            if !outcome.is_ok() {
                warn!("[Batch] {} still failing with cookies: {:?}", entry.url, outcome.failure_cause());
            }
            entry.outcome = outcome;
            entry.retried = true;
        }
        pending.len()
    }

    fn concurrency(&self) -> usize {
        self.options.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    /// Outcomes in the order of `requests`
    async fn fetch_all(&self, requests: &[DownloadRequest], progress: &ProgressEmitter) -> Vec<DownloadOutcome> {
        let mut indexed: Vec<(usize, DownloadOutcome)> = stream::iter(requests.iter().enumerate())
            .map(|(i, request)| async move { (i, self.downloader.fetch(request, progress).await) })
            .buffer_unordered(self.concurrency())
            .collect()
            .await;
        indexed.sort_by_key(|(i, _)| *i);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }
}
