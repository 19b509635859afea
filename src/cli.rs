// Command-line surface: fetch, probe, tools, install-ytdlp

use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::downloader::diagnostics::headline;
use crate::downloader::extractors::YtDlpBackend;
use crate::downloader::format_selector::FormatSelector;
use crate::downloader::tools::{self, ToolManager};
use crate::downloader::{
    BatchDownloader, BatchReport, CookieFile, DownloadOutcome, DownloadRequest, Downloader,
    FfmpegTranscoder, MediaKind, OutcomeStatus, ProgressEmitter, ProgressEvent, QualityTier,
};
use crate::settings::Settings;

/// Exit status when at least one item did not finish OK
const EXIT_PARTIAL: u8 = 2;

#[derive(Parser)]
#[command(name = "tubefetch")]
#[command(about = "Resilient batch downloader built on yt-dlp and ffmpeg")]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to <config_dir>/tubefetch/settings.json)
    #[arg(long, global = true, env = "TUBEFETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Download one or more links
    Fetch(FetchArgs),

    /// Show metadata and the format that would be requested
    Probe {
        url: String,
        #[arg(long, default_value = "video")]
        kind: MediaKind,
        #[arg(long, default_value = "normal")]
        quality: QualityTier,
        /// cookies.txt to send with the probe
        #[arg(long)]
        cookies: Option<PathBuf>,
    },

    /// Report availability and versions of yt-dlp, python yt_dlp and ffmpeg
    Tools {
        #[arg(long)]
        json: bool,
    },

    /// Download the latest yt-dlp release into the managed bin directory
    InstallYtdlp {
        /// Proxy for the download (defaults to network.proxy from settings)
        #[arg(long)]
        proxy: Option<String>,
    },
}

#[derive(Args)]
struct FetchArgs {
    /// Links to download
    urls: Vec<String>,

    /// File with one link per line ("-" for stdin)
    #[arg(long)]
    links_file: Option<PathBuf>,

    #[arg(long, default_value = "video")]
    kind: MediaKind,

    /// high, normal or low (video only)
    #[arg(long, default_value = "normal")]
    quality: QualityTier,

    /// Netscape cookies.txt for age-gated, private or region-locked items
    #[arg(long)]
    cookies: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Items downloaded at once
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Per-item timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Keep the downloaded container instead of re-encoding to H.264/AAC
    #[arg(long)]
    no_transcode: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    debug!("[cli] settings: {:?}", settings);

    match cli.command {
        Commands::Fetch(args) => cmd_fetch(settings, args).await,
        Commands::Probe {
            url,
            kind,
            quality,
            cookies,
        } => cmd_probe(settings, &url, kind, quality, cookies.as_deref()).await,
        Commands::Tools { json } => cmd_tools(json),
        Commands::InstallYtdlp { proxy } => {
            let proxy = proxy.or_else(|| settings.network.proxy.clone());
            let path = tools::install_ytdlp(proxy.as_deref())
                .await
                .context("Failed to install yt-dlp")?;
            println!("yt-dlp installed at {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_downloader(settings: &Settings) -> Downloader {
    let backend = YtDlpBackend::new(
        settings.launcher,
        settings.ytdlp_path.clone(),
        settings.python.clone(),
    );
    info!("[cli] extractor: {} ({})", backend.program(), backend.mode());
    Downloader::new(
        Arc::new(backend),
        Arc::new(FfmpegTranscoder::new(settings.ffmpeg_path.clone())),
        settings.downloader_config(),
    )
}

async fn cmd_fetch(mut settings: Settings, args: FetchArgs) -> anyhow::Result<ExitCode> {
    let mut links = args.urls.clone();
    if let Some(path) = &args.links_file {
        links.extend(read_links(path).await?);
    }
    if links.iter().all(|l| l.trim().is_empty()) {
        warn!("No links provided");
        return Ok(ExitCode::FAILURE);
    }

    if let Some(dir) = args.output {
        settings.output_dir = dir;
    }
    if let Some(n) = args.concurrency {
        settings.concurrency = n;
    }
    if args.timeout.is_some() {
        settings.item_timeout_secs = args.timeout;
    }
    if args.no_transcode {
        settings.transcode = false;
    }

    let cookie = args
        .cookies
        .as_deref()
        .map(CookieFile::from_path)
        .transpose()
        .context("Failed to load cookie file")?;

    let batch = BatchDownloader::new(build_downloader(&settings), settings.batch_options());
    let (emitter, rx) = ProgressEmitter::channel();
    let renderer = tokio::spawn(render_progress(rx));

    let mut report = batch
        .run(&links, args.kind, args.quality, cookie.as_ref(), &emitter)
        .await
        .context("Batch rejected")?;

    let waiting = report.needs_credentials().len();
    let interactive = !args.json && std::io::stdin().is_terminal();
    match credential_follow_up(
        waiting,
        cookie.is_some(),
        settings.auto_credential_retry,
        interactive,
    ) {
        CredentialFollowUp::Done => {}
        CredentialFollowUp::ConfirmSupplied => {
            if let Some(cookie) = cookie.as_ref() {
                if confirm_retry(waiting).await? {
                    batch.retry_with_credentials(&mut report, cookie, &emitter).await;
                }
            }
        }
        CredentialFollowUp::PromptForFile => {
            if let Some(cookie) = prompt_for_cookie(waiting).await? {
                batch.retry_with_credentials(&mut report, &cookie, &emitter).await;
            }
        }
        CredentialFollowUp::WarnUnused => warn!(
            "{} item(s) need credentials; --cookies was not used because auto_credential_retry is off",
            waiting
        ),
    }

    drop(emitter);
    let _ = renderer.await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(if report.all_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PARTIAL)
    })
}

/// One link per line; blank lines dropped
async fn read_links(path: &Path) -> anyhow::Result<Vec<String>> {
    let contents = if path == Path::new("-") {
        let mut contents = String::new();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            contents.push_str(&line);
            contents.push('\n');
        }
        contents
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?
    };

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Next step for items still waiting for credentials after the first pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialFollowUp {
    /// Nothing waiting, or the supplied cookie was already tried
    Done,
    /// Ask before retrying with the cookie given on the command line
    ConfirmSupplied,
    /// Ask for a cookie file
    PromptForFile,
    /// Cookie given but no way to ask; say it went unused
    WarnUnused,
}

fn credential_follow_up(
    waiting: usize,
    cookie_supplied: bool,
    auto_retry: bool,
    interactive: bool,
) -> CredentialFollowUp {
    match (waiting, cookie_supplied, auto_retry, interactive) {
        (0, ..) => CredentialFollowUp::Done,
        (_, true, true, _) => CredentialFollowUp::Done,
        (_, true, false, true) => CredentialFollowUp::ConfirmSupplied,
        (_, true, false, false) => CredentialFollowUp::WarnUnused,
        (_, false, _, true) => CredentialFollowUp::PromptForFile,
        (_, false, _, false) => CredentialFollowUp::Done,
    }
}

async fn confirm_retry(waiting: usize) -> anyhow::Result<bool> {
    eprintln!(
        "{} item(s) need credentials. Retry them once with the supplied cookies? [Y/n]",
        waiting
    );
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "" | "y" | "yes"))
}

async fn prompt_for_cookie(waiting: usize) -> anyhow::Result<Option<CookieFile>> {
    eprintln!(
        "{} item(s) need credentials. Path to a cookies.txt to retry once (empty to skip):",
        waiting
    );
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    let path = line.trim();
    if path.is_empty() {
        return Ok(None);
    }
    match CookieFile::from_path(Path::new(path)) {
        Ok(cookie) => Ok(Some(cookie)),
        Err(e) => {
            warn!("Skipping credential retry: {}", e);
            Ok(None)
        }
    }
}

/// Log events as they arrive; download progress is reported per quarter
async fn render_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    let mut last_quarter: HashMap<String, u32> = HashMap::new();
    while let Some(event) = rx.recv().await {
        match &event {
            ProgressEvent::Started { url } => {
                last_quarter.remove(url);
                info!("→ {}", url);
            }
            ProgressEvent::Progress { url, percent, status } => {
                let quarter = (*percent / 25.0).floor() as u32;
                let previous = last_quarter.insert(url.clone(), quarter);
                if previous.map_or(true, |p| quarter > p) {
                    info!("  {} {:>5.1}% {}", url, percent, status);
                } else {
                    debug!("  {} {:>5.1}% {}", url, percent, status);
                }
            }
            ProgressEvent::Retrying { url } => info!("↻ {} (with cookies)", url),
            ProgressEvent::Finished { url, status } => info!("{} {}", status_marker(*status), url),
        }
    }
}

fn status_marker(status: OutcomeStatus) -> &'static str {
    match status {
        OutcomeStatus::Ok => "✓",
        OutcomeStatus::NeedsCredentials => "🔒",
        OutcomeStatus::Error => "✗",
    }
}

fn print_report(report: &BatchReport) {
    for entry in report.iter() {
        println!("{}", describe(&entry.url, &entry.outcome));
    }
    println!(
        "\n{} ok, {} need credentials, {} failed",
        report.count(OutcomeStatus::Ok),
        report.count(OutcomeStatus::NeedsCredentials),
        report.count(OutcomeStatus::Error)
    );
}

fn describe(url: &str, outcome: &DownloadOutcome) -> String {
    let marker = status_marker(outcome.status());
    if let Some(path) = outcome.file_path() {
        return format!("{} {} -> {}", marker, url, path.display());
    }
    let raw = outcome.raw_message().map(headline).unwrap_or("");
    match outcome.failure_cause() {
        Some(cause) => format!(
            "{} {} [{}] {}\n    {}\n    hint: {}",
            marker,
            url,
            cause,
            cause.description(),
            raw,
            cause.suggestion()
        ),
        None => format!("{} {} {}", marker, url, raw),
    }
}

async fn cmd_probe(
    settings: Settings,
    url: &str,
    kind: MediaKind,
    quality: QualityTier,
    cookies: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let cookie = cookies
        .map(CookieFile::from_path)
        .transpose()
        .context("Failed to load cookie file")?;
    let mut request = DownloadRequest::new(url, kind, quality);
    if let Some(cookie) = &cookie {
        request = request.with_credential(cookie.path());
    }

    match build_downloader(&settings).probe(&request).await {
        Ok((probe, format)) => {
            let heights = probe.video_heights();
            println!("Title:    {}", probe.title);
            println!("Uploader: {}", probe.uploader);
            println!("Duration: {}s", probe.duration_seconds);
            println!(
                "Heights:  {}",
                heights.iter().map(|h| format!("{}p", h)).collect::<Vec<_>>().join(", ")
            );
            println!("Format:   {}", format);
            println!("Suggested tier: {}", FormatSelector::recommend_tier(&heights));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let raw = e.raw_message();
            let outcome = DownloadOutcome::from_failure(crate::downloader::classify(&raw), raw);
            println!("{}", describe(url, &outcome));
            Ok(ExitCode::from(EXIT_PARTIAL))
        }
    }
}

fn cmd_tools(json: bool) -> anyhow::Result<ExitCode> {
    let tools = ToolManager::new().get_all_tools();
    if json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
    } else {
        for tool in &tools {
            println!(
                "{} {:<14} {:<12} {}",
                if tool.is_available { "✓" } else { "✗" },
                tool.name,
                tool.version.as_deref().unwrap_or("-"),
                tool.path.as_deref().unwrap_or("not found")
            );
        }
        if let Some(dir) = tools::managed_bin_dir() {
            println!("\nManaged bin directory: {}", dir.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}
