// External tool discovery: yt-dlp, the Python yt_dlp module and ffmpeg

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::downloader::errors::DownloadError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    PythonYtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::PythonYtDlp => "python yt_dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

fn binary_name(base: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", base)
    } else {
        base.to_string()
    }
}

/// `<data_dir>/tubefetch/bin`, where `install-ytdlp` puts binaries
pub fn managed_bin_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("tubefetch").join("bin"))
}

/// Common install locations, then PATH, then the managed bin dir
fn locate(base: &str, env_override: &str) -> Option<String> {
    if let Ok(custom) = std::env::var(env_override) {
        if !custom.trim().is_empty() {
            return Some(custom);
        }
    }

    let name = binary_name(base);
    let common_paths = [
        format!("/opt/homebrew/bin/{}", name), // Homebrew on Apple Silicon
        format!("/usr/local/bin/{}", name),    // Homebrew on Intel Mac
        format!("/usr/bin/{}", name),          // System installation
    ];
    for path in common_paths {
        if std::path::Path::new(&path).exists() {
            return Some(path);
        }
    }

    if let Ok(path) = which::which(&name) {
        return Some(path.to_string_lossy().to_string());
    }

    let managed = managed_bin_dir()?.join(&name);
    managed
        .exists()
        .then(|| managed.to_string_lossy().to_string())
}

/// Find yt-dlp executable (`TUBEFETCH_YTDLP` overrides)
pub fn find_ytdlp() -> Option<String> {
    locate("yt-dlp", "TUBEFETCH_YTDLP")
}

/// Find ffmpeg executable (`TUBEFETCH_FFMPEG` overrides)
pub fn find_ffmpeg() -> Option<String> {
    locate("ffmpeg", "TUBEFETCH_FFMPEG")
}

/// Python interpreter; `YTDLP_PYTHON` points at a venv when needed
pub fn python_cmd() -> String {
    std::env::var("YTDLP_PYTHON").unwrap_or_else(|_| "python3".to_string())
}

pub struct ToolManager;

impl ToolManager {
    pub fn new() -> Self {
        Self
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let (path, version) = match tool_type {
            ToolType::YtDlp => {
                let path = find_ytdlp();
                let version = path.as_deref().and_then(|p| get_version(p, &["--version"]));
                (path, version)
            }
            ToolType::PythonYtDlp => {
                let py = python_cmd();
                let version = get_version(&py, &["-m", "yt_dlp", "--version"]);
                (version.as_ref().map(|_| py), version)
            }
            ToolType::Ffmpeg => {
                let path = find_ffmpeg();
                let version = path
                    .as_deref()
                    .and_then(|p| get_version(p, &["-version"]))
                    .and_then(|v| v.lines().next().map(str::to_string));
                (path, version)
            }
        };

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            is_available: path.is_some() && version.is_some(),
            version,
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::PythonYtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
        ]
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}

fn get_version(program: &str, args: &[&str]) -> Option<String> {
    match Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => {
            let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
            debug!("[tools] {} -> {}", program, out);
            (!out.is_empty()).then_some(out)
        }
        _ => None,
    }
}

fn release_url() -> &'static str {
    if cfg!(target_os = "windows") {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe"
    } else if cfg!(target_os = "macos") {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_macos"
    } else {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp"
    }
}

/// Download the latest yt-dlp release into the managed bin dir
pub async fn install_ytdlp(proxy: Option<&str>) -> Result<PathBuf, DownloadError> {
    let target = managed_bin_dir()
        .ok_or_else(|| DownloadError::Config("could not determine data directory".to_string()))?
        .join(binary_name("yt-dlp"));

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(120));
    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| DownloadError::Config(format!("invalid proxy {}: {}", proxy_url, e)))?;
        builder = builder.proxy(proxy);
    }
    let client = builder
        .build()
        .map_err(|e| DownloadError::Execution(format!("http client: {}", e)))?;

    info!("[tools] downloading {}", release_url());
    let response = client
        .get(release_url())
        .send()
        .await
        .map_err(|e| DownloadError::Execution(format!("download failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(DownloadError::Execution(format!(
            "download failed: HTTP {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DownloadError::Execution(format!("download failed: {}", e)))?;
    tokio::fs::write(&target, &bytes).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        tokio::fs::set_permissions(&target, perms).await?;
    }

    info!("[tools] installed yt-dlp at {}", target.display());
    Ok(target)
}
