// Helper functions for subprocess-backed tools

use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};

use crate::downloader::errors::DownloadError;
use crate::downloader::models::NetworkConfig;

/// Captured result of a finished child
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

fn spawn(program: &str, args: &[String]) -> Result<tokio::process::Child, DownloadError> {
    TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DownloadError::ToolNotFound(program.to_string())
            } else {
                DownloadError::Execution(format!("Failed to start {}: {}", program, e))
            }
        })
}

/// Run command with an optional timeout, capturing both pipes
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: Option<u64>,
) -> Result<CommandOutput, DownloadError> {
    let mut child = spawn(program, &args)?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::Execution(format!("Failed to capture stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::Execution(format!("Failed to capture stderr from {}", program)))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let status = match timeout_secs {
        Some(secs) => match timeout(TokioDuration::from_secs(secs), child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(DownloadError::Timeout(secs));
            }
        },
        None => child.wait().await?,
    };

    let stdout = join_pipe(stdout_task).await?;
    let stderr = join_pipe(stderr_task).await?;
    Ok(CommandOutput { status, stdout, stderr })
}

/// Run command, handing each stdout line to `on_line` as it arrives
pub async fn run_streaming<F>(
    program: &str,
    args: Vec<String>,
    mut on_line: F,
) -> Result<CommandOutput, DownloadError>
where
    F: FnMut(&str),
{
    let mut child = spawn(program, &args)?;

    let stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::Execution(format!("Failed to capture stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::Execution(format!("Failed to capture stderr from {}", program)))?;

    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let mut stdout = Vec::new();
    let mut lines = BufReader::new(stdout_pipe).lines();
    while let Some(line) = lines.next_line().await? {
        on_line(&line);
        stdout.extend_from_slice(line.as_bytes());
        stdout.push(b'\n');
    }

    let status = child.wait().await?;
    let stderr = join_pipe(stderr_task).await?;
    Ok(CommandOutput { status, stdout, stderr })
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
) -> Result<Vec<u8>, DownloadError> {
    task.await
        .map_err(|e| DownloadError::Execution(format!("pipe reader failed: {}", e)))?
        .map_err(DownloadError::from)
}

/// Build network arguments for yt-dlp
pub fn get_network_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = vec!["--retries".to_string(), config.retries.to_string()];

    if let Some(timeout) = config.socket_timeout {
        args.push("--socket-timeout".to_string());
        args.push(timeout.to_string());
    }
    if config.geo_bypass {
        args.push("--geo-bypass".to_string());
    }
    if config.no_check_certificates {
        args.push("--no-check-certificates".to_string());
    }
    if let Some(proxy) = &config.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }
    if let Some(agent) = &config.user_agent {
        args.push("--user-agent".to_string());
        args.push(agent.clone());
    }
    for (name, value) in &config.headers {
        args.push("--add-header".to_string());
        args.push(format!("{}:{}", name, value));
    }

    args
}
