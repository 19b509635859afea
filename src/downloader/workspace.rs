// Per-task scratch space
//
// Every orchestration run gets its own directory named after a fresh UUID,
// and every artifact inside is named after that UUID, never after the
// title. Dropping the workspace (including on timeout cancellation) removes
// the directory and whatever partial files it holds.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct TaskWorkspace {
    id: Uuid,
    dir: TempDir,
}

impl TaskWorkspace {
    pub fn create(work_root: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(work_root)?;
        let id = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix(&format!("tubefetch-{}-", id))
            .tempdir_in(work_root)?;
        debug!("[workspace] {} -> {}", id, dir.path().display());
        Ok(Self { id, dir })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// yt-dlp output template inside the workspace
    pub fn output_template(&self) -> PathBuf {
        self.dir.path().join(format!("{}.%(ext)s", self.id))
    }

    /// Destination for the re-encoded file
    pub fn transcoded_path(&self) -> PathBuf {
        self.dir.path().join(format!("{}.final.mp4", self.id))
    }

    /// Remove the directory now, reporting failures instead of swallowing them
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("[workspace] failed to remove {}: {}", path.display(), e);
        }
    }
}

/// Filesystem-safe base name for a title
pub fn safe_stem(title: &str) -> String {
    let cleaned = sanitize_filename::sanitize(title.trim());
    let stem: String = cleaned.chars().take(150).collect();
    let stem = stem.trim().trim_matches('.').to_string();
    if stem.is_empty() {
        "download".to_string()
    } else {
        stem
    }
}

/// Placeholder claimed in the output directory; removed on drop unless kept
struct Reservation {
    path: Option<PathBuf>,
}

impl Reservation {
    fn keep(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!("[workspace] failed to release {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Move `artifact` into `output_dir` as `<title>.<ext>`, picking
/// `<title> (n).<ext>` when the name is taken. The name is reserved with
/// create-new semantics so concurrent tasks with equal titles cannot clash.
pub async fn deliver(
    artifact: &Path,
    output_dir: &Path,
    title: &str,
    ext: &str,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(output_dir).await?;
    let stem = safe_stem(title);

    let mut attempt = 0u32;
    let reservation = loop {
        let name = if attempt == 0 {
            format!("{}.{}", stem, ext)
        } else {
            format!("{} ({}).{}", stem, attempt, ext)
        };
        let candidate = output_dir.join(name);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => {
                break Reservation {
                    path: Some(candidate),
                }
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    };

    // Cancellation or failure past this point drops the reservation
    let target = reservation.path.clone().unwrap_or_default();
    if tokio::fs::rename(artifact, &target).await.is_err() {
        // Different filesystem: copy over the reserved file instead
        tokio::fs::copy(artifact, &target).await?;
        if let Err(e) = tokio::fs::remove_file(artifact).await {
            debug!("[workspace] leaving {} to workspace cleanup: {}", artifact.display(), e);
        }
    }

    Ok(reservation.keep())
}
