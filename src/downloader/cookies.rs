// Cookie provisioning
//
// A session keeps one private copy of the credential file. Workers only
// read it. The copy is deleted when the `CookieFile` is dropped, so nothing
// outlives the session, and the user's original file is never touched.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::downloader::errors::DownloadError;

pub struct CookieFile {
    file: NamedTempFile,
}

impl CookieFile {
    /// Persist uploaded bytes to a session-owned temp file
    pub fn persist(contents: &[u8]) -> Result<Self, DownloadError> {
        if contents.iter().all(u8::is_ascii_whitespace) {
            return Err(DownloadError::Config("cookie file is empty".to_string()));
        }
        if !looks_like_netscape(contents) {
            warn!("[cookies] file does not look like a Netscape cookies.txt; yt-dlp may reject it");
        }

        let mut file = tempfile::Builder::new()
            .prefix("tubefetch-cookies-")
            .suffix(".txt")
            .tempfile()?;
        file.write_all(contents)?;
        file.flush()?;

        info!("[cookies] provisioned {}", file.path().display());
        Ok(Self { file })
    }

    /// Copy a user-supplied cookies.txt into the session
    pub fn from_path(path: &Path) -> Result<Self, DownloadError> {
        let contents = std::fs::read(path).map_err(|e| {
            DownloadError::Config(format!("cannot read cookie file {}: {}", path.display(), e))
        })?;
        Self::persist(&contents)
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Header line, or at least one 7-field tab-separated record
fn looks_like_netscape(contents: &[u8]) -> bool {
    let text = String::from_utf8_lossy(contents);
    text.lines().map(str::trim).any(|line| {
        line.starts_with("# Netscape HTTP Cookie File")
            || line.starts_with("# HTTP Cookie File")
            || (!line.starts_with('#') && line.split('\t').count() == 7)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Netscape HTTP Cookie File\n.youtube.com\tTRUE\t/\tTRUE\t0\tSID\tabc\n";

    #[test]
    fn persisted_copy_is_removed_on_drop() {
        let cookie = CookieFile::persist(SAMPLE.as_bytes()).unwrap();
        let path = cookie.path().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), SAMPLE);

        drop(cookie);
        assert!(!path.exists());
    }

    #[test]
    fn from_path_leaves_original_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("cookies.txt");
        std::fs::write(&original, SAMPLE).unwrap();

        let cookie = CookieFile::from_path(&original).unwrap();
        assert_ne!(cookie.path(), original.as_path());
        drop(cookie);
        assert!(original.exists());
    }

    #[test]
    fn empty_or_missing_files_are_rejected() {
        assert!(matches!(CookieFile::persist(b"  \n"), Err(DownloadError::Config(_))));
        assert!(CookieFile::from_path(Path::new("/definitely/not/here.txt")).is_err());
    }

    #[test]
    fn netscape_detection() {
        assert!(looks_like_netscape(SAMPLE.as_bytes()));
        assert!(looks_like_netscape(b".x.com\tTRUE\t/\tFALSE\t0\tk\tv"));
        assert!(!looks_like_netscape(b"{\"cookies\": []}"));
    }
}
