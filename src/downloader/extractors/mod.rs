// Extraction backends
//
// yt-dlp is launched either as the native binary or as `python3 -m yt_dlp`;
// Auto picks the binary when one is installed.

mod traits;
mod ytdlp;

pub use traits::{
    find_output_for_template, DownloadJob, ExtendedFormat, ExtractionBackend, ExtractorConfig,
    ExtractorMode, ProbeResult,
};
pub use ytdlp::{parse_ytdlp_progress, YtDlpBackend};
