// tubefetch - resilient batch downloads on top of yt-dlp and ffmpeg

pub mod cli;
pub mod downloader;
pub mod settings;
