//! Getting audio onto local disk: uploads pass straight through, remote media
//! URLs are fetched with `yt-dlp`.

use crate::error::{Result, StemError};

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    time::SystemTime,
};
use tracing::{debug, info, warn};

/// Extension the downloader transcodes to.
pub const AUDIO_CODEC: &str = "mp3";

/// Fetches the best available audio for `url` into `outdir` as `<title>.mp3`
/// and returns the media title.
pub trait MediaDownloader: Send + Sync {
    fn download(&self, url: &str, outdir: &Path) -> Result<String>;
}

/// Where the audio for one request comes from.
#[derive(Debug, Clone)]
pub enum AudioSource {
    Upload(PathBuf),
    Remote(String),
}

impl AudioSource {
    pub fn resolve(&self, downloader: &dyn MediaDownloader, download_dir: &Path) -> Result<PathBuf> {
        match self {
            AudioSource::Upload(path) => Ok(path.clone()),
            AudioSource::Remote(url) => fetch_audio(downloader, url, download_dir),
        }
    }
}

/// Download `url` into `outdir` and find the file it produced.
///
/// The expected `<title>.mp3` wins; otherwise the most recently modified file
/// in `outdir` is taken. Concurrent downloads into the same directory can
/// pick each other's files, so callers serialize them.
pub fn fetch_audio(downloader: &dyn MediaDownloader, url: &str, outdir: &Path) -> Result<PathBuf> {
    let url = url.trim();
    if url.is_empty() {
        return Err(StemError::MissingUrl);
    }

    fs::create_dir_all(outdir)?;
    info!(url, outdir = %outdir.display(), "downloading audio");
    let title = downloader.download(url, outdir)?;

    let expected = outdir.join(format!("{title}.{AUDIO_CODEC}"));
    if expected.is_file() {
        return Ok(expected);
    }

    warn!(expected = %expected.display(), "title-derived file missing, using newest file");
    newest_file(outdir)?.ok_or(StemError::DownloadFailed)
}

fn newest_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, entry.path()));
        }
    }
    Ok(newest.map(|(_, p)| p))
}

/// `yt-dlp` driven as a child process.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl YtDlp {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, url: &str, outdir: &Path) -> Command {
        let template = outdir.join("%(title)s.%(ext)s");
        let mut cmd = Command::new(&self.program);
        cmd.arg("--format")
            .arg("bestaudio/best")
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg(AUDIO_CODEC)
            .arg("--audio-quality")
            .arg("0")
            .arg("--output")
            .arg(template)
            .arg("--quiet")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg("--print")
            .arg("after_move:title")
            .arg(url);
        cmd
    }
}

impl MediaDownloader for YtDlp {
    fn download(&self, url: &str, outdir: &Path) -> Result<String> {
        let output = self.command(url, outdir).output().map_err(|e| {
            StemError::Downloader(format!("failed to run `{}`: {e}", self.program))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StemError::Downloader(format!(
                "`{}` exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let title = stdout
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .unwrap_or("download")
            .to_string();
        debug!(title = %title, "downloader finished");
        Ok(title)
    }
}
