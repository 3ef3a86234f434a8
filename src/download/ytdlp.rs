//! yt-dlp invocation
//!
//! Finds the binary, builds argument vectors and runs one child process per
//! request. Extraction, format selection, muxing and MP3 transcoding all
//! happen inside yt-dlp (and the ffmpeg it drives).

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use super::formats::RawVideoInfo;
use super::kind::DownloadKind;
use super::stream::{self, ByteStream};
use crate::error::AppError;
use crate::protocol::VideoInfo;
use crate::utils;

/// File name of the locally downloaded binary
#[cfg(windows)]
pub const BINARY_NAME: &str = "yt-dlp.exe";
#[cfg(not(windows))]
pub const BINARY_NAME: &str = "yt-dlp";

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves the yt-dlp binary: explicit override, then `<work dir>/yt-dlp`, then `PATH`.
///
/// Lookups are repeated until one succeeds, so a binary dropped in place
/// after startup is picked up by the next request.
pub struct YtDlpLocator {
    override_path: Option<PathBuf>,
    local_path: PathBuf,
    search_path: bool,
    cached: RwLock<Option<PathBuf>>,
}

impl YtDlpLocator {
    pub fn new(override_path: Option<PathBuf>, work_dir: &Path) -> Self {
        Self {
            override_path,
            local_path: work_dir.join(BINARY_NAME),
            search_path: true,
            cached: RwLock::new(None),
        }
    }

    /// Skip the `PATH` lookup
    #[cfg(test)]
    pub fn without_path_lookup(mut self) -> Self {
        self.search_path = false;
        self
    }

    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = self.cached.read().as_ref() {
            return Some(path.clone());
        }

        let found = self.resolve()?;
        info!("Using yt-dlp: {}", found.display());
        *self.cached.write() = Some(found.clone());
        Some(found)
    }

    /// Forget the cached path, e.g. after the binary disappeared
    pub fn invalidate(&self) {
        self.cached.write().take();
    }

    fn resolve(&self) -> Option<PathBuf> {
        if let Some(path) = &self.override_path {
            if path.is_file() {
                return Some(path.clone());
            }
            warn!("YT_DLP_PATH points to a missing file: {}", path.display());
        }

        if self.local_path.is_file() {
            return Some(self.local_path.clone());
        }

        if self.search_path {
            if let Ok(path) = which::which("yt-dlp") {
                return Some(path);
            }
        }

        debug!("yt-dlp binary not found");
        None
    }
}

/// Find deno for yt-dlp's JavaScript challenge solving
pub fn find_deno() -> Option<PathBuf> {
    which::which("deno").ok()
}

/// Build yt-dlp args with deno runtime if available
pub fn runtime_args(deno: Option<&Path>) -> Vec<String> {
    match deno {
        Some(deno_path) => vec![
            "--js-runtimes".to_string(),
            format!("deno:{}", deno_path.to_string_lossy()),
        ],
        None => vec![],
    }
}

/// Keep an explicitly configured ffmpeg only if it exists; otherwise yt-dlp searches `PATH` itself
pub fn find_ffmpeg(configured: Option<PathBuf>) -> Option<PathBuf> {
    let path = configured?;
    if path.exists() {
        Some(path)
    } else {
        warn!("FFMPEG_PATH points to a missing file: {}", path.display());
        None
    }
}

/// Runs yt-dlp on behalf of the HTTP handlers
pub struct YtDlp {
    locator: YtDlpLocator,
    ffmpeg_path: Option<PathBuf>,
    runtime_args: Vec<String>,
    info_timeout: Duration,
}

impl YtDlp {
    pub fn new(
        locator: YtDlpLocator,
        ffmpeg_path: Option<PathBuf>,
        runtime_args: Vec<String>,
        info_timeout: Duration,
    ) -> Self {
        Self {
            locator,
            ffmpeg_path,
            runtime_args,
            info_timeout,
        }
    }

    pub fn locator(&self) -> &YtDlpLocator {
        &self.locator
    }

    pub fn info_args(&self, url: &str) -> Vec<String> {
        let mut args = self.runtime_args.clone();
        args.extend(["-J", "--no-playlist", "--", url].map(String::from));
        args
    }

    pub fn download_args(&self, kind: &DownloadKind, url: &str) -> Vec<String> {
        let mut args = self.runtime_args.clone();
        args.push("-f".to_string());
        args.push(kind.format_selector());
        args.extend(kind.extra_args().iter().map(|a| a.to_string()));

        if let Some(ffmpeg) = &self.ffmpeg_path {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string_lossy().to_string());
        }

        args.extend(["--no-playlist", "--no-progress", "-o", "-", "--", url].map(String::from));
        args
    }

    /// Run `yt-dlp -J` and reduce its output to what the page shows
    pub async fn fetch_info(&self, url: &str) -> Result<VideoInfo, AppError> {
        let binary = self.binary()?;
        let args = self.info_args(url);
        debug!("Running {} {}", binary.display(), args.join(" "));

        let child = self
            .command(&binary)
            .args(&args)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // On timeout the child is dropped, and kill_on_drop stops it
        let output = match tokio::time::timeout(self.info_timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(AppError::Timeout(self.info_timeout.as_secs())),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp failed: {}", stderr.trim());
            return Err(AppError::YtDlpFailed {
                status: output.status.to_string(),
                message: utils::last_line(&stderr).unwrap_or("Unknown error").to_string(),
            });
        }

        let preview: String = String::from_utf8_lossy(&output.stdout).chars().take(200).collect();
        debug!("yt-dlp raw output (first 200 chars): {}", preview);

        let raw: RawVideoInfo = serde_json::from_slice(&output.stdout)?;
        Ok(raw.into_video_info())
    }

    /// Spawn a download writing to stdout and stream it
    pub async fn stream(&self, kind: &DownloadKind, url: &str) -> Result<ByteStream, AppError> {
        let binary = self.binary()?;
        let args = self.download_args(kind, url);
        debug!("Running {} {}", binary.display(), args.join(" "));

        let child = self
            .command(&binary)
            .args(&args)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        stream::from_child(child).await
    }

    /// `yt-dlp --version`, if the binary runs at all
    pub async fn version(&self) -> Option<String> {
        let binary = self.locator.locate()?;
        let child = self.command(&binary).arg("--version").spawn().ok()?;
        let output = tokio::time::timeout(VERSION_TIMEOUT, child.wait_with_output())
            .await
            .ok()?
            .ok()?;

        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn binary(&self) -> Result<PathBuf, AppError> {
        self.locator.locate().ok_or(AppError::YtDlpUnavailable)
    }

    fn command(&self, binary: &Path) -> TokioCommand {
        let mut cmd = TokioCommand::new(binary);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: io::Error) -> AppError {
        if e.kind() == io::ErrorKind::NotFound {
            warn!("yt-dlp binary vanished, looking it up again on the next request");
            self.locator.invalidate();
            AppError::YtDlpUnavailable
        } else {
            AppError::Io(e)
        }
    }
}
