//! yt-dlp wrapper for video extraction
//!
//! Metadata comes from `yt-dlp --dump-json`; bytes are streamed directly when the
//! format exposes a plain HTTP URL and fetched by yt-dlp itself otherwise.

use crate::downloader::engine::DownloadEngine;
use crate::downloader::progress::TransferEvent;
use crate::extractor::models::{ExtractedMedia, StreamDescriptor, VideoInfo};
use crate::extractor::traits::Extractor;
use crate::utils::config::AppSettings;
use crate::utils::error::{truncate_diagnostic, TubefetchError, FETCH_DIAGNOSTIC_LIMIT};
use crate::utils::platform;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, error, info};

/// stderr fragments meaning the video itself cannot be accessed
const UNAVAILABLE_MARKERS: &[&str] = &[
    "private video",
    "video unavailable",
    "has been removed",
    "available in your country",
    "geo restricted",
    "geo-restricted",
    "members-only",
    "join this channel",
    "sign in to confirm your age",
    "account associated with this video has been terminated",
];

/// Extraction collaborator backed by yt-dlp
pub struct YtDlpExtractor {
    ytdlp_path: PathBuf,
    engine: DownloadEngine,
    extract_timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(ytdlp_path: PathBuf, engine: DownloadEngine, extract_timeout: Duration) -> Self {
        Self {
            ytdlp_path,
            engine,
            extract_timeout,
        }
    }

    /// Locate yt-dlp and build the extractor from settings
    pub fn from_settings(settings: &AppSettings) -> Result<Self> {
        let ytdlp_path = match platform::ytdlp_path(settings.ytdlp_path.as_deref()) {
            Some(path) => {
                info!("Found yt-dlp at: {}", path.display());
                path
            }
            None => {
                error!("yt-dlp not found anywhere!");
                return Err(TubefetchError::YtDlpNotFound.into());
            }
        };
        let engine = DownloadEngine::new(settings.transfer_timeout())?;
        Ok(Self::new(ytdlp_path, engine, settings.extract_timeout()))
    }

    /// Get the path to yt-dlp being used
    pub fn ytdlp_path(&self) -> &Path {
        &self.ytdlp_path
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn id(&self) -> &'static str {
        "ytdlp"
    }

    async fn extract_info(&self, url: &str) -> Result<ExtractedMedia> {
        debug!("Extracting video info for URL: {}", url);

        let mut cmd = AsyncCommand::new(&self.ytdlp_path);
        cmd.arg("--dump-json")
            .arg("--no-download")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.extract_timeout, cmd.output()).await {
            Ok(output) => output?,
            Err(_) => {
                error!("yt-dlp extraction timed out after {:?}", self.extract_timeout);
                return Err(TubefetchError::FetchError(format!(
                    "yt-dlp timed out after {}s",
                    self.extract_timeout.as_secs()
                ))
                .into());
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("yt-dlp extraction failed: {}", stderr.trim());
            return Err(classify_failure(&stderr).into());
        }

        let info: VideoInfo = serde_json::from_slice(&output.stdout)?;
        debug!("yt-dlp returned {} formats for {}", info.formats.len(), info.id);
        Ok(ExtractedMedia::from(info))
    }

    async fn fetch_stream(
        &self,
        url: &str,
        stream: &StreamDescriptor,
        destination: &Path,
        on_event: &mut (dyn FnMut(TransferEvent) + Send),
    ) -> Result<u64> {
        match stream.direct_url.as_deref() {
            Some(direct) => {
                self.engine
                    .download_direct(direct, destination, on_event)
                    .await
            }
            None => {
                self.engine
                    .download_via_ytdlp(&self.ytdlp_path, url, &stream.id, destination, on_event)
                    .await
            }
        }
    }
}

/// Map yt-dlp stderr to `Unavailable` or a generic `FetchError`.
pub fn classify_failure(stderr: &str) -> TubefetchError {
    // Only the ERROR line decides; warnings may mention restrictions that did not apply.
    let relevant: Vec<&str> = match stderr.lines().find(|line| is_tagged(line, "ERROR")) {
        Some(line) => vec![line],
        None => stderr
            .lines()
            .filter(|line| !is_tagged(line, "WARNING"))
            .collect(),
    };
    let joined = relevant.join("\n");
    let message = joined.trim();
    let message = message.strip_prefix("ERROR:").unwrap_or(message).trim();
    let diagnostic = truncate_diagnostic(message, FETCH_DIAGNOSTIC_LIMIT);

    let lowered = message.to_lowercase();
    if UNAVAILABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
        TubefetchError::Unavailable(diagnostic)
    } else if diagnostic.is_empty() {
        TubefetchError::FetchError("yt-dlp exited without a diagnostic".to_string())
    } else {
        TubefetchError::FetchError(diagnostic)
    }
}

fn is_tagged(line: &str, tag: &str) -> bool {
    line.trim_start().starts_with(tag)
}
