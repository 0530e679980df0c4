//! Byte-transfer engine: direct HTTP streaming and the yt-dlp fallback

use crate::downloader::progress::TransferEvent;
use crate::utils::error::{truncate_diagnostic, STATE_ERROR_LIMIT};
use anyhow::{anyhow, Context, Result};
use futures::stream::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::{debug, error, info};

/// Prefix of the machine-readable progress lines requested from yt-dlp
const PROGRESS_PREFIX: &str = "[progress]";

const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s";

/// Progress sink for a single transfer
pub type ProgressSink<'a> = &'a mut (dyn FnMut(TransferEvent) + Send);

/// Streams one media stream to disk
pub struct DownloadEngine {
    client: Client,
    timeout: Duration,
}

impl DownloadEngine {
    /// Create a new engine whose transfers are bounded by `transfer_timeout`
    pub fn new(transfer_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36")
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            timeout: transfer_timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Download `url` into `output_path` with plain HTTP, reporting every chunk.
    ///
    /// Returns the number of bytes written.
    pub async fn download_direct(
        &self,
        url: &str,
        output_path: &Path,
        on_event: ProgressSink<'_>,
    ) -> Result<u64> {
        debug!("Direct download to {}", output_path.display());
        match timeout(self.timeout, self.stream_to_file(url, output_path, on_event)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "Download timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }

    async fn stream_to_file(
        &self,
        url: &str,
        output_path: &Path,
        on_event: ProgressSink<'_>,
    ) -> Result<u64> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {}", response.status()));
        }

        let total_size = response.content_length().filter(|len| *len > 0);
        on_event(TransferEvent::downloading(0, total_size));

        let mut file = File::create(output_path).await?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            on_event(TransferEvent::downloading(downloaded, total_size));
        }

        file.flush().await?;
        on_event(TransferEvent::finished(downloaded, total_size));
        info!("Downloaded {} bytes to {}", downloaded, output_path.display());
        Ok(downloaded)
    }

    /// Let yt-dlp fetch format `format_id` of `page_url` into `output_path`.
    ///
    /// Used for streams without a plain HTTP URL (HLS, DASH manifests). Progress comes from
    /// a `--progress-template` line per update. The process is killed on timeout.
    pub async fn download_via_ytdlp(
        &self,
        ytdlp_path: &Path,
        page_url: &str,
        format_id: &str,
        output_path: &Path,
        on_event: ProgressSink<'_>,
    ) -> Result<u64> {
        debug!("yt-dlp download of format {} from {}", format_id, page_url);

        let mut cmd = AsyncCommand::new(ytdlp_path);
        cmd.arg("-f")
            .arg(format_id)
            .arg("-o")
            .arg(output_path)
            .arg("--no-playlist")
            .arg("--no-part")
            .arg("--force-overwrites")
            .arg("--no-warnings")
            .arg("--quiet")
            .arg("--progress")
            .arg("--newline") // one progress line per update when not attached to a TTY
            .arg("--progress-template")
            .arg(PROGRESS_TEMPLATE)
            .arg(page_url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().context("Failed to start yt-dlp")?;

        let stderr_handle = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut collected = String::new();
                let _ = stderr.read_to_string(&mut collected).await;
                collected
            })
        });
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("yt-dlp stdout not captured"))?;

        // Estimates drive the progress display only; the finish event carries exact sizes.
        let mut exact_total = None;
        let run = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(progress) = parse_progress_line(&line) {
                    if progress.total.is_some() {
                        exact_total = progress.total;
                    }
                    on_event(TransferEvent::downloading(
                        progress.downloaded,
                        exact_total.or(progress.estimate),
                    ));
                }
            }
            Ok::<_, anyhow::Error>(child.wait().await?)
        };

        let status = match timeout(self.timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                error!("yt-dlp transfer timed out after {:?}", self.timeout);
                // Dropping the child at return kills the process.
                return Err(anyhow!(
                    "yt-dlp transfer timed out after {}s",
                    self.timeout.as_secs()
                ));
            }
        };

        let stderr = match stderr_handle {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            error!("yt-dlp transfer failed ({}): {}", status, stderr.trim());
            let diagnostic = if stderr.trim().is_empty() {
                format!("yt-dlp exited with {}", status)
            } else {
                truncate_diagnostic(&stderr, STATE_ERROR_LIMIT)
            };
            return Err(anyhow!(diagnostic));
        }

        let written = tokio::fs::metadata(output_path)
            .await
            .with_context(|| format!("yt-dlp produced no file at {}", output_path.display()))?
            .len();
        on_event(TransferEvent::finished(written, exact_total));
        info!("yt-dlp wrote {} bytes to {}", written, output_path.display());
        Ok(written)
    }
}

/// One parsed `--progress-template` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressLine {
    pub downloaded: u64,
    pub total: Option<u64>,
    pub estimate: Option<u64>,
}

/// Parse a `[progress] <downloaded> <total> <estimate>` line.
///
/// yt-dlp prints `NA` for unknown fields.
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.split_whitespace();

    Some(ProgressLine {
        downloaded: parse_byte_field(fields.next())?,
        total: parse_byte_field(fields.next()).filter(|t| *t > 0),
        estimate: parse_byte_field(fields.next()).filter(|t| *t > 0),
    })
}

fn parse_byte_field(field: Option<&str>) -> Option<u64> {
    let value: f64 = field?.parse().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value as u64)
}
