//! ffmpeg merge of separately fetched video and audio tracks

use crate::utils::error::{truncate_diagnostic, TubefetchError, MERGE_DIAGNOSTIC_LIMIT};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// How the two tracks are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Re-containerize without re-encoding
    #[default]
    StreamCopy,
    /// Re-encode to H.264/AAC with fast-start enabled
    Transcode,
}

/// A best-effort cleanup step that did not succeed
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Runs the external media tool on exactly two inputs and one output
#[derive(Debug, Clone)]
pub struct Merger {
    ffmpeg_path: PathBuf,
    strategy: MergeStrategy,
    timeout: Duration,
}

impl Merger {
    pub fn new(ffmpeg_path: PathBuf, strategy: MergeStrategy, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            strategy,
            timeout,
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Arguments passed to ffmpeg for the configured strategy
    pub fn command_args(&self, video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-i".into(),
            video.into(),
            "-i".into(),
            audio.into(),
        ];

        match self.strategy {
            MergeStrategy::StreamCopy => {
                args.extend(["-c", "copy"].map(OsString::from));
            }
            MergeStrategy::Transcode => {
                args.extend(
                    [
                        "-map", "0:v:0", "-map", "1:a:0", "-c:v", "libx264", "-preset",
                        "veryfast", "-crf", "20", "-pix_fmt", "yuv420p", "-c:a", "aac", "-b:a",
                        "192k", "-movflags", "+faststart",
                    ]
                    .map(OsString::from),
                );
            }
        }

        args.extend(["-loglevel", "error"].map(OsString::from));
        args.push(output.into());
        args
    }

    /// Combine `video` and `audio` into `output`.
    ///
    /// Both inputs must exist and be non-empty, otherwise nothing is spawned. A non-zero
    /// exit or a timeout removes whatever partial output ffmpeg left behind.
    pub async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<(), TubefetchError> {
        for input in [video, audio] {
            if !is_non_empty_file(input).await {
                error!("Intermediate file missing or empty: {}", input.display());
                return Err(TubefetchError::MissingIntermediateFile(input.to_path_buf()));
            }
        }

        info!(
            "Merging {} + {} -> {} ({:?})",
            video.display(),
            audio.display(),
            output.display(),
            self.strategy
        );

        let mut cmd = AsyncCommand::new(&self.ffmpeg_path);
        cmd.args(self.command_args(video, audio, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!("ffmpeg command: {:?}", cmd);

        let child = cmd
            .spawn()
            .map_err(|e| TubefetchError::MergeError(format!("Failed to start ffmpeg: {}", e)))?;

        // Dropping the child on timeout kills it.
        let result = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                remove_partial_output(output).await;
                return Err(TubefetchError::MergeError(format!(
                    "Failed to wait for ffmpeg: {}",
                    e
                )));
            }
            Err(_) => {
                warn!("ffmpeg timed out after {:?}, killed", self.timeout);
                remove_partial_output(output).await;
                return Err(TubefetchError::MergeError(format!(
                    "ffmpeg timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            error!("ffmpeg failed ({}): {}", result.status, stderr.trim());
            remove_partial_output(output).await;
            let diagnostic = if stderr.trim().is_empty() {
                format!("ffmpeg exited with {}", result.status)
            } else {
                truncate_diagnostic(&stderr, MERGE_DIAGNOSTIC_LIMIT)
            };
            return Err(TubefetchError::MergeError(diagnostic));
        }

        info!("Merge finished: {}", output.display());
        Ok(())
    }
}

/// Remove intermediate files, then each of `dirs` (innermost first) that is left empty.
///
/// Failures are logged and returned, never propagated.
pub async fn cleanup_intermediates(files: &[&Path], dirs: &[&Path]) -> Vec<CleanupFailure> {
    let mut failures = Vec::new();

    for path in files {
        if tokio::fs::metadata(path).await.is_err() {
            continue;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Removed intermediate file: {}", path.display()),
            Err(e) => {
                warn!("Failed to remove intermediate file {}: {}", path.display(), e);
                failures.push(CleanupFailure {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }
    }

    for dir in dirs {
        match is_empty_dir(dir).await {
            Ok(true) => match tokio::fs::remove_dir(dir).await {
                Ok(()) => debug!("Removed temp directory: {}", dir.display()),
                Err(e) => {
                    // A concurrent attempt sharing this parent removed it or wrote into it.
                    if matches!(is_empty_dir(dir).await, Ok(true)) {
                        warn!("Failed to remove temp directory {}: {}", dir.display(), e);
                        failures.push(CleanupFailure {
                            path: dir.to_path_buf(),
                            reason: e.to_string(),
                        });
                    } else {
                        debug!("Temp directory changed meanwhile, keeping: {}", dir.display());
                    }
                }
            },
            Ok(false) => debug!("Temp directory not empty, keeping: {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to inspect temp directory {}: {}", dir.display(), e);
                failures.push(CleanupFailure {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }
    }

    failures
}

async fn is_non_empty_file(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.is_file() && metadata.len() > 0,
        Err(_) => false,
    }
}

async fn is_empty_dir(dir: &Path) -> std::io::Result<bool> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    Ok(entries.next_entry().await?.is_none())
}

async fn remove_partial_output(output: &Path) {
    if tokio::fs::metadata(output).await.is_err() {
        return;
    }
    if let Err(e) = tokio::fs::remove_file(output).await {
        warn!("Failed to remove partial output {}: {}", output.display(), e);
    } else {
        debug!("Removed partial output: {}", output.display());
    }
}
