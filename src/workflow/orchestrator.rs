//! Sequential byte transfers for a resolved selection

use crate::downloader::merger::{cleanup_intermediates, CleanupFailure, MergeStrategy};
use crate::downloader::progress::{
    ProgressSnapshot, ProgressTracker, TransferEvent, TransferStage, TransferStatus,
};
use crate::extractor::models::StreamDescriptor;
use crate::extractor::traits::Extractor;
use crate::utils::error::{truncate_diagnostic, TubefetchError, STATE_ERROR_LIMIT};
use crate::utils::filename::{artifact_file_name, sanitize_filename};
use crate::workflow::selector::{ResolvedSelection, SelectedStreams};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Per-invocation transfer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrchestratorState {
    #[default]
    Idle,
    FetchingPrimary,
    FetchingSecondary,
    AwaitingMerge,
    Done,
    Failed,
}

/// Receives transfer progress as it happens
pub trait TransferObserver: Send {
    /// A new sub-operation began; progress restarts from zero.
    fn on_stage_started(&mut self, stage: TransferStage);

    /// A throttled progress update
    fn on_progress(&mut self, snapshot: ProgressSnapshot);

    /// Best-effort cleanup did not succeed
    fn on_cleanup_failed(&mut self, failure: &CleanupFailure);
}

/// One stream and where its bytes go
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTransfer {
    pub stage: TransferStage,
    pub stream: StreamDescriptor,
    pub destination: PathBuf,
}

/// Every file a download touches
#[derive(Debug, Clone, PartialEq)]
pub struct TransferPlan {
    pub transfers: Vec<PlannedTransfer>,
    /// Final artifact location
    pub output: PathBuf,
    pub file_name: String,
    /// Owned by this attempt alone; every byte lands here before the artifact is published
    pub work_dir: PathBuf,
    /// Parent shared by the work dirs of all attempts
    pub temp_root: PathBuf,
}

impl TransferPlan {
    /// Lay out the files for `selection`.
    ///
    /// Artifacts are named `<title>_<quality>[_<audio quality>].<ext>`. Transfers and the
    /// merge write into a fresh `temp_dir/<attempt id>/`; merge intermediates are named
    /// `<title>_vid.<ext>` and `<title>_aud.<ext>`.
    pub fn build(
        title: &str,
        selection: &ResolvedSelection,
        output_dir: &Path,
        temp_dir: &Path,
        strategy: MergeStrategy,
    ) -> Self {
        let base = sanitize_filename(title);
        let work_dir = temp_dir.join(Uuid::new_v4().simple().to_string());

        let (transfers, file_name) = match &selection.streams {
            SelectedStreams::Single(stream) => {
                let tag = stream.quality_tag().unwrap_or_default();
                let file_name = artifact_file_name(&base, &[&tag], &stream.ext);
                let transfers = vec![PlannedTransfer {
                    stage: TransferStage::Combined,
                    stream: stream.clone(),
                    destination: work_dir.join(&file_name),
                }];
                (transfers, file_name)
            }
            SelectedStreams::Pair { video, audio } => {
                let video_tag = video.quality_tag().unwrap_or_default();
                let audio_tag = audio.quality_tag().unwrap_or_default();
                let extension = merged_extension(video, audio, strategy);
                let file_name = artifact_file_name(&base, &[&video_tag, &audio_tag], extension);
                let video_temp = work_dir.join(artifact_file_name(
                    &format!("{}_vid", base),
                    &[],
                    &video.ext,
                ));
                let audio_temp = work_dir.join(artifact_file_name(
                    &format!("{}_aud", base),
                    &[],
                    &audio.ext,
                ));
                let transfers = vec![
                    PlannedTransfer {
                        stage: TransferStage::Video,
                        stream: video.clone(),
                        destination: video_temp,
                    },
                    PlannedTransfer {
                        stage: TransferStage::Audio,
                        stream: audio.clone(),
                        destination: audio_temp,
                    },
                ];
                (transfers, file_name)
            }
        };

        Self {
            transfers,
            output: output_dir.join(&file_name),
            file_name,
            work_dir,
            temp_root: temp_dir.to_path_buf(),
        }
    }

    pub fn needs_merge(&self) -> bool {
        self.transfers.len() == 2
    }

    /// Files that only exist until the merge step finishes
    pub fn intermediates(&self) -> Vec<&Path> {
        if self.needs_merge() {
            self.transfers.iter().map(|t| t.destination.as_path()).collect()
        } else {
            Vec::new()
        }
    }

    /// Where the finished artifact waits before it is moved onto `output`
    pub fn staged_output(&self) -> PathBuf {
        self.work_dir.join(&self.file_name)
    }

    /// Every file this attempt may have created
    pub fn attempt_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .transfers
            .iter()
            .map(|t| t.destination.clone())
            .collect();
        let staged = self.staged_output();
        if !files.contains(&staged) {
            files.push(staged);
        }
        files
    }

    /// Scratch directories to drop once empty, innermost first
    pub fn scratch_dirs(&self) -> [&Path; 2] {
        [self.work_dir.as_path(), self.temp_root.as_path()]
    }

    /// Move the staged artifact onto `output`, returning its size.
    ///
    /// Nothing at `output` is touched unless a non-empty staged file exists.
    pub async fn publish(&self) -> Result<u64, TubefetchError> {
        let staged = self.staged_output();
        let size = match tokio::fs::metadata(&staged).await {
            Ok(metadata) if metadata.is_file() && metadata.len() > 0 => metadata.len(),
            _ => return Err(TubefetchError::FinalArtifactMissing(self.output.clone())),
        };
        tokio::fs::rename(&staged, &self.output).await?;
        debug!("Published {} -> {}", staged.display(), self.output.display());
        Ok(size)
    }
}

/// Container for a merged artifact.
///
/// Transcoding always targets MP4. Stream copy keeps MP4 or WebM when both tracks already
/// share that family and falls back to Matroska, which accepts any codec pair.
pub fn merged_extension(
    video: &StreamDescriptor,
    audio: &StreamDescriptor,
    strategy: MergeStrategy,
) -> &'static str {
    if strategy == MergeStrategy::Transcode {
        return "mp4";
    }
    match (video.ext.as_str(), audio.ext.as_str()) {
        ("mp4", "m4a" | "mp4") => "mp4",
        ("webm", "webm") => "webm",
        _ => "mkv",
    }
}

/// Drives one or two sequential transfers against the extraction collaborator
pub struct DownloadOrchestrator<'a> {
    extractor: &'a dyn Extractor,
    url: &'a str,
    progress_interval: Duration,
    keep_partial_files: bool,
    state: OrchestratorState,
}

impl<'a> DownloadOrchestrator<'a> {
    pub fn new(extractor: &'a dyn Extractor, url: &'a str) -> Self {
        Self {
            extractor,
            url,
            progress_interval: Duration::from_millis(500),
            keep_partial_files: false,
            state: OrchestratorState::Idle,
        }
    }

    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn keep_partial_files(mut self, keep: bool) -> Self {
        self.keep_partial_files = keep;
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Run every transfer in `plan`, ending in `Done` (single stream) or `AwaitingMerge`.
    ///
    /// Transfers are never retried. On failure the files written into this attempt's work
    /// dir are removed unless partial files are kept; `plan.output` is never touched.
    pub async fn run(
        &mut self,
        plan: &TransferPlan,
        observer: &mut dyn TransferObserver,
    ) -> Result<OrchestratorState, TubefetchError> {
        if let Some(parent) = plan.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::create_dir_all(&plan.work_dir).await?;

        for (index, transfer) in plan.transfers.iter().enumerate() {
            self.state = if index == 0 {
                OrchestratorState::FetchingPrimary
            } else {
                OrchestratorState::FetchingSecondary
            };

            if let Err(e) = self.transfer(transfer, observer).await {
                self.state = OrchestratorState::Failed;
                if !self.keep_partial_files {
                    let written: Vec<&Path> = plan.transfers[..=index]
                        .iter()
                        .map(|t| t.destination.as_path())
                        .collect();
                    let failures = cleanup_intermediates(&written, &plan.scratch_dirs()).await;
                    for failure in failures {
                        observer.on_cleanup_failed(&failure);
                    }
                }
                return Err(e);
            }
        }

        self.state = if plan.needs_merge() {
            OrchestratorState::AwaitingMerge
        } else {
            OrchestratorState::Done
        };
        debug!("Transfers finished: {:?}", self.state);
        Ok(self.state)
    }

    async fn transfer(
        &self,
        transfer: &PlannedTransfer,
        observer: &mut dyn TransferObserver,
    ) -> Result<u64, TubefetchError> {
        info!(
            "{}: stream {} -> {}",
            transfer.stage.label(),
            transfer.stream.id,
            transfer.destination.display()
        );
        observer.on_stage_started(transfer.stage);

        let mut tracker = ProgressTracker::new(transfer.stage, self.progress_interval);
        let mut finished_total = None;
        let result = {
            let mut on_event = |event: TransferEvent| {
                if event.status == TransferStatus::Finished {
                    finished_total = event.total_bytes;
                }
                if let Some(snapshot) = tracker.observe(&event) {
                    observer.on_progress(snapshot);
                }
            };
            self.extractor
                .fetch_stream(
                    self.url,
                    &transfer.stream,
                    &transfer.destination,
                    &mut on_event,
                )
                .await
        };

        let written = result.map_err(|e| {
            error!("{} failed: {:#}", transfer.stage.label(), e);
            TubefetchError::TransferError(truncate_diagnostic(
                &format!("{:#}", e),
                STATE_ERROR_LIMIT,
            ))
        })?;

        verify_transfer(&transfer.destination, finished_total.unwrap_or(written)).await
    }
}

/// The file must exist, be non-empty and hold exactly `expected` bytes.
async fn verify_transfer(path: &Path, expected: u64) -> Result<u64, TubefetchError> {
    let size = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => 0,
    };
    if size == 0 {
        return Err(TubefetchError::TransferError(format!(
            "{} is missing or empty after transfer",
            path.display()
        )));
    }
    if size != expected {
        return Err(TubefetchError::TransferError(format!(
            "size mismatch for {}: expected {} bytes, found {}",
            path.display(),
            expected,
            size
        )));
    }
    Ok(size)
}
