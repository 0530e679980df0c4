//! The caller-facing workflow: submit a URL, choose a quality, download

use crate::downloader::merger::{cleanup_intermediates, CleanupFailure, Merger, MergeStrategy};
use crate::downloader::progress::{ProgressSnapshot, TransferStage};
use crate::extractor::catalog::StreamCatalog;
use crate::extractor::models::ExtractedMedia;
use crate::extractor::traits::Extractor;
use crate::extractor::ytdlp::YtDlpExtractor;
use crate::utils::config::AppSettings;
use crate::utils::error::{truncate_diagnostic, TubefetchError, FETCH_DIAGNOSTIC_LIMIT};
use crate::utils::platform;
use crate::utils::url::is_valid_youtube_url;
use crate::workflow::events::WorkflowEvent;
use crate::workflow::orchestrator::{
    DownloadOrchestrator, OrchestratorState, TransferObserver, TransferPlan,
};
use crate::workflow::selector::{self, DownloadMode, QualityChoice, ResolvedSelection};
use crate::workflow::state::{Artifact, Phase, WorkflowState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Metadata of the last successful lookup, reused when the same URL is submitted again
struct CachedFetch {
    url: String,
    media: ExtractedMedia,
}

/// One caller session. Nothing here is shared with other sessions.
pub struct Workflow {
    extractor: Arc<dyn Extractor>,
    merger: Option<Merger>,
    settings: AppSettings,
    state: WorkflowState,
    cached: Option<CachedFetch>,
    events: Option<UnboundedSender<WorkflowEvent>>,
}

impl Workflow {
    /// A session over `extractor`; merged modes are offered only when `merger` is set.
    pub fn new(
        extractor: Arc<dyn Extractor>,
        merger: Option<Merger>,
        settings: AppSettings,
    ) -> Self {
        Self {
            extractor,
            merger,
            settings,
            state: WorkflowState::new(),
            cached: None,
            events: None,
        }
    }

    /// Build a session backed by yt-dlp and, when found, ffmpeg
    pub fn from_settings(settings: AppSettings) -> anyhow::Result<Self> {
        let extractor = YtDlpExtractor::from_settings(&settings)?;
        let merger = match platform::resolve_ffmpeg(settings.ffmpeg_path.as_deref()) {
            Some(path) => Some(Merger::new(
                path,
                settings.merge_strategy,
                settings.merge_timeout(),
            )),
            None => {
                warn!("ffmpeg not found; only progressive downloads are available");
                None
            }
        };
        Ok(Self::new(Arc::new(extractor), merger, settings))
    }

    /// Send phase changes, progress and cleanup failures to `events`
    pub fn with_events(mut self, events: UnboundedSender<WorkflowEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn merge_available(&self) -> bool {
        self.merger.is_some()
    }

    /// Modes on offer for the fetched video, in presentation order
    pub fn available_modes(&self) -> Vec<DownloadMode> {
        self.state
            .catalog()
            .map(|catalog| selector::available_modes(catalog, self.merge_available()))
            .unwrap_or_default()
    }

    pub fn default_mode(&self) -> Option<DownloadMode> {
        selector::default_mode(&self.available_modes())
    }

    /// The finished file, only once the workflow is `Finished`
    pub fn artifact(&self) -> Option<&Artifact> {
        self.state.artifact()
    }

    /// Validate `url`, look it up and categorize its streams.
    ///
    /// Always starts over from a clean state. Resubmitting the URL of the last successful
    /// lookup reuses its metadata instead of asking the extractor again.
    pub async fn submit_url(&mut self, url: &str) -> Result<&StreamCatalog, TubefetchError> {
        let url = url.trim();
        self.state.reset();

        if !is_valid_youtube_url(url) {
            return Err(self.fail(TubefetchError::InvalidUrl(url.to_string())));
        }

        self.enter(Phase::Fetching);

        let reused = self
            .cached
            .as_ref()
            .filter(|cached| cached.url == url)
            .map(|cached| cached.media.clone());

        let media = match reused {
            Some(media) => {
                debug!("Reusing metadata for {}", url);
                media
            }
            None => {
                info!("Fetching metadata for {} via {}", url, self.extractor.id());
                match self.extractor.extract_info(url).await {
                    Ok(media) => {
                        self.cached = Some(CachedFetch {
                            url: url.to_string(),
                            media: media.clone(),
                        });
                        media
                    }
                    Err(e) => return Err(self.fail(fetch_failure(e))),
                }
            }
        };

        let catalog =
            StreamCatalog::categorize(media.streams, self.settings.video_container.as_deref());
        info!(
            "\"{}\": {} progressive, {} video-only, {} audio-only",
            media.title,
            catalog.progressive.len(),
            catalog.video_only.len(),
            catalog.audio_only.len()
        );

        if !catalog.is_playable() {
            return Err(self.fail(TubefetchError::NoStreams));
        }

        self.state.set_last_fetched_url(url);
        self.state.set_catalog(media.title, catalog);
        self.enter(Phase::Selecting);
        self.state
            .catalog()
            .ok_or_else(|| TubefetchError::OperationFailed("catalog missing".to_string()))
    }

    /// Resolve `choice` against the fetched streams.
    pub fn choose(&mut self, choice: QualityChoice) -> Result<&ResolvedSelection, TubefetchError> {
        let catalog = self.state.catalog().ok_or_else(|| {
            TubefetchError::OperationFailed("no video fetched; submit a URL first".to_string())
        })?;

        match selector::resolve(catalog, &choice, self.merge_available()) {
            Ok(selection) => {
                info!(
                    "Selected {} mode: {}",
                    selection.mode,
                    selection.stream_ids().join(" + ")
                );
                self.state.set_selection(Some(selection));
                self.enter(Phase::Selecting);
                self.state.selection().ok_or_else(|| {
                    TubefetchError::OperationFailed("selection missing".to_string())
                })
            }
            Err(e) => {
                self.state.set_selection(None);
                Err(self.fail(e))
            }
        }
    }

    /// Fetch the chosen stream(s), merge when needed, and verify the artifact.
    pub async fn download(&mut self) -> Result<Artifact, TubefetchError> {
        let (selection, title, url) = match (
            self.state.selection(),
            self.state.title(),
            self.state.last_fetched_url(),
        ) {
            (Some(selection), Some(title), Some(url)) => {
                (selection.clone(), title.to_string(), url.to_string())
            }
            _ => {
                return Err(TubefetchError::OperationFailed(
                    "choose a quality before downloading".to_string(),
                ))
            }
        };

        let strategy = self
            .merger
            .as_ref()
            .map(Merger::strategy)
            .unwrap_or(MergeStrategy::StreamCopy);
        let plan = TransferPlan::build(
            &title,
            &selection,
            &self.settings.download_location,
            &self.settings.temp_dir(),
            strategy,
        );

        if plan.needs_merge() && self.merger.is_none() {
            return Err(self.fail(TubefetchError::NoViableOption(
                "ffmpeg is required to merge video and audio".to_string(),
            )));
        }

        self.enter(Phase::Downloading);

        let transfer_result = {
            let mut observer = SessionObserver {
                state: &mut self.state,
                events: self.events.as_ref(),
            };
            DownloadOrchestrator::new(self.extractor.as_ref(), &url)
                .progress_interval(self.settings.progress_interval())
                .keep_partial_files(self.settings.keep_partial_files)
                .run(&plan, &mut observer)
                .await
        };

        match transfer_result {
            Ok(OrchestratorState::AwaitingMerge) => self.merge(&plan).await?,
            Ok(_) => {}
            Err(e) => return Err(self.fail(e)),
        }

        let published = plan.publish().await;
        self.discard_scratch(&plan).await;
        let size_bytes = published.map_err(|e| self.fail(e))?;

        let artifact = Artifact {
            path: plan.output.clone(),
            file_name: plan.file_name.clone(),
            size_bytes,
        };
        info!(
            "Finished: {} ({} bytes)",
            artifact.path.display(),
            artifact.size_bytes
        );
        self.state.finish(artifact.clone());
        self.emit(WorkflowEvent::PhaseChanged(Phase::Finished));
        Ok(artifact)
    }

    async fn merge(&mut self, plan: &TransferPlan) -> Result<(), TubefetchError> {
        self.enter(Phase::Merging);
        self.state.clear_progress();

        let intermediates = plan.intermediates();
        let (merger, video, audio) = match (&self.merger, intermediates.as_slice()) {
            (Some(merger), [video, audio]) => (merger, *video, *audio),
            _ => {
                return Err(self.fail(TubefetchError::OperationFailed(
                    "merge requested without a merge tool or two intermediates".to_string(),
                )))
            }
        };

        let result = merger.merge(video, audio, &plan.staged_output()).await;

        if !matches!(result, Err(TubefetchError::MissingIntermediateFile(_))) {
            let failures = cleanup_intermediates(&intermediates, &plan.scratch_dirs()).await;
            for failure in failures {
                self.report_cleanup_failure(&failure);
            }
        }

        result.map_err(|e| self.fail(e))
    }

    /// Drop whatever this attempt left in its work dir
    async fn discard_scratch(&self, plan: &TransferPlan) {
        let files = plan.attempt_files();
        let files: Vec<&Path> = files.iter().map(PathBuf::as_path).collect();
        for failure in cleanup_intermediates(&files, &plan.scratch_dirs()).await {
            self.report_cleanup_failure(&failure);
        }
    }

    fn enter(&mut self, phase: Phase) {
        self.state.enter(phase);
        self.emit(WorkflowEvent::PhaseChanged(phase));
    }

    /// Record `error` as the terminal state of this attempt and hand it back
    fn fail(&mut self, error: TubefetchError) -> TubefetchError {
        warn!("Workflow failed: {}", error);
        self.state.fail(&error);
        if let Some(message) = self.state.error() {
            let message = message.to_string();
            self.emit(WorkflowEvent::Failed(message));
        }
        self.emit(WorkflowEvent::PhaseChanged(Phase::Error));
        error
    }

    fn report_cleanup_failure(&self, failure: &CleanupFailure) {
        self.emit(WorkflowEvent::CleanupFailed {
            path: failure.path.clone(),
            reason: failure.reason.clone(),
        });
    }

    fn emit(&self, event: WorkflowEvent) {
        emit(self.events.as_ref(), event);
    }
}

fn emit(events: Option<&UnboundedSender<WorkflowEvent>>, event: WorkflowEvent) {
    if let Some(tx) = events {
        // A closed receiver only means nobody is listening.
        let _ = tx.send(event);
    }
}

/// Map an extractor failure to `Unavailable` or `FetchError`
fn fetch_failure(error: anyhow::Error) -> TubefetchError {
    match error.downcast::<TubefetchError>() {
        Ok(TubefetchError::Unavailable(message)) => TubefetchError::Unavailable(message),
        Ok(TubefetchError::FetchError(message)) => TubefetchError::FetchError(message),
        Ok(other) => TubefetchError::FetchError(truncate_diagnostic(
            &other.to_string(),
            FETCH_DIAGNOSTIC_LIMIT,
        )),
        Err(error) => TubefetchError::FetchError(truncate_diagnostic(
            &format!("{:#}", error),
            FETCH_DIAGNOSTIC_LIMIT,
        )),
    }
}

/// Feeds transfer progress into the session state and event channel
struct SessionObserver<'a> {
    state: &'a mut WorkflowState,
    events: Option<&'a UnboundedSender<WorkflowEvent>>,
}

impl TransferObserver for SessionObserver<'_> {
    fn on_stage_started(&mut self, stage: TransferStage) {
        debug!("{}", stage.label());
        self.state.clear_progress();
    }

    fn on_progress(&mut self, snapshot: ProgressSnapshot) {
        self.state.set_progress(snapshot.clone());
        emit(self.events, WorkflowEvent::Progress(snapshot));
    }

    fn on_cleanup_failed(&mut self, failure: &CleanupFailure) {
        emit(
            self.events,
            WorkflowEvent::CleanupFailed {
                path: failure.path.clone(),
                reason: failure.reason.clone(),
            },
        );
    }
}
