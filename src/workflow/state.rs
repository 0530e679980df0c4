//! Session-scoped workflow state

use crate::downloader::progress::ProgressSnapshot;
use crate::extractor::catalog::StreamCatalog;
use crate::utils::error::{truncate_diagnostic, TubefetchError, STATE_ERROR_LIMIT};
use crate::workflow::selector::{DownloadMode, ResolvedSelection};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the workflow currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Fetching,
    Selecting,
    Downloading,
    Merging,
    Finished,
    Error,
}

/// The finished file handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
}

/// Everything one caller session knows about its current attempt.
///
/// `artifact` is set only in `Phase::Finished` and `error` only in `Phase::Error`;
/// the mutators below are the only way to change the phase.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    phase: Phase,
    title: Option<String>,
    catalog: Option<StreamCatalog>,
    selection: Option<ResolvedSelection>,
    progress: Option<ProgressSnapshot>,
    error: Option<String>,
    artifact: Option<Artifact>,
    last_fetched_url: Option<String>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything except the last fetched URL
    pub fn reset(&mut self) {
        let last_fetched_url = self.last_fetched_url.take();
        *self = Self {
            last_fetched_url,
            ..Self::default()
        };
    }

    /// Move to a non-terminal phase, clearing any previous error or artifact
    pub(crate) fn enter(&mut self, phase: Phase) {
        debug_assert!(
            !matches!(phase, Phase::Finished | Phase::Error),
            "terminal phases go through finish/fail"
        );
        self.phase = phase;
        self.error = None;
        self.artifact = None;
    }

    pub(crate) fn fail(&mut self, error: &TubefetchError) {
        self.phase = Phase::Error;
        self.error = Some(truncate_diagnostic(&error.to_string(), STATE_ERROR_LIMIT));
        self.artifact = None;
        self.progress = None;
    }

    pub(crate) fn finish(&mut self, artifact: Artifact) {
        self.phase = Phase::Finished;
        self.error = None;
        self.artifact = Some(artifact);
        self.progress = None;
    }

    pub(crate) fn set_catalog(&mut self, title: String, catalog: StreamCatalog) {
        self.title = Some(title);
        self.catalog = Some(catalog);
    }

    pub(crate) fn set_selection(&mut self, selection: Option<ResolvedSelection>) {
        self.selection = selection;
    }

    pub(crate) fn set_progress(&mut self, snapshot: ProgressSnapshot) {
        self.progress = Some(snapshot);
    }

    pub(crate) fn clear_progress(&mut self) {
        self.progress = None;
    }

    pub(crate) fn set_last_fetched_url(&mut self, url: &str) {
        self.last_fetched_url = Some(url.to_string());
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn catalog(&self) -> Option<&StreamCatalog> {
        self.catalog.as_ref()
    }

    pub fn selection(&self) -> Option<&ResolvedSelection> {
        self.selection.as_ref()
    }

    pub fn mode(&self) -> Option<DownloadMode> {
        self.selection.as_ref().map(|s| s.mode)
    }

    pub fn progress(&self) -> Option<&ProgressSnapshot> {
        self.progress.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    pub fn last_fetched_url(&self) -> Option<&str> {
        self.last_fetched_url.as_deref()
    }
}
