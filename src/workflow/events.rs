//! Events emitted by a workflow session

use crate::downloader::progress::ProgressSnapshot;
use crate::workflow::state::Phase;
use std::path::PathBuf;

/// Observability feed for a session, consumed by a reporter task
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    PhaseChanged(Phase),
    Progress(ProgressSnapshot),
    /// Best-effort cleanup that did not succeed; never fails the workflow
    CleanupFailed { path: PathBuf, reason: String },
    Failed(String),
}
