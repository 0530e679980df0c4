//! URL-to-artifact workflow: selection, transfers, merge and session state

pub mod events;
pub mod orchestrator;
pub mod registry;
pub mod selector;
pub mod session;
pub mod state;

// Re-export for convenience
pub use events::WorkflowEvent;
pub use orchestrator::{DownloadOrchestrator, OrchestratorState, TransferObserver, TransferPlan};
pub use registry::{SessionRegistry, SharedWorkflow};
pub use selector::{DownloadMode, QualityChoice, ResolvedSelection, SelectedStreams};
pub use session::Workflow;
pub use state::{Artifact, Phase, WorkflowState};
