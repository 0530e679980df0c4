//! Tubefetch library

pub mod downloader;
pub mod extractor;
pub mod utils;
pub mod workflow;

// Re-export main types for easier use
pub use downloader::{DownloadEngine, MergeStrategy, Merger, ProgressSnapshot, TransferEvent};
pub use extractor::{Extractor, StreamCatalog, StreamDescriptor, StreamKind, YtDlpExtractor};
pub use utils::{AppSettings, TubefetchError};
pub use workflow::{
    Artifact, DownloadMode, Phase, QualityChoice, SessionRegistry, Workflow, WorkflowEvent,
};
