//! Error handling for Tubefetch

use std::path::PathBuf;
use thiserror::Error;

/// Maximum length of a collaborator diagnostic surfaced as `FetchError`.
pub const FETCH_DIAGNOSTIC_LIMIT: usize = 150;

/// Maximum length of captured ffmpeg stderr surfaced as `MergeError`.
pub const MERGE_DIAGNOSTIC_LIMIT: usize = 200;

/// Maximum length of the error string recorded in the workflow state.
pub const STATE_ERROR_LIMIT: usize = 200;

/// Main error type for Tubefetch
///
/// Every workflow failure is terminal for the current attempt; the caller
/// recovers by submitting a URL again.
#[derive(Debug, Error)]
pub enum TubefetchError {
    #[error("yt-dlp not found. Please install yt-dlp")]
    YtDlpNotFound,

    #[error("Invalid YouTube URL format: {0}")]
    InvalidUrl(String),

    #[error("Video unavailable (private, deleted, restricted): {0}")]
    Unavailable(String),

    #[error("No downloadable video streams found")]
    NoStreams,

    #[error("Fetch error: {0}")]
    FetchError(String),

    #[error("No downloadable options available: {0}")]
    NoViableOption(String),

    #[error("Unknown stream id: {0}")]
    UnknownStreamId(String),

    #[error("Transfer failed: {0}")]
    TransferError(String),

    #[error("Intermediate file missing or empty: {}", .0.display())]
    MissingIntermediateFile(PathBuf),

    #[error("Merge failed: {0}")]
    MergeError(String),

    #[error("Final file missing or empty: {}", .0.display())]
    FinalArtifactMissing(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Shorten a diagnostic to at most `max_chars` characters, marking the cut with `...`.
///
/// Counts characters rather than bytes so multi-byte stderr output never splits a code point.
pub fn truncate_diagnostic(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(max_chars).collect();
    shortened.push_str("...");
    shortened
}
