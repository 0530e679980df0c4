//! Utility modules for error handling, configuration and naming

pub mod config;
pub mod error;
pub mod filename;
pub mod platform;
pub mod url;

// Re-export for convenience
pub use config::AppSettings;
pub use error::{truncate_diagnostic, TubefetchError};
pub use filename::{artifact_file_name, sanitize_filename};
pub use url::is_valid_youtube_url;
