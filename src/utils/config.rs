//! Application configuration

use crate::downloader::MergeStrategy;
use crate::utils::error::TubefetchError;
use crate::utils::platform;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    /// Directory receiving finished artifacts
    pub download_location: PathBuf,

    /// Subdirectory of `download_location` holding intermediates during a merge
    pub temp_dir_name: String,

    /// How separate video and audio tracks are combined
    pub merge_strategy: MergeStrategy,

    /// Upper bound for a single ffmpeg run (seconds)
    pub merge_timeout_secs: u64,

    /// Upper bound for a metadata lookup (seconds)
    pub extract_timeout_secs: u64,

    /// Upper bound for a single stream transfer (seconds)
    pub transfer_timeout_secs: u64,

    /// Minimum spacing of progress updates when the percentage does not advance
    pub progress_interval_ms: u64,

    /// Container required for combined and video-only streams (`None` accepts all)
    pub video_container: Option<String>,

    /// Leave partially written files behind after a failed transfer
    pub keep_partial_files: bool,

    /// Explicit yt-dlp binary
    pub ytdlp_path: Option<PathBuf>,

    /// Explicit ffmpeg binary
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            download_location: platform::default_download_dir(),
            temp_dir_name: "temp".to_string(),
            merge_strategy: MergeStrategy::StreamCopy,
            merge_timeout_secs: 1800,
            extract_timeout_secs: 120,
            transfer_timeout_secs: 1800,
            progress_interval_ms: 500,
            video_container: Some("mp4".to_string()),
            keep_partial_files: false,
            ytdlp_path: None,
            ffmpeg_path: None,
        }
    }
}

impl AppSettings {
    /// Default location of the settings file
    pub fn default_path() -> PathBuf {
        platform::config_dir().join("settings.json")
    }

    /// Load settings from a JSON file; fields missing from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self, TubefetchError> {
        let raw = std::fs::read_to_string(path)?;
        let settings: AppSettings = serde_json::from_str(&raw)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings.validated())
    }

    /// Load from `path` (or the default location) when it exists, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, TubefetchError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);
        if path.exists() {
            Self::load(&path)
        } else {
            debug!("No settings file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Enforce sane minimums
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.merge_timeout_secs == 0 {
            self.merge_timeout_secs = defaults.merge_timeout_secs;
        }
        if self.extract_timeout_secs == 0 {
            self.extract_timeout_secs = defaults.extract_timeout_secs;
        }
        if self.transfer_timeout_secs == 0 {
            self.transfer_timeout_secs = defaults.transfer_timeout_secs;
        }
        if self.progress_interval_ms == 0 {
            self.progress_interval_ms = defaults.progress_interval_ms;
        }
        let temp = self.temp_dir_name.trim();
        if temp.is_empty() || temp.contains(['/', '\\']) || temp == "." || temp == ".." {
            self.temp_dir_name = defaults.temp_dir_name;
        }
        if let Some(container) = &self.video_container {
            if container.trim().is_empty() {
                self.video_container = None;
            }
        }
        self
    }

    /// Directory holding intermediates during a merge
    pub fn temp_dir(&self) -> PathBuf {
        self.download_location.join(&self.temp_dir_name)
    }

    pub fn merge_timeout(&self) -> Duration {
        Duration::from_secs(self.merge_timeout_secs)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}
