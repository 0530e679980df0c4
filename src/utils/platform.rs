//! Platform-specific utilities for Tubefetch
//!
//! This module provides cross-platform abstractions for:
//! - Application directories (config, downloads)
//! - Locating the external tools (yt-dlp, ffmpeg)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

static FFMPEG: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Returns the default download directory
/// - All platforms: ~/Downloads/Tubefetch
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("Tubefetch")
}

/// Returns the configuration directory
/// - macOS: ~/Library/Application Support/tubefetch
/// - Windows: %APPDATA%\tubefetch
/// - Linux: ~/.config/tubefetch
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tubefetch")
}

/// Platform-specific executable extension
pub fn exe_extension() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        ".exe"
    }
    #[cfg(not(target_os = "windows"))]
    {
        ""
    }
}

/// Find an external tool by name.
///
/// Search order:
/// 1. Next to the current executable (bundled builds, development)
/// 2. System PATH
/// 3. Common installation paths (Homebrew, system, user local)
pub fn locate_tool(name: &str) -> Option<PathBuf> {
    let binary_name = format!("{}{}", name, exe_extension());

    if let Some(adjacent) = find_adjacent(&binary_name) {
        info!("✓ Using bundled {}: {:?}", name, adjacent);
        return Some(adjacent);
    }

    if let Ok(path) = which::which(name) {
        info!("✓ Using system {}: {:?}", name, path);
        return Some(path);
    }

    if let Some(common) = find_in_common_paths(&binary_name) {
        info!("✓ Using {} from common path: {:?}", name, common);
        return Some(common);
    }

    warn!("✗ {} not found anywhere!", name);
    None
}

/// Locate ffmpeg once per process and cache the answer.
pub fn ffmpeg_path() -> Option<PathBuf> {
    FFMPEG.get_or_init(|| locate_tool("ffmpeg")).clone()
}

/// Locate yt-dlp, honouring an explicit override first.
pub fn ytdlp_path(override_path: Option<&Path>) -> Option<PathBuf> {
    resolve_override(override_path).or_else(|| locate_tool("yt-dlp"))
}

/// Resolve ffmpeg, honouring an explicit override before the cached probe.
pub fn resolve_ffmpeg(override_path: Option<&Path>) -> Option<PathBuf> {
    resolve_override(override_path).or_else(ffmpeg_path)
}

fn resolve_override(override_path: Option<&Path>) -> Option<PathBuf> {
    let path = override_path?;
    if is_executable(path) {
        return Some(path.to_path_buf());
    }
    warn!("Configured tool path is not executable: {:?}", path);
    None
}

fn find_adjacent(binary_name: &str) -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let exe_dir = exe_path.parent()?;
    let adjacent = exe_dir.join(binary_name);
    debug!("Checking adjacent path: {:?}", adjacent);
    if is_executable(&adjacent) {
        Some(adjacent)
    } else {
        None
    }
}

fn find_in_common_paths(binary_name: &str) -> Option<PathBuf> {
    let mut candidates = vec![
        // macOS Homebrew (Apple Silicon)
        PathBuf::from("/opt/homebrew/bin"),
        // macOS Homebrew (Intel)
        PathBuf::from("/usr/local/bin"),
        // System
        PathBuf::from("/usr/bin"),
        PathBuf::from("/snap/bin"),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local").join("bin"));
    }

    candidates
        .into_iter()
        .map(|dir| dir.join(binary_name))
        .find(|path| is_executable(path))
}

/// Check if a file is executable
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        match std::fs::metadata(path) {
            Ok(metadata) => metadata.is_file() && metadata.permissions().mode() & 0o111 != 0,
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
