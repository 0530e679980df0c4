//! Mode availability and stream resolution. Pure decision logic, no I/O.

use crate::extractor::catalog::StreamCatalog;
use crate::extractor::models::{StreamDescriptor, StreamKind};
use crate::utils::error::TubefetchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Audio codec family avoided by automatic selection for player compatibility
const AVOIDED_AUDIO_CODEC: &str = "opus";

/// How many streams are fetched and whether they are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    /// One combined stream, no merge
    Progressive,
    /// Best video-only + best audio-only, merged
    DashAuto,
    /// Caller-picked video-only + audio-only, merged
    DashManual,
}

impl DownloadMode {
    pub fn label(&self) -> &'static str {
        match self {
            DownloadMode::Progressive => "Progressive (single file)",
            DownloadMode::DashAuto => "Best Quality (auto, merged)",
            DownloadMode::DashManual => "Manual Quality (merged)",
        }
    }

    /// True for the modes that fetch two streams and merge them
    pub fn needs_merge(&self) -> bool {
        !matches!(self, DownloadMode::Progressive)
    }

    /// Number of streams that must be resolved before downloading
    pub fn required_streams(&self) -> usize {
        if self.needs_merge() {
            2
        } else {
            1
        }
    }
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DownloadMode::Progressive => "progressive",
            DownloadMode::DashAuto => "auto",
            DownloadMode::DashManual => "manual",
        };
        f.write_str(name)
    }
}

/// What the caller asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityChoice {
    Auto,
    Manual { video_id: String, audio_id: String },
    Progressive { stream_id: String },
}

impl QualityChoice {
    pub fn mode(&self) -> DownloadMode {
        match self {
            QualityChoice::Auto => DownloadMode::DashAuto,
            QualityChoice::Manual { .. } => DownloadMode::DashManual,
            QualityChoice::Progressive { .. } => DownloadMode::Progressive,
        }
    }
}

/// Concrete streams for the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum SelectedStreams {
    Single(StreamDescriptor),
    Pair {
        video: StreamDescriptor,
        audio: StreamDescriptor,
    },
}

/// A choice validated against the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSelection {
    pub mode: DownloadMode,
    pub streams: SelectedStreams,
}

impl ResolvedSelection {
    pub fn stream_ids(&self) -> Vec<&str> {
        match &self.streams {
            SelectedStreams::Single(stream) => vec![stream.id.as_str()],
            SelectedStreams::Pair { video, audio } => vec![video.id.as_str(), audio.id.as_str()],
        }
    }
}

/// Modes the catalog supports, in presentation order (auto, manual, progressive).
///
/// Merged modes need both adaptive buckets and a working merge tool.
pub fn available_modes(catalog: &StreamCatalog, merge_available: bool) -> Vec<DownloadMode> {
    let mut modes = Vec::with_capacity(3);
    if merge_available && catalog.has_adaptive_pair() {
        modes.push(DownloadMode::DashAuto);
        modes.push(DownloadMode::DashManual);
    }
    if !catalog.progressive.is_empty() {
        modes.push(DownloadMode::Progressive);
    }
    modes
}

/// Preferred mode among `modes`: auto, then manual, then progressive
pub fn default_mode(modes: &[DownloadMode]) -> Option<DownloadMode> {
    [
        DownloadMode::DashAuto,
        DownloadMode::DashManual,
        DownloadMode::Progressive,
    ]
    .into_iter()
    .find(|mode| modes.contains(mode))
}

/// Highest-ranked audio stream with a known codec outside the avoided family,
/// falling back to the highest-ranked stream overall.
pub fn best_audio(audio: &[StreamDescriptor]) -> Option<&StreamDescriptor> {
    let preferred = audio.iter().find(|stream| {
        stream
            .audio_codec
            .as_deref()
            .map(|codec| !codec.is_empty() && !codec.to_lowercase().contains(AVOIDED_AUDIO_CODEC))
            .unwrap_or(false)
    });

    match preferred {
        Some(stream) => Some(stream),
        None => {
            let fallback = audio.first();
            if let Some(stream) = fallback {
                warn!(
                    "No audio without {} available, falling back to {}",
                    AVOIDED_AUDIO_CODEC, stream.id
                );
            }
            fallback
        }
    }
}

/// Resolve `choice` into concrete streams.
pub fn resolve(
    catalog: &StreamCatalog,
    choice: &QualityChoice,
    merge_available: bool,
) -> Result<ResolvedSelection, TubefetchError> {
    let modes = available_modes(catalog, merge_available);
    if modes.is_empty() {
        return Err(TubefetchError::NoViableOption(
            "no progressive stream and no mergeable video/audio pair".to_string(),
        ));
    }

    let mode = choice.mode();
    if !modes.contains(&mode) {
        return Err(TubefetchError::NoViableOption(format!(
            "{} mode is not available for this video",
            mode
        )));
    }

    let streams = match choice {
        QualityChoice::Auto => {
            let video = catalog.video_only.first().ok_or_else(|| {
                TubefetchError::NoViableOption("no video-only stream".to_string())
            })?;
            let audio = best_audio(&catalog.audio_only).ok_or_else(|| {
                TubefetchError::NoViableOption("no audio-only stream".to_string())
            })?;
            info!("Auto selection: video {} + audio {}", video.id, audio.id);
            SelectedStreams::Pair {
                video: video.clone(),
                audio: audio.clone(),
            }
        }
        QualityChoice::Manual { video_id, audio_id } => SelectedStreams::Pair {
            video: lookup(catalog, StreamKind::VideoOnly, video_id)?.clone(),
            audio: lookup(catalog, StreamKind::AudioOnly, audio_id)?.clone(),
        },
        QualityChoice::Progressive { stream_id } => {
            SelectedStreams::Single(lookup(catalog, StreamKind::Combined, stream_id)?.clone())
        }
    };

    Ok(ResolvedSelection { mode, streams })
}

fn lookup<'a>(
    catalog: &'a StreamCatalog,
    kind: StreamKind,
    id: &str,
) -> Result<&'a StreamDescriptor, TubefetchError> {
    catalog
        .find(kind, id)
        .ok_or_else(|| TubefetchError::UnknownStreamId(id.to_string()))
}
