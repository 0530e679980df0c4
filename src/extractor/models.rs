//! Data structures for video information

use serde::{Deserialize, Serialize};

/// Video information as reported by `yt-dlp --dump-json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub webpage_url: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub formats: Vec<Format>,
}

/// One format entry from yt-dlp
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Format {
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub filesize: Option<f64>,
    #[serde(default)]
    pub filesize_approx: Option<f64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub fps: Option<f32>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub abr: Option<f32>,
}

/// What a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Video and audio in one stream
    Combined,
    VideoOnly,
    AudioOnly,
}

/// One selectable stream, produced fresh on every metadata fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Opaque id used to request exactly this stream again (yt-dlp format id / itag)
    pub id: String,
    pub kind: StreamKind,
    /// Vertical resolution in pixels
    pub height: Option<u32>,
    pub fps: Option<f32>,
    /// Average audio bitrate in kbit/s
    pub abr: Option<f32>,
    /// Container extension hint (`mp4`, `webm`, `m4a`)
    pub ext: String,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    /// Approximate size in bytes, display only
    pub filesize: Option<u64>,
    /// Direct media URL when the collaborator exposes one
    pub direct_url: Option<String>,
}

impl StreamDescriptor {
    /// Convert a yt-dlp format, skipping storyboards and entries carrying neither track.
    pub fn from_format(format: &Format) -> Option<Self> {
        if format.format_id.is_empty() || format.ext == "mhtml" {
            return None;
        }

        let video_codec = real_codec(format.vcodec.as_deref());
        let audio_codec = real_codec(format.acodec.as_deref());

        let kind = match (video_codec.is_some(), audio_codec.is_some()) {
            (true, true) => StreamKind::Combined,
            (true, false) => StreamKind::VideoOnly,
            (false, true) => StreamKind::AudioOnly,
            (false, false) => return None,
        };

        let direct_url = match (format.url.as_deref(), format.protocol.as_deref()) {
            (Some(url), Some("https" | "http")) => Some(url.to_string()),
            _ => None,
        };

        Some(Self {
            id: format.format_id.clone(),
            kind,
            height: format.height,
            fps: format.fps,
            abr: format.abr,
            ext: format.ext.clone(),
            video_codec,
            audio_codec,
            filesize: format
                .filesize
                .or(format.filesize_approx)
                .filter(|size| *size > 0.0)
                .map(|size| size as u64),
            direct_url,
        })
    }

    /// Short tag used in artifact names (`1080p`, `128kbps`)
    pub fn quality_tag(&self) -> Option<String> {
        match self.kind {
            StreamKind::AudioOnly => self.abr.map(|abr| format!("{:.0}kbps", abr)),
            _ => self.height.map(|h| format!("{}p", h)),
        }
    }

    /// Human-readable option label
    pub fn display_label(&self) -> String {
        let size = self
            .filesize
            .map(|bytes| format!(" ({:.1}MB)", bytes as f64 / (1024.0 * 1024.0)))
            .unwrap_or_default();
        let quality = self.quality_tag().unwrap_or_else(|| self.id.clone());

        match self.kind {
            StreamKind::Combined => format!("{}{}", quality, size),
            StreamKind::VideoOnly => {
                let fps = self
                    .fps
                    .map(|fps| format!(" {:.0}fps", fps))
                    .unwrap_or_default();
                let codec = self.video_codec.as_deref().unwrap_or("");
                format!("V: {}{}{} {}", quality, fps, size, codec)
                    .trim_end()
                    .to_string()
            }
            StreamKind::AudioOnly => {
                let codec = self.audio_codec.as_deref().unwrap_or("");
                format!("A: {}{} {}", quality, size, codec)
                    .trim_end()
                    .to_string()
            }
        }
    }
}

fn real_codec(codec: Option<&str>) -> Option<String> {
    match codec {
        Some(c) if !c.is_empty() && c != "none" => Some(c.to_string()),
        _ => None,
    }
}

/// Result of a metadata lookup: a title and every stream on offer, in collaborator order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMedia {
    pub title: String,
    pub streams: Vec<StreamDescriptor>,
}

impl From<VideoInfo> for ExtractedMedia {
    fn from(info: VideoInfo) -> Self {
        let streams = info
            .formats
            .iter()
            .filter_map(StreamDescriptor::from_format)
            .collect();
        Self {
            title: info.title,
            streams,
        }
    }
}
