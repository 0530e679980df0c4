//! Partitioning and ordering of the streams offered for one video

use crate::extractor::models::{StreamDescriptor, StreamKind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Streams of one video split by kind, each bucket ordered best-first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamCatalog {
    pub progressive: Vec<StreamDescriptor>,
    pub video_only: Vec<StreamDescriptor>,
    pub audio_only: Vec<StreamDescriptor>,
}

impl StreamCatalog {
    /// Partition `streams` by kind and sort each bucket descending by quality.
    ///
    /// When `container` is set, combined and video-only streams in any other container
    /// are dropped. Sorting is stable: equal-quality streams keep collaborator order.
    pub fn categorize<I>(streams: I, container: Option<&str>) -> Self
    where
        I: IntoIterator<Item = StreamDescriptor>,
    {
        let mut catalog = Self::default();
        let accepts = |stream: &StreamDescriptor| {
            container.map_or(true, |c| stream.ext.eq_ignore_ascii_case(c))
        };

        for stream in streams {
            match stream.kind {
                StreamKind::Combined if accepts(&stream) => catalog.progressive.push(stream),
                StreamKind::VideoOnly if accepts(&stream) => catalog.video_only.push(stream),
                StreamKind::AudioOnly => catalog.audio_only.push(stream),
                _ => {}
            }
        }

        catalog.progressive.sort_by(compare_video);
        catalog.video_only.sort_by(compare_video);
        catalog.audio_only.sort_by(compare_audio);
        catalog
    }

    /// True when there is at least one stream carrying video
    pub fn is_playable(&self) -> bool {
        !self.progressive.is_empty() || !self.video_only.is_empty()
    }

    /// True when separate video and audio tracks are both on offer
    pub fn has_adaptive_pair(&self) -> bool {
        !self.video_only.is_empty() && !self.audio_only.is_empty()
    }

    /// The bucket holding streams of `kind`
    pub fn bucket(&self, kind: StreamKind) -> &[StreamDescriptor] {
        match kind {
            StreamKind::Combined => &self.progressive,
            StreamKind::VideoOnly => &self.video_only,
            StreamKind::AudioOnly => &self.audio_only,
        }
    }

    /// Look a stream up by id within the bucket for `kind`
    pub fn find(&self, kind: StreamKind, id: &str) -> Option<&StreamDescriptor> {
        self.bucket(kind).iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.progressive.len() + self.video_only.len() + self.audio_only.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Descending by height, then frame rate; streams without a height sort last.
fn compare_video(a: &StreamDescriptor, b: &StreamDescriptor) -> Ordering {
    b.height
        .unwrap_or(0)
        .cmp(&a.height.unwrap_or(0))
        .then_with(|| descending_f32(a.fps, b.fps))
}

/// Descending by average bitrate; streams without a bitrate sort last.
fn compare_audio(a: &StreamDescriptor, b: &StreamDescriptor) -> Ordering {
    descending_f32(a.abr, b.abr)
}

fn descending_f32(a: Option<f32>, b: Option<f32>) -> Ordering {
    let a = a.unwrap_or(0.0);
    let b = b.unwrap_or(0.0);
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str, kind: StreamKind, height: u32, fps: f32, ext: &str) -> StreamDescriptor {
        StreamDescriptor {
            id: id.to_string(),
            kind,
            height: Some(height),
            fps: Some(fps),
            abr: None,
            ext: ext.to_string(),
            video_codec: Some("avc1".to_string()),
            audio_codec: (kind == StreamKind::Combined).then(|| "mp4a".to_string()),
            filesize: None,
            direct_url: None,
        }
    }

    fn audio(id: &str, abr: Option<f32>, codec: &str) -> StreamDescriptor {
        StreamDescriptor {
            id: id.to_string(),
            kind: StreamKind::AudioOnly,
            height: None,
            fps: None,
            abr,
            ext: "m4a".to_string(),
            video_codec: None,
            audio_codec: Some(codec.to_string()),
            filesize: None,
            direct_url: None,
        }
    }

    fn ids(bucket: &[StreamDescriptor]) -> Vec<&str> {
        bucket.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_partition_by_kind() {
        let streams = vec![
            video("18", StreamKind::Combined, 360, 30.0, "mp4"),
            video("137", StreamKind::VideoOnly, 1080, 30.0, "mp4"),
            audio("140", Some(128.0), "mp4a.40.2"),
        ];
        let catalog = StreamCatalog::categorize(streams, None);
        assert_eq!(ids(&catalog.progressive), vec!["18"]);
        assert_eq!(ids(&catalog.video_only), vec!["137"]);
        assert_eq!(ids(&catalog.audio_only), vec!["140"]);
        assert_eq!(catalog.len(), 3);
        assert!(catalog.is_playable());
        assert!(catalog.has_adaptive_pair());
    }

    #[test]
    fn test_video_buckets_sorted_descending() {
        let streams = vec![
            video("160", StreamKind::VideoOnly, 144, 30.0, "mp4"),
            video("299", StreamKind::VideoOnly, 1080, 60.0, "mp4"),
            video("136", StreamKind::VideoOnly, 720, 30.0, "mp4"),
            video("137", StreamKind::VideoOnly, 1080, 30.0, "mp4"),
        ];
        let catalog = StreamCatalog::categorize(streams, None);
        assert_eq!(ids(&catalog.video_only), vec!["299", "137", "136", "160"]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_quality() {
        let streams = vec![
            video("a", StreamKind::VideoOnly, 720, 30.0, "mp4"),
            video("b", StreamKind::VideoOnly, 1080, 30.0, "mp4"),
            video("c", StreamKind::VideoOnly, 720, 30.0, "mp4"),
            video("d", StreamKind::VideoOnly, 1080, 30.0, "mp4"),
            audio("x", Some(128.0), "opus"),
            audio("y", Some(160.0), "opus"),
            audio("z", Some(128.0), "mp4a.40.2"),
        ];
        let catalog = StreamCatalog::categorize(streams, None);
        assert_eq!(ids(&catalog.video_only), vec!["b", "d", "a", "c"]);
        assert_eq!(ids(&catalog.audio_only), vec!["y", "x", "z"]);
    }

    #[test]
    fn test_missing_metric_sorts_last() {
        let streams = vec![
            audio("none", None, "mp4a"),
            audio("low", Some(48.0), "mp4a"),
        ];
        let catalog = StreamCatalog::categorize(streams, None);
        assert_eq!(ids(&catalog.audio_only), vec!["low", "none"]);
    }

    #[test]
    fn test_container_filter_applies_to_video_buckets_only() {
        let streams = vec![
            video("18", StreamKind::Combined, 360, 30.0, "mp4"),
            video("43", StreamKind::Combined, 360, 30.0, "webm"),
            video("248", StreamKind::VideoOnly, 1080, 30.0, "webm"),
            video("137", StreamKind::VideoOnly, 1080, 30.0, "MP4"),
            audio("251", Some(160.0), "opus"),
        ];
        let catalog = StreamCatalog::categorize(streams, Some("mp4"));
        assert_eq!(ids(&catalog.progressive), vec!["18"]);
        assert_eq!(ids(&catalog.video_only), vec!["137"]);
        assert_eq!(ids(&catalog.audio_only), vec!["251"]);
    }

    #[test]
    fn test_audio_only_catalog_is_not_playable() {
        let catalog = StreamCatalog::categorize(vec![audio("140", Some(128.0), "mp4a")], None);
        assert!(!catalog.is_playable());
        assert!(!catalog.has_adaptive_pair());
    }

    #[test]
    fn test_find_is_scoped_to_bucket() {
        let streams = vec![
            video("137", StreamKind::VideoOnly, 1080, 30.0, "mp4"),
            audio("140", Some(128.0), "mp4a"),
        ];
        let catalog = StreamCatalog::categorize(streams, None);
        assert!(catalog.find(StreamKind::VideoOnly, "137").is_some());
        assert!(catalog.find(StreamKind::AudioOnly, "137").is_none());
    }
}
