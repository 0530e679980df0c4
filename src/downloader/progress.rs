//! Progress tracking for stream transfers

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Raw progress report from the extraction collaborator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferEvent {
    pub status: TransferStatus,
    /// Total size when the collaborator knows it
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: u64,
}

impl TransferEvent {
    pub fn downloading(downloaded_bytes: u64, total_bytes: Option<u64>) -> Self {
        Self {
            status: TransferStatus::Downloading,
            total_bytes,
            downloaded_bytes,
        }
    }

    pub fn finished(downloaded_bytes: u64, total_bytes: Option<u64>) -> Self {
        Self {
            status: TransferStatus::Finished,
            total_bytes,
            downloaded_bytes,
        }
    }
}

/// Transfer status as reported by the collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferStatus {
    #[default]
    Downloading,
    Finished,
}

/// Which byte-fetch sub-operation a progress update belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStage {
    /// The single stream of a progressive download
    Combined,
    Video,
    Audio,
}

impl TransferStage {
    pub fn label(&self) -> &'static str {
        match self {
            TransferStage::Combined => "Downloading Combined Video/Audio",
            TransferStage::Video => "Downloading Video",
            TransferStage::Audio => "Downloading Audio",
        }
    }
}

/// Caller-visible progress of one sub-operation
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub stage: TransferStage,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub speed: f64, // bytes per second
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    /// Completed fraction in [0, 1]; `None` while the total size is unknown
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                Some((self.downloaded_bytes as f64 / total as f64).clamp(0.0, 1.0))
            }
            _ => None,
        }
    }

    /// Integer percentage, `None` while indeterminate
    pub fn percent(&self) -> Option<u8> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                let percent = self.downloaded_bytes as u128 * 100 / total as u128;
                Some(percent.min(100) as u8)
            }
            _ => None,
        }
    }

    /// One-line description, e.g.
    /// `Downloading Video... 42% (4.2/10.0 MB) | Speed: 2.10 MB/s | ETA: 3s`
    pub fn summary(&self) -> String {
        let amount = match (self.percent(), self.total_bytes) {
            (Some(percent), Some(total)) => format!(
                "{}% ({:.1}/{:.1} MB)",
                percent,
                to_mb(self.downloaded_bytes),
                to_mb(total)
            ),
            _ => format!("{:.1} MB", to_mb(self.downloaded_bytes)),
        };
        format!(
            "{}... {} | Speed: {} | ETA: {}",
            self.stage.label(),
            amount,
            format_speed(self.speed),
            format_eta(self.eta)
        )
    }
}

fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Format bytes/sec as `2.10 MB/s`
pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec <= 0.0 {
        return "Calculating...".to_string();
    }
    if bytes_per_sec >= 1024.0 * 1024.0 {
        format!("{:.2} MB/s", bytes_per_sec / (1024.0 * 1024.0))
    } else if bytes_per_sec >= 1024.0 {
        format!("{:.2} KB/s", bytes_per_sec / 1024.0)
    } else {
        format!("{:.0} B/s", bytes_per_sec)
    }
}

/// Format an ETA as `1h 2m 3s`, `2m 3s` or `3s`
pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(duration) => {
            let total_secs = duration.as_secs();
            let hours = total_secs / 3600;
            let minutes = (total_secs % 3600) / 60;
            let seconds = total_secs % 60;

            if hours > 0 {
                format!("{}h {}m {}s", hours, minutes, seconds)
            } else if minutes > 0 {
                format!("{}m {}s", minutes, seconds)
            } else {
                format!("{}s", seconds)
            }
        }
        None => "Calculating...".to_string(),
    }
}

/// Turns collaborator events into throttled snapshots for one sub-operation.
///
/// A snapshot is emitted when the integer percentage advances past the last emitted one,
/// or when more than `interval` has passed since the last emission. Create a fresh
/// tracker for every transfer so each starts from a 0% baseline.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    stage: TransferStage,
    interval: Duration,
    started: Instant,
    last_emit: Instant,
    last_percent: Option<u8>,
    total_bytes: Option<u64>,
    downloaded_bytes: u64,
}

impl ProgressTracker {
    pub fn new(stage: TransferStage, interval: Duration) -> Self {
        Self::starting_at(stage, interval, Instant::now())
    }

    /// Tracker whose clock starts at `start`
    pub fn starting_at(stage: TransferStage, interval: Duration, start: Instant) -> Self {
        Self {
            stage,
            interval,
            started: start,
            last_emit: start,
            last_percent: None,
            total_bytes: None,
            downloaded_bytes: 0,
        }
    }

    pub fn stage(&self) -> TransferStage {
        self.stage
    }

    /// Last total size reported by the collaborator
    pub fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes
    }

    pub fn observe(&mut self, event: &TransferEvent) -> Option<ProgressSnapshot> {
        self.observe_at(event, Instant::now())
    }

    /// Record `event` as seen at `now` and return a snapshot if one is due.
    pub fn observe_at(&mut self, event: &TransferEvent, now: Instant) -> Option<ProgressSnapshot> {
        if let Some(total) = event.total_bytes.filter(|t| *t > 0) {
            self.total_bytes = Some(total);
        }
        self.downloaded_bytes = event.downloaded_bytes;

        let snapshot = self.snapshot_at(now);
        let percent = snapshot.percent();
        let advanced = match (percent, self.last_percent) {
            (Some(current), Some(last)) => current > last,
            (Some(_), None) => true,
            (None, _) => false,
        };
        let stale = now.saturating_duration_since(self.last_emit) > self.interval;

        if advanced || stale {
            self.last_emit = now;
            if percent.is_some() {
                self.last_percent = percent;
            }
            Some(snapshot)
        } else {
            None
        }
    }

    /// Current progress regardless of throttling
    pub fn snapshot_at(&self, now: Instant) -> ProgressSnapshot {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let speed = if elapsed > 0.0 {
            self.downloaded_bytes as f64 / elapsed
        } else {
            0.0
        };
        let eta = match self.total_bytes {
            Some(total) if self.downloaded_bytes >= total => Some(Duration::ZERO),
            Some(total) if speed > 0.0 => Some(Duration::from_secs_f64(
                (total - self.downloaded_bytes) as f64 / speed,
            )),
            _ => None,
        };

        ProgressSnapshot {
            stage: self.stage,
            downloaded_bytes: self.downloaded_bytes,
            total_bytes: self.total_bytes,
            speed,
            eta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    fn tracker(start: Instant) -> ProgressTracker {
        ProgressTracker::starting_at(TransferStage::Video, Duration::from_millis(500), start)
    }

    // ============================================================
    // SNAPSHOT MATH
    // ============================================================

    #[test]
    fn test_fraction_known_total() {
        let snapshot = ProgressSnapshot {
            stage: TransferStage::Video,
            downloaded_bytes: 250,
            total_bytes: Some(1000),
            speed: 0.0,
            eta: None,
        };
        assert_eq!(snapshot.fraction(), Some(0.25));
        assert_eq!(snapshot.percent(), Some(25));
    }

    #[test]
    fn test_fraction_indeterminate() {
        let snapshot = ProgressSnapshot {
            stage: TransferStage::Audio,
            downloaded_bytes: 250,
            total_bytes: None,
            speed: 0.0,
            eta: None,
        };
        assert_eq!(snapshot.fraction(), None, "Unknown total must be indeterminate");
        assert_eq!(snapshot.percent(), None);
    }

    #[test]
    fn test_fraction_clamped_when_over_total() {
        let snapshot = ProgressSnapshot {
            stage: TransferStage::Combined,
            downloaded_bytes: 1500,
            total_bytes: Some(1000),
            speed: 0.0,
            eta: None,
        };
        assert_eq!(snapshot.fraction(), Some(1.0));
        assert_eq!(snapshot.percent(), Some(100));
    }

    #[test]
    fn test_speed_and_eta_from_elapsed_time() {
        let start = Instant::now();
        let mut tracker = tracker(start);
        let snapshot = tracker
            .observe_at(
                &TransferEvent::downloading(4 * MB, Some(10 * MB)),
                start + Duration::from_secs(2),
            )
            .expect("percentage advanced");

        assert_eq!(snapshot.speed, (2 * MB) as f64);
        assert_eq!(snapshot.eta, Some(Duration::from_secs(3)));
        assert_eq!(
            snapshot.summary(),
            "Downloading Video... 40% (4.0/10.0 MB) | Speed: 2.00 MB/s | ETA: 3s"
        );
    }

    // ============================================================
    // THROTTLING
    // ============================================================

    #[test]
    fn test_first_event_is_emitted() {
        let start = Instant::now();
        let mut tracker = tracker(start);
        let first = tracker.observe_at(&TransferEvent::downloading(0, Some(1000)), start);
        assert!(first.is_some(), "0% is an advance over the unset baseline");
    }

    #[test]
    fn test_same_percent_within_interval_is_suppressed() {
        let start = Instant::now();
        let mut tracker = tracker(start);
        assert!(tracker
            .observe_at(&TransferEvent::downloading(100, Some(1000)), start)
            .is_some());
        assert!(tracker
            .observe_at(
                &TransferEvent::downloading(105, Some(1000)),
                start + Duration::from_millis(100)
            )
            .is_none());
        assert!(tracker
            .observe_at(
                &TransferEvent::downloading(109, Some(1000)),
                start + Duration::from_millis(400)
            )
            .is_none());
    }

    #[test]
    fn test_percent_advance_emits_immediately() {
        let start = Instant::now();
        let mut tracker = tracker(start);
        tracker.observe_at(&TransferEvent::downloading(100, Some(1000)), start);
        let next = tracker.observe_at(
            &TransferEvent::downloading(110, Some(1000)),
            start + Duration::from_millis(1),
        );
        assert_eq!(next.and_then(|s| s.percent()), Some(11));
    }

    #[test]
    fn test_interval_elapsed_emits_without_advance() {
        let start = Instant::now();
        let mut tracker = tracker(start);
        tracker.observe_at(&TransferEvent::downloading(100, Some(1000)), start);

        // Exactly the interval is not enough; it must be exceeded.
        assert!(tracker
            .observe_at(
                &TransferEvent::downloading(101, Some(1000)),
                start + Duration::from_millis(500)
            )
            .is_none());
        assert!(tracker
            .observe_at(
                &TransferEvent::downloading(102, Some(1000)),
                start + Duration::from_millis(501)
            )
            .is_some());
    }

    #[test]
    fn test_indeterminate_progress_only_emits_on_interval() {
        let start = Instant::now();
        let mut tracker = tracker(start);
        assert!(tracker
            .observe_at(&TransferEvent::downloading(10, None), start)
            .is_none());
        assert!(tracker
            .observe_at(
                &TransferEvent::downloading(20, None),
                start + Duration::from_millis(600)
            )
            .is_some());
        assert!(tracker
            .observe_at(
                &TransferEvent::downloading(30, None),
                start + Duration::from_millis(700)
            )
            .is_none());
    }

    #[test]
    fn test_fresh_tracker_resets_baseline() {
        let start = Instant::now();
        let mut video = tracker(start);
        video.observe_at(&TransferEvent::finished(1000, Some(1000)), start);

        let mut audio =
            ProgressTracker::starting_at(TransferStage::Audio, Duration::from_millis(500), start);
        let first = audio
            .observe_at(&TransferEvent::downloading(0, Some(500)), start)
            .expect("new sub-operation starts from 0%");
        assert_eq!(first.percent(), Some(0));
        assert_eq!(first.stage, TransferStage::Audio);
    }

    #[test]
    fn test_tracker_remembers_last_total() {
        let start = Instant::now();
        let mut tracker = tracker(start);
        tracker.observe_at(&TransferEvent::downloading(10, Some(1000)), start);
        tracker.observe_at(&TransferEvent::finished(1000, None), start);
        assert_eq!(tracker.total_bytes(), Some(1000));
        assert_eq!(tracker.downloaded_bytes(), 1000);
    }

    // ============================================================
    // FORMATTING
    // ============================================================

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(0.0), "Calculating...");
        assert_eq!(format_speed(512.0), "512 B/s");
        assert_eq!(format_speed(2048.0), "2.00 KB/s");
        assert_eq!(format_speed(2.1 * MB as f64), "2.10 MB/s");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(None), "Calculating...");
        assert_eq!(format_eta(Some(Duration::from_secs(3))), "3s");
        assert_eq!(format_eta(Some(Duration::from_secs(125))), "2m 5s");
        assert_eq!(format_eta(Some(Duration::from_secs(3723))), "1h 2m 3s");
    }

    #[test]
    fn test_summary_indeterminate() {
        let snapshot = ProgressSnapshot {
            stage: TransferStage::Audio,
            downloaded_bytes: 3 * MB,
            total_bytes: None,
            speed: 0.0,
            eta: None,
        };
        assert_eq!(
            snapshot.summary(),
            "Downloading Audio... 3.0 MB | Speed: Calculating... | ETA: Calculating..."
        );
    }
}
