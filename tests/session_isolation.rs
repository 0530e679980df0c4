//! Concurrent sessions never observe each other's state

use anyhow::anyhow;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tubefetch::downloader::{Merger, TransferEvent};
use tubefetch::extractor::{ExtractedMedia, Extractor, StreamDescriptor, StreamKind};
use tubefetch::utils::AppSettings;
use tubefetch::workflow::{Phase, QualityChoice, SessionRegistry, Workflow};
use tubefetch::TubefetchError;

/// Titles each video after the last character of its URL
struct EchoExtractor;

#[async_trait]
impl Extractor for EchoExtractor {
    fn id(&self) -> &'static str {
        "echo"
    }

    async fn extract_info(&self, url: &str) -> anyhow::Result<ExtractedMedia> {
        let suffix = url.chars().last().unwrap_or('x');
        Ok(ExtractedMedia {
            title: format!("Video {}", suffix),
            streams: vec![StreamDescriptor {
                id: "18".to_string(),
                kind: StreamKind::Combined,
                height: Some(360),
                fps: None,
                abr: None,
                ext: "mp4".to_string(),
                video_codec: Some("avc1".to_string()),
                audio_codec: Some("mp4a".to_string()),
                filesize: None,
                direct_url: None,
            }],
        })
    }

    async fn fetch_stream(
        &self,
        _url: &str,
        _stream: &StreamDescriptor,
        destination: &Path,
        on_event: &mut (dyn FnMut(TransferEvent) + Send),
    ) -> anyhow::Result<u64> {
        tokio::fs::write(destination, b"0123456789").await?;
        on_event(TransferEvent::finished(10, Some(10)));
        Ok(10)
    }
}

fn registry(dir: PathBuf) -> SessionRegistry {
    SessionRegistry::new(move || {
        let settings = AppSettings {
            download_location: dir.clone(),
            ..AppSettings::default()
        };
        Workflow::new(Arc::new(EchoExtractor), None, settings)
    })
}

#[tokio::test]
async fn registry_create_get_remove() {
    let temp = TempDir::new().expect("temp dir");
    let registry = registry(temp.path().to_path_buf());
    assert!(registry.is_empty().await);

    let (first, _) = registry.create().await;
    let (second, _) = registry.create().await;
    assert_ne!(first, second);
    assert_eq!(registry.len().await, 2);
    assert!(registry.get(&first).await.is_some());

    assert!(registry.remove(&first).await);
    assert!(!registry.remove(&first).await, "Second removal finds nothing");
    assert!(registry.get(&first).await.is_none());
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn sessions_have_independent_state() {
    let temp = TempDir::new().expect("temp dir");
    let registry = registry(temp.path().to_path_buf());

    let (_, alice) = registry.create().await;
    let (_, bob) = registry.create().await;

    alice
        .lock()
        .await
        .submit_url("https://www.youtube.com/watch?v=aaaaaaaaaaA")
        .await
        .expect("alice fetch");

    {
        let bob = bob.lock().await;
        assert_eq!(bob.state().phase(), Phase::Idle, "Untouched by another session");
        assert!(bob.state().catalog().is_none());
    }

    bob.lock()
        .await
        .submit_url("https://example.com/not-youtube")
        .await
        .expect_err("invalid url");

    let alice = alice.lock().await;
    assert_eq!(alice.state().phase(), Phase::Selecting);
    assert_eq!(alice.state().title(), Some("Video A"));
    assert!(alice.state().error().is_none(), "Other session's failure not visible");
    assert_eq!(bob.lock().await.state().phase(), Phase::Error);
}

#[tokio::test]
async fn concurrent_sessions_download_their_own_artifacts() {
    let temp = TempDir::new().expect("temp dir");
    let registry = Arc::new(registry(temp.path().to_path_buf()));

    let mut handles = Vec::new();
    for suffix in ['A', 'B', 'C'] {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let (_, session) = registry.create().await;
            let mut workflow = session.lock().await;
            workflow
                .submit_url(&format!("https://youtu.be/aaaaaaaaaa{}", suffix))
                .await
                .expect("fetch");
            workflow
                .choose(QualityChoice::Progressive {
                    stream_id: "18".to_string(),
                })
                .expect("choose");
            workflow.download().await.expect("download")
        }));
    }

    let mut names = Vec::new();
    for handle in handles {
        let artifact = handle.await.expect("task");
        assert_eq!(artifact.size_bytes, 10);
        names.push(artifact.file_name);
    }
    names.sort();
    assert_eq!(
        names,
        vec!["Video_A_360p.mp4", "Video_B_360p.mp4", "Video_C_360p.mp4"]
    );
    assert_eq!(registry.len().await, 3);
}

// ============================================================
// SAME VIDEO IN SEVERAL SESSIONS
// ============================================================

const SHARED_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

/// Serves one video to every caller, filling each stream with its own byte value
struct SharedVideoExtractor {
    fail_id: Option<&'static str>,
}

impl SharedVideoExtractor {
    fn streams() -> Vec<StreamDescriptor> {
        let base = StreamDescriptor {
            id: String::new(),
            kind: StreamKind::Combined,
            height: None,
            fps: None,
            abr: None,
            ext: "mp4".to_string(),
            video_codec: None,
            audio_codec: None,
            filesize: None,
            direct_url: None,
        };
        vec![
            StreamDescriptor {
                id: "22".to_string(),
                height: Some(720),
                video_codec: Some("avc1".to_string()),
                audio_codec: Some("mp4a".to_string()),
                ..base.clone()
            },
            StreamDescriptor {
                id: "136".to_string(),
                kind: StreamKind::VideoOnly,
                height: Some(720),
                video_codec: Some("avc1".to_string()),
                ..base.clone()
            },
            StreamDescriptor {
                id: "140".to_string(),
                kind: StreamKind::AudioOnly,
                abr: Some(128.0),
                ext: "m4a".to_string(),
                audio_codec: Some("mp4a.40.2".to_string()),
                ..base
            },
        ]
    }

    fn payload(id: &str) -> (u8, usize) {
        match id {
            "136" => (b'v', 6000),
            "140" => (b'a', 2000),
            _ => (b'p', 4000),
        }
    }
}

#[async_trait]
impl Extractor for SharedVideoExtractor {
    fn id(&self) -> &'static str {
        "shared"
    }

    async fn extract_info(&self, _url: &str) -> anyhow::Result<ExtractedMedia> {
        Ok(ExtractedMedia {
            title: "Same Title".to_string(),
            streams: Self::streams(),
        })
    }

    async fn fetch_stream(
        &self,
        _url: &str,
        stream: &StreamDescriptor,
        destination: &Path,
        on_event: &mut (dyn FnMut(TransferEvent) + Send),
    ) -> anyhow::Result<u64> {
        let (byte, len) = Self::payload(&stream.id);
        let half = vec![byte; len / 2];
        tokio::fs::write(destination, &half).await?;
        on_event(TransferEvent::downloading(half.len() as u64, Some(len as u64)));
        // Let concurrent sessions interleave their transfers.
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.fail_id == Some(stream.id.as_str()) {
            return Err(anyhow!("connection reset"));
        }
        tokio::fs::write(destination, vec![byte; len]).await?;
        on_event(TransferEvent::finished(len as u64, Some(len as u64)));
        Ok(len as u64)
    }
}

fn shared_session(
    dir: &Path,
    fail_id: Option<&'static str>,
    merger: Option<Merger>,
) -> Workflow {
    let settings = AppSettings {
        download_location: dir.to_path_buf(),
        ..AppSettings::default()
    };
    Workflow::new(Arc::new(SharedVideoExtractor { fail_id }), merger, settings)
}

async fn run(workflow: &mut Workflow, choice: QualityChoice) -> Result<PathBuf, TubefetchError> {
    workflow.submit_url(SHARED_URL).await?;
    workflow.choose(choice)?;
    Ok(workflow.download().await?.path)
}

fn progressive_choice() -> QualityChoice {
    QualityChoice::Progressive {
        stream_id: "22".to_string(),
    }
}

/// A stand-in for ffmpeg concatenating both inputs, or failing when `fail` is set
#[cfg(unix)]
fn concat_merger(dir: &Path, fail: bool) -> Merger {
    use std::os::unix::fs::PermissionsExt;

    let body = if fail {
        "echo 'codec mismatch' >&2\nexit 1"
    } else {
        "sleep 0.1\ncat \"$3\" \"$5\" > \"$last\""
    };
    let path = dir.join(if fail { "ffmpeg-fail" } else { "ffmpeg-concat" });
    std::fs::write(&path, format!("#!/bin/sh\nfor last; do :; done\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    Merger::new(
        path,
        tubefetch::downloader::MergeStrategy::StreamCopy,
        Duration::from_secs(30),
    )
}

fn assert_finished_with(workflow: &Workflow, expected: &[u8]) {
    assert_eq!(workflow.state().phase(), Phase::Finished);
    let artifact = workflow.artifact().expect("artifact recorded");
    let bytes = std::fs::read(&artifact.path).expect("artifact still on disk");
    assert_eq!(bytes, expected);
    assert_eq!(artifact.size_bytes, expected.len() as u64);
}

#[tokio::test]
async fn concurrent_progressive_sessions_on_same_video() {
    let temp = TempDir::new().expect("temp dir");
    let mut first = shared_session(temp.path(), None, None);
    let mut second = shared_session(temp.path(), None, None);

    let (a, b) = tokio::join!(
        run(&mut first, progressive_choice()),
        run(&mut second, progressive_choice())
    );
    assert_eq!(a.expect("first"), b.expect("second"), "Same artifact name");

    let expected = vec![b'p'; 4000];
    assert_finished_with(&first, &expected);
    assert_finished_with(&second, &expected);
    assert!(!temp.path().join("temp").exists(), "No scratch files left");
}

#[cfg(unix)]
#[tokio::test]
async fn concurrent_auto_sessions_on_same_video() {
    let temp = TempDir::new().expect("temp dir");
    let mut first = shared_session(temp.path(), None, Some(concat_merger(temp.path(), false)));
    let mut second = shared_session(temp.path(), None, Some(concat_merger(temp.path(), false)));

    let (a, b) = tokio::join!(
        run(&mut first, QualityChoice::Auto),
        run(&mut second, QualityChoice::Auto)
    );
    let path = a.expect("first");
    assert_eq!(path, b.expect("second"));
    assert!(path.ends_with("Same_Title_720p_128kbps.mp4"));

    let mut expected = vec![b'v'; 6000];
    expected.extend(vec![b'a'; 2000]);
    assert_finished_with(&first, &expected);
    assert_finished_with(&second, &expected);
    assert!(!temp.path().join("temp").exists(), "No scratch files left");
}

#[tokio::test]
async fn failed_transfer_keeps_earlier_artifact() {
    let temp = TempDir::new().expect("temp dir");
    let mut done = shared_session(temp.path(), None, None);
    run(&mut done, progressive_choice()).await.expect("first download");

    let mut failing = shared_session(temp.path(), Some("22"), None);
    let result = run(&mut failing, progressive_choice()).await;
    assert!(matches!(result, Err(TubefetchError::TransferError(_))));
    assert_eq!(failing.state().phase(), Phase::Error);

    assert_finished_with(&done, &vec![b'p'; 4000]);
}

#[cfg(unix)]
#[tokio::test]
async fn failed_merge_keeps_earlier_artifact() {
    let temp = TempDir::new().expect("temp dir");
    let mut done = shared_session(temp.path(), None, Some(concat_merger(temp.path(), false)));
    run(&mut done, QualityChoice::Auto).await.expect("first download");

    let mut failing = shared_session(temp.path(), None, Some(concat_merger(temp.path(), true)));
    let result = run(&mut failing, QualityChoice::Auto).await;
    assert!(matches!(result, Err(TubefetchError::MergeError(_))));

    let mut expected = vec![b'v'; 6000];
    expected.extend(vec![b'a'; 2000]);
    assert_finished_with(&done, &expected);
    assert!(!temp.path().join("temp").exists());
}
