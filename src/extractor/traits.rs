use crate::downloader::progress::TransferEvent;
use crate::extractor::models::{ExtractedMedia, StreamDescriptor};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Core trait for the extraction collaborator
///
/// This trait isolates the workflow from how metadata is resolved and bytes are
/// fetched (yt-dlp today, a mock in tests).
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns a unique identifier for this extractor (e.g., "ytdlp")
    fn id(&self) -> &'static str;

    /// Resolves `url` into a title and every stream on offer.
    ///
    /// An inaccessible resource should fail with `TubefetchError::Unavailable` inside the
    /// returned error so callers can tell it apart from other failures.
    async fn extract_info(&self, url: &str) -> Result<ExtractedMedia>;

    /// Transfers `stream` of `url` into `destination`, reporting progress through
    /// `on_event` as often as the extractor sees fit.
    ///
    /// Returns the number of bytes written.
    async fn fetch_stream(
        &self,
        url: &str,
        stream: &StreamDescriptor,
        destination: &Path,
        on_event: &mut (dyn FnMut(TransferEvent) + Send),
    ) -> Result<u64>;
}
