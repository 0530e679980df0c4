//! YouTube link validation
//!
//! Accepts the watch-page form (`youtube.com/watch?v=ID`), the short-link form
//! (`youtu.be/ID`) and the shorts form (`youtube.com/shorts/ID`), each carrying an
//! 11-character video identifier. Anything after the identifier must start a new
//! path segment, query or fragment, so 12-character identifiers are rejected.

use regex::Regex;
use std::sync::OnceLock;

static YOUTUBE_URL: OnceLock<Regex> = OnceLock::new();

fn youtube_regex() -> &'static Regex {
    YOUTUBE_URL.get_or_init(|| {
        Regex::new(
            r"^(?:https?://)?(?:(?:www|m)\.)?(?:youtube\.com/(?:watch\?v=|shorts/)|youtu\.be/)([^&?/#\s]{11})(?:[?&#/]\S*)?$",
        )
        .expect("static YouTube pattern compiles")
    })
}

/// Check whether `url` is a well-formed link to a single video.
pub fn is_valid_youtube_url(url: &str) -> bool {
    let url = url.trim();
    !url.is_empty() && youtube_regex().is_match(url)
}

/// Extract the 11-character video identifier from an accepted link.
pub fn video_id(url: &str) -> Option<&str> {
    youtube_regex()
        .captures(url.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
