//! Filesystem-safe naming for downloaded artifacts

/// Maximum length, in characters, of a sanitized base name.
pub const MAX_FILENAME_CHARS: usize = 100;

/// Base name used when a title sanitizes to nothing.
pub const FALLBACK_FILENAME: &str = "downloaded_video";

const FORBIDDEN: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];
const EDGE_TRIM: &[char] = &['_', '.', '-', ' '];

/// Map an arbitrary title to a base name usable as a single path component.
///
/// Forbidden characters and control characters are dropped, whitespace runs become a
/// single `_`, separators and dots are trimmed from both ends and the result is capped
/// at [`MAX_FILENAME_CHARS`]. Never returns an empty string.
pub fn sanitize_filename(title: &str) -> String {
    let stripped: String = title
        .chars()
        .filter(|c| !FORBIDDEN.contains(c) && !c.is_control())
        .collect();

    let joined = stripped.split_whitespace().collect::<Vec<_>>().join("_");

    let mut collapsed = String::with_capacity(joined.len());
    for c in joined.chars() {
        if c == '.' && collapsed.ends_with('.') {
            continue;
        }
        collapsed.push(c);
    }

    let trimmed = collapsed.trim_matches(EDGE_TRIM);
    let capped: String = trimmed.chars().take(MAX_FILENAME_CHARS).collect();
    let capped = capped.trim_matches(EDGE_TRIM);

    if capped.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        capped.to_string()
    }
}

/// Build `<base>[_<tag>...].<ext>` with each tag sanitized the same way as titles.
pub fn artifact_file_name(base: &str, tags: &[&str], extension: &str) -> String {
    let mut name = base.to_string();
    for tag in tags {
        let tag = sanitize_tag(tag);
        if !tag.is_empty() {
            name.push('_');
            name.push_str(&tag);
        }
    }
    let extension = sanitize_tag(extension);
    if !extension.is_empty() {
        name.push('.');
        name.push_str(&extension);
    }
    name
}

fn sanitize_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}
