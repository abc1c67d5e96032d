//! Small helpers shared by the sink, the recorder and `main`.
//!
//! - Slugs for output and snapshot file names
//! - String truncation for log fields
//! - Output directory validation

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

/// Lowercase, ASCII alphanumerics, runs of anything else collapsed to `-`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify("Atlanta Hawks"), "atlanta-hawks");
/// assert_eq!(slugify("  Nikola Jokić!! "), "nikola-joki");
/// ```
pub fn slugify(text: &str) -> String {
    let lower = text.to_lowercase();
    NON_SLUG.replace_all(&lower, "-").trim_matches('-').to_string()
}

/// Slug of a URL's path, e.g. `/players/y/youngtr01.html` -> `players-y-youngtr01`.
///
/// Falls back to slugging the raw string when it does not parse.
pub fn url_slug(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let path = path.strip_suffix(".html").unwrap_or(&path);
    let slug = slugify(path);
    if slug.is_empty() { "index".to_string() } else { slug }
}

/// Last path segment of a URL without its extension, slugged.
pub fn url_tail_slug(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let tail = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let stem = tail.split('.').next().unwrap_or(tail);
    let slug = slugify(stem);
    (!slug.is_empty()).then_some(slug)
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at a char boundary at or below `max` bytes and get
/// `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a scratch file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let scratch_path = path.join("..__write_check__");
    stdfs::File::create(&scratch_path)?;
    let _ = stdfs::remove_file(&scratch_path);
    info!("Output directory is writable");
    Ok(())
}
