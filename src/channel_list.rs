//! Batch input: one channel identifier per line
//!
//! Blank lines and `#` comments are ignored. A line holding a link is reduced
//! to its last path segment, so `https://t.me/some_channel` becomes
//! `some_channel`.

use std::path::Path;

use url::Url;

use crate::error::{Error, Result};

/// Parse channel identifiers from the contents of a list file
pub fn parse_channel_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(normalize_identifier)
        .collect()
}

/// Read and parse a channel list file
pub fn read_channel_list(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
    let channels = parse_channel_list(&contents);
    tracing::info!(path = %path.display(), count = channels.len(), "Loaded channel list");
    Ok(channels)
}

/// Reduce a link to its trailing path segment; other identifiers pass through
fn normalize_identifier(line: &str) -> Option<String> {
    if !line.contains('/') {
        return Some(line.to_string());
    }

    let from_url = Url::parse(line).ok().and_then(|url| {
        url.path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string)
    });

    let segment = from_url.or_else(|| {
        line.split(['?', '#'])
            .next()
            .and_then(|path| path.split('/').filter(|s| !s.is_empty()).last())
            .map(str::to_string)
    })?;

    let segment = segment.trim_start_matches('@').trim().to_string();
    (!segment.is_empty()).then_some(segment)
}

/// Whether an identifier is already a numeric channel id
pub fn is_numeric_identifier(identifier: &str) -> bool {
    let digits = identifier.strip_prefix('-').unwrap_or(identifier);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_blank_lines_and_links() {
        let contents = "#comment\n\nchannel_a\nhttps://platform/t.me/channel_b\n";
        assert_eq!(parse_channel_list(contents), vec!["channel_a", "channel_b"]);
    }

    #[test]
    fn schemeless_links_and_trailing_slashes() {
        let contents = "t.me/first/\n  https://t.me/second?start=1  \n# t.me/ignored\n";
        assert_eq!(parse_channel_list(contents), vec!["first", "second"]);
    }

    #[test]
    fn numeric_ids_pass_through() {
        let contents = "-1001234567890\r\n42\r\n";
        let channels = parse_channel_list(contents);
        assert_eq!(channels, vec!["-1001234567890", "42"]);
        assert!(channels.iter().all(|c| is_numeric_identifier(c)));
        assert!(!is_numeric_identifier("channel_a"));
        assert!(!is_numeric_identifier("-"));
    }

    #[test]
    fn read_missing_file_reports_path() {
        let err = read_channel_list(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(err.to_string().contains("here.txt"));
    }
}
