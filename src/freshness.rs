//! Existence and freshness evaluation
//!
//! Decides per message whether its attachment must be fetched, based on the
//! state of the destination file and the caller's [`AllowSet`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::media::{MediaDescriptor, MediaKind, ensure_parent_dir};
use crate::scheduler::DownloadTask;
use crate::types::{Message, RunStats};

/// State of a destination file relative to its message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// No file at the path
    Missing,
    /// File exists with zero length (interrupted transfer)
    Empty,
    /// Message is newer than the file (attachment was edited)
    Stale,
    /// File exists and is up to date
    Current,
}

impl Freshness {
    /// Whether the attachment has to be transferred
    pub fn needs_download(&self) -> bool {
        !matches!(self, Freshness::Current)
    }
}

/// Inspect the file at `path` against a message timestamp (seconds)
pub async fn check(path: &Path, message_date: i64) -> Result<Freshness> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Freshness::Missing),
        Err(e) => return Err(Error::file(path, e)),
    };

    if metadata.len() == 0 {
        return Ok(Freshness::Empty);
    }

    let modified = metadata.modified().map_err(|e| Error::file(path, e))?;
    let modified: DateTime<Utc> = modified.into();
    let newer = DateTime::<Utc>::from_timestamp(message_date, 0).is_some_and(|d| d > modified);

    Ok(if newer {
        Freshness::Stale
    } else {
        Freshness::Current
    })
}

/// Which attachments to fetch, by kind, extension, or everything
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowSet {
    /// Download every attachment
    #[serde(default)]
    pub all: bool,
    /// Allowed media kinds
    #[serde(default)]
    pub kinds: HashSet<MediaKind>,
    /// Allowed extensions, lowercase without the dot
    #[serde(default)]
    pub extensions: HashSet<String>,
}

impl Default for AllowSet {
    fn default() -> Self {
        Self::everything()
    }
}

impl AllowSet {
    /// Allow every attachment
    pub fn everything() -> Self {
        Self {
            all: true,
            kinds: HashSet::new(),
            extensions: HashSet::new(),
        }
    }

    /// Allow only the given kinds
    pub fn kinds(kinds: impl IntoIterator<Item = MediaKind>) -> Self {
        Self {
            all: false,
            kinds: kinds.into_iter().collect(),
            extensions: HashSet::new(),
        }
    }

    /// Additionally allow an extension (with or without the dot)
    pub fn with_extension(mut self, ext: &str) -> Self {
        self.extensions
            .insert(ext.trim_start_matches('.').to_ascii_lowercase());
        self
    }

    /// Whether an attachment of this kind and file is allowed
    pub fn allows(&self, kind: MediaKind, path: &Path) -> bool {
        if self.all || self.kinds.contains(&kind) {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(&e.to_ascii_lowercase()))
    }
}

/// Outcome of evaluating one message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Evaluation {
    /// The message has no attachment
    NoMedia,
    /// Nothing to fetch
    Skip {
        /// Destination that was checked
        path: PathBuf,
        /// File state at that destination
        freshness: Freshness,
    },
    /// The attachment must be fetched
    Fetch(DownloadTask),
}

/// Evaluate one message and update the run statistics
///
/// Every message with media increments `total_files` and exactly one of
/// `downloaded`, `updated` or `skipped`.
pub async fn evaluate(
    message: &Message,
    channel_root: &Path,
    allow: &AllowSet,
    stats: &mut RunStats,
) -> Result<Evaluation> {
    let Some(descriptor) = MediaDescriptor::of(message) else {
        return Ok(Evaluation::NoMedia);
    };
    let path = descriptor.path_in(channel_root);
    ensure_parent_dir(&path)
        .await
        .map_err(|e| Error::file(&path, e))?;

    stats.total_files += 1;
    let freshness = check(&path, message.date).await?;

    if !freshness.needs_download() || !allow.allows(descriptor.kind, &path) {
        stats.skipped += 1;
        tracing::debug!(
            message_id = message.id,
            path = %path.display(),
            ?freshness,
            "Skipping attachment"
        );
        return Ok(Evaluation::Skip { path, freshness });
    }

    match freshness {
        Freshness::Missing => stats.downloaded += 1,
        Freshness::Empty => {
            stats.updated += 1;
            tracing::info!(path = %path.display(), "File exists but is empty, will redownload");
        }
        Freshness::Stale => {
            stats.updated += 1;
            tracing::info!(path = %path.display(), "File has updates, will redownload");
        }
        Freshness::Current => {}
    }

    Ok(Evaluation::Fetch(DownloadTask {
        message: message.clone(),
        target: path,
    }))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaPayload;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::tempdir;

    const FILE_TIME: i64 = 1_700_000_000;

    fn photo(id: i64, date: i64) -> Message {
        Message {
            id,
            date,
            media: Some(MediaPayload {
                photo: true,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn write_with_mtime(path: &Path, contents: &[u8], secs: i64) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(secs as u64))
            .unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_downloaded() {
        let dir = tempdir().unwrap();
        let mut stats = RunStats::default();
        let eval = evaluate(&photo(1, FILE_TIME), dir.path(), &AllowSet::everything(), &mut stats)
            .await
            .unwrap();

        match eval {
            Evaluation::Fetch(task) => {
                assert_eq!(task.target, dir.path().join("image").join("1.jpg"))
            }
            other => panic!("expected fetch, got {other:?}"),
        }
        assert_eq!(stats.downloaded, 1);
        assert_eq!(stats.total_files, 1);
        assert!(dir.path().join("image").is_dir());
    }

    #[tokio::test]
    async fn up_to_date_file_is_skipped_every_time() {
        let dir = tempdir().unwrap();
        write_with_mtime(&dir.path().join("image/2.jpg"), b"jpeg", FILE_TIME);
        let mut stats = RunStats::default();

        for round in 1..=3 {
            let eval = evaluate(
                &photo(2, FILE_TIME),
                dir.path(),
                &AllowSet::everything(),
                &mut stats,
            )
            .await
            .unwrap();
            assert!(matches!(
                eval,
                Evaluation::Skip {
                    freshness: Freshness::Current,
                    ..
                }
            ));
            assert_eq!(stats.skipped, round);
        }
        assert_eq!(stats.downloaded + stats.updated, 0);
    }

    #[tokio::test]
    async fn empty_file_is_redownloaded() {
        let dir = tempdir().unwrap();
        write_with_mtime(&dir.path().join("image/3.jpg"), b"", FILE_TIME + 100);
        let mut stats = RunStats::default();
        let eval = evaluate(&photo(3, FILE_TIME), dir.path(), &AllowSet::everything(), &mut stats)
            .await
            .unwrap();
        assert!(matches!(eval, Evaluation::Fetch(_)));
        assert_eq!(stats.updated, 1);
    }

    #[tokio::test]
    async fn older_file_is_redownloaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("image/4.jpg");
        write_with_mtime(&path, b"jpeg", FILE_TIME - 1);
        assert_eq!(check(&path, FILE_TIME).await.unwrap(), Freshness::Stale);
        assert_eq!(check(&path, FILE_TIME - 1).await.unwrap(), Freshness::Current);
    }

    #[tokio::test]
    async fn disallowed_kind_counts_as_skipped() {
        let dir = tempdir().unwrap();
        let mut stats = RunStats::default();
        let allow = AllowSet::kinds([MediaKind::Video]);
        let eval = evaluate(&photo(5, FILE_TIME), dir.path(), &allow, &mut stats)
            .await
            .unwrap();
        assert!(matches!(
            eval,
            Evaluation::Skip {
                freshness: Freshness::Missing,
                ..
            }
        ));
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.downloaded, 0);
    }

    #[tokio::test]
    async fn message_without_media_is_not_counted() {
        let dir = tempdir().unwrap();
        let mut stats = RunStats::default();
        let eval = evaluate(
            &Message::default(),
            dir.path(),
            &AllowSet::everything(),
            &mut stats,
        )
        .await
        .unwrap();
        assert_eq!(eval, Evaluation::NoMedia);
        assert_eq!(stats, RunStats::default());
    }

    #[test]
    fn allow_set_matches_extension_case_insensitively() {
        let allow = AllowSet::kinds([]).with_extension(".JPG");
        assert!(allow.allows(MediaKind::Image, Path::new("a/b.jpg")));
        assert!(allow.allows(MediaKind::Document, Path::new("a/b.JPG")));
        assert!(!allow.allows(MediaKind::Image, Path::new("a/b.png")));
        assert!(!allow.allows(MediaKind::Poll, Path::new("a/7")));
    }
}
