//! Core types for channel-archiver

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::media::MediaKind;

/// Numeric identifier of a channel on the platform
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

impl ChannelId {
    /// Create a new ChannelId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ChannelId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<ChannelId> for i64 {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChannelId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Message identifier, unique and increasing within a channel
pub type MessageId = i64;

/// A channel resolved once per run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelHandle {
    /// Numeric channel id
    pub id: ChannelId,
    /// Human-readable channel name
    pub display_name: String,
}

/// Lightweight page entry returned by a page fetch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageStub {
    /// Message id
    pub id: MessageId,
}

/// Full message as returned by a detail fetch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    /// Message id
    pub id: MessageId,
    /// Message text (may be empty)
    pub text: String,
    /// Posting or last-edit time, seconds since the Unix epoch
    pub date: i64,
    /// Sent by the archiving account
    pub outgoing: bool,
    /// Sending user, when known
    pub sender_id: Option<i64>,
    /// Attached media, if any
    pub media: Option<MediaPayload>,
}

impl Message {
    /// Whether the message carries any attachment
    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }
}

/// Raw media payload tags; several may be set at once
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaPayload {
    /// Photo attachment
    pub photo: bool,
    /// Native video attachment
    pub video: bool,
    /// Native audio attachment
    pub audio: bool,
    /// Link preview
    pub webpage: bool,
    /// Poll
    pub poll: bool,
    /// Geographic point
    pub geo: bool,
    /// Shared contact
    pub contact: bool,
    /// Venue
    pub venue: bool,
    /// Sticker
    pub sticker: bool,
    /// Generic document, refined by MIME type
    pub document: Option<Document>,
}

/// Document attachment details
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Document {
    /// Declared MIME type
    pub mime_type: Option<String>,
    /// Sender-declared file name, including extension
    pub file_name: Option<String>,
}

/// One processed message as written to the ledger
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Message id
    pub id: MessageId,
    /// Message text
    pub text: String,
    /// Message time, seconds since the Unix epoch
    pub timestamp_seconds: i64,
    /// Sent by the archiving account
    pub outgoing: bool,
    /// Sending user, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<i64>,
    /// Whether the message had media
    pub has_media: bool,
    /// Classified media kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_kind: Option<MediaKind>,
    /// Resolved destination path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_path: Option<PathBuf>,
    /// Destination file name (with extension)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_file_name: Option<String>,
}

/// Per-channel counters, reset at the start of each channel run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Messages with media that were evaluated
    pub total_files: u64,
    /// New files downloaded
    pub downloaded: u64,
    /// Existing files downloaded again (empty or stale)
    pub updated: u64,
    /// Files left alone (up to date or not allowed)
    pub skipped: u64,
}

impl RunStats {
    /// Emit the end-of-channel summary
    pub fn log_summary(&self, channel: &ChannelHandle) {
        tracing::info!(
            channel_id = %channel.id,
            channel = %channel.display_name,
            total = self.total_files,
            downloaded = self.downloaded,
            updated = self.updated,
            skipped = self.skipped,
            "Channel archive completed"
        );
    }
}

impl std::ops::AddAssign for RunStats {
    fn add_assign(&mut self, other: Self) {
        self.total_files += other.total_files;
        self.downloaded += other.downloaded;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} files: {} downloaded, {} updated, {} skipped",
            self.total_files, self.downloaded, self.updated, self.skipped
        )
    }
}
