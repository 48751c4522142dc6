//! Pagination cursor and its persisted selection state
//!
//! The selection file holds `{channelId, messageOffsetId}` and is merged, never
//! replaced, on update. A cursor resumes from the stored offset only when the
//! stored channel is the one being archived; otherwise it starts fresh at 0.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::persist::{merge_json_object, read_json};
use crate::types::{ChannelId, MessageId};

/// Persisted form of the active cursor
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    /// Channel the offset belongs to
    #[serde(
        default,
        deserialize_with = "lenient_channel_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub channel_id: Option<ChannelId>,
    /// Id of the last message processed
    #[serde(default)]
    pub message_offset_id: MessageId,
}

// Older files store the channel id as a string
fn lenient_channel_id<'de, D>(deserializer: D) -> std::result::Result<Option<ChannelId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Some(ChannelId(n)),
        Some(Raw::Text(s)) => s.parse().ok(),
        None => None,
    })
}

/// File-backed selection state
#[derive(Clone, Debug)]
pub struct SelectionStore {
    path: PathBuf,
}

impl SelectionStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored selection; a missing file reads as empty
    pub fn load(&self) -> Result<Selection> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    /// Merge `selection` into the stored file
    pub fn save(&self, selection: &Selection) -> Result<()> {
        merge_json_object(&self.path, selection)?;
        Ok(())
    }
}

/// Whether a cursor picked up a previous run's position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorState {
    /// No usable stored position; offset starts at 0
    Fresh,
    /// Continuing from the stored offset of the same channel
    Resuming,
}

/// Tracks and persists the last processed message id of one channel
#[derive(Debug)]
pub struct CursorManager {
    store: SelectionStore,
    channel: ChannelId,
    offset: MessageId,
    state: CursorState,
}

impl CursorManager {
    /// Open the cursor for `channel`, resetting it if the stored one is for another channel
    ///
    /// The resulting `{channelId, messageOffsetId}` is written back immediately.
    pub fn open(store: SelectionStore, channel: ChannelId) -> Result<Self> {
        let stored = store.load()?;
        let (offset, state) = match stored.channel_id {
            Some(id) if id == channel => (stored.message_offset_id.max(0), CursorState::Resuming),
            _ => (0, CursorState::Fresh),
        };

        store.save(&Selection {
            channel_id: Some(channel),
            message_offset_id: offset,
        })?;

        tracing::info!(
            channel_id = %channel,
            offset,
            ?state,
            "Cursor opened"
        );
        Ok(Self {
            store,
            channel,
            offset,
            state,
        })
    }

    /// Offset to request the next page from
    pub fn offset(&self) -> MessageId {
        self.offset
    }

    /// How the cursor was opened
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Channel this cursor belongs to
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Move past a completed page whose last message id is `last_id`
    ///
    /// The cursor never moves backwards; a non-increasing id is ignored.
    pub fn advance(&mut self, last_id: MessageId) -> Result<()> {
        if last_id <= self.offset {
            tracing::warn!(
                channel_id = %self.channel,
                offset = self.offset,
                last_id,
                "Ignoring non-increasing cursor position"
            );
            return Ok(());
        }
        self.store.save(&Selection {
            channel_id: Some(self.channel),
            message_offset_id: last_id,
        })?;
        self.offset = last_id;
        self.state = CursorState::Resuming;
        Ok(())
    }
}
