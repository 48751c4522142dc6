//! Per-channel progress ledger
//!
//! `<channel_root>/all_message.json` holds a JSON array with one entry per
//! processed page, each entry an array of [`MessageRecord`]s in fetch order.
//! Appending reads the whole array, pushes the page and rewrites the file
//! atomically, so each append costs O(ledger size). That is fine for the
//! channel sizes this tool targets; very large channels would want a
//! line-delimited log instead.

use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::media::MediaDescriptor;
use crate::persist::{read_json, write_json_atomic};
use crate::types::{Message, MessageRecord};

/// Ledger file name inside a channel's output folder
pub const LEDGER_FILE: &str = "all_message.json";

impl MessageRecord {
    /// Build the ledger record for a message archived under `channel_root`
    pub fn from_message(message: &Message, channel_root: &Path) -> Self {
        let descriptor = MediaDescriptor::of(message);
        Self {
            id: message.id,
            text: message.text.clone(),
            timestamp_seconds: message.date,
            outgoing: message.outgoing,
            sender_id: message.sender_id,
            has_media: message.has_media(),
            media_kind: descriptor.as_ref().map(|d| d.kind),
            media_path: descriptor.as_ref().map(|d| d.path_in(channel_root)),
            media_file_name: descriptor.as_ref().map(MediaDescriptor::full_name),
        }
    }
}

/// Append-only record of processed pages for one channel
#[derive(Clone, Debug)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Ledger stored in `channel_root`
    pub fn for_channel(channel_root: &Path) -> Self {
        Self {
            path: channel_root.join(LEDGER_FILE),
        }
    }

    /// Ledger file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one page of records as a single entry
    pub fn append(&self, page: &[MessageRecord]) -> Result<()> {
        let mut entries = match read_json::<Value>(&self.path)? {
            None => Vec::with_capacity(1),
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                return Err(Error::Other(format!(
                    "ledger {} does not hold a JSON array",
                    self.path.display()
                )));
            }
        };
        entries.push(serde_json::to_value(page)?);
        write_json_atomic(&self.path, &entries)?;
        tracing::debug!(
            path = %self.path.display(),
            records = page.len(),
            entries = entries.len(),
            "Ledger updated"
        );
        Ok(())
    }

    /// All recorded pages, oldest first
    pub fn entries(&self) -> Result<Vec<Vec<MessageRecord>>> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }
}
