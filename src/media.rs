//! Media classification and destination path resolution
//!
//! Classification is a pure function of the message, so a message always maps
//! to the same file on every run. Resume correctness depends on this: the file
//! on disk is the only record that an attachment was already fetched.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::{MediaPayload, Message};

/// Extensions accepted from a declared image file name
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// Media kind of an attachment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Photos and image documents
    Image,
    /// Videos and video documents
    Video,
    /// Audio and audio documents
    Audio,
    /// Generic document
    Document,
    /// Link preview
    Webpage,
    /// Poll
    Poll,
    /// Geographic point
    Geo,
    /// Shared contact
    Contact,
    /// Venue
    Venue,
    /// Sticker
    Sticker,
    /// Anything unrecognised
    Other,
}

impl MediaKind {
    /// All kinds, in classification priority order
    pub const ALL: [MediaKind; 11] = [
        MediaKind::Image,
        MediaKind::Video,
        MediaKind::Audio,
        MediaKind::Webpage,
        MediaKind::Poll,
        MediaKind::Geo,
        MediaKind::Contact,
        MediaKind::Venue,
        MediaKind::Sticker,
        MediaKind::Document,
        MediaKind::Other,
    ];

    /// Lowercase name, also used as the subfolder name
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Webpage => "webpage",
            MediaKind::Poll => "poll",
            MediaKind::Geo => "geo",
            MediaKind::Contact => "contact",
            MediaKind::Venue => "venue",
            MediaKind::Sticker => "sticker",
            MediaKind::Other => "other",
        }
    }

    /// Extension used when the declared file name has no acceptable one
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Video => ".mp4",
            MediaKind::Image => ".jpg",
            MediaKind::Document => ".doc",
            MediaKind::Audio => ".mp3",
            MediaKind::Webpage => ".html",
            _ => "",
        }
    }

    /// Whether a declared extension (lowercase, no dot) is kept for this kind
    fn accepts_extension(&self, ext: &str) -> bool {
        match self {
            MediaKind::Video => ext == "mp4",
            MediaKind::Audio => ext == "mp3",
            MediaKind::Image => IMAGE_EXTENSIONS.contains(&ext),
            _ => false,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        MediaKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| format!("unknown media kind: {s}"))
    }
}

/// Classify a payload; the first matching tag wins
pub fn classify(payload: &MediaPayload) -> MediaKind {
    if payload.photo {
        return MediaKind::Image;
    }
    if payload.video {
        return MediaKind::Video;
    }
    if payload.audio {
        return MediaKind::Audio;
    }
    if payload.webpage {
        return MediaKind::Webpage;
    }
    if payload.poll {
        return MediaKind::Poll;
    }
    if payload.geo {
        return MediaKind::Geo;
    }
    if payload.contact {
        return MediaKind::Contact;
    }
    if payload.venue {
        return MediaKind::Venue;
    }
    if payload.sticker {
        return MediaKind::Sticker;
    }
    if let Some(document) = &payload.document {
        if let Some(mime) = &document.mime_type {
            for kind in [
                MediaKind::Image,
                MediaKind::Video,
                MediaKind::Audio,
                MediaKind::Sticker,
            ] {
                if mime.contains(kind.as_str()) {
                    return kind;
                }
            }
        }
        return MediaKind::Document;
    }
    MediaKind::Other
}

/// Classification and naming decision for one attachment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaDescriptor {
    /// Media kind
    pub kind: MediaKind,
    /// Subfolder under the channel root
    pub subfolder: String,
    /// File name without extension
    pub file_name: String,
    /// Extension including the leading dot, or empty
    pub extension: String,
}

impl MediaDescriptor {
    /// Describe a message's attachment; `None` when the message has no media
    pub fn of(message: &Message) -> Option<Self> {
        let payload = message.media.as_ref()?;
        let kind = classify(payload);

        let declared = payload
            .document
            .as_ref()
            .and_then(|d| d.file_name.as_deref())
            .map(Path::new);

        let stem = declared
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty());

        let declared_ext = declared
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|e| kind.accepts_extension(e));

        let extension = match declared_ext {
            Some(ext) => format!(".{ext}"),
            None => kind.default_extension().to_string(),
        };

        Some(Self {
            kind,
            subfolder: kind.as_str().to_string(),
            file_name: stem.map_or_else(|| message.id.to_string(), str::to_string),
            extension,
        })
    }

    /// File name with extension
    pub fn full_name(&self) -> String {
        format!("{}{}", self.file_name, self.extension)
    }

    /// Absolute destination under a channel root
    pub fn path_in(&self, channel_root: &Path) -> PathBuf {
        channel_root.join(&self.subfolder).join(self.full_name())
    }
}

/// Create the destination's parent directory; existing directories are fine
pub async fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}
