//! Credentials and session persistence
//!
//! The credentials file is a flat JSON object. Updates are merged into the
//! existing object so keys written by other tools survive. Nothing is written
//! implicitly: callers mutate a [`SessionStore`] and call [`SessionStore::save`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::persist::merge_json_object;

/// API credentials and the saved session token
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Application id issued by the platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_id: Option<i64>,
    /// Application hash issued by the platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_hash: Option<String>,
    /// Serialized session from a previous login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Any other keys present in the file
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Credentials {
    /// Whether a saved session is available
    pub fn has_session(&self) -> bool {
        self.session_id.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Credentials bound to the file they were loaded from
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    credentials: Credentials,
}

impl SessionStore {
    /// Load credentials from `path`
    ///
    /// A missing file yields empty credentials; a malformed one is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let credentials = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Credentials::default(),
            Err(e) => return Err(Error::file(&path, e)),
        };
        Ok(Self { path, credentials })
    }

    /// The loaded credentials
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// File backing this store
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a session token obtained from a fresh login
    ///
    /// Returns true when the stored token changed.
    pub fn record_session(&mut self, token: String) -> bool {
        if self.credentials.session_id.as_deref() == Some(token.as_str()) {
            return false;
        }
        self.credentials.session_id = Some(token);
        true
    }

    /// Merge the in-memory credentials into the file on disk
    pub fn save(&self) -> Result<()> {
        merge_json_object(&self.path, &self.credentials)?;
        tracing::info!(path = %self.path.display(), "Session saved");
        Ok(())
    }
}
