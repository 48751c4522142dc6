//! Protocol client contract
//!
//! The archiving engine never talks to the platform directly. Connection
//! handling, authentication, entity resolution, page and detail fetches and
//! raw media transfer are provided by an implementation of [`ProtocolClient`],
//! created (and recreated during recovery) by a [`ClientFactory`].

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::session::Credentials;
use crate::types::{ChannelHandle, ChannelId, Message, MessageId, MessageStub};

/// Operations the archiver needs from a platform client
///
/// Failures should be reported as [`crate::Error::Network`] or
/// [`crate::Error::Timeout`] when transient, [`crate::Error::NotFound`] for
/// unresolvable identifiers and [`crate::Error::Auth`] when the session is
/// rejected. Anything else may use [`crate::Error::Client`]; its message is
/// inspected for `TIMEOUT`/`NETWORK`/`CONNECTION` markers.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Open the connection; a no-op when already connected
    async fn connect(&self) -> Result<()>;

    /// Close the connection; must not fail when already disconnected
    async fn disconnect(&self) -> Result<()>;

    /// Whether the connection is currently up
    fn is_connected(&self) -> bool;

    /// Resolve a username, link segment or numeric string to a channel
    async fn resolve_entity(&self, identifier: &str) -> Result<ChannelHandle>;

    /// Fetch up to `limit` message stubs following `offset_id`, in increasing id order
    ///
    /// An empty page means the channel is exhausted.
    async fn fetch_message_page(
        &self,
        channel: ChannelId,
        limit: usize,
        offset_id: MessageId,
    ) -> Result<Vec<MessageStub>>;

    /// Fetch full messages (including media payloads) for the given ids
    async fn fetch_message_details(
        &self,
        channel: ChannelId,
        ids: &[MessageId],
    ) -> Result<Vec<Message>>;

    /// Transfer a message's attachment to `destination`
    async fn download_media(&self, message: &Message, destination: &Path) -> Result<()>;

    /// Session token to persist after a fresh login, if any
    fn session_token(&self) -> Option<String> {
        None
    }
}

/// Creates authenticated clients
///
/// Called once at startup and again whenever recovery discards a client
/// whose connection state went stale.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Build and authenticate a new client
    ///
    /// Returns [`crate::Error::Auth`] when no authenticated session can be established.
    async fn create(
        &self,
        credentials: &Credentials,
        connection: &ConnectionConfig,
    ) -> Result<Arc<dyn ProtocolClient>>;
}
