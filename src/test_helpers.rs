//! Scripted in-memory protocol client shared by unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::{ClientFactory, ProtocolClient};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::session::Credentials;
use crate::types::{
    ChannelHandle, ChannelId, Document, MediaPayload, Message, MessageId, MessageStub,
};

/// Photo message with the given id and timestamp
pub(crate) fn photo_message(id: MessageId, date: i64) -> Message {
    Message {
        id,
        text: format!("message {id}"),
        date,
        media: Some(MediaPayload {
            photo: true,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Video document message with a declared file name
pub(crate) fn video_message(id: MessageId, date: i64, file_name: &str) -> Message {
    Message {
        id,
        date,
        media: Some(MediaPayload {
            document: Some(Document {
                mime_type: Some("video/mp4".to_string()),
                file_name: Some(file_name.to_string()),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Text-only message
pub(crate) fn text_message(id: MessageId, date: i64) -> Message {
    Message {
        id,
        text: format!("text {id}"),
        date,
        ..Default::default()
    }
}

/// In-memory client whose failures are scripted per call
#[derive(Default)]
pub(crate) struct MockClient {
    connected: AtomicBool,
    pub(crate) connects: AtomicU32,
    pub(crate) disconnects: AtomicU32,
    fail_connects: Mutex<VecDeque<Error>>,
    drop_connection_on_page_failure: AtomicBool,
    channels: Mutex<HashMap<String, ChannelHandle>>,
    messages: Mutex<HashMap<ChannelId, Vec<Message>>>,
    page_failures: Mutex<VecDeque<Error>>,
    download_failures: Mutex<HashMap<MessageId, VecDeque<Error>>>,
    download_attempts: Mutex<HashMap<MessageId, u32>>,
    downloaded: Mutex<Vec<MessageId>>,
    pub(crate) page_requests: Mutex<Vec<(ChannelId, MessageId)>>,
    download_delay: Duration,
    slow_downloads: Mutex<HashMap<MessageId, Duration>>,
    in_flight: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
}

impl MockClient {
    pub(crate) fn new() -> Self {
        let client = Self::default();
        client.connected.store(true, Ordering::SeqCst);
        client
    }

    pub(crate) fn disconnected() -> Self {
        Self::default()
    }

    pub(crate) fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = delay;
        self
    }

    pub(crate) fn with_channel(self, identifier: &str, id: i64, name: &str) -> Self {
        self.channels.lock().unwrap().insert(
            identifier.to_string(),
            ChannelHandle {
                id: ChannelId(id),
                display_name: name.to_string(),
            },
        );
        self
    }

    pub(crate) fn with_messages(self, channel: i64, mut messages: Vec<Message>) -> Self {
        messages.sort_by_key(|m| m.id);
        self.messages
            .lock()
            .unwrap()
            .insert(ChannelId(channel), messages);
        self
    }

    /// Drop the connection whenever a scripted page failure fires
    pub(crate) fn dropping_connection_on_failure(self) -> Self {
        self.drop_connection_on_page_failure
            .store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn fail_next_page(&self, error: Error) {
        self.page_failures.lock().unwrap().push_back(error);
    }

    pub(crate) fn fail_next_connect(&self, error: Error) {
        self.fail_connects.lock().unwrap().push_back(error);
    }

    /// Make transfers of `id` take `delay` instead of the shared delay
    pub(crate) fn slow_download(&self, id: MessageId, delay: Duration) {
        self.slow_downloads.lock().unwrap().insert(id, delay);
    }

    pub(crate) fn fail_download(&self, id: MessageId, error: Error) {
        self.download_failures
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push_back(error);
    }

    pub(crate) fn download_attempts(&self, id: MessageId) -> u32 {
        self.download_attempts
            .lock()
            .unwrap()
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn downloaded_ids(&self) -> Vec<MessageId> {
        self.downloaded.lock().unwrap().clone()
    }

    pub(crate) fn reset_in_flight(&self) {
        self.max_in_flight.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProtocolClient for MockClient {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.fail_connects.lock().unwrap().pop_front() {
            return Err(e);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn resolve_entity(&self, identifier: &str) -> Result<ChannelHandle> {
        if let Some(handle) = self.channels.lock().unwrap().get(identifier) {
            return Ok(handle.clone());
        }
        if let Ok(id) = identifier.parse::<ChannelId>() {
            return Ok(ChannelHandle {
                id,
                display_name: format!("channel {id}"),
            });
        }
        Err(Error::NotFound(identifier.to_string()))
    }

    async fn fetch_message_page(
        &self,
        channel: ChannelId,
        limit: usize,
        offset_id: MessageId,
    ) -> Result<Vec<MessageStub>> {
        self.page_requests
            .lock()
            .unwrap()
            .push((channel, offset_id));
        if let Some(e) = self.page_failures.lock().unwrap().pop_front() {
            if self.drop_connection_on_page_failure.load(Ordering::SeqCst) {
                self.connected.store(false, Ordering::SeqCst);
            }
            return Err(e);
        }
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .get(&channel)
            .map(|all| {
                all.iter()
                    .filter(|m| m.id > offset_id)
                    .take(limit)
                    .map(|m| MessageStub { id: m.id })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_message_details(
        &self,
        channel: ChannelId,
        ids: &[MessageId],
    ) -> Result<Vec<Message>> {
        let messages = self.messages.lock().unwrap();
        let all = messages.get(&channel).cloned().unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| all.iter().find(|m| m.id == *id).cloned())
            .collect())
    }

    async fn download_media(&self, message: &Message, destination: &Path) -> Result<()> {
        *self
            .download_attempts
            .lock()
            .unwrap()
            .entry(message.id)
            .or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self
            .slow_downloads
            .lock()
            .unwrap()
            .get(&message.id)
            .copied()
            .unwrap_or(self.download_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .download_failures
            .lock()
            .unwrap()
            .get_mut(&message.id)
            .and_then(VecDeque::pop_front);
        if let Some(e) = scripted {
            return Err(e);
        }

        std::fs::write(destination, format!("media {}", message.id))?;
        self.downloaded.lock().unwrap().push(message.id);
        Ok(())
    }

    fn session_token(&self) -> Option<String> {
        Some("mock-session".to_string())
    }
}

/// Factory handing out the same shared mock, counting creations
pub(crate) struct MockFactory {
    pub(crate) client: Arc<MockClient>,
    pub(crate) created: AtomicU32,
    create_failures: Mutex<VecDeque<Error>>,
}

impl MockFactory {
    pub(crate) fn new(client: Arc<MockClient>) -> Self {
        Self {
            client,
            created: AtomicU32::new(0),
            create_failures: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn failing_auth(self, message: &str) -> Self {
        self.fail_next_create(Error::Auth(message.to_string()));
        self
    }

    pub(crate) fn fail_next_create(&self, error: Error) {
        self.create_failures.lock().unwrap().push_back(error);
    }
}

#[async_trait]
impl ClientFactory for MockFactory {
    async fn create(
        &self,
        _credentials: &Credentials,
        _connection: &ConnectionConfig,
    ) -> Result<Arc<dyn ProtocolClient>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.create_failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        self.client.connected.store(true, Ordering::SeqCst);
        let client: Arc<dyn ProtocolClient> = self.client.clone();
        Ok(client)
    }
}
