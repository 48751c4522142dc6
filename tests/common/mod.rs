//! Common test utilities for channel-archiver integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use channel_archiver::{
    ChannelHandle, ChannelId, ClientFactory, Config, ConnectionConfig, Credentials, Document,
    Error, MediaPayload, Message, MessageId, MessageStub, ProtocolClient, Result,
};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Timestamp used for every fixture message
pub const POSTED_AT: i64 = 1_700_000_000;

/// Config rooted in `dir` with pauses removed and short retry loops
pub fn fast_config(dir: &TempDir) -> Config {
    let mut config = Config {
        output_root: dir.path().join("export"),
        session_file: dir.path().join("config.json"),
        ..Config::default()
    };
    config.fetch.message_limit = 3;
    config.fetch.page_delay = Duration::ZERO;
    config.download.cool_down = Duration::ZERO;
    config.retry.max_attempts = 2;
    config.channel_retry.max_attempts = 1;
    config
}

/// A channel whose odd ids carry photos and even ids carry named documents
pub fn mixed_messages(count: i64) -> Vec<Message> {
    (1..=count)
        .map(|id| {
            let media = if id % 2 == 1 {
                MediaPayload {
                    photo: true,
                    ..Default::default()
                }
            } else {
                MediaPayload {
                    document: Some(Document {
                        mime_type: Some("application/pdf".to_string()),
                        file_name: Some(format!("report-{id}.pdf")),
                    }),
                    ..Default::default()
                }
            };
            Message {
                id,
                text: format!("post {id}"),
                date: POSTED_AT,
                media: Some(media),
                ..Default::default()
            }
        })
        .collect()
}

/// In-memory platform with scripted failures
#[derive(Default)]
pub struct FakeClient {
    connected: AtomicBool,
    channels: Mutex<HashMap<String, ChannelHandle>>,
    messages: Mutex<HashMap<ChannelId, Vec<Message>>>,
    page_failures: Mutex<VecDeque<Error>>,
    /// Stop serving pages after this many successful page calls
    page_budget: Mutex<Option<usize>>,
    pub transfers: AtomicU32,
    pub page_calls: AtomicU32,
}

impl FakeClient {
    pub fn new() -> Self {
        let client = Self::default();
        client.connected.store(true, Ordering::SeqCst);
        client
    }

    pub fn add_channel(&self, username: &str, id: i64, name: &str, messages: Vec<Message>) {
        self.channels.lock().unwrap().insert(
            username.to_string(),
            ChannelHandle {
                id: ChannelId(id),
                display_name: name.to_string(),
            },
        );
        self.messages.lock().unwrap().insert(ChannelId(id), messages);
    }

    pub fn fail_pages(&self, count: usize, error: impl Fn() -> Error) {
        let mut failures = self.page_failures.lock().unwrap();
        for _ in 0..count {
            failures.push_back(error());
        }
    }

    /// Fail every page request with a permanent error once `pages` have been served
    pub fn crash_after_pages(&self, pages: usize) {
        *self.page_budget.lock().unwrap() = Some(pages);
    }

    pub fn heal(&self) {
        *self.page_budget.lock().unwrap() = None;
    }
}

#[async_trait]
impl ProtocolClient for FakeClient {
    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn resolve_entity(&self, identifier: &str) -> Result<ChannelHandle> {
        self.channels
            .lock()
            .unwrap()
            .get(identifier)
            .cloned()
            .ok_or_else(|| Error::NotFound(identifier.to_string()))
    }

    async fn fetch_message_page(
        &self,
        channel: ChannelId,
        limit: usize,
        offset_id: MessageId,
    ) -> Result<Vec<MessageStub>> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.page_failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        {
            let mut budget = self.page_budget.lock().unwrap();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(Error::Client("PROCESS_KILLED".to_string()));
                }
                *remaining -= 1;
            }
        }
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .get(&channel)
            .into_iter()
            .flatten()
            .filter(|m| m.id > offset_id)
            .take(limit)
            .map(|m| MessageStub { id: m.id })
            .collect())
    }

    async fn fetch_message_details(
        &self,
        channel: ChannelId,
        ids: &[MessageId],
    ) -> Result<Vec<Message>> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .get(&channel)
            .into_iter()
            .flatten()
            .filter(|m| ids.contains(&m.id))
            .cloned()
            .collect())
    }

    async fn download_media(&self, message: &Message, destination: &Path) -> Result<()> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(destination, format!("payload of {}", message.id)).await?;
        Ok(())
    }

    fn session_token(&self) -> Option<String> {
        Some("fake-session".to_string())
    }
}

/// Factory that always hands out the same fake
pub struct FakeFactory {
    pub client: Arc<FakeClient>,
    pub created: AtomicU32,
}

impl FakeFactory {
    pub fn new(client: Arc<FakeClient>) -> Arc<Self> {
        Arc::new(Self {
            client,
            created: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ClientFactory for FakeFactory {
    async fn create(
        &self,
        _credentials: &Credentials,
        _connection: &ConnectionConfig,
    ) -> Result<Arc<dyn ProtocolClient>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.client.connect().await?;
        let client: Arc<dyn ProtocolClient> = self.client.clone();
        Ok(client)
    }
}
