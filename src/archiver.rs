//! Per-channel archive loop
//!
//! Pages are processed strictly in increasing id order. For each page the
//! archiver fetches details, evaluates every message, runs the approved
//! downloads through a [`DownloadScheduler`], appends the page to the
//! [`Ledger`] and only then advances the cursor. A page that fails with a
//! transient error is retried from the same offset after a backoff delay,
//! reconnecting first if the client reports it dropped. An empty page ends
//! the channel.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::client::ProtocolClient;
use crate::config::Config;
use crate::cursor::{CursorManager, SelectionStore};
use crate::error::{Error, Result};
use crate::freshness::{AllowSet, Evaluation, evaluate};
use crate::ledger::Ledger;
use crate::retry::{IsRetryable, download_with_retry, into_exhausted, pause, retry_delay};
use crate::scheduler::{DownloadScheduler, ScheduleSummary};
use crate::types::{ChannelHandle, MessageId, MessageRecord, RunStats};

/// Result of processing one page
#[derive(Debug)]
enum PageOutcome {
    /// Empty page; the channel is fully archived
    Exhausted,
    /// Page processed and the cursor moved to `last_id`
    Advanced {
        last_id: MessageId,
        stats: RunStats,
        summary: ScheduleSummary,
    },
}

/// Archives one channel at a time through a borrowed client
pub struct ChannelArchiver<'a> {
    client: &'a dyn ProtocolClient,
    config: &'a Config,
    allow: &'a AllowSet,
}

impl<'a> ChannelArchiver<'a> {
    /// Create an archiver over `client`
    pub fn new(client: &'a dyn ProtocolClient, config: &'a Config, allow: &'a AllowSet) -> Self {
        Self {
            client,
            config,
            allow,
        }
    }

    /// Output folder of a channel
    pub fn channel_root(&self, channel: &ChannelHandle) -> PathBuf {
        self.config.output_root.join(channel.id.to_string())
    }

    /// Archive `channel` until an empty page is returned
    ///
    /// Statistics start from zero on every call. Cancellation is honoured
    /// between pages, never during a download batch.
    ///
    /// # Errors
    ///
    /// [`Error::RetriesExhausted`] when a page keeps failing transiently,
    /// [`Error::Cancelled`] on shutdown, or the first permanent error.
    pub async fn archive(
        &self,
        channel: &ChannelHandle,
        cancel: &CancellationToken,
    ) -> Result<RunStats> {
        tracing::info!(
            channel_id = %channel.id,
            channel = %channel.display_name,
            "Archiving channel"
        );
        self.ensure_connected(channel).await?;

        let root = self.channel_root(channel);
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::file(&root, e))?;

        let mut cursor = CursorManager::open(
            SelectionStore::new(self.config.selection_path()),
            channel.id,
        )?;
        let ledger = Ledger::for_channel(&root);
        let retry = &self.config.retry;

        let mut stats = RunStats::default();
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                tracing::info!(channel_id = %channel.id, offset = cursor.offset(), "Archiving cancelled");
                return Err(Error::Cancelled);
            }

            match self.process_page(channel, &root, &ledger, &mut cursor).await {
                Ok(PageOutcome::Exhausted) => break,
                Ok(PageOutcome::Advanced {
                    last_id,
                    stats: page,
                    summary,
                }) => {
                    attempt = 0;
                    stats += page;
                    tracing::info!(
                        channel_id = %channel.id,
                        offset = last_id,
                        completed = summary.completed,
                        failed = summary.failed.len(),
                        "Page archived"
                    );
                    pause(self.config.fetch.page_delay, cancel).await?;
                }
                Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                    let delay = retry_delay(retry, attempt);
                    attempt += 1;
                    tracing::warn!(
                        channel_id = %channel.id,
                        offset = cursor.offset(),
                        attempt,
                        max_attempts = retry.max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Page failed, retrying"
                    );
                    pause(delay, cancel).await?;
                    self.reconnect_if_needed(channel).await;
                }
                Err(e) => {
                    tracing::error!(
                        channel_id = %channel.id,
                        offset = cursor.offset(),
                        attempts = attempt + 1,
                        error = %e,
                        "Page processing abandoned"
                    );
                    return Err(into_exhausted(
                        format!("channel {}", channel.id),
                        retry,
                        e,
                    ));
                }
            }
        }

        stats.log_summary(channel);
        Ok(stats)
    }

    async fn process_page(
        &self,
        channel: &ChannelHandle,
        root: &Path,
        ledger: &Ledger,
        cursor: &mut CursorManager,
    ) -> Result<PageOutcome> {
        let offset = cursor.offset();
        let stubs = self
            .client
            .fetch_message_page(channel.id, self.config.fetch.message_limit, offset)
            .await?;

        let Some(last_id) = stubs.iter().map(|s| s.id).max() else {
            tracing::info!(channel_id = %channel.id, offset, "No more messages");
            return Ok(PageOutcome::Exhausted);
        };
        if last_id <= offset {
            tracing::warn!(
                channel_id = %channel.id,
                offset,
                last_id,
                "Page did not move past the cursor, stopping"
            );
            return Ok(PageOutcome::Exhausted);
        }

        let ids: Vec<MessageId> = stubs.iter().map(|s| s.id).collect();
        let messages = self
            .client
            .fetch_message_details(channel.id, &ids)
            .await?;
        tracing::debug!(
            channel_id = %channel.id,
            offset,
            requested = ids.len(),
            received = messages.len(),
            "Fetched page"
        );

        let mut stats = RunStats::default();
        let mut scheduler = DownloadScheduler::new(
            self.client,
            &self.config.download,
            &self.config.download_retry,
        );
        let mut records = Vec::with_capacity(messages.len());

        for message in &messages {
            if let Evaluation::Fetch(task) = evaluate(message, root, self.allow, &mut stats).await? {
                scheduler.admit(task).await?;
            }
            records.push(MessageRecord::from_message(message, root));
        }
        let summary = scheduler.flush().await?;

        ledger.append(&records)?;
        cursor.advance(last_id)?;

        Ok(PageOutcome::Advanced {
            last_id,
            stats,
            summary,
        })
    }

    async fn ensure_connected(&self, channel: &ChannelHandle) -> Result<()> {
        if self.client.is_connected() {
            return Ok(());
        }
        tracing::info!(channel_id = %channel.id, "Client disconnected, connecting");
        download_with_retry(&self.config.retry, || self.client.connect())
            .await
            .map_err(|e| {
                tracing::error!(channel_id = %channel.id, error = %e, "Could not connect");
                into_exhausted(format!("connect for channel {}", channel.id), &self.config.retry, e)
            })
    }

    // Failure here is only logged; the client may heal on the next request
    async fn reconnect_if_needed(&self, channel: &ChannelHandle) {
        if self.client.is_connected() {
            return;
        }
        tracing::info!(channel_id = %channel.id, "Reconnecting before retry");
        if let Err(e) = self.client.connect().await {
            tracing::warn!(channel_id = %channel.id, error = %e, "Reconnect failed, retrying anyway");
        }
    }
}
