//! Bounded batch download scheduler
//!
//! Tasks are admitted into a working batch. When the batch holds
//! `max_parallel` tasks it is run to completion as a join barrier, followed by
//! a cool-down pause, before any further task is admitted. A partial batch is
//! flushed at the end of each page. Width is fixed; there is no work stealing.

use std::path::PathBuf;
use std::time::Duration;

use futures::future::join_all;

use crate::client::ProtocolClient;
use crate::config::{DownloadConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::media::ensure_parent_dir;
use crate::retry::{IsRetryable, retry_delay};
use crate::types::{Message, MessageId};

/// One approved transfer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadTask {
    /// Message whose attachment is fetched
    pub message: Message,
    /// Destination file
    pub target: PathBuf,
}

/// A task that failed with a non-retryable error
#[derive(Debug)]
pub struct TaskFailure {
    /// Message whose transfer failed
    pub message_id: MessageId,
    /// Intended destination
    pub target: PathBuf,
    /// Why it failed
    pub error: Error,
}

/// Totals for everything the scheduler ran
#[derive(Debug, Default)]
pub struct ScheduleSummary {
    /// Transfers that completed
    pub completed: usize,
    /// Transfers dropped after a permanent failure
    pub failed: Vec<TaskFailure>,
    /// Batches executed
    pub batches: usize,
}

/// Admission-controlled batch runner for one page
pub struct DownloadScheduler<'a> {
    client: &'a dyn ProtocolClient,
    config: &'a DownloadConfig,
    retry: &'a RetryConfig,
    pending: Vec<DownloadTask>,
    summary: ScheduleSummary,
}

impl<'a> DownloadScheduler<'a> {
    /// Create a scheduler; `retry` governs re-running failed tasks of a batch
    pub fn new(
        client: &'a dyn ProtocolClient,
        config: &'a DownloadConfig,
        retry: &'a RetryConfig,
    ) -> Self {
        let width = config.max_parallel.max(1);
        Self {
            client,
            config,
            retry,
            pending: Vec::with_capacity(width),
            summary: ScheduleSummary::default(),
        }
    }

    fn width(&self) -> usize {
        self.config.max_parallel.max(1)
    }

    /// Admit a task; runs the batch once it is full
    ///
    /// Returns a transient error when a batch still has failing tasks after
    /// the batch-level retries.
    pub async fn admit(&mut self, task: DownloadTask) -> Result<()> {
        tracing::info!(message_id = task.message.id, "Queued download");
        self.pending.push(task);
        if self.pending.len() >= self.width() {
            let batch = std::mem::take(&mut self.pending);
            tracing::info!(count = batch.len(), "Processing downloads");
            self.run_batch(batch).await?;
            pause(self.config.cool_down).await;
        }
        Ok(())
    }

    /// Run any partial batch and return the totals
    pub async fn flush(mut self) -> Result<ScheduleSummary> {
        if !self.pending.is_empty() {
            let batch = std::mem::take(&mut self.pending);
            tracing::info!(count = batch.len(), "Processing remaining downloads");
            self.run_batch(batch).await?;
        }
        Ok(self.summary)
    }

    async fn run_batch(&mut self, batch: Vec<DownloadTask>) -> Result<()> {
        self.summary.batches += 1;
        let mut remaining = batch;
        let mut attempt = 0;

        loop {
            let client = self.client;
            // every transfer in the batch shares one deadline; finished ones keep their result
            let deadline = tokio::time::Instant::now() + self.config.batch_timeout;
            let timeout_secs = self.config.batch_timeout.as_secs();
            let results = join_all(remaining.iter().map(|task| async move {
                match tokio::time::timeout_at(deadline, transfer(client, task)).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(
                            message_id = task.message.id,
                            timeout_secs,
                            "Transfer hit the batch deadline"
                        );
                        Err(Error::Timeout)
                    }
                }
            }))
            .await;

            let mut retry_later = Vec::new();
            let mut last_error = None;
            for (task, result) in remaining.into_iter().zip(results) {
                match result {
                    Ok(()) => self.summary.completed += 1,
                    Err(e) if e.is_retryable() => {
                        tracing::warn!(
                            message_id = task.message.id,
                            error = %e,
                            "Transfer failed"
                        );
                        last_error = Some(e);
                        retry_later.push(task);
                    }
                    Err(e) => {
                        tracing::error!(
                            message_id = task.message.id,
                            target = %task.target.display(),
                            error = %e,
                            "Transfer failed permanently, skipping"
                        );
                        self.summary.failed.push(TaskFailure {
                            message_id: task.message.id,
                            target: task.target,
                            error: e,
                        });
                    }
                }
            }

            let Some(error) = last_error else {
                return Ok(());
            };
            if attempt >= self.retry.max_attempts {
                tracing::error!(
                    failed = retry_later.len(),
                    attempts = attempt + 1,
                    error = %error,
                    "Download batch still failing after retries"
                );
                return Err(error);
            }

            let delay = retry_delay(self.retry, attempt);
            attempt += 1;
            tracing::warn!(
                failed = retry_later.len(),
                attempt,
                max_attempts = self.retry.max_attempts,
                delay_ms = delay.as_millis(),
                "Retrying failed transfers"
            );
            tokio::time::sleep(delay).await;
            remaining = retry_later;
        }
    }
}

async fn transfer(client: &dyn ProtocolClient, task: &DownloadTask) -> Result<()> {
    ensure_parent_dir(&task.target)
        .await
        .map_err(|e| Error::file(&task.target, e))?;
    tracing::debug!(
        message_id = task.message.id,
        target = %task.target.display(),
        "Downloading"
    );
    client.download_media(&task.message, &task.target).await
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
