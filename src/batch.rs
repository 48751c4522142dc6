//! Batch orchestrator
//!
//! Channels are processed one after another. All identifiers are resolved up
//! front; an identifier that cannot be resolved is recorded and skipped. Each
//! channel then gets its own retry loop: when archiving it fails with
//! exhausted or transient errors, the client is discarded and recreated
//! through the [`ClientFactory`] before the next attempt. A channel that keeps
//! failing is reported and the batch moves on. Only authentication failures
//! abort the whole batch.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::archiver::ChannelArchiver;
use crate::channel_list::is_numeric_identifier;
use crate::client::{ClientFactory, ProtocolClient};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::freshness::AllowSet;
use crate::retry::{IsRetryable, download_with_retry, into_exhausted, pause, retry_delay};
use crate::session::SessionStore;
use crate::types::{ChannelHandle, RunStats};

/// A channel archived to completion
#[derive(Clone, Debug)]
pub struct ChannelOutcome {
    /// The channel
    pub channel: ChannelHandle,
    /// Its statistics for this run
    pub stats: RunStats,
}

/// A channel abandoned after its retries
#[derive(Clone, Debug)]
pub struct ChannelFailure {
    /// The channel
    pub channel: ChannelHandle,
    /// Final error, rendered
    pub error: String,
    /// Attempts made, including the first
    pub attempts: u32,
}

/// What a batch run did
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    /// Channels archived to completion, in processing order
    pub completed: Vec<ChannelOutcome>,
    /// Channels abandoned after exhausting their retries
    pub failed: Vec<ChannelFailure>,
    /// Identifiers that could not be resolved
    pub unresolved: Vec<String>,
    /// Shutdown was requested before the batch finished
    pub cancelled: bool,
}

impl BatchReport {
    /// Statistics summed over all completed channels
    pub fn totals(&self) -> RunStats {
        let mut totals = RunStats::default();
        for outcome in &self.completed {
            totals += outcome.stats;
        }
        totals
    }

    /// Whether every identifier was resolved and archived
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.unresolved.is_empty() && !self.cancelled
    }

    fn log_summary(&self) {
        let totals = self.totals();
        tracing::info!(
            completed = self.completed.len(),
            failed = self.failed.len(),
            unresolved = self.unresolved.len(),
            cancelled = self.cancelled,
            total = totals.total_files,
            downloaded = totals.downloaded,
            updated = totals.updated,
            skipped = totals.skipped,
            "Batch finished"
        );
    }
}

/// Drives a list of channels through the archiver
pub struct BatchOrchestrator {
    config: Config,
    session: SessionStore,
    factory: Arc<dyn ClientFactory>,
    allow: AllowSet,
}

impl BatchOrchestrator {
    /// Create an orchestrator that downloads every attachment
    pub fn new(config: Config, session: SessionStore, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            config,
            session,
            factory,
            allow: AllowSet::everything(),
        }
    }

    /// Restrict which attachments are fetched
    pub fn with_allow_set(mut self, allow: AllowSet) -> Self {
        self.allow = allow;
        self
    }

    /// The session store, including any token recorded during the run
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Archive every channel in `identifiers`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when the platform rejects the credentials, and
    /// [`Error::RetriesExhausted`] when no client could be created after
    /// backing off. Every other failure is contained to its channel and shows
    /// up in the returned [`BatchReport`].
    pub async fn run(
        &mut self,
        identifiers: &[String],
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        tracing::info!(count = identifiers.len(), "Starting batch");
        let mut report = BatchReport::default();
        let mut client = self.create_client().await?;

        let result = self
            .run_with_client(&mut client, identifiers, cancel, &mut report)
            .await;

        if let Err(e) = client.disconnect().await {
            tracing::warn!(error = %e, "Disconnect failed");
        }

        result?;
        report.log_summary();
        Ok(report)
    }

    async fn run_with_client(
        &mut self,
        client: &mut Arc<dyn ProtocolClient>,
        identifiers: &[String],
        cancel: &CancellationToken,
        report: &mut BatchReport,
    ) -> Result<()> {
        let channels = match self.resolve_all(&**client, identifiers, cancel, report).await {
            Ok(channels) => channels,
            Err(Error::Cancelled) => {
                report.cancelled = true;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for channel in &channels {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.archive_channel(client, channel, cancel).await {
                Ok(stats) => report.completed.push(ChannelOutcome {
                    channel: channel.clone(),
                    stats,
                }),
                Err(ChannelError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(ChannelError::Fatal(e)) => return Err(e),
                Err(ChannelError::Abandoned { error, attempts }) => {
                    tracing::error!(
                        channel_id = %channel.id,
                        channel = %channel.display_name,
                        attempts,
                        error = %error,
                        "Channel abandoned, continuing with next"
                    );
                    report.failed.push(ChannelFailure {
                        channel: channel.clone(),
                        error: error.to_string(),
                        attempts,
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolve every identifier before any download starts
    async fn resolve_all(
        &self,
        client: &dyn ProtocolClient,
        identifiers: &[String],
        cancel: &CancellationToken,
        report: &mut BatchReport,
    ) -> Result<Vec<ChannelHandle>> {
        let mut channels = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match download_with_retry(&self.config.retry, || client.resolve_entity(identifier)).await
            {
                Ok(handle) => {
                    tracing::info!(
                        identifier = %identifier,
                        channel_id = %handle.id,
                        channel = %handle.display_name,
                        "Resolved channel"
                    );
                    channels.push(handle);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => match numeric_handle(identifier) {
                    // Numeric ids pass through when the client cannot describe them
                    Some(handle) => {
                        tracing::warn!(identifier = %identifier, error = %e, "Using numeric id as is");
                        channels.push(handle);
                    }
                    None => {
                        tracing::warn!(identifier = %identifier, error = %e, "Could not resolve channel, skipping");
                        report.unresolved.push(identifier.clone());
                    }
                },
            }
        }
        Ok(channels)
    }

    async fn archive_channel(
        &mut self,
        client: &mut Arc<dyn ProtocolClient>,
        channel: &ChannelHandle,
        cancel: &CancellationToken,
    ) -> std::result::Result<RunStats, ChannelError> {
        let retry = self.config.channel_retry.clone();
        let mut attempt = 0;

        loop {
            let archiver = ChannelArchiver::new(&**client, &self.config, &self.allow);
            let error = match archiver.archive(channel, cancel).await {
                Ok(stats) => return Ok(stats),
                Err(Error::Cancelled) => return Err(ChannelError::Cancelled),
                Err(e) if e.is_fatal() => return Err(ChannelError::Fatal(e)),
                Err(e) => e,
            };

            let recoverable = matches!(error, Error::RetriesExhausted { .. }) || error.is_retryable();
            if !recoverable || attempt >= retry.max_attempts {
                return Err(ChannelError::Abandoned {
                    error,
                    attempts: attempt + 1,
                });
            }

            let delay = retry_delay(&retry, attempt);
            attempt += 1;
            tracing::warn!(
                channel_id = %channel.id,
                attempt,
                max_attempts = retry.max_attempts,
                delay_ms = delay.as_millis(),
                error = %error,
                "Channel failed, recreating client and retrying"
            );
            if pause(delay, cancel).await.is_err() {
                return Err(ChannelError::Cancelled);
            }
            self.recreate_client(client).await.map_err(ChannelError::Fatal)?;
        }
    }

    /// Replace `client` with a fresh one; keeps the old one unless auth fails
    async fn recreate_client(&mut self, client: &mut Arc<dyn ProtocolClient>) -> Result<()> {
        if let Err(e) = client.disconnect().await {
            tracing::warn!(error = %e, "Disconnect of stale client failed");
        }
        match self.create_client().await {
            Ok(fresh) => {
                *client = fresh;
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Could not recreate client, keeping the previous one");
                Ok(())
            }
        }
    }

    /// Create a client, retrying transient failures with backoff
    async fn create_client(&mut self) -> Result<Arc<dyn ProtocolClient>> {
        let factory = &*self.factory;
        let credentials = self.session.credentials();
        let connection = &self.config.connection;
        let client = download_with_retry(&self.config.retry, || {
            factory.create(credentials, connection)
        })
        .await
        .map_err(|e| into_exhausted("client creation", &self.config.retry, e))
        .inspect_err(|e| tracing::error!(error = %e, "Could not create client"))?;

        if let Some(token) = client.session_token()
            && self.session.record_session(token)
            && let Err(e) = self.session.save()
        {
            tracing::warn!(
                path = %self.session.path().display(),
                error = %e,
                "Could not save session"
            );
        }
        Ok(client)
    }
}

/// How a channel's retry loop ended, when it did not succeed
enum ChannelError {
    Cancelled,
    Fatal(Error),
    Abandoned { error: Error, attempts: u32 },
}

fn numeric_handle(identifier: &str) -> Option<ChannelHandle> {
    if !is_numeric_identifier(identifier) {
        return None;
    }
    let id = identifier.parse().ok()?;
    Some(ChannelHandle {
        id,
        display_name: identifier.to_string(),
    })
}
