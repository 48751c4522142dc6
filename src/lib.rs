//! # channel-archiver
//!
//! Resumable media archiver for messaging-platform channels.
//!
//! ## Design Philosophy
//!
//! channel-archiver is designed to be:
//! - **Resumable** - A per-channel cursor is persisted after every page
//! - **Network tolerant** - Transient failures are retried with capped backoff
//! - **Library-first** - The platform client is supplied by the embedding application
//! - **Flat-file state** - Cursor, ledger and session are small JSON files
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use channel_archiver::{BatchOrchestrator, ClientFactory, Config, SessionStore};
//! use tokio_util::sync::CancellationToken;
//!
//! # fn my_factory() -> Arc<dyn ClientFactory> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let session = SessionStore::load(&config.session_file)?;
//!     let mut batch = BatchOrchestrator::new(config, session, my_factory());
//!
//!     let channels = vec!["some_channel".to_string()];
//!     let report = batch.run(&channels, &CancellationToken::new()).await?;
//!     println!("{}", report.totals());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Per-channel archive loop
pub mod archiver;
/// Batch orchestration across channels
pub mod batch;
/// Channel list file parsing
pub mod channel_list;
/// Batch command front end
pub mod cli;
/// Protocol client contract
pub mod client;
/// Configuration types
pub mod config;
/// Pagination cursor persistence
pub mod cursor;
/// Error types
pub mod error;
/// Existence and freshness evaluation
pub mod freshness;
/// Per-channel progress ledger
pub mod ledger;
/// Media classification and path resolution
pub mod media;
mod persist;
/// Retry logic with exponential backoff
pub mod retry;
/// Bounded batch download scheduler
pub mod scheduler;
/// Credentials and session persistence
pub mod session;
/// Core types
pub mod types;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test_helpers;

// Re-export commonly used types
pub use archiver::ChannelArchiver;
pub use batch::{BatchOrchestrator, BatchReport, ChannelFailure, ChannelOutcome};
pub use client::{ClientFactory, ProtocolClient};
pub use config::{Config, ConnectionConfig, DownloadConfig, FetchConfig, RetryConfig};
pub use cursor::{CursorManager, CursorState, SelectionStore};
pub use error::{Error, Result};
pub use freshness::{AllowSet, Evaluation, Freshness};
pub use ledger::Ledger;
pub use media::{MediaDescriptor, MediaKind, classify};
pub use session::{Credentials, SessionStore};
pub use types::{
    ChannelHandle, ChannelId, Document, MediaPayload, Message, MessageId, MessageRecord,
    MessageStub, RunStats,
};
