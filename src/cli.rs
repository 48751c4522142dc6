//! Batch command front end
//!
//! The crate does not ship a protocol client, so there is no standalone
//! binary. An application that provides a [`ClientFactory`] gets the whole
//! command by calling [`run`] from its `main`:
//!
//! ```no_run
//! use std::sync::Arc;
//! use channel_archiver::client::ClientFactory;
//!
//! # fn my_factory() -> Arc<dyn ClientFactory> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     channel_archiver::cli::run(std::env::args_os(), my_factory()).await
//! }
//! ```

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::error::ErrorKind;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::batch::BatchOrchestrator;
use crate::channel_list::read_channel_list;
use crate::client::ClientFactory;
use crate::config::Config;
use crate::error::Result;
use crate::session::SessionStore;

/// Exit status for a missing argument or an unrecoverable error
pub const EXIT_FAILURE: u8 = 1;

/// Arguments of the batch command
#[derive(Debug, Parser)]
#[command(
    name = "batch-archive",
    version,
    about = "Archive the media of every channel listed in a file"
)]
pub struct BatchArgs {
    /// File with one channel identifier or link per line
    pub channels_file: PathBuf,

    /// JSON configuration file; defaults apply when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Root of the archive tree, overriding the configuration
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parse `args`, run the batch and map the outcome to an exit code
pub async fn run<I, T>(args: I, factory: Arc<dyn ClientFactory>) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    ExitCode::from(run_status(args, factory).await)
}

async fn run_status<I, T>(args: I, factory: Arc<dyn ClientFactory>) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = match BatchArgs::try_parse_from(args) {
        Ok(args) => args,
        Err(e) => {
            // printing help or version is a normal exit
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => EXIT_FAILURE,
            };
        }
    };

    init_logging(args.verbose);

    match run_batch(args, factory).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "Batch archive failed");
            EXIT_FAILURE
        }
    }
}

/// Run the batch described by parsed arguments
///
/// SIGINT/SIGTERM stop the batch at the next page or channel boundary.
pub async fn run_batch(args: BatchArgs, factory: Arc<dyn ClientFactory>) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(output) = args.output {
        config.output_root = output;
    }
    config.validate()?;

    let identifiers = read_channel_list(&args.channels_file)?;
    let session = SessionStore::load(&config.session_file)?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    let watcher = tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown requested, stopping at the next boundary");
        signal_cancel.cancel();
    });

    let mut orchestrator = BatchOrchestrator::new(config, session, factory);
    let result = orchestrator.run(&identifiers, &cancel).await;
    watcher.abort();

    let report = result?;
    for failure in &report.failed {
        tracing::warn!(
            channel_id = %failure.channel.id,
            channel = %failure.channel.display_name,
            attempts = failure.attempts,
            error = %failure.error,
            "Channel was not archived"
        );
    }
    for identifier in &report.unresolved {
        tracing::warn!(identifier = %identifier, "Channel was not resolved");
    }
    Ok(())
}

/// Install the fmt subscriber; `RUST_LOG` wins over `verbose`
///
/// Does nothing when a global subscriber is already set.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
