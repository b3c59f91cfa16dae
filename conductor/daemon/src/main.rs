//! streamctl - Command-Line Front End for the Stream Conductor
//!
//! Drives the conductor's caller-facing operations against the configured
//! store. With a Redis URL, separate invocations act as separate processes
//! sharing one store: one terminal can `chat` while another `watch`es or
//! `cancel`s the same session.
//!
//! # Usage
//!
//! ```bash
//! # Ask a question and stream the canned answer to stdout
//! streamctl --store-url redis://localhost:6379 chat demo "how does streaming work?"
//!
//! # Follow a session (history first, then live messages as JSON lines)
//! streamctl --store-url redis://localhost:6379 watch demo
//!
//! # Cancel a running response
//! streamctl --store-url redis://localhost:6379 cancel demo <message-id>
//!
//! # Verbose logging
//! RUST_LOG=stream_conductor=debug streamctl chat demo "hello"
//! ```
//!
//! # Signals
//!
//! - `SIGINT`: graceful shutdown; running streams finish as cancelled

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stream_conductor::{load_config_from_path, ConductorConfig, ConfigOverrides};

/// Stream Conductor - store-coordinated chat response streaming
#[derive(Parser, Debug)]
#[command(name = "streamctl")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CONDUCTOR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Store URL (`redis://...`); the in-memory store is used when unset
    #[arg(long, value_name = "URL")]
    store_url: Option<String>,

    /// Key namespace prefix
    #[arg(long, value_name = "PREFIX")]
    key_prefix: Option<String>,

    /// Pause after each streamed unit, in milliseconds
    #[arg(long, value_name = "MS")]
    chunk_interval_ms: Option<u64>,

    /// Units between cancellation checks
    #[arg(long, value_name = "N")]
    cancel_check_interval: Option<u32>,

    /// Log level when `RUST_LOG` is unset (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CONDUCTOR_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// How long to wait for running streams on shutdown, in seconds
    #[arg(long, default_value_t = 5)]
    shutdown_timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

/// Response generator used by `chat`
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum GeneratorKind {
    /// Keyword-selected demo answers
    Canned,
    /// Echo the message back word by word
    Words,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a user message and stream a response to stdout
    Chat {
        /// Session ID
        session: String,
        /// Message text
        message: String,
        /// User ID
        #[arg(short, long)]
        user: Option<String>,
        /// Response generator
        #[arg(short, long, value_enum, default_value_t = GeneratorKind::Canned)]
        generator: GeneratorKind,
        /// Print every emission as a JSON line instead of plain text
        #[arg(long)]
        json: bool,
    },
    /// Ask a running response to stop
    Cancel {
        /// Session ID
        session: String,
        /// Message ID of the response
        message_id: String,
    },
    /// Print a session's history as JSON lines
    History {
        /// Session ID
        session: String,
    },
    /// Delete a session's history
    Clear {
        /// Session ID
        session: String,
    },
    /// Print a session's history, then follow it live
    Watch {
        /// Session ID
        session: String,
    },
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            store_url: self.store_url.clone(),
            key_prefix: self.key_prefix.clone(),
            chunk_interval_ms: self.chunk_interval_ms,
            cancel_check_interval: self.cancel_check_interval,
        }
    }

    fn load_config(&self) -> Result<ConductorConfig> {
        let path = self
            .config
            .clone()
            .or_else(stream_conductor::default_config_path);
        let mut config = load_config_from_path(path).context("Failed to load configuration")?;
        self.overrides().apply(&mut config);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(format!(
            "stream_conductor={level},stream_conductor_daemon={level},streamctl={level}"
        )),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = args.load_config()?;
    info!(
        source = %config.source(),
        store = config.store_url.as_deref().unwrap_or("memory://"),
        prefix = config.key_prefix.as_str(),
        "Configuration loaded"
    );
    let shutdown_timeout = Duration::from_secs(args.shutdown_timeout_secs);

    match args.command {
        Command::Chat {
            session,
            message,
            user,
            generator,
            json,
        } => {
            commands::chat(
                &config,
                commands::ChatRequest {
                    session,
                    message,
                    user,
                    generator,
                    json,
                },
                shutdown_timeout,
            )
            .await
        }
        Command::Cancel {
            session,
            message_id,
        } => commands::cancel(&config, &session, &message_id).await,
        Command::History { session } => commands::history(&config, &session).await,
        Command::Clear { session } => commands::clear(&config, &session).await,
        Command::Watch { session } => commands::watch(&config, &session).await,
    }
}
