//! Rill CLI
//!
//! Streams one assistant turn to stdout, resuming an interrupted turn when
//! the local recovery cache holds one. Ctrl-C cancels the stream.

use anyhow::{Context, Result};
use clap::Parser;
use rill_chat_stream::{
    Anonymous, ChatMode, ClientConfig, CredentialProvider, FileStorage, RecoveryCache,
    StaticCredential, StreamError, StreamOptions, StreamOutcome, StreamSessionController,
    StreamSink,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "rill", version, about = "Stream assistant replies in the terminal")]
struct Args {
    /// Base URL of the assistant API
    #[arg(long, default_value = "http://127.0.0.1:8080/api/v1")]
    base_url: String,

    /// Conversation session id to stream
    #[arg(long)]
    session: String,

    /// Use the online backend pipeline instead of the local one
    #[arg(long)]
    online: bool,

    /// Directory for the recovery cache (defaults to the platform data dir)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Bearer credential; falls back to the RILL_TOKEN environment variable
    #[arg(long)]
    token: Option<String>,
}

struct StdoutSink;

impl StreamSink for StdoutSink {
    fn on_chunk(&self, text: &str) {
        let mut out = io::stdout();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn on_finish(&self) {
        println!();
    }

    fn on_error(&self, error: &StreamError) {
        log::error!("stream failed: {error}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let cache_dir = match args.cache_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .context("no platform data directory available")?
            .join("rill")
            .join("session-cache"),
    };

    let credentials: Arc<dyn CredentialProvider> =
        match args.token.or_else(|| std::env::var("RILL_TOKEN").ok()) {
            Some(token) => Arc::new(StaticCredential::new(token)),
            None => Arc::new(Anonymous),
        };

    let cache = RecoveryCache::new(Arc::new(FileStorage::new(cache_dir)));
    let controller =
        StreamSessionController::new(ClientConfig::new(args.base_url), credentials, cache);

    let mode = if args.online {
        ChatMode::Online
    } else {
        ChatMode::Local
    };
    let handle = controller.start(StreamOptions {
        session_id: args.session,
        mode,
        sink: Arc::new(StdoutSink),
    })?;

    let canceller = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    match handle.completion().await {
        Ok(StreamOutcome::Finished) => Ok(()),
        Ok(StreamOutcome::Cancelled) => {
            log::info!("stream cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
