//! Coedit Daemon Binary
//!
//! A WebSocket server for real-time collaborative editing: authenticated
//! room admission, live file-tree sync, chat, and the AI assistant.
//!
//! # Usage
//!
//! ```bash
//! coedit-daemon --port 3001 --seed projects.json
//! coedit-daemon --port 3001 --host 127.0.0.1
//! ```
//!
//! `JWT_SECRET` and `GOOGLE_AI_KEY` come from the environment (or the
//! matching flags). The bundled store is in-memory and seeded from
//! `--seed`; a deployment wires its own `ProjectStore` implementation
//! through the library instead.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use coedit_engine::generate::{GeminiGenerator, DEFAULT_MODEL};
use coedit_engine::session::SessionVerifier;
use coedit_engine::store::{MemoryStore, Project};
use coedit_engine::sync_server::{handle_connection, ServerContext, SyncConfig};

/// Coedit Sync Server Daemon
#[derive(Parser, Debug)]
#[command(name = "coedit-daemon")]
#[command(about = "Real-time collaboration daemon for coedit projects")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3001")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Secret the user service signs session tokens with
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// API key for the assistant's generation model
    #[arg(long, env = "GOOGLE_AI_KEY", hide_env_values = true)]
    google_ai_key: String,

    /// Generation model name
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Bound on a single generation call, in seconds
    #[arg(long, default_value = "30")]
    generation_timeout: u64,

    /// Debounce before an assistant-triggered checkpoint, in milliseconds
    #[arg(long, default_value = "2000")]
    checkpoint_delay: u64,

    /// Seed the in-memory store from a JSON array of project records
    #[arg(long)]
    seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("coedit_engine=info".parse()?)
                .add_directive("coedit_daemon=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let store = Arc::new(MemoryStore::new());
    if let Some(path) = &args.seed {
        let raw = std::fs::read_to_string(path)?;
        let projects: Vec<Project> = serde_json::from_str(&raw)?;
        tracing::info!("Seeded {} project(s) from {}", projects.len(), path.display());
        for project in projects {
            store.insert(project);
        }
    }

    let ctx = Arc::new(ServerContext::new(
        store,
        SessionVerifier::new(&args.jwt_secret),
        Arc::new(GeminiGenerator::new(&args.google_ai_key, &args.model)),
        SyncConfig {
            generation_timeout: Duration::from_secs(args.generation_timeout),
            checkpoint_delay: Duration::from_millis(args.checkpoint_delay),
        },
    ));

    // Start the TCP listener
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Coedit daemon listening on ws://{}", addr);

    // Accept connections
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!("Accepted connection from {}", peer);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    handle_connection(stream, ctx).await;
                });
            }
            Err(e) => {
                tracing::error!("Failed to accept connection: {}", e);
            }
        }
    }
}
