//! meshvoice-relay: WebSocket signaling relay for voice meshes.
//!
//! Clients publish offers, answers and ICE candidates addressed to another
//! participant of a room and subscribe to the records addressed to
//! themselves. Records stay stored until the recipient deletes them, the
//! sender purges them, or the reaper finds them older than the TTL. The
//! relay never inspects signal payloads.

mod connection;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use meshvoice_common::{ConfigError, MeshvoiceError};
use meshvoice_config::MeshvoiceConfig;
use meshvoice_mesh::SignalStore;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;

const REAP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "meshvoice-relay", about = "WebSocket signaling relay for meshvoice")]
struct Args {
    /// Port to listen on. Defaults to `relay.listen_port` from the config.
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum age in seconds of an unconsumed signal record.
    #[arg(long)]
    record_ttl: Option<u64>,

    /// Config file to read instead of the platform default.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// An explicit `--config` file must load and validate. The platform
/// default falls back to built-in defaults.
fn load_config(path: Option<&PathBuf>) -> Result<MeshvoiceConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(meshvoice_config::load_config().unwrap_or_else(|e| {
            eprintln!("meshvoice-relay: {e}, using default config");
            MeshvoiceConfig::default()
        }));
    };
    let config = meshvoice_config::toml_loader::load_from_path(path)?;
    meshvoice_config::validation::validate(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), MeshvoiceError> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("meshvoice_relay={}", config.logging.level.as_directive()).into()
            }),
        )
        .init();

    let port = args.port.unwrap_or(config.relay.listen_port);
    let ttl = Duration::from_secs(args.record_ttl.unwrap_or(config.relay.record_ttl_secs));
    let store = SignalStore::new();

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(ttl_secs = ttl.as_secs(), "meshvoice-relay listening on {}", addr);

    // Spawn stale record reaper.
    let reaper_store = store.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(REAP_INTERVAL).await;
            let reaped = reaper_store.reap_older_than(ttl).await;
            let count = reaper_store.count().await;
            tracing::debug!(reaped, records = count, "Reaper tick");
        }
    });

    serve(listener, store).await;
    Ok(())
}

/// Accept loop: one task per WebSocket connection.
pub(crate) async fn serve(listener: TcpListener, store: SignalStore) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let store = store.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, store).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
