//! wearlink pair demo
//!
//! Runs a handheld and a wearable endpoint in one process over the
//! in-memory transport and walks through a connection check, a ping, a
//! message queued while the watch UI is closed, and a live message.
//!
//! Environment variables:
//! - WEARLINK_ATTEMPT_TIMEOUT_MS, WEARLINK_MAX_ATTEMPTS, WEARLINK_PING_BUDGET_MS,
//!   WEARLINK_PING_RESEND_MS, WEARLINK_CANDIDATES, WEARLINK_MAILBOX_KEY
//! - WEARLINK_MAILBOX_DIR: keep the watch mailbox on disk here
//! - RUST_LOG: log filter (default `info`)

use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wearlink::prelude::*;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run() -> LinkResult<()> {
    let config = LinkConfig::from_env()?;
    let network = MemoryNetwork::new();
    let (phone_link, watch_link) = network.pair();

    let phone = Endpoint::builder(Role::Handheld)
        .config(config.clone())
        .start(phone_link)?;

    let mut watch_builder = Endpoint::builder(Role::Wearable).config(config);
    if let Ok(dir) = std::env::var("WEARLINK_MAILBOX_DIR") {
        watch_builder = watch_builder.mailbox_dir(dir);
    }
    let watch = watch_builder.start(watch_link)?;

    let _logger = watch.subscribe(std::sync::Arc::new(|event: &LinkEvent| {
        if let LinkEvent::MessageReceived(message) = event {
            info!(from = %message.source_node_id, payload = %message.payload, "watch received");
        }
    }));

    let nodes = phone.refresh_nodes().await?;
    info!(count = nodes.len(), "phone sees nodes");

    let outcome = phone.check_connection_outcome().await?;
    info!(?outcome, "connection check");

    let ping = phone.ping().await?;
    info!(
        ack = ping.ack_received,
        rtt_ms = ping.round_trip_ms(),
        pings = ping.pings_sent,
        "ping"
    );

    phone.send_message("sent while the watch UI was closed").await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!(pending = watch.pending_count()?, "watch mailbox");

    let session = watch.attach_foreground()?;
    info!(drained = session.drained(), "watch UI opened");

    phone.send_message("sent while the watch UI is open").await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    drop(session);
    let state = watch.check_liveness().await?;
    info!(
        node_present = state.node_present,
        ack_received = state.ack_received,
        "watch liveness"
    );

    phone.shutdown()?;
    watch.shutdown()?;
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        error!(error = %e, "demo failed");
        std::process::exit(1);
    }
}
