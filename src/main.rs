//! netconf-mirror - Mirrored Network Configuration Store
//!
//! Composition root: builds the mirror set from environment settings and
//! runs it until the process is asked to stop.

use netconf_mirror::adapters::outbound::{
    ChannelChangeListener, InMemoryStore, MirrorEvent, SqliteStore,
};
use netconf_mirror::config::load_config;
use netconf_mirror::infrastructure::{shutdown_signal, ShutdownController};
use netconf_mirror::mirror::MirrorSetBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting netconf-mirror stores={} reconcile={}s",
        cfg.store_count(),
        cfg.reconcile_secs
    );

    // ===== COMPOSITION ROOT =====

    // 1. Listener and mirror set
    let (listener, events) = ChannelChangeListener::new();
    let mut builder = MirrorSetBuilder::new(Arc::new(listener)).config(cfg.mirror_config());

    // 2. Backing stores, in priority order
    if let Some(path) = &cfg.sqlite_path {
        let store = SqliteStore::open(path, builder.notifier())?;
        builder = builder.store(Arc::new(store));
    }
    for _ in 0..cfg.memory_stores {
        let store = InMemoryStore::new(builder.notifier());
        builder = builder.store(Arc::new(store));
    }

    let mut mirror = builder.build()?;

    let loaded = tokio::task::block_in_place(|| mirror.wait_until_ready());
    tracing::info!(
        "mirror set ready: {} stores, {} networks (initial load: {})",
        mirror.store_count(),
        mirror.network_ids().len(),
        loaded
    );

    // 3. Event consumer
    let shutdown = ShutdownController::new();
    tokio::spawn(log_events(events, shutdown.clone()));

    // 4. Run until signalled
    shutdown_signal(shutdown.clone()).await;

    mirror.shutdown();
    shutdown.wait_for_drain(Duration::from_secs(5)).await;
    tracing::info!("netconf-mirror stopped");
    Ok(())
}

async fn log_events(mut events: mpsc::UnboundedReceiver<MirrorEvent>, shutdown: ShutdownController) {
    let _guard = shutdown.task_guard();
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
            _ = stop.recv() => {
                while let Ok(event) = events.try_recv() {
                    log_event(&event);
                }
                break;
            }
        }
    }
}

fn log_event(event: &MirrorEvent) {
    match event {
        MirrorEvent::NetworkUpdated { origin, network } => {
            tracing::info!("network {} rev={} from {}", network.id(), network.revision(), origin);
        }
        MirrorEvent::MemberUpdated { origin, member } => {
            tracing::info!(
                "member {}/{} rev={} authorized={} from {}",
                member.network_id(),
                member.id(),
                member.revision(),
                member.authorized(),
                origin
            );
        }
        MirrorEvent::MemberDeauthorized {
            origin,
            network_id,
            member_id,
        } => {
            tracing::info!("member {}/{} deauthorized from {}", network_id, member_id, origin);
        }
    }
}
