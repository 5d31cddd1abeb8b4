//! bridged: request worker daemon.
//!
//! Consumes the durable request queue, runs each request against the
//! credential store through the host failover pool, and replies to the
//! caller's reply queue.
//!
//! Usage: bridged [--init-schema]

use std::sync::Arc;

use anyhow::{Context, Result};

use bridge_core::config::{BridgeConfig, StoreBackend};
use bridge_services::{
    Broker, CredentialHasher, Dispatcher, Durability, HostFailoverPool, MemoryConnector,
    MemoryCredentialStore, MySqlConnector, SqliteBroker, StoreConnector, Worker,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut init_schema = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--init-schema" => init_schema = true,
            "-h" | "--help" => {
                print_usage();
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
    }

    // Load config
    if let Err(e) = BridgeConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = BridgeConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        BridgeConfig::default()
    });
    tracing::info!(
        queue = %config.broker.request_queue,
        backend = ?config.store.backend,
        hosts = ?config.store.hosts,
        "bridged starting"
    );

    // Store
    let connector: Arc<dyn StoreConnector> = match config.store.backend {
        StoreBackend::Mysql => Arc::new(MySqlConnector),
        StoreBackend::Memory => {
            tracing::warn!("memory store selected, users are lost on exit");
            Arc::new(MemoryConnector::new(MemoryCredentialStore::new()))
        }
    };
    let pool = HostFailoverPool::new(config.store.clone(), connector);

    if init_schema {
        let mut conn = pool
            .acquire()
            .await
            .context("no store host reachable for schema setup")?;
        conn.ensure_schema()
            .await
            .context("failed to create users table")?;
        tracing::info!("schema ready");
        return Ok(());
    }

    // Broker
    let broker: Arc<dyn Broker> = Arc::new(
        SqliteBroker::open(&config.broker.path, config.broker.poll_interval())
            .with_context(|| format!("failed to open queue store {}", config.broker.path.display()))?
            .with_transient_ttl(config.broker.transient_ttl()),
    );
    broker
        .declare_queue(&config.broker.request_queue, Durability::Durable)
        .await
        .context("failed to declare request queue")?;
    tracing::info!(path = %config.broker.path.display(), "queue store ready");

    // Dispatcher
    let hasher = CredentialHasher::new().context("failed to initialise password hasher")?;
    let dispatcher = Arc::new(Dispatcher::new(pool, hasher));

    // ── Shutdown ─────────────────────────────────────────────────────────────

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    let worker = Worker::new(
        broker,
        config.broker.request_queue.clone(),
        dispatcher,
        config.broker.poll_interval(),
        shutdown_tx.subscribe(),
    );
    worker.run().await?;

    tracing::info!("bridged stopped");
    Ok(())
}

fn print_usage() {
    println!("bridged: request worker daemon");
    println!();
    println!("USAGE:");
    println!("  bridged                 Run the worker until Ctrl-C");
    println!("  bridged --init-schema   Create the users table on the first reachable host");
    println!();
    println!("Config: $BRIDGE_CONFIG or ~/.config/bridge/config.toml");
    println!("Logging: RUST_LOG=bridged=debug,bridge_services=debug");
}
