mod core;
mod interfaces;
mod logging;

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::core::config::Config;
use crate::core::dispatcher::DeliveryDispatcher;
use crate::core::lifecycle::LifecycleManager;
use crate::core::publisher::PublisherRegistry;
use crate::core::scheduler::{Scheduler, SchedulerWorker};
use crate::core::store::ContentStore;
use crate::core::vault::CredentialCipher;
use crate::interfaces::web::ApiServer;
use crate::logging::BroadcastMakeWriter;

async fn run() -> Result<()> {
    let (log_tx, _) = tokio::sync::broadcast::channel::<String>(500);
    let make_writer = BroadcastMakeWriter {
        sender: log_tx.clone(),
    };

    // Initialize standard structured logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let config = Config::from_env();
    info!("Starting crosspost daemon...");

    let store = Arc::new(ContentStore::open(&config.data_dir).await?);
    let cipher = Arc::new(CredentialCipher::new());
    let registry = Arc::new(PublisherRegistry::with_default_publishers(
        reqwest::Client::new(),
    ));
    let dispatcher = Arc::new(DeliveryDispatcher::new(
        store.clone(),
        registry,
        cipher.clone(),
        config.publish_timeout,
    ));
    let scheduler = Arc::new(Scheduler::new(store.clone(), dispatcher.clone()));

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(ApiServer::new(
        store,
        dispatcher,
        cipher,
        log_tx,
        config.host,
        config.port,
    ))));
    lifecycle.attach(Arc::new(Mutex::new(SchedulerWorker::new(
        scheduler,
        config.poll_interval,
    ))));

    lifecycle.start().await?;

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    info!("Shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("crosspost failed to start: {e}");
        std::process::exit(1);
    }
}
