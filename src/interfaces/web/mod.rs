mod handlers;
mod router;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use std::net::IpAddr;
use std::sync::Arc;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::core::dispatcher::DeliveryDispatcher;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::store::ContentStore;
use crate::core::vault::CredentialCipher;

pub struct ApiServer {
    store: Arc<ContentStore>,
    dispatcher: Arc<DeliveryDispatcher>,
    cipher: Arc<CredentialCipher>,
    log_tx: tokio::sync::broadcast::Sender<String>,
    host: IpAddr,
    port: u16,
}

impl ApiServer {
    pub fn new(
        store: Arc<ContentStore>,
        dispatcher: Arc<DeliveryDispatcher>,
        cipher: Arc<CredentialCipher>,
        log_tx: tokio::sync::broadcast::Sender<String>,
        host: IpAddr,
        port: u16,
    ) -> Self {
        Self {
            store,
            dispatcher,
            cipher,
            log_tx,
            host,
            port,
        }
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<ContentStore>,
    pub(crate) dispatcher: Arc<DeliveryDispatcher>,
    pub(crate) cipher: Arc<CredentialCipher>,
    pub(crate) log_tx: tokio::sync::broadcast::Sender<String>,
    pub(crate) port: u16,
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| {
        match msg {
            Ok(log) => Ok(Event::default().data(log)), // SSE properly encodes this
            Err(_) => Ok(Event::default().data("Log stream lagged")),
        }
    });

    Sse::new(stream)
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server Interface initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let state = AppState {
            store: self.store.clone(),
            dispatcher: self.dispatcher.clone(),
            cipher: self.cipher.clone(),
            log_tx: self.log_tx.clone(),
            port: self.port,
        };
        let addr = format!("{}:{}", self.host, self.port);

        tokio::spawn(async move {
            let app = router::build_api_router(state);
            if let Ok(listener) = tokio::net::TcpListener::bind(&addr).await {
                info!("API Server running at http://{addr}");
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!("API Server crashed: {}", e);
                }
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        Ok(())
    }
}
