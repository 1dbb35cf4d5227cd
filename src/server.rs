//! HTTP shell: WebSocket endpoint, NIP-11 information document, health check.

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{State, WebSocketUpgrade},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::accept::Relay;
use crate::config::Settings;
use crate::registry::Registry;
use crate::storage::EventStore;
use crate::ws;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub registry: Arc<Registry>,
    pub store: Arc<dyn EventStore>,
    pub info: Arc<RelayInfo>,
}

impl AppState {
    pub fn new(store: Arc<dyn EventStore>, info: RelayInfo) -> Self {
        let registry = Arc::new(Registry::new());
        let relay = Arc::new(Relay::new(store.clone(), registry.clone()));
        Self {
            relay,
            registry,
            store,
            info: Arc::new(info),
        }
    }
}

/// NIP-11 relay information document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayInfo {
    pub name: String,
    pub description: String,
    pub pubkey: String,
    pub contact: String,
    pub supported_nips: Vec<u32>,
    pub software: String,
    pub version: String,
}

impl RelayInfo {
    pub fn from_settings(cfg: &Settings) -> Self {
        Self {
            name: cfg.name.clone(),
            description: cfg.description.clone(),
            pubkey: cfg.pubkey.clone(),
            contact: cfg.contact.clone(),
            supported_nips: vec![1, 9, 11, 40, 45, 70],
            software: "castr".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "relay listening");
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .with_state(state)
}

#[derive(Serialize, Deserialize)]
struct Health {
    status: String,
}

/// Health check endpoint.
async fn healthz() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}

/// WebSocket upgrade, or the relay information document for plain GETs.
async fn root(
    ws: Option<WebSocketUpgrade>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    if let Some(ws) = ws {
        return ws.on_upgrade(move |socket| ws::session(socket, state));
    }
    if wants_nostr_json(&headers) {
        return (
            [
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                (header::CONTENT_TYPE, "application/nostr+json"),
            ],
            Json(state.info.as_ref().clone()),
        )
            .into_response();
    }
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        "castr: connect with a Nostr client over WebSocket\n",
    )
        .into_response()
}

fn wants_nostr_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.contains("application/nostr+json"))
}
