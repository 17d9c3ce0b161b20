use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Router;
use prism_core::wire::WireEnvelope;
use prism_engine::EngineConfig;
use prism_settings::{PrismSettings, ServerSettings};
use prism_telemetry::MetricsRecorder;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::client::{self, ClientId, ClientRegistry};
use crate::error::ServerError;
use crate::event_bridge;
use crate::handlers;
use crate::publish::PublishOrchestrator;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    /// 0 binds an ephemeral port; read the real one from [`ServerHandle::addr`].
    pub port: u16,
    pub max_send_queue: usize,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
    /// Capacity of the envelope broadcast feeding the event bridge.
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_send_queue: s.max_send_queue,
            heartbeat_interval: Duration::from_millis(s.heartbeat_interval_ms),
            client_timeout: Duration::from_millis(s.client_timeout_ms),
            event_capacity: 1024,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PublishOrchestrator>,
    pub client_registry: Arc<ClientRegistry>,
    pub message_tx: mpsc::Sender<(ClientId, String)>,
    pub settings: Arc<PrismSettings>,
    pub metrics: Option<Arc<MetricsRecorder>>,
    pub heartbeat_interval: Duration,
    pub started_at: Instant,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(handlers::health))
        .route("/api/config", get(handlers::config))
        .route("/api/metrics", get(handlers::metrics))
        .route("/api/preview-content", post(handlers::preview_content))
        .route("/api/publish-content", post(handlers::publish_content))
        .route("/api/publish-content/{session_id}", delete(handlers::abort_publish))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind, spawn the background tasks, and start serving.
///
/// Publish runs always use the local simulation driver; `engine` supplies its
/// timing, the completion policy, and the metrics recorder.
pub async fn start(config: ServerConfig, engine: EngineConfig, settings: PrismSettings) -> Result<ServerHandle, ServerError> {
    let metrics = engine.metrics.clone();
    let mut registry = ClientRegistry::new(config.max_send_queue, config.client_timeout);
    if let Some(m) = &metrics {
        registry = registry.with_metrics(Arc::clone(m));
    }
    let client_registry = Arc::new(registry);

    let (event_tx, bridge_rx) = broadcast::channel::<WireEnvelope>(config.event_capacity.max(1));
    let bridge = event_bridge::create_bridge(Arc::clone(&client_registry), bridge_rx);

    let cleanup = client::start_cleanup_task(Arc::clone(&client_registry), config.heartbeat_interval);

    let (msg_tx, msg_rx) = mpsc::channel::<(ClientId, String)>(1024);
    let control = tokio::spawn(process_control_messages(msg_rx, Arc::clone(&client_registry)));

    let orchestrator = Arc::new(PublishOrchestrator::new(engine, event_tx));
    let app_state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        client_registry,
        message_tx: msg_tx,
        settings: Arc::new(settings),
        metrics,
        heartbeat_interval: config.heartbeat_interval,
        started_at: Instant::now(),
    };

    let router = build_router(app_state);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;

    tracing::info!(%addr, "Prism server started");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        let serve = axum::serve(listener, router).with_graceful_shutdown(async move { signal.cancelled().await });
        if let Err(e) = serve.await {
            tracing::error!(error = %e, "Server stopped with an error");
        }
    });

    Ok(ServerHandle {
        addr,
        orchestrator,
        shutdown,
        server,
        background: vec![bridge, cleanup, control],
    })
}

/// Handle returned by [`start`]. Dropping it leaves the server running.
pub struct ServerHandle {
    addr: SocketAddr,
    orchestrator: Arc<PublishOrchestrator>,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
    background: Vec<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn orchestrator(&self) -> &Arc<PublishOrchestrator> {
        &self.orchestrator
    }

    /// Abort active runs, stop accepting connections, and wait for the listener to close.
    pub async fn shutdown(self) {
        let aborted = self.orchestrator.abort_all();
        self.shutdown.cancel();
        for task in &self.background {
            task.abort();
        }
        if let Err(e) = self.server.await {
            tracing::warn!(error = %e, "Server task panicked");
        }
        tracing::info!(aborted, "Prism server stopped");
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.client_registry.register();
    tracing::info!(client_id = %client_id, "WebSocket client connected");

    let hello = WireEnvelope::new(
        "connected",
        "",
        json!({
            "message": "Connected to Prism event stream",
            "connection_id": client_id.0,
        }),
    );
    if let Ok(text) = hello.to_json() {
        state.client_registry.send_to(&client_id, text);
    }

    client::handle_ws_connection(
        socket,
        client_id,
        rx,
        state.client_registry,
        state.message_tx,
        state.heartbeat_interval,
    )
    .await;
}

/// Answer control frames from websocket clients, in arrival order.
async fn process_control_messages(mut rx: mpsc::Receiver<(ClientId, String)>, registry: Arc<ClientRegistry>) {
    while let Some((client_id, raw)) = rx.recv().await {
        let reply = handlers::handle_control(&registry, &client_id, &raw);
        match reply.to_json() {
            Ok(json) => {
                registry.send_to(&client_id, json);
            }
            Err(e) => tracing::warn!(client_id = %client_id, error = %e, "Failed to encode reply"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn config_follows_settings() {
        let settings = ServerSettings {
            port: 9000,
            heartbeat_interval_ms: 1500,
            ..ServerSettings::default()
        };
        let config = ServerConfig::from(&settings);
        assert_eq!(config.port, 9000);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(1500));
        assert_eq!(config.max_send_queue, 256);
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let handle = start(test_config(), EngineConfig::default(), PrismSettings::default())
            .await
            .unwrap();
        assert!(handle.port() > 0);

        let url = format!("http://{}/health", handle.addr());
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["platforms"], json!(["linkedin", "twitter", "instagram"]));

        handle.shutdown().await;
    }
}
