use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use prism_telemetry::{names, MetricsRecorder};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique client identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl Default for ClientId {
    fn default() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }
}

impl ClientId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected websocket client and the session streams it joined.
pub struct Client {
    pub id: ClientId,
    rooms: Mutex<HashSet<String>>,
    tx: mpsc::Sender<String>,
    connected: AtomicBool,
    last_seen_ms: AtomicI64,
}

impl Client {
    fn new(id: ClientId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            rooms: Mutex::new(HashSet::new()),
            tx,
            connected: AtomicBool::new(true),
            last_seen_ms: AtomicI64::new(now_ms()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn in_room(&self, session_id: &str) -> bool {
        self.rooms.lock().contains(session_id)
    }

    /// Any frame from the client counts as proof of life.
    pub fn record_activity(&self) {
        self.last_seen_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn is_alive(&self, timeout: Duration) -> bool {
        let idle = now_ms().saturating_sub(self.last_seen_ms.load(Ordering::Relaxed));
        idle < timeout.as_millis() as i64
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Registry of all connected websocket clients.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<Client>>,
    max_send_queue: usize,
    client_timeout: Duration,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize, client_timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue: max_send_queue.max(1),
            client_timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register a new client and return its ID and outbound queue.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<String>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.clients.insert(id.clone(), Arc::new(Client::new(id.clone(), tx)));
        self.report_count();
        (id, rx)
    }

    /// Remove a client by ID.
    pub fn unregister(&self, id: &ClientId) {
        if let Some((_, client)) = self.clients.remove(id) {
            client.connected.store(false, Ordering::Relaxed);
            self.report_count();
        }
    }

    fn report_count(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.gauge_set(names::SERVER_CLIENTS, &[], self.clients.len() as f64);
        }
    }

    pub fn get(&self, id: &ClientId) -> Option<Arc<Client>> {
        self.clients.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Subscribe a client to one session's stream. Returns false for unknown clients.
    pub fn join(&self, client_id: &ClientId, session_id: &str) -> bool {
        match self.clients.get(client_id) {
            Some(client) => {
                client.rooms.lock().insert(session_id.to_owned());
                true
            }
            None => false,
        }
    }

    pub fn leave(&self, client_id: &ClientId, session_id: &str) -> bool {
        match self.clients.get(client_id) {
            Some(client) => client.rooms.lock().remove(session_id),
            None => false,
        }
    }

    /// Queue a message for one client. A full queue drops the message.
    pub fn send_to(&self, client_id: &ClientId, message: String) -> bool {
        let Some(client) = self.get(client_id) else {
            return false;
        };
        match client.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(client_id = %client_id, msg_len = msg.len(), "Send queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a message for every client joined to `session_id`. Returns how many accepted it.
    pub fn broadcast_to_session(&self, session_id: &str, message: &str) -> usize {
        let mut delivered = 0;
        for entry in self.clients.iter() {
            let client = entry.value();
            if !client.is_connected() || !client.in_room(session_id) {
                continue;
            }
            match client.tx.try_send(message.to_owned()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(client_id = %client.id, %session_id, "Send queue full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    pub fn clients_for_session(&self, session_id: &str) -> Vec<ClientId> {
        self.clients
            .iter()
            .filter(|entry| entry.value().in_room(session_id))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Remove clients silent for longer than the client timeout.
    pub fn cleanup_dead_clients(&self) -> usize {
        let dead: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|entry| !entry.value().is_alive(self.client_timeout))
            .map(|entry| entry.key().clone())
            .collect();

        for id in &dead {
            self.unregister(id);
            tracing::info!(client_id = %id, "Cleaned up dead client");
        }
        dead.len()
    }
}

/// Split a websocket into writer and reader tasks, with a periodic ping.
///
/// Text frames are handed to `on_message`; the connection ends when either
/// side stops, and the client is unregistered.
pub async fn handle_ws_connection(
    socket: WebSocket,
    client_id: ClientId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ClientRegistry>,
    on_message: mpsc::Sender<(ClientId, String)>,
    heartbeat_interval: Duration,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_cid = client_id.clone();
    let writer_registry = Arc::clone(&registry);
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat_interval);
        ping_interval.tick().await; // first tick is immediate

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Default::default())).await.is_err() {
                        break;
                    }
                    tracing::trace!(client_id = %writer_cid, "Sent ping");
                }
            }
        }

        if let Some(client) = writer_registry.get(&writer_cid) {
            client.connected.store(false, Ordering::Relaxed);
        }
        let _ = ws_tx.close().await;
    });

    let reader_cid = client_id.clone();
    let reader_registry = Arc::clone(&registry);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if let Some(client) = reader_registry.get(&reader_cid) {
                client.record_activity();
            }
            match msg {
                WsMessage::Text(text) => {
                    if on_message.send((reader_cid.clone(), text.to_string())).await.is_err() {
                        break;
                    }
                }
                WsMessage::Close(_) => break,
                // pongs only refresh liveness; axum answers pings itself
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    registry.unregister(&client_id);
    tracing::info!(client_id = %client_id, "WebSocket client disconnected");
}

/// Periodically drop clients that stopped answering pings.
pub fn start_cleanup_task(registry: Arc<ClientRegistry>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_clients();
            if removed > 0 {
                tracing::info!(removed = removed, "Dead client cleanup");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(queue: usize) -> ClientRegistry {
        ClientRegistry::new(queue, Duration::from_secs(90))
    }

    #[test]
    fn client_id_unique() {
        let a = ClientId::new();
        let b = ClientId::new();
        assert_ne!(a, b);
        assert!(a.0.starts_with("client_"));
    }

    #[test]
    fn registry_register_and_unregister() {
        let registry = registry(32);
        let (id1, _rx1) = registry.register();
        let (id2, _rx2) = registry.register();
        assert_eq!(registry.count(), 2);

        registry.unregister(&id1);
        assert_eq!(registry.count(), 1);
        registry.unregister(&id2);
        registry.unregister(&id2);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn join_and_leave_rooms() {
        let registry = registry(32);
        let (id, _rx) = registry.register();

        assert!(registry.join(&id, "sess-a"));
        assert!(registry.join(&id, "sess-b"));
        assert_eq!(registry.clients_for_session("sess-a"), vec![id.clone()]);

        assert!(registry.leave(&id, "sess-a"));
        assert!(!registry.leave(&id, "sess-a"));
        assert!(registry.clients_for_session("sess-a").is_empty());
        assert_eq!(registry.clients_for_session("sess-b"), vec![id]);

        assert!(!registry.join(&ClientId::new(), "sess-a"));
    }

    #[test]
    fn broadcast_reaches_only_joined_clients() {
        let registry = registry(32);
        let (id1, mut rx1) = registry.register();
        let (id2, mut rx2) = registry.register();
        let (_id3, mut rx3) = registry.register();
        registry.join(&id1, "sess");
        registry.join(&id2, "sess");

        assert_eq!(registry.broadcast_to_session("sess", "hello"), 2);
        assert_eq!(rx1.try_recv().unwrap(), "hello");
        assert_eq!(rx2.try_recv().unwrap(), "hello");
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn send_to_specific_client() {
        let registry = registry(32);
        let (id, mut rx) = registry.register();
        assert!(registry.send_to(&id, "test message".into()));
        assert_eq!(rx.try_recv().unwrap(), "test message");
        assert!(!registry.send_to(&ClientId::new(), "test".into()));
    }

    #[test]
    fn full_queue_drops_messages() {
        let registry = registry(2);
        let (id, _rx) = registry.register();
        registry.join(&id, "sess");

        assert!(registry.send_to(&id, "msg1".into()));
        assert!(registry.send_to(&id, "msg2".into()));
        assert!(!registry.send_to(&id, "msg3".into()));
        assert_eq!(registry.broadcast_to_session("sess", "msg4"), 0);
    }

    #[test]
    fn cleanup_removes_silent_clients() {
        let registry = registry(32);
        let (id, _rx) = registry.register();
        let (_live, _rx2) = registry.register();

        registry.get(&id).unwrap().last_seen_ms.store(0, Ordering::Relaxed);

        assert_eq!(registry.cleanup_dead_clients(), 1);
        assert_eq!(registry.count(), 1);
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn client_gauge_follows_registrations() {
        let metrics = Arc::new(MetricsRecorder::new());
        let registry = registry(8).with_metrics(Arc::clone(&metrics));
        let (a, _rx1) = registry.register();
        let (_b, _rx2) = registry.register();
        assert_eq!(metrics.gauge_get(names::SERVER_CLIENTS, &[]), 2.0);
        registry.unregister(&a);
        assert_eq!(metrics.gauge_get(names::SERVER_CLIENTS, &[]), 1.0);
    }
}
