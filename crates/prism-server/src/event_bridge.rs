use std::sync::Arc;

use prism_core::wire::WireEnvelope;
use tokio::sync::broadcast;

use crate::client::ClientRegistry;

/// Subscribes to the server's envelope broadcast and forwards each frame to
/// the websocket clients joined to its session.
pub struct EventBridge {
    registry: Arc<ClientRegistry>,
}

impl EventBridge {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Spawn the forwarding task. It ends when every sender is dropped.
    pub fn start(&self, mut rx: broadcast::Receiver<WireEnvelope>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => match envelope.to_json() {
                        Ok(json) => {
                            let delivered = registry.broadcast_to_session(&envelope.session_id, &json);
                            tracing::trace!(
                                session_id = %envelope.session_id,
                                event = %envelope.event,
                                delivered,
                                "Forwarded frame"
                            );
                        }
                        Err(e) => tracing::warn!(event = %envelope.event, error = %e, "Failed to encode frame"),
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Event bridge lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bridge channel closed");
                        break;
                    }
                }
            }
        })
    }
}

/// Create an event bridge wired to a broadcast channel.
pub fn create_bridge(
    registry: Arc<ClientRegistry>,
    rx: broadcast::Receiver<WireEnvelope>,
) -> tokio::task::JoinHandle<()> {
    EventBridge::new(registry).start(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use prism_core::{wire, Platform, PublishEvent, SessionId};

    fn registry() -> Arc<ClientRegistry> {
        Arc::new(ClientRegistry::new(32, Duration::from_secs(90)))
    }

    #[tokio::test]
    async fn bridge_forwards_to_joined_clients() {
        let registry = registry();
        let (tx, rx) = broadcast::channel(16);
        let (client_id, mut client_rx) = registry.register();
        let session_id = SessionId::from_raw("sess-bridge");
        registry.join(&client_id, session_id.as_str());

        let handle = create_bridge(Arc::clone(&registry), rx);
        let envelope = wire::encode_event(&session_id, &PublishEvent::started(Platform::LinkedIn)).unwrap();
        tx.send(envelope).unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(1), client_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let frame: WireEnvelope = serde_json::from_str(&msg).unwrap();
        assert_eq!(frame.event, "platform_started");
        assert_eq!(frame.session_id, "sess-bridge");
        assert_eq!(frame.data["platform"], "linkedin");

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn bridge_ignores_unrelated_sessions() {
        let registry = registry();
        let (tx, rx) = broadcast::channel(16);
        let (client_id, mut client_rx) = registry.register();
        registry.join(&client_id, "mine");

        let handle = create_bridge(Arc::clone(&registry), rx);
        tx.send(WireEnvelope::new("publish_started", "other", serde_json::json!({})))
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(client_rx.try_recv().is_err());
    }
}
