//! Remote channel driver: a websocket client over `tokio-tungstenite`.
//!
//! Joins the event stream of one session, forwards every vocabulary event
//! unchanged, and keeps reading for a short grace period after the summary
//! so a final burst of log lines is not cut off. A dropped connection is
//! reported as a `connection_status` event and retried; it never fails a
//! platform on its own.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use prism_core::wire::{self, ControlMessage, Inbound};
use prism_core::{DriverMode, PublishEvent, SessionId};
use prism_settings::RemoteSettings;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{Driver, DriverPlan, EventSink};
use crate::error::DriverError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    /// Websocket endpoint, e.g. `ws://127.0.0.1:8080/ws`.
    pub url: String,
    pub connect_attempts: u32,
    pub attempt_timeout: Duration,
    pub retry_delay: Duration,
    /// How long to keep reading after `all_platforms_completed`.
    pub drain_grace: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::from(&RemoteSettings::default())
    }
}

impl From<&RemoteSettings> for RemoteConfig {
    fn from(s: &RemoteSettings) -> Self {
        Self {
            url: s.url.clone(),
            connect_attempts: s.connect_attempts,
            attempt_timeout: Duration::from_millis(s.attempt_timeout_ms),
            retry_delay: Duration::from_millis(s.retry_delay_ms),
            drain_grace: Duration::from_millis(s.drain_grace_ms),
        }
    }
}

pub struct RemoteChannelDriver {
    config: RemoteConfig,
    joined_tx: Option<oneshot::Sender<()>>,
}

impl RemoteChannelDriver {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            joined_tx: None,
        }
    }

    /// Resolves once the server acknowledged the first join. Callers that
    /// trigger publication themselves wait on this so no event is missed.
    pub fn joined_signal(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.joined_tx = Some(tx);
        rx
    }

    async fn connect(&self, session_id: &SessionId, sink: &EventSink) -> Result<ChannelConnection, DriverError> {
        let attempts = self.config.connect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 && !sink.sleep(self.config.retry_delay).await {
                return Err(DriverError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                () = sink.cancelled() => return Err(DriverError::Cancelled),
                r = tokio::time::timeout(self.config.attempt_timeout, connect_async(self.config.url.as_str())) => r,
            };

            match outcome {
                Ok(Ok((ws, _response))) => {
                    let mut conn = ChannelConnection {
                        ws,
                        session_id: session_id.clone(),
                    };
                    match conn.send(&ControlMessage::join(session_id)).await {
                        Ok(()) => {
                            info!(url = %self.config.url, %session_id, attempt, "event stream connected");
                            return Ok(conn);
                        }
                        Err(e) => {
                            last_error = e.to_string();
                            conn.close().await;
                        }
                    }
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!("timed out after {}ms", self.config.attempt_timeout.as_millis());
                }
            }
            warn!(url = %self.config.url, attempt, attempts, error = %last_error, "event stream connect failed");
        }

        Err(DriverError::Connect {
            attempts,
            reason: last_error,
        })
    }

    /// Read frames until the session is done with this connection.
    async fn pump(&mut self, conn: &mut ChannelConnection, sink: &EventSink, summary_seen: &mut bool) -> PumpExit {
        let mut drain_until = None;

        loop {
            let drain = async move {
                match drain_until {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let frame = tokio::select! {
                biased;
                () = sink.cancelled() => return PumpExit::Cancelled,
                () = drain => return PumpExit::Finished,
                frame = conn.ws.next() => frame,
            };

            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) => return PumpExit::Disconnected("closed by server".into()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return PumpExit::Disconnected(e.to_string()),
                None => return PumpExit::Disconnected("stream ended".into()),
            };

            match wire::decode(text.as_str()) {
                Ok(Inbound::Event(event)) => {
                    let is_summary = matches!(event, PublishEvent::AllPlatformsCompleted { .. });
                    if !sink.emit(event).await {
                        return PumpExit::Cancelled;
                    }
                    if is_summary && drain_until.is_none() {
                        *summary_seen = true;
                        drain_until = Some(Instant::now() + self.config.drain_grace);
                    }
                }
                Ok(Inbound::Joined { session_id }) => {
                    debug!(%session_id, "joined event stream");
                    if let Some(tx) = self.joined_tx.take() {
                        let _ = tx.send(());
                    }
                }
                Ok(Inbound::Left { session_id }) => debug!(%session_id, "left event stream"),
                Ok(Inbound::Error { message }) => warn!(%message, "event stream reported an error"),
                Ok(Inbound::Other { event }) => debug!(%event, "informational frame"),
                Err(e) => warn!(error = %e, "dropping malformed frame"),
            }
        }
    }
}

enum PumpExit {
    Finished,
    Cancelled,
    Disconnected(String),
}

#[async_trait]
impl Driver for RemoteChannelDriver {
    fn mode(&self) -> DriverMode {
        DriverMode::RemoteChannel
    }

    async fn run(mut self: Box<Self>, plan: DriverPlan, sink: EventSink) -> Result<(), DriverError> {
        let mut conn = self.connect(&plan.session_id, &sink).await?;
        sink.emit(status(true, "Connected to event stream")).await;

        let mut summary_seen = false;
        loop {
            let exit = self.pump(&mut conn, &sink, &mut summary_seen).await;
            conn.close().await;

            match exit {
                PumpExit::Finished => return Ok(()),
                PumpExit::Cancelled => return Err(DriverError::Cancelled),
                PumpExit::Disconnected(_) if summary_seen => return Ok(()),
                PumpExit::Disconnected(reason) => {
                    warn!(session_id = %plan.session_id, %reason, "event stream disconnected");
                    sink.emit(status(false, &reason)).await;
                    conn = self.connect(&plan.session_id, &sink).await?;
                    sink.emit(status(true, "Reconnected to event stream")).await;
                }
            }
        }
    }
}

fn status(connected: bool, message: &str) -> PublishEvent {
    PublishEvent::ConnectionStatus {
        connected,
        message: message.to_owned(),
    }
}

/// One joined websocket. Consumed by [`ChannelConnection::close`], so the
/// socket is released exactly once.
struct ChannelConnection {
    ws: WsStream,
    session_id: SessionId,
}

impl ChannelConnection {
    async fn send(&mut self, msg: &ControlMessage) -> Result<(), DriverError> {
        self.ws.send(Message::text(msg.to_json())).await?;
        Ok(())
    }

    async fn close(mut self) {
        let leave = ControlMessage::leave(&self.session_id);
        if let Err(e) = self.send(&leave).await {
            debug!(error = %e, "leave_stream not sent");
        }
        if let Err(e) = self.ws.close(None).await {
            debug!(error = %e, "websocket close failed");
        }
        debug!(session_id = %self.session_id, "event stream closed");
    }
}
