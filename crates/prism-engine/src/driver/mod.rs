//! Event sources for a session.
//!
//! A driver produces [`PublishEvent`]s into an [`EventSink`]; it never touches
//! session state. Both drivers speak the same vocabulary, so the session does
//! not know which one is attached.

pub mod remote;
pub mod simulation;

use std::time::Duration;

use async_trait::async_trait;
use prism_core::{DriverMode, Platform, PublishEvent, SessionId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::DriverError;

pub use remote::{RemoteChannelDriver, RemoteConfig};
pub use simulation::{SimulationConfig, SimulationDriver};

/// What a driver is asked to publish.
#[derive(Clone, Debug)]
pub struct DriverPlan {
    pub session_id: SessionId,
    pub content: String,
    pub platforms: Vec<Platform>,
}

#[async_trait]
pub trait Driver: Send + 'static {
    fn mode(&self) -> DriverMode;

    /// Produce events until done or until the sink is cancelled.
    /// Returning `Ok` means the driver finished on its own terms.
    async fn run(self: Box<Self>, plan: DriverPlan, sink: EventSink) -> Result<(), DriverError>;
}

/// Delivery end of a session's event queue.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::Sender<PublishEvent>,
    cancel: CancellationToken,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<PublishEvent>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// A sink plus the receiving end, for callers that run a driver by hand.
    pub fn channel(buffer: usize, cancel: CancellationToken) -> (Self, mpsc::Receiver<PublishEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx, cancel), rx)
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }

    /// Deliver one event. Returns `false` once the session stopped listening;
    /// the driver should wind down then.
    pub async fn emit(&self, event: PublishEvent) -> bool {
        if !self.is_active() {
            return false;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel(4, CancellationToken::new());
        assert!(sink.emit(PublishEvent::started(Platform::LinkedIn)).await);
        assert!(sink.emit(PublishEvent::started(Platform::Twitter)).await);
        assert_eq!(rx.recv().await, Some(PublishEvent::started(Platform::LinkedIn)));
        assert_eq!(rx.recv().await, Some(PublishEvent::started(Platform::Twitter)));
    }

    #[tokio::test]
    async fn emit_refuses_after_cancel() {
        let cancel = CancellationToken::new();
        let (sink, mut rx) = EventSink::channel(4, cancel.clone());
        cancel.cancel();
        assert!(!sink.is_active());
        assert!(!sink.emit(PublishEvent::started(Platform::LinkedIn)).await);
        drop(sink);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn emit_refuses_when_receiver_gone() {
        let (sink, rx) = EventSink::channel(4, CancellationToken::new());
        drop(rx);
        assert!(!sink.emit(PublishEvent::started(Platform::LinkedIn)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_cut_short_by_cancel() {
        let cancel = CancellationToken::new();
        let (sink, _rx) = EventSink::channel(1, cancel.clone());
        let waiter = tokio::spawn(async move { sink.sleep(Duration::from_secs(60)).await });
        tokio::task::yield_now().await;
        cancel.cancel();
        assert!(!waiter.await.unwrap());
    }
}
