//! Server-side publish runs.
//!
//! Each accepted request becomes a [`Session`] driven by the local simulation
//! driver. Every applied event is framed and pushed onto the server's envelope
//! broadcast, which the event bridge fans out to joined websocket clients.

use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prism_core::wire::{self, WireEnvelope};
use prism_core::{ContentAdapter, Platform, SessionId};
use prism_engine::{EngineConfig, Session, SessionError, SimulationDriver};
use prism_telemetry::names;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{PublishAccepted, PublishRequest};
use crate::error::ServerError;

pub const PUBLISH_STARTED: &str = "publish_started";
pub const ADAPTATION_COMPLETE: &str = "adaptation_complete";

/// Tracks an active publish run.
struct ActiveRun {
    run_id: String,
    cancel: CancellationToken,
    platforms: Vec<Platform>,
    started_at: Instant,
}

/// What is known about a run still in flight.
#[derive(Clone, Debug, PartialEq)]
pub struct RunState {
    pub platforms: Vec<Platform>,
    pub elapsed_secs: f64,
}

pub struct PublishOrchestrator {
    engine: EngineConfig,
    event_tx: broadcast::Sender<WireEnvelope>,
    active_runs: Arc<DashMap<SessionId, ActiveRun>>,
    adapter: ContentAdapter,
}

impl PublishOrchestrator {
    pub fn new(engine: EngineConfig, event_tx: broadcast::Sender<WireEnvelope>) -> Self {
        Self {
            engine,
            event_tx,
            active_runs: Arc::new(DashMap::new()),
            adapter: ContentAdapter,
        }
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    /// Validate the request and start a run. The run continues after this returns.
    pub fn publish(&self, request: PublishRequest) -> Result<PublishAccepted, ServerError> {
        let outcome = self.try_publish(request);
        if let Some(metrics) = &self.engine.metrics {
            let label = match &outcome {
                Ok(_) => "accepted",
                Err(e) => e.error_kind(),
            };
            metrics.counter_inc(names::SERVER_PUBLISH_REQUESTS, &[("outcome", label)], 1);
        }
        outcome
    }

    fn try_publish(&self, request: PublishRequest) -> Result<PublishAccepted, ServerError> {
        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .map(SessionId::from_raw)
            .unwrap_or_default();
        let mut session = Session::start_with_id(session_id.clone(), &request.content, &request.platforms)?
            .with_policy(self.engine.policy);
        if let Some(metrics) = &self.engine.metrics {
            session = session.with_metrics(Arc::clone(metrics));
        }
        let platforms = session.platforms();

        let vacant = match self.active_runs.entry(session_id.clone()) {
            Entry::Occupied(_) => return Err(ServerError::SessionActive(session_id)),
            Entry::Vacant(vacant) => vacant,
        };

        self.announce(
            &session_id,
            PUBLISH_STARTED,
            json!({
                "session_id": session_id.as_str(),
                "total_platforms": platforms.len(),
                "platforms": platforms,
                "message": "Starting content adaptation...",
            }),
        );
        let adapted = self.adapter.adapt_all(session.content(), &platforms);
        self.announce(
            &session_id,
            ADAPTATION_COMPLETE,
            json!({
                "session_id": session_id.as_str(),
                "adapted_content": adapted,
                "message": "Content adaptation complete. Starting publication...",
            }),
        );

        let tx = self.event_tx.clone();
        let frame_id = session_id.clone();
        let forward = session.observers().events.subscribe(move |event| {
            match wire::encode_event(&frame_id, event) {
                // no receivers just means nobody joined
                Ok(envelope) => {
                    let _ = tx.send(envelope);
                }
                Err(e) => warn!(session_id = %frame_id, error = %e, "Failed to frame event"),
            }
        });

        let driver = SimulationDriver::new(self.engine.simulation.clone());
        let handle = session.attach(Box::new(driver), self.engine.attach.clone());

        let run_id = uuid::Uuid::now_v7().to_string();
        let cancel = CancellationToken::new();
        vacant.insert(ActiveRun {
            run_id: run_id.clone(),
            cancel: cancel.clone(),
            platforms: platforms.clone(),
            started_at: Instant::now(),
        });
        info!(%session_id, %run_id, platforms = platforms.len(), "Publish run started");

        let active_runs = Arc::clone(&self.active_runs);
        let task_session = session_id.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                () = cancel.cancelled() => {
                    handle.abandon();
                    Err(SessionError::Abandoned)
                }
                r = handle.wait_resolved() => r,
            };
            match &outcome {
                Ok(results) => {
                    let ok = results.iter().filter(|r| r.is_success()).count();
                    info!(session_id = %task_session, ok, total = results.len(), "Publish run resolved");
                }
                Err(e) => warn!(session_id = %task_session, kind = e.error_kind(), "Publish run ended unresolved"),
            }
            handle.finished().await;
            forward.unsubscribe();
            active_runs.remove_if(&task_session, |_, run| run.run_id == run_id);
        });

        Ok(PublishAccepted { session_id, platforms })
    }

    fn announce(&self, session_id: &SessionId, event: &str, data: serde_json::Value) {
        let _ = self.event_tx.send(WireEnvelope::new(event, session_id.as_str(), data));
    }

    /// Cancel a run. Returns false when no run is active under that id.
    pub fn abort(&self, session_id: &SessionId) -> bool {
        match self.active_runs.remove(session_id) {
            Some((_, run)) => {
                run.cancel.cancel();
                info!(%session_id, run_id = %run.run_id, "Publish run aborted");
                true
            }
            None => false,
        }
    }

    pub fn state(&self, session_id: &SessionId) -> Option<RunState> {
        self.active_runs.get(session_id).map(|run| RunState {
            platforms: run.platforms.clone(),
            elapsed_secs: run.started_at.elapsed().as_secs_f64(),
        })
    }

    pub fn active_count(&self) -> usize {
        self.active_runs.len()
    }

    /// Cancel every active run, e.g. on shutdown.
    pub fn abort_all(&self) -> usize {
        let count = self.active_runs.len();
        for entry in self.active_runs.iter() {
            entry.value().cancel.cancel();
        }
        self.active_runs.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use prism_core::StartError;
    use prism_engine::SimulationConfig;
    use prism_telemetry::MetricsRecorder;

    fn engine(step: Duration) -> EngineConfig {
        EngineConfig {
            simulation: SimulationConfig {
                min_step_delay: step,
                max_step_delay: step,
                stagger: step,
                seed: Some(7),
            },
            metrics: Some(Arc::new(MetricsRecorder::new())),
            ..EngineConfig::default()
        }
    }

    fn request(session_id: &str, platforms: &[&str]) -> PublishRequest {
        PublishRequest {
            content: "Hello world".into(),
            platforms: platforms.iter().map(|p| p.to_string()).collect(),
            session_id: Some(session_id.into()),
        }
    }

    async fn next_frame(rx: &mut broadcast::Receiver<WireEnvelope>) -> WireEnvelope {
        tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn run_streams_announcements_then_vocabulary() {
        let (tx, mut rx) = broadcast::channel(1024);
        let orchestrator = PublishOrchestrator::new(engine(Duration::from_millis(10)), tx);

        let accepted = orchestrator.publish(request("sess-1", &["linkedin"])).unwrap();
        assert_eq!(accepted.session_id.as_str(), "sess-1");
        assert_eq!(accepted.platforms, vec![Platform::LinkedIn]);
        assert!(orchestrator.state(&accepted.session_id).is_some());

        assert_eq!(next_frame(&mut rx).await.event, PUBLISH_STARTED);
        let adaptation = next_frame(&mut rx).await;
        assert_eq!(adaptation.event, ADAPTATION_COMPLETE);
        assert_eq!(adaptation.data["adapted_content"][0]["platform"], "linkedin");

        let mut seen = Vec::new();
        loop {
            let frame = next_frame(&mut rx).await;
            assert_eq!(frame.session_id, "sess-1");
            seen.push(frame.event.clone());
            if frame.event == "all_platforms_completed" {
                break;
            }
        }
        assert_eq!(seen.first().map(String::as_str), Some("platform_started"));
        assert!(seen.iter().any(|n| n == "agent_step"));
        assert!(seen.iter().any(|n| n == "platform_completed"));

        let metrics = orchestrator.engine().metrics.clone().unwrap();
        assert_eq!(
            metrics.counter_get(names::SERVER_PUBLISH_REQUESTS, &[("outcome", "accepted")]),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_requests_never_start_a_run() {
        let (tx, mut rx) = broadcast::channel(16);
        let orchestrator = PublishOrchestrator::new(engine(Duration::from_millis(10)), tx);

        let mut empty = request("sess-1", &["linkedin"]);
        empty.content = "   ".into();
        assert_matches!(
            orchestrator.publish(empty),
            Err(ServerError::InvalidRequest(StartError::EmptyContent))
        );
        assert_matches!(
            orchestrator.publish(request("sess-1", &["tiktok"])),
            Err(ServerError::InvalidRequest(StartError::UnsupportedPlatform(_)))
        );
        assert_eq!(orchestrator.active_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_session_is_rejected_while_active() {
        let (tx, _rx) = broadcast::channel(1024);
        let orchestrator = PublishOrchestrator::new(engine(Duration::from_secs(1)), tx);

        orchestrator.publish(request("sess-dup", &["twitter"])).unwrap();
        assert_matches!(
            orchestrator.publish(request("sess-dup", &["twitter"])),
            Err(ServerError::SessionActive(_))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn finished_runs_are_removed() {
        let (tx, _rx) = broadcast::channel(1024);
        let orchestrator = PublishOrchestrator::new(engine(Duration::from_millis(10)), tx);
        let accepted = orchestrator.publish(request("sess-done", &["instagram"])).unwrap();

        for _ in 0..100 {
            if orchestrator.state(&accepted.session_id).is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert!(orchestrator.state(&accepted.session_id).is_none());
        // the id is free again
        orchestrator.publish(request("sess-done", &["instagram"])).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn abort_cancels_the_run() {
        let (tx, _rx) = broadcast::channel(1024);
        let orchestrator = PublishOrchestrator::new(engine(Duration::from_secs(1)), tx);
        let accepted = orchestrator.publish(request("sess-abort", &["linkedin"])).unwrap();

        assert!(orchestrator.abort(&accepted.session_id));
        assert!(!orchestrator.abort(&accepted.session_id));
        assert!(orchestrator.state(&accepted.session_id).is_none());
        assert_eq!(orchestrator.abort_all(), 0);
    }
}
