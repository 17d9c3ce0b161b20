//! Attaching a driver and running a session to completion.
//!
//! The session task owns the [`Session`] and is its only writer. The driver
//! runs in its own task and feeds a bounded queue; cancellation flows from the
//! handle's token to a child token held by the driver.

use std::sync::Arc;
use std::time::Duration;

use prism_core::{CompletionPolicy, DriverMode, PlatformResult, SessionId, StartError};
use prism_settings::{PrismSettings, SessionSettings};
use prism_telemetry::{names, MetricsRecorder};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::driver::{Driver, DriverPlan, EventSink, RemoteChannelDriver, RemoteConfig, SimulationConfig, SimulationDriver};
use crate::error::{DriverError, SessionError};
use crate::observer::SessionObservers;
use crate::session::{Session, SessionPhase, SessionSnapshot};

#[derive(Clone, Debug)]
pub struct AttachOptions {
    /// After resolution, how long the driver may keep running before it is cancelled.
    pub detach_grace: Duration,
    /// Capacity of the driver → session queue.
    pub event_buffer: usize,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self::from(&SessionSettings::default())
    }
}

impl From<&SessionSettings> for AttachOptions {
    fn from(s: &SessionSettings) -> Self {
        Self {
            detach_grace: s.detach_grace(),
            event_buffer: s.event_buffer,
        }
    }
}

impl Session {
    /// Hand the session to its own task, fed by `driver`.
    ///
    /// Consumes the session, so a second driver can never be attached.
    pub fn attach(mut self, driver: Box<dyn Driver>, options: AttachOptions) -> SessionHandle {
        self.set_driver_mode(driver.mode());
        if let Some(metrics) = self.metrics() {
            metrics.counter_inc(names::SESSIONS_STARTED, &[("mode", driver.mode().as_str())], 1);
        }

        let session_id = self.id().clone();
        let observers = Arc::clone(self.observers());
        let (snapshot_tx, snapshot_rx) = watch::channel(self.snapshot());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_session(self, driver, options, snapshot_tx, cancel.clone()));

        SessionHandle {
            session_id,
            observers,
            snapshot_rx,
            cancel,
            task,
        }
    }
}

async fn run_session(
    mut session: Session,
    driver: Box<dyn Driver>,
    options: AttachOptions,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    cancel: CancellationToken,
) {
    let driver_cancel = cancel.child_token();
    let (sink, mut rx) = EventSink::channel(options.event_buffer, driver_cancel.clone());
    let plan = DriverPlan {
        session_id: session.id().clone(),
        content: session.content().to_owned(),
        platforms: session.platforms(),
    };
    let mode = driver.mode();
    info!(session_id = %plan.session_id, mode = mode.as_str(), "driver attached");
    let driver_task = tokio::spawn(driver.run(plan, sink));

    let mut detach_at: Option<tokio::time::Instant> = None;
    let phase = loop {
        let grace = async move {
            match detach_at {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break SessionPhase::Abandoned,
            () = grace => break SessionPhase::Resolved,
            event = rx.recv() => match event {
                Some(event) => {
                    let reduction = session.apply_event(&event);
                    snapshot_tx.send_replace(session.snapshot());
                    if reduction.resolved {
                        detach_at = Some(tokio::time::Instant::now() + options.detach_grace);
                    }
                }
                None if session.is_resolved() => break SessionPhase::Resolved,
                None => break SessionPhase::Stalled,
            },
        }
    };

    // No event is applied past this point.
    driver_cancel.cancel();
    drop(rx);
    match driver_task.await {
        Ok(Ok(())) | Ok(Err(DriverError::Cancelled)) => {}
        Ok(Err(e)) => warn!(session_id = %session.id(), kind = e.error_kind(), error = %e, "driver failed"),
        Err(e) => warn!(session_id = %session.id(), error = %e, "driver task panicked"),
    }

    let mut snapshot = session.snapshot();
    if !session.is_resolved() {
        snapshot.phase = phase;
    }
    match snapshot.phase {
        SessionPhase::Abandoned => {
            info!(session_id = %session.id(), "session abandoned");
            if let Some(metrics) = session.metrics() {
                metrics.counter_inc(names::SESSIONS_ABANDONED, &[], 1);
            }
        }
        SessionPhase::Stalled => warn!(session_id = %session.id(), "driver stopped before resolution"),
        _ => debug!(session_id = %session.id(), "session task finished"),
    }
    snapshot_tx.send_replace(snapshot);
}

/// Caller's end of a running session.
pub struct SessionHandle {
    session_id: SessionId,
    observers: Arc<SessionObservers>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn observers(&self) -> &Arc<SessionObservers> {
        &self.observers
    }

    /// Latest state, refreshed after every applied event.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Stream of snapshots; intermediate states may be skipped under load.
    pub fn updates(&self) -> WatchStream<SessionSnapshot> {
        WatchStream::new(self.snapshot_rx.clone())
    }

    /// Wait until the session leaves the live phase.
    pub async fn wait_resolved(&self) -> Result<Vec<PlatformResult>, SessionError> {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = match rx.wait_for(|s| s.phase != SessionPhase::Live).await {
            Ok(snapshot) => snapshot.clone(),
            // task gone without a final snapshot
            Err(_) => return Err(SessionError::Stalled),
        };
        match snapshot.phase {
            SessionPhase::Abandoned => Err(SessionError::Abandoned),
            SessionPhase::Stalled | SessionPhase::Live => Err(SessionError::Stalled),
            SessionPhase::Resolved => snapshot.results.ok_or(SessionError::Unresolved),
        }
    }

    /// Stop the driver and discard the session. Idempotent.
    pub fn abandon(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session task, including driver teardown, to end.
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            warn!(session_id = %self.session_id, error = %e, "session task panicked");
        }
    }
}

/// Everything [`start_session`] needs to pick and configure a driver.
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    pub mode: DriverMode,
    pub policy: CompletionPolicy,
    pub simulation: SimulationConfig,
    pub remote: RemoteConfig,
    pub attach: AttachOptions,
    pub metrics: Option<Arc<MetricsRecorder>>,
}

impl From<&PrismSettings> for EngineConfig {
    fn from(s: &PrismSettings) -> Self {
        Self {
            mode: s.session.driver_mode,
            policy: s.session.completion_policy,
            simulation: SimulationConfig::from(&s.simulation),
            remote: RemoteConfig::from(&s.remote),
            attach: AttachOptions::from(&s.session),
            metrics: None,
        }
    }
}

impl EngineConfig {
    pub fn driver(&self) -> Box<dyn Driver> {
        match self.mode {
            DriverMode::LocalSimulation => Box::new(SimulationDriver::new(self.simulation.clone())),
            DriverMode::RemoteChannel => Box::new(RemoteChannelDriver::new(self.remote.clone())),
        }
    }

    /// Build a validated session with this config's policy and metrics.
    pub fn session<S: AsRef<str>>(&self, content: &str, platform_ids: &[S]) -> Result<Session, StartError> {
        let mut session = Session::start(content, platform_ids)?.with_policy(self.policy);
        if let Some(metrics) = &self.metrics {
            session = session.with_metrics(Arc::clone(metrics));
        }
        Ok(session)
    }
}

/// Validate, create, and attach the configured driver in one call.
pub fn start_session<S: AsRef<str>>(
    content: &str,
    platform_ids: &[S],
    config: &EngineConfig,
) -> Result<SessionHandle, StartError> {
    let session = config.session(content, platform_ids)?;
    Ok(session.attach(config.driver(), config.attach.clone()))
}
