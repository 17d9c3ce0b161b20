//! Session aggregator.
//!
//! A [`Session`] owns every track and the action log of one publish attempt.
//! [`Session::apply_event`] is the only way to mutate it; the session task in
//! [`crate::handle`] calls it in arrival order, so no locking is needed.

use std::sync::Arc;

use prism_core::{
    CompletionPolicy, ContentAdapter, DriverMode, Platform, PlatformResult, PublishEvent, SessionId,
    StartError,
};
use prism_telemetry::{names, MetricsRecorder};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dispatch::{self, Reduction};
use crate::error::SessionError;
use crate::log::ActionLog;
use crate::observer::SessionObservers;
use crate::track::{PlatformTrack, TrackSnapshot, TrackStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// At least one track is still running.
    Live,
    /// Every track is terminal.
    Resolved,
    /// The driver stopped before resolution.
    Stalled,
    /// The caller abandoned the session.
    Abandoned,
}

/// Point-in-time view of a session, published on every applied event.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub driver_mode: DriverMode,
    pub overall_progress: f64,
    pub tracks: Vec<TrackSnapshot>,
    pub log_len: usize,
    pub ignored_events: u64,
    pub phase: SessionPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<PlatformResult>>,
}

pub struct Session {
    id: SessionId,
    content: String,
    tracks: Vec<PlatformTrack>,
    log: ActionLog,
    overall_progress: f64,
    driver_mode: DriverMode,
    policy: CompletionPolicy,
    ignored_events: u64,
    resolution_announced: bool,
    observers: Arc<SessionObservers>,
    metrics: Option<Arc<MetricsRecorder>>,
    adapter: ContentAdapter,
}

impl Session {
    /// Validate the request and build an idle session, one track per platform id.
    pub fn start<S: AsRef<str>>(content: &str, platform_ids: &[S]) -> Result<Self, StartError> {
        Self::start_with_id(SessionId::new(), content, platform_ids)
    }

    /// Like [`Session::start`] with a caller-chosen id, used when a remote service
    /// already knows the session under that id.
    pub fn start_with_id<S: AsRef<str>>(
        id: SessionId,
        content: &str,
        platform_ids: &[S],
    ) -> Result<Self, StartError> {
        if content.trim().is_empty() {
            return Err(StartError::EmptyContent);
        }
        if platform_ids.is_empty() {
            return Err(StartError::NoPlatforms);
        }

        let mut platforms: Vec<Platform> = Vec::with_capacity(platform_ids.len());
        for raw in platform_ids {
            let platform: Platform = raw.as_ref().parse()?;
            if platforms.contains(&platform) {
                return Err(StartError::DuplicatePlatform(platform));
            }
            platforms.push(platform);
        }

        info!(
            session_id = %id,
            platforms = ?platforms.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            "session created"
        );

        Ok(Self {
            id,
            content: content.to_owned(),
            tracks: platforms.into_iter().map(PlatformTrack::new).collect(),
            log: ActionLog::default(),
            overall_progress: 0.0,
            driver_mode: DriverMode::default(),
            policy: CompletionPolicy::default(),
            ignored_events: 0,
            resolution_announced: false,
            observers: Arc::new(SessionObservers::default()),
            metrics: None,
            adapter: ContentAdapter,
        })
    }

    pub fn with_policy(mut self, policy: CompletionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub(crate) fn set_driver_mode(&mut self, mode: DriverMode) {
        self.driver_mode = mode;
    }

    pub(crate) fn metrics(&self) -> Option<&Arc<MetricsRecorder>> {
        self.metrics.as_ref()
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn driver_mode(&self) -> DriverMode {
        self.driver_mode
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.tracks.iter().map(PlatformTrack::platform).collect()
    }

    pub fn tracks(&self) -> &[PlatformTrack] {
        &self.tracks
    }

    pub fn track(&self, platform: Platform) -> Option<&PlatformTrack> {
        self.tracks.iter().find(|t| t.platform() == platform)
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// Completed tracks over all tracks, in percent. Failed tracks do not count.
    pub fn overall_progress(&self) -> f64 {
        self.overall_progress
    }

    /// Events dropped because they named a platform this session does not have.
    pub fn ignored_events(&self) -> u64 {
        self.ignored_events
    }

    pub fn observers(&self) -> &Arc<SessionObservers> {
        &self.observers
    }

    pub fn is_resolved(&self) -> bool {
        self.tracks.iter().all(PlatformTrack::is_terminal)
    }

    // ── Mutation ───────────────────────────────────────────────────

    pub fn apply_event(&mut self, event: &PublishEvent) -> Reduction {
        let log_before = self.log.len();
        let mut reduction = dispatch::apply(&mut self.tracks, &mut self.log, event, self.policy);

        if let Some(reason) = &reduction.ignored {
            self.ignored_events += 1;
            warn!(
                session_id = %self.id,
                event = event.event_type(),
                reason = reason.as_str(),
                target = event.target().unwrap_or_default(),
                "ignoring event"
            );
            if let Some(metrics) = &self.metrics {
                metrics.counter_inc(names::EVENTS_IGNORED, &[("reason", reason.as_str())], 1);
            }
            return reduction;
        }

        let before = self.overall_progress;
        self.overall_progress = self.completion_percent();
        debug_assert!(self.overall_progress >= before, "overall progress regressed");

        debug!(
            session_id = %self.id,
            event = event.event_type(),
            progress = self.overall_progress,
            "event applied"
        );
        if let Some(metrics) = &self.metrics {
            metrics.counter_inc(names::EVENTS_APPLIED, &[("kind", event.event_type())], 1);
        }

        for platform in &reduction.changed {
            if let Some(track) = self.track(*platform) {
                self.observers.tracks.publish(&track.snapshot());
            }
        }
        for entry in &self.log.entries()[log_before..] {
            self.observers.log.publish(entry);
        }
        self.observers.events.publish(event);

        if !self.resolution_announced && self.is_resolved() {
            self.resolution_announced = true;
            reduction.resolved = true;
            let results = self.project_results();
            self.record_resolution(&results);
            self.observers.resolved.publish(&results);
        }

        reduction
    }

    // ── Projection ─────────────────────────────────────────────────

    /// One result per requested platform, in request order.
    ///
    /// Calling this before the session resolves is a caller bug: it panics in
    /// debug builds and returns [`SessionError::Unresolved`] otherwise.
    pub fn snapshot_results(&self) -> Result<Vec<PlatformResult>, SessionError> {
        debug_assert!(self.is_resolved(), "snapshot_results called on a live session");
        if !self.is_resolved() {
            return Err(SessionError::Unresolved);
        }
        Ok(self.project_results())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let resolved = self.is_resolved();
        SessionSnapshot {
            session_id: self.id.clone(),
            driver_mode: self.driver_mode,
            overall_progress: self.overall_progress,
            tracks: self.tracks.iter().map(PlatformTrack::snapshot).collect(),
            log_len: self.log.len(),
            ignored_events: self.ignored_events,
            phase: if resolved { SessionPhase::Resolved } else { SessionPhase::Live },
            results: resolved.then(|| self.project_results()),
        }
    }

    fn completion_percent(&self) -> f64 {
        let completed = self
            .tracks
            .iter()
            .filter(|t| t.status() == TrackStatus::Completed)
            .count();
        completed as f64 / self.tracks.len() as f64 * 100.0
    }

    fn project_results(&self) -> Vec<PlatformResult> {
        self.tracks.iter().map(|t| self.project(t)).collect()
    }

    /// Merge what the driver reported with what the session observed.
    /// The track's status decides the outcome; report fields fill in details.
    fn project(&self, track: &PlatformTrack) -> PlatformResult {
        let platform = track.platform();
        let adapted = self.adapter.adapt(&self.content, platform);
        let report = track.report();
        let success = track.status() == TrackStatus::Completed;

        let final_content = report
            .map(|r| r.final_content.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or(adapted.text);

        let mut result = if success {
            let url = report
                .and_then(|r| r.external_url.clone())
                .unwrap_or_else(|| platform.home_url().to_owned());
            PlatformResult::success(platform, final_content, url)
        } else {
            PlatformResult::failed(platform, final_content)
        };

        result.hashtags = report
            .map(|r| r.hashtags.clone())
            .filter(|h| !h.is_empty())
            .unwrap_or(adapted.hashtags);
        result.insight = report
            .map(|r| r.insight.clone())
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| match track.last_error() {
                _ if success => format!(
                    "Published to {} with a {} tone",
                    platform.display_name(),
                    adapted.tone
                ),
                Some(reason) => format!("Publishing failed: {reason}"),
                None => "Publishing failed".to_owned(),
            });
        result.step_count = report
            .map(|r| r.step_count)
            .filter(|n| *n > 0)
            .unwrap_or(track.steps_seen());
        result.error_count = track.error_count();
        result.execution_time_secs = report
            .and_then(|r| r.execution_time_secs)
            .or_else(|| track.elapsed_secs());
        if success {
            result.engagement = report.and_then(|r| r.engagement.clone());
        }
        result
    }

    fn record_resolution(&self, results: &[PlatformResult]) {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            session_id = %self.id,
            succeeded,
            failed = results.len() - succeeded,
            "session resolved"
        );
        let Some(metrics) = &self.metrics else {
            return;
        };
        metrics.counter_inc(names::SESSIONS_RESOLVED, &[], 1);
        for result in results {
            if let Some(secs) = result.execution_time_secs {
                metrics.histogram_observe(
                    names::PLATFORM_EXECUTION_SECONDS,
                    &[("platform", result.platform.as_str())],
                    secs,
                );
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("driver_mode", &self.driver_mode)
            .field("policy", &self.policy)
            .field("overall_progress", &self.overall_progress)
            .field("tracks", &self.tracks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use prism_core::{Engagement, Outcome};

    use crate::log::LogKind;

    fn session(ids: &[&str]) -> Session {
        Session::start("Hello world", ids).unwrap()
    }

    #[test]
    fn start_creates_idle_tracks_in_request_order() {
        let s = session(&["instagram", "linkedin"]);
        assert_eq!(s.platforms(), vec![Platform::Instagram, Platform::LinkedIn]);
        assert!(s.tracks().iter().all(|t| t.status() == TrackStatus::Idle));
        assert_eq!(s.overall_progress(), 0.0);
        assert!(s.log().is_empty());
        assert!(!s.is_resolved());
    }

    #[test]
    fn start_rejects_bad_input() {
        assert_matches!(Session::start("", &["linkedin"]), Err(StartError::EmptyContent));
        assert_matches!(Session::start("   \n", &["linkedin"]), Err(StartError::EmptyContent));
        assert_matches!(Session::start::<&str>("x", &[]), Err(StartError::NoPlatforms));
        assert_matches!(
            Session::start("x", &["tiktok"]),
            Err(StartError::UnsupportedPlatform(p)) if p.0 == "tiktok"
        );
        assert_matches!(
            Session::start("x", &["twitter", "twitter"]),
            Err(StartError::DuplicatePlatform(Platform::Twitter))
        );
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(session(&["linkedin"]).id(), session(&["linkedin"]).id());
    }

    #[test]
    fn overall_progress_counts_completed_tracks_only() {
        let mut s = session(&["linkedin", "twitter"]);
        s.apply_event(&PublishEvent::step(Platform::LinkedIn, 8, 9, "Verify post was published"));
        assert_eq!(s.overall_progress(), 0.0);

        s.apply_event(&PublishEvent::error(Platform::Twitter, "rate limited"));
        assert_eq!(s.overall_progress(), 0.0);

        s.apply_event(&PublishEvent::completed(Platform::LinkedIn, None));
        assert_eq!(s.overall_progress(), 50.0);
        assert!(s.is_resolved());
    }

    #[test]
    fn unknown_platform_is_counted_and_nothing_else_changes() {
        let mut s = session(&["linkedin"]);
        let before = s.snapshot();
        let r = s.apply_event(&PublishEvent::error(Platform::Instagram, "x"));
        assert!(r.ignored.is_some());
        assert_eq!(s.ignored_events(), 1);
        let after = s.snapshot();
        assert_eq!(after.tracks, before.tracks);
        assert_eq!(after.log_len, 0);
    }

    #[test]
    fn observers_hear_tracks_log_and_resolution_once() {
        let mut s = session(&["linkedin"]);
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let resolutions = Arc::new(Mutex::new(Vec::new()));

        let st = statuses.clone();
        let _a = s.observers().tracks.subscribe(move |t| st.lock().push(t.status));
        let k = kinds.clone();
        let _b = s.observers().log.subscribe(move |e| k.lock().push(e.kind));
        let r = resolutions.clone();
        let _c = s.observers().resolved.subscribe(move |res| r.lock().push(res.len()));

        s.apply_event(&PublishEvent::started(Platform::LinkedIn));
        s.apply_event(&PublishEvent::step(Platform::LinkedIn, 1, 9, "Check current page state"));
        s.apply_event(&PublishEvent::completed(Platform::LinkedIn, None));
        s.apply_event(&PublishEvent::AllPlatformsCompleted {
            results: vec![],
            message: None,
        });

        assert_eq!(
            *statuses.lock(),
            vec![TrackStatus::Starting, TrackStatus::Active, TrackStatus::Completed]
        );
        assert_eq!(
            *kinds.lock(),
            vec![LogKind::Info, LogKind::Step, LogKind::Success, LogKind::Success]
        );
        assert_eq!(*resolutions.lock(), vec![1]);
    }

    #[test]
    fn summary_forces_remaining_tracks_and_yields_every_result() {
        let mut s = session(&["linkedin", "twitter", "instagram"]);
        s.apply_event(&PublishEvent::completed(Platform::Twitter, None));
        let r = s.apply_event(&PublishEvent::AllPlatformsCompleted {
            results: vec![],
            message: None,
        });
        assert!(r.resolved);
        assert_eq!(s.overall_progress(), 100.0);

        let results = s.snapshot_results().unwrap();
        let platforms: Vec<Platform> = results.iter().map(|r| r.platform).collect();
        assert_eq!(platforms, vec![Platform::LinkedIn, Platform::Twitter, Platform::Instagram]);
        assert!(results.iter().all(PlatformResult::is_success));
    }

    #[test]
    fn strict_policy_fails_silent_tracks() {
        let mut s = session(&["linkedin", "twitter"]).with_policy(CompletionPolicy::Strict);
        s.apply_event(&PublishEvent::completed(Platform::LinkedIn, None));
        s.apply_event(&PublishEvent::AllPlatformsCompleted {
            results: vec![],
            message: None,
        });
        let results = s.snapshot_results().unwrap();
        assert_eq!(results[0].outcome, Outcome::Success);
        assert_eq!(results[1].outcome, Outcome::Failed);
        assert_eq!(results[1].external_url, None);
        assert_eq!(results[1].insight, "Publishing failed: no completion reported");
    }

    #[test]
    fn projection_prefers_reported_fields() {
        let mut s = session(&["twitter"]);
        let mut report = PlatformResult::success(Platform::Twitter, "🔥 Hello world #trending #tech", "https://x.com/i/status/1");
        report.hashtags = vec!["trending".into()];
        report.insight = "Posted at peak hours".into();
        report.step_count = 9;
        report.execution_time_secs = Some(21.5);
        report.engagement = Some(Engagement {
            likes: Some(12),
            comments: Some(3),
            shares: Some(1),
        });
        s.apply_event(&PublishEvent::completed(Platform::Twitter, Some(report.clone())));

        let result = s.snapshot_results().unwrap().remove(0);
        assert_eq!(result, report);
    }

    #[test]
    fn projection_falls_back_to_adapter_and_observed_state() {
        let mut s = session(&["linkedin", "instagram"]);
        s.apply_event(&PublishEvent::step(Platform::LinkedIn, 3, 9, "Click on post composer"));
        s.apply_event(&PublishEvent::completed(Platform::LinkedIn, None));
        s.apply_event(&PublishEvent::error(Platform::Instagram, "upload rejected"));
        s.apply_event(&PublishEvent::error(Platform::Instagram, "upload rejected"));

        let results = s.snapshot_results().unwrap();
        let linkedin = &results[0];
        assert_eq!(linkedin.outcome, Outcome::Success);
        assert_eq!(linkedin.external_url.as_deref(), Some(Platform::LinkedIn.home_url()));
        assert!(linkedin.final_content.starts_with("🚀 Hello world"));
        assert_eq!(linkedin.hashtags.len(), 4);
        assert_eq!(linkedin.step_count, 3);
        assert_eq!(linkedin.error_count, 0);

        let instagram = &results[1];
        assert_eq!(instagram.outcome, Outcome::Failed);
        assert_eq!(instagram.external_url, None);
        assert_eq!(instagram.error_count, 2);
        assert_eq!(instagram.engagement, None);
        assert_eq!(instagram.insight, "Publishing failed: upload rejected");
    }

    #[test]
    fn snapshot_carries_results_only_when_resolved() {
        let mut s = session(&["linkedin"]);
        assert_eq!(s.snapshot().phase, SessionPhase::Live);
        assert!(s.snapshot().results.is_none());
        s.apply_event(&PublishEvent::completed(Platform::LinkedIn, None));
        let snap = s.snapshot();
        assert_eq!(snap.phase, SessionPhase::Resolved);
        assert_eq!(snap.results.map(|r| r.len()), Some(1));
    }

    #[test]
    fn metrics_record_applied_ignored_and_resolved() {
        let metrics = Arc::new(MetricsRecorder::new());
        let mut s = session(&["linkedin"]).with_metrics(metrics.clone());
        s.apply_event(&PublishEvent::step(Platform::LinkedIn, 1, 9, "Check current page state"));
        s.apply_event(&PublishEvent::step(Platform::Twitter, 1, 9, "Check current page state"));
        s.apply_event(&PublishEvent::completed(Platform::LinkedIn, None));

        assert_eq!(metrics.counter_get(names::EVENTS_APPLIED, &[("kind", "agent_step")]), 1);
        assert_eq!(metrics.counter_get(names::EVENTS_IGNORED, &[("reason", "not_in_session")]), 1);
        assert_eq!(metrics.counter_get(names::SESSIONS_RESOLVED, &[]), 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "snapshot_results called on a live session")]
    fn snapshot_results_before_resolution_panics_in_debug() {
        let s = session(&["linkedin"]);
        let _ = s.snapshot_results();
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn snapshot_results_before_resolution_errors_in_release() {
        let s = session(&["linkedin"]);
        assert_matches!(s.snapshot_results(), Err(SessionError::Unresolved));
    }
}
