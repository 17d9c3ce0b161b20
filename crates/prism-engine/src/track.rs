//! Per-platform publish state.
//!
//! Mutators are crate-private: only the dispatcher moves a track, and every
//! mutator is a no-op once the track is terminal.

use bytes::Bytes;
use prism_core::{Platform, PlatformResult};
use serde::Serialize;
use tokio::time::Instant;

pub const STARTING_ACTION: &str = "Initializing...";
pub const COMPLETED_ACTION: &str = "Published successfully";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Idle,
    Starting,
    Active,
    Completed,
    Error,
}

impl TrackStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlatformTrack {
    platform: Platform,
    status: TrackStatus,
    progress: f64,
    current_action: String,
    preview_frame: Option<Bytes>,
    steps_seen: u32,
    total_steps: Option<u32>,
    error_count: u32,
    last_error: Option<String>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    report: Option<PlatformResult>,
}

/// Read-only copy of a track handed to observers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackSnapshot {
    pub platform: Platform,
    pub status: TrackStatus,
    pub progress: f64,
    pub current_action: String,
    #[serde(skip)]
    pub preview_frame: Option<Bytes>,
    pub steps_seen: u32,
    pub total_steps: Option<u32>,
    pub error_count: u32,
}

impl PlatformTrack {
    pub(crate) fn new(platform: Platform) -> Self {
        Self {
            platform,
            status: TrackStatus::Idle,
            progress: 0.0,
            current_action: String::new(),
            preview_frame: None,
            steps_seen: 0,
            total_steps: None,
            error_count: 0,
            last_error: None,
            started_at: None,
            finished_at: None,
            report: None,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn current_action(&self) -> &str {
        &self.current_action
    }

    pub fn preview_frame(&self) -> Option<&Bytes> {
        self.preview_frame.as_ref()
    }

    pub fn steps_seen(&self) -> u32 {
        self.steps_seen
    }

    pub fn total_steps(&self) -> Option<u32> {
        self.total_steps
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Result payload reported by the driver, if any.
    pub fn report(&self) -> Option<&PlatformResult> {
        self.report.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Seconds from first activity to the terminal transition.
    pub fn elapsed_secs(&self) -> Option<f64> {
        let start = self.started_at?;
        let end = self.finished_at?;
        Some(end.saturating_duration_since(start).as_secs_f64())
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            platform: self.platform,
            status: self.status,
            progress: self.progress,
            current_action: self.current_action.clone(),
            preview_frame: self.preview_frame.clone(),
            steps_seen: self.steps_seen,
            total_steps: self.total_steps,
            error_count: self.error_count,
        }
    }

    // ── Transitions (return whether anything changed) ──────────────

    pub(crate) fn set_starting(&mut self) -> bool {
        if self.status != TrackStatus::Idle {
            return false;
        }
        self.status = TrackStatus::Starting;
        self.current_action = STARTING_ACTION.to_owned();
        self.mark_started();
        true
    }

    pub(crate) fn apply_step(&mut self, step: u32, total_steps: u32, description: &str) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.activate();
        if total_steps > 0 {
            self.raise_progress(f64::from(step) / f64::from(total_steps) * 100.0);
            self.total_steps = Some(total_steps);
        }
        self.steps_seen = self.steps_seen.max(step);
        self.current_action = description.to_owned();
        true
    }

    pub(crate) fn apply_progress(&mut self, percent: f64, message: &str) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.activate();
        self.raise_progress(percent);
        if !message.is_empty() {
            self.current_action = message.to_owned();
        }
        true
    }

    pub(crate) fn set_action(&mut self, action: &str) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.current_action = action.to_owned();
        true
    }

    pub(crate) fn set_preview_frame(&mut self, frame: Bytes) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.preview_frame = Some(frame);
        true
    }

    pub(crate) fn complete(&mut self, report: Option<PlatformResult>) -> bool {
        if self.is_terminal() {
            self.attach_report(report);
            return false;
        }
        self.status = TrackStatus::Completed;
        self.progress = 100.0;
        self.current_action = COMPLETED_ACTION.to_owned();
        self.attach_report(report);
        self.mark_finished();
        true
    }

    pub(crate) fn fail(&mut self, reason: &str) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = TrackStatus::Error;
        self.current_action = format!("Error: {reason}");
        self.last_error = Some(reason.to_owned());
        self.mark_finished();
        true
    }

    /// Fail and keep the driver's report of the failure.
    pub(crate) fn fail_with_report(&mut self, reason: &str, report: Option<PlatformResult>) -> bool {
        let changed = self.fail(reason);
        self.attach_report(report);
        changed
    }

    /// Tally an error report. Counted even after the track is terminal.
    pub(crate) fn record_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    /// Keep the first report only; a late duplicate must not rewrite a finished result.
    fn attach_report(&mut self, report: Option<PlatformResult>) {
        if self.report.is_none() {
            self.report = report.filter(|r| r.platform == self.platform);
        }
    }

    fn activate(&mut self) {
        if matches!(self.status, TrackStatus::Idle | TrackStatus::Starting) {
            self.status = TrackStatus::Active;
            self.mark_started();
        }
    }

    fn raise_progress(&mut self, percent: f64) {
        let percent = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { 0.0 };
        if percent > self.progress {
            self.progress = percent;
        }
    }

    fn mark_started(&mut self) {
        self.started_at.get_or_insert_with(Instant::now);
    }

    fn mark_finished(&mut self) {
        self.mark_started();
        self.finished_at = Some(Instant::now());
    }
}
