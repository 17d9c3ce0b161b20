//! The reducer: applies one [`PublishEvent`] to a session's tracks and log.
//!
//! Total and panic-free. An event that cannot be routed leaves every track and
//! the log untouched and comes back as [`Reduction::ignored`].

use prism_core::{CompletionPolicy, Outcome, Platform, PlatformResult, PublishEvent};

use crate::log::{ActionLog, LogKind};
use crate::track::PlatformTrack;

const NO_COMPLETION_REASON: &str = "no completion reported";
const SUMMARY_FAILURE_REASON: &str = "reported failed by summary";
const REPORTED_FAILURE_REASON: &str = "publisher reported failure";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not a platform id at all.
    UnknownPlatform(String),
    /// A real platform that this session did not request.
    NotInSession(Platform),
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownPlatform(_) => "unknown_platform",
            Self::NotInSession(_) => "not_in_session",
        }
    }
}

/// What one event did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reduction {
    /// Tracks whose state changed, in session order.
    pub changed: Vec<Platform>,
    /// Number of log entries appended.
    pub appended: usize,
    pub ignored: Option<IgnoreReason>,
    /// Set by the session when this event made it resolve.
    pub resolved: bool,
}

pub fn apply(
    tracks: &mut [PlatformTrack],
    log: &mut ActionLog,
    event: &PublishEvent,
    policy: CompletionPolicy,
) -> Reduction {
    let log_before = log.len();
    let mut reduction = Reduction::default();

    match event {
        PublishEvent::AgentThinking { platform, thinking } => {
            let label = platform.as_deref().and_then(|p| p.parse::<Platform>().ok());
            log.append(LogKind::Thinking, label, thinking.clone());
        }

        PublishEvent::AllPlatformsCompleted { results, message } => {
            for track in tracks.iter_mut() {
                if resolve_from_summary(track, results, policy) {
                    reduction.changed.push(track.platform());
                }
            }
            let ok = tracks.iter().filter(|t| t.status() == crate::track::TrackStatus::Completed).count();
            let summary = message
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("All platforms completed: {ok}/{} successful", tracks.len()));
            log.append(LogKind::Success, None, summary);
        }

        PublishEvent::ConnectionStatus { connected, message } => {
            if *connected {
                let text = if message.is_empty() { "Connected to event stream" } else { message };
                log.append(LogKind::Info, None, text);
            } else {
                log.append(LogKind::Error, None, format!("Disconnected: {message}"));
            }
        }

        routed => {
            let Some(id) = routed.target() else {
                return reduction;
            };
            let track = match route(tracks, id) {
                Ok(track) => track,
                Err(reason) => {
                    reduction.ignored = Some(reason);
                    return reduction;
                }
            };
            let platform = track.platform();
            let changed = apply_routed(track, log, routed);
            if changed {
                reduction.changed.push(platform);
            }
        }
    }

    reduction.appended = log.len() - log_before;
    reduction
}

fn route<'a>(tracks: &'a mut [PlatformTrack], id: &str) -> Result<&'a mut PlatformTrack, IgnoreReason> {
    let platform: Platform = id
        .parse()
        .map_err(|_| IgnoreReason::UnknownPlatform(id.to_owned()))?;
    tracks
        .iter_mut()
        .find(|t| t.platform() == platform)
        .ok_or(IgnoreReason::NotInSession(platform))
}

fn apply_routed(track: &mut PlatformTrack, log: &mut ActionLog, event: &PublishEvent) -> bool {
    let platform = track.platform();
    let name = platform.display_name();
    match event {
        PublishEvent::PlatformStarted { message, .. } => {
            let changed = track.set_starting();
            if let Some(message) = message.as_deref().filter(|m| !m.is_empty()) {
                log.append(LogKind::Info, Some(platform), message);
            }
            changed
        }
        PublishEvent::AgentStep {
            step,
            total_steps,
            description,
            ..
        } => {
            log.append(
                LogKind::Step,
                Some(platform),
                format!("[{name}] Step {step}/{total_steps}: {description}"),
            );
            track.apply_step(*step, *total_steps, description)
        }
        PublishEvent::AgentProgress { progress, message, .. } => {
            if !message.is_empty() {
                log.append(LogKind::Info, Some(platform), format!("[{name}] {message}"));
            }
            track.apply_progress(*progress, message)
        }
        PublishEvent::AgentAction { action, .. } => {
            log.append(LogKind::Action, Some(platform), format!("[{name}] {action}"));
            track.set_action(action)
        }
        PublishEvent::VideoFrame { frame, .. } => track.set_preview_frame(frame.clone()),
        PublishEvent::PlatformCompleted { .. } => {
            let report = event.completion_report(platform);
            if track.is_terminal() {
                // late report: attach the first one, say nothing
                return track.complete(report);
            }
            if report.as_ref().is_some_and(|r| !r.is_success()) {
                log.append(LogKind::Error, Some(platform), format!("{name} publishing failed"));
                track.fail_with_report(REPORTED_FAILURE_REASON, report)
            } else {
                log.append(LogKind::Success, Some(platform), format!("{name} published successfully"));
                track.complete(report)
            }
        }
        PublishEvent::AgentError { error, .. } => {
            log.append(LogKind::Error, Some(platform), format!("[{name}] Error: {error}"));
            track.record_error();
            track.fail(error);
            // the tally always moves, so observers hear about every error
            true
        }
        PublishEvent::AgentThinking { .. }
        | PublishEvent::AllPlatformsCompleted { .. }
        | PublishEvent::ConnectionStatus { .. } => false,
    }
}

/// Settle one track on the summary event. Returns whether it changed.
fn resolve_from_summary(track: &mut PlatformTrack, results: &[PlatformResult], policy: CompletionPolicy) -> bool {
    let reported = results.iter().find(|r| r.platform == track.platform()).cloned();
    if track.is_terminal() {
        // only fills in a missing report
        track.complete(reported);
        return false;
    }
    match policy {
        CompletionPolicy::Strict => track.fail(NO_COMPLETION_REASON),
        CompletionPolicy::Lenient => match reported {
            Some(r) if r.outcome == Outcome::Failed => track.fail_with_report(SUMMARY_FAILURE_REASON, Some(r)),
            reported => track.complete(reported),
        },
    }
}
