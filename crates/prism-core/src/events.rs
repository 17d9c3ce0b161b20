use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};

use crate::platform::Platform;
use crate::results::{FlatReport, PlatformResult};

/// Names of every event a driver may emit, in wire spelling.
pub const EVENT_NAMES: &[&str] = &[
    "platform_started",
    "agent_step",
    "agent_progress",
    "agent_thinking",
    "agent_action",
    "video_frame",
    "platform_completed",
    "agent_error",
    "all_platforms_completed",
    "connection_status",
];

/// Progress events produced by a driver and reduced into session state.
///
/// Platform ids stay as raw strings: a stale or foreign id must reach the dispatcher
/// so it can be counted and ignored instead of failing decode of the whole frame.
/// Field names are the wire field names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PublishEvent {
    #[serde(rename = "platform_started")]
    PlatformStarted {
        platform: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    #[serde(rename = "agent_step")]
    AgentStep {
        platform: String,
        step: u32,
        total_steps: u32,
        description: String,
    },

    #[serde(rename = "agent_progress")]
    AgentProgress {
        platform: String,
        progress: f64,
        #[serde(default)]
        message: String,
    },

    /// Log only. `platform` labels the entry and is never used for routing.
    #[serde(rename = "agent_thinking")]
    AgentThinking {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        platform: Option<String>,
        thinking: String,
    },

    #[serde(rename = "agent_action")]
    AgentAction { platform: String, action: String },

    #[serde(rename = "video_frame")]
    VideoFrame {
        platform: String,
        #[serde(rename = "data", with = "crate::wire::base64_frame")]
        frame: Bytes,
    },

    /// `success: false` marks the platform failed. The flat `post_url` and
    /// `execution_time` fields stand in for `result` when a publisher sends no report.
    #[serde(rename = "platform_completed")]
    PlatformCompleted {
        platform: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        post_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_time: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<PlatformResult>,
    },

    #[serde(rename = "agent_error")]
    AgentError { platform: String, error: String },

    #[serde(rename = "all_platforms_completed")]
    AllPlatformsCompleted {
        #[serde(default, deserialize_with = "summary_results")]
        results: Vec<PlatformResult>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Transport state of the remote channel. Emitted by drivers, never by the publisher.
    #[serde(rename = "connection_status")]
    ConnectionStatus {
        connected: bool,
        #[serde(default)]
        message: String,
    },
}

impl PublishEvent {
    pub fn started(platform: Platform) -> Self {
        Self::PlatformStarted {
            platform: platform.as_str().to_owned(),
            message: Some(format!("Starting {} publishing", platform.display_name())),
        }
    }

    pub fn step(platform: Platform, step: u32, total_steps: u32, description: impl Into<String>) -> Self {
        Self::AgentStep {
            platform: platform.as_str().to_owned(),
            step,
            total_steps,
            description: description.into(),
        }
    }

    pub fn completed(platform: Platform, result: Option<PlatformResult>) -> Self {
        Self::PlatformCompleted {
            platform: platform.as_str().to_owned(),
            success: None,
            post_url: None,
            execution_time: None,
            result,
        }
    }

    /// The completion report carried by a `platform_completed`, with the flat
    /// fields lifted into a result when no full report was sent.
    pub fn completion_report(&self, platform: Platform) -> Option<PlatformResult> {
        let Self::PlatformCompleted {
            success,
            post_url,
            execution_time,
            result,
            ..
        } = self
        else {
            return None;
        };
        if let Some(result) = result {
            let mut result = result.clone();
            if *success == Some(false) && result.is_success() {
                result = PlatformResult::failed(platform, result.final_content);
            }
            return Some(result);
        }
        if success.is_none() && post_url.is_none() && execution_time.is_none() {
            return None;
        }
        let flat = FlatReport {
            success: success.unwrap_or(true),
            post_url: post_url.clone(),
            execution_time: *execution_time,
            ..FlatReport::default()
        };
        Some(flat.into_result(platform))
    }

    pub fn error(platform: Platform, error: impl Into<String>) -> Self {
        Self::AgentError {
            platform: platform.as_str().to_owned(),
            error: error.into(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PlatformStarted { .. } => "platform_started",
            Self::AgentStep { .. } => "agent_step",
            Self::AgentProgress { .. } => "agent_progress",
            Self::AgentThinking { .. } => "agent_thinking",
            Self::AgentAction { .. } => "agent_action",
            Self::VideoFrame { .. } => "video_frame",
            Self::PlatformCompleted { .. } => "platform_completed",
            Self::AgentError { .. } => "agent_error",
            Self::AllPlatformsCompleted { .. } => "all_platforms_completed",
            Self::ConnectionStatus { .. } => "connection_status",
        }
    }

    /// The platform id this event is routed to, if it targets a single track.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::PlatformStarted { platform, .. }
            | Self::AgentStep { platform, .. }
            | Self::AgentProgress { platform, .. }
            | Self::AgentAction { platform, .. }
            | Self::VideoFrame { platform, .. }
            | Self::PlatformCompleted { platform, .. }
            | Self::AgentError { platform, .. } => Some(platform),
            Self::AgentThinking { .. }
            | Self::AllPlatformsCompleted { .. }
            | Self::ConnectionStatus { .. } => None,
        }
    }
}

/// Summary results arrive either as a list of reports or keyed by platform id
/// under `platforms`. Keyed entries for ids outside the platform set are dropped.
fn summary_results<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<PlatformResult>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        List(Vec<PlatformResult>),
        Keyed { platforms: BTreeMap<String, FlatReport> },
    }

    Ok(match Option::<Shape>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Shape::List(results)) => results,
        Some(Shape::Keyed { platforms }) => platforms
            .into_iter()
            .filter_map(|(id, report)| id.parse::<Platform>().ok().map(|p| report.into_result(p)))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_serde_tag() {
        let events = vec![
            PublishEvent::started(Platform::LinkedIn),
            PublishEvent::step(Platform::Twitter, 1, 9, "Check current page state"),
            PublishEvent::AgentThinking {
                platform: None,
                thinking: "hmm".into(),
            },
            PublishEvent::VideoFrame {
                platform: "instagram".into(),
                frame: Bytes::from_static(b"\x89PNG"),
            },
            PublishEvent::AllPlatformsCompleted {
                results: vec![],
                message: None,
            },
        ];
        for evt in &events {
            let json = serde_json::to_value(evt).unwrap();
            assert_eq!(json["type"], evt.event_type());
            assert!(EVENT_NAMES.contains(&evt.event_type()));
        }
    }

    #[test]
    fn target_of_routed_and_session_wide_events() {
        assert_eq!(PublishEvent::error(Platform::Instagram, "boom").target(), Some("instagram"));
        let summary = PublishEvent::AllPlatformsCompleted {
            results: vec![],
            message: None,
        };
        assert_eq!(summary.target(), None);
        let thinking = PublishEvent::AgentThinking {
            platform: Some("linkedin".into()),
            thinking: "x".into(),
        };
        assert_eq!(thinking.target(), None);
    }

    #[test]
    fn video_frame_is_base64_on_the_wire() {
        let evt = PublishEvent::VideoFrame {
            platform: "twitter".into(),
            frame: Bytes::from_static(b"abc"),
        };
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["data"], "YWJj");
        let back: PublishEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, evt);
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let json = r#"{"type":"agent_step","platform":"twitter","step":2,"total_steps":9,"description":"Find tweet composer","step_type":"find"}"#;
        let evt: PublishEvent = serde_json::from_str(json).unwrap();
        assert_eq!(evt, PublishEvent::step(Platform::Twitter, 2, 9, "Find tweet composer"));
    }
}
