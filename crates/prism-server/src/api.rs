//! HTTP request and response bodies.

use prism_core::{AdaptedContent, Platform, SessionId};
use serde::{Deserialize, Serialize};

/// Response envelope shared by every `/api` route:
/// `{ success, data?, error? }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T = serde_json::Value> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn all_platform_ids() -> Vec<String> {
    Platform::ALL.iter().map(|p| p.as_str().to_owned()).collect()
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default = "all_platform_ids")]
    pub platforms: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewData {
    pub original: String,
    pub adaptations: Vec<AdaptedContent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default = "all_platform_ids")]
    pub platforms: Vec<String>,
    /// Subscribers join this id before publishing; a fresh one is minted when absent.
    #[serde(default, alias = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishAccepted {
    pub session_id: SessionId,
    pub platforms: Vec<Platform>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortData {
    pub session_id: String,
    pub aborted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_omits_error() {
        let json = serde_json::to_value(ApiResponse::ok(serde_json::json!({"x": 1}))).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["x"], 1);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn error_envelope_omits_data() {
        let json = serde_json::to_value(ApiResponse::<()>::error("Content cannot be empty")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Content cannot be empty");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn publish_request_defaults_to_every_platform() {
        let req: PublishRequest = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(req.platforms, vec!["linkedin", "twitter", "instagram"]);
        assert!(req.session_id.is_none());
    }

    #[test]
    fn publish_request_accepts_either_session_id_spelling() {
        let a: PublishRequest = serde_json::from_str(r#"{"content":"hi","session_id":"s1"}"#).unwrap();
        let b: PublishRequest = serde_json::from_str(r#"{"content":"hi","sessionId":"s1"}"#).unwrap();
        assert_eq!(a.session_id.as_deref(), Some("s1"));
        assert_eq!(b.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn accepted_body_is_camel_case() {
        let body = PublishAccepted {
            session_id: SessionId::from_raw("s1"),
            platforms: vec![Platform::Twitter],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"sessionId": "s1", "platforms": ["twitter"]}));
    }
}
