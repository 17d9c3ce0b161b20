use serde::{Deserialize, Serialize};

use crate::platform::Platform;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed,
}

/// Post engagement as reported by the platform. Which counters exist depends on the platform.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<u64>,
}

/// Terminal projection of one platform track.
///
/// `external_url` is set exactly when `outcome` is [`Outcome::Success`]; build values
/// through [`PlatformResult::success`] and [`PlatformResult::failed`] to keep it that way.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlatformResult {
    pub platform: Platform,
    pub final_content: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default)]
    pub insight: String,
    #[serde(default)]
    pub step_count: u32,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement: Option<Engagement>,
}

impl PlatformResult {
    pub fn success(platform: Platform, final_content: impl Into<String>, external_url: impl Into<String>) -> Self {
        Self {
            platform,
            final_content: final_content.into(),
            hashtags: Vec::new(),
            outcome: Outcome::Success,
            external_url: Some(external_url.into()),
            insight: String::new(),
            step_count: 0,
            error_count: 0,
            execution_time_secs: None,
            engagement: None,
        }
    }

    pub fn failed(platform: Platform, final_content: impl Into<String>) -> Self {
        Self {
            platform,
            final_content: final_content.into(),
            hashtags: Vec::new(),
            outcome: Outcome::Failed,
            external_url: None,
            insight: String::new(),
            step_count: 0,
            error_count: 0,
            execution_time_secs: None,
            engagement: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// Per-platform outcome in the flat shape some publishers send:
/// `{ success, content, post_url, execution_time, steps_taken, error_message }`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct FlatReport {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub post_url: Option<String>,
    #[serde(default)]
    pub execution_time: Option<f64>,
    #[serde(default)]
    pub steps_taken: Option<u32>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl FlatReport {
    /// Lift into a [`PlatformResult`]. A success without a post URL points at the platform's home page.
    pub fn into_result(self, platform: Platform) -> PlatformResult {
        let content = self.content.unwrap_or_default();
        let mut result = if self.success {
            let url = self
                .post_url
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| platform.home_url().to_owned());
            PlatformResult::success(platform, content, url)
        } else {
            let mut failed = PlatformResult::failed(platform, content);
            if let Some(reason) = self.error_message.filter(|m| !m.is_empty()) {
                failed.insight = format!("Publishing failed: {reason}");
            }
            failed
        };
        result.step_count = self.steps_taken.unwrap_or(0);
        result.execution_time_secs = self.execution_time.filter(|t| *t > 0.0);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_carries_url() {
        let r = PlatformResult::success(Platform::Twitter, "hi", "https://x.com/i/status/1");
        assert!(r.is_success());
        assert_eq!(r.external_url.as_deref(), Some("https://x.com/i/status/1"));
    }

    #[test]
    fn failed_has_no_url() {
        let r = PlatformResult::failed(Platform::Instagram, "hi");
        assert!(!r.is_success());
        assert!(r.external_url.is_none());
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert!(json.get("external_url").is_none());
    }

    #[test]
    fn flat_failure_has_no_url_and_keeps_the_reason() {
        let flat: FlatReport =
            serde_json::from_str(r#"{"success":false,"error_message":"Share button missing","post_url":null}"#).unwrap();
        let r = flat.into_result(Platform::Instagram);
        assert_eq!(r.outcome, Outcome::Failed);
        assert!(r.external_url.is_none());
        assert_eq!(r.insight, "Publishing failed: Share button missing");
    }

    #[test]
    fn flat_success_without_url_uses_home_page() {
        let flat: FlatReport = serde_json::from_str(r#"{"success":true,"execution_time":0,"steps_taken":7}"#).unwrap();
        let r = flat.into_result(Platform::Twitter);
        assert!(r.is_success());
        assert_eq!(r.external_url.as_deref(), Some(Platform::Twitter.home_url()));
        assert_eq!(r.step_count, 7);
        assert_eq!(r.execution_time_secs, None);
    }

    #[test]
    fn deserializes_sparse_payload() {
        let json = r#"{"platform":"linkedin","final_content":"x","outcome":"success","external_url":"u"}"#;
        let r: PlatformResult = serde_json::from_str(json).unwrap();
        assert_eq!(r.platform, Platform::LinkedIn);
        assert!(r.hashtags.is_empty());
        assert_eq!(r.step_count, 0);
        assert!(r.engagement.is_none());
    }
}
