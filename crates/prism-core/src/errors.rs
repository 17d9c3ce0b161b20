use crate::platform::{Platform, UnsupportedPlatform};

/// Reasons a publish request is refused before any session exists.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("Content cannot be empty")]
    EmptyContent,
    #[error("At least one platform must be selected")]
    NoPlatforms,
    #[error(transparent)]
    UnsupportedPlatform(#[from] UnsupportedPlatform),
    #[error("platform listed more than once: {0}")]
    DuplicatePlatform(Platform),
}

impl StartError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::EmptyContent => "empty_content",
            Self::NoPlatforms => "no_platforms",
            Self::UnsupportedPlatform(_) => "unsupported_platform",
            Self::DuplicatePlatform(_) => "duplicate_platform",
        }
    }
}

/// Failure to decode a frame from the event channel.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_api_responses() {
        assert_eq!(StartError::EmptyContent.to_string(), "Content cannot be empty");
        assert_eq!(StartError::NoPlatforms.to_string(), "At least one platform must be selected");
    }

    #[test]
    fn unsupported_platform_converts() {
        let err: StartError = UnsupportedPlatform("tiktok".into()).into();
        assert_eq!(err.error_kind(), "unsupported_platform");
        assert_eq!(err.to_string(), "unsupported platform: tiktok");
    }
}
