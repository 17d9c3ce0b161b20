//! The closed set of publishing destinations.
//!
//! Every per-platform attribute is a total `match`, so adding a destination is a
//! single enum variant plus whatever arms the compiler then asks for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    LinkedIn,
    Twitter,
    Instagram,
}

/// Rejected platform id, carrying the id as received.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unsupported platform: {0}")]
pub struct UnsupportedPlatform(pub String);

const LINKEDIN_STEPS: &[&str] = &[
    "Check current page state",
    "Find LinkedIn post composer",
    "Click on post composer",
    "Verify composer is focused",
    "Type content",
    "Verify content was typed",
    "Find Post button",
    "Click Post button",
    "Verify post was published",
];

const TWITTER_STEPS: &[&str] = &[
    "Check current page state",
    "Find tweet composer",
    "Click on tweet composer",
    "Verify composer is focused",
    "Type content",
    "Verify content was typed",
    "Find POST button",
    "Click POST button",
    "Verify tweet was posted",
];

const INSTAGRAM_STEPS: &[&str] = &[
    "Check current page state",
    "Find Create button",
    "Click Create button",
    "Select post type",
    "Add content",
    "Find Share button",
    "Click Share button",
    "Verify post was shared",
];

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::LinkedIn, Platform::Twitter, Platform::Instagram];

    /// Wire identifier, e.g. `"linkedin"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinkedIn => "linkedin",
            Self::Twitter => "twitter",
            Self::Instagram => "instagram",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::LinkedIn => "LinkedIn",
            Self::Twitter => "Twitter/X",
            Self::Instagram => "Instagram",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::LinkedIn => "💼",
            Self::Twitter => "🐦",
            Self::Instagram => "📸",
        }
    }

    /// Brand color as a CSS hex string.
    pub fn color(self) -> &'static str {
        match self {
            Self::LinkedIn => "#0A66C2",
            Self::Twitter => "#1DA1F2",
            Self::Instagram => "#E4405F",
        }
    }

    /// Ordered automation steps played for this platform.
    pub fn steps(self) -> &'static [&'static str] {
        match self {
            Self::LinkedIn => LINKEDIN_STEPS,
            Self::Twitter => TWITTER_STEPS,
            Self::Instagram => INSTAGRAM_STEPS,
        }
    }

    pub fn max_characters(self) -> usize {
        match self {
            Self::LinkedIn => 3000,
            Self::Twitter => 280,
            Self::Instagram => 2200,
        }
    }

    pub fn max_hashtags(self) -> usize {
        match self {
            Self::LinkedIn => 5,
            Self::Twitter => 3,
            Self::Instagram => 30,
        }
    }

    /// Landing URL used when a successful publish reported no post URL.
    pub fn home_url(self) -> &'static str {
        match self {
            Self::LinkedIn => "https://www.linkedin.com/feed/",
            Self::Twitter => "https://x.com/home",
            Self::Instagram => "https://www.instagram.com/",
        }
    }

    /// Whether the platform exposes a share/repost count.
    pub fn reports_shares(self) -> bool {
        match self {
            Self::LinkedIn | Self::Twitter => true,
            Self::Instagram => false,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnsupportedPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linkedin" => Ok(Self::LinkedIn),
            "twitter" => Ok(Self::Twitter),
            "instagram" => Ok(Self::Instagram),
            other => Err(UnsupportedPlatform(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_ids() {
        for p in Platform::ALL {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
    }

    #[test]
    fn rejects_unsupported_id() {
        let err = "tiktok".parse::<Platform>().unwrap_err();
        assert_eq!(err, UnsupportedPlatform("tiktok".into()));
        assert_eq!(err.to_string(), "unsupported platform: tiktok");
    }

    #[test]
    fn ids_are_case_sensitive() {
        assert!("LinkedIn".parse::<Platform>().is_err());
    }

    #[test]
    fn step_list_lengths() {
        assert_eq!(Platform::LinkedIn.steps().len(), 9);
        assert_eq!(Platform::Twitter.steps().len(), 9);
        assert_eq!(Platform::Instagram.steps().len(), 8);
    }

    #[test]
    fn serde_uses_wire_id() {
        assert_eq!(serde_json::to_string(&Platform::LinkedIn).unwrap(), "\"linkedin\"");
        let p: Platform = serde_json::from_str("\"instagram\"").unwrap();
        assert_eq!(p, Platform::Instagram);
    }

    #[test]
    fn display_matches_wire_id() {
        assert_eq!(Platform::Twitter.to_string(), "twitter");
        assert_eq!(Platform::Twitter.display_name(), "Twitter/X");
    }
}
