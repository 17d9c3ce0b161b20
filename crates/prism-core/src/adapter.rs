//! Template-based content adaptation.
//!
//! Produces each platform's post text and hashtag set from the user's content.
//! The output always fits the platform's character and hashtag limits.

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

const TWITTER_BODY_CHARS: usize = 220;
const ELLIPSIS: &str = "...";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptedContent {
    pub platform: Platform,
    pub text: String,
    pub hashtags: Vec<String>,
    pub tone: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ContentAdapter;

impl ContentAdapter {
    pub fn adapt(&self, content: &str, platform: Platform) -> AdaptedContent {
        let content = content.trim();
        let (text, hashtags, tone) = match platform {
            Platform::LinkedIn => {
                let suffix = "\n\nWhat are your professional thoughts on this?";
                let body = truncate(content, budget(platform, "🚀 ", suffix));
                (
                    format!("🚀 {body}{suffix}"),
                    tags(&["professional", "business", "networking", "innovation"]),
                    "professional",
                )
            }
            Platform::Twitter => {
                let body = if content.chars().count() > TWITTER_BODY_CHARS {
                    let mut cut: String = content.chars().take(TWITTER_BODY_CHARS).collect();
                    cut.push_str(ELLIPSIS);
                    cut
                } else {
                    content.to_owned()
                };
                (format!("🔥 {body} #trending #tech"), tags(&["trending", "tech"]), "conversational")
            }
            Platform::Instagram => {
                let suffix = " ✨\n\nWhat inspires you? 💫";
                let body = truncate(content, budget(platform, "✨ ", suffix));
                (
                    format!("✨ {body}{suffix}"),
                    tags(&["inspiration", "aesthetic", "lifestyle", "community", "vibes"]),
                    "inspirational",
                )
            }
        };
        let mut hashtags = hashtags;
        hashtags.truncate(platform.max_hashtags());
        AdaptedContent {
            platform,
            text,
            hashtags,
            tone: tone.to_owned(),
        }
    }

    pub fn adapt_all(&self, content: &str, platforms: &[Platform]) -> Vec<AdaptedContent> {
        platforms.iter().map(|p| self.adapt(content, *p)).collect()
    }
}

/// Characters left for the body once the template's fixed parts are counted.
fn budget(platform: Platform, prefix: &str, suffix: &str) -> usize {
    platform
        .max_characters()
        .saturating_sub(prefix.chars().count() + suffix.chars().count())
}

/// Cut to at most `max` characters, ending in `...` when anything was dropped.
fn truncate(content: &str, max: usize) -> String {
    if content.chars().count() <= max {
        return content.to_owned();
    }
    let keep = max.saturating_sub(ELLIPSIS.len());
    let mut out: String = content.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

fn tags(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_owned()).collect()
}
