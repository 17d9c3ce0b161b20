use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which driver feeds a session. Fixed at session start.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverMode {
    /// Demo mode: timed events generated in-process.
    #[default]
    LocalSimulation,
    /// Events streamed from a remote publishing service.
    RemoteChannel,
}

impl DriverMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalSimulation => "local_simulation",
            Self::RemoteChannel => "remote_channel",
        }
    }
}

impl fmt::Display for DriverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local_simulation" | "local" | "simulation" | "demo" => Ok(Self::LocalSimulation),
            "remote_channel" | "remote" => Ok(Self::RemoteChannel),
            other => Err(format!("unknown driver mode: {other}")),
        }
    }
}

/// How `all_platforms_completed` treats platforms that never reported their own completion.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Trust the summary: silent platforms are marked completed unless the summary
    /// carries a failed result for them.
    #[default]
    Lenient,
    /// Require individual completions: silent platforms are marked failed.
    Strict,
}

impl CompletionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lenient => "lenient",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for CompletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown completion policy: {other}")),
        }
    }
}
