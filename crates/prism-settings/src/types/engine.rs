use std::time::Duration;

use prism_core::{CompletionPolicy, DriverMode};
use serde::{Deserialize, Serialize};

/// Session-level policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Driver attached to new sessions. `local_simulation` is demo mode.
    pub driver_mode: DriverMode,
    /// Treatment of platforms the summary event covers without an individual completion.
    pub completion_policy: CompletionPolicy,
    /// How long a resolved session waits for its driver to stop on its own.
    pub detach_grace_ms: u64,
    /// Capacity of the driver → session event queue.
    pub event_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            driver_mode: DriverMode::LocalSimulation,
            completion_policy: CompletionPolicy::Lenient,
            detach_grace_ms: 3_000,
            event_buffer: 256,
        }
    }
}

impl SessionSettings {
    pub fn detach_grace(&self) -> Duration {
        Duration::from_millis(self.detach_grace_ms)
    }
}

/// Local simulation timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationSettings {
    pub min_step_delay_ms: u64,
    pub max_step_delay_ms: u64,
    /// Delay between consecutive platforms' start events.
    pub stagger_ms: u64,
    /// Fixed RNG seed for reproducible runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            min_step_delay_ms: 600,
            max_step_delay_ms: 2_000,
            stagger_ms: 300,
            seed: None,
        }
    }
}

/// Remote event channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteSettings {
    /// Websocket endpoint of the event stream.
    pub url: String,
    /// HTTP base URL of the publishing service.
    pub api_url: String,
    pub connect_attempts: u32,
    /// Per-attempt timeout; long enough for a cold-starting service.
    pub attempt_timeout_ms: u64,
    pub retry_delay_ms: u64,
    /// Time to keep reading after `all_platforms_completed` before closing.
    pub drain_grace_ms: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".to_string(),
            api_url: "http://127.0.0.1:8080".to_string(),
            connect_attempts: 3,
            attempt_timeout_ms: 30_000,
            retry_delay_ms: 1_000,
            drain_grace_ms: 2_000,
        }
    }
}
