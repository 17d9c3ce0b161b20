//! Settings types. Every struct is `camelCase` on disk and fully defaulted,
//! so a partial user file only needs the keys it changes.

mod engine;
mod server;

pub use engine::{RemoteSettings, SessionSettings, SimulationSettings};
pub use server::{LoggingSettings, ServerSettings};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrismSettings {
    pub session: SessionSettings,
    pub simulation: SimulationSettings,
    pub remote: RemoteSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

impl PrismSettings {
    /// Reject combinations that deserialize fine but cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.simulation.min_step_delay_ms > self.simulation.max_step_delay_ms {
            return Err(SettingsError::InvalidValue(format!(
                "simulation.minStepDelayMs ({}) exceeds maxStepDelayMs ({})",
                self.simulation.min_step_delay_ms, self.simulation.max_step_delay_ms
            )));
        }
        if self.remote.connect_attempts == 0 {
            return Err(SettingsError::InvalidValue("remote.connectAttempts must be at least 1".into()));
        }
        if self.server.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue("server.maxSendQueue must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(PrismSettings::default()).unwrap();
        assert_eq!(json["session"]["driverMode"], "local_simulation");
        assert_eq!(json["simulation"]["maxStepDelayMs"], 2000);
        assert_eq!(json["remote"]["attemptTimeoutMs"], 30_000);
        assert_eq!(json["server"]["maxSendQueue"], 256);
    }

    #[test]
    fn inverted_delay_range_is_rejected() {
        let mut settings = PrismSettings::default();
        settings.simulation.min_step_delay_ms = 3000;
        assert!(matches!(settings.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn zero_connect_attempts_is_rejected() {
        let mut settings = PrismSettings::default();
        settings.remote.connect_attempts = 0;
        assert!(settings.validate().is_err());
    }
}
