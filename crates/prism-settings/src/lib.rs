//! # prism-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`PrismSettings::default()`]
//! 2. **User file**: `~/.prism/settings.json` or `$PRISM_SETTINGS` (deep-merged over defaults)
//! 3. **Environment variables**: `PRISM_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::{CompletionPolicy, DriverMode};

    #[test]
    fn default_settings_are_valid() {
        let settings = PrismSettings::default();
        assert_eq!(settings.session.driver_mode, DriverMode::LocalSimulation);
        assert_eq!(settings.session.completion_policy, CompletionPolicy::Lenient);
        assert_eq!(settings.simulation.min_step_delay_ms, 600);
        assert_eq!(settings.simulation.max_step_delay_ms, 2000);
        assert_eq!(settings.remote.connect_attempts, 3);
        assert_eq!(settings.remote.drain_grace_ms, 2000);
        assert_eq!(settings.server.port, 8080);
        assert!(settings.validate().is_ok());
    }
}
