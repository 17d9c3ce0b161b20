//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use prism_core::{CompletionPolicy, DriverMode};
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::PrismSettings;

/// `$PRISM_SETTINGS`, else `~/.prism/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(path) = std::env::var("PRISM_SETTINGS").ok().filter(|v| !v.is_empty()) {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".prism").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PrismSettings> {
    load_settings_from_path(&settings_path())
}

/// Missing file means defaults; unreadable or invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PrismSettings> {
    let defaults = serde_json::to_value(PrismSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PrismSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `PRISM_*` overrides read through `lookup`. Invalid values are warned and ignored.
pub fn apply_overrides(settings: &mut PrismSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = Env { lookup };

    // ── Session ─────────────────────────────────────────────────────
    if let Some(demo) = env.bool("PRISM_DEMO_MODE") {
        settings.session.driver_mode = if demo {
            DriverMode::LocalSimulation
        } else {
            DriverMode::RemoteChannel
        };
    }
    if let Some(mode) = env.parsed::<DriverMode>("PRISM_DRIVER_MODE") {
        settings.session.driver_mode = mode;
    }
    if let Some(policy) = env.parsed::<CompletionPolicy>("PRISM_COMPLETION_POLICY") {
        settings.session.completion_policy = policy;
    }

    // ── Simulation ──────────────────────────────────────────────────
    if let Some(seed) = env.u64("PRISM_SIM_SEED", 0, u64::MAX) {
        settings.simulation.seed = Some(seed);
    }

    // ── Remote ──────────────────────────────────────────────────────
    if let Some(v) = env.string("PRISM_REMOTE_URL") {
        settings.remote.url = v;
    }
    if let Some(v) = env.string("PRISM_API_URL") {
        settings.remote.api_url = v;
    }
    if let Some(v) = env.u64("PRISM_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.remote.attempt_timeout_ms = v;
    }

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("PRISM_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("PRISM_PORT", 0, 65535) {
        settings.server.port = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("PRISM_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("PRISM_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Override readers (thin wrappers) ────────────────────────────────────────

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn parsed<T: std::str::FromStr<Err = String>>(&self, name: &str) -> Option<T> {
        let val = self.string(name)?;
        match val.parse() {
            Ok(v) => Some(v),
            Err(error) => {
                tracing::warn!(key = name, value = %val, %error, "invalid env var, ignoring");
                None
            }
        }
    }
}
