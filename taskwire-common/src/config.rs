// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Worker configuration.
//!
//! Values are loaded from a JSON string (as handed down by a launcher) and
//! may be overridden per-field through `TASKWIRE_<UPPER_SNAKE_CASE>`
//! environment variables.

use serde::Deserialize;

use crate::constants::{DEFAULT_DEATH_INFO_GRACE_PERIOD_MS, DEFAULT_QUEUEING_WARN_THRESHOLD};

/// Tunables for the submitter and receiver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Per-actor queue depth at which the first excess-queueing warning
    /// fires; doubles on each trip.
    pub queueing_warn_threshold: i64,
    /// How long failed inflight tasks are remembered while waiting for a
    /// death confirmation, in milliseconds.
    pub death_info_grace_period_ms: u64,
    /// Interval of the periodic sweep that prunes expired death-wait
    /// records, in milliseconds.
    pub death_check_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queueing_warn_threshold: DEFAULT_QUEUEING_WARN_THRESHOLD,
            death_info_grace_period_ms: DEFAULT_DEATH_INFO_GRACE_PERIOD_MS,
            death_check_interval_ms: 100,
        }
    }
}

impl WorkerConfig {
    /// Parse a config from its JSON representation. Unknown fields are
    /// rejected so typos in launcher configs surface early.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let mut config: Self =
            serde_json::from_str(json).map_err(|e| format!("invalid worker config: {e}"))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        read_env("TASKWIRE_QUEUEING_WARN_THRESHOLD", &mut self.queueing_warn_threshold);
        read_env(
            "TASKWIRE_DEATH_INFO_GRACE_PERIOD_MS",
            &mut self.death_info_grace_period_ms,
        );
        read_env("TASKWIRE_DEATH_CHECK_INTERVAL_MS", &mut self.death_check_interval_ms);
    }
}

fn read_env<T: std::str::FromStr>(name: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(name, raw = %raw, "ignoring unparsable config override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.queueing_warn_threshold, 5_000);
        assert_eq!(config.death_info_grace_period_ms, 1_000);
    }

    #[test]
    fn test_from_json_partial() {
        let config = WorkerConfig::from_json(r#"{"queueing_warn_threshold": 100}"#).unwrap();
        assert_eq!(config.queueing_warn_threshold, 100);
        assert_eq!(config.death_check_interval_ms, 100);
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(WorkerConfig::from_json("not json").is_err());
    }
}
