// Rewind - Stepped Execution Visualizer
// Copyright (C) 2024 Rewind Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine configuration
//!
//! [`EngineConfig`] groups the knobs of every engine component. It deserializes
//! from TOML with every field optional, so a configuration file only needs to
//! mention what it changes:
//!
//! ```toml
//! [history]
//! max_history = 5000
//!
//! [playback]
//! speed_ms = 100
//! turbo = true
//! ```

use std::{fs, path::Path, time::Duration};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for a debugging session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Execution history settings
    pub history: HistoryConfig,
    /// Playback scheduler settings
    pub playback: PlaybackConfig,
    /// Per-step execution settings
    pub execution: ExecutionConfig,
    /// Limits enforced by the bundled interpreters
    pub interpreter: InterpreterLimits,
}

/// Execution history capacity and checkpointing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of snapshots retained; the oldest is evicted beyond this
    pub max_history: usize,
    /// A full interpreter serialization is stored on every Nth capture
    pub checkpoint_interval: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_history: 10_000, checkpoint_interval: 50 }
    }
}

/// Playback cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Delay between automatic steps, in milliseconds
    pub speed_ms: u64,
    /// Lower bound for any inter-step delay
    pub min_delay_ms: u64,
    /// Upper bound for the configured speed
    pub max_delay_ms: u64,
    /// Poll interval while playback is paused
    pub pause_poll_ms: u64,
    /// Halve the inter-step delay
    pub turbo: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { speed_ms: 500, min_delay_ms: 10, max_delay_ms: 2000, pause_poll_ms: 50, turbo: false }
    }
}

impl PlaybackConfig {
    /// Clamp a requested speed into the configured bounds
    pub fn clamp_speed(&self, speed_ms: u64) -> u64 {
        speed_ms.clamp(self.min_delay_ms, self.max_delay_ms)
    }

    /// Delay before the next automatic step
    pub fn step_delay(&self, speed_ms: u64, turbo: bool) -> Duration {
        let delay = self.clamp_speed(speed_ms);
        let delay = if turbo { (delay / 2).max(self.min_delay_ms) } else { delay };
        Duration::from_millis(delay)
    }

    /// Poll interval while paused
    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }
}

/// Bounds on a single logical step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Micro-step ceiling for one `step_to_next_line` call
    pub max_micro_steps: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { max_micro_steps: 100 }
    }
}

/// Sandbox limits for interpreters shipped with the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterLimits {
    /// Total micro-steps before the run is aborted
    pub max_steps: usize,
    /// Deepest call stack before the run is aborted
    pub max_stack_size: usize,
}

impl Default for InterpreterLimits {
    fn default() -> Self {
        Self { max_steps: 100_000, max_stack_size: 10_000 }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).with_context(|| "Failed to parse config file as TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading engine config from {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Serialize to pretty TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.history.max_history == 0 {
            eyre::bail!("history.max_history must be at least 1");
        }
        if self.history.checkpoint_interval == 0 {
            eyre::bail!("history.checkpoint_interval must be at least 1");
        }
        if self.playback.min_delay_ms == 0 {
            eyre::bail!("playback.min_delay_ms must be at least 1");
        }
        if self.playback.min_delay_ms > self.playback.max_delay_ms {
            eyre::bail!(
                "playback.min_delay_ms ({}) exceeds playback.max_delay_ms ({})",
                self.playback.min_delay_ms,
                self.playback.max_delay_ms
            );
        }
        if self.playback.pause_poll_ms == 0 {
            eyre::bail!("playback.pause_poll_ms must be at least 1");
        }
        if self.execution.max_micro_steps == 0 {
            eyre::bail!("execution.max_micro_steps must be at least 1");
        }
        Ok(())
    }

    /// Set the history capacity
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.history.max_history = max_history;
        self
    }

    /// Set the checkpoint interval
    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.history.checkpoint_interval = interval;
        self
    }

    /// Set the playback speed in milliseconds
    pub fn with_speed(mut self, speed_ms: u64) -> Self {
        self.playback.speed_ms = speed_ms;
        self
    }

    /// Enable or disable turbo playback
    pub fn with_turbo(mut self, turbo: bool) -> Self {
        self.playback.turbo = turbo;
        self
    }

    /// Set the micro-step ceiling per logical step
    pub fn with_max_micro_steps(mut self, max_micro_steps: usize) -> Self {
        self.execution.max_micro_steps = max_micro_steps;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.history.max_history, 10_000);
        assert_eq!(config.history.checkpoint_interval, 50);
        assert_eq!(config.playback.speed_ms, 500);
        assert_eq!(config.execution.max_micro_steps, 100);
        assert_eq!(config.interpreter.max_steps, 100_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            [history]
            max_history = 3

            [playback]
            turbo = true
            "#,
        )
        .unwrap();

        assert_eq!(config.history.max_history, 3);
        assert_eq!(config.history.checkpoint_interval, 50);
        assert!(config.playback.turbo);
        assert_eq!(config.playback.speed_ms, 500);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_toml_str("[history]\nmax_history = 0").is_err());
        assert!(EngineConfig::from_toml_str("[playback]\nmin_delay_ms = 500\nmax_delay_ms = 10").is_err());
        assert!(EngineConfig::from_toml_str("[history]\nmax_history = \"many\"").is_err());
    }

    #[test]
    fn test_step_delay() {
        let playback = PlaybackConfig::default();
        assert_eq!(playback.step_delay(500, false), Duration::from_millis(500));
        assert_eq!(playback.step_delay(500, true), Duration::from_millis(250));
        assert_eq!(playback.step_delay(5000, false), Duration::from_millis(2000));
        assert_eq!(playback.step_delay(1, false), Duration::from_millis(10));
        // turbo never goes below the floor
        assert_eq!(playback.step_delay(15, true), Duration::from_millis(10));
    }

    #[test]
    fn test_load_round_trip_through_file() {
        let config = EngineConfig::default().with_max_history(42).with_speed(120).with_turbo(true);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes()).unwrap();

        let loaded = EngineConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(EngineConfig::load("/definitely/not/here/rewind.toml").is_err());
    }
}
