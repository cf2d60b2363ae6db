/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Configuration types for the orchestrator.
//!
//! This module contains the configuration struct and builder controlling
//! queue capacity, monitoring thresholds, journal maintenance, and the
//! background loop intervals. Configurations can be assembled in code,
//! loaded from a TOML file, or overlaid from `CURSUS_*` environment
//! variables; every loading path ends in the same validation.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Configuration for the orchestrator.
///
/// # Construction
///
/// Use [`OrchestratorConfig::builder()`] to create a configuration:
///
/// ```rust
/// use std::time::Duration;
/// use cursus::OrchestratorConfig;
///
/// let config = OrchestratorConfig::builder()
///     .queue_capacity(2048)
///     .max_queue_wait(Duration::from_secs(10))
///     .build();
/// ```
///
/// Or use the default configuration:
///
/// ```rust
/// # use cursus::OrchestratorConfig;
/// let config = OrchestratorConfig::default();
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OrchestratorConfig {
    queue_capacity: usize,
    sample_window: usize,
    max_queue_depth: usize,
    max_queue_wait: Duration,
    health_check_interval: Duration,
    compaction_interval: Duration,
    journal_retention: Duration,
    default_task_estimate: Duration,
    recover_on_start: bool,
}

impl OrchestratorConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    /// Maximum number of queued tasks per topic before publishers block.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Number of recent completions retained per topic for statistics.
    pub fn sample_window(&self) -> usize {
        self.sample_window
    }

    /// Queue depth above which a topic is reported as a bottleneck.
    pub fn max_queue_depth(&self) -> usize {
        self.max_queue_depth
    }

    /// p95 queue wait above which a topic is reported as a bottleneck.
    pub fn max_queue_wait(&self) -> Duration {
        self.max_queue_wait
    }

    /// How often the background loop evaluates bottleneck rules.
    pub fn health_check_interval(&self) -> Duration {
        self.health_check_interval
    }

    /// How often the journal is compacted.
    pub fn compaction_interval(&self) -> Duration {
        self.compaction_interval
    }

    /// Age past which completed task records are dropped at compaction.
    pub fn journal_retention(&self) -> Duration {
        self.journal_retention
    }

    /// Estimate applied during planning to tasks without their own.
    pub fn default_task_estimate(&self) -> Duration {
        self.default_task_estimate
    }

    /// Whether startup replays pending tasks from the journal.
    pub fn recover_on_start(&self) -> bool {
        self.recover_on_start
    }

    /// Loads a configuration from a TOML file.
    ///
    /// Keys mirror the builder methods, with durations given in seconds
    /// (`max_queue_wait_secs`, `health_check_interval_secs`, and so on).
    /// Absent keys keep their defaults; unknown keys are rejected.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses a configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let overlay: ConfigOverlay = toml::from_str(contents)?;
        let config = overlay.apply_to(Self::default());
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from `CURSUS_*` environment variables.
    ///
    /// Recognized variables: `CURSUS_QUEUE_CAPACITY`, `CURSUS_SAMPLE_WINDOW`,
    /// `CURSUS_MAX_QUEUE_DEPTH`, `CURSUS_MAX_QUEUE_WAIT_SECS`,
    /// `CURSUS_HEALTH_CHECK_INTERVAL_SECS`, `CURSUS_COMPACTION_INTERVAL_SECS`,
    /// `CURSUS_JOURNAL_RETENTION_SECS`, `CURSUS_DEFAULT_TASK_ESTIMATE_SECS`,
    /// and `CURSUS_RECOVER_ON_START`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let overlay = ConfigOverlay {
            queue_capacity: env_parse("CURSUS_QUEUE_CAPACITY")?,
            sample_window: env_parse("CURSUS_SAMPLE_WINDOW")?,
            max_queue_depth: env_parse("CURSUS_MAX_QUEUE_DEPTH")?,
            max_queue_wait_secs: env_parse("CURSUS_MAX_QUEUE_WAIT_SECS")?,
            health_check_interval_secs: env_parse("CURSUS_HEALTH_CHECK_INTERVAL_SECS")?,
            compaction_interval_secs: env_parse("CURSUS_COMPACTION_INTERVAL_SECS")?,
            journal_retention_secs: env_parse("CURSUS_JOURNAL_RETENTION_SECS")?,
            default_task_estimate_secs: env_parse("CURSUS_DEFAULT_TASK_ESTIMATE_SECS")?,
            recover_on_start: env_parse("CURSUS_RECOVER_ON_START")?,
        };
        let config = overlay.apply_to(Self::default());
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration's value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity {
                value: self.queue_capacity,
            });
        }
        if self.sample_window == 0 {
            return Err(ConfigError::InvalidSampleWindow {
                value: self.sample_window,
            });
        }
        if self.max_queue_wait.is_zero() {
            return Err(ConfigError::InvalidDuration {
                field: "max_queue_wait",
            });
        }
        if self.health_check_interval.is_zero() {
            return Err(ConfigError::InvalidDuration {
                field: "health_check_interval",
            });
        }
        if self.compaction_interval.is_zero() {
            return Err(ConfigError::InvalidDuration {
                field: "compaction_interval",
            });
        }
        if self.default_task_estimate.is_zero() {
            return Err(ConfigError::InvalidDuration {
                field: "default_task_estimate",
            });
        }
        Ok(())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfigBuilder::default().build()
    }
}

/// Builder for [`OrchestratorConfig`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl Default for OrchestratorConfigBuilder {
    fn default() -> Self {
        Self {
            config: OrchestratorConfig {
                queue_capacity: 1024,
                sample_window: 200,
                max_queue_depth: 100,
                max_queue_wait: Duration::from_secs(30),
                health_check_interval: Duration::from_secs(5),
                compaction_interval: Duration::from_secs(3600),
                journal_retention: Duration::from_secs(86400),
                default_task_estimate: Duration::from_secs(30),
                recover_on_start: true,
            },
        }
    }
}

impl OrchestratorConfigBuilder {
    /// Sets the per-topic queue capacity.
    pub fn queue_capacity(mut self, value: usize) -> Self {
        self.config.queue_capacity = value;
        self
    }

    /// Sets the per-topic statistics sample window.
    pub fn sample_window(mut self, value: usize) -> Self {
        self.config.sample_window = value;
        self
    }

    /// Sets the bottleneck queue depth threshold.
    pub fn max_queue_depth(mut self, value: usize) -> Self {
        self.config.max_queue_depth = value;
        self
    }

    /// Sets the bottleneck p95 queue wait threshold.
    pub fn max_queue_wait(mut self, value: Duration) -> Self {
        self.config.max_queue_wait = value;
        self
    }

    /// Sets the background bottleneck check interval.
    pub fn health_check_interval(mut self, value: Duration) -> Self {
        self.config.health_check_interval = value;
        self
    }

    /// Sets the journal compaction interval.
    pub fn compaction_interval(mut self, value: Duration) -> Self {
        self.config.compaction_interval = value;
        self
    }

    /// Sets the retention age for completed journal records.
    pub fn journal_retention(mut self, value: Duration) -> Self {
        self.config.journal_retention = value;
        self
    }

    /// Sets the fallback planning estimate for tasks without one.
    pub fn default_task_estimate(mut self, value: Duration) -> Self {
        self.config.default_task_estimate = value;
        self
    }

    /// Enables or disables journal replay at startup.
    pub fn recover_on_start(mut self, value: bool) -> Self {
        self.config.recover_on_start = value;
        self
    }

    /// Builds the configuration.
    ///
    /// Range validation happens when the orchestrator is built, so a
    /// configuration under construction may hold transient invalid
    /// values.
    pub fn build(self) -> OrchestratorConfig {
        self.config
    }
}

/// Partial configuration parsed from TOML or the environment; absent
/// fields fall back to the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigOverlay {
    queue_capacity: Option<usize>,
    sample_window: Option<usize>,
    max_queue_depth: Option<usize>,
    max_queue_wait_secs: Option<u64>,
    health_check_interval_secs: Option<u64>,
    compaction_interval_secs: Option<u64>,
    journal_retention_secs: Option<u64>,
    default_task_estimate_secs: Option<u64>,
    recover_on_start: Option<bool>,
}

impl ConfigOverlay {
    fn apply_to(self, mut config: OrchestratorConfig) -> OrchestratorConfig {
        if let Some(value) = self.queue_capacity {
            config.queue_capacity = value;
        }
        if let Some(value) = self.sample_window {
            config.sample_window = value;
        }
        if let Some(value) = self.max_queue_depth {
            config.max_queue_depth = value;
        }
        if let Some(secs) = self.max_queue_wait_secs {
            config.max_queue_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = self.health_check_interval_secs {
            config.health_check_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.compaction_interval_secs {
            config.compaction_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.journal_retention_secs {
            config.journal_retention = Duration::from_secs(secs);
        }
        if let Some(secs) = self.default_task_estimate_secs {
            config.default_task_estimate = Duration::from_secs(secs);
        }
        if let Some(value) = self.recover_on_start {
            config.recover_on_start = value;
        }
        config
    }
}

fn env_parse<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError::EnvParse {
                var: var.to_string(),
                value,
            }),
        },
        Err(_) => Ok(None),
    }
}
