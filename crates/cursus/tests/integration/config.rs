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

//! Configuration loading at the process boundary: environment variables,
//! TOML files on disk, and startup validation. Environment tests are
//! serialized because variables are process-global.

use std::io::Write;
use std::time::Duration;

use serial_test::serial;

use cursus::{ConfigError, Orchestrator, OrchestratorConfig, StartupError};

fn clear_cursus_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("CURSUS_") {
            std::env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn env_overrides_apply_over_defaults() {
    clear_cursus_env();
    std::env::set_var("CURSUS_QUEUE_CAPACITY", "2048");
    std::env::set_var("CURSUS_MAX_QUEUE_WAIT_SECS", "120");
    std::env::set_var("CURSUS_RECOVER_ON_START", "false");

    let config = OrchestratorConfig::from_env().unwrap();
    assert_eq!(config.queue_capacity(), 2048);
    assert_eq!(config.max_queue_wait(), Duration::from_secs(120));
    assert!(!config.recover_on_start());
    // Untouched keys keep their defaults.
    assert_eq!(config.sample_window(), 200);
    assert_eq!(config.health_check_interval(), Duration::from_secs(5));

    clear_cursus_env();
}

#[test]
#[serial]
fn malformed_env_values_are_rejected() {
    clear_cursus_env();
    std::env::set_var("CURSUS_QUEUE_CAPACITY", "lots");

    let error = OrchestratorConfig::from_env().unwrap_err();
    match error {
        ConfigError::EnvParse { var, value } => {
            assert_eq!(var, "CURSUS_QUEUE_CAPACITY");
            assert_eq!(value, "lots");
        }
        other => panic!("expected an env parse error, got {other}"),
    }

    clear_cursus_env();
}

#[test]
#[serial]
fn out_of_range_env_values_fail_validation() {
    clear_cursus_env();
    std::env::set_var("CURSUS_QUEUE_CAPACITY", "0");

    let error = OrchestratorConfig::from_env().unwrap_err();
    assert!(matches!(
        error,
        ConfigError::InvalidQueueCapacity { value: 0 }
    ));

    clear_cursus_env();
}

#[test]
#[serial]
fn an_empty_environment_yields_the_defaults() {
    clear_cursus_env();
    let config = OrchestratorConfig::from_env().unwrap();
    assert_eq!(config.queue_capacity(), 1024);
    assert!(config.recover_on_start());
}

#[tokio::test]
async fn a_toml_file_configures_the_orchestrator() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cursus.toml");
    let mut file = std::fs::File::create(&path)?;
    writeln!(file, "queue_capacity = 8")?;
    writeln!(file, "max_queue_depth = 4")?;
    writeln!(file, "health_check_interval_secs = 3600")?;
    writeln!(file, "compaction_interval_secs = 3600")?;
    drop(file);

    let config = OrchestratorConfig::from_toml_file(&path)?;
    assert_eq!(config.queue_capacity(), 8);
    assert_eq!(config.max_queue_depth(), 4);

    let orchestrator = Orchestrator::builder().config(config).build().await?;
    assert_eq!(orchestrator.config().queue_capacity(), 8);
    orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn an_invalid_config_fails_the_build() {
    let config = OrchestratorConfig::builder().queue_capacity(0).build();
    let error = match Orchestrator::builder().config(config).build().await {
        Err(error) => error,
        Ok(_) => panic!("an orchestrator with no queue capacity was built"),
    };
    assert!(matches!(
        error,
        StartupError::Config(ConfigError::InvalidQueueCapacity { value: 0 })
    ));
}
