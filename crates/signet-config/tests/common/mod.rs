// crates/signet-config/tests/common/mod.rs
// ============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for signet-config.
// ============================================================================

//! Shared fixtures for signet-config integration tests.

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use signet_config::ConfigError;
use signet_config::SignetConfig;

/// Result type for tests that report failures as strings.
pub type TestResult = Result<(), String>;

/// Returns a config with every default applied.
pub fn minimal_config() -> Result<SignetConfig, ConfigError> {
    SignetConfig::from_toml("")
}

/// Writes `content` to `name` under `dir` and returns the path.
pub fn write_config(dir: &Path, name: &str, content: &[u8]) -> Result<PathBuf, String> {
    let path = dir.join(name);
    fs::write(&path, content).map_err(|err| err.to_string())?;
    Ok(path)
}

/// Asserts that `result` failed with a message containing `needle`.
pub fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}
