// Supervisor config validation.
// Hard errors are returned before any execution context is created;
// questionable-but-usable settings come back as warnings.

use crate::config::types::{Result, SupervisorConfig, SupervisorError};

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a supervisor config. Errors are fatal; warnings are returned to
/// the caller for logging.
pub fn validate_config(config: &SupervisorConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_timeouts(config, &mut result);
    validate_polling(config, &mut result);
    validate_label(config, &mut result);

    if !result.is_valid() {
        return Err(SupervisorError::Config(format!(
            "supervisor config validation failed:\n{}",
            result.errors.join("\n")
        )));
    }

    Ok(result)
}

fn validate_timeouts(config: &SupervisorConfig, result: &mut ValidationResult) {
    if config.launch_timeout_ms == 0 {
        result.add_error("launch_timeout_ms cannot be zero".to_string());
    }
    if config.kill_confirm_timeout_ms == 0 {
        result.add_error("kill_confirm_timeout_ms cannot be zero".to_string());
    }
    if config.release_timeout_ms == 0 {
        result.add_error("release_timeout_ms cannot be zero".to_string());
    }

    if config.kill_confirm_timeout_ms > 10_000 {
        result.add_warning(format!(
            "kill_confirm_timeout_ms {} is very high; a stuck context delays the FATAL report by up to {} ms",
            config.kill_confirm_timeout_ms,
            config.kill_confirm_timeout_ms * u64::from(config.kill_attempts())
        ));
    }
    if config.kill_retries > 10 {
        result.add_warning(format!(
            "kill_retries {} is unusually high; SIGKILL is not blocked by the target",
            config.kill_retries
        ));
    }
}

fn validate_polling(config: &SupervisorConfig, result: &mut ValidationResult) {
    if config.poll_interval_ms == 0 {
        result.add_error("poll_interval_ms cannot be zero".to_string());
        return;
    }
    if config.poll_interval_ms >= config.kill_confirm_timeout_ms {
        result.add_warning(format!(
            "poll_interval_ms {} is not below kill_confirm_timeout_ms {}; each kill attempt polls at most once",
            config.poll_interval_ms, config.kill_confirm_timeout_ms
        ));
    }
    if config.poll_interval_ms > 50 {
        result.add_warning(format!(
            "poll_interval_ms {} adds noticeable latency to completion reporting",
            config.poll_interval_ms
        ));
    }
}

fn validate_label(config: &SupervisorConfig, result: &mut ValidationResult) {
    if let Some(label) = &config.default_label {
        if label.trim().is_empty() {
            result.add_error("default_label cannot be blank".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_without_warnings() {
        let result = validate_config(&SupervisorConfig::default()).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let config = SupervisorConfig {
            poll_interval_ms: 0,
            ..SupervisorConfig::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn all_zero_timeouts_are_reported_together() {
        let config = SupervisorConfig {
            launch_timeout_ms: 0,
            kill_confirm_timeout_ms: 0,
            release_timeout_ms: 0,
            ..SupervisorConfig::default()
        };
        let message = validate_config(&config).unwrap_err().to_string();
        assert!(message.contains("launch_timeout_ms"));
        assert!(message.contains("kill_confirm_timeout_ms"));
        assert!(message.contains("release_timeout_ms"));
    }

    #[test]
    fn slow_polling_is_a_warning() {
        let config = SupervisorConfig {
            poll_interval_ms: 100,
            ..SupervisorConfig::default()
        };
        let result = validate_config(&config).unwrap();
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn blank_label_is_rejected() {
        let config = SupervisorConfig {
            default_label: Some("  ".to_string()),
            ..SupervisorConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
