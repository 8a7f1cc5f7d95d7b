use crate::constants::limits::{
    MAX_COMMAND_TIMEOUT_SECS, MAX_PORT, MIN_COMMAND_TIMEOUT_SECS, MIN_PORT,
};
use crate::errors::TaskError;

#[derive(Clone)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    pub fn ensure_nonempty(&self, value: &str, label: &str) -> Result<String, TaskError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(TaskError::invalid(format!(
                "{} must be a non-empty string",
                label
            )));
        }
        if trimmed.contains('\0') {
            return Err(TaskError::invalid(format!(
                "{} must not contain null bytes",
                label
            )));
        }
        Ok(trimmed.to_string())
    }

    pub fn ensure_port(&self, port: u16) -> Result<u16, TaskError> {
        if port < MIN_PORT {
            return Err(TaskError::invalid(format!(
                "Port must be an integer between {} and {}",
                MIN_PORT, MAX_PORT
            )));
        }
        Ok(port)
    }

    pub fn ensure_timeout_secs(&self, secs: u64) -> Result<u64, TaskError> {
        if !(MIN_COMMAND_TIMEOUT_SECS..=MAX_COMMAND_TIMEOUT_SECS).contains(&secs) {
            return Err(TaskError::invalid(format!(
                "Command timeout must be between {} and {} seconds",
                MIN_COMMAND_TIMEOUT_SECS, MAX_COMMAND_TIMEOUT_SECS
            )));
        }
        Ok(secs)
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self::new()
    }
}
