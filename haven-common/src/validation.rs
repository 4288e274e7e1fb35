//! Configuration validation for Haven.
//!
//! Checks that configuration values are present and within valid ranges
//! before the server starts.

use thiserror::Error;

use crate::config::{
    ChatConfig, Config, ModelConfig, ObservabilityConfig, ServerConfig, MAX_HISTORY_LIMIT,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["json", "pretty"];

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.server.validate(),
            self.model.validate(),
            self.chat.validate(),
            self.observability.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "server.port".into(),
            });
        }
        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "server.host".into(),
            });
        }
        if self.max_body_bytes == 0 {
            return Err(invalid("server.max_body_bytes", "must be greater than 0"));
        }
        Ok(())
    }
}

impl Validate for ModelConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "model.model".into(),
            });
        }
        if let Some(url) = &self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(invalid("model.base_url", "must start with http:// or https://"));
            }
        }
        if self.max_new_tokens == 0 {
            return Err(invalid("model.max_new_tokens", "must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("model.temperature", "must be between 0.0 and 2.0"));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(invalid("model.top_p", "must be in (0.0, 1.0]"));
        }
        if self.timeout_secs == Some(0) {
            return Err(invalid("model.timeout_secs", "must be greater than 0 when set"));
        }
        Ok(())
    }
}

impl Validate for ChatConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !(1..=MAX_HISTORY_LIMIT).contains(&self.history_limit) {
            return Err(invalid(
                "chat.history_limit",
                format!("must be between 1 and {MAX_HISTORY_LIMIT}"),
            ));
        }
        if self.default_session_id.is_empty() {
            return Err(ValidationError::MissingField {
                field: "chat.default_session_id".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_level",
                format!("expected one of {}", LOG_LEVELS.join(", ")),
            ));
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            return Err(invalid(
                "observability.log_format",
                format!("expected one of {}", LOG_FORMATS.join(", ")),
            ));
        }
        Ok(())
    }
}
