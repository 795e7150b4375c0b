use crate::error::*;
use std::time::Duration;
use tracing::{error, info};

/// Exit status for a run that completed and wrote its batch.
pub const EXIT_OK: u8 = 0;
/// Non-retryable API rejection (EX_DATAERR).
pub const EXIT_REQUEST: u8 = 65;
/// Sink failure (EX_IOERR).
pub const EXIT_WRITE: u8 = 74;
/// Retry budget exhausted; safe to trigger again later (EX_TEMPFAIL).
pub const EXIT_TRANSIENT: u8 = 75;
/// Credentials rejected (EX_NOPERM).
pub const EXIT_AUTH: u8 = 77;
/// Missing or invalid configuration (EX_CONFIG).
pub const EXIT_CONFIG: u8 = 78;

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            CoreError::Write(e) => {
                error!("Write error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    /// Whether the scheduler may simply trigger the run again.
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::TransientFailure { .. } | CoreError::Write(_)
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::TransientFailure { .. } => Some(Duration::from_secs(300)),
            CoreError::Write(_) => Some(Duration::from_secs(60)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Auth { reason } => format!(
                "Reddit rejected the credentials ({}). Check REDDIT_CLIENT_ID and REDDIT_CLIENT_SECRET.",
                reason
            ),
            CoreError::Request {
                message,
                status_code,
            } => match status_code {
                Some(code) => format!("Reddit refused the request ({}): {}", code, message),
                None => format!("Reddit refused the request: {}", message),
            },
            CoreError::TransientFailure {
                operation,
                attempts,
                ..
            } => format!(
                "{} kept failing after {} attempts. The run can be triggered again later.",
                operation, attempts
            ),
            CoreError::Write(e) => e.user_friendly_message(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Auth { .. } => "AUTH".to_string(),
            CoreError::Request { .. } => "REQUEST".to_string(),
            CoreError::TransientFailure { .. } => "TRANSIENT_FAILURE".to_string(),
            CoreError::Write(_) => "WRITE".to_string(),
        }
    }
}

impl CoreError {
    /// Process exit status reported to the scheduler for this failure kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            CoreError::Config(_) => EXIT_CONFIG,
            CoreError::Auth { .. } => EXIT_AUTH,
            CoreError::Request { .. } => EXIT_REQUEST,
            CoreError::TransientFailure { .. } => EXIT_TRANSIENT,
            CoreError::Write(_) => EXIT_WRITE,
        }
    }
}

impl ConfigError {
    pub fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' does not exist.", path)
            }
            ConfigError::MissingField { field } => {
                format!("Required setting '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, value } => {
                format!("Setting '{}' has an invalid value: '{}'.", field, value)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => {
                format!("Environment variable {} must be set.", var_name)
            }
            ConfigError::EmptyEnvironmentVariable { var_name } => {
                format!("Environment variable {} must not be empty.", var_name)
            }
            ConfigError::Parse(e) => format!("Configuration file could not be parsed: {}", e),
        }
    }
}

impl WriteError {
    pub fn user_friendly_message(&self) -> String {
        match self {
            WriteError::Destination { path, reason } => {
                format!("Cannot write to '{}': {}.", path, reason)
            }
            WriteError::Io(e) => format!("Writing the batch failed: {}", e),
            WriteError::Serialization(e) => format!("Serializing the batch failed: {}", e),
            WriteError::TransactionFailed { reason } => {
                format!("Database transaction failed: {}", reason)
            }
            WriteError::Sql(e) => format!("Database write failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn report_error(&self, error: &CoreError) {
        error.log_error();
        info!("Error code: {}", error.error_code());
        info!("User message: {}", error.user_friendly_message());
        if error.is_retryable() {
            if let Some(retry_after) = error.retry_after() {
                info!("Run can be re-triggered. Suggested delay: {:?}", retry_after);
            }
        }
    }

    /// One-line summary the scheduler shows next to the exit status.
    pub fn summary(&self, error: &CoreError) -> String {
        format!("[{}] {}", error.error_code(), error.user_friendly_message())
    }
}

