use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication failed: {reason}")]
    Auth { reason: String },

    #[error("Request rejected{}: {message}", status_suffix(.status_code))]
    Request {
        message: String,
        status_code: Option<u16>,
    },

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    TransientFailure {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Write error: {0}")]
    Write(#[from] WriteError),
}

fn status_suffix(status_code: &Option<u16>) -> String {
    match status_code {
        Some(code) => format!(" with status {}", code),
        None => String::new(),
    }
}

/// Outcome of a single Reddit API attempt. The retry layer turns these into
/// [`CoreError`] values once it decides not to (or can no longer) retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RedditApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Subreddit not found: {subreddit}")]
    SubredditNotFound { subreddit: String },

    #[error("Invalid OAuth token")]
    InvalidToken,

    #[error("Client error {status_code}: {message}")]
    ClientError { status_code: u16, message: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Network error: {details}")]
    Network { details: String },

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },
}

impl From<RedditApiError> for CoreError {
    /// Conversion for errors that are surfaced without retrying.
    fn from(error: RedditApiError) -> Self {
        match error {
            RedditApiError::AuthenticationFailed { reason } => CoreError::Auth { reason },
            RedditApiError::InvalidToken => CoreError::Auth {
                reason: "access token rejected".to_string(),
            },
            RedditApiError::Forbidden { ref resource } => CoreError::Request {
                message: format!("forbidden: {}", resource),
                status_code: Some(403),
            },
            RedditApiError::SubredditNotFound { ref subreddit } => CoreError::Request {
                message: format!("subreddit not found: {}", subreddit),
                status_code: Some(404),
            },
            RedditApiError::ClientError {
                status_code,
                message,
            } => CoreError::Request {
                message,
                status_code: Some(status_code),
            },
            other => CoreError::TransientFailure {
                operation: "reddit request".to_string(),
                attempts: 1,
                last_error: other.to_string(),
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Environment variable is empty: {var_name}")]
    EmptyEnvironmentVariable { var_name: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A raw post that cannot become a [`crate::Post`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("invalid value for `{field}`: {value}")]
    InvalidValue { field: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Output destination unusable: {path}: {reason}")]
    Destination { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}
