//! Resolution of Reddit API credentials.
//!
//! Credentials come from the process environment. Loading never mutates
//! anything; the lookup can be swapped out so the rules are testable without
//! touching real environment variables.

use crate::error::ConfigError;
use crate::types::Credentials;

pub const CLIENT_ID_VAR: &str = "REDDIT_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "REDDIT_CLIENT_SECRET";
pub const USER_AGENT_VAR: &str = "REDDIT_USER_AGENT";

pub fn default_user_agent() -> String {
    format!("reddit-etl/{} (scheduled extraction)", env!("CARGO_PKG_VERSION"))
}

/// Anything that can hand the pipeline a set of credentials.
pub trait CredentialSource: Send + Sync {
    fn load(&self) -> Result<Credentials, ConfigError>;
}

/// Reads credentials from environment variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl EnvCredentials {
    pub fn load_with<F>(lookup: F) -> Result<Credentials, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = required(&lookup, CLIENT_ID_VAR)?;
        let client_secret = required(&lookup, CLIENT_SECRET_VAR)?;
        let user_agent = match lookup(USER_AGENT_VAR) {
            Some(value) if value.trim().is_empty() => {
                return Err(ConfigError::EmptyEnvironmentVariable {
                    var_name: USER_AGENT_VAR.to_string(),
                })
            }
            Some(value) => value.trim().to_string(),
            None => default_user_agent(),
        };

        Ok(Credentials {
            client_id,
            client_secret,
            user_agent,
        })
    }
}

impl CredentialSource for EnvCredentials {
    fn load(&self) -> Result<Credentials, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }
}

/// Already-resolved credentials, e.g. injected by a test or another config store.
impl CredentialSource for Credentials {
    fn load(&self) -> Result<Credentials, ConfigError> {
        Ok(self.clone())
    }
}

fn required<F>(lookup: &F, var_name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var_name) {
        None => Err(ConfigError::MissingEnvironmentVariable {
            var_name: var_name.to_string(),
        }),
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyEnvironmentVariable {
            var_name: var_name.to_string(),
        }),
        Some(value) => Ok(value.trim().to_string()),
    }
}
