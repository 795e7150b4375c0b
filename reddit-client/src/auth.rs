//! Application-only OAuth2 for the Reddit API.
//!
//! Scheduled extraction never acts on behalf of a user, so the client
//! credentials grant is used: the client id and secret are exchanged for a
//! bearer token with HTTP basic auth against the token endpoint.

use crate::api::{classify_status, ApiSettings};
use etl_core::{ConfigError, Credentials, RedditApiError};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError, TokenResponse,
    TokenUrl,
};
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A bearer token. The secret never shows up in `Debug` output.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
}

impl AccessToken {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// An authenticated connection to the API: the handle returned by `connect`.
#[derive(Debug, Clone)]
pub struct RedditSession {
    pub access_token: AccessToken,
    pub user_agent: String,
}

/// Transport-level failures of the token exchange.
#[derive(Error, Debug)]
pub enum TokenTransportError {
    #[error("token request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("token endpoint returned {status}")]
    Status {
        status: StatusCode,
        error: RedditApiError,
    },

    #[error("token endpoint rejected the grant: {0}")]
    Rejected(String),
}

#[derive(Debug)]
pub struct RedditAuthenticator {
    http_client: Client,
    auth_url: AuthUrl,
    token_url: TokenUrl,
}

impl RedditAuthenticator {
    pub fn new(settings: &ApiSettings, http_client: Client) -> Result<Self, ConfigError> {
        let auth_url =
            AuthUrl::new(settings.auth_url.clone()).map_err(|e| ConfigError::InvalidValue {
                field: "api.auth_url".to_string(),
                value: format!("{} ({})", settings.auth_url, e),
            })?;
        let token_url =
            TokenUrl::new(settings.token_url.clone()).map_err(|e| ConfigError::InvalidValue {
                field: "api.token_url".to_string(),
                value: format!("{} ({})", settings.token_url, e),
            })?;

        Ok(Self {
            http_client,
            auth_url,
            token_url,
        })
    }

    /// One attempt at the client credentials exchange.
    pub async fn request_token(
        &self,
        credentials: &Credentials,
    ) -> Result<RedditSession, RedditApiError> {
        let client = BasicClient::new(
            ClientId::new(credentials.client_id.clone()),
            Some(ClientSecret::new(credentials.client_secret.clone())),
            self.auth_url.clone(),
            Some(self.token_url.clone()),
        );

        debug!("Requesting application-only access token");
        let result = client
            .exchange_client_credentials()
            .request_async(|request| self.send(request, &credentials.user_agent))
            .await;

        match result {
            Ok(token) => {
                info!(
                    "Obtained Reddit access token (expires in {:?})",
                    token.expires_in()
                );
                Ok(RedditSession {
                    access_token: AccessToken::new(token.access_token().secret().to_string()),
                    user_agent: credentials.user_agent.clone(),
                })
            }
            Err(RequestTokenError::ServerResponse(response)) => {
                warn!("Token endpoint returned an OAuth error: {}", response);
                Err(RedditApiError::AuthenticationFailed {
                    reason: response.to_string(),
                })
            }
            Err(RequestTokenError::Request(TokenTransportError::Status { error, .. })) => {
                Err(error)
            }
            Err(RequestTokenError::Request(TokenTransportError::Rejected(reason))) => {
                Err(RedditApiError::AuthenticationFailed { reason })
            }
            Err(RequestTokenError::Request(TokenTransportError::Network(e))) => {
                Err(if e.is_timeout() {
                    RedditApiError::RequestTimeout
                } else {
                    RedditApiError::Network {
                        details: e.to_string(),
                    }
                })
            }
            Err(RequestTokenError::Parse(e, _body)) => Err(RedditApiError::InvalidResponse {
                details: format!("unparseable token response: {}", e),
            }),
            Err(RequestTokenError::Other(details)) => {
                Err(RedditApiError::InvalidResponse { details })
            }
        }
    }

    /// HTTP transport for the token exchange, so the Reddit user agent is
    /// sent and error statuses are classified before oauth2 parses the body.
    async fn send(
        &self,
        request: HttpRequest,
        user_agent: &str,
    ) -> Result<HttpResponse, TokenTransportError> {
        let response = self
            .http_client
            .request(request.method, request.url.as_str())
            .headers(request.headers)
            .header(USER_AGENT, user_agent)
            .body(request.body)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            let error = match status.as_u16() {
                400 | 401 | 403 => RedditApiError::AuthenticationFailed {
                    reason: format!("token endpoint returned {}", status),
                },
                _ => classify_status(status, &headers, "/api/v1/access_token"),
            };
            return Err(TokenTransportError::Status { status, error });
        }

        let body = response.bytes().await?.to_vec();

        // Reddit reports some grant failures as 200 with an `error` member.
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&body) {
            if value.get("access_token").is_none() {
                if let Some(error) = value.get("error") {
                    let reason = error
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string());
                    return Err(TokenTransportError::Rejected(reason));
                }
            }
        }

        Ok(HttpResponse {
            status_code: status,
            headers,
            body,
        })
    }
}
