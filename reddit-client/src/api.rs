use crate::auth::RedditSession;
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use etl_core::{ConfigError, RawPost, RedditApiError, TimeFilter};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
pub const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
pub const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Delay used when a 429 carries no usable header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiSettings {
    pub api_base: String,
    pub auth_url: String,
    pub token_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            api_base: REDDIT_API_BASE.to_string(),
            auth_url: REDDIT_AUTH_URL.to_string(),
            token_url: REDDIT_TOKEN_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ApiSettings {
    /// Settings pointing every endpoint at one base URL, e.g. a mock server.
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: base.to_string(),
            auth_url: format!("{}/api/v1/authorize", base),
            token_url: format!("{}/api/v1/access_token", base),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    #[serde(default)]
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    #[serde(default = "Vec::new")]
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    #[serde(default)]
    pub kind: String,
    pub data: Option<T>,
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: RateLimiter,
    api_base: String,
}

impl RedditApiClient {
    pub fn new(settings: &ApiSettings, rate_config: RateLimitConfig) -> Result<Self, ConfigError> {
        let api_base = Url::parse(&settings.api_base).map_err(|e| ConfigError::InvalidValue {
            field: "api.api_base".to_string(),
            value: format!("{} ({})", settings.api_base, e),
        })?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "api.request_timeout_secs".to_string(),
                value: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new(rate_config),
            api_base: api_base.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// One attempt at an authenticated API call. Non-success statuses are
    /// classified into [`RedditApiError`] so the retry layer can decide.
    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        session: &RedditSession,
        query_params: Option<&[(&str, &str)]>,
    ) -> Result<Response, RedditApiError> {
        let url = format!("{}{}", self.api_base, endpoint);
        let start_time = Instant::now();

        // Acquire rate limit permit
        let permit = self.rate_limiter.acquire_permit().await;
        debug!(
            "Acquired rate limit permit for {} {} after {:?}",
            method, endpoint, permit.queue_wait_time
        );

        // Build request
        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(session.access_token.secret())
            .header(reqwest::header::USER_AGENT, &session.user_agent);

        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }

        // Execute request
        info!("Making Reddit API request: {} {}", method, endpoint);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                return Err(if e.is_timeout() {
                    RedditApiError::RequestTimeout
                } else {
                    RedditApiError::Network {
                        details: e.to_string(),
                    }
                });
            }
        };

        let status = response.status();
        let headers = response.headers();
        self.rate_limiter
            .observe_quota(
                header_value::<f64>(headers, "x-ratelimit-remaining"),
                header_value::<u64>(headers, "x-ratelimit-reset"),
            )
            .await;

        if status.is_success() {
            debug!(
                "Request successful: {} {} in {:?}",
                status,
                endpoint,
                start_time.elapsed()
            );
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        Err(classify_status(status, response.headers(), endpoint))
    }

    /// One page of `/r/{subreddit}/top`.
    pub async fn get_top_posts(
        &self,
        session: &RedditSession,
        subreddit: &str,
        time_filter: TimeFilter,
        limit: u32,
        after: Option<&str>,
    ) -> Result<RedditListing<RawPost>, RedditApiError> {
        let endpoint = format!("/r/{}/top", subreddit);
        let limit_str = limit.to_string();
        let mut params = Vec::with_capacity(4);
        params.push(("t", time_filter.as_str()));
        params.push(("limit", limit_str.as_str()));
        params.push(("raw_json", "1"));
        if let Some(after_val) = after {
            params.push(("after", after_val));
        }

        let response = self
            .make_request(Method::GET, &endpoint, session, Some(params.as_slice()))
            .await
            .map_err(|e| match e {
                RedditApiError::ClientError {
                    status_code: 404, ..
                } => RedditApiError::SubredditNotFound {
                    subreddit: subreddit.to_string(),
                },
                other => other,
            })?;

        let listing: RedditListing<RawPost> = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit posts: {}", e);
            RedditApiError::InvalidResponse {
                details: format!("Failed to parse posts for r/{}: {}", subreddit, e),
            }
        })?;

        info!(
            "Retrieved {} posts from r/{}",
            listing.data.children.len(),
            subreddit
        );
        Ok(listing)
    }
}

/// Map a non-success status onto the per-attempt error taxonomy.
pub(crate) fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    endpoint: &str,
) -> RedditApiError {
    match status.as_u16() {
        429 => {
            let retry_after = header_value::<u64>(headers, "retry-after")
                .or_else(|| header_value::<u64>(headers, "x-ratelimit-reset"))
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            warn!("Rate limited, retry after {} seconds", retry_after);
            RedditApiError::RateLimitExceeded { retry_after }
        }
        401 => RedditApiError::InvalidToken,
        403 => RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        code if status.is_client_error() => RedditApiError::ClientError {
            status_code: code,
            message: format!(
                "{} {}",
                status.canonical_reason().unwrap_or("client error"),
                endpoint
            ),
        },
        code => RedditApiError::ServerError { status_code: code },
    }
}

/// Parse a numeric header. Reddit sends `x-ratelimit-remaining` as a float.
pub(crate) fn header_value<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    let raw = headers.get(name)?.to_str().ok()?.trim();
    raw.parse::<T>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .and_then(|v| v.ceil().to_string().parse::<T>().ok())
    })
}
