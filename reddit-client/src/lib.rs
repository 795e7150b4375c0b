pub mod api;
pub mod auth;
pub mod rate_limiter;
pub mod retry;

pub use api::{ApiSettings, RedditApiClient, RedditListing};
pub use auth::{AccessToken, RedditAuthenticator, RedditSession};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::{RetryConfig, RetryExecutor, RetryMetrics};

use async_trait::async_trait;
use etl_core::{CoreError, Credentials, FetchRequest, RawPost};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, error};

/// Largest page the listing endpoints serve.
pub const MAX_PAGE_SIZE: u32 = 100;
/// Listings stop paginating after roughly this many items.
pub const LISTING_CAP: u32 = 1000;

/// The narrow surface the extraction engine needs from a forum API.
#[async_trait]
pub trait ForumClient: Send + Sync {
    type Handle: Send + Sync;

    /// Authenticate. Fails with [`CoreError::Auth`] on rejected credentials
    /// or when the endpoint stays unreachable after retrying.
    async fn connect(&self, credentials: &Credentials) -> Result<Self::Handle, CoreError>;

    /// Lazily page through the top posts for `request`. The stream is finite:
    /// it ends when the listing runs out of pages or at the listing cap.
    /// `request.limit` only sizes the pages; the consumer stops pulling once
    /// it has enough usable posts.
    fn fetch<'a>(
        &'a self,
        handle: &'a Self::Handle,
        request: &'a FetchRequest,
    ) -> BoxStream<'a, Result<RawPost, CoreError>>;
}

pub struct RedditClient {
    api: RedditApiClient,
    auth: RedditAuthenticator,
    retry: RetryExecutor,
}

impl RedditClient {
    pub fn new(
        settings: &ApiSettings,
        retry_config: RetryConfig,
        rate_config: RateLimitConfig,
    ) -> Result<Self, CoreError> {
        let api = RedditApiClient::new(settings, rate_config)?;
        let auth = RedditAuthenticator::new(settings, api.http_client().clone())?;

        Ok(Self {
            api,
            auth,
            retry: RetryExecutor::new(retry_config),
        })
    }

    pub fn retry_metrics(&self) -> RetryMetrics {
        self.retry.get_metrics()
    }
}

#[derive(Debug)]
struct PageCursor {
    after: Option<String>,
    remaining: u32,
    pages: u32,
    exhausted: bool,
}

#[async_trait]
impl ForumClient for RedditClient {
    type Handle = RedditSession;

    async fn connect(&self, credentials: &Credentials) -> Result<RedditSession, CoreError> {
        self.retry
            .execute("request_access_token", || {
                self.auth.request_token(credentials)
            })
            .await
            .map_err(|e| match e {
                CoreError::TransientFailure {
                    attempts,
                    last_error,
                    ..
                } => {
                    error!("Token endpoint unreachable after {} attempts", attempts);
                    CoreError::Auth {
                        reason: format!(
                            "token endpoint unreachable after {} attempts: {}",
                            attempts, last_error
                        ),
                    }
                }
                other => other,
            })
    }

    fn fetch<'a>(
        &'a self,
        session: &'a RedditSession,
        request: &'a FetchRequest,
    ) -> BoxStream<'a, Result<RawPost, CoreError>> {
        let cursor = PageCursor {
            after: None,
            remaining: LISTING_CAP,
            pages: 0,
            exhausted: false,
        };

        stream::try_unfold(cursor, move |mut cursor| async move {
            if cursor.exhausted || cursor.remaining == 0 {
                return Ok::<_, CoreError>(None);
            }

            let page_size = request
                .limit
                .unwrap_or(MAX_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE)
                .min(cursor.remaining);
            let after = cursor.after.take();
            let listing = self
                .retry
                .execute("fetch_top_posts", || {
                    self.api.get_top_posts(
                        session,
                        &request.subreddit,
                        request.time_filter,
                        page_size,
                        after.as_deref(),
                    )
                })
                .await?;

            let mut posts: Vec<RawPost> = listing
                .data
                .children
                .into_iter()
                .map(|child| {
                    child
                        .data
                        .unwrap_or_else(|| RawPost::new(serde_json::Value::Null))
                })
                .collect();
            posts.truncate(cursor.remaining as usize);

            cursor.remaining -= posts.len() as u32;
            cursor.pages += 1;
            cursor.exhausted = posts.is_empty() || listing.data.after.is_none();
            cursor.after = listing.data.after;

            debug!(
                "Page {} of r/{}: {} items, {} left before the listing cap",
                cursor.pages,
                request.subreddit,
                posts.len(),
                cursor.remaining
            );

            Ok(Some((
                stream::iter(posts.into_iter().map(Ok::<RawPost, CoreError>)),
                cursor,
            )))
        })
        .try_flatten()
        .boxed()
    }
}
