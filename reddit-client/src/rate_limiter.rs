use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub time_window_secs: u64,
    pub burst_allowance: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::reddit_oauth()
    }
}

impl RateLimitConfig {
    pub fn reddit_oauth() -> Self {
        Self {
            max_requests: 100,    // Reddit allows 100 requests per minute for OAuth2
            time_window_secs: 60, // 1 minute window
            burst_allowance: 10,  // Allow small bursts up to 10 requests
        }
    }

    pub fn time_window(&self) -> Duration {
        Duration::from_secs(self.time_window_secs.max(1))
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.burst_allowance.max(1) as f64;
        let refill_rate = config.max_requests.max(1) as f64 / config.time_window().as_secs_f64();

        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate,
        }
    }

    /// Take `tokens_needed` tokens, or report how long until they are available.
    pub async fn acquire(&self, tokens_needed: f64) -> Result<(), Duration> {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.tokens >= tokens_needed {
            state.tokens -= tokens_needed;
            Ok(())
        } else {
            let missing = tokens_needed - state.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }
}

/// Client-side throttle in front of every Reddit request.
///
/// Combines a local token bucket with the quota Reddit reports in the
/// `x-ratelimit-remaining` / `x-ratelimit-reset` response headers: once the
/// server says the window is used up, requests wait for the reset.
#[derive(Debug)]
pub struct RateLimiter {
    token_bucket: TokenBucket,
    server_blocked_until: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            token_bucket: TokenBucket::new(&config),
            server_blocked_until: Mutex::new(None),
        }
    }

    pub async fn acquire_permit(&self) -> RateLimitPermit {
        let start_time = Instant::now();

        let blocked_until = self.server_blocked_until.lock().await.take();
        if let Some(deadline) = blocked_until {
            if deadline > start_time {
                debug!(
                    "Server quota exhausted, waiting {:?} for window reset",
                    deadline - start_time
                );
                sleep_until(deadline).await;
            }
        }

        // Try to acquire token, wait if necessary
        loop {
            match self.token_bucket.acquire(1.0).await {
                Ok(()) => break,
                Err(wait_time) => {
                    debug!("Rate limit reached, waiting {:?}", wait_time);
                    sleep(wait_time).await;
                }
            }
        }

        RateLimitPermit {
            queue_wait_time: start_time.elapsed(),
        }
    }

    /// Record the quota headers of a response.
    pub async fn observe_quota(&self, remaining: Option<f64>, reset_secs: Option<u64>) {
        if let (Some(remaining), Some(reset_secs)) = (remaining, reset_secs) {
            if remaining < 1.0 {
                let deadline = Instant::now() + Duration::from_secs(reset_secs);
                debug!(
                    "Reddit reports no remaining quota, pausing requests for {}s",
                    reset_secs
                );
                *self.server_blocked_until.lock().await = Some(deadline);
            }
        }
    }
}

#[derive(Debug)]
pub struct RateLimitPermit {
    pub queue_wait_time: Duration,
}
