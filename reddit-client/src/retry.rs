use etl_core::{CoreError, RedditApiError};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000, // 1 second
            max_delay_ms: 30000, // 30 seconds
            backoff_multiplier: 2.0,
            jitter_factor: 0.1, // 10% jitter
        }
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after exactly this delay (rate limits with a server-specified wait)
    RetryWithDelay(Duration),
    /// Don't retry (for permanent failures)
    NoRetry,
}

/// Determine retry strategy based on error type
pub fn get_retry_strategy(error: &RedditApiError) -> RetryStrategy {
    match error {
        // Rate limits should be retried with specific delay
        RedditApiError::RateLimitExceeded { retry_after } => {
            RetryStrategy::RetryWithDelay(Duration::from_secs(*retry_after))
        }
        // Server errors are usually transient
        RedditApiError::ServerError { .. } => RetryStrategy::Retry,
        RedditApiError::RequestTimeout => RetryStrategy::Retry,
        RedditApiError::Network { .. } => RetryStrategy::Retry,
        // A truncated or garbled body may parse on the next attempt
        RedditApiError::InvalidResponse { .. } => RetryStrategy::Retry,
        // Authentication, permission and other 4xx errors are permanent
        RedditApiError::AuthenticationFailed { .. } => RetryStrategy::NoRetry,
        RedditApiError::InvalidToken => RetryStrategy::NoRetry,
        RedditApiError::Forbidden { .. } => RetryStrategy::NoRetry,
        RedditApiError::SubredditNotFound { .. } => RetryStrategy::NoRetry,
        RedditApiError::ClientError { .. } => RetryStrategy::NoRetry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_delay = Duration::from_millis(config.base_delay_ms);
    let max_delay = Duration::from_millis(config.max_delay_ms);

    // Calculate exponential backoff
    let exponential_delay = if attempt == 0 {
        base_delay
    } else {
        let multiplier = config.backoff_multiplier.powi(attempt as i32);
        let delay_ms = (config.base_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay_ms.min(config.max_delay_ms))
    };

    // Add jitter to prevent thundering herd
    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);
    let final_delay = exponential_delay + Duration::from_millis(jitter);

    // Ensure we don't exceed max delay
    final_delay.min(max_delay)
}

/// Retry counters for one executor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryMetrics {
    pub total_attempts: u64,
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_operations: u64,
    pub total_delay_ms: u64,
}

/// Retry executor that wraps operations with retry logic
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    metrics: Arc<Mutex<RetryMetrics>>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(Mutex::new(RetryMetrics::default())),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic.
    ///
    /// Permanent failures are returned at once, converted into the matching
    /// [`CoreError`] kind. Transient failures are retried until
    /// `max_attempts` attempts have been made, after which the operation
    /// fails with [`CoreError::TransientFailure`].
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, RedditApiError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut total_delay_ms = 0u64;
        let mut attempt = 0u32;

        loop {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, operation_name);
            }

            let start_time = Instant::now();
            self.lock_metrics().total_attempts += 1;

            let error = match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        let mut metrics = self.lock_metrics();
                        metrics.total_retries += attempt as u64;
                        metrics.successful_retries += 1;
                        metrics.total_delay_ms += total_delay_ms;

                        info!(
                            "Operation {} succeeded after {} retries (total delay: {}ms)",
                            operation_name, attempt, total_delay_ms
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            debug!(
                "Attempt {} failed for {} after {:?}: {}",
                attempt + 1,
                operation_name,
                start_time.elapsed(),
                error
            );

            let has_attempts_left = attempt + 1 < max_attempts;
            let delay = match get_retry_strategy(&error) {
                RetryStrategy::NoRetry => {
                    debug!(
                        "Not retrying {} due to error type: {}",
                        operation_name, error
                    );
                    self.record_failure(attempt, total_delay_ms);
                    return Err(CoreError::from(error));
                }
                RetryStrategy::Retry if has_attempts_left => {
                    let delay = calculate_delay(attempt, &self.config);
                    warn!(
                        "Retrying {} in {:?} due to: {}",
                        operation_name, delay, error
                    );
                    delay
                }
                RetryStrategy::RetryWithDelay(delay) if has_attempts_left => {
                    warn!(
                        "Retrying {} after server-specified delay of {:?} due to: {}",
                        operation_name, delay, error
                    );
                    delay
                }
                _ => {
                    self.record_failure(attempt, total_delay_ms);
                    error!(
                        "Operation {} failed after {} attempts with total delay of {}ms",
                        operation_name, max_attempts, total_delay_ms
                    );
                    return Err(CoreError::TransientFailure {
                        operation: operation_name.to_string(),
                        attempts: attempt + 1,
                        last_error: error.to_string(),
                    });
                }
            };

            total_delay_ms += delay.as_millis() as u64;
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Get current retry metrics
    pub fn get_metrics(&self) -> RetryMetrics {
        self.lock_metrics().clone()
    }

    fn record_failure(&self, retries: u32, total_delay_ms: u64) {
        let mut metrics = self.lock_metrics();
        metrics.total_retries += retries as u64;
        metrics.failed_operations += 1;
        metrics.total_delay_ms += total_delay_ms;
    }

    fn lock_metrics(&self) -> MutexGuard<'_, RetryMetrics> {
        // Counters stay meaningful even if a holder panicked.
        self.metrics.lock().unwrap_or_else(|e| e.into_inner())
    }
}
