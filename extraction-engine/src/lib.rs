pub mod normalize;

pub use normalize::normalize;

use etl_core::{Batch, CoreError, Credentials, FetchRequest, Post};
use futures::TryStreamExt;
use reddit_client::{ForumClient, MAX_PAGE_SIZE};
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Raw items pulled from the stream.
    pub fetched: usize,
    pub skipped_malformed: usize,
    pub skipped_duplicate: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub batch: Batch,
    pub stats: ExtractionStats,
}

/// Drives one fetch: authenticate, stream, normalize, collect.
pub struct ExtractionEngine<C: ForumClient> {
    client: C,
}

impl<C: ForumClient> ExtractionEngine<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Collect up to `request.limit` posts in listing order.
    ///
    /// Malformed and duplicate items are skipped and counted. Any error from
    /// the client aborts the run; no partial batch is returned.
    pub async fn run(
        &self,
        request: &FetchRequest,
        credentials: &Credentials,
    ) -> Result<Extraction, CoreError> {
        let handle = self.client.connect(credentials).await?;
        info!(
            "Extracting top posts from r/{} (t={}, limit={:?})",
            request.subreddit, request.time_filter, request.limit
        );

        let limit = request.limit.map(|limit| limit as usize);
        let mut posts: Vec<Post> =
            Vec::with_capacity(limit.unwrap_or(0).min(MAX_PAGE_SIZE as usize));
        let mut seen = HashSet::new();
        let mut stats = ExtractionStats::default();

        let mut stream = self.client.fetch(&handle, request);
        while let Some(raw) = stream.try_next().await? {
            stats.fetched += 1;

            let post = match normalize(&raw) {
                Ok(post) => post,
                Err(e) => {
                    stats.skipped_malformed += 1;
                    warn!("Skipping malformed item #{}: {}", stats.fetched, e);
                    continue;
                }
            };

            if !seen.insert(post.id.clone()) {
                stats.skipped_duplicate += 1;
                debug!("Skipping duplicate post {}", post.id);
                continue;
            }

            posts.push(post);
            if limit.is_some_and(|limit| posts.len() >= limit) {
                break;
            }
        }

        let batch = Batch::new(posts);
        info!(
            fetched = stats.fetched,
            skipped_malformed = stats.skipped_malformed,
            skipped_duplicate = stats.skipped_duplicate,
            "Extracted {} posts from r/{}",
            batch.len(),
            request.subreddit
        );

        Ok(Extraction { batch, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use etl_core::{RawPost, TimeFilter};
    use futures::stream::{self, BoxStream, StreamExt};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Step {
        Item(Value),
        Fail,
    }

    struct StubClient {
        steps: Vec<Step>,
        reject_credentials: bool,
        pulled: AtomicUsize,
    }

    impl StubClient {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps,
                reject_credentials: false,
                pulled: AtomicUsize::new(0),
            }
        }

        fn pulled(&self) -> usize {
            self.pulled.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ForumClient for StubClient {
        type Handle = ();

        async fn connect(&self, _credentials: &Credentials) -> Result<(), CoreError> {
            if self.reject_credentials {
                return Err(CoreError::Auth {
                    reason: "invalid_grant".to_string(),
                });
            }
            Ok(())
        }

        fn fetch<'a>(
            &'a self,
            _handle: &'a (),
            _request: &'a FetchRequest,
        ) -> BoxStream<'a, Result<RawPost, CoreError>> {
            stream::iter(self.steps.iter().map(move |step| {
                self.pulled.fetch_add(1, Ordering::SeqCst);
                match step {
                    Step::Item(value) => Ok(RawPost::new(value.clone())),
                    Step::Fail => Err(CoreError::TransientFailure {
                        operation: "fetch_top_posts".to_string(),
                        attempts: 3,
                        last_error: "server error 503".to_string(),
                    }),
                }
            }))
            .boxed()
        }
    }

    fn post(id: &str) -> Step {
        Step::Item(json!({
            "id": id,
            "title": format!("title {}", id),
            "author": "someone",
            "score": 10,
            "created_utc": 1_700_000_000,
            "permalink": format!("/r/dataengineering/comments/{}/", id)
        }))
    }

    fn malformed(id: &str) -> Step {
        Step::Item(json!({"id": id, "title": "no score"}))
    }

    fn credentials() -> Credentials {
        Credentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            user_agent: "test".to_string(),
        }
    }

    fn request(limit: Option<u32>) -> FetchRequest {
        FetchRequest::new("dataengineering", TimeFilter::Day, limit).unwrap()
    }

    fn ids(extraction: &Extraction) -> Vec<&str> {
        extraction.batch.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_stops_after_limit_posts() {
        let steps = (0..10).map(|i| post(&format!("p{}", i))).collect();
        let engine = ExtractionEngine::new(StubClient::new(steps));

        let extraction = engine.run(&request(Some(4)), &credentials()).await.unwrap();

        assert_eq!(ids(&extraction), vec!["p0", "p1", "p2", "p3"]);
        assert_eq!(engine.client().pulled(), 4);
    }

    #[tokio::test]
    async fn test_fewer_posts_than_limit() {
        let engine = ExtractionEngine::new(StubClient::new(vec![post("a"), post("b")]));

        let extraction = engine.run(&request(Some(100)), &credentials()).await.unwrap();

        assert_eq!(ids(&extraction), vec!["a", "b"]);
        assert_eq!(extraction.stats.fetched, 2);
    }

    #[tokio::test]
    async fn test_malformed_items_are_skipped_in_order() {
        let steps = vec![post("a"), malformed("bad"), post("b"), malformed("worse"), post("c")];
        let engine = ExtractionEngine::new(StubClient::new(steps));

        let extraction = engine.run(&request(None), &credentials()).await.unwrap();

        assert_eq!(ids(&extraction), vec!["a", "b", "c"]);
        assert_eq!(
            extraction.stats,
            ExtractionStats {
                fetched: 5,
                skipped_malformed: 2,
                skipped_duplicate: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_item_within_limit_is_replaced_by_next_post() {
        let steps = vec![malformed("bad"), post("a"), post("b"), post("c"), post("d")];
        let engine = ExtractionEngine::new(StubClient::new(steps));

        let extraction = engine.run(&request(Some(3)), &credentials()).await.unwrap();

        assert_eq!(ids(&extraction), vec!["a", "b", "c"]);
        assert_eq!(extraction.stats.skipped_malformed, 1);
        assert_eq!(engine.client().pulled(), 4);
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_first_occurrence() {
        let steps = vec![post("a"), post("b"), post("a"), post("c")];
        let engine = ExtractionEngine::new(StubClient::new(steps));

        let extraction = engine.run(&request(Some(3)), &credentials()).await.unwrap();

        assert_eq!(ids(&extraction), vec!["a", "b", "c"]);
        assert_eq!(extraction.stats.skipped_duplicate, 1);
    }

    #[tokio::test]
    async fn test_stream_error_aborts_without_partial_batch() {
        let steps = vec![post("a"), post("b"), Step::Fail, post("c")];
        let engine = ExtractionEngine::new(StubClient::new(steps));

        let result = engine.run(&request(Some(10)), &credentials()).await;

        assert!(matches!(
            result,
            Err(CoreError::TransientFailure { attempts: 3, .. })
        ));
        assert_eq!(engine.client().pulled(), 3);
    }

    #[tokio::test]
    async fn test_empty_stream_is_an_empty_batch() {
        let engine = ExtractionEngine::new(StubClient::new(Vec::new()));

        let extraction = engine.run(&request(Some(10)), &credentials()).await.unwrap();

        assert!(extraction.batch.is_empty());
        assert_eq!(extraction.stats, ExtractionStats::default());
    }

    #[tokio::test]
    async fn test_connect_failure_is_propagated() {
        let mut client = StubClient::new(vec![post("a")]);
        client.reject_credentials = true;
        let engine = ExtractionEngine::new(client);

        let result = engine.run(&request(Some(10)), &credentials()).await;

        assert!(matches!(result, Err(CoreError::Auth { .. })));
        assert_eq!(engine.client().pulled(), 0);
    }
}
