use crate::{BatchWriter, WriteResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use etl_core::{Batch, Post, RunId, WriteError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, error, info};

const CREATE_POSTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    run_id       TEXT    NOT NULL,
    id           TEXT    NOT NULL,
    position     INTEGER NOT NULL,
    title        TEXT    NOT NULL,
    author       TEXT    NOT NULL,
    score        INTEGER NOT NULL CHECK (score >= 0),
    created_at   TEXT    NOT NULL,
    permalink    TEXT    NOT NULL,
    num_comments INTEGER,
    url          TEXT,
    written_at   TEXT    NOT NULL,
    PRIMARY KEY (run_id, id)
)
"#;

type PostRow = (
    String,
    String,
    String,
    i64,
    DateTime<Utc>,
    String,
    Option<i64>,
    Option<String>,
);

/// Stores batches in a `posts` table keyed by `(run_id, id)`.
#[derive(Debug, Clone)]
pub struct SqliteBatchWriter {
    pool: SqlitePool,
    url: String,
}

impl SqliteBatchWriter {
    /// Open (creating if needed) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self, WriteError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| WriteError::Destination {
                path: url.to_string(),
                reason: e.to_string(),
            })?
            .create_if_missing(true);

        // In-memory databases live and die with their single connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| WriteError::Destination {
                path: url.to_string(),
                reason: e.to_string(),
            })?;

        Self::from_pool(pool, url).await
    }

    pub async fn from_pool(pool: SqlitePool, url: &str) -> Result<Self, WriteError> {
        sqlx::query(CREATE_POSTS_TABLE).execute(&pool).await?;
        debug!("Ensured posts table in {}", url);
        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    /// Posts stored for a run, in batch order.
    pub async fn load(&self, run_id: &RunId) -> Result<Vec<Post>, WriteError> {
        let rows: Vec<PostRow> = sqlx::query_as(
            r#"
            SELECT id, title, author, score, created_at, permalink, num_comments, url
            FROM posts
            WHERE run_id = ?
            ORDER BY position
            "#,
        )
        .bind(run_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, title, author, score, created_at, permalink, num_comments, url)| Post {
                    id,
                    title,
                    author,
                    score,
                    created_at,
                    permalink,
                    num_comments: num_comments.and_then(|n| u64::try_from(n).ok()),
                    url,
                },
            )
            .collect())
    }

    pub async fn count(&self, run_id: &RunId) -> Result<i64, WriteError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts WHERE run_id = ?")
            .bind(run_id.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl BatchWriter for SqliteBatchWriter {
    /// Replace the run's rows in one transaction. On any failure the
    /// transaction is dropped, which rolls it back.
    async fn write(&self, run_id: &RunId, batch: &Batch) -> Result<WriteResult, WriteError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM posts WHERE run_id = ?")
            .bind(run_id.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let written_at = Utc::now();
        for (position, post) in batch.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO posts (
                    run_id, id, position, title, author, score, created_at,
                    permalink, num_comments, url, written_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(run_id.as_str())
            .bind(&post.id)
            .bind(position as i64)
            .bind(&post.title)
            .bind(&post.author)
            .bind(post.score)
            .bind(post.created_at)
            .bind(&post.permalink)
            .bind(post.num_comments.and_then(|n| i64::try_from(n).ok()))
            .bind(&post.url)
            .bind(written_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Insert of post {} for run {} failed: {}", post.id, run_id, e);
                WriteError::TransactionFailed {
                    reason: format!("insert of post {} failed: {}", post.id, e),
                }
            })?;
        }

        tx.commit().await.map_err(|e| WriteError::TransactionFailed {
            reason: format!("commit failed: {}", e),
        })?;

        let result = WriteResult {
            destination: format!("{} (posts, run_id={})", self.url, run_id),
            records_written: batch.len(),
            replaced_previous: deleted > 0,
        };
        info!(
            "Wrote {} posts to {}{}",
            result.records_written,
            result.destination,
            if result.replaced_previous {
                " (replaced previous run)"
            } else {
                ""
            }
        );
        Ok(result)
    }
}
