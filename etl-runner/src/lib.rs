//! Entry point shape expected by the scheduler: resolve the run parameters,
//! extract, write, and report one exit status.

pub mod config;

pub use config::{OutputConfig, OutputOverrides, PipelineConfig};

use batch_writer::{BatchWriter, WriteResult};
use chrono::{NaiveDate, Utc};
use etl_core::{
    CoreError, CredentialSource, FetchRequest, RunId, TimeFilter, EXIT_OK,
};
use extraction_engine::{ExtractionEngine, ExtractionStats};
use reddit_client::ForumClient;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub const DEFAULT_SUBREDDIT: &str = "dataengineering";
pub const DEFAULT_TIME_FILTER: &str = "day";
pub const DEFAULT_LIMIT: u32 = 100;

/// Parameters a scheduler passes to one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParams {
    /// Output name, used as the run id. Defaults to `reddit_<YYYYMMDD>`.
    pub output_name: Option<String>,
    pub subreddit: String,
    pub time_filter: String,
    pub limit: Option<u32>,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            output_name: None,
            subreddit: DEFAULT_SUBREDDIT.to_string(),
            time_filter: DEFAULT_TIME_FILTER.to_string(),
            limit: Some(DEFAULT_LIMIT),
        }
    }
}

impl RunParams {
    pub fn run_id(&self, today: NaiveDate) -> Result<RunId, CoreError> {
        match &self.output_name {
            Some(name) => Ok(RunId::new(name)?),
            None => Ok(RunId::for_date(today)),
        }
    }

    pub fn fetch_request(&self) -> Result<FetchRequest, CoreError> {
        let time_filter: TimeFilter = self.time_filter.parse()?;
        Ok(FetchRequest::new(&self.subreddit, time_filter, self.limit)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: RunId,
    pub subreddit: String,
    pub stats: ExtractionStats,
    pub write: WriteResult,
    pub elapsed: Duration,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {}: wrote {} posts from r/{} to {} ({} fetched, {} malformed, {} duplicate) in {:.1}s",
            self.run_id,
            self.write.records_written,
            self.subreddit,
            self.write.destination,
            self.stats.fetched,
            self.stats.skipped_malformed,
            self.stats.skipped_duplicate,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Run the whole pipeline once.
///
/// Parameters and credentials are validated before any network call. The
/// batch is written only if extraction completed; a failed run leaves the
/// destination as it was.
pub async fn run_pipeline<C: ForumClient>(
    params: &RunParams,
    credentials: &dyn CredentialSource,
    client: C,
    writer: &dyn BatchWriter,
) -> Result<RunReport, CoreError> {
    let run_id = params.run_id(Utc::now().date_naive())?;
    let span = info_span!(
        "etl_run",
        run_id = %run_id,
        correlation_id = %Uuid::new_v4()
    );

    async move {
        let started = Instant::now();
        let request = params.fetch_request()?;
        let credentials = credentials.load()?;

        info!(
            "Starting run for r/{} (t={}, limit={:?})",
            request.subreddit, request.time_filter, request.limit
        );

        let engine = ExtractionEngine::new(client);
        let extraction = engine.run(&request, &credentials).await?;
        let write = writer.write(&run_id, &extraction.batch).await?;

        let report = RunReport {
            run_id: run_id.clone(),
            subreddit: request.subreddit.clone(),
            stats: extraction.stats,
            write,
            elapsed: started.elapsed(),
        };
        info!("{}", report);
        Ok(report)
    }
    .instrument(span)
    .await
}

/// Process exit status for a finished run.
pub fn exit_status(result: &Result<RunReport, CoreError>) -> u8 {
    match result {
        Ok(_) => EXIT_OK,
        Err(e) => e.exit_code(),
    }
}
