//! `reddit-etl`: pull a subreddit's top posts and write them as one batch.
//!
//! ```bash
//! REDDIT_CLIENT_ID=... REDDIT_CLIENT_SECRET=... \
//!     reddit-etl --subreddit dataengineering --time-filter day --limit 100
//! ```
//!
//! The process exit status tells the scheduler how the run ended; see
//! `etl_core::error_utils` for the mapping.

use batch_writer::{BatchWriter, FileBatchWriter, OutputFormat, SqliteBatchWriter};
use clap::Parser;
use etl_core::{CoreError, EnvCredentials, ErrorReporter};
use etl_runner::{
    exit_status, run_pipeline, OutputOverrides, PipelineConfig, RunParams, RunReport,
    DEFAULT_LIMIT, DEFAULT_SUBREDDIT, DEFAULT_TIME_FILTER,
};
use reddit_client::RedditClient;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "reddit_etl=info,etl_runner=info,extraction_engine=info,reddit_client=info,batch_writer=info";

#[derive(Parser, Debug)]
#[command(
    name = "reddit-etl",
    version,
    about = "Extract a subreddit's top posts into a durable, idempotent batch"
)]
struct Cli {
    /// Name of the output, also the idempotency key. Defaults to `reddit_<YYYYMMDD>`.
    #[arg(long)]
    output_name: Option<String>,

    #[arg(long, default_value = DEFAULT_SUBREDDIT)]
    subreddit: String,

    /// One of hour, day, week, month, year, all.
    #[arg(long, default_value = DEFAULT_TIME_FILTER)]
    time_filter: String,

    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    limit: u32,

    /// Optional TOML file with `[api]`, `[retry]`, `[rate_limit]` and `[output]` sections.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for file output. Overrides `output.dir`.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// `jsonl` or `json`. Overrides `output.format`.
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Write to this SQLite database instead of files. Overrides `output.sqlite_url`.
    #[arg(long)]
    sqlite_url: Option<String>,
}

impl Cli {
    fn params(&self) -> RunParams {
        RunParams {
            output_name: self.output_name.clone(),
            subreddit: self.subreddit.clone(),
            time_filter: self.time_filter.clone(),
            limit: Some(self.limit),
        }
    }

    fn overrides(&self) -> OutputOverrides {
        OutputOverrides {
            dir: self.output_dir.clone(),
            format: self.format,
            sqlite_url: self.sqlite_url.clone(),
        }
    }

    fn pipeline_config(&self) -> Result<PipelineConfig, CoreError> {
        Ok(PipelineConfig::resolve(
            self.config.as_deref(),
            &self.overrides(),
        )?)
    }
}

async fn build_writer(config: &PipelineConfig) -> Result<Box<dyn BatchWriter>, CoreError> {
    Ok(match &config.output.sqlite_url {
        Some(url) => Box::new(SqliteBatchWriter::connect(url).await?),
        None => Box::new(FileBatchWriter::new(
            config.output.dir.clone(),
            config.output.format,
        )),
    })
}

async fn run(cli: &Cli) -> Result<RunReport, CoreError> {
    let config = cli.pipeline_config()?;
    let client = RedditClient::new(&config.api, config.retry.clone(), config.rate_limit.clone())?;
    let writer = build_writer(&config).await?;

    run_pipeline(&cli.params(), &EnvCredentials, client, writer.as_ref()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!("Starting reddit-etl {}", env!("CARGO_PKG_VERSION"));
    let result = run(&cli).await;

    match &result {
        Ok(report) => println!("{}", report),
        Err(e) => {
            let reporter = ErrorReporter::new();
            reporter.report_error(e);
            eprintln!("{}", reporter.summary(e));
        }
    }

    ExitCode::from(exit_status(&result))
}
