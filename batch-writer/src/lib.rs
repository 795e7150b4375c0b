//! Durable, idempotent sinks for extracted batches.
//!
//! Every sink keys its output by [`RunId`]: writing the same run twice
//! replaces the first write, and a write that fails leaves whatever was
//! there before untouched.

pub mod file;
pub mod sqlite;

pub use file::{ensure_output_dir, FileBatchWriter, StagedFile};
pub use sqlite::SqliteBatchWriter;

use async_trait::async_trait;
use etl_core::{Batch, ConfigError, RunId, WriteError};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// Human-readable location of the written batch.
    pub destination: String,
    pub records_written: usize,
    /// Whether an earlier write for the same run id was replaced.
    pub replaced_previous: bool,
}

#[async_trait]
pub trait BatchWriter: Send + Sync {
    async fn write(&self, run_id: &RunId, batch: &Batch) -> Result<WriteResult, WriteError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line.
    #[default]
    #[serde(alias = "jsonl")]
    JsonLines,
    /// A single pretty-printed JSON array.
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::JsonLines => "jsonl",
            OutputFormat::Json => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jsonl" | "jsonlines" | "ndjson" => Ok(OutputFormat::JsonLines),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ConfigError::InvalidValue {
                field: "output.format".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("jsonl".parse::<OutputFormat>().unwrap(), OutputFormat::JsonLines);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("csv".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::default().extension(), "jsonl");
    }

    #[test]
    fn test_output_format_deserializes_from_config() {
        #[derive(Deserialize)]
        struct Output {
            format: OutputFormat,
        }

        let parsed: Output = serde_json::from_str(r#"{"format": "jsonl"}"#).unwrap();
        assert_eq!(parsed.format, OutputFormat::JsonLines);
        let parsed: Output = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(parsed.format, OutputFormat::Json);
    }
}
