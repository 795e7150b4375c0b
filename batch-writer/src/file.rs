use crate::{BatchWriter, OutputFormat, WriteResult};
use async_trait::async_trait;
use etl_core::{Batch, RunId, WriteError};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Ensure the output directory exists and accepts new files.
pub fn ensure_output_dir(dir: &Path) -> Result<(), WriteError> {
    let destination = |reason: String| WriteError::Destination {
        path: dir.display().to_string(),
        reason,
    };

    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| destination(e.to_string()))?;
        if !meta.is_dir() {
            return Err(destination("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| destination(e.to_string()))?;
    }
    NamedTempFile::new_in(dir).map_err(|e| destination(e.to_string()))?;
    Ok(())
}

/// Flush a directory entry change (a rename into `dir`) to disk.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Writes each batch to `<dir>/<run_id>.<ext>`.
#[derive(Debug, Clone)]
pub struct FileBatchWriter {
    dir: PathBuf,
    format: OutputFormat,
}

impl FileBatchWriter {
    pub fn new(dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn path_for(&self, run_id: &RunId) -> PathBuf {
        self.dir
            .join(format!("{}.{}", run_id, self.format.extension()))
    }

    /// Write the batch to a temp file next to its destination. Nothing is
    /// visible at the destination until [`StagedFile::commit`]; dropping the
    /// stage removes the temp file.
    pub fn stage(&self, run_id: &RunId, batch: &Batch) -> Result<StagedFile, WriteError> {
        ensure_output_dir(&self.dir)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut out = io::BufWriter::new(tmp.as_file_mut());
            match self.format {
                OutputFormat::JsonLines => {
                    for post in batch {
                        serde_json::to_writer(&mut out, post)?;
                        out.write_all(b"\n")?;
                    }
                }
                OutputFormat::Json => {
                    serde_json::to_writer_pretty(&mut out, batch.posts())?;
                    out.write_all(b"\n")?;
                }
            }
            out.flush()?;
        }
        tmp.as_file_mut().sync_all()?;
        debug!("Staged {} posts at {}", batch.len(), tmp.path().display());

        Ok(StagedFile {
            tmp,
            target: self.path_for(run_id),
            records: batch.len(),
        })
    }
}

/// A fully written, fsynced batch waiting to be moved into place.
#[derive(Debug)]
pub struct StagedFile {
    tmp: NamedTempFile,
    target: PathBuf,
    records: usize,
}

impl StagedFile {
    pub fn temp_path(&self) -> &Path {
        self.tmp.path()
    }

    /// Atomically rename the staged file over the destination, then sync the
    /// directory so the rename survives a crash.
    pub fn commit(self) -> Result<WriteResult, WriteError> {
        let replaced_previous = self.target.exists();
        self.tmp
            .persist(&self.target)
            .map_err(|e| WriteError::Io(e.error))?;
        if let Some(parent) = self.target.parent() {
            sync_dir(parent)?;
        }

        Ok(WriteResult {
            destination: self.target.display().to_string(),
            records_written: self.records,
            replaced_previous,
        })
    }
}

#[async_trait]
impl BatchWriter for FileBatchWriter {
    async fn write(&self, run_id: &RunId, batch: &Batch) -> Result<WriteResult, WriteError> {
        let writer = self.clone();
        let run_id = run_id.clone();
        let batch = batch.clone();

        let result = tokio::task::spawn_blocking(move || {
            writer.stage(&run_id, &batch)?.commit()
        })
        .await
        .map_err(|e| WriteError::Io(io::Error::new(io::ErrorKind::Other, e)))??;

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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use etl_core::Post;
    use tempfile::TempDir;

    fn post(id: &str, score: i64) -> Post {
        Post {
            id: id.to_string(),
            title: format!("title {}", id),
            author: "someone".to_string(),
            score,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            permalink: format!("https://www.reddit.com/r/x/comments/{}/", id),
            num_comments: Some(1),
            url: None,
        }
    }

    fn batch(ids: &[&str]) -> Batch {
        Batch::new(ids.iter().map(|id| post(id, 1)).collect())
    }

    fn run_id() -> RunId {
        RunId::new("reddit_20240608").unwrap()
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_creates_missing_output_dir() {
        let temp = TempDir::new().unwrap();
        let new_dir = temp.path().join("out").join("daily");
        ensure_output_dir(&new_dir).unwrap();
        assert!(new_dir.is_dir());
    }

    #[tokio::test]
    async fn test_writes_json_lines_in_order() {
        let temp = TempDir::new().unwrap();
        let writer = FileBatchWriter::new(temp.path(), OutputFormat::JsonLines);

        let result = writer.write(&run_id(), &batch(&["a", "b", "c"])).await.unwrap();

        assert_eq!(result.records_written, 3);
        assert!(!result.replaced_previous);
        let content = fs::read_to_string(temp.path().join("reddit_20240608.jsonl")).unwrap();
        let ids: Vec<String> = content
            .lines()
            .map(|line| serde_json::from_str::<Post>(line).unwrap().id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_json_array_format() {
        let temp = TempDir::new().unwrap();
        let writer = FileBatchWriter::new(temp.path(), OutputFormat::Json);

        writer.write(&run_id(), &batch(&["a", "b"])).await.unwrap();

        let content = fs::read_to_string(temp.path().join("reddit_20240608.json")).unwrap();
        let posts: Vec<Post> = serde_json::from_str(&content).unwrap();
        assert_eq!(posts, batch(&["a", "b"]).into_posts());
    }

    #[tokio::test]
    async fn test_rewrite_replaces_instead_of_appending() {
        let temp = TempDir::new().unwrap();
        let writer = FileBatchWriter::new(temp.path(), OutputFormat::JsonLines);

        writer.write(&run_id(), &batch(&["a", "b", "c"])).await.unwrap();
        let second = writer.write(&run_id(), &batch(&["a", "b", "c"])).await.unwrap();

        assert!(second.replaced_previous);
        let content = fs::read_to_string(writer.path_for(&run_id())).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert_eq!(entries(temp.path()), vec!["reddit_20240608.jsonl"]);
    }

    #[tokio::test]
    async fn test_empty_batch_writes_empty_file() {
        let temp = TempDir::new().unwrap();
        let writer = FileBatchWriter::new(temp.path(), OutputFormat::JsonLines);

        let result = writer.write(&run_id(), &Batch::default()).await.unwrap();

        assert_eq!(result.records_written, 0);
        assert_eq!(fs::read_to_string(writer.path_for(&run_id())).unwrap(), "");
    }

    #[test]
    fn test_dropped_stage_leaves_destination_untouched() {
        let temp = TempDir::new().unwrap();
        let writer = FileBatchWriter::new(temp.path(), OutputFormat::JsonLines);
        writer.stage(&run_id(), &batch(&["old"])).unwrap().commit().unwrap();
        let before = fs::read_to_string(writer.path_for(&run_id())).unwrap();

        let staged = writer.stage(&run_id(), &batch(&["new1", "new2"])).unwrap();
        let temp_path = staged.temp_path().to_path_buf();
        assert!(temp_path.exists());
        drop(staged);

        assert!(!temp_path.exists());
        assert_eq!(fs::read_to_string(writer.path_for(&run_id())).unwrap(), before);
        assert_eq!(entries(temp.path()), vec!["reddit_20240608.jsonl"]);
    }

    #[test]
    fn test_commit_syncs_destination_directory() {
        let temp = TempDir::new().unwrap();
        sync_dir(temp.path()).unwrap();

        let writer = FileBatchWriter::new(temp.path(), OutputFormat::JsonLines);
        let result = writer.stage(&run_id(), &batch(&["a"])).unwrap().commit().unwrap();
        assert_eq!(result.records_written, 1);
        assert_eq!(entries(temp.path()), vec!["reddit_20240608.jsonl"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_sync_of_missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        assert!(sync_dir(&temp.path().join("gone")).is_err());
    }

    #[tokio::test]
    async fn test_unusable_destination_is_write_error() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("not_a_dir");
        fs::write(&file_path, "x").unwrap();

        let writer = FileBatchWriter::new(&file_path, OutputFormat::JsonLines);
        let result = writer.write(&run_id(), &batch(&["a"])).await;

        assert!(matches!(result, Err(WriteError::Destination { .. })));
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "x");
    }
}
