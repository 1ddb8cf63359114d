// Incremental CSV output for batch runs

use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::errors::CollectError;
use super::models::CommentRecord;
use super::utils::ensure_parent_dir;

pub const CSV_HEADER: [&str; 2] = ["video_url", "comment_or_error"];

/// Placeholder text for a target with no comments and no error
pub const NO_COMMENTS_PLACEHOLDER: &str = "(no comments found)";

/// Row-per-comment CSV writer. Every call flushes, so the file on disk is
/// always a valid prefix of the final output.
pub struct BatchSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl BatchSink {
    /// Create (or truncate) `path` and write the header
    pub fn create(path: &Path) -> Result<Self, CollectError> {
        ensure_parent_dir(path)?;
        let file = File::create(path)
            .map_err(|e| CollectError::Io(format!("Failed to create {}: {}", path.display(), e)))?;

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows written so far (header excluded)
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn write_comments(&mut self, video_url: &str, records: &[CommentRecord]) -> Result<usize, CollectError> {
        for record in records {
            self.writer.write_record([video_url, record.text.as_str()])?;
        }
        self.writer.flush()?;
        self.rows += records.len();
        debug!(video_url, rows = records.len(), "rows flushed");
        Ok(records.len())
    }

    pub fn write_placeholder(&mut self, video_url: &str, text: &str) -> Result<(), CollectError> {
        self.writer.write_record([video_url, text])?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }
}

/// Placeholder text for a failed target
pub fn error_placeholder(error: &str) -> String {
    format!("ERROR: {}", error)
}
