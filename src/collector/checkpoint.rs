// Append-only JSONL checkpoint of collected records
//
// The JSONL file is the authoritative record of what has been collected.
// A small sidecar (`<checkpoint>.state`) remembers where paging should resume
// and whether the video was already fully collected.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::errors::CollectError;
use super::models::CommentRecord;
use super::utils::ensure_parent_dir;

/// Paging position persisted next to the checkpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    /// Token of the first page not fully persisted; `None` means start over
    pub resume_token: Option<String>,
    /// The source reported no further pages
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn state_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".state");
        PathBuf::from(name)
    }

    /// All records in append order. Missing or unreadable files yield an empty
    /// list; malformed lines are skipped.
    pub fn load(&self) -> Vec<CommentRecord> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!(path = %self.path.display(), line = line_no + 1, error = %e, "unreadable checkpoint line");
                    skipped += 1;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CommentRecord>(&line) {
                Ok(record) => records.push(record),
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(path = %self.path.display(), skipped, "skipped malformed checkpoint lines");
        }
        records
    }

    /// Append records as JSON lines. The file is opened and closed per call;
    /// earlier lines are never rewritten.
    pub fn append(&self, records: &[CommentRecord]) -> Result<usize, CollectError> {
        if records.is_empty() {
            return Ok(0);
        }
        ensure_parent_dir(&self.path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                CollectError::Io(format!("Failed to open checkpoint {}: {}", self.path.display(), e))
            })?;

        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        let mut writer = BufWriter::new(file);
        writer.write_all(buf.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(records.len())
    }

    pub fn load_state(&self) -> ResumeState {
        std::fs::read_to_string(self.state_path())
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Replace the resume state atomically (temp file + rename)
    pub fn save_state(&self, state: &ResumeState) -> Result<(), CollectError> {
        let state_path = self.state_path();
        ensure_parent_dir(&state_path)?;
        let mut tmp_name = state_path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        std::fs::write(&tmp_path, serde_json::to_vec(state)?)?;
        std::fs::rename(&tmp_path, &state_path)?;
        Ok(())
    }
}

/// In-memory side of a checkpointed fetch: what was collected, what is
/// already on disk, and which ids must not be emitted twice.
pub struct CheckpointedRun {
    store: Option<CheckpointStore>,
    records: Vec<CommentRecord>,
    persisted: usize,
    known_ids: HashSet<String>,
    /// Replies collected so far, per parent id
    reply_counts: HashMap<String, usize>,
    flush_every: usize,
    state: ResumeState,
}

impl CheckpointedRun {
    /// Start a run, preloading whatever the store already holds
    pub fn resume(store: Option<CheckpointStore>, flush_every: usize) -> Self {
        let (records, state) = match &store {
            Some(s) => (s.load(), s.load_state()),
            None => (Vec::new(), ResumeState::default()),
        };
        if let Some(s) = &store {
            if !records.is_empty() {
                info!(
                    path = %s.path().display(),
                    loaded = records.len(),
                    completed = state.completed,
                    "resumed from checkpoint"
                );
            }
        }

        let known_ids = records.iter().filter_map(|r| r.id.clone()).collect();
        let mut reply_counts = HashMap::new();
        for parent in records.iter().filter(|r| r.is_reply).filter_map(|r| r.parent_id.clone()) {
            *reply_counts.entry(parent).or_insert(0) += 1;
        }
        Self {
            store,
            persisted: records.len(),
            records,
            known_ids,
            reply_counts,
            flush_every: flush_every.max(1),
            state,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn state(&self) -> &ResumeState {
        &self.state
    }

    pub fn is_checkpointed(&self) -> bool {
        self.store.is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.known_ids.contains(id)
    }

    /// Replies already collected for `parent_id`
    pub fn reply_count(&self, parent_id: &str) -> usize {
        self.reply_counts.get(parent_id).copied().unwrap_or(0)
    }

    /// Add a record unless its id was already collected. Flushes once
    /// `flush_every` records are pending. Returns whether it was added.
    pub fn push(&mut self, record: CommentRecord) -> bool {
        if let Some(id) = &record.id {
            if !self.known_ids.insert(id.clone()) {
                return false;
            }
        }
        if record.is_reply {
            if let Some(parent) = &record.parent_id {
                *self.reply_counts.entry(parent.clone()).or_insert(0) += 1;
            }
        }
        self.records.push(record);
        if self.records.len() - self.persisted >= self.flush_every {
            if let Err(e) = self.flush() {
                warn!(error = %e, pending = self.records.len() - self.persisted, "checkpoint write failed, will retry");
            }
        }
        true
    }

    /// Persist everything not yet on disk. On failure the records stay
    /// pending in memory and go out with the next flush.
    pub fn flush(&mut self) -> Result<(), CollectError> {
        let Some(store) = &self.store else {
            self.persisted = self.records.len();
            return Ok(());
        };
        let pending = &self.records[self.persisted..];
        if pending.is_empty() {
            return Ok(());
        }
        let written = store.append(pending)?;
        self.persisted = self.records.len();
        info!(path = %store.path().display(), written, total = self.records.len(), "checkpoint saved");
        Ok(())
    }

    /// Flush, then record the page position to resume from. The position is
    /// left untouched when the records could not be written.
    pub fn mark_position(&mut self, resume_token: Option<String>, completed: bool) -> Result<(), CollectError> {
        self.flush()?;
        let state = ResumeState {
            resume_token,
            completed,
        };
        if let Some(store) = &self.store {
            store.save_state(&state)?;
        }
        self.state = state;
        Ok(())
    }

    pub fn into_records(self) -> Vec<CommentRecord> {
        self.records
    }
}
