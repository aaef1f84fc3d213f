//! Submission log - bounded audit trail of recent answers.
//!
//! One row per question, keyed by identifier: a newer row for the same
//! question replaces the older one. Capacity equals the question count;
//! beyond it the least recently written question drops out.
//!
//! File: <state_dir>/questions_log.jsonl, oldest row first.

use crate::identifier::QuestionId;
use crate::state_files::atomic_write;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::warn;

/// Single log row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub round: u64,
    pub question: QuestionId,
    /// "question | opt1|opt2|..." as rendered on screen
    pub snapshot: String,
    pub chosen: u8,
    /// Aggregate score, None when undetermined
    pub score: Option<u32>,
    pub recorded_at: DateTime<Utc>,
}

impl LogRow {
    pub fn new(round: u64, question: QuestionId, snapshot: String, chosen: u8, score: Option<u32>) -> Self {
        Self {
            round,
            question,
            snapshot,
            chosen,
            score,
            recorded_at: Utc::now(),
        }
    }
}

/// Capacity-bounded submission log
pub struct SubmissionLog {
    rows: LruCache<QuestionId, LogRow>,
}

fn non_zero(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

impl SubmissionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            rows: LruCache::new(non_zero(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.rows.cap().get()
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.rows.resize(non_zero(capacity));
    }

    /// Write a row, replacing any row for the same question.
    /// Returns the question evicted to make room, if any.
    pub fn record(&mut self, row: LogRow) -> Option<QuestionId> {
        let key = row.question.clone();
        match self.rows.push(key.clone(), row) {
            Some((evicted, _)) if evicted != key => Some(evicted),
            _ => None,
        }
    }

    pub fn get(&self, question: &QuestionId) -> Option<&LogRow> {
        self.rows.peek(question)
    }

    /// Rows from oldest to newest
    pub fn rows(&self) -> Vec<&LogRow> {
        let mut rows: Vec<&LogRow> = self.rows.iter().map(|(_, row)| row).collect();
        rows.reverse();
        rows
    }

    /// Load from JSONL, skipping malformed lines
    pub fn load(path: &Path, capacity: usize) -> Self {
        let mut log = Self::new(capacity);
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                if path.exists() {
                    warn!("Cannot read submission log {}: {}, starting fresh", path.display(), e);
                }
                return log;
            }
        };

        let mut skipped = 0usize;
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogRow>(line) {
                Ok(row) => {
                    log.record(row);
                }
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!("Skipped {} malformed submission log lines", skipped);
        }
        log
    }

    /// Rewrite the whole file atomically
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let mut out = String::new();
        for row in self.rows() {
            out.push_str(&serde_json::to_string(row)?);
            out.push('\n');
        }
        atomic_write(path, out.as_bytes())
    }
}
