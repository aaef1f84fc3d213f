//! Run State - durable round counter and strategy position
//!
//! State file: <state_dir>/run_state.json
//!
//! Never deleted by the engine, only overwritten. A process that dies at
//! any point resumes from the last saved copy.

use crate::config::StrategyKind;
use crate::identifier::QuestionId;
use crate::state_files::{load_json_or_default, save_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Coordinate Ascent position, enough to resume mid-pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AscentCursor {
    /// Committed answer vector
    pub answers: BTreeMap<QuestionId, u8>,
    /// Score of the committed vector. None: it must be (re)submitted first.
    pub baseline: Option<u32>,
    /// Visit order for the current pass
    pub order: Vec<QuestionId>,
    /// Index into `order` of the question under trial
    pub position: usize,
    /// Next option to trial for that question
    pub trial_option: u8,
    /// Best (option, score) strictly above baseline found for it so far
    pub pass_best: Option<(u8, u32)>,
    /// Whether any question was improved this pass
    pub improved: bool,
    /// Highest score observed by this search
    pub best_seen: Option<u32>,
    /// Number of completed passes
    pub passes: u64,
}

impl AscentCursor {
    pub fn new(answers: BTreeMap<QuestionId, u8>) -> Self {
        Self {
            answers,
            baseline: None,
            order: Vec::new(),
            position: 0,
            trial_option: 1,
            pass_best: None,
            improved: false,
            best_seen: None,
            passes: 0,
        }
    }

    /// Question currently under trial, if a pass is in progress
    pub fn current_question(&self) -> Option<&QuestionId> {
        if self.baseline.is_none() {
            return None;
        }
        self.order.get(self.position)
    }
}

/// Durable run record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Completed rounds, monotonically increasing
    #[serde(default)]
    pub round: u64,
    /// Rotation Sweep experiment target (question position)
    #[serde(default)]
    pub active_index: usize,
    /// Strategy that wrote this state
    #[serde(default)]
    pub strategy: StrategyKind,
    /// Coordinate Ascent scratch
    #[serde(default)]
    pub ascent: Option<AscentCursor>,
    /// Answer vector that scored perfectly, once found
    #[serde(default)]
    pub solved: Option<Vec<u8>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            round: 0,
            active_index: 0,
            strategy: StrategyKind::default(),
            ascent: None,
            solved: None,
            updated_at: None,
        }
    }
}

impl RunState {
    /// Load from disk, fresh state on missing or corrupt data
    pub fn load(path: &Path) -> Self {
        load_json_or_default(path, "run state")
    }

    /// Overwrite the backing file
    pub fn save(&mut self, path: &Path) -> std::io::Result<()> {
        self.updated_at = Some(Utc::now());
        save_json(path, self)
    }

    /// (round, active_index) pair
    pub fn position(&self) -> (u64, usize) {
        (self.round, self.active_index)
    }

    pub fn is_solved(&self) -> bool {
        self.solved.is_some()
    }
}
