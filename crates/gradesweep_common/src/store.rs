//! Question Store - per-question memory with bounded capacity
//!
//! Layout:
//! - slots: arena of records, freed slots reused through a free list
//! - index: QuestionId -> slot
//! - recency: touch tick -> slot, ordered, oldest first
//!
//! Eviction pops the oldest tick from the recency index. No container is
//! mutated while it is being walked.
//!
//! On disk: question_memory.json, records listed least to most recently touched.

use crate::identifier::QuestionId;
use crate::state_files::{load_json_or_default, save_json};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Store file format version
pub const STORE_VERSION: u32 = 1;

/// Longest question preview kept in a record
const PREVIEW_CHARS: usize = 80;

/// One submission of a question with a given option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub option: u8,
    /// Aggregate score of the round, None when the grade was undetermined
    pub score: Option<u32>,
    pub round: u64,
}

/// Memory kept for a single question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: QuestionId,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub trials: Vec<Trial>,
    /// Rotation Sweep pointer, always in 1..=K
    #[serde(default = "first_option")]
    pub current_option: u8,
    /// Option with the highest mean score over its own trials
    #[serde(default)]
    pub best_option: Option<u8>,
    /// Mean score of best_option
    #[serde(default)]
    pub best_score: Option<f64>,
    /// Suggested starting option, used until a trial is scored
    #[serde(default)]
    pub prior_option: Option<u8>,
}

fn first_option() -> u8 {
    1
}

/// Per-option aggregate over scored trials
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionStats {
    pub mean: f64,
    /// Scored trials only
    pub scored: usize,
    /// All trials, undetermined included
    pub total: usize,
}

impl QuestionRecord {
    pub fn new(id: QuestionId, text: &str) -> Self {
        Self {
            id,
            preview: text.chars().take(PREVIEW_CHARS).collect(),
            trials: Vec::new(),
            current_option: first_option(),
            best_option: None,
            best_score: None,
            prior_option: None,
        }
    }

    /// Fixed default used when this question is not under experiment:
    /// measured best, then prior, then option 1
    pub fn default_option(&self) -> u8 {
        self.best_option.or(self.prior_option).unwrap_or(1)
    }

    /// Nothing measured or suggested yet
    pub fn is_unseeded(&self) -> bool {
        self.trials.is_empty() && self.best_option.is_none() && self.prior_option.is_none()
    }

    /// Per-option stats. Undetermined trials count toward `total` only.
    pub fn option_stats(&self) -> BTreeMap<u8, OptionStats> {
        let mut sums: BTreeMap<u8, (u64, usize, usize)> = BTreeMap::new();
        for trial in &self.trials {
            let entry = sums.entry(trial.option).or_insert((0, 0, 0));
            entry.2 += 1;
            if let Some(score) = trial.score {
                entry.0 += score as u64;
                entry.1 += 1;
            }
        }

        sums.into_iter()
            .map(|(option, (sum, scored, total))| {
                let mean = if scored == 0 {
                    0.0
                } else {
                    sum as f64 / scored as f64
                };
                (option, OptionStats { mean, scored, total })
            })
            .collect()
    }

    /// Recompute best_option/best_score from history.
    ///
    /// Highest mean wins, ties go to the lower option number. Options with
    /// no scored trial are not candidates.
    pub fn recompute_best(&mut self) {
        let mut best: Option<(u8, f64)> = None;
        for (option, stats) in self.option_stats() {
            if stats.scored == 0 {
                continue;
            }
            match best {
                Some((_, mean)) if stats.mean <= mean => {}
                _ => best = Some((option, stats.mean)),
            }
        }
        self.best_option = best.map(|(o, _)| o);
        self.best_score = best.map(|(_, m)| m);
    }

    /// Append a trial and refresh the best-option cache
    pub fn record_trial(&mut self, option: u8, score: Option<u32>, round: u64) {
        self.trials.push(Trial {
            option,
            score,
            round,
        });
        self.recompute_best();
    }

    /// Advance current_option, wrapping past `option_count` back to 1.
    /// Returns true on wrap.
    pub fn advance_current(&mut self, option_count: u8) -> bool {
        let next = self.current_option.saturating_add(1);
        if next > option_count.max(1) {
            self.current_option = 1;
            true
        } else {
            self.current_option = next;
            false
        }
    }

    /// Scored trial count
    pub fn scored_trials(&self) -> usize {
        self.trials.iter().filter(|t| t.score.is_some()).count()
    }
}

#[derive(Debug, Clone)]
struct Slot {
    record: QuestionRecord,
    touched: u64,
}

/// On-disk form of the store
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    records: Vec<QuestionRecord>,
}

/// Capacity-bounded question memory with least-recently-touched eviction
#[derive(Debug, Clone)]
pub struct QuestionStore {
    capacity: usize,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<QuestionId, usize>,
    recency: BTreeMap<u64, usize>,
    tick: u64,
}

impl QuestionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change capacity, evicting the oldest records if now over it
    pub fn set_capacity(&mut self, capacity: usize) -> Vec<QuestionRecord> {
        self.capacity = capacity.max(1);
        let mut evicted = Vec::new();
        while self.len() > self.capacity {
            match self.evict_oldest() {
                Some(record) => evicted.push(record),
                None => break,
            }
        }
        evicted
    }

    pub fn contains(&self, id: &QuestionId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &QuestionId) -> Option<&QuestionRecord> {
        let slot = *self.index.get(id)?;
        self.slots[slot].as_ref().map(|s| &s.record)
    }

    /// Mutable access without changing recency
    pub fn get_mut(&mut self, id: &QuestionId) -> Option<&mut QuestionRecord> {
        let slot = *self.index.get(id)?;
        self.slots[slot].as_mut().map(|s| &mut s.record)
    }

    /// Mark a record as most recently touched. False if absent.
    pub fn touch(&mut self, id: &QuestionId) -> bool {
        let Some(&slot) = self.index.get(id) else {
            return false;
        };
        self.tick += 1;
        let tick = self.tick;
        if let Some(s) = self.slots[slot].as_mut() {
            self.recency.remove(&s.touched);
            s.touched = tick;
            self.recency.insert(tick, slot);
        }
        true
    }

    /// Touch an existing record or create it, evicting the least recently
    /// touched record when full. Returns the evicted record, if any.
    pub fn ensure(&mut self, id: &QuestionId, text: &str) -> Option<QuestionRecord> {
        if self.touch(id) {
            return None;
        }

        let evicted = if self.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        self.insert_new(QuestionRecord::new(id.clone(), text));
        evicted
    }

    fn insert_new(&mut self, record: QuestionRecord) {
        self.tick += 1;
        let id = record.id.clone();
        let slot = Slot {
            record,
            touched: self.tick,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, idx);
        self.recency.insert(self.tick, idx);
    }

    fn evict_oldest(&mut self) -> Option<QuestionRecord> {
        let (&tick, &slot) = self.recency.iter().next()?;
        self.recency.remove(&tick);
        let removed = self.slots[slot].take()?;
        self.index.remove(&removed.record.id);
        self.free.push(slot);
        debug!("Evicted question {} from memory", removed.record.id.short());
        Some(removed.record)
    }

    /// Records from least to most recently touched
    pub fn iter_by_recency(&self) -> impl Iterator<Item = &QuestionRecord> {
        self.recency
            .values()
            .filter_map(move |&slot| self.slots[slot].as_ref().map(|s| &s.record))
    }

    /// Ids from least to most recently touched
    pub fn ids_by_recency(&self) -> Vec<QuestionId> {
        self.iter_by_recency().map(|r| r.id.clone()).collect()
    }

    /// Load from disk. Missing or corrupt data gives an empty store.
    pub fn load(path: &Path, capacity: usize) -> Self {
        let file: StoreFile = load_json_or_default(path, "question memory");
        let mut store = Self::new(capacity);
        for record in file.records {
            if store.contains(&record.id) {
                continue;
            }
            if store.len() >= store.capacity {
                store.evict_oldest();
            }
            store.insert_new(record);
        }
        if !store.is_empty() {
            info!("Loaded memory: {} questions", store.len());
        }
        store
    }

    /// Overwrite the backing file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let file = StoreFile {
            version: STORE_VERSION,
            records: self.iter_by_recency().cloned().collect(),
        };
        save_json(path, &file)
    }
}
