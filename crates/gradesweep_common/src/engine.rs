//! Sweep Engine - owns memory, run state, log and strategy
//!
//! Round protocol:
//! 1. begin_session(exam) once per external session
//! 2. propose(exam) -> answer vector
//! 3. external submit + grade
//! 4. record(exam, proposal, grade): ingestion, strategy step, persist
//!
//! A round is written to disk only after it has been graded, so a crash
//! between 2 and 4 replays the same proposal on restart.

use crate::config::{Config, SearchConfig};
use crate::error::{Result, SweepError};
use crate::exam::{Exam, ExamQuestion, Grade, Proposal};
use crate::identifier::QuestionId;
use crate::ingestion;
use crate::run_state::RunState;
use crate::state_files::StatePaths;
use crate::store::QuestionStore;
use crate::strategy::{Step, Strategy};
use crate::submission_log::SubmissionLog;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// What one recorded round produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub round: u64,
    pub grade: Grade,
    /// Set when this round reached full score
    pub solved: Option<Vec<u8>>,
}

impl RoundReport {
    pub fn is_solved(&self) -> bool {
        self.solved.is_some()
    }
}

pub struct Engine {
    search: SearchConfig,
    paths: StatePaths,
    store: QuestionStore,
    state: RunState,
    log: SubmissionLog,
    strategy: Strategy,
    rng: StdRng,
}

impl Engine {
    /// Load persisted state from the configured directory
    pub fn open(config: &Config) -> Self {
        let paths = StatePaths::new(&config.storage.state_dir);
        let capacity = config
            .search
            .capacity
            .or(config.search.question_count)
            .unwrap_or(usize::MAX);

        let store = QuestionStore::load(&paths.memory(), capacity);
        let state = RunState::load(&paths.run_state());
        let log = SubmissionLog::load(&paths.log(), capacity.min(4096));
        let rng = match config.search.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(state.round)),
            None => StdRng::from_entropy(),
        };

        info!(
            "Engine opened: round {}, active index {}, {} remembered questions",
            state.round,
            state.active_index,
            store.len()
        );

        Self {
            search: config.search.clone(),
            paths,
            store,
            state,
            log,
            strategy: Strategy::from_config(&config.search),
            rng,
        }
    }

    pub fn store(&self) -> &QuestionStore {
        &self.store
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn log(&self) -> &SubmissionLog {
        &self.log
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn is_solved(&self) -> bool {
        self.state.is_solved()
    }

    /// Register the session's questions and reconcile strategy position
    pub fn begin_session(&mut self, exam: &Exam) -> Result<()> {
        self.begin_session_seeded(exam, &BTreeMap::new())
    }

    /// Questions with neither history nor a prior
    pub fn unseeded<'a>(&self, exam: &'a Exam) -> Vec<&'a ExamQuestion> {
        exam.questions
            .iter()
            .filter(|q| self.store.get(&q.id).map_or(true, |r| r.is_unseeded()))
            .collect()
    }

    /// Like `begin_session`, recording suggested starting options first.
    ///
    /// A prior only lands on a record that is still unseeded, and only
    /// when it is a valid option for the question.
    pub fn begin_session_seeded(&mut self, exam: &Exam, priors: &BTreeMap<QuestionId, u8>) -> Result<()> {
        if exam.is_empty() {
            return Err(SweepError::EmptyExam);
        }

        // Touch every live question before shrinking, so only stale
        // questions are evicted.
        let capacity = self.search.capacity_for(exam.len());
        self.store
            .set_capacity(capacity.max(self.store.len() + exam.len()));
        for question in &exam.questions {
            self.store.ensure(&question.id, &question.text);
        }
        for question in &exam.questions {
            let Some(&option) = priors.get(&question.id) else {
                continue;
            };
            let max = question.option_count(self.search.options_per_question);
            match self.store.get_mut(&question.id) {
                Some(record) if record.is_unseeded() && (1..=max).contains(&option) => {
                    debug!("Prior for {}: option {}", question.id.short(), option);
                    record.prior_option = Some(option);
                }
                _ => {}
            }
        }
        let evicted = self.store.set_capacity(capacity);
        if !evicted.is_empty() {
            info!("Evicted {} stale questions from memory", evicted.len());
        }
        self.log.set_capacity(capacity);

        let kind = self.strategy.kind();
        if self.state.strategy != kind {
            info!("Strategy changed from {} to {}", self.state.strategy, kind);
            self.state.strategy = kind;
        }
        self.strategy.prepare(exam, &mut self.store, &mut self.state);
        Ok(())
    }

    /// Next vector to submit
    pub fn propose(&self, exam: &Exam) -> Proposal {
        let proposal = self.strategy.propose(exam, &self.store, &self.state);
        debug!("Round {} proposal: {:?}", proposal.round, proposal.answers);
        proposal
    }

    /// Apply a graded round and persist everything
    pub fn record(&mut self, exam: &Exam, proposal: &Proposal, grade: Grade) -> Result<RoundReport> {
        ingestion::validate(exam, proposal, self.search.options_per_question)?;
        ingestion::ingest(&mut self.store, &mut self.log, exam, proposal, grade)?;

        let step = self.strategy.observe(
            exam,
            &mut self.store,
            &mut self.state,
            proposal,
            grade,
            &mut self.rng,
        );

        self.state.round = self.state.round.max(proposal.round);
        let solved = match step {
            Step::Solved(answers) => {
                info!("Round {} reached full score {}/{}", proposal.round, grade, exam.len());
                self.state.solved = Some(answers.clone());
                Some(answers)
            }
            Step::Continue => None,
        };

        self.persist()?;
        Ok(RoundReport {
            round: proposal.round,
            grade,
            solved,
        })
    }

    /// Write store, run state and log
    pub fn persist(&mut self) -> Result<()> {
        self.store.save(&self.paths.memory())?;
        self.state.save(&self.paths.run_state())?;
        self.log.save(&self.paths.log())?;
        debug!("Persisted state at round {}", self.state.round);
        Ok(())
    }
}
