//! Search strategies
//!
//! Both strategies are resumable state machines over the same contracts:
//! - prepare: reconcile persisted position with the session's exam layout
//! - propose: pure function of (exam, store, run state) -> next vector
//! - observe: apply one graded round, after ingestion has recorded trials
//!
//! All randomness is consumed in observe and written into the run state, so
//! a reloaded process proposes exactly what the crashed one would have.

mod ascent;
mod rotation;

pub use ascent::CoordinateAscent;
pub use rotation::RotationSweep;

use crate::config::{SearchConfig, StrategyKind};
use crate::exam::{Exam, Grade, Proposal};
use crate::run_state::RunState;
use crate::store::QuestionStore;
use rand::Rng;

/// Result of observing one round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// Full score reached with this vector
    Solved(Vec<u8>),
}

/// Strategy selected by configuration
#[derive(Debug, Clone)]
pub enum Strategy {
    Rotation(RotationSweep),
    Ascent(CoordinateAscent),
}

impl Strategy {
    pub fn from_config(search: &SearchConfig) -> Self {
        match search.strategy {
            StrategyKind::RotationSweep => Strategy::Rotation(RotationSweep::new(search.options_per_question)),
            StrategyKind::CoordinateAscent => Strategy::Ascent(CoordinateAscent::new(
                search.options_per_question,
                search.accept_first_improvement,
            )),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Rotation(_) => StrategyKind::RotationSweep,
            Strategy::Ascent(_) => StrategyKind::CoordinateAscent,
        }
    }

    pub fn prepare(&self, exam: &Exam, store: &mut QuestionStore, state: &mut RunState) {
        match self {
            Strategy::Rotation(s) => s.prepare(exam, state),
            Strategy::Ascent(s) => s.prepare(exam, store, state),
        }
    }

    pub fn propose(&self, exam: &Exam, store: &QuestionStore, state: &RunState) -> Proposal {
        match self {
            Strategy::Rotation(s) => s.propose(exam, store, state),
            Strategy::Ascent(s) => s.propose(exam, store, state),
        }
    }

    pub fn observe<R: Rng + ?Sized>(
        &self,
        exam: &Exam,
        store: &mut QuestionStore,
        state: &mut RunState,
        proposal: &Proposal,
        grade: Grade,
        rng: &mut R,
    ) -> Step {
        match self {
            Strategy::Rotation(s) => s.observe(exam, store, state, proposal, grade),
            Strategy::Ascent(s) => s.observe(exam, store, state, proposal, grade, rng),
        }
    }
}

/// Default (non-experiment) option for a question: remembered best, else 1
pub(crate) fn default_option(store: &QuestionStore, exam: &Exam, position: usize, fallback: u8) -> u8 {
    let question = &exam.questions[position];
    let max = question.option_count(fallback);
    store
        .get(&question.id)
        .map(|r| r.default_option())
        .unwrap_or(1)
        .clamp(1, max)
}
