//! Rotation Sweep
//!
//! One question at a time (active_index) cycles through every option while
//! all others stay on their default. After the last option the pointer
//! wraps to 1 and the sweep moves to the next question.

use super::{default_option, Step};
use crate::exam::{Exam, Grade, Proposal};
use crate::run_state::RunState;
use crate::store::QuestionStore;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RotationSweep {
    fallback_options: u8,
}

impl RotationSweep {
    pub fn new(fallback_options: u8) -> Self {
        Self { fallback_options }
    }

    pub fn prepare(&self, exam: &Exam, state: &mut RunState) {
        if !exam.is_empty() && state.active_index >= exam.len() {
            state.active_index %= exam.len();
        }
    }

    pub fn propose(&self, exam: &Exam, store: &QuestionStore, state: &RunState) -> Proposal {
        let n = exam.len().max(1);
        let active = state.active_index % n;

        let answers = exam
            .questions
            .iter()
            .enumerate()
            .map(|(position, question)| {
                if position == active {
                    let max = question.option_count(self.fallback_options);
                    store
                        .get(&question.id)
                        .map(|r| r.current_option)
                        .unwrap_or(1)
                        .clamp(1, max)
                } else {
                    default_option(store, exam, position, self.fallback_options)
                }
            })
            .collect();

        Proposal {
            round: state.round + 1,
            answers,
            varied: vec![active],
        }
    }

    pub fn observe(
        &self,
        exam: &Exam,
        store: &mut QuestionStore,
        state: &mut RunState,
        proposal: &Proposal,
        grade: Grade,
    ) -> Step {
        let n = exam.len();
        if n == 0 {
            return Step::Continue;
        }

        let active = state.active_index % n;
        let question = &exam.questions[active];
        let max = question.option_count(self.fallback_options);

        if let Some(record) = store.get_mut(&question.id) {
            // Keep the pointer in step with what was actually submitted
            record.current_option = proposal.answers[active];
            if record.advance_current(max) {
                state.active_index = (active + 1) % n;
                info!(
                    "Q{} swept through all {} options, moving to Q{}",
                    active + 1,
                    max,
                    state.active_index + 1
                );
            }
        }

        if grade.is_perfect(n) {
            Step::Solved(proposal.answers.clone())
        } else {
            Step::Continue
        }
    }
}
