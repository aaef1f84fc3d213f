//! Coordinate Ascent
//!
//! Pass structure:
//! 1. Submit the committed vector (baseline). Full score ends the search.
//! 2. Visit questions in shuffled order. For each, submit every other
//!    option with the rest held fixed, tracking the best strict gain.
//! 3. Commit that gain (or the first one, with accept_first_improvement).
//! 4. A pass without any gain is a plateau: one random question gets a
//!    random different option, then the next pass starts at step 1.
//!
//! Every evaluation is one external round, so the whole position lives in
//! the persisted AscentCursor.

use super::Step;
use crate::exam::{Exam, Grade, Proposal};
use crate::identifier::QuestionId;
use crate::run_state::{AscentCursor, RunState};
use crate::store::QuestionStore;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct CoordinateAscent {
    fallback_options: u8,
    accept_first_improvement: bool,
}

/// Next option above `after` that differs from `current`
fn next_alternative(after: u8, current: u8, max: u8) -> Option<u8> {
    (after.saturating_add(1)..=max).find(|&o| o != current)
}

impl CoordinateAscent {
    pub fn new(fallback_options: u8, accept_first_improvement: bool) -> Self {
        Self {
            fallback_options,
            accept_first_improvement,
        }
    }

    fn max_option(&self, exam: &Exam, id: &QuestionId) -> u8 {
        exam.position_of(id)
            .and_then(|p| exam.get(p))
            .map(|q| q.option_count(self.fallback_options))
            .unwrap_or(self.fallback_options.max(1))
    }

    fn seeded_answers(&self, exam: &Exam, store: &QuestionStore) -> BTreeMap<QuestionId, u8> {
        exam.questions
            .iter()
            .enumerate()
            .map(|(p, q)| (q.id.clone(), super::default_option(store, exam, p, self.fallback_options)))
            .collect()
    }

    /// Create or reconcile the cursor for this session's layout
    pub fn prepare(&self, exam: &Exam, store: &mut QuestionStore, state: &mut RunState) {
        let seeded = self.seeded_answers(exam, store);
        let cursor = state.ascent.get_or_insert_with(|| {
            info!("Coordinate Ascent seeded from remembered best options");
            AscentCursor::new(seeded.clone())
        });

        for (id, option) in seeded {
            cursor.answers.entry(id).or_insert(option);
        }
        for question in &exam.questions {
            let max = question.option_count(self.fallback_options);
            if let Some(option) = cursor.answers.get_mut(&question.id) {
                *option = (*option).clamp(1, max);
            }
        }

        let layout_changed = cursor.order.iter().any(|id| exam.position_of(id).is_none())
            || (!cursor.order.is_empty() && cursor.order.len() != exam.len());
        if layout_changed {
            info!("Exam layout changed since last pass, restarting pass");
            cursor.baseline = None;
            cursor.order.clear();
            cursor.position = 0;
            cursor.pass_best = None;
            cursor.improved = false;
        }
    }

    pub fn propose(&self, exam: &Exam, store: &QuestionStore, state: &RunState) -> Proposal {
        let seeded;
        let answers_by_id = match &state.ascent {
            Some(cursor) => &cursor.answers,
            None => {
                seeded = self.seeded_answers(exam, store);
                &seeded
            }
        };

        let mut answers: Vec<u8> = exam
            .questions
            .iter()
            .enumerate()
            .map(|(p, q)| {
                answers_by_id
                    .get(&q.id)
                    .copied()
                    .unwrap_or_else(|| super::default_option(store, exam, p, self.fallback_options))
            })
            .collect();

        let mut varied = Vec::new();
        if let Some(cursor) = &state.ascent {
            if let Some(position) = cursor.current_question().and_then(|id| exam.position_of(id)) {
                answers[position] = cursor.trial_option;
                varied.push(position);
            }
        }

        Proposal {
            round: state.round + 1,
            answers,
            varied,
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
        let n = exam.len();
        if state.ascent.is_none() {
            self.prepare(exam, store, state);
        }
        let Some(cursor) = state.ascent.as_mut() else {
            return Step::Continue;
        };

        if let Grade::Scored(score) = grade {
            cursor.best_seen = Some(cursor.best_seen.map_or(score, |b| b.max(score)));
        }

        let Some(id) = cursor.current_question().cloned() else {
            // Baseline round
            match grade {
                Grade::Scored(score) if score as usize == n => {
                    return Step::Solved(proposal.answers.clone());
                }
                Grade::Scored(score) => {
                    cursor.baseline = Some(score);
                    info!("Pass {} baseline: {}/{}", cursor.passes + 1, score, n);
                    self.start_pass(exam, store, cursor, rng);
                }
                Grade::Undetermined => {
                    debug!("Baseline undetermined, resubmitting committed vector");
                }
            }
            return Step::Continue;
        };

        let trial = cursor.trial_option;
        if let Grade::Scored(score) = grade {
            if score as usize == n {
                cursor.answers.insert(id, trial);
                return Step::Solved(proposal.answers.clone());
            }
            let bar = cursor
                .pass_best
                .map(|(_, s)| s)
                .or(cursor.baseline)
                .unwrap_or(0);
            if score > bar {
                cursor.pass_best = Some((trial, score));
            }
        }

        let current = cursor.answers.get(&id).copied().unwrap_or(1);
        let max = self.max_option(exam, &id);
        let next = if self.accept_first_improvement && cursor.pass_best.is_some() {
            None
        } else {
            next_alternative(trial, current, max)
        };

        match next {
            Some(option) => cursor.trial_option = option,
            None => self.finish_question(exam, store, cursor, &id, rng),
        }
        Step::Continue
    }

    fn start_pass<R: Rng + ?Sized>(
        &self,
        exam: &Exam,
        store: &mut QuestionStore,
        cursor: &mut AscentCursor,
        rng: &mut R,
    ) {
        let mut order: Vec<QuestionId> = exam.questions.iter().map(|q| q.id.clone()).collect();
        order.shuffle(rng);
        cursor.order = order;
        cursor.position = 0;
        cursor.pass_best = None;
        cursor.improved = false;
        self.seek(exam, store, cursor, rng);
    }

    /// Point the cursor at the first question (from `position` on) that has
    /// an alternative option; end the pass when none is left.
    fn seek<R: Rng + ?Sized>(
        &self,
        exam: &Exam,
        store: &mut QuestionStore,
        cursor: &mut AscentCursor,
        rng: &mut R,
    ) {
        while let Some(id) = cursor.order.get(cursor.position) {
            let current = cursor.answers.get(id).copied().unwrap_or(1);
            if let Some(option) = next_alternative(0, current, self.max_option(exam, id)) {
                cursor.trial_option = option;
                return;
            }
            cursor.position += 1;
        }
        self.end_pass(exam, store, cursor, rng);
    }

    fn finish_question<R: Rng + ?Sized>(
        &self,
        exam: &Exam,
        store: &mut QuestionStore,
        cursor: &mut AscentCursor,
        id: &QuestionId,
        rng: &mut R,
    ) {
        if let Some((option, score)) = cursor.pass_best.take() {
            let from = cursor.answers.insert(id.clone(), option).unwrap_or(1);
            cursor.baseline = Some(score);
            cursor.improved = true;
            if let Some(record) = store.get_mut(id) {
                record.current_option = option;
            }
            info!(
                "Improved Q{} [{}]: option {} -> {}, score {}",
                exam.position_of(id).map_or(0, |p| p + 1),
                id.short(),
                from,
                option,
                score
            );
        }
        cursor.position += 1;
        self.seek(exam, store, cursor, rng);
    }

    fn end_pass<R: Rng + ?Sized>(
        &self,
        exam: &Exam,
        store: &mut QuestionStore,
        cursor: &mut AscentCursor,
        rng: &mut R,
    ) {
        cursor.passes += 1;
        if !cursor.improved {
            self.perturb(exam, store, cursor, rng);
        }
        cursor.baseline = None;
        cursor.order.clear();
        cursor.position = 0;
        cursor.pass_best = None;
        cursor.improved = false;
    }

    /// Plateau escape: one random question to a random different option
    fn perturb<R: Rng + ?Sized>(
        &self,
        exam: &Exam,
        store: &mut QuestionStore,
        cursor: &mut AscentCursor,
        rng: &mut R,
    ) {
        let candidates: Vec<_> = exam
            .questions
            .iter()
            .filter(|q| q.option_count(self.fallback_options) > 1)
            .collect();
        let Some(question) = candidates.choose(rng) else {
            return;
        };

        let current = cursor.answers.get(&question.id).copied().unwrap_or(1);
        let choices: Vec<u8> = (1..=question.option_count(self.fallback_options))
            .filter(|&o| o != current)
            .collect();
        let Some(&option) = choices.choose(rng) else {
            return;
        };

        cursor.answers.insert(question.id.clone(), option);
        if let Some(record) = store.get_mut(&question.id) {
            record.current_option = option;
        }
        info!(
            "Plateau after pass {}: randomly set Q{} to option {}",
            cursor.passes,
            exam.position_of(&question.id).map_or(0, |p| p + 1),
            option
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_alternative_skips_current() {
        assert_eq!(next_alternative(0, 1, 4), Some(2));
        assert_eq!(next_alternative(2, 3, 4), Some(4));
        assert_eq!(next_alternative(3, 4, 4), None);
        assert_eq!(next_alternative(0, 1, 1), None);
    }
}
