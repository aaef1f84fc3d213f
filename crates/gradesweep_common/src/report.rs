//! Best-answer report over question memory.
//!
//! For every remembered question: per-option mean score and trial counts,
//! and the option currently believed best.

use crate::exam::Exam;
use crate::identifier::QuestionId;
use crate::store::QuestionStore;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionLine {
    pub option: u8,
    pub mean: Option<f64>,
    pub scored: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionSummary {
    /// Position in the given exam, when one was supplied and contains it
    pub position: Option<usize>,
    pub id: QuestionId,
    pub preview: String,
    pub best_option: Option<u8>,
    pub best_score: Option<f64>,
    pub current_option: u8,
    pub prior_option: Option<u8>,
    pub options: Vec<OptionLine>,
}

/// Summaries ordered by exam position when an exam is given, otherwise
/// from least to most recently touched.
pub fn summarize(store: &QuestionStore, exam: Option<&Exam>) -> Vec<QuestionSummary> {
    let mut summaries: Vec<QuestionSummary> = store
        .iter_by_recency()
        .map(|record| QuestionSummary {
            position: exam.and_then(|e| e.position_of(&record.id)),
            id: record.id.clone(),
            preview: record.preview.clone(),
            best_option: record.best_option,
            best_score: record.best_score,
            current_option: record.current_option,
            prior_option: record.prior_option,
            options: record
                .option_stats()
                .into_iter()
                .map(|(option, stats)| OptionLine {
                    option,
                    mean: (stats.scored > 0).then_some(stats.mean),
                    scored: stats.scored,
                    total: stats.total,
                })
                .collect(),
        })
        .collect();

    if exam.is_some() {
        summaries.sort_by_key(|s| s.position.unwrap_or(usize::MAX));
    }
    summaries
}

/// Best-known answer vector for an exam (option 1 where nothing is known)
pub fn best_vector(store: &QuestionStore, exam: &Exam) -> Vec<u8> {
    exam.questions
        .iter()
        .map(|q| store.get(&q.id).and_then(|r| r.best_option).unwrap_or(1))
        .collect()
}
