//! Feedback ingestion and credit assignment.
//!
//! The aggregate score of a round is attached to the questions varied in
//! that round, tagged with the option in effect. best_option is then the
//! highest-mean option over each question's own trials.
//!
//! This conflates a question's own effect with whatever else changed in the
//! vector between trials. Accepted: the grader gives one scalar per round.

use crate::error::{Result, SweepError};
use crate::exam::{Exam, Grade, Proposal};
use crate::store::QuestionStore;
use crate::submission_log::{LogRow, SubmissionLog};
use tracing::debug;

/// Check that a proposal fits the exam layout
pub fn validate(exam: &Exam, proposal: &Proposal, fallback_options: u8) -> Result<()> {
    if proposal.answers.len() != exam.len() {
        return Err(SweepError::ExamMismatch {
            expected: exam.len(),
            actual: proposal.answers.len(),
        });
    }
    for (position, (question, &option)) in exam.questions.iter().zip(&proposal.answers).enumerate() {
        let max = question.option_count(fallback_options);
        if option == 0 || option > max {
            return Err(SweepError::InvalidOption {
                position,
                option,
                max,
            });
        }
    }
    Ok(())
}

/// Apply one graded round to memory and the submission log
pub fn ingest(
    store: &mut QuestionStore,
    log: &mut SubmissionLog,
    exam: &Exam,
    proposal: &Proposal,
    grade: Grade,
) -> Result<()> {
    if proposal.answers.len() != exam.len() {
        return Err(SweepError::ExamMismatch {
            expected: exam.len(),
            actual: proposal.answers.len(),
        });
    }

    let score = grade.score();
    for (question, &chosen) in exam.questions.iter().zip(&proposal.answers) {
        store.ensure(&question.id, &question.text);
        log.record(LogRow::new(
            proposal.round,
            question.id.clone(),
            question.snapshot(),
            chosen,
            score,
        ));
    }

    for &position in &proposal.varied {
        let Some(question) = exam.get(position) else {
            continue;
        };
        let option = proposal.answers[position];
        if let Some(record) = store.get_mut(&question.id) {
            record.record_trial(option, score, proposal.round);
            debug!(
                "Q{} [{}] option {} -> {} (best now {:?})",
                position + 1,
                question.id.short(),
                option,
                grade,
                record.best_option
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exam() -> Exam {
        Exam::from_texts(vec![
            ("first", vec!["a".to_string(), "b".to_string()]),
            ("second", vec!["a".to_string(), "b".to_string()]),
        ])
    }

    #[test]
    fn test_only_varied_questions_get_trials() {
        let exam = exam();
        let mut store = QuestionStore::new(2);
        let mut log = SubmissionLog::new(2);
        let proposal = Proposal {
            round: 1,
            answers: vec![2, 1],
            varied: vec![0],
        };

        ingest(&mut store, &mut log, &exam, &proposal, Grade::Scored(1)).unwrap();

        let first = store.get(&exam.questions[0].id).unwrap();
        let second = store.get(&exam.questions[1].id).unwrap();
        assert_eq!(first.trials.len(), 1);
        assert_eq!(first.best_option, Some(2));
        assert!(second.trials.is_empty());
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_undetermined_does_not_move_best() {
        let exam = exam();
        let mut store = QuestionStore::new(2);
        let mut log = SubmissionLog::new(2);
        let id = exam.questions[0].id.clone();

        let p1 = Proposal { round: 1, answers: vec![1, 1], varied: vec![0] };
        ingest(&mut store, &mut log, &exam, &p1, Grade::Scored(0)).unwrap();
        let p2 = Proposal { round: 2, answers: vec![2, 1], varied: vec![0] };
        ingest(&mut store, &mut log, &exam, &p2, Grade::Undetermined).unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.trials.len(), 2);
        assert_eq!(record.trials[1].score, None);
        assert_eq!(record.best_option, Some(1));
        assert_eq!(record.option_stats()[&2].scored, 0);
        assert_eq!(log.get(&id).unwrap().score, None);
    }

    #[test]
    fn test_validate_rejects_bad_vectors() {
        let exam = exam();
        let short = Proposal { round: 1, answers: vec![1], varied: vec![] };
        assert!(matches!(validate(&exam, &short, 4), Err(SweepError::ExamMismatch { .. })));

        let out_of_range = Proposal { round: 1, answers: vec![1, 3], varied: vec![] };
        assert!(matches!(
            validate(&exam, &out_of_range, 4),
            Err(SweepError::InvalidOption { position: 1, option: 3, max: 2 })
        ));

        let ok = Proposal { round: 1, answers: vec![2, 1], varied: vec![] };
        assert!(validate(&exam, &ok, 4).is_ok());
    }
}
