//! Property-based tests for identifiers and bounded memory.

use gradesweep_common::identifier::{identify, normalize};
use gradesweep_common::submission_log::LogRow;
use gradesweep_common::{QuestionStore, SubmissionLog};
use proptest::prelude::*;

/// Reference model: ids ordered least to most recently touched
fn model_touch(model: &mut Vec<String>, key: &str, capacity: usize) {
    model.retain(|k| k != key);
    model.push(key.to_string());
    if model.len() > capacity {
        model.remove(0);
    }
}

proptest! {
    #[test]
    fn identify_is_deterministic(text in ".{0,200}") {
        prop_assert_eq!(identify(&text), identify(&text));
        prop_assert_eq!(identify(&text).as_str().len(), 64);
    }

    #[test]
    fn identify_ignores_whitespace_layout(words in prop::collection::vec("[a-z0-9?]{1,8}", 1..12)) {
        let tight = words.join(" ");
        let loose = format!("  {}\n", words.join(" \t\n "));
        prop_assert_eq!(normalize(&loose), tight.clone());
        prop_assert_eq!(identify(&loose), identify(&tight));
    }

    #[test]
    fn identify_distinguishes_distinct_texts(a in "[a-z]{1,20}", b in "[a-z]{1,20}") {
        prop_assume!(a != b);
        prop_assert_ne!(identify(&a), identify(&b));
    }

    #[test]
    fn store_keeps_most_recent_within_capacity(
        capacity in 1usize..6,
        keys in prop::collection::vec(0u8..10, 0..60),
    ) {
        let mut store = QuestionStore::new(capacity);
        let mut model: Vec<String> = Vec::new();
        for key in &keys {
            let text = format!("question {}", key);
            store.ensure(&identify(&text), &text);
            model_touch(&mut model, &text, capacity);
            prop_assert!(store.len() <= capacity);
        }

        let expected: Vec<_> = model.iter().map(|t| identify(t)).collect();
        prop_assert_eq!(store.ids_by_recency(), expected);
    }

    #[test]
    fn log_keeps_latest_row_per_question(
        capacity in 1usize..6,
        entries in prop::collection::vec((0u8..10, 1u8..5), 0..60),
    ) {
        let mut log = SubmissionLog::new(capacity);
        let mut model: Vec<String> = Vec::new();
        for (round, (key, chosen)) in entries.iter().enumerate() {
            let text = format!("question {}", key);
            log.record(LogRow::new(round as u64, identify(&text), text.clone(), *chosen, None));
            model_touch(&mut model, &text, capacity);
            prop_assert!(log.len() <= capacity);
        }

        let ids: Vec<_> = log.rows().iter().map(|row| row.question.clone()).collect();
        let expected: Vec<_> = model.iter().map(|t| identify(t)).collect();
        prop_assert_eq!(ids, expected);
    }
}
