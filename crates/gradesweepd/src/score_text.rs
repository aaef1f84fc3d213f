//! Score extraction from recognized result-page text.
//!
//! Recognized text is noisy and may carry several score-like fragments;
//! the last one on the page wins. No match is an undetermined grade,
//! never a zero.

use gradesweep_common::Grade;
use regex::Regex;
use std::sync::LazyLock;

static SCORE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // "Score 17/30", "SCORE 17 / 30"
        Regex::new(r"(?i)score\s*:?\s*(\d+)\s*/\s*\d+").expect("score pattern"),
        // Thai result page: "17 คะแนน"
        Regex::new(r"(\d+)\s*คะแนน").expect("points pattern"),
    ]
});

/// Grade from recognized text
pub fn parse_score(text: &str) -> Grade {
    let last = SCORE_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.captures_iter(text))
        .filter_map(|caps| {
            let m = caps.get(1)?;
            let score = m.as_str().parse::<u32>().ok()?;
            Some((m.start(), score))
        })
        .max_by_key(|(start, _)| *start);

    match last {
        Some((_, score)) => Grade::Scored(score),
        None => Grade::Undetermined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_score() {
        assert_eq!(parse_score("Your Score 17/30"), Grade::Scored(17));
        assert_eq!(parse_score("SCORE 4 / 5"), Grade::Scored(4));
    }

    #[test]
    fn test_parse_thai_points() {
        assert_eq!(parse_score("ได้ 21 คะแนน"), Grade::Scored(21));
        assert_eq!(parse_score("21คะแนน"), Grade::Scored(21));
    }

    #[test]
    fn test_last_occurrence_wins() {
        let text = "Previous Score 3/30\n...\nScore 12/30";
        assert_eq!(parse_score(text), Grade::Scored(12));

        let mixed = "Score 5/30 then 9 คะแนน";
        assert_eq!(parse_score(mixed), Grade::Scored(9));
    }

    #[test]
    fn test_no_match_is_undetermined() {
        assert_eq!(parse_score(""), Grade::Undetermined);
        assert_eq!(parse_score("loading results..."), Grade::Undetermined);
        assert_eq!(parse_score("Score pending"), Grade::Undetermined);
    }

    #[test]
    fn test_zero_is_a_score() {
        assert_eq!(parse_score("Score 0/30"), Grade::Scored(0));
    }
}
