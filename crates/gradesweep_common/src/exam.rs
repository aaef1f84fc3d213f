//! Assessment layout, proposals and grades.

use crate::identifier::{identify, QuestionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One question as enumerated from the assessment surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamQuestion {
    pub id: QuestionId,
    pub text: String,
    pub options: Vec<String>,
}

impl ExamQuestion {
    pub fn new(text: impl Into<String>, options: Vec<String>) -> Self {
        let text = text.into();
        Self {
            id: identify(&text),
            text,
            options,
        }
    }

    /// Number of selectable options; `fallback` when the surface reported none
    pub fn option_count(&self, fallback: u8) -> u8 {
        if self.options.is_empty() {
            fallback.max(1)
        } else {
            self.options.len().min(u8::MAX as usize) as u8
        }
    }

    /// Rendered "question | opt1|opt2|..." snapshot for the submission log
    pub fn snapshot(&self) -> String {
        format!("{} | {}", self.text, self.options.join("|"))
    }
}

/// Fixed ordered list of questions for the current session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub questions: Vec<ExamQuestion>,
}

impl Exam {
    pub fn new(questions: Vec<ExamQuestion>) -> Self {
        Self { questions }
    }

    /// Build from raw (text, options) pairs
    pub fn from_texts<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<String>)>,
        S: Into<String>,
    {
        Self {
            questions: items
                .into_iter()
                .map(|(text, options)| ExamQuestion::new(text, options))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&ExamQuestion> {
        self.questions.get(position)
    }

    pub fn position_of(&self, id: &QuestionId) -> Option<usize> {
        self.questions.iter().position(|q| &q.id == id)
    }
}

/// Outcome of grading one full submission.
///
/// `Undetermined` means the score could not be read. It is never a zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Scored(u32),
    Undetermined,
}

impl Grade {
    pub fn from_score(score: Option<u32>) -> Self {
        match score {
            Some(s) => Grade::Scored(s),
            None => Grade::Undetermined,
        }
    }

    pub fn score(&self) -> Option<u32> {
        match self {
            Grade::Scored(s) => Some(*s),
            Grade::Undetermined => None,
        }
    }

    /// True when every question was answered correctly
    pub fn is_perfect(&self, question_count: usize) -> bool {
        matches!(self, Grade::Scored(s) if *s as usize == question_count)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Scored(s) => write!(f, "{}", s),
            Grade::Undetermined => f.write_str("undetermined"),
        }
    }
}

/// An answer vector to submit, 1-based option per question position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Round id this proposal will be recorded under
    pub round: u64,
    pub answers: Vec<u8>,
    /// Positions whose option is the experiment of this round
    pub varied: Vec<usize>,
}
