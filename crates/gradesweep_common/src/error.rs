//! Error types for the sweep engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Assessment has no questions")]
    EmptyExam,

    #[error("Exam layout mismatch: expected {expected} questions, got {actual}")]
    ExamMismatch { expected: usize, actual: usize },

    #[error("Option {option} out of range 1..={max} for question {position}")]
    InvalidOption {
        position: usize,
        option: u8,
        max: u8,
    },
}

pub type Result<T> = std::result::Result<T, SweepError>;
