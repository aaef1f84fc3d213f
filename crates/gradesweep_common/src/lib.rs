//! Shared engine for gradesweep components.
//!
//! Answer-vector search against a grader that only reports how many answers
//! were correct, with durable memory so a crashed run resumes in place.

pub mod config;
pub mod engine;
pub mod error;
pub mod exam;
pub mod identifier;
pub mod ingestion;
pub mod report;
pub mod run_state;
pub mod state_files;
pub mod store;
pub mod strategy;
pub mod submission_log;

pub use config::{Config, StrategyKind};
pub use engine::{Engine, RoundReport};
pub use error::SweepError;
pub use exam::{Exam, ExamQuestion, Grade, Proposal};
pub use identifier::{identify, QuestionId};
pub use run_state::RunState;
pub use store::QuestionStore;
pub use submission_log::SubmissionLog;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
