//! Assessment surface - the external grader boundary
//!
//! The engine never talks to the assessment directly. A surface:
//! - enumerates the ordered (question text, option texts) list
//! - submits a full answer vector and returns the aggregate grade
//! - resets the session, and re-authenticates when a reset fails
//!
//! "Undetermined" is a grade, not an error: the round still counts.
//! Errors mean the round did not complete and must be retried.

use async_trait::async_trait;
use gradesweep_common::{Exam, Grade};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("Failed to start helper '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("Malformed {operation} reply: {detail}")]
    Protocol {
        operation: &'static str,
        detail: String,
    },

    #[error("Helper {operation} failed: {message}")]
    Helper {
        operation: &'static str,
        message: String,
    },

    #[error("Session error: {0}")]
    Session(String),
}

/// External assessment the driver submits rounds to
#[async_trait]
pub trait AssessmentSurface: Send {
    /// Short name for log lines
    fn name(&self) -> &str;

    /// Current question layout, in on-screen order
    async fn enumerate(&mut self) -> Result<Exam, SurfaceError>;

    /// Fill in every answer (1-based options), finish and read the grade
    async fn submit(&mut self, answers: &[u8]) -> Result<Grade, SurfaceError>;

    /// Return to question one of a fresh attempt
    async fn reset(&mut self) -> Result<(), SurfaceError>;

    /// Log in again after the session was lost
    async fn authenticate(&mut self) -> Result<(), SurfaceError>;
}
