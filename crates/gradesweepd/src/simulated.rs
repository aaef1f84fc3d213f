//! Simulated assessment with a known answer key.
//!
//! Scores a vector by counting matches against a secret, the way the real
//! grader does. Faults can be injected to exercise the retry path.

use crate::surface::{AssessmentSurface, SurfaceError};
use async_trait::async_trait;
use gradesweep_common::{Exam, Grade};
use tracing::debug;

pub struct SimulatedSurface {
    exam: Exam,
    secret: Vec<u8>,
    submit_failures: u32,
    reset_failures: u32,
    undetermined_every: Option<u32>,
    submissions: u32,
    resets: u32,
    logins: u32,
}

/// Parse an answer key such as "2,1,4"
pub fn parse_secret(text: &str) -> Result<Vec<u8>, String> {
    let secret: Vec<u8> = text
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<u8>()
                .ok()
                .filter(|&o| o >= 1)
                .ok_or_else(|| format!("invalid option '{}'", part))
        })
        .collect::<Result<_, _>>()?;

    if secret.is_empty() {
        return Err("answer key is empty".to_string());
    }
    Ok(secret)
}

impl SimulatedSurface {
    /// One question per secret entry, each with `options` choices
    pub fn new(secret: Vec<u8>, options: u8) -> Self {
        let options = options.max(secret.iter().copied().max().unwrap_or(1));
        let exam = Exam::from_texts(secret.iter().enumerate().map(|(i, _)| {
            let texts = (1..=options).map(|o| format!("Choice {}", o)).collect();
            (format!("Simulated question {}", i + 1), texts)
        }));

        Self {
            exam,
            secret,
            submit_failures: 0,
            reset_failures: 0,
            undetermined_every: None,
            submissions: 0,
            resets: 0,
            logins: 0,
        }
    }

    /// Fail the next `count` submissions with a session error
    pub fn fail_submits(mut self, count: u32) -> Self {
        self.submit_failures = count;
        self
    }

    /// Fail the next `count` resets, forcing re-authentication
    pub fn fail_resets(mut self, count: u32) -> Self {
        self.reset_failures = count;
        self
    }

    /// Every `n`th graded submission comes back unreadable
    pub fn undetermined_every(mut self, n: u32) -> Self {
        self.undetermined_every = Some(n.max(1));
        self
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// Submissions that reached the grader
    pub fn submissions(&self) -> u32 {
        self.submissions
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    pub fn logins(&self) -> u32 {
        self.logins
    }
}

#[async_trait]
impl AssessmentSurface for SimulatedSurface {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn enumerate(&mut self) -> Result<Exam, SurfaceError> {
        Ok(self.exam.clone())
    }

    async fn submit(&mut self, answers: &[u8]) -> Result<Grade, SurfaceError> {
        if self.submit_failures > 0 {
            self.submit_failures -= 1;
            return Err(SurfaceError::Session("simulated page crash".to_string()));
        }
        if answers.len() != self.secret.len() {
            return Err(SurfaceError::Protocol {
                operation: "submit",
                detail: format!("expected {} answers, got {}", self.secret.len(), answers.len()),
            });
        }

        self.submissions += 1;
        if let Some(n) = self.undetermined_every {
            if self.submissions % n == 0 {
                debug!("Simulated submission {} unreadable", self.submissions);
                return Ok(Grade::Undetermined);
            }
        }

        let score = self
            .secret
            .iter()
            .zip(answers)
            .filter(|(s, a)| s == a)
            .count();
        Ok(Grade::Scored(score as u32))
    }

    async fn reset(&mut self) -> Result<(), SurfaceError> {
        if self.reset_failures > 0 {
            self.reset_failures -= 1;
            return Err(SurfaceError::Session("simulated logout".to_string()));
        }
        self.resets += 1;
        Ok(())
    }

    async fn authenticate(&mut self) -> Result<(), SurfaceError> {
        self.logins += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_secret() {
        assert_eq!(parse_secret("2,1,4").unwrap(), vec![2, 1, 4]);
        assert_eq!(parse_secret(" 3 , 3 ").unwrap(), vec![3, 3]);
        assert!(parse_secret("").is_err());
        assert!(parse_secret("1,0").is_err());
        assert!(parse_secret("1,x").is_err());
    }

    #[tokio::test]
    async fn test_scores_by_matches() {
        let mut surface = SimulatedSurface::new(vec![2, 1, 3], 4);
        let exam = surface.enumerate().await.unwrap();
        assert_eq!(exam.len(), 3);
        assert_eq!(exam.questions[0].options.len(), 4);

        assert_eq!(surface.submit(&[2, 1, 3]).await.unwrap(), Grade::Scored(3));
        assert_eq!(surface.submit(&[1, 1, 1]).await.unwrap(), Grade::Scored(1));
        assert_eq!(surface.submissions(), 2);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let mut surface = SimulatedSurface::new(vec![1, 1], 2)
            .fail_submits(1)
            .undetermined_every(2);

        assert!(surface.submit(&[1, 1]).await.is_err());
        assert_eq!(surface.submit(&[1, 1]).await.unwrap(), Grade::Scored(2));
        assert_eq!(surface.submit(&[1, 1]).await.unwrap(), Grade::Undetermined);
    }
}
