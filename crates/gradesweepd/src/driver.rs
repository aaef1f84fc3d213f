//! Outer driver loop
//!
//! One round: enumerate → priors for new questions → propose → submit →
//! record (persisted) → reset. A failed attempt, whether a surface call, an
//! empty enumeration or an engine error, resets the session
//! (re-authenticating if the reset itself fails) and retries the same round.
//! The proposal is recomputed from persisted state, so a retry submits
//! exactly what the failed attempt did.
//!
//! Consecutive failures are bounded by `retry.max_attempts` with exponential
//! backoff. Exhaustion persists state, raises a critical notification, logs
//! in again and starts a new session; `retry.max_restarts` bounds how often.
//! A finished run sends a per-question results summary.

use crate::notifier::{NotificationUrgency, Notifier};
use crate::prior::{NoPrior, PriorSource};
use crate::surface::{AssessmentSurface, SurfaceError};
use gradesweep_common::config::{Config, RetryConfig};
use gradesweep_common::report;
use gradesweep_common::{Engine, Exam, Grade, QuestionId, RoundReport, SweepError};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Why one round attempt failed
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error(transparent)]
    Engine(#[from] SweepError),
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Giving up after {attempts} consecutive failed attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: AttemptError,
    },
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Full score; `answers` is the winning vector
    Solved { round: u64, answers: Vec<u8> },
    /// `search.max_rounds` rounds were completed in this run
    RoundLimit { rounds: u64 },
}

/// A score above the question count is a misread, not a result
fn sanitize(grade: Grade, question_count: usize) -> Grade {
    match grade {
        Grade::Scored(score) if score as usize > question_count => {
            warn!(
                "Score {} exceeds question count {}, treating as undetermined",
                score, question_count
            );
            Grade::Undetermined
        }
        other => other,
    }
}

pub struct Driver<S: AssessmentSurface> {
    engine: Engine,
    surface: S,
    notifier: Box<dyn Notifier>,
    prior: Box<dyn PriorSource>,
    /// Questions already put to the prior source in this process
    consulted: HashSet<QuestionId>,
    /// Layout of the most recent session, for the results summary
    last_exam: Option<Exam>,
    retry: RetryConfig,
    fallback_options: u8,
    max_rounds: Option<u64>,
    expected_questions: Option<usize>,
    settle: Duration,
    every_round: bool,
}

impl<S: AssessmentSurface> Driver<S> {
    pub fn new(config: &Config, engine: Engine, surface: S, notifier: Box<dyn Notifier>) -> Self {
        Self {
            engine,
            surface,
            notifier,
            prior: Box::new(NoPrior),
            consulted: HashSet::new(),
            last_exam: None,
            retry: config.retry.clone(),
            fallback_options: config.search.options_per_question,
            max_rounds: config.search.max_rounds,
            expected_questions: config.search.question_count,
            settle: Duration::from_secs(config.surface.settle_secs),
            every_round: config.notify.every_round,
        }
    }

    /// Suggest starting options for questions seen for the first time
    pub fn with_prior(mut self, prior: Box<dyn PriorSource>) -> Self {
        self.prior = prior;
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Run until full score, the round limit, or exhausted restarts
    pub async fn run(&mut self) -> Result<Outcome, DriverError> {
        if let Some(answers) = self.engine.state().solved.clone() {
            info!("Already solved at round {}: {:?}", self.engine.state().round, answers);
            return Ok(Outcome::Solved {
                round: self.engine.state().round,
                answers,
            });
        }

        self.notifier
            .notify(
                &format!(
                    "gradesweepd started on {} at round {} ({})",
                    self.surface.name(),
                    self.engine.state().round,
                    self.engine.strategy().kind()
                ),
                NotificationUrgency::Low,
            )
            .await;

        let mut restarts = 0u32;
        loop {
            match self.run_session().await {
                Ok(outcome) => {
                    self.send_summary(&outcome).await;
                    return Ok(outcome);
                }
                Err(DriverError::RetriesExhausted { attempts, last }) => {
                    error!("Session abandoned after {} attempts: {}", attempts, last);
                    if let Err(e) = self.engine.persist() {
                        error!("Cannot persist state before restart: {}", e);
                    }
                    self.notifier
                        .notify(
                            &format!(
                                "Round {} failed {} times in a row: {}",
                                self.engine.state().round + 1,
                                attempts,
                                last
                            ),
                            NotificationUrgency::Critical,
                        )
                        .await;

                    restarts += 1;
                    if self.retry.max_restarts.is_some_and(|max| restarts > max) {
                        return Err(DriverError::RetriesExhausted { attempts, last });
                    }

                    let delay = self.retry.backoff(self.retry.max_attempts);
                    info!("Restarting session in {}s (restart {})", delay.as_secs(), restarts);
                    tokio::time::sleep(delay).await;

                    // A fresh session starts from a fresh login
                    if let Err(e) = self.surface.authenticate().await {
                        warn!("Login before restart failed: {}", e);
                    }
                    self.recover().await;
                }
            }
        }
    }

    async fn run_session(&mut self) -> Result<Outcome, DriverError> {
        let mut failures = 0u32;
        let mut rounds = 0u64;

        loop {
            if let Some(max) = self.max_rounds {
                if rounds >= max {
                    info!("Stopping after {} rounds", rounds);
                    return Ok(Outcome::RoundLimit { rounds });
                }
            }

            match self.play_round().await {
                Ok(report) => {
                    failures = 0;
                    rounds += 1;
                    if let Some(answers) = report.solved {
                        return Ok(Outcome::Solved {
                            round: report.round,
                            answers,
                        });
                    }
                    if !self.settle.is_zero() {
                        tokio::time::sleep(self.settle).await;
                    }
                }
                Err(e) => {
                    failures += 1;
                    error!(
                        "Round {} attempt {}/{} failed: {}",
                        self.engine.state().round + 1,
                        failures,
                        self.retry.max_attempts,
                        e
                    );
                    if failures >= self.retry.max_attempts {
                        return Err(DriverError::RetriesExhausted {
                            attempts: failures,
                            last: e,
                        });
                    }

                    let delay = self.retry.backoff(failures);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    self.recover().await;
                }
            }
        }
    }

    async fn play_round(&mut self) -> Result<RoundReport, AttemptError> {
        let exam: Exam = self.surface.enumerate().await?;
        if exam.is_empty() {
            // Usually a page that has not finished loading
            return Err(SurfaceError::Protocol {
                operation: "enumerate",
                detail: "no questions found".to_string(),
            }
            .into());
        }
        if let Some(expected) = self.expected_questions.filter(|&n| n != exam.len()) {
            warn!("Surface reports {} questions, expected {}", exam.len(), expected);
        }
        let priors = self.gather_priors(&exam).await;
        self.engine.begin_session_seeded(&exam, &priors)?;
        self.last_exam = Some(exam.clone());

        let proposal = self.engine.propose(&exam);
        let grade = self.surface.submit(&proposal.answers).await?;
        let grade = sanitize(grade, exam.len());

        let report = self.engine.record(&exam, &proposal, grade)?;
        info!(
            "Round {}: {}/{} ({})",
            report.round,
            report.grade,
            exam.len(),
            self.engine.strategy().kind()
        );

        if let Some(answers) = &report.solved {
            self.notifier
                .notify(
                    &format!(
                        "Full score {}/{} on round {}: {:?}",
                        report.grade,
                        exam.len(),
                        report.round,
                        answers
                    ),
                    NotificationUrgency::Normal,
                )
                .await;
            return Ok(report);
        }

        if self.every_round {
            self.notifier
                .notify(
                    &format!("Round {}: {}/{}", report.round, report.grade, exam.len()),
                    NotificationUrgency::Low,
                )
                .await;
        }

        // The round is recorded; a failed reset only costs the next attempt
        self.surface.reset().await?;
        Ok(report)
    }

    /// Ask the prior source once per new question
    async fn gather_priors(&mut self, exam: &Exam) -> BTreeMap<QuestionId, u8> {
        let mut priors = BTreeMap::new();
        let pending: Vec<_> = self
            .engine
            .unseeded(exam)
            .into_iter()
            .filter(|q| !self.consulted.contains(&q.id))
            .cloned()
            .collect();
        if pending.is_empty() {
            return priors;
        }

        debug!("Asking {} for priors on {} questions", self.prior.name(), pending.len());
        for question in pending {
            let count = question.option_count(self.fallback_options);
            if let Some(option) = self.prior.suggest(&question, count).await {
                priors.insert(question.id.clone(), option);
            }
            self.consulted.insert(question.id);
        }
        if !priors.is_empty() {
            info!("Seeded {} new questions from {} priors", priors.len(), self.prior.name());
        }
        priors
    }

    /// Final results: best known option and its mean per question
    async fn send_summary(&self, outcome: &Outcome) {
        let Some(exam) = &self.last_exam else {
            return;
        };

        let (headline, answers) = match outcome {
            Outcome::Solved { round, answers } => {
                (format!("Results: full score on round {}", round), answers.clone())
            }
            Outcome::RoundLimit { rounds } => (
                format!(
                    "Results: stopped after {} rounds (round {} overall)",
                    rounds,
                    self.engine.state().round
                ),
                report::best_vector(self.engine.store(), exam),
            ),
        };

        let mut lines = vec![headline];
        for summary in report::summarize(self.engine.store(), Some(exam)) {
            let Some(position) = summary.position else {
                continue;
            };
            let line = match (summary.best_option, summary.best_score) {
                (Some(option), Some(mean)) => format!(
                    "Q{} option {} (mean {:.2} over {} trials)",
                    position + 1,
                    option,
                    mean,
                    summary.options.iter().map(|o| o.total).sum::<usize>()
                ),
                _ => format!("Q{} untested", position + 1),
            };
            lines.push(line);
        }
        lines.push(format!(
            "Answers: {}",
            answers.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(",")
        ));

        self.notifier
            .notify(&lines.join("\n"), NotificationUrgency::Normal)
            .await;
    }

    /// Reset the session, logging in again if the reset is refused
    async fn recover(&mut self) {
        let reset = match self.surface.reset().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Session reset failed ({}), re-authenticating", e);
                match self.surface.authenticate().await {
                    Ok(()) => self.surface.reset().await,
                    Err(e) => Err(e),
                }
            }
        };

        match reset {
            Ok(()) => info!("Session reset"),
            Err(e) => error!("Session recovery failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_rejects_impossible_scores() {
        assert_eq!(sanitize(Grade::Scored(31), 30), Grade::Undetermined);
        assert_eq!(sanitize(Grade::Scored(30), 30), Grade::Scored(30));
        assert_eq!(sanitize(Grade::Undetermined, 30), Grade::Undetermined);
    }
}
