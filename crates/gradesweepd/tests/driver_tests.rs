//! Driver loop against the simulated grader.

use async_trait::async_trait;
use gradesweep_common::{Config, Engine, Exam, ExamQuestion, Grade, StrategyKind, SweepError};
use gradesweepd::notifier::{NotificationUrgency, Notifier};
use gradesweepd::prior::PriorSource;
use gradesweepd::simulated::SimulatedSurface;
use gradesweepd::{AssessmentSurface, AttemptError, Driver, DriverError, Outcome, SurfaceError};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Clone, Default)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, NotificationUrgency)>>>,
}

impl RecordingNotifier {
    fn messages(&self, urgency: NotificationUrgency) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, u)| *u == urgency)
            .map(|(m, _)| m.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str, urgency: NotificationUrgency) {
        self.sent.lock().unwrap().push((message.to_string(), urgency));
    }
}

fn config(dir: &TempDir, strategy: StrategyKind) -> Config {
    let mut config = Config::default();
    config.storage.state_dir = dir.path().to_path_buf();
    config.search.strategy = strategy;
    config.search.seed = Some(11);
    config.retry.initial_backoff_secs = 0;
    config.retry.max_backoff_secs = 0;
    config.surface.settle_secs = 0;
    config
}

/// Reports an empty page a few times before showing the real exam
struct BlankFirst {
    inner: SimulatedSurface,
    blanks: u32,
}

#[async_trait]
impl AssessmentSurface for BlankFirst {
    fn name(&self) -> &str {
        "blank-first"
    }

    async fn enumerate(&mut self) -> Result<Exam, SurfaceError> {
        if self.blanks > 0 {
            self.blanks -= 1;
            return Ok(Exam::new(vec![]));
        }
        self.inner.enumerate().await
    }

    async fn submit(&mut self, answers: &[u8]) -> Result<Grade, SurfaceError> {
        self.inner.submit(answers).await
    }

    async fn reset(&mut self) -> Result<(), SurfaceError> {
        self.inner.reset().await
    }

    async fn authenticate(&mut self) -> Result<(), SurfaceError> {
        self.inner.authenticate().await
    }
}

/// Suggests the same option for every question, counting requests
#[derive(Clone)]
struct FixedPrior {
    option: u8,
    asked: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl PriorSource for FixedPrior {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn suggest(&self, question: &ExamQuestion, _option_count: u8) -> Option<u8> {
        self.asked.lock().unwrap().push(question.text.clone());
        Some(self.option)
    }
}

fn driver<S: AssessmentSurface>(config: &Config, surface: S) -> (Driver<S>, RecordingNotifier) {
    let notifier = RecordingNotifier::default();
    let driver = Driver::new(config, Engine::open(config), surface, Box::new(notifier.clone()));
    (driver, notifier)
}

#[tokio::test]
async fn test_rotation_solves_two_question_key() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, StrategyKind::RotationSweep);
    let (mut driver, notifier) = driver(&config, SimulatedSurface::new(vec![2, 1], 2));

    let outcome = driver.run().await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Solved {
            round: 2,
            answers: vec![2, 1]
        }
    );
    assert_eq!(driver.surface().submissions(), 2);
    // Reset between rounds, not after the winning one
    assert_eq!(driver.surface().resets(), 1);

    let normal = notifier.messages(NotificationUrgency::Normal);
    assert_eq!(normal.len(), 2);
    assert!(normal[0].contains("Full score"));

    let summary = &normal[1];
    assert!(summary.starts_with("Results: full score on round 2"));
    assert!(summary.contains("Q1 option 2 (mean 2.00 over 2 trials)"));
    assert!(summary.contains("Q2 option 1 (mean 1.50 over 2 trials)"));
    assert!(summary.ends_with("Answers: 2,1"));
}

#[tokio::test]
async fn test_coordinate_ascent_solves_larger_key() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, StrategyKind::CoordinateAscent);
    let secret = vec![4, 2, 3, 1, 1, 4];
    let (mut driver, _) = driver(&config, SimulatedSurface::new(secret.clone(), 4));

    match driver.run().await.unwrap() {
        Outcome::Solved { answers, .. } => assert_eq!(answers, secret),
        other => panic!("unexpected {:?}", other),
    }
    assert!(driver.surface().submissions() <= 2 * 6 * 3 + 2);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, StrategyKind::RotationSweep);
    config.retry.max_attempts = 5;
    let surface = SimulatedSurface::new(vec![2, 1], 2).fail_submits(2);
    let (mut driver, _) = driver(&config, surface);

    let outcome = driver.run().await.unwrap();
    assert!(matches!(outcome, Outcome::Solved { round: 2, .. }));
    assert_eq!(driver.surface().submissions(), 2);
    assert!(driver.surface().resets() >= 3);
}

#[tokio::test]
async fn test_refused_reset_triggers_login() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, StrategyKind::RotationSweep);
    let surface = SimulatedSurface::new(vec![2, 1], 2).fail_submits(1).fail_resets(1);
    let (mut driver, _) = driver(&config, surface);

    driver.run().await.unwrap();
    assert_eq!(driver.surface().logins(), 1);
}

#[tokio::test]
async fn test_retry_exhaustion_surfaces_named_error() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, StrategyKind::RotationSweep);
    config.retry.max_attempts = 3;
    config.retry.max_restarts = Some(1);
    let surface = SimulatedSurface::new(vec![2, 1], 2).fail_submits(u32::MAX);
    let (mut driver, notifier) = driver(&config, surface);

    match driver.run().await {
        Err(DriverError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(driver.surface().submissions(), 0);
    assert_eq!(driver.engine().state().round, 0);
    // One alert per abandoned session: the first and the restart
    assert_eq!(notifier.messages(NotificationUrgency::Critical).len(), 2);
    assert!(dir.path().join("run_state.json").exists());
}

#[tokio::test]
async fn test_round_limit_then_resume() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, StrategyKind::RotationSweep);
    config.search.max_rounds = Some(3);
    let secret = vec![3, 3, 3];

    let (mut first, notifier) = driver(&config, SimulatedSurface::new(secret.clone(), 3));
    assert_eq!(first.run().await.unwrap(), Outcome::RoundLimit { rounds: 3 });
    assert_eq!(first.engine().state().round, 3);
    let summary = notifier.messages(NotificationUrgency::Normal);
    assert_eq!(summary.len(), 1);
    assert!(summary[0].starts_with("Results: stopped after 3 rounds"));
    assert!(summary[0].contains("Q1 option"));
    assert!(summary[0].contains("Answers: "));
    drop(first);

    config.search.max_rounds = None;
    let (mut second, _) = driver(&config, SimulatedSurface::new(secret.clone(), 3));
    match second.run().await.unwrap() {
        Outcome::Solved { round, answers } => {
            assert!(round > 3);
            assert_eq!(answers, secret);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_undetermined_rounds_never_score() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, StrategyKind::RotationSweep);
    config.search.max_rounds = Some(4);
    let surface = SimulatedSurface::new(vec![2, 2], 2).undetermined_every(1);
    let (mut driver, _) = driver(&config, surface);

    assert_eq!(driver.run().await.unwrap(), Outcome::RoundLimit { rounds: 4 });
    for record in driver.engine().store().iter_by_recency() {
        assert!(record.trials.iter().all(|t| t.score.is_none()));
        assert_eq!(record.best_option, None);
    }
}

#[tokio::test]
async fn test_solved_state_short_circuits() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, StrategyKind::RotationSweep);
    let (mut first, _) = driver(&config, SimulatedSurface::new(vec![1], 2));
    first.run().await.unwrap();
    drop(first);

    let (mut second, _) = driver(&config, SimulatedSurface::new(vec![1], 2));
    let outcome = second.run().await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Solved {
            round: 1,
            answers: vec![1]
        }
    );
    assert_eq!(second.surface().submissions(), 0);
}

#[tokio::test]
async fn test_blank_enumeration_is_retried() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, StrategyKind::RotationSweep);
    let surface = BlankFirst {
        inner: SimulatedSurface::new(vec![2, 1], 2),
        blanks: 1,
    };
    let (mut driver, _) = driver(&config, surface);

    let outcome = driver.run().await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Solved {
            round: 2,
            answers: vec![2, 1]
        }
    );
    assert_eq!(driver.surface().inner.submissions(), 2);
    assert_eq!(driver.surface().blanks, 0);
}

#[tokio::test]
async fn test_persist_failures_count_as_failed_attempts() {
    let dir = TempDir::new().unwrap();
    // A file where the state directory should be: every save fails
    let blocked = dir.path().join("state");
    std::fs::write(&blocked, "not a directory").unwrap();
    let mut config = config(&dir, StrategyKind::RotationSweep);
    config.storage.state_dir = blocked;
    config.retry.max_attempts = 3;
    config.retry.max_restarts = Some(0);
    let (mut driver, notifier) = driver(&config, SimulatedSurface::new(vec![2, 1], 2));

    match driver.run().await {
        Err(DriverError::RetriesExhausted {
            attempts,
            last: AttemptError::Engine(SweepError::Io(_)),
        }) => assert_eq!(attempts, 3),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(driver.surface().submissions(), 3);
    assert!(driver.surface().resets() >= 2);
    assert_eq!(notifier.messages(NotificationUrgency::Critical).len(), 1);
}

#[tokio::test]
async fn test_restart_after_exhaustion_logs_in_again() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, StrategyKind::RotationSweep);
    config.retry.max_attempts = 3;
    let surface = SimulatedSurface::new(vec![2, 1], 2).fail_submits(3);
    let (mut driver, notifier) = driver(&config, surface);

    let outcome = driver.run().await.unwrap();
    assert!(matches!(outcome, Outcome::Solved { round: 2, .. }));
    assert!(driver.surface().logins() >= 1);
    assert_eq!(notifier.messages(NotificationUrgency::Critical).len(), 1);
}

#[tokio::test]
async fn test_priors_seed_first_submission() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, StrategyKind::CoordinateAscent);
    config.retry.max_attempts = 5;
    let prior = FixedPrior {
        option: 2,
        asked: Arc::default(),
    };
    let surface = SimulatedSurface::new(vec![2, 2, 2], 3).fail_submits(2);
    let (driver, _) = driver(&config, surface);
    let mut driver = driver.with_prior(Box::new(prior.clone()));

    let outcome = driver.run().await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Solved {
            round: 1,
            answers: vec![2, 2, 2]
        }
    );
    assert_eq!(driver.surface().submissions(), 1);
    // Failed attempts do not ask again
    assert_eq!(prior.asked.lock().unwrap().len(), 3);
}
