//! Helper-program surface
//!
//! Drives an external helper (the browser automation) one subcommand per
//! call, JSON over stdin/stdout:
//!
//! - `enumerate` prints `{"questions":[{"text":..,"options":[..]}]}`
//! - `submit` reads `{"answers":[..]}` and prints `{"score":N}`,
//!   `{"score":null}` or `{"text":".."}` (recognized result-page text)
//! - `reset` and `login` signal success through the exit status
//!
//! Every call runs under the configured timeout; a helper that overruns it
//! is killed.

use crate::score_text::parse_score;
use crate::surface::{AssessmentSurface, SurfaceError};
use async_trait::async_trait;
use gradesweep_common::config::SurfaceConfig;
use gradesweep_common::{Exam, Grade};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct EnumerateReply {
    questions: Vec<HelperQuestion>,
}

#[derive(Debug, Deserialize)]
struct HelperQuestion {
    text: String,
    #[serde(default)]
    options: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    answers: &'a [u8],
}

#[derive(Debug, Deserialize)]
struct SubmitReply {
    #[serde(default)]
    score: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

pub struct CommandSurface {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSurface {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// None when no helper command is configured
    pub fn from_config(config: &SurfaceConfig) -> Option<Self> {
        let program = config.command.as_deref().filter(|c| !c.trim().is_empty())?;
        Some(Self::new(
            program,
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        ))
    }

    async fn call(&self, operation: &'static str, input: Option<Vec<u8>>) -> Result<Vec<u8>, SurfaceError> {
        debug!("Helper {} {:?} {}", self.program, self.args, operation);

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(operation)
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| SurfaceError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let exchange = async move {
            if let (Some(bytes), Some(mut stdin)) = (input, child.stdin.take()) {
                stdin.write_all(&bytes).await?;
            }
            child.wait_with_output().await
        };

        let output = match timeout(self.timeout, exchange).await {
            Ok(result) => result.map_err(|e| SurfaceError::Helper {
                operation,
                message: e.to_string(),
            })?,
            Err(_) => {
                return Err(SurfaceError::Timeout {
                    operation,
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SurfaceError::Helper {
                operation,
                message: format!("{} ({})", stderr.trim(), output.status),
            });
        }
        Ok(output.stdout)
    }

    fn decode<T: for<'de> Deserialize<'de>>(operation: &'static str, stdout: &[u8]) -> Result<T, SurfaceError> {
        serde_json::from_slice(stdout).map_err(|e| SurfaceError::Protocol {
            operation,
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl AssessmentSurface for CommandSurface {
    fn name(&self) -> &str {
        &self.program
    }

    async fn enumerate(&mut self) -> Result<Exam, SurfaceError> {
        let stdout = self.call("enumerate", None).await?;
        let reply: EnumerateReply = Self::decode("enumerate", &stdout)?;
        Ok(Exam::from_texts(
            reply.questions.into_iter().map(|q| (q.text, q.options)),
        ))
    }

    async fn submit(&mut self, answers: &[u8]) -> Result<Grade, SurfaceError> {
        let request = serde_json::to_vec(&SubmitRequest { answers }).map_err(|e| SurfaceError::Protocol {
            operation: "submit",
            detail: e.to_string(),
        })?;
        let stdout = self.call("submit", Some(request)).await?;
        let reply: SubmitReply = Self::decode("submit", &stdout)?;

        Ok(match (reply.score, reply.text) {
            (Some(score), _) => Grade::Scored(score),
            (None, Some(text)) => {
                let grade = parse_score(&text);
                if grade == Grade::Undetermined {
                    warn!("No score found in recognized text ({} chars)", text.len());
                }
                grade
            }
            (None, None) => Grade::Undetermined,
        })
    }

    async fn reset(&mut self) -> Result<(), SurfaceError> {
        self.call("reset", None).await.map(|_| ())
    }

    async fn authenticate(&mut self) -> Result<(), SurfaceError> {
        self.call("login", None).await.map(|_| ())
    }
}
