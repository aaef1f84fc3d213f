//! Command implementations for gradesweepctl

use anyhow::{bail, Context, Result};
use chrono::Local;
use gradesweep_common::report::{self, QuestionSummary};
use gradesweep_common::state_files::{safe_delete, StatePaths};
use gradesweep_common::store::QuestionStore;
use gradesweep_common::submission_log::SubmissionLog;
use gradesweep_common::{Config, RunState, StrategyKind};
use owo_colors::OwoColorize;

const LOG_READ_CAPACITY: usize = 4096;

fn paths(config: &Config) -> StatePaths {
    StatePaths::new(&config.storage.state_dir)
}

fn load_store(paths: &StatePaths) -> QuestionStore {
    QuestionStore::load(&paths.memory(), usize::MAX)
}

pub fn status(config: &Config, json: bool) -> Result<()> {
    let paths = paths(config);
    let state = RunState::load(&paths.run_state());
    let store = load_store(&paths);
    let log = SubmissionLog::load(&paths.log(), LOG_READ_CAPACITY);

    if json {
        let value = serde_json::json!({
            "state_dir": config.storage.state_dir,
            "configured_strategy": config.search.strategy,
            "run_state": state,
            "remembered_questions": store.len(),
            "log_rows": log.len(),
            "daemon_lock": paths.lock().exists(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", "gradesweep status".bold());
    println!("  State dir:    {}", config.storage.state_dir.display());
    println!("  Round:        {}", state.round);
    println!("  Strategy:     {}", state.strategy);
    if state.strategy != config.search.strategy {
        println!(
            "  {}",
            format!("(config selects {}; applied on next daemon start)", config.search.strategy).yellow()
        );
    }

    match state.strategy {
        StrategyKind::RotationSweep => {
            println!("  Active:       Q{}", state.active_index + 1);
        }
        StrategyKind::CoordinateAscent => {
            if let Some(cursor) = &state.ascent {
                println!("  Passes:       {}", cursor.passes);
                println!(
                    "  Baseline:     {}",
                    cursor.baseline.map_or("-".to_string(), |b| b.to_string())
                );
                println!(
                    "  Best seen:    {}",
                    cursor.best_seen.map_or("-".to_string(), |b| b.to_string())
                );
            }
        }
    }

    println!("  Memory:       {} questions", store.len());
    println!("  Log rows:     {}", log.len());
    if let Some(at) = state.updated_at {
        println!("  Updated:      {}", at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"));
    }

    match &state.solved {
        Some(answers) => println!("  {} {:?}", "[SOLVED]".bright_green(), answers),
        None => println!("  {}", "[SEARCHING]".yellow()),
    }
    if paths.lock().exists() {
        println!("  Daemon lock:  {}", "present".cyan());
    }
    Ok(())
}

fn render_summary(summary: &QuestionSummary) {
    let best = match (summary.best_option, summary.best_score, summary.prior_option) {
        (Some(option), Some(score), _) => format!("{} (mean {:.2})", option, score).bright_green().to_string(),
        (_, _, Some(prior)) => format!("{} (prior)", prior).yellow().to_string(),
        _ => "unknown".dimmed().to_string(),
    };
    println!("{}  {}", summary.id.short().cyan(), summary.preview);
    println!("    best: {}  current: {}", best, summary.current_option);

    for line in &summary.options {
        let mean = line
            .mean
            .map_or("-".to_string(), |m| format!("{:.2}", m));
        println!(
            "    option {}: mean {:>6}  scored {}/{}",
            line.option, mean, line.scored, line.total
        );
    }
}

pub fn best(config: &Config, json: bool) -> Result<()> {
    let store = load_store(&paths(config));
    let summaries = report::summarize(&store, None);

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    if summaries.is_empty() {
        println!("No questions remembered yet");
        return Ok(());
    }
    for summary in &summaries {
        render_summary(summary);
    }
    Ok(())
}

pub fn log(config: &Config, limit: Option<usize>) -> Result<()> {
    let log = SubmissionLog::load(&paths(config).log(), LOG_READ_CAPACITY);
    let rows = log.rows();
    let skip = limit.map_or(0, |n| rows.len().saturating_sub(n));

    for row in rows.iter().skip(skip) {
        let score = match row.score {
            Some(score) => score.to_string(),
            None => "?".yellow().to_string(),
        };
        println!(
            "{}  round {:>5}  {}  chose {}  score {}  {}",
            row.recorded_at.with_timezone(&Local).format("%m-%d %H:%M:%S").dimmed(),
            row.round,
            row.question.short().cyan(),
            row.chosen,
            score,
            row.snapshot
        );
    }
    Ok(())
}

pub fn reset(config: &Config, yes: bool) -> Result<()> {
    let paths = paths(config);
    if !yes {
        bail!("Refusing to delete search state without --yes");
    }
    if paths.lock().exists() {
        bail!(
            "gradesweepd appears to be running ({} exists); stop it first",
            paths.lock().display()
        );
    }

    for path in [paths.memory(), paths.run_state(), paths.log()] {
        safe_delete(&path).with_context(|| format!("Failed to delete {}", path.display()))?;
    }
    println!("{} search state cleared in {}", "[OK]".bright_green(), config.storage.state_dir.display());
    Ok(())
}

pub fn show_config(config: &Config) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.state_dir = dir.path().to_path_buf();
        config
    }

    #[test]
    fn test_reset_requires_confirmation() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let paths = paths(&config);
        fs::write(paths.run_state(), "{}").unwrap();

        assert!(reset(&config, false).is_err());
        assert!(paths.run_state().exists());

        reset(&config, true).unwrap();
        assert!(!paths.run_state().exists());
    }

    #[test]
    fn test_reset_refuses_while_locked() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let paths = paths(&config);
        fs::write(paths.memory(), "{}").unwrap();
        fs::write(paths.lock(), r#"{"pid":1,"acquired_at":0}"#).unwrap();

        assert!(reset(&config, true).is_err());
        assert!(paths.memory().exists());
    }

    #[test]
    fn test_reads_on_empty_dir() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        assert!(status(&config, true).is_ok());
        assert!(best(&config, false).is_ok());
        assert!(log(&config, Some(5)).is_ok());
    }
}
