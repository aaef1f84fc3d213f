//! Answer priors - starting options suggested by local language models
//!
//! Each configured model sees the question with numbered options and is
//! asked for `Answer: <n>` and `Confidence: <c>`. Votes are weighted by
//! model weight times (2 * confidence + 1); the heaviest option wins.
//!
//! A prior only decides where the search starts. Any failure (Ollama down,
//! unparseable reply, question without option texts) yields no prior.

use async_trait::async_trait;
use gradesweep_common::config::{PriorConfig, PriorModel};
use gradesweep_common::ExamQuestion;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Confidence assumed when a reply states none
const DEFAULT_CONFIDENCE: f64 = 0.5;

static ANSWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)answer\s*[:=]?\s*(\d+)").expect("answer pattern"));

static CONFIDENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)confidence\s*[:=]?\s*([0-9]*\.?[0-9]+)").expect("confidence pattern")
});

#[async_trait]
pub trait PriorSource: Send + Sync {
    fn name(&self) -> &str;

    /// Suggested option in 1..=option_count, if any
    async fn suggest(&self, question: &ExamQuestion, option_count: u8) -> Option<u8>;
}

/// Never suggests anything
pub struct NoPrior;

#[async_trait]
impl PriorSource for NoPrior {
    fn name(&self) -> &str {
        "none"
    }

    async fn suggest(&self, _question: &ExamQuestion, _option_count: u8) -> Option<u8> {
        None
    }
}

/// One model's pick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vote {
    pub option: u8,
    pub confidence: f64,
}

/// Read a model reply. The last `Answer:` wins, since reasoning models
/// think out loud before answering.
pub fn parse_vote(text: &str, option_count: u8) -> Option<Vote> {
    let option = ANSWER_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u8>().ok())
        .filter(|o| (1..=option_count).contains(o))
        .last()?;

    let confidence = CONFIDENCE_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .last()
        .map(|c| if c > 1.0 { c / 100.0 } else { c })
        .map_or(DEFAULT_CONFIDENCE, |c| c.clamp(0.0, 1.0));

    Some(Vote { option, confidence })
}

/// Weighted majority; ties go to the lower option
pub fn tally(votes: &[(f64, Vote)]) -> Option<u8> {
    let mut totals: BTreeMap<u8, f64> = BTreeMap::new();
    for (weight, vote) in votes {
        *totals.entry(vote.option).or_insert(0.0) += weight * (vote.confidence * 2.0 + 1.0);
    }

    let mut best: Option<(u8, f64)> = None;
    for (option, total) in totals {
        match best {
            Some((_, b)) if total <= b => {}
            _ => best = Some((option, total)),
        }
    }
    best.map(|(o, _)| o)
}

pub fn prompt(question: &ExamQuestion) -> String {
    let options: Vec<String> = question
        .options
        .iter()
        .enumerate()
        .map(|(i, text)| format!("{}. {}", i + 1, text))
        .collect();

    format!(
        "You are an expert teacher. Rank the options, then pick the best one.\n\
         Output: Rank: [...] Answer: <number> Confidence: <value>\n\
         Question:\n{}\nOptions:\n{}\n",
        question.text,
        options.join("\n")
    )
}

/// Ollama-backed weighted vote across several models
pub struct OllamaPrior {
    client: reqwest::Client,
    url: String,
    models: Vec<PriorModel>,
}

impl OllamaPrior {
    pub fn new(config: &PriorConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/api/generate", config.url.trim_end_matches('/')),
            models: config.models.clone(),
        })
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String, reqwest::Error> {
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false
        });

        let json: serde_json::Value = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .to_string())
    }
}

#[async_trait]
impl PriorSource for OllamaPrior {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn suggest(&self, question: &ExamQuestion, option_count: u8) -> Option<u8> {
        if question.options.is_empty() {
            debug!("No option texts for {}, skipping prior", question.id.short());
            return None;
        }

        let prompt = prompt(question);
        let mut votes = Vec::new();
        for model in &self.models {
            match self.generate(&model.name, &prompt).await {
                Ok(text) => match parse_vote(&text, option_count) {
                    Some(vote) => {
                        debug!("{} votes {} ({:.2})", model.name, vote.option, vote.confidence);
                        votes.push((model.weight, vote));
                    }
                    None => debug!("{} gave no usable answer", model.name),
                },
                Err(e) => warn!("Prior model {} failed: {}", model.name, e),
            }
        }
        tally(&votes)
    }
}

/// Ollama when enabled with at least one model, otherwise no priors
pub fn from_config(config: &PriorConfig) -> Box<dyn PriorSource> {
    if !config.enabled {
        return Box::new(NoPrior);
    }
    if config.models.is_empty() {
        warn!("Priors enabled but no models configured");
        return Box::new(NoPrior);
    }

    match OllamaPrior::new(config) {
        Ok(prior) => {
            info!("Answer priors from {} model(s) at {}", config.models.len(), config.url);
            Box::new(prior)
        }
        Err(e) => {
            warn!("Cannot build Ollama client ({}), running without priors", e);
            Box::new(NoPrior)
        }
    }
}
