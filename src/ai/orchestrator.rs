use crate::ai::client::{ClientError, ModelClient, ModelRequest, Strategy};
use crate::ai::schema::{analysis_schema, user_message, SYSTEM_PROMPT};
use crate::ai::validate::{validate, AnalysisResult, ValidationError};
use crate::config::{AiConfig, FactsConfig};
use crate::facts::FactPack;
use crate::model::{Horizon, Risk};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// One entry of the retry list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub model: String,
    pub strategy: Strategy,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.model, self.strategy)
    }
}

/// Every strategy against `primary`, then every strategy against `fallback`.
pub fn attempt_plan(primary: &str, fallback: &str) -> Vec<Attempt> {
    [primary, fallback]
        .into_iter()
        .flat_map(|model| {
            Strategy::ORDER.into_iter().map(move |strategy| Attempt {
                model: model.to_string(),
                strategy,
            })
        })
        .collect()
}

/// Why a single attempt was abandoned.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("response is not valid JSON: {0}")]
    Decode(serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug)]
pub struct FailedAttempt {
    pub attempt: Attempt,
    pub error: AttemptError,
}

impl fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.attempt, self.error)
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Every (model, strategy) pair failed. Data-acquisition faults never
    /// end up here; they are `ProviderError`s.
    #[error("analysis unavailable: all {} attempts failed", .attempts.len())]
    Unavailable { attempts: Vec<FailedAttempt> },
}

/// Runs the attempt plan for one request. Holds no state between calls
/// apart from its client and settings.
pub struct Orchestrator<C> {
    client: C,
    cfg: AiConfig,
    list_cap: usize,
    schema: Value,
}

impl<C: ModelClient> Orchestrator<C> {
    pub fn new(client: C, cfg: AiConfig, facts: &FactsConfig) -> Self {
        Self {
            client,
            cfg,
            list_cap: facts.list_cap,
            schema: analysis_schema(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn plan(&self) -> Vec<Attempt> {
        attempt_plan(&self.cfg.primary_model, &self.cfg.fallback_model)
    }

    pub async fn analyze(
        &self,
        facts: &FactPack,
        horizon: Horizon,
        risk: Risk,
    ) -> Result<AnalysisResult, AnalysisError> {
        let user = user_message(facts, horizon, risk);
        let mut failures = Vec::new();

        for attempt in self.plan() {
            match self.run(&attempt, &user).await {
                Ok(mut result) => {
                    result.backfill_levels(&facts.levels);
                    info!(
                        "✅ {} analysed via {} (rating {}, {:?})",
                        facts.symbol, attempt, result.rating, result.action
                    );
                    return Ok(result);
                }
                Err(e) => {
                    warn!("{} failed for {}: {}", attempt, facts.symbol, e);
                    failures.push(FailedAttempt { attempt, error: e });
                }
            }
        }

        error!(
            "❌ analysis unavailable for {} after {} attempts",
            facts.symbol,
            failures.len()
        );
        Err(AnalysisError::Unavailable { attempts: failures })
    }

    async fn run(&self, attempt: &Attempt, user: &str) -> Result<AnalysisResult, AttemptError> {
        let request = ModelRequest {
            model: &attempt.model,
            strategy: attempt.strategy,
            system: SYSTEM_PROMPT,
            user,
            schema: &self.schema,
            temperature: self.cfg.temperature,
            max_tokens: self.cfg.max_tokens,
        };

        let limit = self.cfg.request_timeout();
        let raw = match timeout(limit, self.client.complete(&request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(AttemptError::Timeout(limit)),
        };
        debug!("{} raw: {}", attempt, raw);

        let value: Value = serde_json::from_str(&raw).map_err(AttemptError::Decode)?;
        Ok(validate(value, self.list_cap)?)
    }
}
