//! Feature flag evaluation contract.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors raised by flag evaluators.
#[derive(Debug, Error)]
pub enum FlagError {
    #[error("Flag evaluator unavailable: {0}")]
    Unavailable(String),

    #[error("Flag evaluation did not finish within {0:?}")]
    Timeout(Duration),
}

/// The context a flag is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagContext {
    /// Targeting key.
    pub key: String,
    /// Address of the calling client.
    pub client_address: String,
}

impl FlagContext {
    pub fn new(key: impl Into<String>, client_address: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            client_address: client_address.into(),
        }
    }
}

/// Result of a typed flag lookup.
///
/// There is no implicit default: a caller that receives `Unavailable` has to
/// decide explicitly what to do, and every caller in this crate denies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOutcome<T> {
    /// The evaluator served a value of the requested type.
    Served(T),
    /// Unknown flag, wrong value type, evaluator failure or timeout.
    Unavailable,
}

impl<T> FlagOutcome<T> {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, FlagOutcome::Unavailable)
    }
}

/// A feature flag evaluation engine.
#[async_trait]
pub trait FlagEvaluator: Send + Sync {
    /// Evaluate `flag_key` for `context`.
    ///
    /// `Ok(None)` means the flag is unknown or has nothing to serve.
    async fn variation(
        &self,
        flag_key: &str,
        context: &FlagContext,
    ) -> Result<Option<Value>, FlagError>;
}

/// Typed, time-bounded access to a [`FlagEvaluator`].
#[derive(Clone)]
pub struct FlagClient {
    evaluator: Arc<dyn FlagEvaluator>,
    timeout: Duration,
}

impl FlagClient {
    pub fn new(evaluator: Arc<dyn FlagEvaluator>, timeout: Duration) -> Self {
        Self { evaluator, timeout }
    }

    /// Evaluate an integer flag.
    pub async fn int_variation(&self, flag_key: &str, context: &FlagContext) -> FlagOutcome<i64> {
        match self.raw_variation(flag_key, context).await {
            Some(Value::Number(n)) => match n.as_i64() {
                Some(value) => FlagOutcome::Served(value),
                None => self.type_mismatch(flag_key, "integer"),
            },
            Some(_) => self.type_mismatch(flag_key, "integer"),
            None => FlagOutcome::Unavailable,
        }
    }

    /// Evaluate a boolean flag.
    pub async fn bool_variation(&self, flag_key: &str, context: &FlagContext) -> FlagOutcome<bool> {
        match self.raw_variation(flag_key, context).await {
            Some(Value::Bool(value)) => FlagOutcome::Served(value),
            Some(_) => self.type_mismatch(flag_key, "boolean"),
            None => FlagOutcome::Unavailable,
        }
    }

    async fn raw_variation(&self, flag_key: &str, context: &FlagContext) -> Option<Value> {
        let result = tokio::time::timeout(self.timeout, self.evaluator.variation(flag_key, context))
            .await
            .unwrap_or(Err(FlagError::Timeout(self.timeout)));

        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(flag = %flag_key, error = %e, "Flag evaluation failed");
                None
            }
        }
    }

    fn type_mismatch<T>(&self, flag_key: &str, expected: &str) -> FlagOutcome<T> {
        warn!(flag = %flag_key, expected = %expected, "Flag served a value of the wrong type");
        FlagOutcome::Unavailable
    }
}
