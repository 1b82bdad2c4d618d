//! Per-step outcomes and the keyed result map produced by a load run.

use crate::error::LoadError;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map;

/// How a step failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The callback returned an error.
    Error,
    /// The callback panicked.
    Panicked,
    /// The task driving the chain was cancelled before it finished, e.g. by
    /// a runtime shutdown.
    Cancelled,
}

/// A serializable record of the step that ended a chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepFailure {
    /// Zero-based position of the failed step within its chain.
    pub step_index: usize,
    /// Whether the callback errored or panicked, or its chain was cancelled.
    pub kind: FailureKind,
    /// The rendered error chain or panic payload.
    pub message: String,
}

impl StepFailure {
    /// Creates a failure record from a callback error.
    ///
    /// The alternate formatting of `anyhow::Error` keeps every cause in the chain.
    pub fn from_error(step_index: usize, error: &anyhow::Error) -> Self {
        Self {
            step_index,
            kind: FailureKind::Error,
            message: format!("{:#}", error),
        }
    }

    /// Creates a failure record from a caught panic payload.
    pub fn from_panic(step_index: usize, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "callback panicked".to_string()
        };

        Self {
            step_index,
            kind: FailureKind::Panicked,
            message,
        }
    }

    /// Creates a failure record for a chain whose task was cancelled.
    pub fn cancelled(step_index: usize, message: impl Into<String>) -> Self {
        Self {
            step_index,
            kind: FailureKind::Cancelled,
            message: message.into(),
        }
    }

    /// Returns true if the step panicked rather than returning an error.
    pub fn is_panic(&self) -> bool {
        matches!(self.kind, FailureKind::Panicked)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, FailureKind::Cancelled)
    }
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step {}: {}", self.step_index, self.message)
    }
}

/// The recorded result of one visited step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome<T> {
    /// The callback produced a value.
    Value(T),
    /// The callback failed; no later step of the chain was run.
    Failed(StepFailure),
}

impl<T> Outcome<T> {
    pub fn is_value(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// Returns the value, if the step succeeded.
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Value(v) => Some(v),
            Outcome::Failed(_) => None,
        }
    }

    /// Returns the failure record, if the step failed.
    pub fn failure(&self) -> Option<&StepFailure> {
        match self {
            Outcome::Value(_) => None,
            Outcome::Failed(f) => Some(f),
        }
    }

    /// Converts the outcome into a `Result`.
    pub fn into_result(self) -> Result<T, StepFailure> {
        match self {
            Outcome::Value(v) => Ok(v),
            Outcome::Failed(f) => Err(f),
        }
    }
}

/// Outcomes of a load run, keyed by chain key.
///
/// Every chain that was pending when `load` was called has an entry, failed
/// chains included. Within an entry, outcomes are in chain order; a failed
/// chain's list ends with its single [`Outcome::Failed`].
///
/// # Examples
///
/// ```ignore
/// let results = loader.load().await;
/// match results.into_values() {
///     Ok(values) => println!("{:?}", values["config"]),
///     Err(e) => eprintln!("{}", e),
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ResultMap<T> {
    chains: HashMap<String, Vec<Outcome<T>>>,
}

impl<T> Default for ResultMap<T> {
    fn default() -> Self {
        Self {
            chains: HashMap::new(),
        }
    }
}

impl<T> ResultMap<T> {
    /// Creates an empty result map.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            chains: HashMap::with_capacity(capacity),
        }
    }

    pub(crate) fn insert(&mut self, key: String, outcomes: Vec<Outcome<T>>) {
        self.chains.insert(key, outcomes);
    }

    /// Returns the outcomes recorded for a chain.
    pub fn get(&self, key: &str) -> Option<&[Outcome<T>]> {
        self.chains.get(key).map(Vec::as_slice)
    }

    /// Returns the values of a chain, or `None` if it is unknown or failed.
    pub fn values(&self, key: &str) -> Option<Vec<&T>> {
        self.chains
            .get(key)?
            .iter()
            .map(Outcome::value)
            .collect()
    }

    /// Returns the failure that ended a chain, if it failed.
    pub fn failure(&self, key: &str) -> Option<&StepFailure> {
        self.chains.get(key)?.iter().find_map(Outcome::failure)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.chains.contains_key(key)
    }

    /// Returns true if every chain completed without a failed step.
    pub fn is_success(&self) -> bool {
        self.chains
            .values()
            .all(|outcomes| outcomes.iter().all(Outcome::is_value))
    }

    /// Returns the keys of the chains that failed, sorted.
    pub fn failed_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .chains
            .iter()
            .filter(|(_, outcomes)| outcomes.iter().any(Outcome::is_failed))
            .map(|(key, _)| key.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, Vec<Outcome<T>>> {
        self.chains.iter()
    }

    /// Consumes the map, returning the raw outcome lists.
    pub fn into_inner(self) -> HashMap<String, Vec<Outcome<T>>> {
        self.chains
    }

    /// Consumes the map, returning plain values if no chain failed.
    ///
    /// When several chains failed, the error reports the one whose key sorts
    /// first, so the result is deterministic.
    pub fn into_values(self) -> Result<HashMap<String, Vec<T>>, LoadError> {
        if let Some(key) = self.failed_keys().first() {
            let key = key.to_string();
            let failure = self
                .failure(&key)
                .cloned()
                .unwrap_or_else(|| StepFailure {
                    step_index: 0,
                    kind: FailureKind::Error,
                    message: "unknown failure".to_string(),
                });
            return Err(LoadError { key, failure });
        }

        Ok(self
            .chains
            .into_iter()
            .map(|(key, outcomes)| {
                let values = outcomes.into_iter().filter_map(|o| o.into_result().ok());
                (key, values.collect())
            })
            .collect())
    }
}

impl<T> IntoIterator for ResultMap<T> {
    type Item = (String, Vec<Outcome<T>>);
    type IntoIter = hash_map::IntoIter<String, Vec<Outcome<T>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.chains.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a ResultMap<T> {
    type Item = (&'a String, &'a Vec<Outcome<T>>);
    type IntoIter = hash_map::Iter<'a, String, Vec<Outcome<T>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.chains.iter()
    }
}
