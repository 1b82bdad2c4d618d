//! The chain registry.
//!
//! A [`Loader`] collects chain roots and runs them all with [`Loader::load`]:
//! steps within a chain run strictly in order, chains run concurrently, and
//! every chain's outcomes end up in one [`ResultMap`] under its key.

use crate::config::{Dispatch, LoaderConfig};
use crate::error::ValidationError;
use crate::outcome::{Outcome, ResultMap, StepFailure};
use crate::step::{Step, boxed};
use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::mem;
use std::panic::AssertUnwindSafe;
use tokio::task::{AbortHandle, JoinError};
use tracing::{Instrument, debug, info, info_span, warn};

/// Registry of pending chains.
///
/// # Examples
///
/// ```ignore
/// use step_loader::Loader;
///
/// let mut loader = Loader::new();
/// loader
///     .step(|| async { fetch("server").await }, "server")?
///     .step(|| async { fetch("tls").await })?;
/// loader.step(|| async { fetch("logging").await }, "logging")?;
///
/// let results = loader.load().await;
/// assert_eq!(results.len(), 2);
/// ```
#[derive(Debug)]
pub struct Loader<T = JsonValue> {
    /// Chain roots waiting for the next `load`, in registration order.
    pending: Vec<Step<T>>,
    config: LoaderConfig,
}

impl<T> Default for Loader<T> {
    fn default() -> Self {
        Self::with_config(LoaderConfig::default())
    }
}

impl<T> Loader<T> {
    /// Creates an empty loader with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty loader with a custom configuration.
    pub fn with_config(config: LoaderConfig) -> Self {
        Self {
            pending: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Number of pending chains.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns true if a pending chain uses `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.pending.iter().any(|root| root.key() == Some(key))
    }

    /// Keys of the pending chains, in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().filter_map(Step::key)
    }

    /// Drops every pending chain without running it.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl<T: Send + 'static> Loader<T> {
    /// Registers a new chain and returns its root step.
    ///
    /// The returned step can be extended with [`Step::step`]. Fails with
    /// [`ValidationError::EmptyKey`] for an empty key and
    /// [`ValidationError::DuplicateKey`] if a pending chain already uses it;
    /// in both cases the pending chains are left untouched.
    pub fn step<F, Fut, E>(
        &mut self,
        callback: F,
        key: impl Into<String>,
    ) -> Result<&mut Step<T>, ValidationError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let key = key.into();
        if key.is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        if self.contains_key(&key) {
            return Err(ValidationError::DuplicateKey(key));
        }

        debug!(key = %key, "Registering chain");
        let index = self.pending.len();
        self.pending.push(Step::root(key, boxed(callback)));
        Ok(&mut self.pending[index])
    }

    /// Runs every pending chain and collects their outcomes by key.
    ///
    /// The pending chains are taken out of the loader when `load` is called,
    /// not when the returned future is first polled. Chains registered while
    /// the future is in flight belong to the next run.
    ///
    /// The future waits for every chain to settle and never fails on account
    /// of a single chain: a failed or panicking step is recorded as
    /// [`Outcome::Failed`] and ends only its own chain.
    ///
    /// With [`Dispatch::Spawn`] the future must be polled inside a Tokio
    /// runtime. Dropping it before it completes aborts the spawned chains.
    pub fn load(&mut self) -> BoxFuture<'static, ResultMap<T>> {
        let roots = mem::take(&mut self.pending);
        let dispatch = self.config.dispatch;
        let chains = roots.len();

        async move {
            info!("Starting load of {} chain(s)", chains);

            let settled = match dispatch {
                Dispatch::Inline => future::join_all(roots.into_iter().map(run_chain)).await,
                Dispatch::Spawn => spawn_chains(roots).await,
            };

            let results = collect_results(settled);
            let failed = results.failed_keys().len();
            info!(
                completed = results.len() - failed,
                failed = failed,
                "Load finished"
            );
            results
        }
        .instrument(info_span!("loader_load", chains = chains))
        .boxed()
    }
}

/// Aborts the wrapped tasks when dropped.
///
/// Held across the awaits in [`spawn_chains`]; aborting a finished task is a
/// no-op, so only chains still running when the `load` future is dropped
/// are affected.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Runs each chain on its own Tokio task and waits for all of them.
async fn spawn_chains<T: Send + 'static>(
    roots: Vec<Step<T>>,
) -> Vec<(String, Vec<Outcome<T>>)> {
    let mut tasks = Vec::with_capacity(roots.len());
    for mut root in roots {
        // Keep the key outside the task so a lost task can still be reported.
        let key = root.take_key().unwrap_or_default();
        let span = info_span!("chain", key = %key);
        let task = tokio::spawn(walk_chain(root).instrument(span));
        tasks.push((key, task));
    }
    let _guard = AbortOnDrop(tasks.iter().map(|(_, task)| task.abort_handle()).collect());

    let mut settled = Vec::with_capacity(tasks.len());
    for (key, task) in tasks {
        match task.await {
            Ok(outcomes) => settled.push((key, outcomes)),
            Err(e) => {
                warn!(key = %key, error = %e, "Chain task failed to complete");
                settled.push((key, vec![Outcome::Failed(lost_task_failure(e))]));
            }
        }
    }

    settled
}

/// Describes a chain whose task ended without returning its outcomes.
///
/// Step panics are caught inside the task, so this only happens when the
/// runtime cancels the task or something outside a callback panics. The
/// chain's partial outcomes went down with the task and the failure is
/// reported at step 0.
fn lost_task_failure(e: JoinError) -> StepFailure {
    if e.is_panic() {
        StepFailure::from_panic(0, e.into_panic())
    } else {
        StepFailure::cancelled(0, e.to_string())
    }
}

/// Runs one chain, pairing its outcomes with its key.
async fn run_chain<T: Send + 'static>(mut root: Step<T>) -> (String, Vec<Outcome<T>>) {
    let key = root.take_key().unwrap_or_default();
    let span = info_span!("chain", key = %key);
    let outcomes = walk_chain(root).instrument(span).await;
    (key, outcomes)
}

/// Awaits each step in order, stopping at the first failure.
///
/// A panicking callback is caught and recorded like an error, so the
/// outcomes gathered before it are kept.
async fn walk_chain<T: Send + 'static>(root: Step<T>) -> Vec<Outcome<T>> {
    let mut outcomes = Vec::new();
    let mut current = Some(Box::new(root));
    let mut step_index = 0usize;

    while let Some(mut step) = current {
        debug!(step_index, "Step started");

        // Invoke inside the future so a panicking sync callback is caught too.
        let call = async { step.invoke().await };
        let result = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result.map_err(|e| StepFailure::from_error(step_index, &e)),
            Err(payload) => Err(StepFailure::from_panic(step_index, payload)),
        };

        match result {
            Ok(value) => {
                debug!(step_index, "Step completed");
                outcomes.push(Outcome::Value(value));
            }
            Err(failure) => {
                let skipped = step.next().map_or(0, Step::chain_len);
                warn!(
                    step_index,
                    skipped_steps = skipped,
                    error = %failure.message,
                    "Step failed"
                );
                outcomes.push(Outcome::Failed(failure));
                break;
            }
        }

        current = step.take_next();
        step_index += 1;
    }

    outcomes
}

fn collect_results<T>(settled: Vec<(String, Vec<Outcome<T>>)>) -> ResultMap<T> {
    let mut results = ResultMap::with_capacity(settled.len());
    for (key, outcomes) in settled {
        results.insert(key, outcomes);
    }
    results
}
