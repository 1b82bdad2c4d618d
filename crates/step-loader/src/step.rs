//! Chain nodes.
//!
//! A [`Step`] is one unit of asynchronous work plus an optional, exclusively
//! owned successor. Only the root of a chain carries a key.

use crate::error::ValidationError;
use futures::future::{self, BoxFuture, FutureExt, TryFutureExt};
use serde_json::Value as JsonValue;
use std::fmt;
use std::future::Future;
use tracing::debug;

/// The future produced by invoking a step's callback.
pub(crate) type StepFuture<T> = BoxFuture<'static, anyhow::Result<T>>;

/// A type-erased, zero-argument step callback.
pub(crate) type Callback<T> = Box<dyn Fn() -> StepFuture<T> + Send + Sync>;

/// Erases a user callback into a [`Callback`].
pub(crate) fn boxed<T, F, Fut, E>(callback: F) -> Callback<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
    T: Send + 'static,
{
    Box::new(move || callback().map_err(|e: E| -> anyhow::Error { e.into() }).boxed())
}

/// Adapts a synchronous callback so it can be registered as a step.
///
/// # Examples
///
/// ```ignore
/// use step_loader::{Loader, ready};
///
/// let mut loader = Loader::new();
/// loader.step(ready(|| Ok::<_, std::io::Error>(1)), "a")?;
/// ```
pub fn ready<T, E, F>(
    callback: F,
) -> impl Fn() -> future::Ready<Result<T, E>> + Send + Sync + 'static
where
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    move || future::ready(callback())
}

/// A single node of a chain.
///
/// Handles to steps are only ever handed out as `&mut Step<T>` borrowed from
/// the owning [`Loader`](crate::Loader), so a node cannot be aliased or linked
/// into a cycle.
///
/// # Examples
///
/// ```ignore
/// loader
///     .step(|| async { fetch("database").await }, "database")?
///     .step(|| async { fetch("pool").await })?
///     .step(|| async { fetch("replicas").await })?;
/// ```
pub struct Step<T = JsonValue> {
    key: Option<String>,
    callback: Callback<T>,
    next: Option<Box<Step<T>>>,
}

impl<T> Step<T> {
    pub(crate) fn root(key: String, callback: Callback<T>) -> Self {
        Self {
            key: Some(key),
            callback,
            next: None,
        }
    }

    /// Returns the chain key. Only root steps have one.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.key.is_some()
    }

    /// Returns true once a successor has been linked.
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Returns the successor, if any.
    pub fn next(&self) -> Option<&Step<T>> {
        self.next.as_deref()
    }

    /// Iterates over this step and every step after it, in chain order.
    pub fn iter(&self) -> impl Iterator<Item = &Step<T>> {
        std::iter::successors(Some(self), |step| step.next())
    }

    /// Number of steps from this one to the end of the chain, inclusive.
    pub fn chain_len(&self) -> usize {
        self.iter().count()
    }

    pub(crate) fn invoke(&self) -> StepFuture<T> {
        (self.callback)()
    }

    pub(crate) fn take_key(&mut self) -> Option<String> {
        self.key.take()
    }

    pub(crate) fn take_next(&mut self) -> Option<Box<Step<T>>> {
        self.next.take()
    }
}

impl<T: Send + 'static> Step<T> {
    /// Links a new step after this one and returns it.
    ///
    /// Fails with [`ValidationError::SuccessorExists`] if this step is already
    /// linked. Use [`step_with`](Self::step_with) to replace the successor.
    pub fn step<F, Fut, E>(&mut self, callback: F) -> Result<&mut Step<T>, ValidationError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        self.step_with(callback, false)
    }

    /// Links a new step after this one, optionally replacing an existing
    /// successor.
    ///
    /// With `overwrite` set, the previous successor and every step after it
    /// are dropped.
    pub fn step_with<F, Fut, E>(
        &mut self,
        callback: F,
        overwrite: bool,
    ) -> Result<&mut Step<T>, ValidationError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        if let Some(old) = &self.next {
            if !overwrite {
                return Err(ValidationError::SuccessorExists);
            }
            debug!(
                discarded_steps = old.chain_len(),
                "Overwriting successor step"
            );
        }

        let next: &mut Step<T> = self.next.insert(Box::new(Step {
            key: None,
            callback: boxed(callback),
            next: None,
        }));
        Ok(next)
    }
}

// Unlink iteratively so long chains don't recurse on drop.
impl<T> Drop for Step<T> {
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(mut step) = next {
            next = step.next.take();
        }
    }
}

impl<T> fmt::Debug for Step<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("key", &self.key)
            .field("chain_len", &self.chain_len())
            .finish_non_exhaustive()
    }
}
