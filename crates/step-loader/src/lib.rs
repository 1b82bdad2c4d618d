//! 'step-loader' - Run independent chains of ordered async steps.
//!
//! A [`Loader`] holds any number of *chains*. Each chain is a sequence of
//! zero-argument async callbacks that run strictly in order: a step starts
//! only after the previous step's result is available. Distinct chains run
//! concurrently with each other. [`Loader::load`] waits for every chain to
//! settle and returns a [`ResultMap`] keyed by chain key, holding each
//! chain's per-step [`Outcome`]s in order.
//!
//! # Example
//!
//! ```ignore
//! use step_loader::{Loader, ready};
//!
//! let mut loader: Loader<u32> = Loader::new();
//! loader
//!     .step(|| async { Ok::<_, anyhow::Error>(1) }, "a")?
//!     .step(ready(|| Ok::<_, anyhow::Error>(2)))?;
//! loader.step(|| async { Ok::<_, anyhow::Error>(10) }, "b")?;
//!
//! let results = loader.load().await;
//! assert_eq!(results.values("a"), Some(vec![&1, &2]));
//! assert_eq!(results.values("b"), Some(vec![&10]));
//! ```
//!
//! # Failures
//!
//! Registration errors are returned synchronously as [`ValidationError`].
//! A callback failure never fails `load`: it is recorded as
//! [`Outcome::Failed`] under the chain's key, and the remaining steps of that
//! chain are not run. Other chains are unaffected.

pub mod config;
pub mod error;
pub mod loader;
pub mod outcome;
pub mod step;

pub use config::{Dispatch, LoaderConfig};
pub use error::{LoadError, ValidationError};
pub use loader::Loader;
pub use outcome::{FailureKind, Outcome, ResultMap, StepFailure};
pub use step::{Step, ready};
