//! Tracing tests for Loader
//!
//! These tests verify that structured tracing events and spans are emitted
//! while chains are loaded.

use std::io::Write;
use std::sync::{Arc, Mutex};
use step_loader::{Loader, ready};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

// ============================================================================
// Test Infrastructure
// ============================================================================

/// Shared buffer the subscriber writes formatted events into.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn output(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn subscriber(captured: &Captured) -> impl tracing::Subscriber + Send + Sync {
    let captured = captured.clone();
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_ansi(false)
        .with_writer(move || captured.clone())
        .finish()
}

// ============================================================================
// Tracing Tests
// ============================================================================

#[tokio::test]
async fn test_load_span_created() {
    let captured = Captured::default();
    let _guard = tracing::subscriber::set_default(subscriber(&captured));

    let mut loader = Loader::new();
    loader.step(ready(|| Ok::<_, anyhow::Error>(1)), "a").unwrap();
    loader.step(ready(|| Ok::<_, anyhow::Error>(2)), "b").unwrap();

    let _results = loader.load().await;

    let output = captured.output();

    assert!(
        output.contains("loader_load"),
        "Top-level span 'loader_load' not found in output:\n{}",
        output
    );
    assert!(
        output.contains("chains=2"),
        "Span should include chain count in output:\n{}",
        output
    );
}

#[tokio::test]
async fn test_chain_spans_created() {
    let captured = Captured::default();
    let _guard = tracing::subscriber::set_default(subscriber(&captured));

    let mut loader = Loader::new();
    loader
        .step(ready(|| Ok::<_, anyhow::Error>(1)), "settings")
        .unwrap()
        .step(ready(|| Ok::<_, anyhow::Error>(2)))
        .unwrap();

    let _results = loader.load().await;

    let output = captured.output();

    assert!(
        output.contains("key=settings"),
        "Chain span with key not found in output:\n{}",
        output
    );
    assert!(
        output.contains("step_index=1"),
        "Second step event not found in output:\n{}",
        output
    );
    assert!(
        output.contains("completed=1") && output.contains("failed=0"),
        "Load summary not found in output:\n{}",
        output
    );
}

#[tokio::test]
async fn test_step_failure_logged() {
    let captured = Captured::default();
    let _guard = tracing::subscriber::set_default(subscriber(&captured));

    let mut loader: Loader<i32> = Loader::new();
    loader
        .step(
            || async { Err::<i32, _>(anyhow::anyhow!("upstream unavailable")) },
            "remote",
        )
        .unwrap()
        .step(ready(|| Ok::<_, anyhow::Error>(2)))
        .unwrap();

    let _results = loader.load().await;

    let output = captured.output();

    assert!(
        output.contains("WARN"),
        "Failure should be logged at warn level:\n{}",
        output
    );
    assert!(
        output.contains("upstream unavailable"),
        "Failure message not found in output:\n{}",
        output
    );
    assert!(
        output.contains("skipped_steps=1"),
        "Skipped step count not found in output:\n{}",
        output
    );
}
