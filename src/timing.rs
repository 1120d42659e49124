use crate::stages::{Stage, StageResult};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Await `fut` and report how long it took.
pub async fn timed<F>(label: &str, fut: F) -> (F::Output, Duration)
where
    F: Future,
{
    let start = Instant::now();
    let output = fut.await;
    let elapsed = start.elapsed();
    debug!("{} completed in {:.3}s", label, elapsed.as_secs_f64());
    (output, elapsed)
}

/// Like [`timed`], but logs fallback and failure outcomes at `warn`.
pub async fn timed_stage<T, F>(stage: Stage, fut: F) -> (StageResult<T>, Duration)
where
    F: Future<Output = StageResult<T>>,
{
    let start = Instant::now();
    let result = fut.await;
    let elapsed = start.elapsed();
    let millis = elapsed.as_millis();

    match result.reason() {
        None => debug!("{} stage succeeded in {}ms", stage, millis),
        Some(reason) => warn!(
            "{} stage degraded to {:?} after {}ms: {}",
            stage,
            result.status(),
            millis,
            reason
        ),
    }

    (result, elapsed)
}
