use crate::error::GateError;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::{AcquireError, OwnedSemaphorePermit};
use tokio_util::sync::CancellationToken;

/// Waits on a semaphore acquisition until it succeeds, `cancel` fires, or the optional bounded
/// wait elapses.
///
/// Dropping the acquisition future removes the waiter from the semaphore queue, so both the
/// cancellation and the timeout path leave the gate's accounting untouched.
pub(crate) async fn wait_for_permit<F>(
    gate: &'static str,
    acquire: F,
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<OwnedSemaphorePermit, GateError>
where
    F: Future<Output = Result<OwnedSemaphorePermit, AcquireError>>,
{
    let started = Instant::now();
    let bounded = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, acquire).await {
                Ok(result) => result.map_err(|_| GateError::Closed { gate }),
                Err(_) => Err(GateError::TimedOut {
                    gate,
                    waited: started.elapsed(),
                }),
            },
            None => acquire.await.map_err(|_| GateError::Closed { gate }),
        }
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GateError::Cancelled { gate }),
        result = bounded => result,
    };

    match &result {
        Ok(_) => tracing::debug!(
            target: "pathex.gate",
            gate,
            waited_ms = started.elapsed().as_millis() as u64,
            "admitted after waiting"
        ),
        Err(err) => tracing::debug!(
            target: "pathex.gate",
            gate,
            error = %err,
            "gave up waiting for admission"
        ),
    }
    result
}
