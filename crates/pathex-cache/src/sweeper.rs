use crate::token_store::TokenStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Runs [`TokenStore::sweep`] every `interval` on the blocking pool until `cancel` fires.
///
/// The first sweep happens one full interval after start-up.
pub fn spawn_sweeper(
    store: Arc<TokenStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let interval = interval.max(Duration::from_millis(10));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.sweep()).await {
                Ok(Ok(_report)) => {}
                Ok(Err(err)) => tracing::warn!(
                    target: "pathex.tokens",
                    error = %err,
                    "token store sweep failed"
                ),
                Err(err) => tracing::error!(
                    target: "pathex.tokens",
                    error = %err,
                    "token store sweep panicked"
                ),
            }
        }
        tracing::debug!(target: "pathex.tokens", "token store sweeper stopped");
    })
}
