use crate::error::GateError;
use crate::ticket::AdmissionTicket;
use crate::wait::wait_for_permit;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

/// Bounds the number of concurrent operations regardless of their size.
#[derive(Debug)]
pub struct CountingGate {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    limit: usize,
    wait_timeout: Option<Duration>,
}

impl CountingGate {
    pub fn new(name: &'static str, limit: usize) -> Self {
        let limit = limit.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            wait_timeout: None,
        }
    }

    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn inflight(&self) -> usize {
        self.limit.saturating_sub(self.semaphore.available_permits())
    }

    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<AdmissionTicket, GateError> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => return Ok(AdmissionTicket::admitted(self.name, permit, 1)),
            Err(TryAcquireError::Closed) => return Err(GateError::Closed { gate: self.name }),
            Err(TryAcquireError::NoPermits) => {}
        }

        tracing::debug!(
            target: "pathex.gate",
            gate = self.name,
            limit = self.limit,
            "all slots busy; waiting"
        );
        let acquire = self.semaphore.clone().acquire_owned();
        let permit = wait_for_permit(self.name, acquire, cancel, self.wait_timeout).await?;
        Ok(AdmissionTicket::admitted(self.name, permit, 1))
    }

    pub fn try_acquire(&self) -> Option<AdmissionTicket> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionTicket::admitted(self.name, permit, 1))
    }

    pub fn close(&self) {
        self.semaphore.close();
    }
}
