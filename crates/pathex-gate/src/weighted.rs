use crate::cost::Cost;
use crate::error::GateError;
use crate::ticket::AdmissionTicket;
use crate::wait::wait_for_permit;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

/// Admits work while the summed cost of everything in flight stays within a fixed capacity.
///
/// Check-and-charge is a single semaphore operation, so concurrent admissions can never
/// over-commit. Waiters are queued first-come first-served: a large request at the head of the
/// queue holds back smaller ones behind it instead of being starved by them.
///
/// A request whose own cost exceeds the whole capacity is charged the full capacity instead,
/// which admits it once the gate is idle and keeps everyone else out until it finishes.
#[derive(Debug)]
pub struct WeightedGate {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    capacity: u32,
    wait_timeout: Option<Duration>,
}

impl WeightedGate {
    pub fn new(name: &'static str, capacity: Cost) -> Self {
        let max = u32::try_from(Semaphore::MAX_PERMITS).unwrap_or(u32::MAX);
        let capacity = capacity.units().clamp(1, max);
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
            wait_timeout: None,
        }
    }

    /// Bounds how long [`WeightedGate::acquire`] may wait. `None` waits indefinitely.
    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> Cost {
        Cost::from_units(self.capacity)
    }

    /// Cost currently charged by outstanding tickets.
    pub fn inflight(&self) -> Cost {
        let available = u32::try_from(self.semaphore.available_permits()).unwrap_or(u32::MAX);
        Cost::from_units(self.capacity.saturating_sub(available))
    }

    fn charge_for(&self, cost: Cost) -> u32 {
        let charged = cost.units().min(self.capacity);
        if charged < cost.units() {
            tracing::debug!(
                target: "pathex.gate",
                gate = self.name,
                %cost,
                capacity = self.capacity,
                "request exceeds gate capacity; charging full capacity"
            );
        }
        charged
    }

    /// Waits until `cost` fits, then charges it. Zero cost is admitted immediately without
    /// touching the gate.
    pub async fn acquire(
        &self,
        cost: Cost,
        cancel: &CancellationToken,
    ) -> Result<AdmissionTicket, GateError> {
        if cost.is_zero() {
            return Ok(AdmissionTicket::exempt(self.name));
        }
        let charged = self.charge_for(cost);

        match self.semaphore.clone().try_acquire_many_owned(charged) {
            Ok(permit) => return Ok(AdmissionTicket::admitted(self.name, permit, charged)),
            Err(TryAcquireError::Closed) => return Err(GateError::Closed { gate: self.name }),
            Err(TryAcquireError::NoPermits) => {}
        }

        tracing::debug!(
            target: "pathex.gate",
            gate = self.name,
            charged,
            inflight = self.inflight().units(),
            capacity = self.capacity,
            "waiting for capacity"
        );
        let acquire = self.semaphore.clone().acquire_many_owned(charged);
        let permit = wait_for_permit(self.name, acquire, cancel, self.wait_timeout).await?;
        Ok(AdmissionTicket::admitted(self.name, permit, charged))
    }

    /// Admits without waiting, or returns `None` when `cost` does not fit right now.
    pub fn try_acquire(&self, cost: Cost) -> Option<AdmissionTicket> {
        if cost.is_zero() {
            return Some(AdmissionTicket::exempt(self.name));
        }
        let charged = self.charge_for(cost);
        self.semaphore
            .clone()
            .try_acquire_many_owned(charged)
            .ok()
            .map(|permit| AdmissionTicket::admitted(self.name, permit, charged))
    }

    /// Fails every current and future waiter with [`GateError::Closed`]. Outstanding tickets stay
    /// valid until dropped.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn inflight_never_exceeds_capacity() {
        let gate = Arc::new(WeightedGate::new("raster", Cost::from_units(100)));
        let observed = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for i in 0..64u32 {
            let gate = gate.clone();
            let observed = observed.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let cost = Cost::from_units(10 + (i * 7) % 60);
                let ticket = gate
                    .acquire(cost, &CancellationToken::new())
                    .await
                    .unwrap();
                let now = observed.fetch_add(ticket.charged(), Ordering::SeqCst) + ticket.charged();
                peak.fetch_max(now, Ordering::SeqCst);
                assert!(gate.inflight().units() <= 100);
                tokio::time::sleep(Duration::from_millis(2)).await;
                observed.fetch_sub(ticket.charged(), Ordering::SeqCst);
                drop(ticket);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 100);
        assert_eq!(gate.inflight(), Cost::ZERO);
    }

    #[tokio::test]
    async fn zero_cost_skips_a_full_gate() {
        let gate = WeightedGate::new("raster", Cost::from_units(10));
        let _held = gate.try_acquire(Cost::from_units(10)).unwrap();

        let ticket = gate
            .acquire(Cost::ZERO, &CancellationToken::new())
            .await
            .unwrap();
        assert!(ticket.is_exempt());
        assert_eq!(gate.inflight().units(), 10);
    }

    #[tokio::test]
    async fn oversized_request_is_admitted_alone() {
        let gate = WeightedGate::new("raster", Cost::from_units(10));
        let cancel = CancellationToken::new();

        let big = gate.acquire(Cost::from_units(50), &cancel).await.unwrap();
        assert_eq!(big.charged(), 10);
        assert_eq!(gate.inflight().units(), 10);
        assert!(gate.try_acquire(Cost::from_units(1)).is_none());

        drop(big);
        assert!(gate.try_acquire(Cost::from_units(1)).is_some());
    }

    #[tokio::test]
    async fn oversized_request_waits_for_the_gate_to_drain() {
        let gate = Arc::new(WeightedGate::new("raster", Cost::from_units(10)));
        let small = gate.try_acquire(Cost::from_units(3)).unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.acquire(Cost::from_units(500), &CancellationToken::new())
                    .await
                    .map(|ticket| ticket.charged())
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(small);
        assert_eq!(waiter.await.unwrap().unwrap(), 10);
    }

    #[tokio::test]
    async fn cancelled_waiter_leaves_accounting_untouched() {
        let gate = Arc::new(WeightedGate::new("raster", Cost::from_units(10)));
        let held = gate.try_acquire(Cost::from_units(8)).unwrap();
        let cancel = CancellationToken::new();

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.acquire(Cost::from_units(5), &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err, GateError::Cancelled { gate: "raster" });
        assert_eq!(gate.inflight().units(), 8);

        drop(held);
        assert_eq!(gate.inflight(), Cost::ZERO);
        assert!(gate.try_acquire(Cost::from_units(10)).is_some());
    }

    #[tokio::test]
    async fn aborted_waiter_leaves_accounting_untouched() {
        let gate = Arc::new(WeightedGate::new("raster", Cost::from_units(10)));
        let held = gate.try_acquire(Cost::from_units(10)).unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _ticket = gate
                    .acquire(Cost::from_units(4), &CancellationToken::new())
                    .await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        drop(held);
        assert_eq!(gate.inflight(), Cost::ZERO);
        assert!(gate.try_acquire(Cost::from_units(10)).is_some());
    }

    #[tokio::test]
    async fn bounded_wait_times_out() {
        let gate = WeightedGate::new("raster", Cost::from_units(10))
            .with_wait_timeout(Some(Duration::from_millis(30)));
        let _held = gate.try_acquire(Cost::from_units(10)).unwrap();

        let err = gate
            .acquire(Cost::from_units(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::TimedOut { gate: "raster", .. }));
        assert_eq!(gate.inflight().units(), 10);
    }

    #[tokio::test]
    async fn closing_fails_waiters() {
        let gate = Arc::new(WeightedGate::new("raster", Cost::from_units(10)));
        let _held = gate.try_acquire(Cost::from_units(10)).unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.acquire(Cost::from_units(1), &CancellationToken::new())
                    .await
                    .map(|_| ())
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.close();
        assert_eq!(
            waiter.await.unwrap().unwrap_err(),
            GateError::Closed { gate: "raster" }
        );
    }
}
