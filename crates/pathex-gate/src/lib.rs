//! Admission control for expensive render work.
//!
//! Two gates bound concurrent rendering:
//! - [`WeightedGate`] charges each request its estimated memory [`Cost`] against a fixed
//!   capacity, so a handful of huge rasters and many small ones are throttled alike.
//! - [`CountingGate`] bounds the number of in-flight operations of a pipeline whose requests
//!   cost roughly the same (document generation).
//!
//! Both block rather than reject when full. Admission hands out an [`AdmissionTicket`] whose
//! `Drop` returns the capacity, so release happens exactly once on every exit path. A task that
//! is cancelled (or whose future is dropped) while waiting leaves the wait queue without
//! touching the gate's accounting.

mod cost;
mod counting;
mod error;
mod ticket;
mod wait;
mod weighted;

pub use cost::{Cost, CostEstimator, CostModel, COST_UNIT_BYTES};
pub use counting::CountingGate;
pub use error::GateError;
pub use ticket::AdmissionTicket;
pub use weighted::WeightedGate;

pub use tokio_util::sync::CancellationToken;
