use pathex_core::ExportError;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("cancelled while waiting for the {gate} gate")]
    Cancelled { gate: &'static str },

    #[error("no {gate} capacity after waiting {waited:?}")]
    TimedOut {
        gate: &'static str,
        waited: Duration,
    },

    #[error("the {gate} gate is closed")]
    Closed { gate: &'static str },
}

impl From<GateError> for ExportError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Cancelled { .. } => ExportError::Cancelled,
            GateError::TimedOut { waited, .. } => ExportError::Unavailable {
                waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
            },
            GateError::Closed { .. } => ExportError::Internal(err.to_string()),
        }
    }
}
