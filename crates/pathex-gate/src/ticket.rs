use tokio::sync::OwnedSemaphorePermit;

/// Proof of admission through a gate.
///
/// The held capacity is returned when the ticket is dropped; moving the ticket into whatever
/// performs the render ties release to the end of that work, whichever way it ends.
#[must_use = "dropping an admission ticket releases its capacity immediately"]
#[derive(Debug)]
pub struct AdmissionTicket {
    gate: &'static str,
    charged: u32,
    permit: Option<OwnedSemaphorePermit>,
}

impl AdmissionTicket {
    pub(crate) fn admitted(gate: &'static str, permit: OwnedSemaphorePermit, charged: u32) -> Self {
        Self {
            gate,
            charged,
            permit: Some(permit),
        }
    }

    /// Ticket for zero-cost work that bypasses the gate.
    pub(crate) fn exempt(gate: &'static str) -> Self {
        Self {
            gate,
            charged: 0,
            permit: None,
        }
    }

    pub fn gate(&self) -> &'static str {
        self.gate
    }

    /// Units this ticket holds against the gate's capacity.
    pub fn charged(&self) -> u32 {
        self.charged
    }

    pub fn is_exempt(&self) -> bool {
        self.permit.is_none()
    }

    /// Explicit spelling of `drop(ticket)`.
    pub fn release(self) {}
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        if self.permit.take().is_some() {
            tracing::trace!(
                target: "pathex.gate",
                gate = self.gate,
                charged = self.charged,
                "released admission ticket"
            );
        }
    }
}
