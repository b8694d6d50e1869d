//! Synchronization primitive construction.
//!
//! Two kinds of primitives are used by a frame slot:
//!
//! - **Device signals** order work between queue operations (acquire →
//!   render → present). The host never waits on them.
//! - **Host gates** let the host learn that a submission has retired. They
//!   are created signaled so the first reuse check passes immediately.
//!
//! Construction failures are fatal: a backend that cannot create primitives
//! is unusable, so every error is mapped to
//! [`PipelineError::ConstructionFailed`].

use crate::backend::Backend;
use crate::error::{PipelineError, PipelineResult};
use crate::slot::SlotId;

/// Creates synchronization primitives through a backend.
pub struct SyncFactory<'a, B: Backend + ?Sized> {
    backend: &'a B,
}

impl<'a, B: Backend + ?Sized> SyncFactory<'a, B> {
    /// Create a factory borrowing `backend`.
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Create a device-only ordering primitive.
    pub fn make_device_signal(&self, label: &str) -> PipelineResult<B::DeviceSignal> {
        self.backend.make_device_signal().map_err(|e| {
            PipelineError::ConstructionFailed(format!("device signal '{label}': {e}"))
        })
    }

    /// Create a host gate in the given initial state.
    pub fn make_host_gate(&self, signaled: bool, label: &str) -> PipelineResult<B::HostGate> {
        self.backend
            .make_host_gate(signaled)
            .map_err(|e| PipelineError::ConstructionFailed(format!("host gate '{label}': {e}")))
    }
}

/// The primitives owned by one frame slot.
pub struct SlotSync<B: Backend + ?Sized> {
    /// Signaled by the surface when the slot's image is acquired.
    pub(crate) acquired: B::DeviceSignal,
    /// Signaled by the device when the slot's submission finishes.
    pub(crate) completed: B::DeviceSignal,
    /// Signaled when the submission retires; gates slot reuse.
    pub(crate) gate: B::HostGate,
}

impl<B: Backend + ?Sized> SlotSync<B> {
    /// Create the primitives for `slot`. The gate starts signaled.
    pub fn new(factory: &SyncFactory<'_, B>, slot: SlotId) -> PipelineResult<Self> {
        let acquired = factory.make_device_signal(&format!("slot {slot} acquired"))?;
        let completed = factory.make_device_signal(&format!("slot {slot} completed"))?;
        let gate = factory.make_host_gate(true, &format!("slot {slot} gate"))?;
        log::trace!("Created sync primitives for slot {}", slot);
        Ok(Self {
            acquired,
            completed,
            gate,
        })
    }

    /// Replace both device signals with fresh ones.
    ///
    /// After a surface rebuild a signal may have been signaled by an acquire
    /// whose image was never rendered, or by a render that was never
    /// presented. Nothing will ever consume those, so they are recreated.
    pub fn renew_signals(
        &mut self,
        factory: &SyncFactory<'_, B>,
        slot: SlotId,
    ) -> PipelineResult<()> {
        self.acquired = factory.make_device_signal(&format!("slot {slot} acquired"))?;
        self.completed = factory.make_device_signal(&format!("slot {slot} completed"))?;
        Ok(())
    }
}
