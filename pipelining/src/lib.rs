//! # RedLilium Pipelining
//!
//! Frame-pipelining scheduler for RedLilium: overlaps CPU-side recording,
//! device execution and presentation over a small ring of reusable frame
//! slots.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Scheduler`] - Drives `N` frame slots through precomputed stage graphs
//! - [`FrameSlot`] - One recording resource plus its synchronization primitives
//! - [`StageGraph`] - The operations of one tick, one per slot
//! - [`SharedSurface`] - Access-serialized presentation surface
//! - [`Backend`] - Trait for the device services the scheduler consumes
//! - [`Diagnostics`] - Explicitly passed counters, timings and frame events
//!
//! ## Example
//!
//! ```
//! # #[cfg(feature = "dummy")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use redlilium_pipelining::{
//!     Diagnostics, DummyBackend, DummyDrawList, Scheduler, SchedulerConfig, TickStatus,
//! };
//!
//! let backend = Arc::new(DummyBackend::new());
//! let surface = backend.create_surface()?;
//! let mut scheduler = Scheduler::new(
//!     backend,
//!     surface,
//!     SchedulerConfig::conservative(),
//!     Arc::new(Diagnostics::new("example")),
//! )?;
//!
//! for _ in 0..8 {
//!     let status = scheduler.tick(|_slot| DummyDrawList::new(16))?;
//!     assert_eq!(status, TickStatus::Completed);
//! }
//! scheduler.shutdown()?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "dummy"))]
//! # fn main() {}
//! ```

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod queue;
pub mod scheduler;
pub mod slot;
pub mod surface;
pub mod sync;

// Re-export main types for convenience
pub use backend::{AcquiredImage, Backend, Extent2d, ImageIndex, PresentSurface};
#[cfg(feature = "dummy")]
pub use backend::{
    DummyBackend, DummyControl, DummyDeviceConfig, DummyDrawList, DummyStats, DummySurface,
};
pub use config::{DispatchMode, QueueAssignment, SchedulerConfig};
pub use diagnostics::{Diagnostics, FrameEvent, FrameEventSink, FrameRate, GateCheck};
pub use error::{BackendError, PipelineError, PipelineResult, SurfaceError};
pub use graph::{PerStage, Stage, StageGraph, StageGroup, StageOp};
pub use scheduler::{Scheduler, SkipReason, TickStatus};
pub use slot::{FrameSlot, SlotId, SlotStage};
pub use surface::SharedSurface;
pub use sync::SyncFactory;

/// Pipelining library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version.
pub fn init() {
    log::info!("RedLilium Pipelining v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_graphs_for_presets() {
        assert_eq!(
            graph::build_graphs(SchedulerConfig::conservative().slot_count).len(),
            2
        );
        assert_eq!(
            graph::build_graphs(SchedulerConfig::aggressive().slot_count).len(),
            4
        );
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert!(backend.name() == "Dummy");
    }
}
