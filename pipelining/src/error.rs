//! Pipelining error types.
//!
//! Only fatal conditions are represented by [`PipelineError`]. Recoverable
//! surface conditions ([`SurfaceError::Outdated`], [`SurfaceError::Timeout`])
//! are consumed by the scheduler and reach the caller as a
//! [`TickStatus`](crate::scheduler::TickStatus) instead.

use std::time::Duration;

use thiserror::Error;

use crate::slot::{SlotId, SlotStage};

/// Errors reported by a [`Backend`](crate::backend::Backend) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Failed to create a backend object.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// Queue submission or command recording failed.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),
    /// The device was lost.
    #[error("GPU device lost")]
    DeviceLost,
}

/// Errors reported by a [`PresentSurface`](crate::backend::PresentSurface).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// The surface no longer matches its window and must be rebuilt.
    #[error("surface outdated, needs rebuild")]
    Outdated,
    /// No image became available within the acquire timeout.
    #[error("timed out waiting for a presentable image")]
    Timeout,
    /// The surface is gone for good.
    #[error("surface lost: {0}")]
    Lost(String),
}

/// Fatal errors surfaced by the [`Scheduler`](crate::scheduler::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// A completion gate did not signal within its timeout. Device state is
    /// unknown and the scheduler refuses further work.
    #[error("device hang: slot {slot} completion gate not signaled after {waited:?}")]
    DeviceHang {
        /// Slot whose gate timed out.
        slot: SlotId,
        /// How long the host waited.
        waited: Duration,
    },
    /// A synchronization primitive, queue, recording resource or surface
    /// could not be created.
    #[error("construction failed: {0}")]
    ConstructionFailed(String),
    /// Slot and queue counts do not describe a usable pipeline.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A slot was driven out of stage order.
    #[error("slot {slot} cannot move from {from:?} to {to:?}")]
    StageOrder {
        /// Offending slot.
        slot: SlotId,
        /// Stage the slot was in.
        from: SlotStage,
        /// Stage it was asked to enter.
        to: SlotStage,
    },
    /// Recording or submission failed in the backend.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The presentation surface is gone and cannot be rebuilt.
    #[error("presentation surface lost: {0}")]
    SurfaceLost(String),
    /// The scheduler already reported a fatal error.
    #[error("scheduler terminated after a fatal error")]
    Terminated,
}

impl PipelineError {
    /// Whether this error came from a construction step (startup or rebuild).
    pub fn is_construction_failure(&self) -> bool {
        matches!(
            self,
            Self::ConstructionFailed(_) | Self::InvalidConfiguration(_) | Self::SurfaceLost(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type PipelineResult<T> = Result<T, PipelineError>;
