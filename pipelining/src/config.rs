//! Scheduler configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use redlilium_pipelining::config::{DispatchMode, SchedulerConfig};
//!
//! let config = SchedulerConfig::new(4, 4)
//!     .with_dispatch(DispatchMode::Parallel)
//!     .with_gate_timeout(Duration::from_millis(500));
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};
use crate::graph::STAGE_COUNT;

/// How slots are mapped onto submission queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueAssignment {
    /// Every queue serves the same number of slots. Rejects counts where
    /// `queue_count` does not divide `slot_count`.
    #[default]
    Even,
    /// Slot `i` uses queue `i % queue_count`; queues may serve unequal
    /// numbers of slots.
    RoundRobin,
}

/// How the operations of one tick are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DispatchMode {
    /// One scoped worker thread per operation, joined before the tick returns.
    #[default]
    Parallel,
    /// Operations run one after another on the calling thread.
    Sequential,
}

/// Configuration for a [`Scheduler`](crate::scheduler::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of frame slots (pipeline depth).
    pub slot_count: usize,
    /// Number of device submission queues.
    pub queue_count: usize,
    /// Slot to queue mapping policy.
    pub queue_assignment: QueueAssignment,
    /// Per-tick dispatch strategy.
    pub dispatch: DispatchMode,
    /// Maximum time an acquire may block before the tick is skipped.
    pub acquire_timeout: Duration,
    /// Maximum time to wait on a completion gate before declaring a hang.
    pub gate_timeout: Duration,
}

impl SchedulerConfig {
    /// Create a configuration with the given slot and queue counts.
    pub fn new(slot_count: usize, queue_count: usize) -> Self {
        Self {
            slot_count,
            queue_count,
            queue_assignment: QueueAssignment::default(),
            dispatch: DispatchMode::default(),
            acquire_timeout: Duration::from_secs(1),
            gate_timeout: Duration::from_secs(1),
        }
    }

    /// Two slots on one queue. Acquire and Record are fused, as are Render
    /// and Present.
    pub fn conservative() -> Self {
        Self::new(2, 1)
    }

    /// Four slots on four queues, one stage per slot per tick.
    pub fn aggressive() -> Self {
        Self::new(4, 4)
    }

    /// Set the queue assignment policy.
    pub fn with_queue_assignment(mut self, queue_assignment: QueueAssignment) -> Self {
        self.queue_assignment = queue_assignment;
        self
    }

    /// Set the dispatch mode.
    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Set the acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the completion gate timeout.
    pub fn with_gate_timeout(mut self, timeout: Duration) -> Self {
        self.gate_timeout = timeout;
        self
    }

    /// Check that the counts describe a usable pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] when there are no
    /// slots, more slots than stages, no queues, more queues than slots, or
    /// an uneven split under [`QueueAssignment::Even`].
    pub fn validate(&self) -> PipelineResult<()> {
        if self.slot_count == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "slot count must be at least 1".to_string(),
            ));
        }
        if self.slot_count > STAGE_COUNT {
            return Err(PipelineError::InvalidConfiguration(format!(
                "slot count {} exceeds the {STAGE_COUNT} pipeline stages",
                self.slot_count
            )));
        }
        if self.queue_count == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "queue count must be at least 1".to_string(),
            ));
        }
        if self.queue_count > self.slot_count {
            return Err(PipelineError::InvalidConfiguration(format!(
                "{} queues for {} slots would leave queues unused",
                self.queue_count, self.slot_count
            )));
        }
        if self.queue_assignment == QueueAssignment::Even && self.slot_count % self.queue_count != 0
        {
            return Err(PipelineError::InvalidConfiguration(format!(
                "{} slots cannot be split evenly across {} queues",
                self.slot_count, self.queue_count
            )));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    /// The conservative two-slot layout.
    fn default() -> Self {
        Self::conservative()
    }
}
