//! Device submission queues shared between frame slots.
//!
//! A queue may serve several slots (the conservative layout shares one queue
//! between both slots). Submissions from different worker threads must not
//! interleave on one queue, so each queue sits behind its own mutex, held only
//! for the duration of a submit.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::backend::Backend;
use crate::config::SchedulerConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::slot::SlotId;

/// A device queue with serialized submission.
pub struct SubmissionQueue<B: Backend> {
    index: usize,
    inner: Mutex<B::Queue>,
}

impl<B: Backend> SubmissionQueue<B> {
    fn new(index: usize, queue: B::Queue) -> Self {
        Self {
            index,
            inner: Mutex::new(queue),
        }
    }

    /// Queue index on the device.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Lock the queue for a submission.
    pub(crate) fn lock(&self) -> MutexGuard<'_, B::Queue> {
        self.inner.lock()
    }
}

/// Queue index used by `slot`: slot `i` uses queue `i % queue_count`.
///
/// Under [`QueueAssignment::Even`](crate::config::QueueAssignment::Even) the
/// configuration guarantees every queue ends up with the same number of slots.
pub fn queue_index_for_slot(slot: SlotId, queue_count: usize) -> usize {
    slot.index() % queue_count
}

/// Take `config.queue_count` queues from `backend` and map each slot to one.
///
/// Returns one entry per slot; slots sharing a queue share the `Arc`.
///
/// # Errors
///
/// Fails if the backend exposes fewer queues than requested or refuses to
/// hand one out.
pub fn assign_queues<B: Backend>(
    backend: &B,
    config: &SchedulerConfig,
) -> PipelineResult<Vec<Arc<SubmissionQueue<B>>>> {
    if config.queue_count > backend.queue_count() {
        return Err(PipelineError::ConstructionFailed(format!(
            "{} queues requested but backend '{}' exposes {}",
            config.queue_count,
            backend.name(),
            backend.queue_count()
        )));
    }

    let queues = (0..config.queue_count)
        .map(|index| {
            backend
                .queue(index)
                .map(|queue| Arc::new(SubmissionQueue::new(index, queue)))
                .map_err(|e| PipelineError::ConstructionFailed(format!("queue {index}: {e}")))
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    Ok((0..config.slot_count)
        .map(|slot| {
            let index = queue_index_for_slot(SlotId::new(slot), config.queue_count);
            Arc::clone(&queues[index])
        })
        .collect())
}
