//! The frame-pipelining scheduler.
//!
//! [`Scheduler`] owns `N` frame slots, the shared presentation surface and
//! the `N` precomputed stage graphs. Each call to [`Scheduler::tick`] runs
//! one graph and advances the rotation phase.
//!
//! # Tick
//!
//! ```text
//! tick(draw_lists)
//!   │
//!   ├─ rebuild pending? ──► drain ──► surface.rebuild ──► re-seed slots
//!   │
//!   ├─ not pre-warmed? ───► replay the N-1 ticks before phase 0 (slot
//!   │                       N-1 acquires first, so it presents first)
//!   │
//!   ├─ admission: the acquiring slot runs Acquire on the calling thread
//!   │     Timeout  ──► Skipped(Backpressure), nothing advanced
//!   │     Outdated ──► drain + rebuild, Rebuilt
//!   │
//!   ├─ dispatch the remaining operations (one per slot) and join
//!   │
//!   └─ phase = (phase + 1) mod N
//! ```
//!
//! # Synchronization
//!
//! | Between | Primitive | Who waits |
//! |---------|-----------|-----------|
//! | Acquire → Render | acquired signal | device |
//! | Render → Present | completed signal | surface |
//! | Render → next Record of the slot | completion gate | host (bounded) |
//!
//! # Errors
//!
//! Backpressure and an outdated surface are reported as [`TickStatus`]
//! values. Everything else is fatal: the scheduler records that it is
//! terminated and every later call returns [`PipelineError::Terminated`].

use std::fmt;
use std::sync::Arc;

use crate::backend::{Backend, Extent2d, ImageIndex};
use crate::config::{DispatchMode, SchedulerConfig};
use crate::diagnostics::{Diagnostics, FrameEvent, GateCheck};
use crate::error::{PipelineError, PipelineResult};
use crate::graph::{Stage, StageGraph, StageGroup, StageOp, build_graphs, prewarm_plan};
use crate::queue::assign_queues;
use crate::slot::{FrameSlot, SlotId, SlotStage, StageEnv, StageOutcome};
use crate::surface::SharedSurface;
use crate::sync::SyncFactory;

/// Why a tick did not run its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// No presentable image became available within the acquire timeout.
    Backpressure,
    /// The surface needs a rebuild but has zero area (e.g. minimized window).
    SurfaceUnavailable,
}

/// Result of a successful [`Scheduler::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickStatus {
    /// The tick ran its graph and advanced the phase.
    Completed,
    /// The tick did nothing; call again later.
    Skipped(SkipReason),
    /// The pipeline was drained and the surface rebuilt during this tick.
    Rebuilt,
}

/// Drives `N` frame slots through the precomputed stage graphs.
pub struct Scheduler<B: Backend> {
    config: SchedulerConfig,
    backend: Arc<B>,
    surface: SharedSurface<B>,
    slots: Vec<FrameSlot<B>>,
    graphs: Vec<StageGraph>,
    prewarm: Vec<StageOp>,
    prewarm_progress: usize,
    prewarmed: bool,
    phase: usize,
    ticks: u64,
    rebuild_pending: bool,
    requested_extent: Option<Extent2d>,
    diagnostics: Arc<Diagnostics>,
    terminated: bool,
    shut_down: bool,
}

impl<B: Backend> Scheduler<B> {
    /// Build a scheduler over `surface`.
    ///
    /// Creates every slot's recording resource and primitives, assigns
    /// queues and precomputes the stage graphs. Pre-warming happens on the
    /// first tick, since it needs draw lists.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidConfiguration`] if the slot and queue counts
    ///   are unusable, or the surface has fewer images than slots.
    /// - [`PipelineError::ConstructionFailed`] if the backend cannot create a
    ///   primitive, recording resource or queue.
    pub fn new(
        backend: Arc<B>,
        surface: B::Surface,
        config: SchedulerConfig,
        diagnostics: Arc<Diagnostics>,
    ) -> PipelineResult<Self> {
        config.validate()?;

        let surface = SharedSurface::new(surface);
        if surface.image_count() < config.slot_count {
            return Err(PipelineError::InvalidConfiguration(format!(
                "surface has {} images, {} slots need at least as many",
                surface.image_count(),
                config.slot_count
            )));
        }

        let queues = assign_queues(&*backend, &config)?;
        let factory = SyncFactory::new(&*backend);
        let slots = queues
            .into_iter()
            .enumerate()
            .map(|(index, queue)| FrameSlot::new(SlotId::new(index), &*backend, &factory, queue))
            .collect::<PipelineResult<Vec<_>>>()?;

        log::info!(
            "[{}] Scheduler created: {} slots, {} queues ({:?}), backend '{}', {} surface images",
            diagnostics.label(),
            config.slot_count,
            config.queue_count,
            config.queue_assignment,
            backend.name(),
            surface.image_count()
        );

        Ok(Self {
            graphs: build_graphs(config.slot_count),
            prewarm: prewarm_plan(config.slot_count),
            config,
            backend,
            surface,
            slots,
            prewarm_progress: 0,
            prewarmed: false,
            phase: 0,
            ticks: 0,
            rebuild_pending: false,
            requested_extent: None,
            diagnostics,
            terminated: false,
            shut_down: false,
        })
    }

    /// Advance the pipeline by one frame.
    ///
    /// `draw_lists` is called once per Record stage with the recording slot.
    /// It may be called from worker threads.
    ///
    /// # Errors
    ///
    /// Fatal errors only (device hang, construction failure, backend
    /// failure, lost surface). After an error the scheduler is terminated.
    pub fn tick<F>(&mut self, draw_lists: F) -> PipelineResult<TickStatus>
    where
        F: Fn(SlotId) -> B::DrawList + Sync,
    {
        self.ensure_running()?;
        let result = self.run_tick(&draw_lists);
        self.poison_on_error(result)
    }

    /// Wait for every slot's outstanding work to retire and unbind all images.
    ///
    /// The next tick rebuilds the surface if any image was bound, then
    /// pre-warms again.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DeviceHang`] if a gate does not signal in time.
    pub fn drain(&mut self) -> PipelineResult<()> {
        self.ensure_running()?;
        let result = self.drain_slots();
        self.poison_on_error(result)
    }

    /// Wait for all submitted work to retire without touching slot state.
    ///
    /// Unlike [`drain`](Self::drain), bound images stay bound and the
    /// rotation continues from the current phase on the next tick.
    pub fn wait_idle(&mut self) -> PipelineResult<()> {
        self.ensure_running()?;
        let result = self.wait_all_retired(GateCheck::Idle);
        self.poison_on_error(result)
    }

    /// Rebuild the surface at `extent` at the start of the next tick.
    pub fn request_resize(&mut self, extent: Extent2d) {
        log::debug!(
            "[{}] Resize to {}x{} requested",
            self.diagnostics.label(),
            extent.width,
            extent.height
        );
        self.requested_extent = Some(extent);
        self.rebuild_pending = true;
    }

    /// Drain the pipeline and release all slots and the surface.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DeviceHang`] if the final drain times out. Resources
    /// are released either way.
    pub fn shutdown(mut self) -> PipelineResult<()> {
        self.shut_down = true;
        if self.terminated {
            log::warn!(
                "[{}] Shutting down a terminated scheduler without draining",
                self.diagnostics.label()
            );
            return Ok(());
        }

        self.wait_all_retired(GateCheck::Drain)?;
        log::info!(
            "[{}] Scheduler shut down after {} ticks",
            self.diagnostics.label(),
            self.ticks
        );
        Ok(())
    }

    /// Current rotation phase, `0..N`.
    pub fn phase(&self) -> usize {
        self.phase
    }

    /// Number of frame slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Lifecycle position of `slot`.
    pub fn slot_stage(&self, slot: SlotId) -> Option<SlotStage> {
        self.slots.get(slot.index()).map(FrameSlot::stage)
    }

    /// Image bound to `slot`, if any.
    pub fn slot_image(&self, slot: SlotId) -> Option<ImageIndex> {
        self.slots.get(slot.index()).and_then(FrameSlot::image)
    }

    /// All frame slots.
    pub fn slots(&self) -> &[FrameSlot<B>] {
        &self.slots
    }

    /// The precomputed graphs, indexed by phase.
    pub fn graphs(&self) -> &[StageGraph] {
        &self.graphs
    }

    /// Number of ticks that ran their graph.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Whether a fatal error has been reported.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Whether the slots are in the state phase 0 expects.
    pub fn is_prewarmed(&self) -> bool {
        self.prewarmed
    }

    /// Scheduler configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The diagnostics context.
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// The shared presentation surface.
    pub fn surface(&self) -> &SharedSurface<B> {
        &self.surface
    }

    /// The backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    fn ensure_running(&self) -> PipelineResult<()> {
        if self.terminated {
            Err(PipelineError::Terminated)
        } else {
            Ok(())
        }
    }

    fn poison_on_error<T>(&mut self, result: PipelineResult<T>) -> PipelineResult<T> {
        if let Err(e) = &result {
            log::error!("[{}] Scheduler terminated: {}", self.diagnostics.label(), e);
            self.terminated = true;
        }
        result
    }

    fn needs_rebuild(&self) -> bool {
        self.rebuild_pending
            || self.surface.is_outdated()
            || self.surface.desired_extent() != self.surface.extent()
    }

    fn skip(&self, reason: SkipReason) -> TickStatus {
        log::debug!("[{}] Tick skipped: {:?}", self.diagnostics.label(), reason);
        self.diagnostics.emit(FrameEvent::TickSkipped {
            tick: self.ticks,
            reason,
        });
        TickStatus::Skipped(reason)
    }

    fn run_tick<F>(&mut self, draw_lists: &F) -> PipelineResult<TickStatus>
    where
        F: Fn(SlotId) -> B::DrawList + Sync,
    {
        let mut rebuilt = false;
        if self.needs_rebuild() {
            if !self.rebuild_surface()? {
                return Ok(self.skip(SkipReason::SurfaceUnavailable));
            }
            rebuilt = true;
        }

        if !self.prewarmed {
            match self.run_prewarm(draw_lists)? {
                StageOutcome::Backpressure if rebuilt => return Ok(TickStatus::Rebuilt),
                StageOutcome::Backpressure => return Ok(self.skip(SkipReason::Backpressure)),
                StageOutcome::Outdated => return self.rebuild_after_outdated(),
                StageOutcome::Completed | StageOutcome::Suboptimal => {}
            }
        }

        let graph = &self.graphs[self.phase];
        let env = StageEnv {
            backend: &*self.backend,
            surface: &self.surface,
            diagnostics: &self.diagnostics,
            acquire_timeout: self.config.acquire_timeout,
            gate_timeout: self.config.gate_timeout,
            tick: self.ticks,
        };

        // Admission: nothing else runs unless an image could be acquired.
        let admitting = *graph.acquiring_op();
        let admission =
            self.slots[admitting.slot.index()].run_stage(Stage::Acquire, &env, draw_lists)?;
        let mut rebuild_after = match admission {
            StageOutcome::Completed => false,
            StageOutcome::Suboptimal => true,
            StageOutcome::Backpressure if rebuilt => return Ok(TickStatus::Rebuilt),
            StageOutcome::Backpressure => return Ok(self.skip(SkipReason::Backpressure)),
            StageOutcome::Outdated => return self.rebuild_after_outdated(),
        };

        let mut groups: Vec<Option<StageGroup>> = vec![None; self.slots.len()];
        for (k, op) in graph.ops().iter().enumerate() {
            groups[op.slot.index()] = if k == 0 {
                op.group.after_first()
            } else {
                Some(op.group)
            };
        }
        let work: Vec<(&mut FrameSlot<B>, StageGroup)> = self
            .slots
            .iter_mut()
            .zip(groups)
            .filter_map(|(slot, group)| group.map(|group| (slot, group)))
            .collect();

        for outcome in dispatch(self.config.dispatch, work, &env, draw_lists) {
            match outcome? {
                StageOutcome::Completed | StageOutcome::Backpressure => {}
                StageOutcome::Suboptimal | StageOutcome::Outdated => rebuild_after = true,
            }
        }

        self.phase = (self.phase + 1) % self.slots.len();
        self.ticks += 1;
        self.diagnostics.tick_completed(self.ticks, graph.phase());

        if rebuild_after {
            self.rebuild_pending = true;
            if self.rebuild_surface()? {
                rebuilt = true;
            }
        }

        Ok(if rebuilt {
            TickStatus::Rebuilt
        } else {
            TickStatus::Completed
        })
    }

    /// Run the remaining pre-warm steps on the calling thread.
    fn run_prewarm<F>(&mut self, draw_lists: &F) -> PipelineResult<StageOutcome>
    where
        F: Fn(SlotId) -> B::DrawList + Sync,
    {
        let env = StageEnv {
            backend: &*self.backend,
            surface: &self.surface,
            diagnostics: &self.diagnostics,
            acquire_timeout: self.config.acquire_timeout,
            gate_timeout: self.config.gate_timeout,
            tick: self.ticks,
        };

        while let Some(step) = self.prewarm.get(self.prewarm_progress) {
            let outcome = self.slots[step.slot.index()].run_group(step.group, &env, draw_lists)?;
            match outcome {
                StageOutcome::Completed => {}
                StageOutcome::Suboptimal => self.rebuild_pending = true,
                other => {
                    log::debug!(
                        "[{}] Pre-warm paused at step {}/{}: {:?}",
                        self.diagnostics.label(),
                        self.prewarm_progress,
                        self.prewarm.len(),
                        other
                    );
                    return Ok(other);
                }
            }
            self.prewarm_progress += 1;
        }

        self.prewarmed = true;
        self.diagnostics.emit(FrameEvent::PrewarmComplete);
        log::debug!(
            "[{}] Pipeline pre-warmed ({} steps)",
            self.diagnostics.label(),
            self.prewarm.len()
        );
        Ok(StageOutcome::Completed)
    }

    fn rebuild_after_outdated(&mut self) -> PipelineResult<TickStatus> {
        self.rebuild_pending = true;
        if self.rebuild_surface()? {
            Ok(TickStatus::Rebuilt)
        } else {
            Ok(self.skip(SkipReason::SurfaceUnavailable))
        }
    }

    /// Drain, rebuild the surface and re-seed the slots.
    ///
    /// Returns `false` without touching anything if the target extent has
    /// zero area; the rebuild stays pending.
    fn rebuild_surface(&mut self) -> PipelineResult<bool> {
        let extent = self
            .requested_extent
            .unwrap_or_else(|| self.surface.desired_extent());
        if extent.is_empty() {
            log::debug!(
                "[{}] Surface rebuild deferred: zero extent",
                self.diagnostics.label()
            );
            self.rebuild_pending = true;
            return Ok(false);
        }

        self.drain_slots()?;
        self.surface.rebuild(extent)?;
        let images = self.surface.image_count();
        if images < self.slots.len() {
            return Err(PipelineError::ConstructionFailed(format!(
                "rebuilt surface has {} images, {} slots need at least as many",
                images,
                self.slots.len()
            )));
        }
        self.rebuild_pending = false;
        self.requested_extent = None;
        self.diagnostics.emit(FrameEvent::SurfaceRebuilt { extent });
        Ok(true)
    }

    /// Wait for every gate, then return every slot to `Idle` with fresh
    /// device signals and require a new pre-warm.
    fn drain_slots(&mut self) -> PipelineResult<()> {
        self.wait_all_retired(GateCheck::Drain)?;

        let held_images = self.slots.iter().any(|slot| slot.image().is_some());
        let factory = SyncFactory::new(&*self.backend);
        for slot in &mut self.slots {
            slot.reset_after_drain(&factory)?;
        }
        if held_images {
            // Images acquired but never presented only return to the pool
            // through a rebuild.
            self.rebuild_pending = true;
        }

        self.phase = 0;
        self.prewarm_progress = 0;
        self.prewarmed = false;
        self.diagnostics.emit(FrameEvent::DrainEnd);
        Ok(())
    }

    fn wait_all_retired(&self, check: GateCheck) -> PipelineResult<()> {
        log::debug!(
            "[{}] Waiting for {} slots to retire ({:?})",
            self.diagnostics.label(),
            self.slots.len(),
            check
        );
        if check == GateCheck::Drain {
            self.diagnostics.emit(FrameEvent::DrainBegin);
        }
        for slot in &self.slots {
            slot.wait_retired(
                &*self.backend,
                &self.diagnostics,
                self.config.gate_timeout,
                check,
            )?;
        }
        Ok(())
    }
}

/// Run one stage group per slot and collect the outcomes in slot order.
fn dispatch<B, F>(
    mode: DispatchMode,
    work: Vec<(&mut FrameSlot<B>, StageGroup)>,
    env: &StageEnv<'_, B>,
    draw_lists: &F,
) -> Vec<PipelineResult<StageOutcome>>
where
    B: Backend,
    F: Fn(SlotId) -> B::DrawList + Sync,
{
    if mode == DispatchMode::Sequential || work.len() <= 1 {
        return work
            .into_iter()
            .map(|(slot, group)| slot.run_group(group, env, draw_lists))
            .collect();
    }

    std::thread::scope(|scope| {
        let handles: Vec<_> = work
            .into_iter()
            .map(|(slot, group)| scope.spawn(move || slot.run_group(group, env, draw_lists)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
            })
            .collect()
    })
}

impl<B: Backend> Drop for Scheduler<B> {
    fn drop(&mut self) {
        if self.shut_down || self.terminated {
            return;
        }
        if let Err(e) = self.wait_all_retired(GateCheck::Drain) {
            log::warn!("[{}] Drain on drop failed: {}", self.diagnostics.label(), e);
        }
    }
}

impl<B: Backend> fmt::Debug for Scheduler<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("backend", &self.backend.name())
            .field("slots", &self.slots)
            .field("phase", &self.phase)
            .field("ticks", &self.ticks)
            .field("prewarmed", &self.prewarmed)
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "dummy")]
static_assertions::assert_impl_all!(Scheduler<crate::backend::DummyBackend>: Send, Sync);
