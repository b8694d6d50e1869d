//! Frame slots: the unit of concurrency of the pipeline.
//!
//! Each slot owns one recording resource, one [`SlotSync`] bundle and a
//! handle to its submission queue, and exposes the four stage operations as
//! separate steps. A slot only ever moves
//! `Idle → Acquiring → Recording → Rendering → Presenting → Idle`.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{Backend, ImageIndex};
use crate::diagnostics::{Diagnostics, FrameEvent, GateCheck};
use crate::error::{PipelineError, PipelineResult, SurfaceError};
use crate::graph::{Stage, StageGroup};
use crate::queue::SubmissionQueue;
use crate::surface::SharedSurface;
use crate::sync::{SlotSync, SyncFactory};

/// Stable index of a frame slot, `0..N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

impl SlotId {
    /// Slot with index `index`.
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Index of the slot.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle position of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SlotStage {
    /// No image bound; ready to acquire.
    #[default]
    Idle,
    /// An image has been acquired.
    Acquiring,
    /// The draw list has been recorded.
    Recording,
    /// The recording has been submitted.
    Rendering,
    /// The image is being handed to the surface.
    Presenting,
}

impl SlotStage {
    /// The only stage this one may move to.
    pub const fn successor(self) -> SlotStage {
        match self {
            SlotStage::Idle => SlotStage::Acquiring,
            SlotStage::Acquiring => SlotStage::Recording,
            SlotStage::Recording => SlotStage::Rendering,
            SlotStage::Rendering => SlotStage::Presenting,
            SlotStage::Presenting => SlotStage::Idle,
        }
    }

    /// Stage entered by running `stage`.
    pub const fn entered_by(stage: Stage) -> SlotStage {
        match stage {
            Stage::Acquire => SlotStage::Acquiring,
            Stage::Record => SlotStage::Recording,
            Stage::Render => SlotStage::Rendering,
            Stage::Present => SlotStage::Presenting,
        }
    }

    /// Whether a slot in this stage holds an image.
    pub const fn holds_image(self) -> bool {
        !matches!(self, SlotStage::Idle)
    }
}

/// How a stage operation ended, short of a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageOutcome {
    /// The stage (or group) ran to completion.
    Completed,
    /// Completed, but the surface asked to be rebuilt.
    Suboptimal,
    /// The surface is outdated; the slot did not advance.
    Outdated,
    /// No image was available in time; the slot did not advance.
    Backpressure,
}

impl StageOutcome {
    /// Whether the operation advanced the slot.
    pub(crate) fn advanced(self) -> bool {
        matches!(self, StageOutcome::Completed | StageOutcome::Suboptimal)
    }
}

/// Everything a stage operation needs besides the slot itself.
pub(crate) struct StageEnv<'a, B: Backend> {
    pub backend: &'a B,
    pub surface: &'a SharedSurface<B>,
    pub diagnostics: &'a Diagnostics,
    pub acquire_timeout: Duration,
    pub gate_timeout: Duration,
    pub tick: u64,
}

/// One reusable frame slot.
pub struct FrameSlot<B: Backend> {
    id: SlotId,
    stage: SlotStage,
    recording: B::Recording,
    sync: SlotSync<B>,
    queue: Arc<SubmissionQueue<B>>,
    image: Option<ImageIndex>,
    frames_submitted: u64,
}

impl<B: Backend> FrameSlot<B> {
    /// Create slot `id`, its recording resource and primitives.
    pub fn new(
        id: SlotId,
        backend: &B,
        factory: &SyncFactory<'_, B>,
        queue: Arc<SubmissionQueue<B>>,
    ) -> PipelineResult<Self> {
        let recording = backend.create_recording().map_err(|e| {
            PipelineError::ConstructionFailed(format!("slot {id} recording resource: {e}"))
        })?;
        let sync = SlotSync::new(factory, id)?;
        log::debug!("Created frame slot {} on queue {}", id, queue.index());
        Ok(Self {
            id,
            stage: SlotStage::Idle,
            recording,
            sync,
            queue,
            image: None,
            frames_submitted: 0,
        })
    }

    /// Slot identifier.
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Current lifecycle position.
    pub fn stage(&self) -> SlotStage {
        self.stage
    }

    /// Image the slot is bound to, if any.
    pub fn image(&self) -> Option<ImageIndex> {
        self.image
    }

    /// Index of the queue this slot submits to.
    pub fn queue_index(&self) -> usize {
        self.queue.index()
    }

    /// Number of submissions made by this slot.
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// The slot's recording resource.
    pub fn recording(&self) -> &B::Recording {
        &self.recording
    }

    /// Host gate signaled when the slot's last submission retired.
    pub fn completion_gate(&self) -> &B::HostGate {
        &self.sync.gate
    }

    fn enter(&mut self, to: SlotStage) -> PipelineResult<()> {
        self.check_transition(to)?;
        self.stage = to;
        Ok(())
    }

    fn check_transition(&self, to: SlotStage) -> PipelineResult<()> {
        if self.stage.successor() == to {
            Ok(())
        } else {
            Err(PipelineError::StageOrder {
                slot: self.id,
                from: self.stage,
                to,
            })
        }
    }

    /// Run every stage of `group` in order, stopping at the first stage that
    /// does not advance.
    pub(crate) fn run_group<F>(
        &mut self,
        group: StageGroup,
        env: &StageEnv<'_, B>,
        draw_lists: &F,
    ) -> PipelineResult<StageOutcome>
    where
        F: Fn(SlotId) -> B::DrawList + Sync,
    {
        let mut outcome = StageOutcome::Completed;
        for stage in group.stages() {
            match self.run_stage(stage, env, draw_lists)? {
                StageOutcome::Completed => {}
                StageOutcome::Suboptimal => outcome = StageOutcome::Suboptimal,
                other => return Ok(other),
            }
        }
        Ok(outcome)
    }

    /// Run a single stage, reporting it to the diagnostics context.
    pub(crate) fn run_stage<F>(
        &mut self,
        stage: Stage,
        env: &StageEnv<'_, B>,
        draw_lists: &F,
    ) -> PipelineResult<StageOutcome>
    where
        F: Fn(SlotId) -> B::DrawList + Sync,
    {
        env.diagnostics.emit(FrameEvent::StageBegin {
            tick: env.tick,
            slot: self.id,
            stage,
            image: self.image,
        });
        let started = Instant::now();

        let outcome = match stage {
            Stage::Acquire => self.acquire(env)?,
            Stage::Record => self.record(env, &draw_lists(self.id))?,
            Stage::Render => self.render(env)?,
            Stage::Present => self.present(env)?,
        };

        if outcome.advanced() {
            env.diagnostics.record_stage_time(stage, started.elapsed());
            env.diagnostics.emit(FrameEvent::StageEnd {
                tick: env.tick,
                slot: self.id,
                stage,
                image: self.image,
            });
        }
        Ok(outcome)
    }

    /// `Idle → Acquiring`: bind the next presentable image.
    ///
    /// On `Outdated` or `Timeout` the slot stays idle.
    pub(crate) fn acquire(&mut self, env: &StageEnv<'_, B>) -> PipelineResult<StageOutcome> {
        self.check_transition(SlotStage::Acquiring)?;

        match env
            .surface
            .acquire(&self.sync.acquired, env.acquire_timeout)
        {
            Ok(acquired) => {
                self.enter(SlotStage::Acquiring)?;
                self.image = Some(acquired.index);
                log::trace!("Slot {} acquired image {}", self.id, acquired.index);
                if acquired.suboptimal {
                    log::debug!("Slot {} acquired a suboptimal image", self.id);
                    Ok(StageOutcome::Suboptimal)
                } else {
                    Ok(StageOutcome::Completed)
                }
            }
            Err(SurfaceError::Timeout) => {
                log::debug!("Slot {}: no image available, backing off", self.id);
                Ok(StageOutcome::Backpressure)
            }
            Err(SurfaceError::Outdated) => {
                log::debug!("Slot {}: surface outdated on acquire", self.id);
                Ok(StageOutcome::Outdated)
            }
            Err(SurfaceError::Lost(reason)) => Err(PipelineError::SurfaceLost(reason)),
        }
    }

    /// `Acquiring → Recording`: wait for the previous submission to retire,
    /// then record `draw_list` against the bound image.
    pub(crate) fn record(
        &mut self,
        env: &StageEnv<'_, B>,
        draw_list: &B::DrawList,
    ) -> PipelineResult<StageOutcome> {
        self.check_transition(SlotStage::Recording)?;
        let image = self.bound_image(SlotStage::Recording)?;

        self.wait_gate(env, GateCheck::Reuse)?;

        env.backend.reset_recording(&mut self.recording)?;
        env.backend.record(&mut self.recording, image, draw_list)?;
        self.enter(SlotStage::Recording)?;
        Ok(StageOutcome::Completed)
    }

    /// `Recording → Rendering`: submit the recording to the slot's queue.
    ///
    /// The device waits on the acquired signal and signals the completed
    /// signal and the completion gate when the work retires.
    pub(crate) fn render(&mut self, env: &StageEnv<'_, B>) -> PipelineResult<StageOutcome> {
        self.check_transition(SlotStage::Rendering)?;

        env.backend.reset_host_gate(&self.sync.gate);
        {
            let mut queue = self.queue.lock();
            env.backend.submit(
                &mut queue,
                &self.recording,
                &self.sync.acquired,
                &self.sync.completed,
                &self.sync.gate,
            )?;
        }
        self.frames_submitted += 1;
        self.enter(SlotStage::Rendering)?;
        log::trace!(
            "Slot {} submitted frame {} on queue {}",
            self.id,
            self.frames_submitted,
            self.queue.index()
        );
        Ok(StageOutcome::Completed)
    }

    /// `Rendering → Presenting → Idle`: hand the image to the surface.
    ///
    /// On `Outdated` the slot stays in `Rendering` until the drain resets it.
    pub(crate) fn present(&mut self, env: &StageEnv<'_, B>) -> PipelineResult<StageOutcome> {
        self.check_transition(SlotStage::Presenting)?;
        let image = self.bound_image(SlotStage::Presenting)?;

        match env.surface.present(image, &self.sync.completed) {
            Ok(()) => {
                self.enter(SlotStage::Presenting)?;
                self.enter(SlotStage::Idle)?;
                self.image = None;
                log::trace!("Slot {} presented image {}", self.id, image);
                Ok(StageOutcome::Completed)
            }
            Err(SurfaceError::Outdated) => {
                log::debug!("Slot {}: surface outdated on present", self.id);
                Ok(StageOutcome::Outdated)
            }
            Err(SurfaceError::Timeout) => Err(PipelineError::SurfaceLost(format!(
                "present of image {image} timed out"
            ))),
            Err(SurfaceError::Lost(reason)) => Err(PipelineError::SurfaceLost(reason)),
        }
    }

    fn bound_image(&self, to: SlotStage) -> PipelineResult<ImageIndex> {
        self.image.ok_or(PipelineError::StageOrder {
            slot: self.id,
            from: self.stage,
            to,
        })
    }

    fn wait_gate(&self, env: &StageEnv<'_, B>, check: GateCheck) -> PipelineResult<()> {
        wait_gate(env.backend, env.diagnostics, self.id, &self.sync.gate, env.gate_timeout, check)
    }

    /// Block until the slot's last submission has retired.
    pub(crate) fn wait_retired(
        &self,
        backend: &B,
        diagnostics: &Diagnostics,
        timeout: Duration,
        check: GateCheck,
    ) -> PipelineResult<()> {
        wait_gate(backend, diagnostics, self.id, &self.sync.gate, timeout, check)
    }

    /// Return to `Idle` with fresh device signals after a drain.
    ///
    /// Only valid once [`wait_retired`](Self::wait_retired) succeeded.
    pub(crate) fn reset_after_drain(&mut self, factory: &SyncFactory<'_, B>) -> PipelineResult<()> {
        self.sync.renew_signals(factory, self.id)?;
        if self.stage != SlotStage::Idle {
            log::debug!("Slot {} reset from {:?} to Idle", self.id, self.stage);
        }
        self.stage = SlotStage::Idle;
        self.image = None;
        Ok(())
    }
}

fn wait_gate<B: Backend>(
    backend: &B,
    diagnostics: &Diagnostics,
    slot: SlotId,
    gate: &B::HostGate,
    timeout: Duration,
    check: GateCheck,
) -> PipelineResult<()> {
    if backend.wait_host_gate(gate, timeout) {
        diagnostics.emit(FrameEvent::GateObserved { slot, check });
        Ok(())
    } else {
        log::error!(
            "Slot {} completion gate not signaled after {:?} ({:?})",
            slot,
            timeout,
            check
        );
        diagnostics.emit(FrameEvent::GateTimedOut { slot, check });
        Err(PipelineError::DeviceHang {
            slot,
            waited: timeout,
        })
    }
}

impl<B: Backend> fmt::Debug for FrameSlot<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSlot")
            .field("id", &self.id)
            .field("stage", &self.stage)
            .field("image", &self.image)
            .field("queue", &self.queue.index())
            .field("frames_submitted", &self.frames_submitted)
            .finish()
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, DummyDrawList};
    use crate::config::SchedulerConfig;
    use crate::queue::assign_queues;

    struct Fixture {
        backend: DummyBackend,
        surface: SharedSurface<DummyBackend>,
        diagnostics: Diagnostics,
    }

    impl Fixture {
        fn new() -> Self {
            let backend = DummyBackend::new();
            let surface = SharedSurface::new(backend.create_surface().unwrap());
            Self {
                backend,
                surface,
                diagnostics: Diagnostics::default(),
            }
        }

        fn env(&self) -> StageEnv<'_, DummyBackend> {
            StageEnv {
                backend: &self.backend,
                surface: &self.surface,
                diagnostics: &self.diagnostics,
                acquire_timeout: Duration::from_millis(100),
                gate_timeout: Duration::from_millis(100),
                tick: 0,
            }
        }

        fn slot(&self) -> FrameSlot<DummyBackend> {
            let queues = assign_queues(&self.backend, &SchedulerConfig::new(1, 1)).unwrap();
            let factory = SyncFactory::new(&self.backend);
            FrameSlot::new(SlotId::new(0), &self.backend, &factory, queues[0].clone()).unwrap()
        }
    }

    fn draw(_: SlotId) -> DummyDrawList {
        DummyDrawList::new(4)
    }

    #[test]
    fn test_slot_stage_cycle() {
        let mut stage = SlotStage::Idle;
        let mut seen = vec![stage];
        for _ in 0..5 {
            stage = stage.successor();
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![
                SlotStage::Idle,
                SlotStage::Acquiring,
                SlotStage::Recording,
                SlotStage::Rendering,
                SlotStage::Presenting,
                SlotStage::Idle,
            ]
        );
    }

    #[test]
    fn test_full_rotation() {
        let fixture = Fixture::new();
        let env = fixture.env();
        let mut slot = fixture.slot();

        for stage in Stage::ALL {
            assert_eq!(slot.run_stage(stage, &env, &draw).unwrap(), StageOutcome::Completed);
            assert_eq!(slot.stage() == SlotStage::Idle, stage == Stage::Present);
        }
        assert_eq!(slot.image(), None);
        assert_eq!(slot.frames_submitted(), 1);
        assert_eq!(slot.recording().draw_count(), 4);
    }

    #[test]
    fn test_out_of_order_stage_rejected() {
        let fixture = Fixture::new();
        let env = fixture.env();
        let mut slot = fixture.slot();

        let err = slot.render(&env).unwrap_err();
        assert_eq!(
            err,
            PipelineError::StageOrder {
                slot: SlotId::new(0),
                from: SlotStage::Idle,
                to: SlotStage::Rendering,
            }
        );
        assert_eq!(slot.stage(), SlotStage::Idle);
    }

    #[test]
    fn test_acquire_timeout_does_not_advance() {
        let fixture = Fixture::new();
        fixture.backend.control().fail_next_acquire(SurfaceError::Timeout);
        let env = fixture.env();
        let mut slot = fixture.slot();

        assert_eq!(slot.acquire(&env).unwrap(), StageOutcome::Backpressure);
        assert_eq!(slot.stage(), SlotStage::Idle);
        assert_eq!(slot.image(), None);
    }

    #[test]
    fn test_record_waits_for_gate() {
        let fixture = Fixture::new();
        fixture.backend.control().hang_next_submission();
        let env = fixture.env();
        let mut slot = fixture.slot();

        for stage in Stage::ALL {
            slot.run_stage(stage, &env, &draw).unwrap();
        }
        slot.acquire(&env).unwrap();
        let err = slot.record(&env, &DummyDrawList::new(1)).unwrap_err();
        assert!(matches!(err, PipelineError::DeviceHang { .. }));
        assert_eq!(slot.stage(), SlotStage::Acquiring);
    }
}
