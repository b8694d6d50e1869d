//! Common utilities for scheduler integration tests.
//!
//! Every test drives a real [`Scheduler`] over the dummy backend and checks
//! the event log captured by [`RecordingSink`].

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use redlilium_pipelining::{
    Diagnostics, DummyBackend, DummyControl, DummyDeviceConfig, DummyDrawList, FrameEvent,
    FrameEventSink, ImageIndex, PipelineResult, Scheduler, SchedulerConfig, SlotId, Stage,
    TickStatus,
};

/// Initialize logging once for test output.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

// ============================================================================
// Event capture
// ============================================================================

/// Stores every event in arrival order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<FrameEvent>>,
}

impl RecordingSink {
    /// Copy of the events received so far.
    pub fn events(&self) -> Vec<FrameEvent> {
        self.events.lock().clone()
    }

    /// Forget all events received so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl FrameEventSink for RecordingSink {
    fn on_event(&self, event: &FrameEvent) {
        self.events.lock().push(event.clone());
    }
}

/// One finished stage, as seen in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageRun {
    /// Position of the `StageEnd` event in the log.
    pub position: usize,
    /// Position of the matching `StageBegin` event.
    pub begin: usize,
    pub tick: u64,
    pub slot: SlotId,
    pub stage: Stage,
    /// Image bound after the stage, or before it for Present.
    pub image: Option<ImageIndex>,
}

/// Pair `StageBegin`/`StageEnd` events per slot.
pub fn stage_runs(events: &[FrameEvent]) -> Vec<StageRun> {
    let mut open: HashMap<SlotId, (usize, Option<ImageIndex>)> = HashMap::new();
    let mut runs = Vec::new();
    for (position, event) in events.iter().enumerate() {
        match *event {
            FrameEvent::StageBegin { slot, image, .. } => {
                open.insert(slot, (position, image));
            }
            FrameEvent::StageEnd {
                tick,
                slot,
                stage,
                image,
            } => {
                let (begin, bound) = open
                    .remove(&slot)
                    .expect("stage end without a matching begin");
                runs.push(StageRun {
                    position,
                    begin,
                    tick,
                    slot,
                    stage,
                    image: image.or(bound),
                });
            }
            _ => {}
        }
    }
    runs
}

/// Stages finished by `slot`, in order.
pub fn stages_of(runs: &[StageRun], slot: SlotId) -> Vec<Stage> {
    runs.iter()
        .filter(|run| run.slot == slot)
        .map(|run| run.stage)
        .collect()
}

/// Whether `stages` is a prefix of `start, start.next(), ...` repeated.
pub fn follows_rotation(stages: &[Stage], start: Stage) -> bool {
    let mut expected = start;
    for &stage in stages {
        if stage != expected {
            return false;
        }
        expected = expected.next();
    }
    true
}

// ============================================================================
// Test context
// ============================================================================

/// A scheduler over the dummy backend with an attached event log.
pub struct TestContext {
    pub control: DummyControl,
    pub sink: Arc<RecordingSink>,
    pub diagnostics: Arc<Diagnostics>,
    pub scheduler: Scheduler<DummyBackend>,
}

impl TestContext {
    /// Create a context with the default device (4 queues, 4 images, no latency).
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_device(config, DummyDeviceConfig::default())
    }

    /// Create a context with a custom simulated device.
    pub fn with_device(config: SchedulerConfig, device: DummyDeviceConfig) -> Self {
        Self::try_with_device(config, device).expect("scheduler construction failed")
    }

    /// Create a context, returning construction errors.
    pub fn try_with_device(
        config: SchedulerConfig,
        device: DummyDeviceConfig,
    ) -> PipelineResult<Self> {
        init_logging();
        let backend = Arc::new(DummyBackend::with_config(device));
        let control = backend.control();
        let surface = backend
            .create_surface()
            .expect("dummy surface creation failed");
        let sink = Arc::new(RecordingSink::default());
        let diagnostics = Arc::new(Diagnostics::new("test").with_sink(sink.clone()));
        let scheduler = Scheduler::new(backend, surface, config, diagnostics.clone())?;
        Ok(Self {
            control,
            sink,
            diagnostics,
            scheduler,
        })
    }

    /// Run one tick with a fixed draw list.
    pub fn tick(&mut self) -> PipelineResult<TickStatus> {
        self.scheduler.tick(draw_list)
    }

    /// Run `count` ticks, asserting each completes.
    pub fn run_completed(&mut self, count: usize) {
        for i in 0..count {
            assert_eq!(
                self.tick().expect("tick failed"),
                TickStatus::Completed,
                "tick {i}"
            );
        }
    }

    /// Paired stage runs from the event log.
    pub fn runs(&self) -> Vec<StageRun> {
        stage_runs(&self.sink.events())
    }
}

/// Draw list provider used by the tests.
pub fn draw_list(slot: SlotId) -> DummyDrawList {
    DummyDrawList::new(8 + slot.index() as u32)
}

/// Short timeout for tests that expect a hang.
pub const HANG_TIMEOUT: Duration = Duration::from_millis(50);
