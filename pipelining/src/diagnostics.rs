//! Explicitly passed diagnostics context.
//!
//! A [`Diagnostics`] handle is given to the scheduler at construction. It
//! collects counters and per-stage timings, tracks the frame rate, and
//! forwards structured [`FrameEvent`]s to an optional [`FrameEventSink`].
//! Nothing here is global: two schedulers with two handles do not observe
//! each other.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::backend::{Extent2d, ImageIndex};
use crate::graph::{PerStage, Stage};
use crate::scheduler::SkipReason;
use crate::slot::SlotId;

/// Why the host observed a completion gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateCheck {
    /// Before reusing the slot's recording resource.
    Reuse,
    /// While draining the pipeline.
    Drain,
    /// While waiting for the device to go idle, slots left as they are.
    Idle,
}

/// A structured scheduler event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A slot started a stage.
    StageBegin {
        /// Tick counter at the time (pre-warm steps use the upcoming tick).
        tick: u64,
        /// Slot running the stage.
        slot: SlotId,
        /// Stage being entered.
        stage: Stage,
        /// Image bound to the slot when the stage began.
        image: Option<ImageIndex>,
    },
    /// A slot finished a stage successfully.
    StageEnd {
        /// Tick counter at the time.
        tick: u64,
        /// Slot that ran the stage.
        slot: SlotId,
        /// Stage that finished.
        stage: Stage,
        /// Image bound to the slot after the stage.
        image: Option<ImageIndex>,
    },
    /// A completion gate was observed signaled.
    GateObserved {
        /// Slot owning the gate.
        slot: SlotId,
        /// Reuse check or drain.
        check: GateCheck,
    },
    /// A completion gate wait timed out.
    GateTimedOut {
        /// Slot owning the gate.
        slot: SlotId,
        /// Reuse check or drain.
        check: GateCheck,
    },
    /// A drain started.
    DrainBegin,
    /// A drain finished: every gate was observed signaled.
    DrainEnd,
    /// The presentation surface was rebuilt.
    SurfaceRebuilt {
        /// New surface size.
        extent: Extent2d,
    },
    /// The pre-warm sequence finished.
    PrewarmComplete,
    /// A tick completed all of its operations.
    TickCompleted {
        /// Tick counter after the tick.
        tick: u64,
        /// Phase the tick ran.
        phase: usize,
    },
    /// A tick was skipped.
    TickSkipped {
        /// Tick counter (unchanged by the skip).
        tick: u64,
        /// Why it was skipped.
        reason: SkipReason,
    },
}

/// Receiver of [`FrameEvent`]s.
///
/// Called from worker threads while stages run, so implementations must be
/// cheap and thread-safe.
pub trait FrameEventSink: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &FrameEvent);
}

/// Frames-per-second measurement over a fixed window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRate {
    /// Frames per second over the last window.
    pub fps: f64,
    /// Mean time per frame over the last window.
    pub frame_time: Duration,
}

/// Counts frames and produces a [`FrameRate`] once per window.
#[derive(Debug, Clone)]
pub struct FrameRateCounter {
    window: Duration,
    window_start: Option<Instant>,
    frames: u32,
    last: Option<FrameRate>,
}

impl FrameRateCounter {
    /// A counter reporting once per `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: None,
            frames: 0,
            last: None,
        }
    }

    /// Count a frame finished at `now`. Returns a new measurement when the
    /// window has elapsed.
    pub fn frame(&mut self, now: Instant) -> Option<FrameRate> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed < self.window || elapsed.is_zero() {
            return None;
        }

        let rate = FrameRate {
            fps: f64::from(self.frames) / elapsed.as_secs_f64(),
            frame_time: elapsed / self.frames,
        };
        self.window_start = Some(now);
        self.frames = 0;
        self.last = Some(rate);
        Some(rate)
    }

    /// The most recent measurement.
    pub fn last(&self) -> Option<FrameRate> {
        self.last
    }
}

impl Default for FrameRateCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Point-in-time copy of the diagnostics counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticsSnapshot {
    /// Ticks that ran their graph.
    pub ticks_completed: u64,
    /// Ticks skipped for backpressure or an unavailable surface.
    pub ticks_skipped: u64,
    /// Surface rebuilds.
    pub rebuilds: u64,
    /// Completed drains.
    pub drains: u64,
    /// Completion gates observed signaled.
    pub gates_observed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks_completed: AtomicU64,
    ticks_skipped: AtomicU64,
    rebuilds: AtomicU64,
    drains: AtomicU64,
    gates_observed: AtomicU64,
}

/// Diagnostics context of one scheduler.
pub struct Diagnostics {
    label: String,
    sink: Option<Arc<dyn FrameEventSink>>,
    counters: Counters,
    stage_time: Mutex<PerStage<Duration>>,
    frame_rate: Mutex<FrameRateCounter>,
}

impl Diagnostics {
    /// A context with the given log label and no event sink.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sink: None,
            counters: Counters::default(),
            stage_time: Mutex::new(PerStage::default()),
            frame_rate: Mutex::new(FrameRateCounter::default()),
        }
    }

    /// Forward events to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn FrameEventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Report the frame rate every `window`.
    pub fn with_frame_rate_window(self, window: Duration) -> Self {
        *self.frame_rate.lock() = FrameRateCounter::new(window);
        self
    }

    /// Log label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Forward an event to the sink, if any.
    pub fn emit(&self, event: FrameEvent) {
        match &event {
            FrameEvent::GateObserved { .. } => {
                self.counters.gates_observed.fetch_add(1, Ordering::Relaxed);
            }
            FrameEvent::DrainEnd => {
                self.counters.drains.fetch_add(1, Ordering::Relaxed);
            }
            FrameEvent::SurfaceRebuilt { .. } => {
                self.counters.rebuilds.fetch_add(1, Ordering::Relaxed);
            }
            FrameEvent::TickSkipped { .. } => {
                self.counters.ticks_skipped.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        if let Some(sink) = &self.sink {
            sink.on_event(&event);
        }
    }

    /// Add `elapsed` to the accumulated time of `stage`.
    pub fn record_stage_time(&self, stage: Stage, elapsed: Duration) {
        self.stage_time.lock()[stage] += elapsed;
    }

    /// Accumulated execution time per stage.
    pub fn stage_times(&self) -> PerStage<Duration> {
        *self.stage_time.lock()
    }

    pub(crate) fn tick_completed(&self, tick: u64, phase: usize) {
        self.counters
            .ticks_completed
            .fetch_add(1, Ordering::Relaxed);
        self.emit(FrameEvent::TickCompleted { tick, phase });

        if let Some(rate) = self.frame_rate.lock().frame(Instant::now()) {
            log::info!(
                "[{}] {:.1} fps ({:.2} ms/frame)",
                self.label,
                rate.fps,
                rate.frame_time.as_secs_f64() * 1000.0
            );
        }
    }

    /// The most recent frame rate measurement.
    pub fn frame_rate(&self) -> Option<FrameRate> {
        self.frame_rate.lock().last()
    }

    /// Copy of the counters.
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let c = &self.counters;
        DiagnosticsSnapshot {
            ticks_completed: c.ticks_completed.load(Ordering::Relaxed),
            ticks_skipped: c.ticks_skipped.load(Ordering::Relaxed),
            rebuilds: c.rebuilds.load(Ordering::Relaxed),
            drains: c.drains.load(Ordering::Relaxed),
            gates_observed: c.gates_observed.load(Ordering::Relaxed),
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new("pipeline")
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("label", &self.label)
            .field("has_sink", &self.sink.is_some())
            .field("counters", &self.snapshot())
            .finish()
    }
}
