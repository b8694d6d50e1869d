//! Dummy backend for testing and development.
//!
//! This backend doesn't touch a GPU but behaves like one from the
//! scheduler's point of view:
//!
//! - Submissions are executed asynchronously by a simulated device thread,
//!   fed through an `mpsc` channel, with a configurable execution latency.
//! - Host gates are condvar-backed and signaled by the device thread.
//! - [`DummySurface`] hands out images from a FIFO pool and only returns an
//!   image to the pool once the render it was presented after has finished.
//!
//! A shared [`DummyControl`] handle lets tests arm faults (outdated surface,
//! acquire timeouts, hung submissions, failing primitive creation), change
//! the desired surface size and inspect call counters.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{AcquiredImage, Backend, Extent2d, ImageIndex, PresentSurface};
use crate::error::{BackendError, SurfaceError};

/// How long the simulated device waits for a submission's wait signal
/// before giving up on it.
const DEVICE_WAIT_LIMIT: Duration = Duration::from_secs(2);

/// Polling interval while a dummy acquire waits for a free image.
const ACQUIRE_POLL: Duration = Duration::from_micros(200);

static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(0);

/// Device-only signal.
///
/// Signals are counted, so a signal raised again before the device consumed
/// the previous one is not lost.
#[derive(Debug, Clone)]
pub struct DummySignal {
    id: u64,
    pending: Arc<AtomicU64>,
}

impl DummySignal {
    fn new() -> Self {
        Self {
            id: NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed),
            pending: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Unique identifier (for debugging).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether at least one signal is pending.
    pub fn is_signaled(&self) -> bool {
        self.pending.load(Ordering::Acquire) > 0
    }

    fn signal(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Consume one pending signal. Returns whether there was one.
    fn consume(&self) -> bool {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Debug)]
struct GateState {
    signaled: Mutex<bool>,
    cond: Condvar,
}

/// Host-observable gate.
#[derive(Debug, Clone)]
pub struct DummyGate {
    state: Arc<GateState>,
}

impl DummyGate {
    fn new(signaled: bool) -> Self {
        Self {
            state: Arc::new(GateState {
                signaled: Mutex::new(signaled),
                cond: Condvar::new(),
            }),
        }
    }

    /// Whether the gate is signaled (non-blocking).
    pub fn is_signaled(&self) -> bool {
        *self.state.signaled.lock()
    }

    fn signal(&self) {
        let mut signaled = self.state.signaled.lock();
        *signaled = true;
        self.state.cond.notify_all();
    }

    fn reset(&self) {
        *self.state.signaled.lock() = false;
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.state.signaled.lock();
        while !*signaled {
            if self
                .state
                .cond
                .wait_until(&mut signaled, deadline)
                .timed_out()
            {
                return *signaled;
            }
        }
        true
    }
}

/// Recording resource of the dummy backend.
#[derive(Debug, Default)]
pub struct DummyRecording {
    id: u64,
    image: Option<ImageIndex>,
    draw_count: u32,
    times_recorded: u64,
}

impl DummyRecording {
    /// Unique identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Image targeted by the last recording, if not reset since.
    pub fn image(&self) -> Option<ImageIndex> {
        self.image
    }

    /// Draw count of the last recording.
    pub fn draw_count(&self) -> u32 {
        self.draw_count
    }

    /// How many times this resource has been recorded into.
    pub fn times_recorded(&self) -> u64 {
        self.times_recorded
    }
}

/// Work description recorded by the dummy backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DummyDrawList {
    /// Number of draws to "record".
    pub draw_count: u32,
}

impl DummyDrawList {
    /// A draw list with `draw_count` draws.
    pub fn new(draw_count: u32) -> Self {
        Self { draw_count }
    }
}

struct DeviceJob {
    queue: usize,
    wait_on: DummySignal,
    signal_on_done: DummySignal,
    gate: DummyGate,
    hang: bool,
}

/// Submission queue of the dummy backend.
#[derive(Debug)]
pub struct DummyQueue {
    index: usize,
    sender: mpsc::Sender<DeviceJob>,
}

impl DummyQueue {
    /// Queue index.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl std::fmt::Debug for DeviceJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceJob")
            .field("queue", &self.queue)
            .field("wait_on", &self.wait_on.id)
            .field("signal_on_done", &self.signal_on_done.id)
            .field("hang", &self.hang)
            .finish()
    }
}

/// Configuration of the simulated device and surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyDeviceConfig {
    /// Number of submission queues exposed.
    pub queue_count: usize,
    /// Simulated execution time of one submission.
    pub latency: Duration,
    /// Number of presentable images per surface.
    pub image_count: usize,
    /// Initial surface size.
    pub extent: Extent2d,
}

impl Default for DummyDeviceConfig {
    fn default() -> Self {
        Self {
            queue_count: 4,
            latency: Duration::ZERO,
            image_count: 4,
            extent: Extent2d::new(1280, 720),
        }
    }
}

impl DummyDeviceConfig {
    /// Set the submission latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Set the number of surface images.
    pub fn with_image_count(mut self, image_count: usize) -> Self {
        self.image_count = image_count;
        self
    }

    /// Set the number of queues.
    pub fn with_queue_count(mut self, queue_count: usize) -> Self {
        self.queue_count = queue_count;
        self
    }
}

/// Call counters collected by the dummy backend and surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DummyStats {
    /// Successful acquires.
    pub acquires: u64,
    /// Successful presents.
    pub presents: u64,
    /// Submissions enqueued.
    pub submissions: u64,
    /// Submissions retired by the device.
    pub retired: u64,
    /// Surface rebuilds.
    pub rebuilds: u64,
    /// Host gate waits.
    pub gate_waits: u64,
    /// Host gate waits that timed out.
    pub gate_timeouts: u64,
    /// Recording resets.
    pub recording_resets: u64,
}

#[derive(Debug, Default)]
struct ControlState {
    acquire_faults: Mutex<VecDeque<SurfaceError>>,
    scheduled_acquire_faults: Mutex<Vec<(u64, SurfaceError)>>,
    acquire_calls: AtomicU64,
    present_faults: Mutex<VecDeque<SurfaceError>>,
    suboptimal_acquires: AtomicU64,
    hang_submissions: AtomicU64,
    fail_creation: AtomicBool,
    desired_extent: Mutex<Option<Extent2d>>,
    rebuild_image_count: Mutex<Option<usize>>,
    stats: Mutex<DummyStats>,
}

/// Shared handle for fault injection and inspection.
///
/// Cloning is cheap; all clones refer to the same backend and surfaces.
#[derive(Debug, Clone, Default)]
pub struct DummyControl {
    state: Arc<ControlState>,
}

impl DummyControl {
    /// Make the next acquire fail with `error` (queued, one per call).
    pub fn fail_next_acquire(&self, error: SurfaceError) {
        self.state.acquire_faults.lock().push_back(error);
    }

    /// Make the acquire call with zero-based ordinal `call` fail with `error`.
    ///
    /// Every acquire counts, including failed ones.
    pub fn fail_acquire_call(&self, call: u64, error: SurfaceError) {
        self.state
            .scheduled_acquire_faults
            .lock()
            .push((call, error));
    }

    /// Number of acquire calls made so far.
    pub fn acquire_calls(&self) -> u64 {
        self.state.acquire_calls.load(Ordering::Acquire)
    }

    /// Make the next present fail with `error` (queued, one per call).
    pub fn fail_next_present(&self, error: SurfaceError) {
        self.state.present_faults.lock().push_back(error);
    }

    /// Report the next `count` successful acquires as suboptimal.
    pub fn suboptimal_acquires(&self, count: u64) {
        self.state
            .suboptimal_acquires
            .store(count, Ordering::Release);
    }

    /// Make the next submission never retire.
    pub fn hang_next_submission(&self) {
        self.state.hang_submissions.fetch_add(1, Ordering::AcqRel);
    }

    /// Make every primitive, queue and recording creation fail.
    pub fn fail_creation(&self, fail: bool) {
        self.state.fail_creation.store(fail, Ordering::Release);
    }

    /// Simulate a window resize: surfaces report `extent` as desired.
    pub fn set_desired_extent(&self, extent: Extent2d) {
        *self.state.desired_extent.lock() = Some(extent);
    }

    /// Make later surface rebuilds produce `count` images.
    pub fn set_rebuild_image_count(&self, count: usize) {
        *self.state.rebuild_image_count.lock() = Some(count);
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> DummyStats {
        *self.state.stats.lock()
    }

    fn take_acquire_fault(&self) -> Option<SurfaceError> {
        let call = self.state.acquire_calls.fetch_add(1, Ordering::AcqRel);
        if let Some(error) = self.state.acquire_faults.lock().pop_front() {
            return Some(error);
        }
        let mut scheduled = self.state.scheduled_acquire_faults.lock();
        let position = scheduled.iter().position(|(at, _)| *at == call)?;
        Some(scheduled.swap_remove(position).1)
    }

    fn take_present_fault(&self) -> Option<SurfaceError> {
        self.state.present_faults.lock().pop_front()
    }

    fn take_suboptimal(&self) -> bool {
        self.state
            .suboptimal_acquires
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn take_hang(&self) -> bool {
        self.state
            .hang_submissions
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn creation_fails(&self) -> bool {
        self.state.fail_creation.load(Ordering::Acquire)
    }

    fn desired_extent(&self) -> Option<Extent2d> {
        *self.state.desired_extent.lock()
    }

    fn rebuild_image_count(&self) -> Option<usize> {
        *self.state.rebuild_image_count.lock()
    }

    fn update(&self, f: impl FnOnce(&mut DummyStats)) {
        f(&mut self.state.stats.lock());
    }
}

/// Dummy GPU backend.
pub struct DummyBackend {
    config: DummyDeviceConfig,
    control: DummyControl,
    sender: Mutex<mpsc::Sender<DeviceJob>>,
    queues_taken: Mutex<Vec<bool>>,
    next_recording_id: AtomicU64,
    /// Set when the device thread could not be started.
    device_error: Option<String>,
}

impl DummyBackend {
    /// Create a dummy backend with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DummyDeviceConfig::default())
    }

    /// Create a dummy backend and spawn its simulated device thread.
    ///
    /// If the thread cannot be spawned the backend is still returned, but
    /// every submission fails with [`BackendError::SubmissionFailed`].
    pub fn with_config(config: DummyDeviceConfig) -> Self {
        let (sender, receiver) = mpsc::channel::<DeviceJob>();
        let control = DummyControl::default();

        let device_control = control.clone();
        let latency = config.latency;
        let device = thread::Builder::new()
            .name("dummy-device".to_string())
            .spawn(move || run_device(receiver, latency, device_control))
            .map(drop)
            .map_err(|e| {
                log::error!("DummyBackend: failed to spawn device thread: {}", e);
                e.to_string()
            });

        Self::assemble(config, control, sender, device)
    }

    fn assemble(
        config: DummyDeviceConfig,
        control: DummyControl,
        sender: mpsc::Sender<DeviceJob>,
        device: Result<(), String>,
    ) -> Self {
        log::debug!(
            "DummyBackend: {} queues, latency {:?}",
            config.queue_count,
            config.latency
        );

        Self {
            queues_taken: Mutex::new(vec![false; config.queue_count]),
            config,
            control,
            sender: Mutex::new(sender),
            next_recording_id: AtomicU64::new(0),
            device_error: device.err(),
        }
    }

    /// Fault injection and inspection handle.
    pub fn control(&self) -> DummyControl {
        self.control.clone()
    }

    /// Device configuration.
    pub fn config(&self) -> &DummyDeviceConfig {
        &self.config
    }

    /// Create a surface with the configured image count and extent.
    pub fn create_surface(&self) -> Result<DummySurface, SurfaceError> {
        if self.control.creation_fails() {
            return Err(SurfaceError::Lost("surface creation disabled".to_string()));
        }
        Ok(DummySurface::new(
            self.control.clone(),
            self.config.image_count,
            self.config.extent,
        ))
    }

    fn check_creation(&self, what: &str) -> Result<(), BackendError> {
        if self.control.creation_fails() {
            Err(BackendError::ResourceCreationFailed(format!(
                "{what} creation disabled"
            )))
        } else {
            Ok(())
        }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBackend")
            .field("config", &self.config)
            .field("device_error", &self.device_error)
            .finish_non_exhaustive()
    }
}

fn run_device(receiver: mpsc::Receiver<DeviceJob>, latency: Duration, control: DummyControl) {
    while let Ok(job) = receiver.recv() {
        let start = Instant::now();
        while !job.wait_on.consume() {
            if start.elapsed() >= DEVICE_WAIT_LIMIT {
                log::warn!("DummyBackend: wait signal never fired for {:?}", job);
                break;
            }
            thread::yield_now();
        }

        if !latency.is_zero() {
            thread::sleep(latency);
        }

        if job.hang {
            log::trace!("DummyBackend: submission on queue {} hangs", job.queue);
            continue;
        }

        job.signal_on_done.signal();
        job.gate.signal();
        control.update(|s| s.retired += 1);
    }
    log::trace!("DummyBackend: device thread exiting");
}

impl Backend for DummyBackend {
    type Recording = DummyRecording;
    type DeviceSignal = DummySignal;
    type HostGate = DummyGate;
    type Queue = DummyQueue;
    type DrawList = DummyDrawList;
    type Surface = DummySurface;

    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn queue_count(&self) -> usize {
        self.config.queue_count
    }

    fn queue(&self, index: usize) -> Result<DummyQueue, BackendError> {
        self.check_creation("queue")?;
        let mut taken = self.queues_taken.lock();
        match taken.get_mut(index) {
            Some(flag) if !*flag => {
                *flag = true;
                Ok(DummyQueue {
                    index,
                    sender: self.sender.lock().clone(),
                })
            }
            Some(_) => Err(BackendError::ResourceCreationFailed(format!(
                "queue {index} already taken"
            ))),
            None => Err(BackendError::ResourceCreationFailed(format!(
                "queue {index} does not exist"
            ))),
        }
    }

    fn create_recording(&self) -> Result<DummyRecording, BackendError> {
        self.check_creation("recording")?;
        Ok(DummyRecording {
            id: self.next_recording_id.fetch_add(1, Ordering::Relaxed),
            ..DummyRecording::default()
        })
    }

    fn reset_recording(&self, recording: &mut DummyRecording) -> Result<(), BackendError> {
        recording.image = None;
        recording.draw_count = 0;
        self.control.update(|s| s.recording_resets += 1);
        Ok(())
    }

    fn record(
        &self,
        recording: &mut DummyRecording,
        image: ImageIndex,
        draw_list: &DummyDrawList,
    ) -> Result<(), BackendError> {
        if recording.image.is_some() {
            return Err(BackendError::SubmissionFailed(format!(
                "recording {} was not reset before reuse",
                recording.id
            )));
        }
        recording.image = Some(image);
        recording.draw_count = draw_list.draw_count;
        recording.times_recorded += 1;
        log::trace!(
            "DummyBackend: recorded {} draws into recording {} for image {}",
            draw_list.draw_count,
            recording.id,
            image
        );
        Ok(())
    }

    fn submit(
        &self,
        queue: &mut DummyQueue,
        recording: &DummyRecording,
        wait_on: &DummySignal,
        signal_on_done: &DummySignal,
        host_gate: &DummyGate,
    ) -> Result<(), BackendError> {
        if recording.image.is_none() {
            return Err(BackendError::SubmissionFailed(format!(
                "recording {} submitted without being recorded",
                recording.id
            )));
        }
        if let Some(error) = &self.device_error {
            return Err(BackendError::SubmissionFailed(format!(
                "simulated device not running: {error}"
            )));
        }
        let job = DeviceJob {
            queue: queue.index,
            wait_on: wait_on.clone(),
            signal_on_done: signal_on_done.clone(),
            gate: host_gate.clone(),
            hang: self.control.take_hang(),
        };
        queue
            .sender
            .send(job)
            .map_err(|_| BackendError::DeviceLost)?;
        self.control.update(|s| s.submissions += 1);
        Ok(())
    }

    fn make_device_signal(&self) -> Result<DummySignal, BackendError> {
        self.check_creation("device signal")?;
        Ok(DummySignal::new())
    }

    fn make_host_gate(&self, signaled: bool) -> Result<DummyGate, BackendError> {
        self.check_creation("host gate")?;
        Ok(DummyGate::new(signaled))
    }

    fn wait_host_gate(&self, gate: &DummyGate, timeout: Duration) -> bool {
        let signaled = gate.wait_timeout(timeout);
        self.control.update(|s| {
            s.gate_waits += 1;
            if !signaled {
                s.gate_timeouts += 1;
            }
        });
        signaled
    }

    fn reset_host_gate(&self, gate: &DummyGate) {
        gate.reset();
    }
}

/// Presentation surface of the dummy backend.
#[derive(Debug)]
pub struct DummySurface {
    control: DummyControl,
    extent: Extent2d,
    image_count: usize,
    free: VecDeque<ImageIndex>,
    /// Presented images waiting for their render to finish.
    presenting: Vec<(ImageIndex, DummySignal)>,
    /// Images currently handed out.
    acquired: Vec<bool>,
    generation: u64,
}

impl DummySurface {
    fn new(control: DummyControl, image_count: usize, extent: Extent2d) -> Self {
        Self {
            control,
            extent,
            image_count,
            free: (0..image_count as ImageIndex).collect(),
            presenting: Vec::new(),
            acquired: vec![false; image_count],
            generation: 0,
        }
    }

    /// Number of rebuilds so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Images currently handed out and not yet presented.
    pub fn acquired_count(&self) -> usize {
        self.acquired.iter().filter(|a| **a).count()
    }

    fn reclaim_presented(&mut self) {
        let free = &mut self.free;
        self.presenting.retain(|(image, done)| {
            if done.consume() {
                free.push_back(*image);
                false
            } else {
                true
            }
        });
    }
}

impl PresentSurface<DummyBackend> for DummySurface {
    fn acquire(
        &mut self,
        signal: &DummySignal,
        timeout: Duration,
    ) -> Result<AcquiredImage, SurfaceError> {
        if let Some(error) = self.control.take_acquire_fault() {
            log::trace!("DummySurface: injected acquire fault {:?}", error);
            return Err(error);
        }

        let deadline = Instant::now() + timeout;
        let index = loop {
            self.reclaim_presented();
            if let Some(index) = self.free.pop_front() {
                break index;
            }
            if Instant::now() >= deadline {
                return Err(SurfaceError::Timeout);
            }
            thread::sleep(ACQUIRE_POLL);
        };

        self.acquired[index as usize] = true;
        signal.signal();
        self.control.update(|s| s.acquires += 1);

        Ok(AcquiredImage {
            index,
            suboptimal: self.control.take_suboptimal(),
        })
    }

    fn present(&mut self, image: ImageIndex, wait_on: &DummySignal) -> Result<(), SurfaceError> {
        if let Some(error) = self.control.take_present_fault() {
            log::trace!("DummySurface: injected present fault {:?}", error);
            return Err(error);
        }

        let slot = self
            .acquired
            .get_mut(image as usize)
            .ok_or_else(|| SurfaceError::Lost(format!("image {image} out of range")))?;
        if !*slot {
            return Err(SurfaceError::Lost(format!(
                "image {image} presented without being acquired"
            )));
        }
        *slot = false;
        self.presenting.push((image, wait_on.clone()));
        self.control.update(|s| s.presents += 1);
        Ok(())
    }

    fn rebuild(&mut self, extent: Extent2d) -> Result<(), SurfaceError> {
        if self.control.creation_fails() {
            return Err(SurfaceError::Lost("surface creation disabled".to_string()));
        }
        self.extent = extent;
        if let Some(count) = self.control.rebuild_image_count() {
            self.image_count = count;
        }
        self.free = (0..self.image_count as ImageIndex).collect();
        self.presenting.clear();
        self.acquired = vec![false; self.image_count];
        self.generation += 1;
        self.control.update(|s| s.rebuilds += 1);
        log::debug!(
            "DummySurface: rebuilt at {}x{} (generation {})",
            extent.width,
            extent.height,
            self.generation
        );
        Ok(())
    }

    fn image_count(&self) -> usize {
        self.image_count
    }

    fn extent(&self) -> Extent2d {
        self.extent
    }

    fn desired_extent(&self) -> Extent2d {
        self.control.desired_extent().unwrap_or(self.extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_signal_and_wait() {
        let gate = DummyGate::new(false);
        assert!(!gate.is_signaled());

        let gate_clone = gate.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            gate_clone.signal();
        });

        assert!(gate.wait_timeout(Duration::from_secs(5)));
        assert!(gate.is_signaled());
    }

    #[test]
    fn test_gate_wait_timeout() {
        let gate = DummyGate::new(false);
        assert!(!gate.wait_timeout(Duration::from_millis(10)));

        gate.signal();
        gate.reset();
        assert!(!gate.is_signaled());
    }

    #[test]
    fn test_signal_consume() {
        let signal = DummySignal::new();
        assert!(!signal.consume());
        signal.signal();
        assert!(signal.is_signaled());
        assert!(signal.consume());
        assert!(!signal.is_signaled());
    }

    #[test]
    fn test_queues_are_taken_once() {
        let backend = DummyBackend::with_config(DummyDeviceConfig::default().with_queue_count(2));
        assert!(backend.queue(0).is_ok());
        assert!(backend.queue(0).is_err());
        assert!(backend.queue(1).is_ok());
        assert!(backend.queue(2).is_err());
    }

    #[test]
    fn test_submit_retires_on_device_thread() {
        let backend = DummyBackend::new();
        let mut queue = backend.queue(0).unwrap();
        let mut recording = backend.create_recording().unwrap();
        let acquired = backend.make_device_signal().unwrap();
        let completed = backend.make_device_signal().unwrap();
        let gate = backend.make_host_gate(false).unwrap();

        backend
            .record(&mut recording, 0, &DummyDrawList::new(3))
            .unwrap();
        acquired.signal();
        backend
            .submit(&mut queue, &recording, &acquired, &completed, &gate)
            .unwrap();

        assert!(backend.wait_host_gate(&gate, Duration::from_secs(5)));
        assert!(completed.is_signaled());
        assert!(!acquired.is_signaled());
        assert_eq!(backend.control().stats().submissions, 1);
    }

    #[test]
    fn test_submit_without_device_thread_fails() {
        let (sender, _) = mpsc::channel();
        let backend = DummyBackend::assemble(
            DummyDeviceConfig::default(),
            DummyControl::default(),
            sender,
            Err("out of threads".to_string()),
        );
        let mut queue = backend.queue(0).unwrap();
        let mut recording = backend.create_recording().unwrap();
        let acquired = backend.make_device_signal().unwrap();
        let completed = backend.make_device_signal().unwrap();
        let gate = backend.make_host_gate(true).unwrap();

        backend
            .record(&mut recording, 0, &DummyDrawList::new(1))
            .unwrap();
        let err = backend
            .submit(&mut queue, &recording, &acquired, &completed, &gate)
            .unwrap_err();
        assert_eq!(
            err,
            BackendError::SubmissionFailed("simulated device not running: out of threads".into())
        );
        assert_eq!(backend.control().stats().submissions, 0);
    }

    #[test]
    fn test_record_requires_reset() {
        let backend = DummyBackend::new();
        let mut recording = backend.create_recording().unwrap();
        backend
            .record(&mut recording, 1, &DummyDrawList::new(1))
            .unwrap();
        assert!(
            backend
                .record(&mut recording, 1, &DummyDrawList::new(1))
                .is_err()
        );

        backend.reset_recording(&mut recording).unwrap();
        assert!(
            backend
                .record(&mut recording, 2, &DummyDrawList::new(1))
                .is_ok()
        );
        assert_eq!(recording.times_recorded(), 2);
    }

    #[test]
    fn test_surface_rotates_images_after_render() {
        let backend = DummyBackend::with_config(DummyDeviceConfig::default().with_image_count(2));
        let mut surface = backend.create_surface().unwrap();
        let signal = backend.make_device_signal().unwrap();
        let done = backend.make_device_signal().unwrap();

        let a = surface.acquire(&signal, Duration::ZERO).unwrap();
        let b = surface.acquire(&signal, Duration::ZERO).unwrap();
        assert_ne!(a.index, b.index);
        assert_eq!(
            surface.acquire(&signal, Duration::from_millis(1)),
            Err(SurfaceError::Timeout)
        );

        surface.present(a.index, &done).unwrap();
        // Render not finished yet: image stays unavailable.
        assert_eq!(
            surface.acquire(&signal, Duration::from_millis(1)),
            Err(SurfaceError::Timeout)
        );

        done.signal();
        let c = surface.acquire(&signal, Duration::ZERO).unwrap();
        assert_eq!(c.index, a.index);
    }

    #[test]
    fn test_injected_faults() {
        let backend = DummyBackend::new();
        let control = backend.control();
        let mut surface = backend.create_surface().unwrap();
        let signal = backend.make_device_signal().unwrap();

        control.fail_next_acquire(SurfaceError::Outdated);
        assert_eq!(
            surface.acquire(&signal, Duration::ZERO),
            Err(SurfaceError::Outdated)
        );
        assert!(surface.acquire(&signal, Duration::ZERO).is_ok());

        control.fail_acquire_call(3, SurfaceError::Timeout);
        assert!(surface.acquire(&signal, Duration::ZERO).is_ok());
        assert_eq!(
            surface.acquire(&signal, Duration::ZERO),
            Err(SurfaceError::Timeout)
        );
        assert_eq!(control.acquire_calls(), 4);

        control.suboptimal_acquires(1);
        assert!(surface.acquire(&signal, Duration::ZERO).unwrap().suboptimal);
        assert!(!surface.acquire(&signal, Duration::ZERO).unwrap().suboptimal);

        control.set_desired_extent(Extent2d::new(640, 480));
        assert_eq!(surface.desired_extent(), Extent2d::new(640, 480));
        surface.rebuild(Extent2d::new(640, 480)).unwrap();
        assert_eq!(surface.extent(), Extent2d::new(640, 480));
        assert_eq!(surface.acquired_count(), 0);
        assert_eq!(surface.generation(), 1);
    }
}
