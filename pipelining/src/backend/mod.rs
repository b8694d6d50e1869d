//! Rendering backend abstraction.
//!
//! The scheduler never talks to a graphics API directly. Everything it needs
//! from the device goes through the [`Backend`] trait, and everything it needs
//! from the window system goes through [`PresentSurface`].
//!
//! # Available Backends
//!
//! - `dummy` (default feature): simulated device for tests, benchmarks and the demo
//!
//! # Contract
//!
//! | Operation | Blocking | Notes |
//! |-----------|----------|-------|
//! | `record` | CPU only | Fills a recording resource, no device interaction |
//! | `submit` | No | Waits on `wait_on`, signals `signal_on_done` and the host gate on the device |
//! | `wait_host_gate` | Bounded | Returns `false` on timeout |
//! | `acquire`/`present` | Bounded | Externally serialized by the scheduler |

#[cfg(feature = "dummy")]
pub mod dummy;

use std::time::Duration;

use crate::error::{BackendError, SurfaceError};

#[cfg(feature = "dummy")]
pub use dummy::{
    DummyBackend, DummyControl, DummyDeviceConfig, DummyDrawList, DummyStats, DummySurface,
};

/// Index of a presentable image in a [`PresentSurface`].
pub type ImageIndex = u32;

/// Size of a presentation surface in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent2d {
    /// Create a new extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero (e.g. a minimized window).
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Result of a successful acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Image the slot will render into.
    pub index: ImageIndex,
    /// The image is usable but the surface should be rebuilt soon.
    pub suboptimal: bool,
}

impl AcquiredImage {
    /// An optimal acquire of `index`.
    pub const fn optimal(index: ImageIndex) -> Self {
        Self {
            index,
            suboptimal: false,
        }
    }
}

/// Device-side services consumed by the scheduler.
///
/// All handle types are opaque to the scheduler. Implementations must be
/// `Send + Sync`: stage operations for different slots call into the backend
/// from different threads within the same tick.
pub trait Backend: Send + Sync {
    /// Reusable command-recording resource, exclusively owned by one slot.
    type Recording: Send;
    /// Device-only ordering primitive (never waited on by the host).
    type DeviceSignal: Send + Sync;
    /// Host-observable completion primitive.
    type HostGate: Send + Sync;
    /// Device submission queue.
    type Queue: Send;
    /// Caller-supplied description of the work to record for one frame.
    type DrawList: Send;
    /// The presentation surface this backend renders into.
    type Surface: PresentSurface<Self>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &'static str;

    /// Number of submission queues the device exposes.
    fn queue_count(&self) -> usize;

    /// Take ownership of submission queue `index`.
    ///
    /// # Errors
    ///
    /// Fails if the queue does not exist or was already taken.
    fn queue(&self, index: usize) -> Result<Self::Queue, BackendError>;

    /// Create a recording resource.
    fn create_recording(&self) -> Result<Self::Recording, BackendError>;

    /// Reset a recording resource before it is filled again.
    fn reset_recording(&self, recording: &mut Self::Recording) -> Result<(), BackendError>;

    /// Record `draw_list` targeting `image` into `recording`.
    fn record(
        &self,
        recording: &mut Self::Recording,
        image: ImageIndex,
        draw_list: &Self::DrawList,
    ) -> Result<(), BackendError>;

    /// Enqueue `recording` on `queue`.
    ///
    /// The device waits on `wait_on` before executing, then signals
    /// `signal_on_done` and `host_gate` once the work retires.
    fn submit(
        &self,
        queue: &mut Self::Queue,
        recording: &Self::Recording,
        wait_on: &Self::DeviceSignal,
        signal_on_done: &Self::DeviceSignal,
        host_gate: &Self::HostGate,
    ) -> Result<(), BackendError>;

    /// Create a device-only ordering primitive.
    fn make_device_signal(&self) -> Result<Self::DeviceSignal, BackendError>;

    /// Create a host gate, optionally already signaled.
    fn make_host_gate(&self, signaled: bool) -> Result<Self::HostGate, BackendError>;

    /// Block until `gate` is signaled or `timeout` elapses.
    ///
    /// Returns `true` if the gate was signaled.
    fn wait_host_gate(&self, gate: &Self::HostGate, timeout: Duration) -> bool;

    /// Return `gate` to the unsignaled state.
    ///
    /// Must only be called when no device work will signal it.
    fn reset_host_gate(&self, gate: &Self::HostGate);
}

/// The shared, resizable ring of presentable images.
///
/// Calls are serialized by the scheduler (see
/// [`SharedSurface`](crate::surface::SharedSurface)); implementations do not
/// need their own locking.
pub trait PresentSurface<B: Backend + ?Sized>: Send {
    /// Request the next available image, signaling `signal` when the device
    /// may render into it.
    fn acquire(
        &mut self,
        signal: &B::DeviceSignal,
        timeout: Duration,
    ) -> Result<AcquiredImage, SurfaceError>;

    /// Queue `image` for display once `wait_on` fires.
    fn present(&mut self, image: ImageIndex, wait_on: &B::DeviceSignal)
    -> Result<(), SurfaceError>;

    /// Destroy and recreate the image pool at `extent`.
    ///
    /// Only called after a full drain.
    fn rebuild(&mut self, extent: Extent2d) -> Result<(), SurfaceError>;

    /// Number of images in the pool.
    fn image_count(&self) -> usize;

    /// Current size of the images.
    fn extent(&self) -> Extent2d;

    /// Size the surface should have, e.g. the window's current client area.
    fn desired_extent(&self) -> Extent2d;
}
