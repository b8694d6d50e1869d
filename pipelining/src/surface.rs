//! Access-serialized presentation surface.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::backend::{AcquiredImage, Backend, Extent2d, ImageIndex, PresentSurface};
use crate::error::{PipelineError, PipelineResult, SurfaceError};

/// The presentation surface shared by all frame slots.
///
/// Acquire and present from different slots run on different worker threads.
/// Both go through one mutex, held only for the duration of the surface call.
/// Rebuilding takes `&mut self`, which the scheduler only has between ticks,
/// after a drain.
pub struct SharedSurface<B: Backend> {
    inner: Mutex<B::Surface>,
    outdated: AtomicBool,
    rebuilds: u64,
}

impl<B: Backend> SharedSurface<B> {
    /// Wrap a backend surface.
    pub fn new(surface: B::Surface) -> Self {
        Self {
            inner: Mutex::new(surface),
            outdated: AtomicBool::new(false),
            rebuilds: 0,
        }
    }

    /// Acquire the next image, signaling `signal` when it is ready.
    pub fn acquire(
        &self,
        signal: &B::DeviceSignal,
        timeout: std::time::Duration,
    ) -> Result<AcquiredImage, SurfaceError> {
        let result = self.inner.lock().acquire(signal, timeout);
        self.note(&result);
        result
    }

    /// Present `image` after `wait_on` fires.
    pub fn present(
        &self,
        image: ImageIndex,
        wait_on: &B::DeviceSignal,
    ) -> Result<(), SurfaceError> {
        let result = self.inner.lock().present(image, wait_on);
        self.note(&result);
        result
    }

    fn note<T>(&self, result: &Result<T, SurfaceError>) {
        if matches!(result, Err(SurfaceError::Outdated)) {
            self.outdated.store(true, Ordering::Release);
        }
    }

    /// Recreate the image pool at `extent` and clear the outdated flag.
    ///
    /// # Errors
    ///
    /// A failed rebuild is a construction failure.
    pub fn rebuild(&mut self, extent: Extent2d) -> PipelineResult<()> {
        self.inner
            .get_mut()
            .rebuild(extent)
            .map_err(|e| PipelineError::ConstructionFailed(format!("surface rebuild: {e}")))?;
        self.outdated.store(false, Ordering::Release);
        self.rebuilds += 1;
        log::info!(
            "Rebuilt presentation surface at {}x{} ({} images)",
            extent.width,
            extent.height,
            self.image_count()
        );
        Ok(())
    }

    /// Whether a surface call reported [`SurfaceError::Outdated`] since the
    /// last rebuild.
    pub fn is_outdated(&self) -> bool {
        self.outdated.load(Ordering::Acquire)
    }

    /// Number of rebuilds performed.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// Number of presentable images.
    pub fn image_count(&self) -> usize {
        self.inner.lock().image_count()
    }

    /// Current image size.
    pub fn extent(&self) -> Extent2d {
        self.inner.lock().extent()
    }

    /// Size the surface should be rebuilt to.
    pub fn desired_extent(&self) -> Extent2d {
        self.inner.lock().desired_extent()
    }

    /// Unwrap the backend surface.
    pub fn into_inner(self) -> B::Surface {
        self.inner.into_inner()
    }
}
