//! Capture through a stateful camera-library handle.
//!
//! The library is an external collaborator: open → configure → start →
//! capture → stop. [`DeviceLibrary`] drives that sequence and guarantees
//! `stop()` runs once a session was opened, whatever happens after.

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::thread;
use std::time::Duration;

use super::errors::AttemptError;

/// Entry point of a camera library backend.
pub trait CameraLibrary {
    /// Open the camera at `index`.
    fn open(&self, index: u32) -> Result<Box<dyn CameraSession>, AttemptError>;
}

/// An open camera handle.
pub trait CameraSession {
    /// Request a still resolution.
    fn configure(&mut self, width: u32, height: u32) -> Result<(), AttemptError>;
    /// Start streaming.
    fn start(&mut self) -> Result<(), AttemptError>;
    /// Capture one still and write it to `path`.
    fn capture_to_file(&mut self, path: &Path) -> Result<(), AttemptError>;
    /// Stop streaming and release the device. Must tolerate a session that
    /// was never started.
    fn stop(&mut self);
}

/// Backend used when the crate is built without a native camera library.
#[derive(Debug, Default)]
pub struct UnavailableLibrary;

impl CameraLibrary for UnavailableLibrary {
    fn open(&self, _index: u32) -> Result<Box<dyn CameraSession>, AttemptError> {
        Err(AttemptError::DeviceOpenFailure(
            "built without the `webcam` feature".to_string(),
        ))
    }
}

/// Calls `stop()` on drop.
struct SessionGuard(Box<dyn CameraSession>);

impl Deref for SessionGuard {
    type Target = dyn CameraSession;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// The device-library capture method.
pub struct DeviceLibrary {
    name: String,
    backend: Box<dyn CameraLibrary>,
    index: u32,
    width: u32,
    height: u32,
    warmup: Duration,
}

impl std::fmt::Debug for DeviceLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLibrary")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("warmup", &self.warmup)
            .finish_non_exhaustive()
    }
}

impl DeviceLibrary {
    pub fn new(backend: Box<dyn CameraLibrary>) -> Self {
        Self {
            name: "library".to_string(),
            backend,
            index: 0,
            width: 1920,
            height: 1080,
            warmup: Duration::ZERO,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Delay between `start` and `capture` so exposure can settle.
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attempt(&self, dest: &Path) -> Result<(), AttemptError> {
        let mut session = SessionGuard(self.backend.open(self.index)?);
        session.configure(self.width, self.height)?;
        session.start()?;
        if !self.warmup.is_zero() {
            log::debug!("Warming up camera {} for {:?}", self.index, self.warmup);
            thread::sleep(self.warmup);
        }
        session.capture_to_file(dest)
    }
}
