//! The capture fallback chain.

use std::any::Any;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Duration;

use super::errors::AttemptError;
use super::frame_grab::{FfmpegGrabber, FrameGrabber, GenericFrameGrab};
use super::library::{CameraLibrary, DeviceLibrary};
use super::method::{CaptureMethod, MethodKind};
use super::result::{AttemptRecord, CaptureResult};
use super::tool::{expand_args, ExternalTool};
use crate::config::{CaptureConfig, GrabBackend};

/// Ordered list of capture methods, each tried at most once per run.
#[derive(Debug, Default)]
pub struct CaptureChain {
    methods: Vec<CaptureMethod>,
}

impl CaptureChain {
    pub fn new(methods: Vec<CaptureMethod>) -> Self {
        Self { methods }
    }

    /// Build the chain described by `[capture]` with the default backends.
    pub fn from_config(config: &CaptureConfig) -> Self {
        let mut methods = Vec::new();
        for kind in &config.methods {
            if methods.iter().any(|m: &CaptureMethod| m.kind() == *kind) {
                log::warn!("Capture method '{}' listed twice; ignoring repeat", kind);
                continue;
            }
            methods.push(build_method(*kind, config));
        }
        Self { methods }
    }

    pub fn push(&mut self, method: impl Into<CaptureMethod>) {
        self.methods.push(method.into());
    }

    pub fn methods(&self) -> &[CaptureMethod] {
        &self.methods
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Try each method in order until one leaves a non-empty file at `dest`.
    pub fn run(&self, dest: &Path) -> CaptureResult {
        let mut failures = Vec::new();

        for method in &self.methods {
            log::info!("Trying capture method '{}'", method.name());
            match attempt_once(method, dest) {
                Ok(bytes) => {
                    log::info!(
                        "Capture method '{}' succeeded: {} bytes at {}",
                        method.name(),
                        bytes,
                        dest.display()
                    );
                    return CaptureResult::succeeded(method.name(), bytes, dest, failures);
                }
                Err(e) => {
                    log::warn!("Capture method '{}' failed: {}", method.name(), e);
                    failures.push(AttemptRecord::new(method.name(), &e));
                }
            }
        }

        if let Err(e) = remove_stale(dest) {
            log::warn!("Could not remove partial output {}: {}", dest.display(), e);
        }
        log::error!(
            "No capture method succeeded ({} tried) for {}",
            failures.len(),
            dest.display()
        );
        CaptureResult::exhausted(dest, failures)
    }
}

fn build_method(kind: MethodKind, config: &CaptureConfig) -> CaptureMethod {
    match kind {
        MethodKind::Tool => {
            let tool = &config.tool;
            // {output} stays in place; it is filled per attempt
            let args = expand_args(
                &tool.args,
                &[
                    ("duration_ms", tool.duration_ms.to_string()),
                    ("width", tool.width.to_string()),
                    ("height", tool.height.to_string()),
                ],
            );
            ExternalTool::new(tool.program.clone(), args, tool.timeout())
                .with_fallback_programs(tool.fallback_programs.clone())
                .with_grace(Duration::from_millis(tool.grace_ms))
                .into()
        }
        MethodKind::Library => {
            let lib = &config.library;
            DeviceLibrary::new(default_library())
                .with_index(lib.index)
                .with_resolution(lib.width, lib.height)
                .with_warmup(Duration::from_millis(lib.warmup_ms))
                .into()
        }
        MethodKind::FrameGrab => {
            let grab = &config.frame_grab;
            let backend: Box<dyn FrameGrabber> = match grab.backend {
                GrabBackend::Ffmpeg => Box::new(FfmpegGrabber::new(
                    grab.ffmpeg.clone(),
                    Duration::from_secs(grab.read_timeout_secs),
                )),
                GrabBackend::Native => native_grabber(),
            };
            GenericFrameGrab::new(backend).with_policy(grab.policy()).into()
        }
    }
}

#[cfg(feature = "webcam")]
fn default_library() -> Box<dyn CameraLibrary> {
    Box::new(super::native::NokhwaLibrary)
}

#[cfg(not(feature = "webcam"))]
fn default_library() -> Box<dyn CameraLibrary> {
    Box::new(super::library::UnavailableLibrary)
}

#[cfg(feature = "webcam")]
fn native_grabber() -> Box<dyn FrameGrabber> {
    Box::new(super::native::NokhwaGrabber)
}

#[cfg(not(feature = "webcam"))]
fn native_grabber() -> Box<dyn FrameGrabber> {
    Box::new(super::frame_grab::UnavailableGrabber)
}

/// Clear the destination, run one method, and validate what it left behind.
fn attempt_once(method: &CaptureMethod, dest: &Path) -> Result<u64, AttemptError> {
    remove_stale(dest)?;

    panic::catch_unwind(AssertUnwindSafe(|| method.attempt(dest)))
        .map_err(|payload| AttemptError::Panicked(panic_message(payload)))??;

    validate_output(dest)
}

/// Remove `dest` if it exists.
fn remove_stale(dest: &Path) -> io::Result<()> {
    match fs::remove_file(dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Size of `dest` if it is a non-empty regular file.
pub fn validate_output(dest: &Path) -> Result<u64, AttemptError> {
    match fs::metadata(dest) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        _ => Err(AttemptError::EmptyOrMissingOutput {
            path: dest.to_path_buf(),
        }),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
