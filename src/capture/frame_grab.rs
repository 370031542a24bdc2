//! Generic frame grabbing across device indices.
//!
//! [`GenericFrameGrab`] walks device indices `0..device_count`, opens each,
//! and makes a bounded number of read attempts before moving on. The first
//! valid frame is written to the destination. Devices are released as soon
//! as they are done with, on success or failure.

use std::fs::File;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use image::{ImageFormat, RgbImage};

use super::errors::AttemptError;
use super::tool::{run_with_timeout, stderr_tail};

/// A decoded camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// A frame is usable when it has pixels.
    pub fn is_valid(&self) -> bool {
        self.image.width() > 0 && self.image.height() > 0 && !self.image.as_raw().is_empty()
    }
}

/// Opens capture devices by index.
pub trait FrameGrabber {
    fn open(&self, index: u32) -> Result<Box<dyn GrabDevice>, AttemptError>;
}

/// An open capture device.
pub trait GrabDevice {
    /// Request a capture resolution. Backends may pick the closest match.
    fn set_resolution(&mut self, width: u32, height: u32);

    /// Read one frame; `None` when the device produced nothing usable.
    fn read_frame(&mut self) -> Option<Frame>;

    /// Persist a frame. The format follows the file extension (JPEG if none).
    fn write_frame(&mut self, frame: &Frame, path: &Path) -> Result<(), AttemptError> {
        let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Jpeg);
        frame
            .image
            .save_with_format(path, format)
            .map_err(|e| AttemptError::Library(format!("failed to write frame: {}", e)))
    }

    /// Release the device. Called exactly once per successful `open`.
    fn release(&mut self);
}

/// Retry policy for [`GenericFrameGrab`].
#[derive(Debug, Clone)]
pub struct GrabPolicy {
    /// Indices `0..device_count` are tried
    pub device_count: u32,
    /// Reads per device before giving up on it
    pub read_attempts: u32,
    /// Fixed delay between reads on the same device
    pub retry_delay: Duration,
    pub width: u32,
    pub height: u32,
}

impl Default for GrabPolicy {
    fn default() -> Self {
        Self {
            device_count: 3,
            read_attempts: 5,
            retry_delay: Duration::from_millis(500),
            width: 640,
            height: 480,
        }
    }
}

/// Calls `release()` on drop.
struct DeviceGuard(Box<dyn GrabDevice>);

impl Deref for DeviceGuard {
    type Target = dyn GrabDevice;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for DeviceGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// The generic frame-grab capture method.
pub struct GenericFrameGrab {
    name: String,
    backend: Box<dyn FrameGrabber>,
    policy: GrabPolicy,
}

impl std::fmt::Debug for GenericFrameGrab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericFrameGrab")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl GenericFrameGrab {
    pub fn new(backend: Box<dyn FrameGrabber>) -> Self {
        Self {
            name: "frame-grab".to_string(),
            backend,
            policy: GrabPolicy::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_policy(mut self, policy: GrabPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &GrabPolicy {
        &self.policy
    }

    pub fn attempt(&self, dest: &Path) -> Result<(), AttemptError> {
        let policy = &self.policy;
        let mut opened = 0;
        let mut reads = 0;
        let mut last_open_error = None;

        for index in 0..policy.device_count {
            let mut device = match self.backend.open(index) {
                Ok(device) => DeviceGuard(device),
                Err(e) => {
                    log::debug!("Device {} not available: {}", index, e);
                    last_open_error = Some(e);
                    continue;
                }
            };
            opened += 1;
            device.set_resolution(policy.width, policy.height);

            for read in 1..=policy.read_attempts {
                reads += 1;
                if let Some(frame) = device.read_frame().filter(Frame::is_valid) {
                    log::debug!("Device {} produced a frame on read {}", index, read);
                    return device.write_frame(&frame, dest);
                }
                if read < policy.read_attempts {
                    thread::sleep(policy.retry_delay);
                }
            }

            log::debug!(
                "Giving up on device {} after {} read(s)",
                index,
                policy.read_attempts
            );
        }

        if opened == 0 {
            let detail = last_open_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no devices configured".to_string());
            return Err(AttemptError::DeviceOpenFailure(format!(
                "none of devices 0..{} could be opened ({})",
                policy.device_count, detail
            )));
        }

        Err(AttemptError::FrameReadFailure {
            devices: opened,
            reads,
        })
    }
}

/// Grabs single frames from V4L2 nodes (`/dev/videoN`) with ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegGrabber {
    program: String,
    device_prefix: String,
    read_timeout: Duration,
}

impl Default for FfmpegGrabber {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            device_prefix: "/dev/video".to_string(),
            read_timeout: Duration::from_secs(5),
        }
    }
}

impl FfmpegGrabber {
    pub fn new(program: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            read_timeout,
            ..Default::default()
        }
    }

    /// Device node path for an index.
    pub fn device_path(&self, index: u32) -> PathBuf {
        PathBuf::from(format!("{}{}", self.device_prefix, index))
    }
}

impl FrameGrabber for FfmpegGrabber {
    fn open(&self, index: u32) -> Result<Box<dyn GrabDevice>, AttemptError> {
        let path = self.device_path(index);
        let handle = File::open(&path).map_err(|e| {
            AttemptError::DeviceOpenFailure(format!("{}: {}", path.display(), e))
        })?;

        Ok(Box::new(FfmpegDevice {
            program: self.program.clone(),
            path,
            handle: Some(handle),
            resolution: None,
            read_timeout: self.read_timeout,
        }))
    }
}

/// An opened V4L2 node. The held handle keeps the node claimed until release.
struct FfmpegDevice {
    program: String,
    path: PathBuf,
    handle: Option<File>,
    resolution: Option<(u32, u32)>,
    read_timeout: Duration,
}

impl FfmpegDevice {
    /// FFmpeg arguments for grabbing one MJPEG frame to stdout.
    fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "v4l2".to_string(),
        ];
        if let Some((width, height)) = self.resolution {
            args.push("-video_size".to_string());
            args.push(format!("{}x{}", width, height));
        }
        args.extend([
            "-i".to_string(),
            self.path.display().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-f".to_string(),
            "image2pipe".to_string(),
            "-vcodec".to_string(),
            "mjpeg".to_string(),
            "-".to_string(),
        ]);
        args
    }
}

impl GrabDevice for FfmpegDevice {
    fn set_resolution(&mut self, width: u32, height: u32) {
        self.resolution = Some((width, height));
    }

    fn read_frame(&mut self) -> Option<Frame> {
        if self.handle.is_none() {
            return None;
        }

        let output = match run_with_timeout(
            &self.program,
            &self.to_ffmpeg_args(),
            self.read_timeout,
            Duration::from_millis(200),
        ) {
            Ok(output) => output,
            Err(e) => {
                log::debug!("Frame read from {} failed: {}", self.path.display(), e);
                return None;
            }
        };

        if !output.status.success() || output.stdout.is_empty() {
            log::debug!(
                "ffmpeg returned no frame from {}: {}",
                self.path.display(),
                stderr_tail(&output.stderr)
            );
            return None;
        }

        match image::load_from_memory(&output.stdout) {
            Ok(decoded) => Some(Frame::new(decoded.to_rgb8())),
            Err(e) => {
                log::debug!("Undecodable frame from {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn release(&mut self) {
        self.handle = None;
    }
}

/// Grabber used when a backend was requested that this build lacks.
#[derive(Debug, Default)]
pub struct UnavailableGrabber;

impl FrameGrabber for UnavailableGrabber {
    fn open(&self, _index: u32) -> Result<Box<dyn GrabDevice>, AttemptError> {
        Err(AttemptError::DeviceOpenFailure(
            "built without the `webcam` feature".to_string(),
        ))
    }
}
