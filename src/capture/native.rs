//! Native camera backends using nokhwa (requires the `webcam` feature).

use std::path::Path;

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

use super::errors::AttemptError;
use super::frame_grab::{Frame, FrameGrabber, GrabDevice};
use super::library::{CameraLibrary, CameraSession};

fn open_camera(index: u32) -> Result<Camera, AttemptError> {
    let requested =
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
    Camera::new(CameraIndex::Index(index), requested).map_err(|e| {
        let msg = e.to_string();
        let lower = msg.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") {
            AttemptError::DeviceOpenFailure(format!("permission denied: {}", msg))
        } else {
            AttemptError::DeviceOpenFailure(msg)
        }
    })
}

/// Decode the next buffer from a streaming camera into an RGB frame.
fn grab_rgb(camera: &mut Camera) -> Result<RgbImage, AttemptError> {
    let buffer = camera
        .frame()
        .map_err(|e| AttemptError::Library(e.to_string()))?;
    let decoded = buffer
        .decode_image::<RgbFormat>()
        .map_err(|e| AttemptError::Library(e.to_string()))?;
    let (width, height) = (decoded.width(), decoded.height());
    RgbImage::from_raw(width, height, decoded.into_raw())
        .ok_or_else(|| AttemptError::Library("decoded frame has the wrong size".to_string()))
}

/// Stateful camera-library backend.
#[derive(Debug, Default)]
pub struct NokhwaLibrary;

impl CameraLibrary for NokhwaLibrary {
    fn open(&self, index: u32) -> Result<Box<dyn CameraSession>, AttemptError> {
        log::debug!("Opening camera {} through nokhwa", index);
        Ok(Box::new(NokhwaSession {
            camera: open_camera(index)?,
            streaming: false,
        }))
    }
}

struct NokhwaSession {
    camera: Camera,
    streaming: bool,
}

impl CameraSession for NokhwaSession {
    fn configure(&mut self, width: u32, height: u32) -> Result<(), AttemptError> {
        self.camera
            .set_resolution(Resolution::new(width, height))
            .map_err(|e| AttemptError::Library(e.to_string()))
    }

    fn start(&mut self) -> Result<(), AttemptError> {
        self.camera
            .open_stream()
            .map_err(|e| AttemptError::Library(e.to_string()))?;
        self.streaming = true;
        Ok(())
    }

    fn capture_to_file(&mut self, path: &Path) -> Result<(), AttemptError> {
        let image = grab_rgb(&mut self.camera)?;
        let format = image::ImageFormat::from_path(path).unwrap_or(image::ImageFormat::Jpeg);
        image
            .save_with_format(path, format)
            .map_err(|e| AttemptError::Library(format!("failed to write still: {}", e)))
    }

    fn stop(&mut self) {
        if self.streaming {
            let _ = self.camera.stop_stream();
            self.streaming = false;
        }
    }
}

/// Index-based frame grabber.
#[derive(Debug, Default)]
pub struct NokhwaGrabber;

impl FrameGrabber for NokhwaGrabber {
    fn open(&self, index: u32) -> Result<Box<dyn GrabDevice>, AttemptError> {
        Ok(Box::new(NokhwaDevice {
            camera: open_camera(index)?,
            streaming: false,
        }))
    }
}

struct NokhwaDevice {
    camera: Camera,
    streaming: bool,
}

impl GrabDevice for NokhwaDevice {
    fn set_resolution(&mut self, width: u32, height: u32) {
        if let Err(e) = self.camera.set_resolution(Resolution::new(width, height)) {
            log::debug!("Camera rejected {}x{}: {}", width, height, e);
        }
    }

    fn read_frame(&mut self) -> Option<Frame> {
        if !self.streaming {
            if let Err(e) = self.camera.open_stream() {
                log::debug!("Failed to open stream: {}", e);
                return None;
            }
            self.streaming = true;
        }
        match grab_rgb(&mut self.camera) {
            Ok(image) => Some(Frame::new(image)),
            Err(e) => {
                log::debug!("Frame read failed: {}", e);
                None
            }
        }
    }

    fn release(&mut self) {
        if self.streaming {
            let _ = self.camera.stop_stream();
            self.streaming = false;
        }
    }
}
