//! End-to-end tests of the capture fallback chain with fake collaborators.

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use picam_detect::capture::{
    AttemptError, CameraLibrary, CameraSession, CaptureChain, DeviceLibrary, ExternalTool, Frame,
    FrameGrabber, GenericFrameGrab, GrabDevice, GrabPolicy,
};
use tempfile::TempDir;

/// Library whose session writes `size` bytes on capture.
struct FixedSizeLibrary {
    size: usize,
    opened: Rc<Cell<u32>>,
}

struct FixedSizeSession {
    size: usize,
}

impl CameraLibrary for FixedSizeLibrary {
    fn open(&self, _index: u32) -> Result<Box<dyn CameraSession>, AttemptError> {
        self.opened.set(self.opened.get() + 1);
        Ok(Box::new(FixedSizeSession { size: self.size }))
    }
}

impl CameraSession for FixedSizeSession {
    fn configure(&mut self, _width: u32, _height: u32) -> Result<(), AttemptError> {
        Ok(())
    }

    fn start(&mut self) -> Result<(), AttemptError> {
        Ok(())
    }

    fn capture_to_file(&mut self, path: &Path) -> Result<(), AttemptError> {
        std::fs::write(path, vec![0xAB; self.size])?;
        Ok(())
    }

    fn stop(&mut self) {}
}

/// Library that never opens.
struct BrokenLibrary;

impl CameraLibrary for BrokenLibrary {
    fn open(&self, index: u32) -> Result<Box<dyn CameraSession>, AttemptError> {
        Err(AttemptError::DeviceOpenFailure(format!("camera {} busy", index)))
    }
}

/// Grabber that counts opens and either yields frames or nothing.
struct CountingGrabber {
    opens: Rc<Cell<u32>>,
    produce: bool,
}

struct CountingDevice {
    produce: bool,
}

impl FrameGrabber for CountingGrabber {
    fn open(&self, _index: u32) -> Result<Box<dyn GrabDevice>, AttemptError> {
        self.opens.set(self.opens.get() + 1);
        Ok(Box::new(CountingDevice {
            produce: self.produce,
        }))
    }
}

impl GrabDevice for CountingDevice {
    fn set_resolution(&mut self, _width: u32, _height: u32) {}

    fn read_frame(&mut self) -> Option<Frame> {
        self.produce
            .then(|| Frame::new(RgbImage::from_pixel(16, 12, Rgb([40, 90, 160]))))
    }

    fn release(&mut self) {}
}

fn fast_policy() -> GrabPolicy {
    GrabPolicy {
        device_count: 2,
        read_attempts: 2,
        retry_delay: Duration::from_millis(1),
        ..GrabPolicy::default()
    }
}

fn missing_tool() -> ExternalTool {
    ExternalTool::new(
        "picam-detect-no-such-program",
        vec!["-o".to_string(), "{output}".to_string()],
        Duration::from_secs(2),
    )
    .with_name("A")
}

#[test]
fn test_falls_through_missing_tool_to_library() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("capture.jpg");
    let library_opens = Rc::new(Cell::new(0));
    let grab_opens = Rc::new(Cell::new(0));

    let mut chain = CaptureChain::default();
    chain.push(missing_tool());
    chain.push(
        DeviceLibrary::new(Box::new(FixedSizeLibrary {
            size: 50_000,
            opened: library_opens.clone(),
        }))
        .with_name("B"),
    );
    chain.push(
        GenericFrameGrab::new(Box::new(CountingGrabber {
            opens: grab_opens.clone(),
            produce: true,
        }))
        .with_name("C")
        .with_policy(fast_policy()),
    );

    let result = chain.run(&dest);

    assert!(result.success, "{}", result.message);
    assert_eq!(result.method.as_deref(), Some("B"));
    assert_eq!(result.bytes, 50_000);
    assert_eq!(std::fs::metadata(&dest).unwrap().len(), 50_000);
    assert_eq!(library_opens.get(), 1);
    assert_eq!(grab_opens.get(), 0, "C must not be attempted");

    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].method, "A");
    assert_eq!(result.failures[0].kind, "tool-not-found");
    assert_eq!(result.attempted(), vec!["A", "B"]);
}

#[test]
fn test_all_methods_fail_leaves_no_file() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("capture.jpg");
    std::fs::write(&dest, b"stale image from an earlier run").unwrap();
    let grab_opens = Rc::new(Cell::new(0));

    let chain = CaptureChain::new(vec![
        missing_tool().into(),
        DeviceLibrary::new(Box::new(BrokenLibrary)).with_name("B").into(),
        GenericFrameGrab::new(Box::new(CountingGrabber {
            opens: grab_opens.clone(),
            produce: false,
        }))
        .with_name("C")
        .with_policy(fast_policy())
        .into(),
    ]);

    let result = chain.run(&dest);

    assert!(!result.success);
    assert!(result.method.is_none());
    assert_eq!(result.bytes, 0);
    assert!(result.message.contains("no method succeeded"));
    assert!(!dest.exists());
    assert_eq!(grab_opens.get(), 2);

    let kinds: Vec<&str> = result.failures.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec!["tool-not-found", "device-open-failure", "frame-read-failure"]
    );
}

#[test]
fn test_first_success_skips_the_rest() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("capture.png");
    let library_opens = Rc::new(Cell::new(0));

    let chain = CaptureChain::new(vec![
        GenericFrameGrab::new(Box::new(CountingGrabber {
            opens: Rc::new(Cell::new(0)),
            produce: true,
        }))
        .with_policy(fast_policy())
        .into(),
        DeviceLibrary::new(Box::new(FixedSizeLibrary {
            size: 10,
            opened: library_opens.clone(),
        }))
        .into(),
    ]);

    let result = chain.run(&dest);

    assert!(result.success);
    assert_eq!(result.method.as_deref(), Some("frame-grab"));
    assert!(result.failures.is_empty());
    assert_eq!(library_opens.get(), 0);
    let written = image::open(&dest).unwrap();
    assert_eq!((written.width(), written.height()), (16, 12));
}

#[cfg(unix)]
#[test]
fn test_hung_tool_times_out_and_chain_continues() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("capture.jpg");

    let hung = ExternalTool::new(
        "sh",
        vec!["-c".to_string(), "sleep 30".to_string()],
        Duration::from_millis(300),
    )
    .with_grace(Duration::from_millis(100));

    let chain = CaptureChain::new(vec![
        hung.into(),
        DeviceLibrary::new(Box::new(FixedSizeLibrary {
            size: 2048,
            opened: Rc::new(Cell::new(0)),
        }))
        .into(),
    ]);

    let started = Instant::now();
    let result = chain.run(&dest);

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(result.success);
    assert_eq!(result.method.as_deref(), Some("library"));
    assert_eq!(result.failures[0].kind, "timeout");
}

#[cfg(unix)]
#[test]
fn test_tool_exiting_zero_without_output_is_a_failure() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("capture.jpg");

    let lazy = ExternalTool::new("sh", vec!["-c".to_string(), "exit 0".to_string()], Duration::from_secs(5));
    let result = CaptureChain::new(vec![lazy.into()]).run(&dest);

    assert!(!result.success);
    assert_eq!(result.failures[0].kind, "empty-or-missing-output");
}
