//! Image capture through an ordered fallback chain.
//!
//! A [`CaptureChain`] holds [`CaptureMethod`]s and tries them in order until
//! one leaves a non-empty image at the destination path:
//!
//! - [`ExternalTool`]: a still-capture program (`libcamera-still`) with a hard timeout
//! - [`DeviceLibrary`]: a stateful camera handle (open, configure, start, capture, stop)
//! - [`GenericFrameGrab`]: frame reads across device indices with bounded retries
//!
//! Every failure is contained at the method boundary and recorded in the
//! [`CaptureResult`]; only exhaustion of the whole chain is a failure.

mod chain;
mod errors;
pub mod frame_grab;
pub mod library;
mod method;
#[cfg(feature = "webcam")]
pub mod native;
mod result;
pub mod tool;

pub use chain::{validate_output, CaptureChain};
pub use errors::AttemptError;
pub use frame_grab::{Frame, FrameGrabber, GenericFrameGrab, GrabDevice, GrabPolicy};
pub use library::{CameraLibrary, CameraSession, DeviceLibrary};
pub use method::{CaptureMethod, MethodKind};
pub use result::{AttemptRecord, CaptureResult};
pub use tool::{ExternalTool, ToolError};
