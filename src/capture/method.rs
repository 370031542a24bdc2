//! The closed set of capture strategies.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::AttemptError;
use super::frame_grab::GenericFrameGrab;
use super::library::DeviceLibrary;
use super::tool::ExternalTool;

/// Which strategy a configured chain slot uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MethodKind {
    /// Still-capture program such as `libcamera-still`
    Tool,
    /// Stateful camera-library handle
    Library,
    /// Index-based frame grab
    FrameGrab,
}

impl MethodKind {
    pub const ALL: [MethodKind; 3] = [MethodKind::Tool, MethodKind::Library, MethodKind::FrameGrab];

    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::Tool => "tool",
            MethodKind::Library => "library",
            MethodKind::FrameGrab => "frame-grab",
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One capture strategy with a single `attempt` operation.
#[derive(Debug)]
pub enum CaptureMethod {
    ExternalTool(ExternalTool),
    DeviceLibrary(DeviceLibrary),
    GenericFrameGrab(GenericFrameGrab),
}

impl CaptureMethod {
    /// Name used in logs and results.
    pub fn name(&self) -> &str {
        match self {
            CaptureMethod::ExternalTool(m) => m.name(),
            CaptureMethod::DeviceLibrary(m) => m.name(),
            CaptureMethod::GenericFrameGrab(m) => m.name(),
        }
    }

    pub fn kind(&self) -> MethodKind {
        match self {
            CaptureMethod::ExternalTool(_) => MethodKind::Tool,
            CaptureMethod::DeviceLibrary(_) => MethodKind::Library,
            CaptureMethod::GenericFrameGrab(_) => MethodKind::FrameGrab,
        }
    }

    /// Try to produce an image at `dest`. Output validation is the chain's job.
    pub fn attempt(&self, dest: &Path) -> Result<(), AttemptError> {
        match self {
            CaptureMethod::ExternalTool(m) => m.attempt(dest),
            CaptureMethod::DeviceLibrary(m) => m.attempt(dest),
            CaptureMethod::GenericFrameGrab(m) => m.attempt(dest),
        }
    }
}

impl From<ExternalTool> for CaptureMethod {
    fn from(m: ExternalTool) -> Self {
        CaptureMethod::ExternalTool(m)
    }
}

impl From<DeviceLibrary> for CaptureMethod {
    fn from(m: DeviceLibrary) -> Self {
        CaptureMethod::DeviceLibrary(m)
    }
}

impl From<GenericFrameGrab> for CaptureMethod {
    fn from(m: GenericFrameGrab) -> Self {
        CaptureMethod::GenericFrameGrab(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::library::UnavailableLibrary;
    use std::time::Duration;

    #[test]
    fn test_method_kind_names() {
        assert_eq!(MethodKind::Tool.to_string(), "tool");
        assert_eq!(MethodKind::Library.to_string(), "library");
        assert_eq!(MethodKind::FrameGrab.to_string(), "frame-grab");
    }

    #[test]
    fn test_method_kind_serde_names() {
        let kinds: Vec<MethodKind> =
            serde_json::from_str(r#"["frame-grab", "tool", "library"]"#).unwrap();
        assert_eq!(
            kinds,
            vec![MethodKind::FrameGrab, MethodKind::Tool, MethodKind::Library]
        );
    }

    #[test]
    fn test_capture_method_dispatch_name_and_kind() {
        let tool: CaptureMethod =
            ExternalTool::new("libcamera-still", vec![], Duration::from_secs(10)).into();
        assert_eq!(tool.name(), "tool");
        assert_eq!(tool.kind(), MethodKind::Tool);

        let lib: CaptureMethod = DeviceLibrary::new(Box::new(UnavailableLibrary))
            .with_name("picamera")
            .into();
        assert_eq!(lib.name(), "picamera");
        assert_eq!(lib.kind(), MethodKind::Library);
    }
}
