//! Error types for capture attempts.
//!
//! Every variant is recoverable at the method boundary: the chain logs it,
//! records it and moves on to the next method.

use std::path::PathBuf;
use std::time::Duration;

use super::tool::ToolError;

/// Why a single capture method failed.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    /// The capture program is not installed (or not on PATH)
    #[error("'{program}' not found on PATH")]
    ToolNotFound { program: String },

    /// The capture program ran but reported failure
    #[error("'{program}' exited with {}{}", exit_label(.code), stderr_suffix(.stderr))]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The attempt ran past its time budget and was terminated
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The method reported success but left no usable file behind
    #[error("no image written to '{}' (file missing or empty)", .path.display())]
    EmptyOrMissingOutput { path: PathBuf },

    /// The camera device could not be opened
    #[error("failed to open camera: {0}")]
    DeviceOpenFailure(String),

    /// Devices opened but never produced a valid frame
    #[error("no valid frame after {reads} read(s) across {devices} device(s)")]
    FrameReadFailure { devices: u32, reads: u32 },

    /// The camera library rejected a configure/start/capture call
    #[error("camera library error: {0}")]
    Library(String),

    /// Filesystem or process I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The method panicked; caught at the method boundary
    #[error("method panicked: {0}")]
    Panicked(String),
}

impl AttemptError {
    /// Stable short name of the failure kind, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::ToolNotFound { .. } => "tool-not-found",
            AttemptError::NonZeroExit { .. } => "non-zero-exit",
            AttemptError::Timeout(_) => "timeout",
            AttemptError::EmptyOrMissingOutput { .. } => "empty-or-missing-output",
            AttemptError::DeviceOpenFailure(_) => "device-open-failure",
            AttemptError::FrameReadFailure { .. } => "frame-read-failure",
            AttemptError::Library(_) => "library",
            AttemptError::Io(_) => "io",
            AttemptError::Panicked(_) => "panicked",
        }
    }
}

impl From<ToolError> for AttemptError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::NotFound { program } => AttemptError::ToolNotFound { program },
            ToolError::Timeout { after, .. } => AttemptError::Timeout(after),
            ToolError::Spawn { source, .. } => AttemptError::Io(source),
            ToolError::Io(source) => AttemptError::Io(source),
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_not_found_display() {
        let err = AttemptError::ToolNotFound {
            program: "libcamera-still".to_string(),
        };
        assert_eq!(format!("{}", err), "'libcamera-still' not found on PATH");
        assert_eq!(err.kind(), "tool-not-found");
    }

    #[test]
    fn test_non_zero_exit_display() {
        let err = AttemptError::NonZeroExit {
            program: "libcamera-still".to_string(),
            code: Some(255),
            stderr: "ERROR: no cameras available".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("code 255"));
        assert!(msg.contains("no cameras available"));
    }

    #[test]
    fn test_non_zero_exit_by_signal_without_stderr() {
        let err = AttemptError::NonZeroExit {
            program: "rpicam-still".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert_eq!(format!("{}", err), "'rpicam-still' exited with a signal");
    }

    #[test]
    fn test_empty_output_display() {
        let err = AttemptError::EmptyOrMissingOutput {
            path: PathBuf::from("/tmp/capture.jpg"),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("/tmp/capture.jpg"));
        assert!(msg.contains("missing or empty"));
    }

    #[test]
    fn test_tool_error_conversion() {
        let err: AttemptError = ToolError::Timeout {
            program: "sleep".to_string(),
            after: Duration::from_secs(10),
        }
        .into();
        assert!(matches!(err, AttemptError::Timeout(d) if d == Duration::from_secs(10)));

        let err: AttemptError = ToolError::NotFound {
            program: "nope".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "tool-not-found");
    }

    #[test]
    fn test_frame_read_failure_display() {
        let err = AttemptError::FrameReadFailure { devices: 3, reads: 15 };
        assert_eq!(
            format!("{}", err),
            "no valid frame after 15 read(s) across 3 device(s)"
        );
    }
}
