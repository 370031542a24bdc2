//! Outcome of a chain run.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::errors::AttemptError;

/// One failed attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub method: String,
    pub kind: &'static str,
    pub reason: String,
}

impl AttemptRecord {
    pub fn new(method: &str, error: &AttemptError) -> Self {
        Self {
            method: method.to_string(),
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}

/// Result of running the capture chain.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureResult {
    pub success: bool,
    /// Name of the method that produced the file
    pub method: Option<String>,
    /// Size of the produced file (0 on failure)
    pub bytes: u64,
    pub message: String,
    pub path: PathBuf,
    /// Failures in the order they happened
    pub failures: Vec<AttemptRecord>,
}

impl CaptureResult {
    pub fn succeeded(method: &str, bytes: u64, path: &Path, failures: Vec<AttemptRecord>) -> Self {
        Self {
            success: true,
            method: Some(method.to_string()),
            bytes,
            message: format!("captured {} bytes with '{}'", bytes, method),
            path: path.to_path_buf(),
            failures,
        }
    }

    pub fn exhausted(path: &Path, failures: Vec<AttemptRecord>) -> Self {
        Self {
            success: false,
            method: None,
            bytes: 0,
            message: format!("no method succeeded ({} tried)", failures.len()),
            path: path.to_path_buf(),
            failures,
        }
    }

    /// Names of every method that ran, in order.
    pub fn attempted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.failures.iter().map(|f| f.method.as_str()).collect();
        if let Some(method) = &self.method {
            names.push(method);
        }
        names
    }
}
