//! Environment checks for the `doctor` command.
//!
//! On a Raspberry Pi the usual reasons a capture falls through the whole
//! chain are missing device permissions (user not in the `video` group) or
//! missing capture programs. Each check returns a [`PermissionCheckResult`]
//! with a remediation hint when it fails.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::{Config, GrabBackend};
use crate::devices;

/// What a check looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckSubject {
    /// Read/write access to a device node
    Device(PathBuf),
    /// Membership in the `video` group
    VideoGroup,
    /// A program on `PATH`
    Program(String),
}

impl fmt::Display for CheckSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckSubject::Device(path) => write!(f, "device {}", path.display()),
            CheckSubject::VideoGroup => write!(f, "video group"),
            CheckSubject::Program(name) => write!(f, "program '{}'", name),
        }
    }
}

/// Result of one check
#[derive(Debug)]
pub struct PermissionCheckResult {
    pub subject: CheckSubject,
    pub granted: bool,
    /// Additional details or error message
    pub details: Option<String>,
    /// How to fix a failed check
    pub hint: Option<&'static str>,
}

impl PermissionCheckResult {
    pub fn granted(subject: CheckSubject) -> Self {
        Self {
            subject,
            granted: true,
            details: None,
            hint: None,
        }
    }

    pub fn denied(subject: CheckSubject, details: Option<String>, hint: &'static str) -> Self {
        Self {
            subject,
            granted: false,
            details,
            hint: Some(hint),
        }
    }
}

const VIDEO_GROUP_HINT: &str = "sudo usermod -aG video $USER  (then log out and back in)";
const LIBCAMERA_HINT: &str = "sudo apt install libcamera-apps  (or rpicam-apps)";
const FFMPEG_HINT: &str = "sudo apt install ffmpeg";
const DETECTOR_HINT: &str = "pip install ultralytics";

/// Check that the current user can open `path` for reading and writing.
#[cfg(unix)]
pub fn check_device_access(path: &Path) -> PermissionCheckResult {
    use std::os::unix::ffi::OsStrExt;

    let subject = CheckSubject::Device(path.to_path_buf());
    let Ok(c_path) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return PermissionCheckResult::denied(
            subject,
            Some("Path contains a NUL byte".to_string()),
            VIDEO_GROUP_HINT,
        );
    };

    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call
    let rc = unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) };
    if rc == 0 {
        PermissionCheckResult::granted(subject)
    } else {
        let err = std::io::Error::last_os_error();
        PermissionCheckResult::denied(subject, Some(err.to_string()), VIDEO_GROUP_HINT)
    }
}

#[cfg(not(unix))]
pub fn check_device_access(path: &Path) -> PermissionCheckResult {
    match std::fs::OpenOptions::new().read(true).write(true).open(path) {
        Ok(_) => PermissionCheckResult::granted(CheckSubject::Device(path.to_path_buf())),
        Err(e) => PermissionCheckResult::denied(
            CheckSubject::Device(path.to_path_buf()),
            Some(e.to_string()),
            VIDEO_GROUP_HINT,
        ),
    }
}

/// Check that the current user is in the `video` group.
pub fn check_video_group() -> PermissionCheckResult {
    let output = Command::new("id")
        .arg("-nG")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let groups = String::from_utf8_lossy(&out.stdout);
            if parse_groups(&groups).any(|g| g == "video") {
                PermissionCheckResult::granted(CheckSubject::VideoGroup)
            } else {
                PermissionCheckResult::denied(
                    CheckSubject::VideoGroup,
                    Some(format!("Current groups: {}", groups.trim())),
                    VIDEO_GROUP_HINT,
                )
            }
        }
        Ok(out) => PermissionCheckResult::denied(
            CheckSubject::VideoGroup,
            Some(format!("'id -nG' exited with {}", out.status)),
            VIDEO_GROUP_HINT,
        ),
        Err(e) => PermissionCheckResult::denied(
            CheckSubject::VideoGroup,
            Some(format!("Failed to run 'id': {}", e)),
            VIDEO_GROUP_HINT,
        ),
    }
}

/// Split `id -nG` output into group names.
pub fn parse_groups(output: &str) -> impl Iterator<Item = &str> {
    output.split_whitespace()
}

/// Locate `program` in the directories of a `PATH`-style variable.
///
/// Programs given as a path (containing `/`) are checked directly.
pub fn find_in_path(program: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }

    std::env::split_paths(path_var?)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Check that `program` is on `PATH`.
pub fn check_tool_on_path(program: &str, hint: &'static str) -> PermissionCheckResult {
    let path_var = std::env::var_os("PATH");
    let subject = CheckSubject::Program(program.to_string());
    match find_in_path(program, path_var.as_deref()) {
        Some(found) => {
            log::debug!("Found {} at {}", program, found.display());
            PermissionCheckResult::granted(subject)
        }
        None => PermissionCheckResult::denied(subject, Some("Not found on PATH".to_string()), hint),
    }
}

/// Check that at least one of the still-capture programs is installed.
fn check_any_tool(programs: &[&str], hint: &'static str) -> PermissionCheckResult {
    let mut results: Vec<PermissionCheckResult> = programs
        .iter()
        .map(|p| check_tool_on_path(p, hint))
        .collect();
    match results.iter().position(|r| r.granted) {
        Some(i) => results.swap_remove(i),
        None => PermissionCheckResult::denied(
            CheckSubject::Program(programs.join(" / ")),
            Some("None found on PATH".to_string()),
            hint,
        ),
    }
}

/// Run every check relevant to `config`.
pub fn run_all_checks(config: &Config) -> Vec<PermissionCheckResult> {
    let mut results = Vec::new();

    let nodes = devices::list_video_nodes();
    if nodes.is_empty() {
        results.push(PermissionCheckResult::denied(
            CheckSubject::Device(PathBuf::from("/dev/video*")),
            Some("No V4L2 device nodes found".to_string()),
            "Check the camera cable and enable the camera interface",
        ));
    }
    for node in &nodes {
        results.push(check_device_access(&node.path));
    }

    results.push(check_video_group());

    let tool = &config.capture.tool;
    let mut programs = vec![tool.program.as_str()];
    programs.extend(tool.fallback_programs.iter().map(String::as_str));
    results.push(check_any_tool(&programs, LIBCAMERA_HINT));

    if config.capture.frame_grab.backend == GrabBackend::Ffmpeg {
        results.push(check_tool_on_path(&config.capture.frame_grab.ffmpeg, FFMPEG_HINT));
    }

    results.push(check_tool_on_path(&config.detection.program, DETECTOR_HINT));

    results
}

/// Print check results; returns the number of failed checks.
pub fn print_check_results(results: &[PermissionCheckResult]) -> usize {
    let mut failed = 0;
    for result in results {
        if result.granted {
            println!("  [ok]   {}", result.subject);
            continue;
        }
        failed += 1;
        println!("  [fail] {}", result.subject);
        if let Some(ref details) = result.details {
            println!("         {}", details);
        }
        if let Some(hint) = result.hint {
            println!("         fix: {}", hint);
        }
    }
    failed
}
