//! Bounded external-process execution.
//!
//! Capture tools (`libcamera-still`, `ffmpeg`) and the detector are all run
//! through [`run_with_timeout`]: output is drained on helper threads and the
//! child is polled until it exits and its pipes close, or the deadline
//! passes. An overdue child is terminated (SIGTERM, then SIGKILL after a
//! grace period).

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use super::errors::AttemptError;

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Maximum number of stderr characters kept in failure messages.
const STDERR_TAIL_CHARS: usize = 400;

/// Errors from running an external program.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("'{program}' not found on PATH")]
    NotFound { program: String },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {after:?}")]
    Timeout { program: String, after: Duration },

    #[error("I/O error while waiting for child: {0}")]
    Io(#[from] std::io::Error),
}

/// Collected result of a program that exited on its own.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    /// Stdout decoded lossily as text.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Run `program` with `args`, giving up after `timeout`.
///
/// The deadline covers the whole run, including draining stdout and stderr.
/// A child that exits while something it spawned still holds the pipes is
/// not finished until the pipes close. On timeout the child (and its process
/// group on Unix) receives SIGTERM, then SIGKILL if it is still alive after
/// `grace`. After a normal exit the group is killed so no background process
/// outlives the call.
pub fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    grace: Duration,
) -> Result<ToolOutput, ToolError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group so a timeout also reaches grandchildren
        cmd.process_group(0);
    }

    log::debug!("Running {} {}", program, args.join(" "));

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ToolError::NotFound {
                program: program.to_string(),
            }
        } else {
            ToolError::Spawn {
                program: program.to_string(),
                source: e,
            }
        }
    })?;

    let (tx, rx) = mpsc::channel();
    let mut readers = 0;
    if let Some(pipe) = child.stdout.take() {
        spawn_reader(pipe, Stream::Stdout, tx.clone());
        readers += 1;
    }
    if let Some(pipe) = child.stderr.take() {
        spawn_reader(pipe, Stream::Stderr, tx.clone());
        readers += 1;
    }
    drop(tx);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    log::debug!("{} exceeded {:?}, terminating", program, timeout);
                    terminate(&mut child, grace);
                    break None;
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                terminate(&mut child, Duration::ZERO);
                return Err(ToolError::Io(e));
            }
        }
    };

    let timed_out = ToolError::Timeout {
        program: program.to_string(),
        after: timeout,
    };

    let Some(status) = status else {
        // The group is dead; give the readers a moment to see EOF
        let _ = collect_output(&rx, readers, Instant::now() + grace.max(POLL_INTERVAL));
        return Err(timed_out);
    };

    let collected = collect_output(&rx, readers, deadline);
    kill_group(&child, Signal::Kill);

    match collected {
        Some((stdout, stderr)) => Ok(ToolOutput {
            status,
            stdout,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        }),
        None => {
            log::debug!(
                "{} exited but its output stayed open past {:?}",
                program,
                timeout
            );
            Err(timed_out)
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn spawn_reader<R: Read + Send + 'static>(
    mut pipe: R,
    stream: Stream,
    tx: Sender<(Stream, Vec<u8>)>,
) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            log::debug!("Reading child {:?} failed: {}", stream, e);
        }
        let _ = tx.send((stream, buf));
    });
}

/// Wait for `readers` pipes to reach EOF, up to `deadline`.
fn collect_output(
    rx: &Receiver<(Stream, Vec<u8>)>,
    readers: usize,
    deadline: Instant,
) -> Option<(Vec<u8>, Vec<u8>)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    for _ in 0..readers {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((Stream::Stdout, buf)) => stdout = buf,
            Ok((Stream::Stderr, buf)) => stderr = buf,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Some((stdout, stderr))
}

enum Signal {
    Term,
    Kill,
}

/// Signal every process in the child's group.
#[cfg(unix)]
fn kill_group(child: &Child, signal: Signal) {
    let pgid = child.id() as libc::pid_t;
    let signal = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // SAFETY: plain syscall; a vanished group only yields ESRCH
    unsafe {
        libc::kill(-pgid, signal);
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child, _signal: Signal) {}

/// Ask the child to stop, escalate to a hard kill, then reap it.
fn terminate(child: &mut Child, grace: Duration) {
    kill_group(child, Signal::Term);

    let start = Instant::now();
    while start.elapsed() < grace {
        if let Ok(Some(_)) = child.try_wait() {
            // Leader is gone; make sure nothing else in the group survives
            kill_group(child, Signal::Kill);
            return;
        }
        thread::sleep(POLL_INTERVAL.min(grace));
    }

    kill_group(child, Signal::Kill);
    let _ = child.kill();
    let _ = child.wait();
}

/// Last few hundred characters of stderr, trimmed, for log lines.
pub fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect();
    format!("...{}", tail)
}

/// Substitute `{key}` placeholders in an argument template.
pub fn expand_args(template: &[String], vars: &[(&str, String)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (key, value)| {
                acc.replace(&format!("{{{}}}", key), value)
            })
        })
        .collect()
}

/// A still-capture program such as `libcamera-still`, run once per attempt.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    name: String,
    program: String,
    fallback_programs: Vec<String>,
    args: Vec<String>,
    timeout: Duration,
    grace: Duration,
}

impl ExternalTool {
    /// Create a tool invocation. `args` may contain `{output}`, which is
    /// replaced by the destination path on each attempt.
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            name: "tool".to_string(),
            program: program.into(),
            fallback_programs: Vec::new(),
            args,
            timeout,
            grace: Duration::from_millis(500),
        }
    }

    /// Set the name reported in logs and results.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Programs tried, in order, when the primary program is not installed.
    pub fn with_fallback_programs(mut self, programs: Vec<String>) -> Self {
        self.fallback_programs = programs;
        self
    }

    /// Time allowed between SIGTERM and SIGKILL on timeout.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arguments for a capture into `dest`.
    pub fn args_for(&self, dest: &Path) -> Vec<String> {
        expand_args(&self.args, &[("output", dest.display().to_string())])
    }

    /// Run the tool once, writing into `dest`.
    pub fn attempt(&self, dest: &Path) -> Result<(), AttemptError> {
        let args = self.args_for(dest);
        let mut missing = Vec::new();

        for program in std::iter::once(&self.program).chain(self.fallback_programs.iter()) {
            match run_with_timeout(program, &args, self.timeout, self.grace) {
                Err(ToolError::NotFound { program }) => {
                    log::debug!("{} is not installed", program);
                    missing.push(program);
                }
                Err(e) => return Err(e.into()),
                Ok(output) if output.status.success() => return Ok(()),
                Ok(output) => {
                    return Err(AttemptError::NonZeroExit {
                        program: program.clone(),
                        code: output.status.code(),
                        stderr: stderr_tail(&output.stderr),
                    })
                }
            }
        }

        Err(AttemptError::ToolNotFound {
            program: missing.join("', '"),
        })
    }
}
