//! CLI enum types.

use clap::ValueEnum;

use crate::capture::MethodKind;

/// Capture method selectable with `--method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    /// External still-capture program
    Tool,
    /// Camera library session
    Library,
    /// Frame grab across device indices
    FrameGrab,
}

impl From<MethodArg> for MethodKind {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Tool => MethodKind::Tool,
            MethodArg::Library => MethodKind::Library,
            MethodArg::FrameGrab => MethodKind::FrameGrab,
        }
    }
}
