//! Camera discovery.
//!
//! Two views of the attached cameras: V4L2 device nodes under `/dev`, and
//! the sensors libcamera reports through `libcamera-hello --list-cameras`
//! (or `rpicam-hello` on newer releases).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::tool::{run_with_timeout, ToolError};

/// A V4L2 device node such as `/dev/video0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoNode {
    pub index: u32,
    pub path: PathBuf,
}

/// A camera reported by libcamera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    pub index: u32,
    /// Sensor model, e.g. `imx219`
    pub sensor: String,
    /// Maximum resolution, when listed
    pub resolution: Option<(u32, u32)>,
    /// Device-tree path of the sensor
    pub id: Option<String>,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.index, self.sensor)?;
        if let Some((w, h)) = self.resolution {
            write!(f, " {}x{}", w, h)?;
        }
        if let Some(id) = &self.id {
            write!(f, " ({})", id)?;
        }
        Ok(())
    }
}

/// Programs that can list libcamera cameras, in preference order.
pub const LIST_PROGRAMS: [&str; 2] = ["libcamera-hello", "rpicam-hello"];

/// List `/dev/video*` nodes, sorted by index.
pub fn list_video_nodes() -> Vec<VideoNode> {
    list_video_nodes_in(Path::new("/dev"))
}

/// List `video<N>` nodes inside `dir`, sorted by index.
pub fn list_video_nodes_in(dir: &Path) -> Vec<VideoNode> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot read {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut nodes: Vec<VideoNode> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name();
            let index = parse_video_node_name(name.to_str()?)?;
            Some(VideoNode {
                index,
                path: entry.path(),
            })
        })
        .collect();
    nodes.sort_by_key(|n| n.index);
    nodes
}

/// `video12` -> `Some(12)`; anything else -> `None`.
pub fn parse_video_node_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("video")?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Ask libcamera for the attached cameras.
///
/// # Errors
/// Returns the last tool error if no listing program could be run.
pub fn list_libcamera_cameras() -> Result<Vec<CameraInfo>, ToolError> {
    let args = vec!["--list-cameras".to_string()];
    let mut last_error = None;

    for program in LIST_PROGRAMS {
        match run_with_timeout(program, &args, Duration::from_secs(10), Duration::from_millis(200)) {
            Ok(output) => {
                // Listing goes to stdout on current releases, stderr on older ones
                let text = format!("{}\n{}", output.stdout_text(), output.stderr);
                return Ok(parse_camera_list(&text));
            }
            Err(e) => {
                log::debug!("{} unavailable: {}", program, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or(ToolError::NotFound {
        program: LIST_PROGRAMS.join(", "),
    }))
}

/// Parse `--list-cameras` output.
pub fn parse_camera_list(output: &str) -> Vec<CameraInfo> {
    output.lines().filter_map(parse_camera_line).collect()
}

/// Parse one camera line.
///
/// Example: `0 : imx219 [3280x2464] (/base/soc/i2c0mux/i2c@1/imx219@10)`
pub fn parse_camera_line(line: &str) -> Option<CameraInfo> {
    let (index, rest) = line.trim().split_once(" : ")?;
    let index: u32 = index.trim().parse().ok()?;
    let rest = rest.trim();

    let sensor = rest.split_whitespace().next()?.to_string();

    let resolution = rest
        .find('[')
        .zip(rest.find(']'))
        .and_then(|(open, close)| rest.get(open + 1..close))
        .and_then(parse_resolution);

    let id = rest
        .rfind('(')
        .zip(rest.rfind(')'))
        .and_then(|(open, close)| rest.get(open + 1..close))
        .map(str::to_string);

    Some(CameraInfo {
        index,
        sensor,
        resolution,
        id,
    })
}

fn parse_resolution(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.split_once('x')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

/// Print discovered devices to stdout.
pub fn print_devices(nodes: &[VideoNode], cameras: Result<&[CameraInfo], &ToolError>) {
    println!("V4L2 Devices:");
    if nodes.is_empty() {
        println!("  (none found)");
    } else {
        for node in nodes {
            println!("  [{}] {}", node.index, node.path.display());
        }
    }
    println!();

    println!("libcamera Cameras:");
    match cameras {
        Ok([]) => println!("  (none found)"),
        Ok(cameras) => {
            for camera in cameras {
                println!("  {}", camera);
            }
        }
        Err(e) => println!("  (unavailable: {})", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_video_node_name() {
        assert_eq!(parse_video_node_name("video0"), Some(0));
        assert_eq!(parse_video_node_name("video14"), Some(14));
        assert_eq!(parse_video_node_name("video"), None);
        assert_eq!(parse_video_node_name("video0p1"), None);
        assert_eq!(parse_video_node_name("media0"), None);
    }

    #[test]
    fn test_list_video_nodes_in_sorts_by_index() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["video10", "video2", "media0", "video0"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let nodes = list_video_nodes_in(dir.path());
        let indices: Vec<u32> = nodes.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![0, 2, 10]);
        assert_eq!(nodes[0].path, dir.path().join("video0"));
    }

    #[test]
    fn test_list_video_nodes_in_missing_dir() {
        assert!(list_video_nodes_in(Path::new("/nonexistent/picam-detect")).is_empty());
    }

    #[test]
    fn test_parse_camera_line() {
        let camera =
            parse_camera_line("0 : imx219 [3280x2464] (/base/soc/i2c0mux/i2c@1/imx219@10)")
                .unwrap();
        assert_eq!(camera.index, 0);
        assert_eq!(camera.sensor, "imx219");
        assert_eq!(camera.resolution, Some((3280, 2464)));
        assert_eq!(
            camera.id.as_deref(),
            Some("/base/soc/i2c0mux/i2c@1/imx219@10")
        );
    }

    #[test]
    fn test_parse_camera_line_with_bit_depth() {
        let camera = parse_camera_line(
            "1 : imx708_wide [4608x2592 10-bit RGGB] (/base/axi/pcie@120000/rp1/i2c@88000/imx708@1a)",
        )
        .unwrap();
        assert_eq!(camera.index, 1);
        assert_eq!(camera.sensor, "imx708_wide");
        assert_eq!(camera.resolution, None);
    }

    #[test]
    fn test_parse_camera_list() {
        let output = r#"Available cameras
-----------------
0 : imx219 [3280x2464] (/base/soc/i2c0mux/i2c@1/imx219@10)
    Modes: 'SRGGB10_CSI2P' : 640x480 [206.65 fps - (1000, 752)/1280x960 crop]
                             1640x1232 [41.85 fps - (0, 0)/3280x2464 crop]
"#;
        let cameras = parse_camera_list(output);
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].sensor, "imx219");
        assert_eq!(format!("{}", cameras[0]), "[0] imx219 3280x2464 (/base/soc/i2c0mux/i2c@1/imx219@10)");
    }

    #[test]
    fn test_parse_camera_list_none() {
        assert!(parse_camera_list("No cameras available!").is_empty());
    }
}
