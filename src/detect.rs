//! Object detection through an external detector command.
//!
//! The detector (by default the ultralytics `yolo` CLI) is opaque: it gets an
//! image path and a confidence threshold, saves an annotated copy, and prints
//! a summary line per image such as
//!
//! ```text
//! image 1/1 /home/pi/capture.jpg: 480x640 2 persons, 1 dog, 41.0ms
//! ```
//!
//! This module runs it with a timeout and counts the configured label.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::capture::tool::{expand_args, run_with_timeout, stderr_tail, ToolError};
use crate::config::DetectionConfig;

/// Errors from a detection run.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("Input image '{}' does not exist", .0.display())]
    MissingImage(PathBuf),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Detector exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("Detector output has no summary line")]
    UnparsableOutput,
}

/// What the detector found.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub image: PathBuf,
    pub label: String,
    pub count: usize,
    /// Annotated copy written by the detector, when present
    pub annotated: Option<PathBuf>,
}

/// Runs the configured detector command.
#[derive(Debug, Clone)]
pub struct Detector {
    config: DetectionConfig,
}

impl Detector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Arguments for one run against `image`.
    pub fn args_for(&self, image: &Path) -> Vec<String> {
        expand_args(
            &self.config.args,
            &[
                ("model", self.config.model.clone()),
                ("input", image.display().to_string()),
                ("confidence", self.config.confidence.to_string()),
                ("project", self.config.output_dir.display().to_string()),
            ],
        )
    }

    /// Where the detector saves the annotated copy of `image`.
    pub fn annotated_path(&self, image: &Path) -> Option<PathBuf> {
        let name = image.file_name()?;
        Some(self.config.output_dir.join("detect").join(name))
    }

    pub fn detect(&self, image: &Path) -> Result<DetectionReport, DetectError> {
        if !image.is_file() {
            return Err(DetectError::MissingImage(image.to_path_buf()));
        }

        log::info!(
            "Running detector '{}' on {} (confidence {})",
            self.config.program,
            image.display(),
            self.config.confidence
        );

        let output = run_with_timeout(
            &self.config.program,
            &self.args_for(image),
            Duration::from_secs(self.config.timeout_secs),
            Duration::from_secs(1),
        )?;

        if !output.status.success() {
            return Err(DetectError::Failed {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        // ultralytics logs to stdout or stderr depending on version
        let combined = format!("{}\n{}", output.stdout_text(), output.stderr);
        let count = parse_detection_summary(&combined, &self.config.label)
            .ok_or(DetectError::UnparsableOutput)?;

        let annotated = self.annotated_path(image).filter(|p| p.is_file());
        log::info!("Detected {} {}(s)", count, self.config.label);

        Ok(DetectionReport {
            image: image.to_path_buf(),
            label: self.config.label.clone(),
            count,
            annotated,
        })
    }
}

/// Count `label` detections in detector output.
///
/// Returns `None` when no summary line is present. Counts are summed when
/// the output covers several images.
pub fn parse_detection_summary(output: &str, label: &str) -> Option<usize> {
    let mut found = false;
    let mut total = 0;

    for line in output.lines() {
        let Some(summary) = summary_part(line) else {
            continue;
        };
        found = true;
        total += count_label(summary, label);
    }

    found.then_some(total)
}

/// The part of an `image i/n path: ...` line after the path.
fn summary_part(line: &str) -> Option<&str> {
    let line = line.trim();
    if !line.starts_with("image ") {
        return None;
    }
    let (_, rest) = line.rsplit_once(": ")?;
    Some(rest.trim())
}

fn count_label(summary: &str, label: &str) -> usize {
    if summary.contains("(no detections)") {
        return 0;
    }

    let plural = format!("{}s", label);
    summary
        .split(", ")
        .filter_map(|item| {
            // The first item also carries the image shape: "480x640 2 persons"
            let words: Vec<&str> = item.split_whitespace().collect();
            let at = words.iter().position(|w| w.parse::<usize>().is_ok())?;
            let count: usize = words[at].parse().ok()?;
            let name = words[at + 1..].join(" ");
            (name == label || name == plural).then_some(count)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plural_and_other_labels() {
        let out = "image 1/1 /home/pi/capture.jpg: 480x640 2 persons, 1 dog, 41.0ms\nSpeed: 1.0ms preprocess";
        assert_eq!(parse_detection_summary(out, "person"), Some(2));
        assert_eq!(parse_detection_summary(out, "dog"), Some(1));
        assert_eq!(parse_detection_summary(out, "cat"), Some(0));
    }

    #[test]
    fn test_parse_singular() {
        let out = "image 1/1 /tmp/a.jpg: 640x480 1 person, 85.3ms";
        assert_eq!(parse_detection_summary(out, "person"), Some(1));
    }

    #[test]
    fn test_parse_no_detections() {
        let out = "image 1/1 /tmp/a.jpg: 640x480 (no detections), 80.1ms";
        assert_eq!(parse_detection_summary(out, "person"), Some(0));
    }

    #[test]
    fn test_parse_does_not_cross_match_labels() {
        let out = "image 1/1 /tmp/a.jpg: 640x480 3 personals, 2 persons, 12.0ms";
        assert_eq!(parse_detection_summary(out, "person"), Some(2));
    }

    #[test]
    fn test_parse_multi_word_label() {
        let out = "image 1/1 /tmp/a.jpg: 640x480 1 person, 2 cell phones, 12.0ms";
        assert_eq!(parse_detection_summary(out, "cell phone"), Some(2));
        assert_eq!(parse_detection_summary(out, "phone"), Some(0));
    }

    #[test]
    fn test_parse_path_with_colon() {
        let out = "image 1/1 /tmp/run: 2/a.jpg: 640x480 4 persons, 12.0ms";
        assert_eq!(parse_detection_summary(out, "person"), Some(4));
    }

    #[test]
    fn test_parse_sums_multiple_images() {
        let out = "image 1/2 /tmp/a.jpg: 640x480 1 person, 9.0ms\nimage 2/2 /tmp/b.jpg: 640x480 2 persons, 9.0ms";
        assert_eq!(parse_detection_summary(out, "person"), Some(3));
    }

    #[test]
    fn test_parse_without_summary() {
        assert_eq!(parse_detection_summary("Ultralytics 8.1.0\nno results", "person"), None);
    }

    #[test]
    fn test_args_for_substitutes_placeholders() {
        let detector = Detector::new(DetectionConfig::default());
        let args = detector.args_for(Path::new("/tmp/capture.jpg"));
        assert!(args.contains(&"source=/tmp/capture.jpg".to_string()));
        assert!(args.contains(&"conf=0.5".to_string()));
        assert!(args.contains(&"model=yolov8n.pt".to_string()));
        assert!(args.contains(&"project=detections".to_string()));
    }

    #[test]
    fn test_annotated_path() {
        let detector = Detector::new(DetectionConfig::default());
        assert_eq!(
            detector.annotated_path(Path::new("/tmp/capture.jpg")),
            Some(PathBuf::from("detections/detect/capture.jpg"))
        );
    }

    #[test]
    fn test_missing_image() {
        let detector = Detector::new(DetectionConfig::default());
        assert!(matches!(
            detector.detect(Path::new("/nonexistent/picam.jpg")),
            Err(DetectError::MissingImage(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_detect_with_scripted_detector() {
        let dir = tempfile::TempDir::new().unwrap();
        let image = dir.path().join("capture.jpg");
        std::fs::write(&image, b"jpeg").unwrap();

        let config = DetectionConfig {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo \"image 1/1 $1: 480x640 3 persons, 40.0ms\"".to_string(),
                "sh".to_string(),
                "{input}".to_string(),
            ],
            output_dir: dir.path().join("out"),
            timeout_secs: 5,
            ..DetectionConfig::default()
        };
        let report = Detector::new(config).detect(&image).unwrap();
        assert_eq!(report.count, 3);
        assert_eq!(report.label, "person");
        assert!(report.annotated.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_detector_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let image = dir.path().join("capture.jpg");
        std::fs::write(&image, b"jpeg").unwrap();

        let config = DetectionConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo 'model not found' >&2; exit 2".to_string()],
            timeout_secs: 5,
            ..DetectionConfig::default()
        };
        match Detector::new(config).detect(&image) {
            Err(DetectError::Failed { code, stderr }) => {
                assert_eq!(code, Some(2));
                assert_eq!(stderr, "model not found");
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
    }
}
