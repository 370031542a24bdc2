//! Config files drive chain construction.

use picam_detect::capture::{CaptureChain, CaptureMethod, MethodKind};
use picam_detect::config::{Config, ConfigError};
use tempfile::TempDir;

#[test]
fn test_configured_order_and_subset() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[capture]
output = "/var/lib/picam/latest.jpg"
methods = ["frame-grab", "tool"]

[capture.tool]
program = "rpicam-still"
fallback_programs = []
timeout_secs = 4

[capture.frame_grab]
device_count = 1
"#,
    )
    .unwrap();

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.capture.methods, vec![MethodKind::FrameGrab, MethodKind::Tool]);
    assert_eq!(config.capture.frame_grab.policy().device_count, 1);
    assert_eq!(config.capture.frame_grab.read_attempts, 5);

    let chain = CaptureChain::from_config(&config.capture);
    let names: Vec<&str> = chain.methods().iter().map(CaptureMethod::name).collect();
    assert_eq!(names, vec!["frame-grab", "tool"]);

    match &chain.methods()[1] {
        CaptureMethod::ExternalTool(tool) => {
            assert_eq!(tool.program(), "rpicam-still");
            assert_eq!(tool.timeout().as_secs(), 4);
        }
        other => panic!("Expected ExternalTool, got {:?}", other),
    }
}

#[test]
fn test_invalid_file_is_reported_not_defaulted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[capture]\nmethods = []\n").unwrap();

    assert!(matches!(
        Config::load(Some(path.as_path())),
        Err(ConfigError::Invalid(_))
    ));
}
