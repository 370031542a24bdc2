//! Subcommand handlers. Each returns the process exit code.

use std::path::{Path, PathBuf};

use super::args::ConfigAction;
use super::enums::MethodArg;
use crate::capture::{CaptureChain, CaptureResult, MethodKind};
use crate::config::{CaptureConfig, Config, DEFAULT_CONFIG_TEMPLATE};
use crate::detect::Detector;
use crate::devices;
use crate::permissions;

/// Apply `capture` flags on top of the loaded configuration.
pub fn apply_capture_overrides(
    config: &mut CaptureConfig,
    output: Option<PathBuf>,
    methods: &[MethodArg],
    timeout: Option<u64>,
) {
    if let Some(output) = output {
        config.output = output;
    }
    if !methods.is_empty() {
        config.methods = methods.iter().copied().map(MethodKind::from).collect();
    }
    if let Some(timeout) = timeout {
        config.tool.timeout_secs = timeout;
    }
}

/// Run the capture chain and report the result.
pub fn capture(config: &CaptureConfig, json: bool) -> i32 {
    let result = run_chain(config);

    if json {
        print_json(&result);
    } else if result.success {
        println!(
            "Captured {} ({} bytes, method '{}')",
            result.path.display(),
            result.bytes,
            result.method.as_deref().unwrap_or("?")
        );
    } else {
        print_failures(&result);
    }

    if result.success {
        0
    } else {
        1
    }
}

fn run_chain(config: &CaptureConfig) -> CaptureResult {
    if let Some(parent) = config.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            log::warn!("Could not create {}: {}", parent.display(), e);
        }
    }
    CaptureChain::from_config(config).run(&config.output)
}

fn print_failures(result: &CaptureResult) {
    eprintln!("Capture failed: {}", result.message);
    for failure in &result.failures {
        eprintln!("  {} [{}]: {}", failure.method, failure.kind, failure.reason);
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}

/// Capture unless `image` is given, then run the detector on the image.
pub fn detect(config: &Config, image: Option<&Path>, json: bool) -> i32 {
    let image = match image {
        Some(image) => image.to_path_buf(),
        None => {
            let result = run_chain(&config.capture);
            if !result.success {
                print_failures(&result);
                return 1;
            }
            result.path
        }
    };

    let detector = Detector::new(config.detection.clone());
    match detector.detect(&image) {
        Ok(report) => {
            if json {
                print_json(&report);
            } else {
                println!("{}: {} {}(s)", report.image.display(), report.count, report.label);
                if let Some(annotated) = &report.annotated {
                    println!("Annotated image: {}", annotated.display());
                }
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// List V4L2 nodes and libcamera cameras.
pub fn list_devices() -> i32 {
    let nodes = devices::list_video_nodes();
    let cameras = devices::list_libcamera_cameras();
    devices::print_devices(&nodes, cameras.as_deref());

    if nodes.is_empty() && !matches!(cameras.as_deref(), Ok([_, ..])) {
        println!();
        println!("No cameras found. Check the ribbon cable and that the camera is enabled.");
    }
    0
}

/// Print environment checks; exit 1 when any fails.
pub fn doctor(config: &Config) -> i32 {
    println!("Environment checks:");
    let results = permissions::run_all_checks(config);
    let failed = permissions::print_check_results(&results);
    println!();
    if failed == 0 {
        println!("All checks passed.");
        0
    } else {
        println!("{} check(s) failed.", failed);
        1
    }
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, config_path: &Path) -> i32 {
    match action {
        ConfigAction::Show => {
            let config = match Config::load(Some(config_path)) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return 1;
                }
            };
            match config.to_toml() {
                Ok(text) => {
                    println!("Current configuration:");
                    println!();
                    print!("{}", text);
                    println!();
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return 1;
                }
            }

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
            0
        }
        ConfigAction::Init => match init_config(config_path) {
            Ok(()) => {
                println!("Created config file: {}", config_path.display());
                0
            }
            Err(e) => {
                eprintln!("{}", e);
                1
            }
        },
    }
}

/// Write the default config file, refusing to overwrite an existing one.
pub fn init_config(config_path: &Path) -> Result<(), String> {
    if config_path.exists() {
        return Err(format!(
            "Config file already exists: {}\nUse 'picam-detect config show' to view current settings.",
            config_path.display()
        ));
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Error creating config directory: {}", e))?;
    }

    std::fs::write(config_path, DEFAULT_CONFIG_TEMPLATE)
        .map_err(|e| format!("Error writing config file: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_overrides_replace_configured_values() {
        let mut config = CaptureConfig::default();
        apply_capture_overrides(
            &mut config,
            Some(PathBuf::from("/tmp/out.jpg")),
            &[MethodArg::FrameGrab, MethodArg::Library],
            Some(3),
        );
        assert_eq!(config.output, PathBuf::from("/tmp/out.jpg"));
        assert_eq!(config.methods, vec![MethodKind::FrameGrab, MethodKind::Library]);
        assert_eq!(config.tool.timeout_secs, 3);
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let mut config = CaptureConfig::default();
        apply_capture_overrides(&mut config, None, &[], None);
        assert_eq!(config, CaptureConfig::default());
    }

    #[test]
    fn test_init_config_writes_template() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        init_config(&path).unwrap();
        let loaded = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[capture]\n").unwrap();
        let err = init_config(&path).unwrap_err();
        assert!(err.contains("already exists"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[capture]\n");
    }

    #[test]
    fn test_detect_with_missing_image_fails() {
        let config = Config::default();
        assert_eq!(detect(&config, Some(Path::new("/nonexistent/x.jpg")), false), 1);
    }
}
