use clap::Parser;

use picam_detect::cli::{self, Args, Command, ConfigAction};
use picam_detect::config::{self, Config};

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    // RUST_LOG, when set, overrides the -v level
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn load_config(path: Option<&std::path::Path>) -> Config {
    // An explicit --config must exist; the default location may be absent
    if let Some(path) = path {
        if !path.exists() {
            eprintln!("Error: config file not found: {}", path.display());
            std::process::exit(1);
        }
    }
    match Config::load(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let config_path = args.config.clone().unwrap_or_else(config::default_path);

    let code = match args.command {
        Command::Config { action } => {
            if matches!(action, ConfigAction::Show) && args.config.is_some() && !config_path.exists() {
                eprintln!("Error: config file not found: {}", config_path.display());
                std::process::exit(1);
            }
            cli::handle_config_action(action, &config_path)
        }
        Command::Capture {
            output,
            methods,
            timeout,
            json,
        } => {
            let mut cfg = load_config(args.config.as_deref());
            cli::apply_capture_overrides(&mut cfg.capture, output, &methods, timeout);
            cli::capture(&cfg.capture, json)
        }
        Command::Detect {
            image,
            output,
            confidence,
            json,
        } => {
            let mut cfg = load_config(args.config.as_deref());
            cli::apply_capture_overrides(&mut cfg.capture, output, &[], None);
            if let Some(confidence) = confidence {
                cfg.detection.confidence = confidence;
            }
            cli::detect(&cfg, image.as_deref(), json)
        }
        Command::ListDevices => cli::list_devices(),
        Command::Doctor => {
            let cfg = load_config(args.config.as_deref());
            cli::doctor(&cfg)
        }
    };

    std::process::exit(code);
}
