/// License Gate - verifies the machine license before starting a command
///
/// 1. Load `<exe>.config` (or `--config`)
/// 2. Fingerprint this machine
/// 3. Online check with local fallback; lockout terminates
/// 4. On success, exec the command given after `--`
use clap::Parser;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};

use license_gate::config::{load_config, load_config_from};
use license_gate::execution::execute_sync;
use license_gate::utils::logging::init_tracing;
use license_gate::{LicenseValidator, get_machine_fingerprint};

#[derive(Parser, Debug)]
#[command(name = "license-gate", version, about)]
struct Args {
    /// Configuration file (default: <executable>.config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Command to run once the license is verified
    #[arg(last = true)]
    command: Vec<String>,
}

fn main() {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };

    let config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            init_tracing("info");
            error!("failed to load configuration: {}", e);
            exit(1);
        }
    };

    init_tracing(&config.log_level);
    info!(app = %config.app_name, pid = std::process::id(), "license gate starting");

    let fingerprint = get_machine_fingerprint();
    info!(machine_code = %fingerprint, "current machine code");

    let validator = match LicenseValidator::new(&config, fingerprint) {
        Ok(validator) => validator,
        Err(e) => {
            error!("failed to initialize license validator: {}", e);
            exit(1);
        }
    };

    execute_sync(&validator, &args.command);
}
