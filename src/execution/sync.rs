/// Synchronous gating: verify license FIRST, then hand over to the protected command
use std::process::{Command, exit};
use tracing::{error, info};

use crate::verification::{LicenseValidator, PassMode};

/// Gate the current process
///
/// Flow:
/// 1. Run the validator (lockout terminates inside `enforce`)
/// 2. Failure → log the machine code to request a license for, exit(1)
/// 3. Success with a command → replace this process with it
/// 4. Success without a command → exit(0)
pub fn execute_sync(validator: &LicenseValidator, command: &[String]) -> ! {
    match validator.enforce() {
        Ok(mode) => {
            info!(?mode, "license gate passed");
        }
        Err(e) => {
            error!("license verification failed, startup blocked: {}", e);
            error!(
                machine_code = validator.fingerprint(),
                "generate a license for this machine code"
            );
            exit(1);
        }
    }

    match split_command(command) {
        Some((program, args)) => chain_to_command(program, args),
        None => exit(0),
    }
}

/// Split a trailing command into program and arguments
pub fn split_command(command: &[String]) -> Option<(&str, &[String])> {
    let (program, args) = command.split_first()?;
    if program.trim().is_empty() {
        return None;
    }
    Some((program.as_str(), args))
}

/// Chain execution to the protected command
/// This replaces the current process with the command
#[cfg(unix)]
fn chain_to_command(program: &str, args: &[String]) -> ! {
    use std::os::unix::process::CommandExt;

    info!(program, "executing protected command");

    let error = Command::new(program).args(args).exec();

    // If exec returns, it failed
    error!("failed to exec {}: {}", program, error);
    exit(1);
}

/// Chain execution to the protected command (Windows version)
/// Windows doesn't have exec(), so we spawn and propagate the exit code
#[cfg(not(unix))]
fn chain_to_command(program: &str, args: &[String]) -> ! {
    info!(program, "executing protected command");

    match Command::new(program).args(args).status() {
        Ok(exit_status) => exit(exit_status.code().unwrap_or(1)),
        Err(e) => {
            error!("failed to execute {}: {}", program, e);
            exit(1);
        }
    }
}
