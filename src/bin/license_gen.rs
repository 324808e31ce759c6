/// License generation tool
///
/// Issues machine-bound license keys and provisions the encrypted
/// credentials used by online validation.
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;

use license_gate::LicenseError;
use license_gate::crypto::{asymmetric, symmetric};
use license_gate::utils::logging::init_tracing;
use license_gate::verification::{ArtifactHasher, codec, get_machine_fingerprint};

#[derive(Debug, Error)]
enum GenError {
    #[error(transparent)]
    License(#[from] LicenseError),

    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Input(String),
}

#[derive(Parser, Debug)]
#[command(name = "license-gen", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Issue a license key valid through the given day
    Issue {
        /// Expiry date as YYMMDD (prompted for when omitted)
        expiry: Option<String>,

        /// Machine code to bind to (default: this machine)
        #[arg(long)]
        machine_code: Option<String>,
    },

    /// Print this machine's code
    Fingerprint,

    /// Generate RSA keys and encrypt the online validation credentials
    Provision {
        /// Authorization server URL
        #[arg(long)]
        auth_url: String,

        /// Artifact whose hash unlocks the private key (default: license-gate next to this tool)
        #[arg(long)]
        artifact: Option<PathBuf>,

        /// RSA key size
        #[arg(long, default_value_t = asymmetric::DEFAULT_KEY_BITS)]
        bits: usize,
    },
}

const RULE: &str = "=========================================";

fn main() -> ExitCode {
    init_tracing("warn");
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Issue {
            expiry,
            machine_code,
        } => issue(expiry, machine_code),
        Commands::Fingerprint => {
            println!("{}", get_machine_fingerprint());
            Ok(())
        }
        Commands::Provision {
            auth_url,
            artifact,
            bits,
        } => provision(&auth_url, artifact, bits),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("License generation failed: {}", e);
            ExitCode::from(1)
        }
    }
}

fn issue(expiry: Option<String>, machine_code: Option<String>) -> Result<(), GenError> {
    let expiry = match expiry {
        Some(expiry) => expiry.trim().to_string(),
        None => prompt_expiry(io::stdin().lock())?,
    };
    let machine_code = machine_code.unwrap_or_else(get_machine_fingerprint);

    let license_key = codec::encode(&machine_code, &expiry)?;

    println!("{}", RULE);
    println!("License generated");
    println!("{}", RULE);
    println!("Machine code: {}", machine_code);
    println!("Expires:      {} 00:00:00 (YYMMDD, valid through that day)", expiry);
    println!("{}", RULE);
    println!("License key (copy into the config file):");
    println!("{}", license_key);
    println!("{}", RULE);
    println!();
    println!("Config snippet:");
    println!(
        "{}",
        serde_json::json!({ "license_enabled": true, "license_key": license_key })
    );
    println!("{}", RULE);
    Ok(())
}

fn prompt_expiry(mut input: impl BufRead) -> Result<String, GenError> {
    print!("Enter expiry date (YYMMDD, e.g. 250101): ");
    io::stdout().flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let expiry = line.trim().to_string();
    if expiry.is_empty() {
        return Err(GenError::Input("expiry date cannot be empty".to_string()));
    }
    Ok(expiry)
}

fn provision(auth_url: &str, artifact: Option<PathBuf>, bits: usize) -> Result<(), GenError> {
    let artifact = match artifact {
        Some(path) => path,
        None => sibling_gate_binary()?,
    };
    let artifact_hash = ArtifactHasher::for_path(&artifact).hash()?;

    eprintln!("Generating {}-bit RSA key pair...", bits);
    let pair = asymmetric::generate_key_pair(bits)?;
    let encrypted_auth_url = asymmetric::encrypt(auth_url, &pair.public_key)?;
    let encrypted_private_key = symmetric::encrypt(&pair.private_key, &artifact_hash)?;

    println!("{}", RULE);
    println!("Online validation credentials for {}", artifact.display());
    println!("Re-run this after every rebuild of the artifact.");
    println!("{}", RULE);
    println!(
        "{}",
        serde_json::json!({
            "online_license_enabled": true,
            "encrypted_auth_url": encrypted_auth_url,
            "encrypted_private_key": encrypted_private_key,
        })
    );
    println!("{}", RULE);
    println!("Public key (keep for re-encrypting the URL):");
    println!("{}", pair.public_key);
    Ok(())
}

fn sibling_gate_binary() -> Result<PathBuf, GenError> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().unwrap_or(Path::new("."));
    Ok(dir.join(format!("license-gate{}", std::env::consts::EXE_SUFFIX)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_reads_trimmed_line() {
        let input = io::Cursor::new("  991231 \n");
        assert_eq!(prompt_expiry(input).unwrap(), "991231");
    }

    #[test]
    fn test_prompt_rejects_empty() {
        let input = io::Cursor::new("\n");
        assert!(matches!(prompt_expiry(input), Err(GenError::Input(_))));
    }

    #[test]
    fn test_cli_parses_issue() {
        let cli = Cli::try_parse_from(["license-gen", "issue", "991231", "--machine-code", "abc"])
            .unwrap();
        match cli.command {
            Commands::Issue {
                expiry,
                machine_code,
            } => {
                assert_eq!(expiry.as_deref(), Some("991231"));
                assert_eq!(machine_code.as_deref(), Some("abc"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_provision_defaults() {
        let cli =
            Cli::try_parse_from(["license-gen", "provision", "--auth-url", "https://a/b"]).unwrap();
        match cli.command {
            Commands::Provision { bits, artifact, .. } => {
                assert_eq!(bits, asymmetric::DEFAULT_KEY_BITS);
                assert!(artifact.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_issue_rejects_bad_date() {
        let result = issue(Some("251340".to_string()), Some("abc".to_string()));
        assert!(matches!(
            result,
            Err(GenError::License(LicenseError::DateFormat(_)))
        ));
    }
}
