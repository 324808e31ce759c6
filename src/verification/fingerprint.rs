/// Machine fingerprinting for license binding
///
/// Every signal comes from a best-effort probe. A probe that fails
/// contributes nothing instead of aborting, so a fingerprint is always
/// produced.
use sha2::{Digest, Sha256};
use std::fs;
use std::process::Command;

use crate::utils::platform::detect_platform;

/// Raw signals that feed the fingerprint, in hashing order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSignals {
    pub mac_address: Option<String>,
    pub cpu_serial: Option<String>,
    pub board_serial: Option<String>,
    pub os_name: String,
    pub os_version: String,
    pub user_name: String,
}

impl DeviceSignals {
    /// Probe the current device
    pub fn collect() -> Self {
        Self {
            mac_address: get_mac_address(),
            cpu_serial: get_cpu_serial(),
            board_serial: get_board_serial(),
            os_name: std::env::consts::OS.to_string(),
            os_version: get_os_version(),
            user_name: get_user_name(),
        }
    }

    /// Concatenate the signals in fixed order
    pub fn concat(&self) -> String {
        let mut machine_id = String::new();
        for probe in [&self.mac_address, &self.cpu_serial, &self.board_serial]
            .into_iter()
            .flatten()
        {
            machine_id.push_str(probe);
        }
        machine_id.push_str(&self.os_name);
        machine_id.push_str(&self.os_version);
        machine_id.push_str(&self.user_name);
        machine_id
    }

    /// Hash the signals into a fingerprint
    ///
    /// # Returns
    /// 64-character lowercase hex SHA-256 digest
    pub fn fingerprint(&self) -> String {
        let mut machine_id = self.concat();
        if machine_id.is_empty() {
            machine_id = runtime_metadata();
        }
        let mut hasher = Sha256::new();
        hasher.update(machine_id.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Generate machine fingerprint for the current device
pub fn get_machine_fingerprint() -> String {
    let signals = DeviceSignals::collect();
    tracing::debug!(
        has_mac = signals.mac_address.is_some(),
        has_cpu_serial = signals.cpu_serial.is_some(),
        has_board_serial = signals.board_serial.is_some(),
        "collected device signals"
    );
    signals.fingerprint()
}

/// Weaker identity used when no signal could be read at all
fn runtime_metadata() -> String {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{}{}{}",
        detect_platform().name(),
        env!("CARGO_PKG_NAME"),
        hostname
    )
}

/// Normalize a MAC address to uppercase octets joined with `-`
///
/// Returns None for all-zero or unparsable addresses.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let octets: Vec<String> = raw
        .trim()
        .split([':', '-'])
        .map(|o| o.to_ascii_uppercase())
        .collect();
    if octets.len() != 6
        || octets
            .iter()
            .any(|o| o.len() != 2 || !o.chars().all(|c| c.is_ascii_hexdigit()))
    {
        return None;
    }
    if octets.iter().all(|o| o == "00") {
        return None;
    }
    Some(octets.join("-"))
}

/// MAC of the first non-loopback, non-virtual interface that is up
fn get_mac_address() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let mut names: Vec<String> = fs::read_dir("/sys/class/net")
            .ok()?
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        // read_dir order is unspecified
        names.sort();

        for name in names {
            if name == "lo" {
                continue;
            }
            if fs::metadata(format!("/sys/devices/virtual/net/{}", name)).is_ok() {
                continue;
            }
            let state = fs::read_to_string(format!("/sys/class/net/{}/operstate", name))
                .unwrap_or_default();
            if state.trim() != "up" {
                continue;
            }
            if let Ok(addr) = fs::read_to_string(format!("/sys/class/net/{}/address", name)) {
                if let Some(mac) = normalize_mac(&addr) {
                    return Some(mac);
                }
            }
        }
        None
    }

    #[cfg(target_os = "macos")]
    {
        let output = run_probe("ifconfig", &[])?;
        let mut current_ok = false;
        for line in output.lines() {
            if !line.starts_with(['\t', ' ']) {
                // Interface header, e.g. "en0: flags=8863<UP,BROADCAST,...>"
                current_ok = !line.starts_with("lo") && line.contains("<UP");
                continue;
            }
            if current_ok {
                if let Some(addr) = line.trim().strip_prefix("ether ") {
                    if let Some(mac) = normalize_mac(addr) {
                        return Some(mac);
                    }
                }
            }
        }
        None
    }

    #[cfg(windows)]
    {
        // CSV rows: "00-11-22-33-44-55","\Device\Tcpip_{...}"
        let output = run_probe("getmac", &["/fo", "csv", "/nh"])?;
        output.lines().find_map(|line| {
            let first = line.split(',').next()?.trim_matches('"');
            normalize_mac(first)
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
    {
        None
    }
}

fn get_cpu_serial() -> Option<String> {
    #[cfg(windows)]
    {
        wmic_value(&["cpu", "get", "ProcessorId"], "ProcessorId")
    }

    #[cfg(target_os = "macos")]
    {
        run_probe("sysctl", &["-n", "machdep.cpu.brand_string"])
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(not(any(windows, target_os = "macos")))]
    {
        // Only some ARM boards expose a serial here
        let cpuinfo = fs::read_to_string("/proc/cpuinfo").ok()?;
        cpuinfo
            .lines()
            .find(|l| l.starts_with("Serial"))
            .map(|l| l.trim().to_string())
    }
}

fn get_board_serial() -> Option<String> {
    #[cfg(windows)]
    {
        wmic_value(&["baseboard", "get", "serialnumber"], "SerialNumber")
    }

    #[cfg(target_os = "macos")]
    {
        run_probe("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"]).and_then(|output| {
            output
                .lines()
                .find(|l| l.contains("IOPlatformSerialNumber"))
                .and_then(|l| l.split('"').nth(3))
                .map(String::from)
        })
    }

    #[cfg(target_os = "linux")]
    {
        // Usually root-only; silently absent otherwise
        fs::read_to_string("/sys/class/dmi/id/board_serial")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(not(any(windows, target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn get_os_version() -> String {
    #[cfg(target_os = "macos")]
    {
        run_probe("sw_vers", &["-productVersion"])
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    #[cfg(target_os = "linux")]
    {
        fs::read_to_string("/proc/sys/kernel/osrelease")
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    #[cfg(windows)]
    {
        run_probe("cmd", &["/C", "ver"])
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", windows)))]
    {
        String::new()
    }
}

fn get_user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}

/// Run a probe command, None on spawn failure or non-zero exit
#[allow(dead_code)]
fn run_probe(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        tracing::debug!(program, "probe exited with {}", output.status);
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

#[cfg(windows)]
fn wmic_value(args: &[&str], header: &str) -> Option<String> {
    let output = run_probe("wmic", args)?;
    let value: String = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case(header))
        .collect();
    if value.is_empty() { None } else { Some(value) }
}
