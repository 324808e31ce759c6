/// Build script to load environment variables from .env file
/// This allows compile-time injection of the online validation credentials

const INJECTED_KEYS: &[&str] = &[
    "LICENSE_GATE_ENCRYPTED_AUTH_URL",
    "LICENSE_GATE_ENCRYPTED_PRIVATE_KEY",
];

fn main() {
    for key in INJECTED_KEYS {
        println!("cargo:rerun-if-env-changed={}", key);
    }

    let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") else {
        return;
    };
    let env_path = std::path::Path::new(&manifest_dir).join(".env");
    if !env_path.exists() {
        return;
    }
    println!("cargo:rerun-if-changed={}", env_path.display());

    // Read .env file manually (avoid extra dependencies in build script)
    let Ok(contents) = std::fs::read_to_string(&env_path) else {
        return;
    };

    for line in contents.lines() {
        let line = line.trim();

        // Skip comments and empty lines
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Parse KEY=VALUE format
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');

            if INJECTED_KEYS.contains(&key) && !value.is_empty() {
                println!("cargo:rustc-env={}={}", key, value);
                println!("cargo:warning=embedding {} from .env", key);
            }
        }
    }
}
