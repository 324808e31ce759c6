/// Content hashing of the running artifact for tamper detection
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{LicenseError, LicenseResult};

/// Hashes the artifact whose integrity keys the online secrets
#[derive(Debug, Clone, Default)]
pub struct ArtifactHasher {
    path: Option<PathBuf>,
}

impl ArtifactHasher {
    /// Hash the currently running executable
    pub fn current_exe() -> Self {
        Self { path: None }
    }

    /// Hash a specific file
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Compute the artifact hash
    ///
    /// # Returns
    /// Lowercase hex SHA-256 of the artifact, or `Integrity` if it cannot be read
    pub fn hash(&self) -> LicenseResult<String> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => std::env::current_exe().map_err(|e| {
                LicenseError::Integrity(format!("cannot locate running executable: {}", e))
            })?,
        };
        hash_file(&path)
    }
}

/// Stream a file through SHA-256
pub fn hash_file(path: &Path) -> LicenseResult<String> {
    if !path.is_file() {
        return Err(LicenseError::Integrity(format!(
            "artifact {} does not exist or is not a file",
            path.display()
        )));
    }

    let mut file = File::open(path).map_err(|e| {
        LicenseError::Integrity(format!("cannot open artifact {}: {}", path.display(), e))
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer).map_err(|e| {
            LicenseError::Integrity(format!("cannot read artifact {}: {}", path.display(), e))
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
