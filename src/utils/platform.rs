/// Platform-specific utilities
///
/// Detect OS and architecture, locate the hidden cache directory and apply
/// OS-level hidden attributes.
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum Platform {
    LinuxX64,
    LinuxArm64,
    WindowsX64,
    WindowsX86,
    MacOSX64,
    MacOSArm64,
    Other,
}

/// Detect current platform
pub fn detect_platform() -> Platform {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("linux", "x86_64") => Platform::LinuxX64,
        ("linux", "aarch64") => Platform::LinuxArm64,
        ("windows", "x86_64") => Platform::WindowsX64,
        ("windows", "x86") => Platform::WindowsX86,
        ("macos", "x86_64") => Platform::MacOSX64,
        ("macos", "aarch64") => Platform::MacOSArm64,
        _ => Platform::Other,
    }
}

impl Platform {
    pub fn name(&self) -> String {
        match self {
            Platform::LinuxX64 => "linux-x86_64".to_string(),
            Platform::LinuxArm64 => "linux-arm64".to_string(),
            Platform::WindowsX64 => "windows-x86_64".to_string(),
            Platform::WindowsX86 => "windows-x86".to_string(),
            Platform::MacOSX64 => "macos-x86_64".to_string(),
            Platform::MacOSArm64 => "macos-arm64".to_string(),
            Platform::Other => format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

/// Default location of the license cache
///
/// Chosen to look like a system cache rather than an application directory.
pub fn hidden_cache_dir() -> PathBuf {
    #[cfg(windows)]
    {
        let base = std::env::var("ProgramData")
            .or_else(|_| std::env::var("SystemDrive"))
            .unwrap_or_else(|_| "C:".to_string());
        let mut dir = PathBuf::from(base);
        if dir.as_os_str().len() == 2 {
            // Bare drive letter such as "C:"
            dir.push("\\");
        }
        return dir.join(".syscache").join("license");
    }

    #[cfg(target_os = "macos")]
    {
        let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        return home
            .join(".Library")
            .join("Caches")
            .join(".syscache")
            .join("license");
    }

    #[cfg(not(any(windows, target_os = "macos")))]
    {
        PathBuf::from("/tmp/.syscache/license")
    }
}

/// Mark a file or directory hidden at the OS level
///
/// Unix has no hidden attribute; the dot-prefixed cache directory does the job.
pub fn hide_path(path: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::{GetFileAttributesW, INVALID_FILE_ATTRIBUTES, SetFileAttributesW};
        use winapi::um::winnt::FILE_ATTRIBUTE_HIDDEN;

        let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();
        unsafe {
            let attrs = GetFileAttributesW(wide.as_ptr());
            if attrs == INVALID_FILE_ATTRIBUTES {
                return Err(io::Error::last_os_error());
            }
            if SetFileAttributesW(wide.as_ptr(), attrs | FILE_ATTRIBUTE_HIDDEN) == 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    #[cfg(not(windows))]
    {
        let _ = path;
        Ok(())
    }
}
