//! Manager configuration.

use std::env;
use std::path::{Path, PathBuf};

use crate::native::HANDLER_PROPERTY_ENTRY_POINT;

/// Environment variable that overrides the default module path.
pub const LIBRARY_PATH_ENV: &str = "ZESVEN_NATIVE_LIBRARY";

/// File name of the native module on this platform.
#[cfg(windows)]
pub const DEFAULT_LIBRARY_NAME: &str = "7z.dll";
/// File name of the native module on this platform.
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY_NAME: &str = "lib7z.dylib";
/// File name of the native module on this platform.
#[cfg(not(any(windows, target_os = "macos")))]
pub const DEFAULT_LIBRARY_NAME: &str = "7z.so";

/// First major version whose modules can create and update archives.
pub const MODIFY_CAPABLE_MAJOR: u16 = 9;

/// Returns the module path used when none is configured.
///
/// This is the value of [`LIBRARY_PATH_ENV`] when set and non-empty,
/// otherwise [`DEFAULT_LIBRARY_NAME`] next to the current executable.
pub fn default_module_path() -> PathBuf {
    if let Some(path) = env::var_os(LIBRARY_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_LIBRARY_NAME)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LIBRARY_NAME))
}

/// Settings for a [`LibraryManager`](super::LibraryManager).
///
/// # Example
///
/// ```rust
/// use zesven_native::ManagerConfig;
///
/// let config = ManagerConfig::default()
///     .module_path("/opt/7-zip/7z.so")
///     .modify_min_major(15);
/// assert_eq!(config.path().to_str(), Some("/opt/7-zip/7z.so"));
/// ```
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    module_path: PathBuf,
    entry_point: String,
    modify_min_major: u16,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            module_path: default_module_path(),
            entry_point: HANDLER_PROPERTY_ENTRY_POINT.to_string(),
            modify_min_major: MODIFY_CAPABLE_MAJOR,
        }
    }
}

impl ManagerConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the path of the native module.
    pub fn module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_path = path.into();
        self
    }

    /// Sets the entry point whose presence marks a valid module.
    pub fn entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = name.into();
        self
    }

    /// Sets the minimum major version considered modify-capable.
    pub fn modify_min_major(mut self, major: u16) -> Self {
        self.modify_min_major = major;
        self
    }

    /// The configured module path.
    pub fn path(&self) -> &Path {
        &self.module_path
    }

    /// The validation entry point.
    pub fn validation_entry_point(&self) -> &str {
        &self.entry_point
    }

    /// The minimum modify-capable major version.
    pub fn min_modify_major(&self) -> u16 {
        self.modify_min_major
    }

    pub(crate) fn set_path(&mut self, path: PathBuf) {
        self.module_path = path;
    }
}
