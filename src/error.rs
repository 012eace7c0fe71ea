//! Error types for native library management and extraction.
//!
//! This module provides the [`Error`] enum which represents all failure modes
//! of loading the native 7-Zip module, creating its interfaces and routing
//! extraction output, along with a convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! ```rust,no_run
//! use zesven_native::{Error, InArchiveFormat, LibraryManager};
//!
//! fn check_library(manager: &LibraryManager) {
//!     let consumer = manager.new_consumer();
//!     match manager.acquire(consumer, InArchiveFormat::SevenZip) {
//!         Ok(()) => println!("7-Zip library is ready"),
//!         Err(Error::ModuleNotFound { path }) => {
//!             eprintln!("Install 7-Zip or point to it: {}", path.display());
//!         }
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```

use std::io;
use std::path::PathBuf;

use crate::format::ArchiveFormat;

/// The main error type for native library operations.
///
/// | Category | Variants |
/// |----------|----------|
/// | Module | [`ModuleNotFound`][Self::ModuleNotFound], [`LoadFailed`][Self::LoadFailed], [`UnloadFailed`][Self::UnloadFailed], [`InvalidModule`][Self::InvalidModule], [`ModuleInUse`][Self::ModuleInUse], [`ModuleNotLoaded`][Self::ModuleNotLoaded] |
/// | Interfaces | [`UnsupportedFormat`][Self::UnsupportedFormat], [`NotRegistered`][Self::NotRegistered], [`InterfaceReleased`][Self::InterfaceReleased] |
/// | Archives | [`ArchiveOpen`][Self::ArchiveOpen], [`Extraction`][Self::Extraction] |
/// | I/O | [`Io`][Self::Io] |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while creating directories or destination files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The native module file does not exist.
    #[error("native library file does not exist: {}", .path.display())]
    ModuleNotFound {
        /// Path that was probed.
        path: PathBuf,
    },

    /// The operating system loader refused the module.
    #[error("failed to load native library {}: {reason}", .path.display())]
    LoadFailed {
        /// Path of the module.
        path: PathBuf,
        /// Loader message.
        reason: String,
    },

    /// The operating system loader failed to free the module.
    #[error("failed to unload native library {}: {reason}", .path.display())]
    UnloadFailed {
        /// Path of the module.
        path: PathBuf,
        /// Loader message.
        reason: String,
    },

    /// The module loaded but does not expose the expected entry points.
    #[error("native library {} is invalid: {reason}", .path.display())]
    InvalidModule {
        /// Path of the module.
        path: PathBuf,
        /// What was missing.
        reason: String,
    },

    /// The module path cannot change while a different module is loaded.
    #[error(
        "cannot change the library path while the library \"{}\" is being used",
        .loaded.display()
    )]
    ModuleInUse {
        /// Path of the currently loaded module.
        loaded: PathBuf,
        /// Path that was requested.
        requested: PathBuf,
    },

    /// An operation needed the module but it is not loaded.
    #[error("native library is not loaded")]
    ModuleNotLoaded,

    /// The module rejected creation of the format's interface.
    ///
    /// This typically means the library build does not include the format,
    /// or that an output interface was requested from a module too old to
    /// modify archives.
    #[error("the native library does not support {format}")]
    UnsupportedFormat {
        /// The rejected format.
        format: ArchiveFormat,
        /// HRESULT returned by the factory, if the call was made.
        code: Option<i32>,
    },

    /// An interface was requested for a key that was never acquired.
    #[error("consumer {consumer} has not acquired {format}")]
    NotRegistered {
        /// Consumer identity.
        consumer: u64,
        /// The format that was requested.
        format: ArchiveFormat,
    },

    /// A call was made on an interface after the manager released it.
    #[error("interface instance has already been released")]
    InterfaceReleased,

    /// The input archive refused to open the file.
    #[error("cannot open {} as an archive (code {code:#010x})", .path.display())]
    ArchiveOpen {
        /// Archive file path.
        path: PathBuf,
        /// HRESULT returned by `Open`.
        code: i32,
    },

    /// The native extraction call reported failure.
    #[error("extraction failed (code {code:#010x})")]
    Extraction {
        /// HRESULT returned by `Extract`.
        code: i32,
    },
}

impl Error {
    /// Returns `true` if this error concerns locating or loading the module.
    pub fn is_module_error(&self) -> bool {
        matches!(
            self,
            Error::ModuleNotFound { .. }
                | Error::LoadFailed { .. }
                | Error::UnloadFailed { .. }
                | Error::InvalidModule { .. }
                | Error::ModuleInUse { .. }
                | Error::ModuleNotLoaded
        )
    }

    /// Returns `true` if the module does not support the requested format.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::UnsupportedFormat { .. })
    }

    /// Returns the HRESULT reported by the native module, if any.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Error::UnsupportedFormat { code, .. } => *code,
            Error::ArchiveOpen { code, .. } | Error::Extraction { code } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn unsupported(format: impl Into<ArchiveFormat>, code: Option<i32>) -> Self {
        Error::UnsupportedFormat {
            format: format.into(),
            code,
        }
    }
}

/// A specialized Result type for native library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::InArchiveFormat;

    #[test]
    fn test_module_not_found_message_names_path() {
        let err = Error::ModuleNotFound {
            path: PathBuf::from("/opt/7z/7z.so"),
        };
        assert!(err.to_string().contains("/opt/7z/7z.so"));
        assert!(err.is_module_error());
    }

    #[test]
    fn test_module_in_use_message() {
        let err = Error::ModuleInUse {
            loaded: PathBuf::from("a/7z.dll"),
            requested: PathBuf::from("b/7z.dll"),
        };
        assert!(err.to_string().contains("a/7z.dll"));
    }

    #[test]
    fn test_extraction_code_formatting() {
        let err = Error::Extraction {
            code: 0x8000_4005_u32 as i32,
        };
        assert_eq!(err.to_string(), "extraction failed (code 0x80004005)");
        assert_eq!(err.native_code(), Some(0x8000_4005_u32 as i32));
    }

    #[test]
    fn test_unsupported_format() {
        let err = Error::unsupported(InArchiveFormat::Rar, Some(-1));
        assert!(err.is_unsupported());
        assert!(!err.is_module_error());
        assert!(err.to_string().contains("RAR"));
    }

    #[test]
    fn test_io_conversion() {
        let err: Error = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.native_code(), None);
    }
}
