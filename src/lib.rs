//! # zesven-native
//!
//! Lifecycle management and extraction routing for the native 7-Zip library
//! (`7z.dll`, `7z.so`, `lib7z.dylib`).
//!
//! The crate does no compression itself. It loads the native module on
//! demand, hands out the module's archive handlers as reference-counted
//! interface instances, and frees the module as soon as nobody needs it.
//! Extraction output is routed from the module's callback protocol into
//! files prepared ahead of time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zesven_native::extract::{self, ArchiveFileInfo};
//! use zesven_native::{ExtractOptions, InArchiveFormat, LibraryManager, Result};
//!
//! fn main() -> Result<()> {
//!     let manager = LibraryManager::new();
//!     let consumer = manager.new_consumer();
//!
//!     // Loads the module on first use; released when the lease drops.
//!     let _lease = manager.lease(consumer, InArchiveFormat::SevenZip)?;
//!     let archive = manager.in_archive(consumer, InArchiveFormat::SevenZip)?;
//!     archive.open("backup.7z".as_ref())?;
//!
//!     let entries = vec![ArchiveFileInfo::file(0, "notes.txt", 42)];
//!     let report = extract::extract(
//!         archive.as_ref(),
//!         &entries,
//!         |entry| Some(std::path::Path::new("./output").join(&entry.path)),
//!         ExtractOptions::new(),
//!     )?;
//!     println!("{} files written", report.streams_closed);
//!     archive.close()
//! }
//! ```
//!
//! ## Locating the Library
//!
//! The module path comes from [`ManagerConfig`]. By default it is the value of
//! the `ZESVEN_NATIVE_LIBRARY` environment variable, or the platform library
//! name next to the current executable. It can be changed while the module
//! is unloaded with [`LibraryManager::set_module_path`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `compress` | Yes | Output-archive formats and [`LibraryManager::out_archive`] |
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod extract;
pub mod format;
pub mod guid;
pub mod manager;
pub mod native;
pub mod progress;

pub use error::{Error, Result};
pub use extract::{ArchiveFileInfo, ExtractOptions, ExtractReport};
#[cfg(feature = "compress")]
pub use format::OutArchiveFormat;
pub use format::{ArchiveFormat, InArchiveFormat, InterfaceKind};
pub use manager::{ConsumerId, FormatLease, LibraryManager, ManagerConfig};
#[cfg(feature = "compress")]
pub use native::OutArchive;
pub use native::{InArchive, ModuleLoader, NativeModule, OperationResult};
pub use progress::{AtomicProgress, NoProgress, ProgressReporter, progress_fn};
