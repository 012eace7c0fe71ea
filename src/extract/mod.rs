//! Routing native extraction output to files.
//!
//! The native `Extract` call is pull-based: the module asks for an output
//! stream each time it reaches an item. [`extract`] prepares one destination
//! per entry up front, answers those requests by archive index, and closes
//! every stream it opened once the call returns, whether it succeeded or not.
//!
//! # Example
//!
//! ```rust,ignore
//! use zesven_native::extract::{self, ArchiveFileInfo};
//! use zesven_native::ExtractOptions;
//!
//! let entries = vec![
//!     ArchiveFileInfo::directory(0, "docs"),
//!     ArchiveFileInfo::file(1, "docs/readme.txt", 120),
//! ];
//! let report = extract::extract(
//!     archive.as_ref(),
//!     &entries,
//!     |entry| Some(output_dir.join(&entry.path)),
//!     ExtractOptions::new().preserve_modification_time(true),
//! )?;
//! assert!(report.is_success());
//! ```

mod destination;
mod router;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use destination::DestinationSet;
use router::StreamRouter;

use crate::Result;
use crate::native::{ExtractMode, InArchive, OperationResult};
use crate::progress::ProgressReporter;

/// Description of one archive item, as enumerated by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFileInfo {
    /// Index of the item inside the archive.
    pub index: u32,
    /// Path of the item relative to the archive root.
    pub path: String,
    /// Whether the item is a directory.
    pub is_directory: bool,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Last modification time, if the archive records one.
    pub modified: Option<SystemTime>,
}

impl ArchiveFileInfo {
    /// Describes a file item.
    pub fn file(index: u32, path: impl Into<String>, size: u64) -> Self {
        Self {
            index,
            path: path.into(),
            is_directory: false,
            size,
            modified: None,
        }
    }

    /// Describes a directory item.
    pub fn directory(index: u32, path: impl Into<String>) -> Self {
        Self {
            index,
            path: path.into(),
            is_directory: true,
            size: 0,
            modified: None,
        }
    }

    /// Sets the modification time.
    pub fn modified(mut self, time: SystemTime) -> Self {
        self.modified = Some(time);
        self
    }
}

/// Options for extraction runs.
#[derive(Default)]
pub struct ExtractOptions {
    /// Apply each entry's modification time to its extracted file.
    pub preserve_modification_time: bool,
    /// Progress reporter for tracking extraction progress (optional).
    pub progress: Option<Box<dyn ProgressReporter>>,
}

impl fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("preserve_modification_time", &self.preserve_modification_time)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl ExtractOptions {
    /// Creates extraction options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether modification times are applied to extracted files.
    pub fn preserve_modification_time(mut self, preserve: bool) -> Self {
        self.preserve_modification_time = preserve;
        self
    }

    /// Sets the progress reporter.
    pub fn progress(mut self, reporter: impl ProgressReporter + 'static) -> Self {
        self.progress = Some(Box::new(reporter));
        self
    }

    /// Clones all settings except the progress reporter.
    pub fn clone_settings(&self) -> Self {
        Self {
            preserve_modification_time: self.preserve_modification_time,
            progress: None,
        }
    }
}

/// Outcome of an extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Streams opened for file entries.
    pub streams_opened: usize,
    /// Streams closed after the native call.
    pub streams_closed: usize,
    /// Directories created.
    pub directories_created: usize,
    /// Entries the resolver gave no destination.
    pub skipped: usize,
    /// Entries the module reported as failed, with their archive index.
    pub failures: Vec<(u32, OperationResult)>,
}

impl ExtractReport {
    /// Returns true if no entry failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Extracts `entries` from an opened archive.
///
/// `resolve` is called once per entry in ascending index order and returns
/// the destination path, or `None` to skip the entry. Directories are
/// created, files are created (with their parent directories) and truncated.
///
/// The native extraction call is made once for all entries. Every stream
/// opened here is closed before this function returns, including when
/// preparing a destination fails or the module aborts.
pub fn extract<F>(
    archive: &dyn InArchive,
    entries: &[ArchiveFileInfo],
    resolve: F,
    options: ExtractOptions,
) -> Result<ExtractReport>
where
    F: FnMut(&ArchiveFileInfo) -> Option<PathBuf>,
{
    let mut ordered: Vec<&ArchiveFileInfo> = entries.iter().collect();
    ordered.sort_by_key(|entry| entry.index);

    let mut destinations = DestinationSet::prepare(ordered, resolve)?;
    let indices = destinations.indices().to_vec();
    log::debug!(
        "extracting {} entries into {} streams",
        indices.len(),
        destinations.opened
    );

    let mut router = StreamRouter::new(&mut destinations, options.progress);
    let outcome = archive.extract(Some(indices.as_slice()), ExtractMode::Extract, &mut router);
    let failures = router.into_failures();

    let closed = destinations.close();
    outcome?;
    closed?;

    if options.preserve_modification_time {
        destinations.apply_modification_times();
    }

    Ok(ExtractReport {
        streams_opened: destinations.opened,
        streams_closed: destinations.closed,
        directories_created: destinations.directories,
        skipped: destinations.skipped,
        failures,
    })
}

/// Extracts every file entry under `dir` with a synthetic sequential name.
///
/// Names are [`temp_file_name`] of a counter that advances once per file
/// entry in ascending index order. Directory entries are skipped, not
/// created.
pub fn extract_temp(
    archive: &dyn InArchive,
    entries: &[ArchiveFileInfo],
    dir: &Path,
    options: ExtractOptions,
) -> Result<ExtractReport> {
    let mut next = 0u32;
    extract(
        archive,
        entries,
        |entry| {
            if entry.is_directory {
                return None;
            }
            let name = temp_file_name(next);
            next += 1;
            Some(dir.join(name))
        },
        options,
    )
}

/// Verifies `entries` without writing anything.
pub fn test_entries(
    archive: &dyn InArchive,
    entries: &[ArchiveFileInfo],
    options: ExtractOptions,
) -> Result<ExtractReport> {
    let mut indices: Vec<u32> = entries.iter().map(|entry| entry.index).collect();
    indices.sort_unstable();
    indices.dedup();

    let mut destinations = DestinationSet::default();
    let mut router = StreamRouter::new(&mut destinations, options.progress);
    archive.extract(Some(indices.as_slice()), ExtractMode::Test, &mut router)?;

    Ok(ExtractReport {
        failures: router.into_failures(),
        ..ExtractReport::default()
    })
}

/// Zero-padded sequential name used by [`extract_temp`].
pub fn temp_file_name(sequence: u32) -> String {
    format!("{:06}", sequence)
}
