//! Output destinations prepared ahead of a native extraction call.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;

use super::ArchiveFileInfo;
use crate::Result;

enum Slot {
    /// No destination; the module gets no stream.
    Skip,
    /// A directory created on disk.
    Directory,
    /// An open file waiting for data.
    Stream {
        path: PathBuf,
        writer: BufWriter<File>,
        modified: Option<SystemTime>,
    },
    /// A file whose stream has been closed.
    Closed {
        path: PathBuf,
        modified: Option<SystemTime>,
    },
}

/// One slot per entry, ordered by archive index.
///
/// Every open stream is closed by [`close`](Self::close) or, failing that,
/// when the set is dropped.
#[derive(Default)]
pub(crate) struct DestinationSet {
    indices: Vec<u32>,
    slots: Vec<Slot>,
    pub(crate) opened: usize,
    pub(crate) closed: usize,
    pub(crate) directories: usize,
    pub(crate) skipped: usize,
}

impl DestinationSet {
    /// Resolves and opens a destination for every entry.
    ///
    /// `entries` must be sorted by index; repeated indices keep the first
    /// entry.
    pub(crate) fn prepare<'e, F>(
        entries: impl IntoIterator<Item = &'e ArchiveFileInfo>,
        resolve: F,
    ) -> Result<Self>
    where
        F: FnMut(&ArchiveFileInfo) -> Option<PathBuf>,
    {
        let mut set = Self::default();
        set.extend(entries, resolve)?;
        Ok(set)
    }

    /// Adds destinations for `entries`, whose indices must follow the ones
    /// already in the set.
    ///
    /// If a destination cannot be created, every stream opened so far is
    /// closed before the error is returned.
    pub(crate) fn extend<'e, F>(
        &mut self,
        entries: impl IntoIterator<Item = &'e ArchiveFileInfo>,
        mut resolve: F,
    ) -> Result<()>
    where
        F: FnMut(&ArchiveFileInfo) -> Option<PathBuf>,
    {
        for entry in entries {
            if self.indices.last().is_some_and(|&last| last >= entry.index) {
                log::debug!("ignoring repeated entry index {}", entry.index);
                continue;
            }
            match self.open_slot(entry, &mut resolve) {
                Ok(slot) => {
                    self.indices.push(entry.index);
                    self.slots.push(slot);
                }
                Err(e) => {
                    if let Err(close_err) = self.close() {
                        log::warn!("closing extraction streams failed: {}", close_err);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn open_slot<F>(&mut self, entry: &ArchiveFileInfo, resolve: &mut F) -> Result<Slot>
    where
        F: FnMut(&ArchiveFileInfo) -> Option<PathBuf>,
    {
        let slot = match resolve(entry) {
            None => {
                self.skipped += 1;
                Slot::Skip
            }
            Some(path) if entry.is_directory => {
                fs::create_dir_all(&path)?;
                self.directories += 1;
                Slot::Directory
            }
            Some(path) => {
                let writer = open_file(&path)?;
                self.opened += 1;
                Slot::Stream {
                    path,
                    writer,
                    modified: entry.modified,
                }
            }
        };
        Ok(slot)
    }

    /// Archive indices covered by the set, ascending and unique.
    pub(crate) fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// The open stream for `index`, if it has one.
    pub(crate) fn writer(&mut self, index: u32) -> Option<&mut dyn Write> {
        let position = self.indices.binary_search(&index).ok()?;
        match &mut self.slots[position] {
            Slot::Stream { writer, .. } => Some(writer as &mut dyn Write),
            _ => None,
        }
    }

    /// Flushes and closes every open stream.
    ///
    /// All streams are closed even if flushing one fails; the first failure
    /// is returned.
    pub(crate) fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for slot in &mut self.slots {
            if !matches!(slot, Slot::Stream { .. }) {
                continue;
            }
            let Slot::Stream {
                path,
                mut writer,
                modified,
            } = mem::replace(slot, Slot::Skip)
            else {
                continue;
            };
            if let Err(e) = writer.flush() {
                log::warn!("failed to flush '{}': {}", path.display(), e);
                first_error.get_or_insert(e);
            }
            drop(writer);
            self.closed += 1;
            *slot = Slot::Closed { path, modified };
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Applies recorded modification times to the closed files.
    pub(crate) fn apply_modification_times(&self) {
        for slot in &self.slots {
            if let Slot::Closed {
                path,
                modified: Some(modified),
            } = slot
            {
                let mtime = FileTime::from_system_time(*modified);
                if let Err(e) = filetime::set_file_mtime(path, mtime) {
                    log::warn!(
                        "Failed to set modification time on '{}': {}",
                        path.display(),
                        e
                    );
                }
            }
        }
    }
}

impl Drop for DestinationSet {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("closing extraction streams failed: {}", e);
        }
    }
}

fn open_file(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}
