//! Progress reporting for extraction runs.
//!
//! The native module reports byte totals and completed bytes through the
//! extraction callback; [`extract`](crate::extract::extract) forwards them to
//! the [`ProgressReporter`] configured on
//! [`ExtractOptions`](crate::ExtractOptions), together with the result of
//! every finished entry.
//!
//! # Example
//!
//! ```rust,ignore
//! use zesven_native::progress::AtomicProgress;
//! use zesven_native::ExtractOptions;
//!
//! let progress = AtomicProgress::shared();
//! let options = ExtractOptions::new().progress(progress.clone());
//! // ... run extraction on another thread ...
//! println!("{:.1}%", progress.percentage());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::native::OperationResult;

const BYTES_KB: f64 = 1024.0;
const BYTES_MB: f64 = BYTES_KB * 1024.0;
const BYTES_GB: f64 = BYTES_MB * 1024.0;

/// Receives progress notifications during extraction.
pub trait ProgressReporter: Send {
    /// Called with the total number of bytes the module will produce.
    fn on_total(&mut self, total_bytes: u64) {
        let _ = total_bytes;
    }

    /// Called as the module produces data.
    fn on_progress(&mut self, bytes_processed: u64, total_bytes: u64) {
        let _ = (bytes_processed, total_bytes);
    }

    /// Called when the module finishes the entry with archive index `index`.
    fn on_entry_complete(&mut self, index: u32, result: OperationResult) {
        let _ = (index, result);
    }
}

/// A progress reporter that does nothing.
#[derive(Debug, Default, Clone)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// A thread-safe progress reporter using atomics.
///
/// Allows progress to be monitored from another thread.
#[derive(Debug, Default)]
pub struct AtomicProgress {
    total_bytes: AtomicU64,
    processed_bytes: AtomicU64,
    entries_completed: AtomicU64,
    entries_failed: AtomicU64,
}

impl AtomicProgress {
    /// Creates a new atomic progress reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shared atomic progress reporter.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns total bytes to process.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Returns processed bytes.
    pub fn processed_bytes(&self) -> u64 {
        self.processed_bytes.load(Ordering::Relaxed)
    }

    /// Returns the number of entries the module finished.
    pub fn entries_completed(&self) -> u64 {
        self.entries_completed.load(Ordering::Relaxed)
    }

    /// Returns the number of finished entries with a failed result.
    pub fn entries_failed(&self) -> u64 {
        self.entries_failed.load(Ordering::Relaxed)
    }

    /// Returns completion percentage (0.0 - 100.0).
    pub fn percentage(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            0.0
        } else {
            (self.processed_bytes() as f64 / total as f64) * 100.0
        }
    }

    fn record_total(&self, total_bytes: u64) {
        self.total_bytes.store(total_bytes, Ordering::Relaxed);
    }

    fn record_progress(&self, bytes_processed: u64) {
        self.processed_bytes.store(bytes_processed, Ordering::Relaxed);
    }

    fn record_entry(&self, result: OperationResult) {
        self.entries_completed.fetch_add(1, Ordering::Relaxed);
        if !result.is_ok() {
            self.entries_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl ProgressReporter for AtomicProgress {
    fn on_total(&mut self, total_bytes: u64) {
        self.record_total(total_bytes);
    }

    fn on_progress(&mut self, bytes_processed: u64, _total_bytes: u64) {
        self.record_progress(bytes_processed);
    }

    fn on_entry_complete(&mut self, _index: u32, result: OperationResult) {
        self.record_entry(result);
    }
}

/// Progress reporter for shared `Arc<AtomicProgress>`.
impl ProgressReporter for Arc<AtomicProgress> {
    fn on_total(&mut self, total_bytes: u64) {
        self.record_total(total_bytes);
    }

    fn on_progress(&mut self, bytes_processed: u64, _total_bytes: u64) {
        self.record_progress(bytes_processed);
    }

    fn on_entry_complete(&mut self, _index: u32, result: OperationResult) {
        self.record_entry(result);
    }
}

/// A progress reporter that calls a closure.
pub struct ClosureProgress<F> {
    callback: F,
}

impl<F> ClosureProgress<F>
where
    F: FnMut(u64, u64) + Send,
{
    /// Creates a progress reporter from a closure.
    ///
    /// The closure receives (bytes_processed, total_bytes).
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgress<F>
where
    F: FnMut(u64, u64) + Send,
{
    fn on_progress(&mut self, bytes_processed: u64, total_bytes: u64) {
        (self.callback)(bytes_processed, total_bytes)
    }
}

/// Creates a closure-based progress reporter.
pub fn progress_fn<F>(f: F) -> ClosureProgress<F>
where
    F: FnMut(u64, u64) + Send,
{
    ClosureProgress::new(f)
}

/// Formats bytes as a human-readable string using IEC units (KiB, MiB, GiB).
///
/// # Examples
///
/// ```rust
/// use zesven_native::progress::format_bytes_iec;
///
/// assert_eq!(format_bytes_iec(512), "512 B");
/// assert_eq!(format_bytes_iec(1536), "1.5 KiB");
/// assert_eq!(format_bytes_iec(1048576), "1.0 MiB");
/// ```
pub fn format_bytes_iec(bytes: u64) -> String {
    let bytes_f64 = bytes as f64;
    if bytes_f64 < BYTES_KB {
        format!("{} B", bytes)
    } else if bytes_f64 < BYTES_MB {
        format!("{:.1} KiB", bytes_f64 / BYTES_KB)
    } else if bytes_f64 < BYTES_GB {
        format!("{:.1} MiB", bytes_f64 / BYTES_MB)
    } else {
        format!("{:.1} GiB", bytes_f64 / BYTES_GB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_progress() {
        let progress = AtomicProgress::shared();
        let mut reporter: Arc<AtomicProgress> = Arc::clone(&progress);

        reporter.on_total(1000);
        reporter.on_progress(500, 1000);
        reporter.on_entry_complete(0, OperationResult::Ok);
        reporter.on_entry_complete(1, OperationResult::CrcError);

        assert_eq!(progress.total_bytes(), 1000);
        assert_eq!(progress.processed_bytes(), 500);
        assert!((progress.percentage() - 50.0).abs() < 0.001);
        assert_eq!(progress.entries_completed(), 2);
        assert_eq!(progress.entries_failed(), 1);
    }

    #[test]
    fn test_atomic_progress_empty() {
        let progress = AtomicProgress::new();
        assert_eq!(progress.percentage(), 0.0);
    }

    #[test]
    fn test_closure_progress() {
        let mut seen = Vec::new();
        {
            let mut progress = progress_fn(|bytes, total| seen.push((bytes, total)));
            progress.on_total(100);
            progress.on_progress(50, 100);
            progress.on_progress(100, 100);
        }
        assert_eq!(seen, vec![(50, 100), (100, 100)]);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes_iec(500), "500 B");
        assert_eq!(format_bytes_iec(1500), "1.5 KiB");
        assert_eq!(format_bytes_iec(1500 * 1024), "1.5 MiB");
        assert_eq!(format_bytes_iec(1500 * 1024 * 1024), "1.5 GiB");
    }
}
