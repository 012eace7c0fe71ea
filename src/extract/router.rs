//! Demultiplexes the module's stream requests onto prepared destinations.

use std::io::Write;

use super::destination::DestinationSet;
use crate::Result;
use crate::native::{AskMode, ExtractCallback, OperationResult};
use crate::progress::{ProgressReporter, format_bytes_iec};

pub(crate) struct StreamRouter<'a> {
    destinations: &'a mut DestinationSet,
    progress: Option<Box<dyn ProgressReporter>>,
    total: u64,
    current: Option<u32>,
    failures: Vec<(u32, OperationResult)>,
}

impl<'a> StreamRouter<'a> {
    pub(crate) fn new(
        destinations: &'a mut DestinationSet,
        progress: Option<Box<dyn ProgressReporter>>,
    ) -> Self {
        Self {
            destinations,
            progress,
            total: 0,
            current: None,
            failures: Vec::new(),
        }
    }

    /// Entries whose operation result was not `Ok`, in reporting order.
    pub(crate) fn into_failures(self) -> Vec<(u32, OperationResult)> {
        self.failures
    }
}

impl ExtractCallback for StreamRouter<'_> {
    fn set_total(&mut self, total: u64) {
        log::trace!("extraction will produce {}", format_bytes_iec(total));
        self.total = total;
        if let Some(progress) = self.progress.as_mut() {
            progress.on_total(total);
        }
    }

    fn set_completed(&mut self, completed: u64) {
        if let Some(progress) = self.progress.as_mut() {
            progress.on_progress(completed, self.total);
        }
    }

    fn get_stream(&mut self, index: u32, mode: AskMode) -> Result<Option<&mut dyn Write>> {
        self.current = Some(index);
        if mode != AskMode::Extract {
            return Ok(None);
        }
        Ok(self.destinations.writer(index))
    }

    fn set_operation_result(&mut self, result: OperationResult) {
        let Some(index) = self.current.take() else {
            return;
        };
        if let Some(progress) = self.progress.as_mut() {
            progress.on_entry_complete(index, result);
        }
        if !result.is_ok() {
            log::debug!("entry {} finished with {:?}", index, result);
            self.failures.push((index, result));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ArchiveFileInfo;
    use crate::progress::AtomicProgress;

    #[test]
    fn test_router_routes_by_index_and_records_failures() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            ArchiveFileInfo::file(3, "three", 1),
            ArchiveFileInfo::file(5, "five", 1),
        ];
        let mut set =
            DestinationSet::prepare(&entries, |e| Some(dir.path().join(&e.path))).unwrap();
        let progress = AtomicProgress::shared();

        let failures = {
            let mut router = StreamRouter::new(&mut set, Some(Box::new(progress.clone())));
            router.set_total(2);

            router.get_stream(5, AskMode::Extract).unwrap().unwrap().write_all(b"5").unwrap();
            router.set_operation_result(OperationResult::Ok);

            assert!(router.get_stream(4, AskMode::Extract).unwrap().is_none());
            assert!(router.get_stream(3, AskMode::Test).unwrap().is_none());
            router.set_operation_result(OperationResult::DataError);

            router.set_completed(2);
            router.into_failures()
        };
        set.close().unwrap();

        assert_eq!(failures, vec![(3, OperationResult::DataError)]);
        assert_eq!(progress.processed_bytes(), 2);
        assert_eq!(progress.entries_completed(), 2);
        assert_eq!(std::fs::read(dir.path().join("five")).unwrap(), b"5");
    }
}
