//! Property-based tests using proptest.
//!
//! These tests drive the manager and the extraction router with randomly
//! generated operation sequences and entry lists.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{FakeLoader, ModuleFixture, ScriptedArchive};
use proptest::prelude::*;
use zesven_native::extract;
use zesven_native::{ArchiveFileInfo, ConsumerId, ExtractOptions, InArchiveFormat};

const FORMATS: &[InArchiveFormat] = &[
    InArchiveFormat::SevenZip,
    InArchiveFormat::Zip,
    InArchiveFormat::Tar,
];

#[derive(Debug, Clone)]
enum Op {
    Acquire(usize, usize),
    Release(usize, usize),
    Interface(usize, usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let key = (0..3usize, 0..FORMATS.len());
    prop_oneof![
        key.clone().prop_map(|(c, f)| Op::Acquire(c, f)),
        key.clone().prop_map(|(c, f)| Op::Release(c, f)),
        key.prop_map(|(c, f)| Op::Interface(c, f)),
    ]
}

proptest! {
    /// The module is loaded exactly while at least one key is registered.
    #[test]
    fn module_loaded_iff_keys_registered(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let fixture = ModuleFixture::new();
        let loader = FakeLoader::new();
        let counters = Arc::clone(&loader.counters);
        let manager = fixture.manager(loader);
        let consumers: Vec<ConsumerId> = (0..3).map(|_| manager.new_consumer()).collect();
        let mut model: HashSet<(usize, usize)> = HashSet::new();

        for op in ops {
            match op {
                Op::Acquire(c, f) => {
                    manager.acquire(consumers[c], FORMATS[f]).unwrap();
                    model.insert((c, f));
                }
                Op::Release(c, f) => {
                    let was_registered = model.remove(&(c, f));
                    prop_assert_eq!(manager.release(consumers[c], FORMATS[f]), was_registered);
                }
                Op::Interface(c, f) => {
                    let result = manager.in_archive(consumers[c], FORMATS[f]);
                    prop_assert_eq!(result.is_ok(), model.contains(&(c, f)));
                }
            }
            prop_assert_eq!(manager.is_loaded(), !model.is_empty());
            prop_assert_eq!(manager.reference_count(), model.len());
            let live = counters.loads() - counters.unloads();
            prop_assert_eq!(live, usize::from(!model.is_empty()));
        }

        for (c, f) in model.drain() {
            manager.release(consumers[c], FORMATS[f]);
        }
        prop_assert!(!manager.is_loaded());
        prop_assert_eq!(counters.loads(), counters.unloads());
        prop_assert_eq!(counters.created(), counters.released());
    }

    /// Every prepared stream is closed and temp names never collide.
    #[test]
    fn temp_extraction_opens_and_closes_every_file(
        kinds in proptest::collection::vec(any::<bool>(), 0..20),
        abort in proptest::option::of(0..20usize),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let entries: Vec<ArchiveFileInfo> = kinds
            .iter()
            .enumerate()
            .map(|(i, &is_dir)| {
                if is_dir {
                    ArchiveFileInfo::directory(i as u32, format!("d{i}"))
                } else {
                    ArchiveFileInfo::file(i as u32, format!("f{i}"), 1)
                }
            })
            .collect();
        let files = kinds.iter().filter(|&&is_dir| !is_dir).count();

        let mut archive = ScriptedArchive::new();
        for (i, _) in kinds.iter().enumerate() {
            archive = archive.item(i as u32, &[i as u8]);
        }
        if let Some(n) = abort {
            archive = archive.abort_after(n);
        }

        let result = extract::extract_temp(&archive, &entries, dir.path(), ExtractOptions::new());
        match result {
            Ok(report) => {
                prop_assert_eq!(report.streams_opened, files);
                prop_assert_eq!(report.streams_closed, files);
            }
            Err(_) => prop_assert!(abort.is_some_and(|n| n < kinds.len())),
        }

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        let expected: Vec<String> = (0..files as u32).map(extract::temp_file_name).collect();
        prop_assert_eq!(names, expected);
    }
}
