//! Shared test utilities for integration tests.
//!
//! Provides an in-process stand-in for the native module so the manager and
//! the extraction router can be exercised without a 7-Zip build installed.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use zesven_native::format::InterfaceKind;
use zesven_native::guid::Guid;
use zesven_native::native::{
    AskMode, CREATE_OBJECT_ENTRY_POINT, ExtractCallback, ExtractMode, FactoryError,
    HANDLER_PROPERTY_ENTRY_POINT, ModuleVersion, NativeObject,
};
use zesven_native::{
    Error, InArchive, LibraryManager, ManagerConfig, ModuleLoader, NativeModule,
    OperationResult, Result,
};

/// `E_ABORT`.
pub const E_ABORT: i32 = 0x8000_4004_u32 as i32;
/// `E_FAIL`.
pub const E_FAIL: i32 = 0x8000_4005_u32 as i32;

/// Counts what the fake module went through.
#[derive(Debug, Default)]
pub struct Counters {
    pub loads: AtomicUsize,
    pub unloads: AtomicUsize,
    pub created: AtomicUsize,
    pub released: AtomicUsize,
}

impl Counters {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// Loader producing [`FakeModule`]s.
#[derive(Debug, Clone)]
pub struct FakeLoader {
    pub counters: Arc<Counters>,
    pub entry_points: Vec<&'static str>,
    pub version: Option<ModuleVersion>,
    pub rejected: Vec<Guid>,
}

impl FakeLoader {
    /// A well-formed modern module.
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            entry_points: vec![HANDLER_PROPERTY_ENTRY_POINT, CREATE_OBJECT_ENTRY_POINT],
            version: Some(ModuleVersion::new(23, 1)),
            rejected: Vec::new(),
        }
    }

    pub fn entry_points(mut self, names: &[&'static str]) -> Self {
        self.entry_points = names.to_vec();
        self
    }

    pub fn version(mut self, version: Option<ModuleVersion>) -> Self {
        self.version = version;
        self
    }

    pub fn reject(mut self, class_id: Guid) -> Self {
        self.rejected.push(class_id);
        self
    }
}

impl ModuleLoader for FakeLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn NativeModule>> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeModule {
            path: path.to_path_buf(),
            loader: self.clone(),
        }))
    }
}

#[derive(Debug)]
pub struct FakeModule {
    path: PathBuf,
    loader: FakeLoader,
}

impl NativeModule for FakeModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn has_entry_point(&self, name: &str) -> bool {
        self.loader.entry_points.iter().any(|&e| e == name)
    }

    fn version(&self) -> Option<ModuleVersion> {
        self.loader.version
    }

    fn create_object(
        &self,
        class_id: &Guid,
        kind: InterfaceKind,
    ) -> std::result::Result<NativeObject, FactoryError> {
        if !self.has_entry_point(CREATE_OBJECT_ENTRY_POINT) {
            return Err(FactoryError::MissingEntryPoint(CREATE_OBJECT_ENTRY_POINT));
        }
        if self.loader.rejected.contains(class_id) {
            return Err(FactoryError::Rejected(E_FAIL));
        }
        self.loader.counters.created.fetch_add(1, Ordering::SeqCst);
        let counters = Arc::clone(&self.loader.counters);
        Ok(match kind {
            InterfaceKind::InArchive => {
                NativeObject::In(Arc::new(ScriptedArchive::new().counters(counters)))
            }
            #[cfg(feature = "compress")]
            InterfaceKind::OutArchive => NativeObject::Out(Arc::new(FakeOutArchive {
                counters,
                released: AtomicBool::new(false),
            })),
        })
    }

    fn unload(self: Box<Self>) -> Result<()> {
        self.loader.counters.unloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory archive that replays the callback protocol.
#[derive(Debug, Default)]
pub struct ScriptedArchive {
    items: Vec<(u32, Vec<u8>)>,
    results: HashMap<u32, OperationResult>,
    reverse: bool,
    abort_after: Option<usize>,
    counters: Option<Arc<Counters>>,
    released: AtomicBool,
    pub calls: AtomicUsize,
    pub requested: Mutex<Vec<(u32, AskMode)>>,
}

impl ScriptedArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item with the given content.
    pub fn item(mut self, index: u32, data: &[u8]) -> Self {
        self.items.push((index, data.to_vec()));
        self
    }

    /// Reports `result` for `index` instead of `Ok`.
    pub fn result(mut self, index: u32, result: OperationResult) -> Self {
        self.results.insert(index, result);
        self
    }

    /// Requests streams in descending index order.
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Fails the call with `E_ABORT` after `n` items.
    pub fn abort_after(mut self, n: usize) -> Self {
        self.abort_after = Some(n);
        self
    }

    fn counters(mut self, counters: Arc<Counters>) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<(u32, AskMode)> {
        self.requested.lock().unwrap().clone()
    }

    fn data(&self, index: u32) -> &[u8] {
        self.items
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, data)| data.as_slice())
            .unwrap_or(&[])
    }

    fn check_live(&self) -> Result<()> {
        if self.released.load(Ordering::SeqCst) {
            Err(Error::InterfaceReleased)
        } else {
            Ok(())
        }
    }
}

impl InArchive for ScriptedArchive {
    fn open(&self, _path: &Path) -> Result<()> {
        self.check_live()
    }

    fn item_count(&self) -> Result<u32> {
        self.check_live()?;
        Ok(self.items.len() as u32)
    }

    fn extract(
        &self,
        indices: Option<&[u32]>,
        mode: ExtractMode,
        callback: &mut dyn ExtractCallback,
    ) -> Result<()> {
        self.check_live()?;
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut order: Vec<u32> = match indices {
            Some(indices) => indices.to_vec(),
            None => self.items.iter().map(|(i, _)| *i).collect(),
        };
        if self.reverse {
            order.reverse();
        }

        let total: u64 = order.iter().map(|&i| self.data(i).len() as u64).sum();
        callback.set_total(total);

        let ask = match mode {
            ExtractMode::Extract => AskMode::Extract,
            ExtractMode::Test => AskMode::Test,
        };
        let mut done = 0u64;
        for (n, index) in order.into_iter().enumerate() {
            if self.abort_after == Some(n) {
                return Err(Error::Extraction { code: E_ABORT });
            }
            self.requested.lock().unwrap().push((index, ask));
            let data = self.data(index);
            if let Some(writer) = callback.get_stream(index, ask)? {
                writer.write_all(data)?;
            }
            callback.prepare_operation(ask);
            done += data.len() as u64;
            callback.set_completed(done);
            callback.set_operation_result(
                self.results
                    .get(&index)
                    .copied()
                    .unwrap_or(OperationResult::Ok),
            );
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.check_live()
    }

    fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Err(Error::InterfaceReleased);
        }
        if let Some(counters) = &self.counters {
            counters.released.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(feature = "compress")]
#[derive(Debug)]
pub struct FakeOutArchive {
    counters: Arc<Counters>,
    released: AtomicBool,
}

#[cfg(feature = "compress")]
impl zesven_native::OutArchive for FakeOutArchive {
    fn file_time_type(&self) -> Result<u32> {
        if self.released.load(Ordering::SeqCst) {
            return Err(Error::InterfaceReleased);
        }
        Ok(0)
    }

    fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Err(Error::InterfaceReleased);
        }
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A scratch directory holding an empty file standing in for the module.
pub struct ModuleFixture {
    pub dir: tempfile::TempDir,
    pub path: PathBuf,
}

impl ModuleFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("7z.so");
        std::fs::write(&path, b"").expect("create module file");
        Self { dir, path }
    }

    /// A manager over this fixture's module path using `loader`.
    pub fn manager(&self, loader: FakeLoader) -> LibraryManager {
        LibraryManager::with_loader(ManagerConfig::new().module_path(&self.path), loader)
    }
}

