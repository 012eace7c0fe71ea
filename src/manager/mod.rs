//! Lifecycle management for the native module.
//!
//! [`LibraryManager`] loads the module lazily on the first
//! [`acquire`](LibraryManager::acquire), hands out interface instances cached
//! per (consumer, format) key, and unloads the module as soon as the last key
//! is released.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use zesven_native::{InArchiveFormat, LibraryManager};
//!
//! let manager = Arc::new(LibraryManager::new());
//! let consumer = manager.new_consumer();
//!
//! let lease = manager.lease(consumer, InArchiveFormat::SevenZip)?;
//! let archive = manager.in_archive(consumer, InArchiveFormat::SevenZip)?;
//! archive.open("backup.7z".as_ref())?;
//! println!("{} items", archive.item_count()?);
//! drop(lease); // releases the instance and unloads the module
//! ```

mod config;
mod registry;

pub use config::{
    DEFAULT_LIBRARY_NAME, LIBRARY_PATH_ENV, MODIFY_CAPABLE_MAJOR, ManagerConfig,
    default_module_path,
};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use registry::InterfaceRegistry;

#[cfg(feature = "compress")]
use crate::format::OutArchiveFormat;
use crate::format::{ArchiveFormat, InArchiveFormat, InterfaceKind};
#[cfg(feature = "compress")]
use crate::native::OutArchive;
use crate::native::{
    DynamicLoader, FactoryError, HANDLER_PROPERTY2_ENTRY_POINT, InArchive, ModuleLoader,
    NativeModule, NativeObject,
};
use crate::{Error, Result};

/// Identity of a party using the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl ConsumerId {
    /// Wraps a raw identity.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identity.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct ManagerState {
    config: ManagerConfig,
    module: Option<Box<dyn NativeModule>>,
    registry: InterfaceRegistry,
    modify_capable: Option<bool>,
}

/// Loads, shares and unloads the native 7-Zip module.
///
/// All methods take `&self`; share the manager between threads with an
/// [`Arc`]. One internal lock serializes loading, registration and interface
/// creation.
pub struct LibraryManager {
    loader: Box<dyn ModuleLoader>,
    next_consumer: AtomicU64,
    state: Mutex<ManagerState>,
}

impl fmt::Debug for LibraryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("LibraryManager")
            .field("module_path", &state.config.path())
            .field("loaded", &state.module.is_some())
            .field("references", &state.registry.references())
            .finish()
    }
}

impl Default for LibraryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryManager {
    /// Creates a manager with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// Creates a manager that loads modules with the platform loader.
    pub fn with_config(config: ManagerConfig) -> Self {
        Self::with_loader(config, DynamicLoader)
    }

    /// Creates a manager with a custom module loader.
    pub fn with_loader(config: ManagerConfig, loader: impl ModuleLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            next_consumer: AtomicU64::new(1),
            state: Mutex::new(ManagerState {
                config,
                module: None,
                registry: InterfaceRegistry::default(),
                modify_capable: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a fresh consumer identity.
    pub fn new_consumer(&self) -> ConsumerId {
        ConsumerId(self.next_consumer.fetch_add(1, Ordering::Relaxed))
    }

    /// Path the module is (or will be) loaded from.
    pub fn module_path(&self) -> PathBuf {
        self.lock().config.path().to_path_buf()
    }

    /// Returns true while the module is loaded.
    pub fn is_loaded(&self) -> bool {
        self.lock().module.is_some()
    }

    /// Number of registered (consumer, format) keys.
    pub fn reference_count(&self) -> usize {
        self.lock().registry.references()
    }

    /// Registers interest of `consumer` in `format`, loading the module if
    /// needed.
    ///
    /// Acquiring the same key twice has no further effect. On failure no key
    /// is registered.
    pub fn acquire(&self, consumer: ConsumerId, format: impl Into<ArchiveFormat>) -> Result<()> {
        let format = format.into();
        let mut state = self.lock();
        if state.registry.contains(consumer, format) {
            return Ok(());
        }
        self.ensure_loaded(&mut state)?;
        state.registry.register(consumer, format);
        debug_assert_eq!(state.registry.references(), state.registry.len());
        log::trace!("consumer {} acquired {}", consumer, format);
        Ok(())
    }

    /// Acquires `format` for `consumer` and returns a guard that releases it.
    pub fn lease(
        &self,
        consumer: ConsumerId,
        format: impl Into<ArchiveFormat>,
    ) -> Result<FormatLease<'_>> {
        let format = format.into();
        self.acquire(consumer, format)?;
        Ok(FormatLease {
            manager: self,
            consumer,
            format,
            released: false,
        })
    }

    /// Returns the input-archive instance for a previously acquired key,
    /// creating it on first use.
    pub fn in_archive(
        &self,
        consumer: ConsumerId,
        format: InArchiveFormat,
    ) -> Result<Arc<dyn InArchive>> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let slot = state
            .registry
            .inputs
            .slot_mut(consumer, format)
            .ok_or(Error::NotRegistered {
                consumer: consumer.get(),
                format: format.into(),
            })?;
        if let Some(archive) = slot {
            return Ok(Arc::clone(archive));
        }

        let module = state.module.as_deref().ok_or(Error::ModuleNotLoaded)?;
        let archive = match create(module, format.into())? {
            NativeObject::In(archive) => archive,
            #[cfg(feature = "compress")]
            other => {
                release_logged(&other);
                return Err(Error::unsupported(format, None));
            }
        };
        *slot = Some(Arc::clone(&archive));
        Ok(archive)
    }

    /// Returns the output-archive instance for a previously acquired key,
    /// creating it on first use.
    ///
    /// Fails with [`Error::UnsupportedFormat`] if the module is too old to
    /// modify archives.
    #[cfg(feature = "compress")]
    pub fn out_archive(
        &self,
        consumer: ConsumerId,
        format: OutArchiveFormat,
    ) -> Result<Arc<dyn OutArchive>> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.registry.contains(consumer, format.into()) {
            return Err(Error::NotRegistered {
                consumer: consumer.get(),
                format: format.into(),
            });
        }

        let module = state.module.as_deref().ok_or(Error::ModuleNotLoaded)?;
        let min_major = state.config.min_modify_major();
        let capable = *state
            .modify_capable
            .get_or_insert_with(|| probe_modify_capable(module, min_major));
        if !capable {
            return Err(Error::unsupported(format, None));
        }

        let slot = state
            .registry
            .outputs
            .slot_mut(consumer, format)
            .ok_or(Error::NotRegistered {
                consumer: consumer.get(),
                format: format.into(),
            })?;
        if let Some(archive) = slot {
            return Ok(Arc::clone(archive));
        }

        let archive = match create(module, format.into())? {
            NativeObject::Out(archive) => archive,
            other => {
                release_logged(&other);
                return Err(Error::unsupported(format, None));
            }
        };
        *slot = Some(Arc::clone(&archive));
        Ok(archive)
    }

    /// Releases the key, its cached instance, and the module once no keys
    /// remain.
    ///
    /// Returns false if the key was not registered; that is not an error.
    pub fn release(&self, consumer: ConsumerId, format: impl Into<ArchiveFormat>) -> bool {
        let format = format.into();
        let mut state = self.lock();
        let Some(slot) = state.registry.unregister(consumer, format) else {
            return false;
        };
        if let Some(object) = slot {
            release_logged(&object);
        }
        log::trace!("consumer {} released {}", consumer, format);

        if state.registry.is_empty() {
            debug_assert_eq!(state.registry.references(), 0);
            unload(&mut state);
        }
        true
    }

    /// Returns whether the module can create and update archives.
    ///
    /// The answer is cached until the module path changes. If the module is
    /// not loaded it is loaded just long enough to ask.
    pub fn modify_capable(&self) -> Result<bool> {
        let mut state = self.lock();
        if let Some(capable) = state.modify_capable {
            return Ok(capable);
        }

        let min_major = state.config.min_modify_major();
        let capable = match state.module.as_deref() {
            Some(module) => probe_modify_capable(module, min_major),
            None => {
                let module = self.load_validated(&state.config)?;
                let capable = probe_modify_capable(module.as_ref(), min_major);
                if let Err(e) = module.unload() {
                    log::warn!("failed to unload probed module: {}", e);
                }
                capable
            }
        };
        state.modify_capable = Some(capable);
        Ok(capable)
    }

    /// Changes the path used for subsequent loads.
    ///
    /// Fails with [`Error::ModuleInUse`] if a module from another path is
    /// loaded, and with [`Error::ModuleNotFound`] if `path` is not a file.
    pub fn set_module_path(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let mut state = self.lock();
        if let Some(module) = &state.module {
            if !same_path(module.path(), &path) {
                return Err(Error::ModuleInUse {
                    loaded: module.path().to_path_buf(),
                    requested: path,
                });
            }
        }
        if !path.is_file() {
            return Err(Error::ModuleNotFound { path });
        }
        if !same_path(state.config.path(), &path) {
            state.modify_capable = None;
        }
        state.config.set_path(path);
        Ok(())
    }

    fn ensure_loaded(&self, state: &mut ManagerState) -> Result<()> {
        if state.module.is_none() {
            let module = self.load_validated(&state.config)?;
            log::debug!("loaded native module {}", module.path().display());
            state.module = Some(module);
        }
        Ok(())
    }

    fn load_validated(&self, config: &ManagerConfig) -> Result<Box<dyn NativeModule>> {
        let path = config.path();
        if !path.is_file() {
            return Err(Error::ModuleNotFound {
                path: path.to_path_buf(),
            });
        }

        let module = self.loader.load(path)?;
        let entry_point = config.validation_entry_point();
        if !module.has_entry_point(entry_point) {
            if let Err(e) = module.unload() {
                log::warn!("failed to unload rejected module: {}", e);
            }
            return Err(Error::InvalidModule {
                path: path.to_path_buf(),
                reason: format!("missing entry point `{}`", entry_point),
            });
        }
        Ok(module)
    }
}

impl Drop for LibraryManager {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for object in state.registry.drain() {
            release_logged(&object);
        }
        unload(state);
    }
}

fn create(module: &dyn NativeModule, format: ArchiveFormat) -> Result<NativeObject> {
    let kind: InterfaceKind = format.kind();
    match module.create_object(&format.class_id(), kind) {
        Ok(object) => {
            log::debug!("created interface for {}", format);
            Ok(object)
        }
        Err(FactoryError::MissingEntryPoint(name)) => {
            log::debug!("{} lacks `{}`", module.path().display(), name);
            Err(Error::unsupported(format, None))
        }
        Err(FactoryError::Rejected(code)) => Err(Error::unsupported(format, Some(code))),
    }
}

fn probe_modify_capable(module: &dyn NativeModule, min_major: u16) -> bool {
    match module.version() {
        Some(version) => {
            log::debug!("native module version {}", version);
            version.major >= min_major
        }
        None => module.has_entry_point(HANDLER_PROPERTY2_ENTRY_POINT),
    }
}

fn release_logged(object: &NativeObject) {
    if let Err(e) = object.release() {
        log::warn!("failed to release {:?}: {}", object, e);
    }
}

fn unload(state: &mut ManagerState) {
    if let Some(module) = state.module.take() {
        let path = module.path().to_path_buf();
        match module.unload() {
            Ok(()) => log::debug!("unloaded native module {}", path.display()),
            Err(e) => log::warn!("{}", e),
        }
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    let a = a.canonicalize().unwrap_or_else(|_| a.to_path_buf());
    let b = b.canonicalize().unwrap_or_else(|_| b.to_path_buf());
    if cfg!(windows) {
        a.to_string_lossy().eq_ignore_ascii_case(&b.to_string_lossy())
    } else {
        a == b
    }
}

/// Scoped acquisition of one (consumer, format) key.
///
/// Dropping the lease releases the key, exactly like
/// [`LibraryManager::release`].
#[must_use = "dropping the lease releases the format immediately"]
#[derive(Debug)]
pub struct FormatLease<'m> {
    manager: &'m LibraryManager,
    consumer: ConsumerId,
    format: ArchiveFormat,
    released: bool,
}

impl FormatLease<'_> {
    /// The consumer holding the lease.
    pub fn consumer(&self) -> ConsumerId {
        self.consumer
    }

    /// The leased format.
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Releases the key now. Returns what [`LibraryManager::release`] returned.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.manager.release(self.consumer, self.format)
    }
}

impl Drop for FormatLease<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.manager.release(self.consumer, self.format);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_ids_are_unique() {
        let manager = LibraryManager::with_config(ManagerConfig::new().module_path("missing"));
        let a = manager.new_consumer();
        let b = manager.new_consumer();
        assert_ne!(a, b);
        assert_eq!(ConsumerId::new(a.get()), a);
    }

    #[test]
    fn test_acquire_missing_module_leaves_no_keys() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LibraryManager::with_config(
            ManagerConfig::new().module_path(dir.path().join("absent.so")),
        );
        let consumer = manager.new_consumer();

        let err = manager
            .acquire(consumer, InArchiveFormat::SevenZip)
            .unwrap_err();
        assert!(matches!(err, Error::ModuleNotFound { .. }));
        assert_eq!(manager.reference_count(), 0);
        assert!(!manager.is_loaded());
    }

    #[test]
    fn test_release_unknown_key_is_noop() {
        let manager = LibraryManager::with_config(ManagerConfig::new().module_path("missing"));
        assert!(!manager.release(ConsumerId::new(42), InArchiveFormat::Zip));
    }

    #[test]
    fn test_in_archive_requires_acquire() {
        let manager = LibraryManager::with_config(ManagerConfig::new().module_path("missing"));
        let err = manager
            .in_archive(ConsumerId::new(7), InArchiveFormat::Zip)
            .unwrap_err();
        assert!(matches!(err, Error::NotRegistered { consumer: 7, .. }));
    }

    #[test]
    fn test_set_module_path_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LibraryManager::with_config(ManagerConfig::new().module_path("missing"));

        let absent = dir.path().join("7z.so");
        assert!(matches!(
            manager.set_module_path(&absent),
            Err(Error::ModuleNotFound { .. })
        ));

        std::fs::write(&absent, b"").unwrap();
        manager.set_module_path(&absent).unwrap();
        assert_eq!(manager.module_path(), absent);
    }
}
