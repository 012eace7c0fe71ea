//! `libloading`-backed module loader.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::Arc;

use libloading::{Library, Symbol};

use super::archive::ComInArchive;
#[cfg(feature = "compress")]
use super::archive::ComOutArchive;
use super::com::{ComPtr, HRESULT, PropVariant, S_OK};
use super::{
    CREATE_OBJECT_ENTRY_POINT, FactoryError, MODULE_PROP_ENTRY_POINT, ModuleLoader,
    ModuleVersion, NativeModule, NativeObject,
};
use crate::format::InterfaceKind;
use crate::guid::Guid;
use crate::{Error, Result};

type CreateObjectFn = unsafe extern "system" fn(
    class_id: *const Guid,
    iid: *const Guid,
    out: *mut *mut c_void,
) -> HRESULT;
type GetModulePropFn = unsafe extern "system" fn(prop_id: u32, value: *mut PropVariant) -> HRESULT;

/// `NModulePropID::kVersion`.
const MODULE_PROP_VERSION: u32 = 1;

/// Loads modules with the platform's dynamic linker.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLoader;

impl ModuleLoader for DynamicLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn NativeModule>> {
        log::debug!("loading native module {}", path.display());

        // SAFETY: loading runs the module's initializers. The caller points us
        // at a 7-Zip build, whose initializers have no preconditions.
        let library = unsafe { Library::new(path) }.map_err(|e| Error::LoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(Box::new(DynamicModule {
            path: path.to_path_buf(),
            library,
        }))
    }
}

/// A module loaded by [`DynamicLoader`].
#[derive(Debug)]
pub struct DynamicModule {
    path: PathBuf,
    library: Library,
}

impl DynamicModule {
    fn symbol<T>(&self, name: &str) -> Option<Symbol<'_, T>> {
        // SAFETY: callers name the exact exported signature in `T`.
        unsafe { self.library.get::<T>(name.as_bytes()) }.ok()
    }
}

impl NativeModule for DynamicModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn has_entry_point(&self, name: &str) -> bool {
        self.symbol::<*const c_void>(name).is_some()
    }

    fn version(&self) -> Option<ModuleVersion> {
        let get_module_prop = self.symbol::<GetModulePropFn>(MODULE_PROP_ENTRY_POINT)?;
        let mut value = PropVariant::default();
        // SAFETY: `value` is a valid PROPVARIANT for the call's duration.
        let hr = unsafe { get_module_prop(MODULE_PROP_VERSION, &mut value) };
        if hr != S_OK {
            return None;
        }
        value.as_u32().map(ModuleVersion::from_packed)
    }

    fn create_object(
        &self,
        class_id: &Guid,
        kind: InterfaceKind,
    ) -> std::result::Result<NativeObject, FactoryError> {
        let create_object = self
            .symbol::<CreateObjectFn>(CREATE_OBJECT_ENTRY_POINT)
            .ok_or(FactoryError::MissingEntryPoint(CREATE_OBJECT_ENTRY_POINT))?;

        let iid = kind.interface_id();
        let mut raw = ptr::null_mut();
        // SAFETY: both GUIDs outlive the call and `raw` is a valid out slot.
        let hr = unsafe { create_object(class_id, &iid, &mut raw) };
        if hr != S_OK {
            return Err(FactoryError::Rejected(hr));
        }
        // SAFETY: on S_OK the factory transfers one reference to us.
        let ptr = unsafe { ComPtr::from_raw(raw) }.ok_or(FactoryError::Rejected(hr))?;

        log::trace!("created {} via {}", class_id, iid);
        Ok(match kind {
            InterfaceKind::InArchive => NativeObject::In(Arc::new(ComInArchive::new(ptr))),
            #[cfg(feature = "compress")]
            InterfaceKind::OutArchive => NativeObject::Out(Arc::new(ComOutArchive::new(ptr))),
        })
    }

    fn unload(self: Box<Self>) -> Result<()> {
        let DynamicModule { path, library } = *self;
        library.close().map_err(|e| Error::UnloadFailed {
            path,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_reports_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-module.so");
        std::fs::write(&path, b"definitely not a shared object").unwrap();

        let err = DynamicLoader.load(&path).unwrap_err();
        assert!(matches!(err, Error::LoadFailed { .. }));
        assert!(err.to_string().contains("not-a-module.so"));
    }
}
