//! Wrappers around the archive objects created by the native module.

use std::fs::File;
use std::path::Path;
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::callback::{ExtractCallbackServer, InStreamServer};
use super::com::{ComPtr, IInArchiveVtbl, S_FALSE, S_OK, succeeded};
use super::{ExtractCallback, ExtractMode, InArchive};
use crate::{Error, Result};

/// Upper bound on how far into the file the handler looks for a signature.
const MAX_CHECK_START_POSITION: u64 = 1 << 23;

/// An `IInArchive` object.
///
/// Calls are serialized; the handler objects are not reentrant.
#[derive(Debug)]
pub struct ComInArchive {
    ptr: ComPtr,
    calls: Mutex<()>,
}

impl ComInArchive {
    pub(crate) fn new(ptr: ComPtr) -> Self {
        Self {
            ptr,
            calls: Mutex::new(()),
        }
    }

    /// Locks the object for one call and hands out its vtable.
    fn enter(&self) -> Result<(MutexGuard<'_, ()>, &IInArchiveVtbl)> {
        let guard = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        if self.ptr.is_released() {
            return Err(Error::InterfaceReleased);
        }
        // SAFETY: the object was created for IID_IInArchive and is still live.
        let vtbl = unsafe { self.ptr.vtbl::<IInArchiveVtbl>() };
        Ok((guard, vtbl))
    }
}

impl InArchive for ComInArchive {
    fn open(&self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        let (_guard, vtbl) = self.enter()?;

        let stream = InStreamServer::into_raw(file);
        let hr = unsafe {
            (vtbl.open)(
                self.ptr.as_raw(),
                stream,
                &MAX_CHECK_START_POSITION,
                ptr::null_mut(),
            )
        };
        // The handler holds its own reference to the stream when it accepts it.
        unsafe { InStreamServer::release_raw(stream) };

        if hr == S_FALSE {
            log::debug!("{} was not recognized by the handler", path.display());
        }
        if hr != S_OK {
            return Err(Error::ArchiveOpen {
                path: path.to_path_buf(),
                code: hr,
            });
        }
        log::debug!("opened archive {}", path.display());
        Ok(())
    }

    fn item_count(&self) -> Result<u32> {
        let (_guard, vtbl) = self.enter()?;
        let mut count = 0u32;
        let hr = unsafe { (vtbl.get_number_of_items)(self.ptr.as_raw(), &mut count) };
        if hr != S_OK {
            return Err(Error::Extraction { code: hr });
        }
        Ok(count)
    }

    fn extract(
        &self,
        indices: Option<&[u32]>,
        mode: ExtractMode,
        callback: &mut dyn ExtractCallback,
    ) -> Result<()> {
        let (_guard, vtbl) = self.enter()?;

        let (items, count) = match indices {
            Some(indices) => {
                let count = u32::try_from(indices.len()).map_err(|_| Error::Extraction {
                    code: super::com::E_INVALIDARG,
                })?;
                (indices.as_ptr(), count)
            }
            None => (ptr::null(), u32::MAX),
        };

        let mut server = ExtractCallbackServer::new(callback);
        let hr = unsafe {
            (vtbl.extract)(
                self.ptr.as_raw(),
                items,
                count,
                mode.test_flag(),
                server.as_raw(),
            )
        };

        if let Some(error) = server.take_error() {
            return Err(error);
        }
        if hr != S_OK {
            return Err(Error::Extraction { code: hr });
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let (_guard, vtbl) = self.enter()?;
        let hr = unsafe { (vtbl.close)(self.ptr.as_raw()) };
        if !succeeded(hr) {
            log::warn!("archive close returned {:#010x}", hr);
        }
        Ok(())
    }

    fn release(&self) -> Result<()> {
        let _guard = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        self.ptr.release().map(|_| ())
    }
}

/// An `IOutArchive` object.
#[cfg(feature = "compress")]
#[derive(Debug)]
pub struct ComOutArchive {
    ptr: ComPtr,
    calls: Mutex<()>,
}

#[cfg(feature = "compress")]
impl ComOutArchive {
    pub(crate) fn new(ptr: ComPtr) -> Self {
        Self {
            ptr,
            calls: Mutex::new(()),
        }
    }
}

#[cfg(feature = "compress")]
impl super::OutArchive for ComOutArchive {
    fn file_time_type(&self) -> Result<u32> {
        use super::com::IOutArchiveVtbl;

        let _guard = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        if self.ptr.is_released() {
            return Err(Error::InterfaceReleased);
        }
        let mut kind = 0u32;
        let hr = unsafe {
            let vtbl = self.ptr.vtbl::<IOutArchiveVtbl>();
            (vtbl.get_file_time_type)(self.ptr.as_raw(), &mut kind)
        };
        if hr != S_OK {
            return Err(Error::Extraction { code: hr });
        }
        Ok(kind)
    }

    fn release(&self) -> Result<()> {
        let _guard = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        self.ptr.release().map(|_| ())
    }
}
