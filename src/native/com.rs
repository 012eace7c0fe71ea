//! Minimal COM plumbing for talking to the 7-Zip module.
//!
//! 7-Zip exposes its handlers as COM-style objects on every platform: an
//! object pointer whose first word is a vtable pointer, `IUnknown` reference
//! counting, and `HRESULT` status codes. This module declares the vtable
//! prefixes the crate calls into, plus the shared pieces used by the Rust
//! objects the crate hands back to the module (callbacks and streams).
//!
//! The layouts follow the 7-Zip ABI without a virtual destructor in
//! `IUnknown` (Windows `7z.dll` and the official Linux/macOS builds).

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::guid::{Guid, IID_IUNKNOWN};
use crate::{Error, Result};

/// COM status code.
#[allow(clippy::upper_case_acronyms)]
pub type HRESULT = i32;

/// Success.
pub const S_OK: HRESULT = 0;
/// Success with a negative answer (e.g. "not an archive of this type").
pub const S_FALSE: HRESULT = 1;
/// Interface not supported.
pub const E_NOINTERFACE: HRESULT = 0x8000_4002_u32 as i32;
/// Unspecified failure.
pub const E_FAIL: HRESULT = 0x8000_4005_u32 as i32;
/// Invalid argument.
pub const E_INVALIDARG: HRESULT = 0x8007_0057_u32 as i32;

/// `VT_UI4` property variant tag.
pub const VT_UI4: u16 = 19;

/// `PROPVARIANT` restricted to the scalar values this crate reads.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct PropVariant {
    /// Variant type tag.
    pub vt: u16,
    reserved1: u16,
    reserved2: u16,
    reserved3: u16,
    /// Raw 8-byte value slot.
    pub value: u64,
}

impl PropVariant {
    /// Returns the value as `u32` when the tag is `VT_UI4`.
    pub fn as_u32(&self) -> Option<u32> {
        (self.vt == VT_UI4).then_some(self.value as u32)
    }
}

/// Method signature shared by `QueryInterface` implementations.
pub type QueryInterfaceFn = unsafe extern "system" fn(
    this: *mut c_void,
    iid: *const Guid,
    out: *mut *mut c_void,
) -> HRESULT;
/// Method signature shared by `AddRef`/`Release`.
pub type RefCountFn = unsafe extern "system" fn(this: *mut c_void) -> u32;

/// `IUnknown` vtable.
#[repr(C)]
pub struct IUnknownVtbl {
    pub query_interface: QueryInterfaceFn,
    pub add_ref: RefCountFn,
    pub release: RefCountFn,
}

/// Prefix of the `IInArchive` vtable up to `Extract`.
#[repr(C)]
pub struct IInArchiveVtbl {
    pub base: IUnknownVtbl,
    pub open: unsafe extern "system" fn(
        this: *mut c_void,
        stream: *mut c_void,
        max_check_start_position: *const u64,
        open_callback: *mut c_void,
    ) -> HRESULT,
    pub close: unsafe extern "system" fn(this: *mut c_void) -> HRESULT,
    pub get_number_of_items:
        unsafe extern "system" fn(this: *mut c_void, count: *mut u32) -> HRESULT,
    pub get_property: unsafe extern "system" fn(
        this: *mut c_void,
        index: u32,
        prop_id: u32,
        value: *mut PropVariant,
    ) -> HRESULT,
    pub extract: unsafe extern "system" fn(
        this: *mut c_void,
        indices: *const u32,
        num_items: u32,
        test_mode: i32,
        callback: *mut c_void,
    ) -> HRESULT,
}

/// `IOutArchive` vtable.
#[cfg(feature = "compress")]
#[repr(C)]
pub struct IOutArchiveVtbl {
    pub base: IUnknownVtbl,
    pub update_items: *const c_void,
    pub get_file_time_type: unsafe extern "system" fn(this: *mut c_void, kind: *mut u32) -> HRESULT,
}

/// `IArchiveExtractCallback` vtable (including the inherited `IProgress`).
#[repr(C)]
pub struct IArchiveExtractCallbackVtbl {
    pub base: IUnknownVtbl,
    pub set_total: unsafe extern "system" fn(this: *mut c_void, total: u64) -> HRESULT,
    pub set_completed:
        unsafe extern "system" fn(this: *mut c_void, complete_value: *const u64) -> HRESULT,
    pub get_stream: unsafe extern "system" fn(
        this: *mut c_void,
        index: u32,
        out_stream: *mut *mut c_void,
        ask_extract_mode: i32,
    ) -> HRESULT,
    pub prepare_operation:
        unsafe extern "system" fn(this: *mut c_void, ask_extract_mode: i32) -> HRESULT,
    pub set_operation_result:
        unsafe extern "system" fn(this: *mut c_void, operation_result: i32) -> HRESULT,
}

/// `ISequentialOutStream` vtable.
#[repr(C)]
pub struct ISequentialOutStreamVtbl {
    pub base: IUnknownVtbl,
    pub write: unsafe extern "system" fn(
        this: *mut c_void,
        data: *const c_void,
        size: u32,
        processed_size: *mut u32,
    ) -> HRESULT,
}

/// `IInStream` vtable (including the inherited `ISequentialInStream`).
#[repr(C)]
pub struct IInStreamVtbl {
    pub base: IUnknownVtbl,
    pub read: unsafe extern "system" fn(
        this: *mut c_void,
        data: *mut c_void,
        size: u32,
        processed_size: *mut u32,
    ) -> HRESULT,
    pub seek: unsafe extern "system" fn(
        this: *mut c_void,
        offset: i64,
        seek_origin: u32,
        new_position: *mut u64,
    ) -> HRESULT,
}

/// Owned reference to an object created by the native module.
///
/// The reference is given back with an explicit [`release`](Self::release);
/// dropping an unreleased pointer releases it as well.
#[derive(Debug)]
pub struct ComPtr {
    raw: NonNull<c_void>,
    released: AtomicBool,
}

// SAFETY: 7-Zip handler objects carry no thread affinity; callers serialize
// method calls on a single object.
unsafe impl Send for ComPtr {}
unsafe impl Sync for ComPtr {}

impl ComPtr {
    /// Takes ownership of one reference to `raw`.
    ///
    /// # Safety
    ///
    /// `raw` must be null or a live COM object pointer whose reference the
    /// caller transfers to the returned value.
    pub unsafe fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self {
            raw,
            released: AtomicBool::new(false),
        })
    }

    /// Raw object pointer.
    pub fn as_raw(&self) -> *mut c_void {
        self.raw.as_ptr()
    }

    /// Returns true once the reference has been given back.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Returns the object's vtable reinterpreted as `V`.
    ///
    /// # Safety
    ///
    /// The object must implement an interface whose vtable starts with `V`,
    /// and the reference must not have been released.
    pub unsafe fn vtbl<V>(&self) -> &V {
        // SAFETY: the first word of a COM object is its vtable pointer.
        unsafe { &**(self.raw.as_ptr() as *const *const V) }
    }

    /// Gives the reference back to the module.
    ///
    /// Returns the remaining reference count reported by the object, or
    /// [`Error::InterfaceReleased`] if this pointer was already released.
    pub fn release(&self) -> Result<u32> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(Error::InterfaceReleased);
        }
        // SAFETY: not yet released, so the object is alive and the vtable valid.
        let remaining = unsafe {
            let vtbl = self.vtbl::<IUnknownVtbl>();
            (vtbl.release)(self.as_raw())
        };
        Ok(remaining)
    }
}

impl Drop for ComPtr {
    fn drop(&mut self) {
        if !self.is_released() {
            let _ = self.release();
        }
    }
}

/// Common header of the objects this crate exposes to the module.
///
/// Every server struct is `#[repr(C)]` and starts with this header so the
/// generic `IUnknown` functions below can operate on any of them.
#[repr(C)]
pub(crate) struct ServerHeader {
    vtbl: *const c_void,
    refs: AtomicU32,
}

impl ServerHeader {
    pub(crate) fn new<V>(vtbl: &'static V) -> Self {
        Self {
            vtbl: vtbl as *const V as *const c_void,
            refs: AtomicU32::new(1),
        }
    }
}

/// A Rust object exposed to the module through a COM vtable.
pub(crate) trait ComServer {
    /// Interface ids answered by `QueryInterface` (besides `IUnknown`).
    const INTERFACES: &'static [Guid];
}

/// `QueryInterface` for any [`ComServer`].
pub(crate) unsafe extern "system" fn server_query_interface<T: ComServer>(
    this: *mut c_void,
    iid: *const Guid,
    out: *mut *mut c_void,
) -> HRESULT {
    if out.is_null() || iid.is_null() {
        return E_INVALIDARG;
    }
    // SAFETY: both pointers were checked for null and come from the module.
    unsafe {
        let iid = &*iid;
        if *iid == IID_IUNKNOWN || T::INTERFACES.contains(iid) {
            server_add_ref(this);
            *out = this;
            S_OK
        } else {
            *out = std::ptr::null_mut();
            E_NOINTERFACE
        }
    }
}

/// `AddRef` for any server starting with a [`ServerHeader`].
pub(crate) unsafe extern "system" fn server_add_ref(this: *mut c_void) -> u32 {
    // SAFETY: `this` points at a server whose first field is a ServerHeader.
    let header = unsafe { &*(this as *const ServerHeader) };
    header.refs.fetch_add(1, Ordering::AcqRel) + 1
}

/// `Release` for heap servers created with `Box::into_raw`.
pub(crate) unsafe extern "system" fn server_release_boxed<T>(this: *mut c_void) -> u32 {
    // SAFETY: `this` points at a boxed server whose first field is a ServerHeader.
    let remaining =
        unsafe { (*(this as *const ServerHeader)).refs.fetch_sub(1, Ordering::AcqRel) } - 1;
    if remaining == 0 {
        // SAFETY: the last reference is gone; reclaim the allocation.
        drop(unsafe { Box::from_raw(this as *mut T) });
    }
    remaining
}

/// `Release` for servers owned by a Rust stack frame.
pub(crate) unsafe extern "system" fn server_release_scoped(this: *mut c_void) -> u32 {
    // SAFETY: `this` points at a server whose first field is a ServerHeader.
    let header = unsafe { &*(this as *const ServerHeader) };
    header.refs.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
}

/// Returns whether an `HRESULT` denotes success.
pub fn succeeded(hr: HRESULT) -> bool {
    hr >= 0
}
