//! Rust objects handed to the native module during `Open` and `Extract`.
//!
//! - [`ExtractCallbackServer`] adapts an [`ExtractCallback`] to
//!   `IArchiveExtractCallback`; it lives on the stack of one extraction call.
//! - [`OutStreamServer`] adapts a borrowed writer to `ISequentialOutStream`;
//!   it is heap allocated and freed by the module's final `Release`.
//! - [`InStreamServer`] adapts a file to `IInStream` for `Open`; the archive
//!   keeps it until `Close`.

use std::ffi::c_void;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ptr;
use std::slice;

use super::com::{
    ComServer, E_FAIL, E_INVALIDARG, HRESULT, IArchiveExtractCallbackVtbl, IInStreamVtbl,
    ISequentialOutStreamVtbl, IUnknownVtbl, S_OK, ServerHeader, server_add_ref,
    server_query_interface, server_release_boxed, server_release_scoped,
};
use super::{AskMode, ExtractCallback, OperationResult};
use crate::Error;
use crate::guid::{
    Guid, IID_IARCHIVE_EXTRACT_CALLBACK, IID_IIN_STREAM, IID_IPROGRESS,
    IID_ISEQUENTIAL_IN_STREAM, IID_ISEQUENTIAL_OUT_STREAM,
};

/// `HRESULT_FROM_WIN32(ERROR_NEGATIVE_SEEK)`.
const E_NEGATIVE_SEEK: HRESULT = 0x8007_0083_u32 as i32;

#[repr(C)]
pub(crate) struct ExtractCallbackServer<'a> {
    header: ServerHeader,
    callback: &'a mut dyn ExtractCallback,
    error: Option<Error>,
}

impl ComServer for ExtractCallbackServer<'_> {
    const INTERFACES: &'static [Guid] = &[IID_IARCHIVE_EXTRACT_CALLBACK, IID_IPROGRESS];
}

static EXTRACT_CALLBACK_VTBL: IArchiveExtractCallbackVtbl = IArchiveExtractCallbackVtbl {
    base: IUnknownVtbl {
        query_interface: server_query_interface::<ExtractCallbackServer<'static>>,
        add_ref: server_add_ref,
        release: server_release_scoped,
    },
    set_total: extract_set_total,
    set_completed: extract_set_completed,
    get_stream: extract_get_stream,
    prepare_operation: extract_prepare_operation,
    set_operation_result: extract_set_operation_result,
};

impl<'a> ExtractCallbackServer<'a> {
    pub(crate) fn new(callback: &'a mut dyn ExtractCallback) -> Self {
        Self {
            header: ServerHeader::new(&EXTRACT_CALLBACK_VTBL),
            callback,
            error: None,
        }
    }

    /// Pointer passed to `IInArchive::Extract`. Valid while `self` is not moved.
    pub(crate) fn as_raw(&mut self) -> *mut c_void {
        self as *mut Self as *mut c_void
    }

    /// The first error raised by the Rust callback, if any.
    pub(crate) fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }
}

/// Recovers the server behind `this`.
///
/// # Safety
///
/// `this` must be the pointer produced by [`ExtractCallbackServer::as_raw`]
/// during the extraction call that is currently running.
unsafe fn extract_server<'s>(this: *mut c_void) -> &'s mut ExtractCallbackServer<'s> {
    unsafe { &mut *(this as *mut ExtractCallbackServer<'s>) }
}

unsafe extern "system" fn extract_set_total(this: *mut c_void, total: u64) -> HRESULT {
    let server = unsafe { extract_server(this) };
    server.callback.set_total(total);
    S_OK
}

unsafe extern "system" fn extract_set_completed(this: *mut c_void, value: *const u64) -> HRESULT {
    let server = unsafe { extract_server(this) };
    if !value.is_null() {
        server.callback.set_completed(unsafe { *value });
    }
    S_OK
}

unsafe extern "system" fn extract_get_stream(
    this: *mut c_void,
    index: u32,
    out_stream: *mut *mut c_void,
    ask_extract_mode: i32,
) -> HRESULT {
    if out_stream.is_null() {
        return E_INVALIDARG;
    }
    unsafe { *out_stream = ptr::null_mut() };

    let server = unsafe { extract_server(this) };
    match server
        .callback
        .get_stream(index, AskMode::from_raw(ask_extract_mode))
    {
        Ok(Some(writer)) => {
            unsafe { *out_stream = OutStreamServer::into_raw(writer) };
            S_OK
        }
        Ok(None) => S_OK,
        Err(e) => {
            log::debug!("stream request for item {} failed: {}", index, e);
            server.error.get_or_insert(e);
            E_FAIL
        }
    }
}

unsafe extern "system" fn extract_prepare_operation(this: *mut c_void, mode: i32) -> HRESULT {
    let server = unsafe { extract_server(this) };
    server.callback.prepare_operation(AskMode::from_raw(mode));
    S_OK
}

unsafe extern "system" fn extract_set_operation_result(this: *mut c_void, result: i32) -> HRESULT {
    let server = unsafe { extract_server(this) };
    server
        .callback
        .set_operation_result(OperationResult::from_raw(result));
    S_OK
}

#[repr(C)]
pub(crate) struct OutStreamServer<'w> {
    header: ServerHeader,
    sink: *mut (dyn Write + 'w),
}

impl ComServer for OutStreamServer<'_> {
    const INTERFACES: &'static [Guid] = &[IID_ISEQUENTIAL_OUT_STREAM];
}

static OUT_STREAM_VTBL: ISequentialOutStreamVtbl = ISequentialOutStreamVtbl {
    base: IUnknownVtbl {
        query_interface: server_query_interface::<OutStreamServer<'static>>,
        add_ref: server_add_ref,
        release: server_release_boxed::<OutStreamServer<'static>>,
    },
    write: out_stream_write,
};

impl<'w> OutStreamServer<'w> {
    /// Boxes a stream over `sink` and returns it with one reference held.
    ///
    /// The module must release the stream before `sink` goes away; 7-Zip does
    /// so before the enclosing `Extract` call returns.
    pub(crate) fn into_raw(sink: &'w mut dyn Write) -> *mut c_void {
        let server = Box::new(Self {
            header: ServerHeader::new(&OUT_STREAM_VTBL),
            sink: sink as *mut (dyn Write + 'w),
        });
        Box::into_raw(server) as *mut c_void
    }
}

unsafe extern "system" fn out_stream_write(
    this: *mut c_void,
    data: *const c_void,
    size: u32,
    processed_size: *mut u32,
) -> HRESULT {
    if !processed_size.is_null() {
        unsafe { *processed_size = 0 };
    }
    if size == 0 {
        return S_OK;
    }
    if data.is_null() {
        return E_INVALIDARG;
    }

    let server = unsafe { &*(this as *const OutStreamServer<'_>) };
    let buf = unsafe { slice::from_raw_parts(data as *const u8, size as usize) };
    match unsafe { (*server.sink).write_all(buf) } {
        Ok(()) => {
            if !processed_size.is_null() {
                unsafe { *processed_size = size };
            }
            S_OK
        }
        Err(e) => {
            log::warn!("write to extraction stream failed: {}", e);
            E_FAIL
        }
    }
}

#[repr(C)]
pub(crate) struct InStreamServer {
    header: ServerHeader,
    file: File,
}

impl ComServer for InStreamServer {
    const INTERFACES: &'static [Guid] = &[IID_IIN_STREAM, IID_ISEQUENTIAL_IN_STREAM];
}

static IN_STREAM_VTBL: IInStreamVtbl = IInStreamVtbl {
    base: IUnknownVtbl {
        query_interface: server_query_interface::<InStreamServer>,
        add_ref: server_add_ref,
        release: server_release_boxed::<InStreamServer>,
    },
    read: in_stream_read,
    seek: in_stream_seek,
};

impl InStreamServer {
    /// Boxes a stream over `file` and returns it with one reference held.
    pub(crate) fn into_raw(file: File) -> *mut c_void {
        let server = Box::new(Self {
            header: ServerHeader::new(&IN_STREAM_VTBL),
            file,
        });
        Box::into_raw(server) as *mut c_void
    }

    /// Drops the reference returned by [`into_raw`](Self::into_raw).
    ///
    /// # Safety
    ///
    /// `raw` must come from `into_raw` and the caller must own one reference.
    pub(crate) unsafe fn release_raw(raw: *mut c_void) {
        unsafe { server_release_boxed::<InStreamServer>(raw) };
    }
}

unsafe extern "system" fn in_stream_read(
    this: *mut c_void,
    data: *mut c_void,
    size: u32,
    processed_size: *mut u32,
) -> HRESULT {
    if !processed_size.is_null() {
        unsafe { *processed_size = 0 };
    }
    if size == 0 {
        return S_OK;
    }
    if data.is_null() {
        return E_INVALIDARG;
    }

    let server = unsafe { &mut *(this as *mut InStreamServer) };
    let buf = unsafe { slice::from_raw_parts_mut(data as *mut u8, size as usize) };
    loop {
        match server.file.read(buf) {
            Ok(n) => {
                if !processed_size.is_null() {
                    unsafe { *processed_size = n as u32 };
                }
                return S_OK;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("read from archive file failed: {}", e);
                return E_FAIL;
            }
        }
    }
}

unsafe extern "system" fn in_stream_seek(
    this: *mut c_void,
    offset: i64,
    seek_origin: u32,
    new_position: *mut u64,
) -> HRESULT {
    let pos = match seek_origin {
        0 if offset < 0 => return E_NEGATIVE_SEEK,
        0 => SeekFrom::Start(offset as u64),
        1 => SeekFrom::Current(offset),
        2 => SeekFrom::End(offset),
        _ => return E_INVALIDARG,
    };

    let server = unsafe { &mut *(this as *mut InStreamServer) };
    match server.file.seek(pos) {
        Ok(position) => {
            if !new_position.is_null() {
                unsafe { *new_position = position };
            }
            S_OK
        }
        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => E_NEGATIVE_SEEK,
        Err(e) => {
            log::warn!("seek in archive file failed: {}", e);
            E_FAIL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Result, guid::IID_IUNKNOWN};

    struct Recorder {
        buffer: Vec<u8>,
        total: u64,
        results: Vec<OperationResult>,
    }

    impl ExtractCallback for Recorder {
        fn set_total(&mut self, total: u64) {
            self.total = total;
        }

        fn get_stream(&mut self, index: u32, mode: AskMode) -> Result<Option<&mut dyn Write>> {
            if index == 0 && mode == AskMode::Extract {
                Ok(Some(&mut self.buffer))
            } else {
                Ok(None)
            }
        }

        fn set_operation_result(&mut self, result: OperationResult) {
            self.results.push(result);
        }
    }

    unsafe fn vtbl<V>(raw: *mut c_void) -> &'static V {
        unsafe { &**(raw as *const *const V) }
    }

    #[test]
    fn test_extract_callback_vtable_dispatch() {
        let mut recorder = Recorder {
            buffer: Vec::new(),
            total: 0,
            results: Vec::new(),
        };
        {
            let mut server = ExtractCallbackServer::new(&mut recorder);
            let raw = server.as_raw();
            unsafe {
                let vt = vtbl::<IArchiveExtractCallbackVtbl>(raw);
                assert_eq!((vt.set_total)(raw, 5), S_OK);

                let mut stream = ptr::null_mut();
                assert_eq!((vt.get_stream)(raw, 0, &mut stream, 0), S_OK);
                assert!(!stream.is_null());

                let out = vtbl::<ISequentialOutStreamVtbl>(stream);
                let mut processed = 0u32;
                let data = b"hello";
                assert_eq!(
                    (out.write)(stream, data.as_ptr() as *const c_void, 5, &mut processed),
                    S_OK
                );
                assert_eq!(processed, 5);
                assert_eq!((out.base.release)(stream), 0);

                let mut skipped = ptr::null_mut();
                assert_eq!((vt.get_stream)(raw, 1, &mut skipped, 0), S_OK);
                assert!(skipped.is_null());

                assert_eq!((vt.set_operation_result)(raw, 3), S_OK);
            }
            assert!(server.take_error().is_none());
        }
        assert_eq!(recorder.buffer, b"hello");
        assert_eq!(recorder.total, 5);
        assert_eq!(recorder.results, vec![OperationResult::CrcError]);
    }

    #[test]
    fn test_query_interface_answers_known_ids_only() {
        let mut recorder = Recorder {
            buffer: Vec::new(),
            total: 0,
            results: Vec::new(),
        };
        let mut server = ExtractCallbackServer::new(&mut recorder);
        let raw = server.as_raw();
        unsafe {
            let vt = vtbl::<IUnknownVtbl>(raw);
            let mut out = ptr::null_mut();
            assert_eq!((vt.query_interface)(raw, &IID_IUNKNOWN, &mut out), S_OK);
            assert_eq!(out, raw);
            assert_eq!((vt.release)(raw), 1);

            let mut out = ptr::null_mut();
            let hr = (vt.query_interface)(raw, &IID_ISEQUENTIAL_OUT_STREAM, &mut out);
            assert_ne!(hr, S_OK);
            assert!(out.is_null());
        }
    }

    #[test]
    fn test_in_stream_read_and_seek() {
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        tmp.seek(SeekFrom::Start(0)).unwrap();

        let raw = InStreamServer::into_raw(tmp);
        unsafe {
            let vt = vtbl::<IInStreamVtbl>(raw);
            let mut position = 0u64;
            assert_eq!((vt.seek)(raw, 4, 0, &mut position), S_OK);
            assert_eq!(position, 4);

            let mut buf = [0u8; 3];
            let mut processed = 0u32;
            assert_eq!(
                (vt.read)(raw, buf.as_mut_ptr() as *mut c_void, 3, &mut processed),
                S_OK
            );
            assert_eq!(processed, 3);
            assert_eq!(&buf, b"456");

            assert_eq!((vt.seek)(raw, -2, 0, &mut position), E_NEGATIVE_SEEK);
            InStreamServer::release_raw(raw);
        }
    }
}
