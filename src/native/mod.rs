//! The boundary to the native 7-Zip module.
//!
//! The manager never talks to a shared library directly; it goes through two
//! seams:
//!
//! - [`ModuleLoader`] turns a path into a loaded [`NativeModule`]
//! - [`NativeModule`] answers entry-point queries and creates interface
//!   objects through the module's single `CreateObject` factory
//!
//! The production implementations are [`DynamicLoader`] and
//! [`DynamicModule`], built on `libloading`. Objects created by the module
//! are exposed through the [`InArchive`] and [`OutArchive`] capability
//! traits; extraction output flows back through [`ExtractCallback`].

mod archive;
mod callback;
pub(crate) mod com;
mod library;

pub use archive::ComInArchive;
#[cfg(feature = "compress")]
pub use archive::ComOutArchive;
pub use library::{DynamicLoader, DynamicModule};

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::Result;
use crate::format::InterfaceKind;
use crate::guid::Guid;

/// Entry point used to confirm a file is a genuine 7-Zip module.
pub const HANDLER_PROPERTY_ENTRY_POINT: &str = "GetHandlerProperty";
/// Multi-format handler query, present in 9.x and later modules.
pub const HANDLER_PROPERTY2_ENTRY_POINT: &str = "GetHandlerProperty2";
/// The generic object factory.
pub const CREATE_OBJECT_ENTRY_POINT: &str = "CreateObject";
/// Module property query, present in 15.x and later modules.
pub const MODULE_PROP_ENTRY_POINT: &str = "GetModuleProp";

/// Version reported by the native module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleVersion {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
}

impl ModuleVersion {
    /// Creates a version.
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Decodes the packed `major << 16 | minor` form used by `GetModuleProp`.
    pub const fn from_packed(packed: u32) -> Self {
        Self {
            major: (packed >> 16) as u16,
            minor: packed as u16,
        }
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

/// Why the module's factory did not produce an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    /// The named entry point is missing from the module.
    MissingEntryPoint(&'static str),
    /// `CreateObject` returned a failure code or a null object.
    Rejected(i32),
}

/// An interface object created by the module.
#[derive(Clone)]
pub enum NativeObject {
    /// An `IInArchive` instance.
    In(Arc<dyn InArchive>),
    /// An `IOutArchive` instance.
    #[cfg(feature = "compress")]
    Out(Arc<dyn OutArchive>),
}

impl NativeObject {
    /// Gives the object's reference back to the module.
    pub fn release(&self) -> Result<()> {
        match self {
            NativeObject::In(archive) => archive.release(),
            #[cfg(feature = "compress")]
            NativeObject::Out(archive) => archive.release(),
        }
    }
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeObject::In(_) => f.write_str("NativeObject::In"),
            #[cfg(feature = "compress")]
            NativeObject::Out(_) => f.write_str("NativeObject::Out"),
        }
    }
}

/// A loaded native module.
pub trait NativeModule: fmt::Debug + Send {
    /// Path the module was loaded from.
    fn path(&self) -> &Path;

    /// Returns true if the module exports `name`.
    fn has_entry_point(&self, name: &str) -> bool;

    /// Version reported by the module, if it can tell.
    fn version(&self) -> Option<ModuleVersion>;

    /// Creates an object of class `class_id` exposing the interface `kind`.
    fn create_object(
        &self,
        class_id: &Guid,
        kind: InterfaceKind,
    ) -> std::result::Result<NativeObject, FactoryError>;

    /// Frees the module.
    fn unload(self: Box<Self>) -> Result<()>;
}

/// Loads native modules from disk.
pub trait ModuleLoader: Send + Sync {
    /// Loads the module at `path`.
    fn load(&self, path: &Path) -> Result<Box<dyn NativeModule>>;
}

/// What the native side intends to do with the stream it asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskMode {
    /// Decompress into the returned stream.
    Extract,
    /// Decompress and verify without writing.
    Test,
    /// Skip the item.
    Skip,
    /// A mode this crate does not know.
    Other(i32),
}

impl AskMode {
    /// Decodes the module's `Int32` ask mode.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => AskMode::Extract,
            1 => AskMode::Test,
            2 => AskMode::Skip,
            other => AskMode::Other(other),
        }
    }
}

/// Per-item result reported after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// The item was processed successfully.
    Ok,
    /// The item's compression method is not supported.
    UnsupportedMethod,
    /// The item's data is corrupt.
    DataError,
    /// CRC verification failed.
    CrcError,
    /// The item's data is unavailable.
    Unavailable,
    /// The data ended unexpectedly.
    UnexpectedEnd,
    /// Extra data follows the end of the item.
    DataAfterEnd,
    /// The input is not an archive.
    IsNotArc,
    /// The headers are corrupt.
    HeadersError,
    /// The password is wrong.
    WrongPassword,
    /// A code this crate does not know.
    Other(i32),
}

impl OperationResult {
    /// Decodes the module's `Int32` operation result.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => OperationResult::Ok,
            1 => OperationResult::UnsupportedMethod,
            2 => OperationResult::DataError,
            3 => OperationResult::CrcError,
            4 => OperationResult::Unavailable,
            5 => OperationResult::UnexpectedEnd,
            6 => OperationResult::DataAfterEnd,
            7 => OperationResult::IsNotArc,
            8 => OperationResult::HeadersError,
            9 => OperationResult::WrongPassword,
            other => OperationResult::Other(other),
        }
    }

    /// Returns true for [`OperationResult::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, OperationResult::Ok)
    }
}

/// Whether an extraction call writes data or only verifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractMode {
    /// Write decompressed data to the streams supplied by the callback.
    #[default]
    Extract,
    /// Decompress and verify only.
    Test,
}

impl ExtractMode {
    /// The `testMode` flag passed to `IInArchive::Extract`.
    pub fn test_flag(self) -> i32 {
        match self {
            ExtractMode::Extract => 0,
            ExtractMode::Test => 1,
        }
    }
}

/// The pull-based protocol through which the module asks for output streams.
///
/// During one extraction call the module may invoke these methods in any
/// order; `get_stream` is called once per item it processes.
pub trait ExtractCallback {
    /// Total number of bytes the operation will produce.
    fn set_total(&mut self, total: u64) {
        let _ = total;
    }

    /// Number of bytes produced so far.
    fn set_completed(&mut self, completed: u64) {
        let _ = completed;
    }

    /// Returns the stream for item `index`, or `None` to skip writing it.
    fn get_stream(&mut self, index: u32, mode: AskMode) -> Result<Option<&mut dyn Write>>;

    /// Called before the module starts processing the current item.
    fn prepare_operation(&mut self, mode: AskMode) {
        let _ = mode;
    }

    /// Called after the module finished the current item.
    fn set_operation_result(&mut self, result: OperationResult) {
        let _ = result;
    }
}

/// The input-archive capability: open and extract.
pub trait InArchive: fmt::Debug + Send + Sync {
    /// Opens the archive file at `path`.
    fn open(&self, path: &Path) -> Result<()>;

    /// Number of items in the opened archive.
    fn item_count(&self) -> Result<u32>;

    /// Runs one extraction call over `indices` (all items when `None`).
    ///
    /// Indices must be sorted in ascending order.
    fn extract(
        &self,
        indices: Option<&[u32]>,
        mode: ExtractMode,
        callback: &mut dyn ExtractCallback,
    ) -> Result<()>;

    /// Closes the opened archive.
    fn close(&self) -> Result<()>;

    /// Gives the object's reference back to the module.
    fn release(&self) -> Result<()>;
}

/// The output-archive capability.
#[cfg(feature = "compress")]
pub trait OutArchive: fmt::Debug + Send + Sync {
    /// Timestamp precision the handler stores (`NFileTimeType`).
    fn file_time_type(&self) -> Result<u32>;

    /// Gives the object's reference back to the module.
    fn release(&self) -> Result<()>;
}
