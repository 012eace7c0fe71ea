//! COM-style GUIDs used to address classes and interfaces in the native module.

use std::fmt;

/// A 128-bit globally unique identifier in the Windows `GUID` memory layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid {
    /// First 32 bits.
    pub data1: u32,
    /// Next 16 bits.
    pub data2: u16,
    /// Next 16 bits.
    pub data3: u16,
    /// Remaining 64 bits.
    pub data4: [u8; 8],
}

impl Guid {
    /// Creates a GUID from its components.
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Class id of a 7-Zip archive handler: `{23170F69-40C1-278A-1000-000110xx0000}`.
    pub const fn handler(format_id: u8) -> Self {
        Self::new(
            0x2317_0F69,
            0x40C1,
            0x278A,
            [0x10, 0x00, 0x00, 0x01, 0x10, format_id, 0x00, 0x00],
        )
    }

    /// Interface id in the 7-Zip namespace: `{23170F69-40C1-278A-0000-00gg00ii0000}`.
    pub const fn interface(group: u8, id: u8) -> Self {
        Self::new(
            0x2317_0F69,
            0x40C1,
            0x278A,
            [0x00, 0x00, 0x00, group, 0x00, id, 0x00, 0x00],
        )
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

/// `IUnknown`.
pub const IID_IUNKNOWN: Guid = Guid::new(
    0x0000_0000,
    0x0000,
    0x0000,
    [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
);
/// `IProgress`.
pub const IID_IPROGRESS: Guid = Guid::interface(0x00, 0x05);
/// `ISequentialInStream`.
pub const IID_ISEQUENTIAL_IN_STREAM: Guid = Guid::interface(0x03, 0x01);
/// `ISequentialOutStream`.
pub const IID_ISEQUENTIAL_OUT_STREAM: Guid = Guid::interface(0x03, 0x02);
/// `IInStream`.
pub const IID_IIN_STREAM: Guid = Guid::interface(0x03, 0x03);
/// `IArchiveExtractCallback`.
pub const IID_IARCHIVE_EXTRACT_CALLBACK: Guid = Guid::interface(0x06, 0x20);
/// `IInArchive`.
pub const IID_IIN_ARCHIVE: Guid = Guid::interface(0x06, 0x60);
/// `IOutArchive`.
pub const IID_IOUT_ARCHIVE: Guid = Guid::interface(0x06, 0xA0);
