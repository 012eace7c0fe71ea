//! Archive format tags and their native class identifiers.
//!
//! Formats are split into two disjoint sets: [`InArchiveFormat`] for formats
//! the native module can read, and [`OutArchiveFormat`] for formats it can
//! write. The mapping from a format to the class id passed to the module's
//! `CreateObject` entry point is a fixed table known at build time.

use std::fmt;

use crate::guid::{self, Guid};

macro_rules! format_table {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => ($id:expr, $label:expr), )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[non_exhaustive]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// All formats in this set.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The handler id byte embedded in the class id.
            pub const fn handler_id(self) -> u8 {
                match self {
                    $($name::$variant => $id,)+
                }
            }

            /// Human-readable format name.
            pub const fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            /// Class id of the format's handler inside the native module.
            pub const fn class_id(self) -> Guid {
                Guid::handler(self.handler_id())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

format_table! {
    /// Formats the native module can open and extract.
    pub enum InArchiveFormat {
        /// 7-Zip archive.
        SevenZip => (0x07, "7z"),
        /// ARJ archive.
        Arj => (0x04, "ARJ"),
        /// BZip2 stream.
        BZip2 => (0x02, "BZip2"),
        /// Microsoft cabinet.
        Cab => (0x08, "CAB"),
        /// Compiled HTML help.
        Chm => (0xE9, "CHM"),
        /// Microsoft compound document (MSI, DOC).
        Compound => (0xE5, "Compound"),
        /// CPIO archive.
        Cpio => (0xED, "CPIO"),
        /// Debian package.
        Deb => (0xEC, "DEB"),
        /// GZip stream.
        GZip => (0xEF, "GZip"),
        /// ISO-9660 image.
        Iso => (0xE7, "ISO"),
        /// LHA/LZH archive.
        Lzh => (0x06, "LZH"),
        /// Raw LZMA stream.
        Lzma => (0x0A, "LZMA"),
        /// NSIS installer.
        Nsis => (0x09, "NSIS"),
        /// RAR 5 archive.
        Rar => (0xCC, "RAR"),
        /// RAR 1.5-4.x archive.
        Rar4 => (0x03, "RAR4"),
        /// RPM package.
        Rpm => (0xEB, "RPM"),
        /// Split volume set.
        Split => (0xEA, "Split"),
        /// Tape archive.
        Tar => (0xEE, "TAR"),
        /// Windows imaging format.
        Wim => (0xE6, "WIM"),
        /// Unix compress (`.Z`).
        Lzw => (0x05, "Z"),
        /// ZIP archive.
        Zip => (0x01, "ZIP"),
        /// UDF image.
        Udf => (0xE0, "UDF"),
        /// XAR archive.
        Xar => (0xE1, "XAR"),
        /// Mac universal binary.
        Mub => (0xE2, "MUB"),
        /// HFS image.
        Hfs => (0xE3, "HFS"),
        /// Apple disk image.
        Dmg => (0xE4, "DMG"),
        /// XZ stream.
        XZ => (0x0C, "XZ"),
        /// MS-LZ compressed file.
        Mslz => (0xD5, "MSLZ"),
        /// Flash video.
        Flv => (0xD6, "FLV"),
        /// Shockwave flash.
        Swf => (0xD7, "SWF"),
        /// Windows PE executable.
        PE => (0xDD, "PE"),
        /// ELF executable.
        Elf => (0xDE, "ELF"),
        /// Virtual hard disk.
        Vhd => (0xDC, "VHD"),
        /// FAT image.
        Fat => (0xDA, "FAT"),
        /// NTFS image.
        Ntfs => (0xD9, "NTFS"),
        /// SquashFS image.
        SquashFs => (0xD2, "SquashFS"),
        /// CramFS image.
        CramFs => (0xD3, "CramFS"),
    }
}

#[cfg(feature = "compress")]
format_table! {
    /// Formats the native module can create.
    pub enum OutArchiveFormat {
        /// 7-Zip archive.
        SevenZip => (0x07, "7z"),
        /// ZIP archive.
        Zip => (0x01, "ZIP"),
        /// GZip stream.
        GZip => (0xEF, "GZip"),
        /// BZip2 stream.
        BZip2 => (0x02, "BZip2"),
        /// Tape archive.
        Tar => (0xEE, "TAR"),
        /// XZ stream.
        XZ => (0x0C, "XZ"),
    }
}

/// Which capability interface a format is used through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    /// `IInArchive`: open and extract.
    InArchive,
    /// `IOutArchive`: create and update.
    #[cfg(feature = "compress")]
    OutArchive,
}

impl InterfaceKind {
    /// Interface id passed to `CreateObject`.
    pub const fn interface_id(self) -> Guid {
        match self {
            InterfaceKind::InArchive => guid::IID_IIN_ARCHIVE,
            #[cfg(feature = "compress")]
            InterfaceKind::OutArchive => guid::IID_IOUT_ARCHIVE,
        }
    }
}

/// A format tag from either set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// An input (read) format.
    In(InArchiveFormat),
    /// An output (write) format.
    #[cfg(feature = "compress")]
    Out(OutArchiveFormat),
}

impl ArchiveFormat {
    /// Class id of the format's handler.
    pub const fn class_id(self) -> Guid {
        match self {
            ArchiveFormat::In(f) => f.class_id(),
            #[cfg(feature = "compress")]
            ArchiveFormat::Out(f) => f.class_id(),
        }
    }

    /// The interface this format is used through.
    pub const fn kind(self) -> InterfaceKind {
        match self {
            ArchiveFormat::In(_) => InterfaceKind::InArchive,
            #[cfg(feature = "compress")]
            ArchiveFormat::Out(_) => InterfaceKind::OutArchive,
        }
    }
}

impl From<InArchiveFormat> for ArchiveFormat {
    fn from(format: InArchiveFormat) -> Self {
        ArchiveFormat::In(format)
    }
}

#[cfg(feature = "compress")]
impl From<OutArchiveFormat> for ArchiveFormat {
    fn from(format: OutArchiveFormat) -> Self {
        ArchiveFormat::Out(format)
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveFormat::In(format) => write!(f, "{} (read)", format),
            #[cfg(feature = "compress")]
            ArchiveFormat::Out(format) => write!(f, "{} (write)", format),
        }
    }
}
