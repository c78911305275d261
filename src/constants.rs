use std::mem::size_of;

pub const FILE_HEADER_BASE_SIZE: u64 = (7 * size_of::<u16>() + 4 * size_of::<u32>()) as u64;
pub const CENTRAL_DIRECTORY_ENTRY_BASE_SIZE: u64 =
    (11 * size_of::<u16>() + 6 * size_of::<u32>()) as u64;
pub const END_OF_CENTRAL_DIRECTORY_SIZE: u64 = (5 * size_of::<u16>() + 3 * size_of::<u32>()) as u64;
pub const ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE: u64 = 56;
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE: u64 = 20;

pub const CENTRAL_DIRECTORY_END_SIGNATURE: u32 = 0x06054b50;
pub const ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE: u32 = 0x06064b50;
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE: u32 = 0x07064b50;
pub const CENTRAL_DIRECTORY_ENTRY_SIGNATURE: u32 = 0x02014b50;
pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50; // Local file header signature.
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50; // Data descriptor signature.

/// 32-bit fields holding this value defer to the Zip64 extra field.
pub const ZIP64_SENTINEL_32: u32 = 0xFFFF_FFFF;
/// 16-bit fields holding this value defer to the Zip64 structures.
pub const ZIP64_SENTINEL_16: u16 = 0xFFFF;

pub const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;
pub const X5455_EXTENDEDTIMESTAMP: u16 = 0x5455;

pub const DEFAULT_VERSION: u16 = 20;
pub const UNIX: u8 = 3;
pub const VERSION_MADE_BY: u16 = (UNIX as u16) << 8 | DEFAULT_VERSION;
pub const VERSION_USES_ZIP64_FORMAT_EXTENSIONS: u16 = 45;

pub const EXTENDED_LOCAL_HEADER_FLAG: u16 = 1 << 3;
pub const UTF8_NAME_FLAG: u16 = 1 << 11;

/// Longest possible distance between the EOCD signature and the end of the
/// archive: the 22-byte record plus a maximal 65 535-byte comment.
pub const END_OF_CENTRAL_DIRECTORY_SEARCH_SPAN: u64 =
    END_OF_CENTRAL_DIRECTORY_SIZE + u16::MAX as u64;

pub const S_IFDIR: u32 = 0o0040000;
pub const S_IFREG: u32 = 0o0100000;
pub const FILE_DEFAULT: u32 = 0o644;
pub const DIR_DEFAULT: u32 = 0o755;
pub const MS_DIR: u32 = 0x10;
