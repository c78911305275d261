use std::fmt::Debug;
use std::sync::Arc;

use crate::constants::CENTRAL_DIRECTORY_END_SIGNATURE;
use crate::constants::UNIX;
use crate::constants::VERSION_USES_ZIP64_FORMAT_EXTENSIONS;
use crate::constants::X5455_EXTENDEDTIMESTAMP;
use crate::constants::ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE;
use crate::constants::ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE;
use crate::constants::ZIP64_EXTRA_FIELD_ID;
use crate::constants::ZIP64_SENTINEL_16;
use crate::constants::ZIP64_SENTINEL_32;
use crate::error::ArchiveError;
use crate::types::DateTimeCS;

/// Little-endian byte buffer used to assemble every on-wire record.
#[derive(Debug)]
pub struct ArchiveDescriptor {
    buffer: Vec<u8>,
}

impl ArchiveDescriptor {
    pub fn new(capacity: u64) -> ArchiveDescriptor {
        ArchiveDescriptor {
            buffer: Vec::with_capacity(capacity as usize),
        }
    }

    pub fn write_u8(&mut self, val: u8) {
        self.buffer.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_u16(&mut self, val: u16) {
        self.buffer.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_u32(&mut self, val: u32) {
        self.buffer.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_i32(&mut self, val: i32) {
        self.buffer.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_u64(&mut self, val: u64) {
        self.buffer.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_bytes(&mut self, val: &[u8]) {
        self.buffer.extend_from_slice(val);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

/// Bounds-checked little-endian reader over a parsed record buffer.
#[derive(Default)]
pub struct ArchiveDescriptorReader {
    index: usize,
}

macro_rules! read_type {
    ($self:expr, $stream:expr, $typ:ty) => {{
        let upper_bound = $self.index + ::std::mem::size_of::<$typ>();
        if upper_bound > $stream.len() {
            return Err(ArchiveError::Truncated);
        }

        let read: [u8; ::std::mem::size_of::<$typ>()] =
            $stream[$self.index..upper_bound].try_into().expect("sized");
        $self.index = upper_bound;

        <$typ>::from_le_bytes(read)
    }};
}

impl ArchiveDescriptorReader {
    pub fn new() -> ArchiveDescriptorReader {
        ArchiveDescriptorReader { index: 0 }
    }

    pub fn get_index(&self) -> usize {
        self.index
    }

    pub fn remaining(&self, stream: &[u8]) -> usize {
        stream.len().saturating_sub(self.index)
    }

    pub fn read_u16(&mut self, stream: &[u8]) -> Result<u16, ArchiveError> {
        Ok(read_type!(self, stream, u16))
    }

    pub fn read_u32(&mut self, stream: &[u8]) -> Result<u32, ArchiveError> {
        Ok(read_type!(self, stream, u32))
    }

    pub fn read_u64(&mut self, stream: &[u8]) -> Result<u64, ArchiveError> {
        Ok(read_type!(self, stream, u64))
    }

    pub fn read_bytes(&mut self, stream: &[u8], len: usize) -> Result<Vec<u8>, ArchiveError> {
        let upper_bound = self.index + len;
        if upper_bound > stream.len() {
            return Err(ArchiveError::Truncated);
        }

        let value = stream[self.index..upper_bound].to_owned();
        self.index = upper_bound;

        Ok(value)
    }

    pub fn skip(&mut self, stream: &[u8], len: usize) -> Result<(), ArchiveError> {
        let upper_bound = self.index + len;
        if upper_bound > stream.len() {
            return Err(ArchiveError::Truncated);
        }
        self.index = upper_bound;
        Ok(())
    }
}

/// Which base fields held an overflow sentinel, i.e. which fields the Zip64
/// extra record is expected to carry, in their fixed wire order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zip64Wanted {
    pub uncompressed_size: bool,
    pub compressed_size: bool,
    pub offset: bool,
    pub disk_number: bool,
}

impl Zip64Wanted {
    /// Sentinel set observed in a local header (which has no offset or disk
    /// fields of its own).
    pub fn from_local_sizes(compressed_size: u32, uncompressed_size: u32) -> Self {
        Zip64Wanted {
            uncompressed_size: uncompressed_size == ZIP64_SENTINEL_32,
            compressed_size: compressed_size == ZIP64_SENTINEL_32,
            offset: false,
            disk_number: false,
        }
    }
}

/// Scan an extra-field blob for the Zip64 extended-information record and
/// override the sentinel-marked fields of `entry`.
///
/// The record carries only the fields whose base value was a sentinel, in
/// fixed order: uncompressed size, compressed size, local-header offset,
/// then disk number. The scan is bounded: it stops when fewer than four
/// bytes remain or a declared record length would overrun the blob.
pub fn apply_zip64_extra(
    entry: &mut ArchiveFileEntry,
    wanted: Zip64Wanted,
    extra: &[u8],
) -> Result<(), ArchiveError> {
    let mut indexer = ArchiveDescriptorReader::new();

    while indexer.remaining(extra) >= 4 {
        let header_id = indexer.read_u16(extra)?;
        let data_size = indexer.read_u16(extra)? as usize;
        if data_size > indexer.remaining(extra) {
            break;
        }

        if header_id != ZIP64_EXTRA_FIELD_ID {
            indexer.skip(extra, data_size)?;
            continue;
        }

        let payload = &extra[indexer.get_index()..indexer.get_index() + data_size];
        let mut fields = ArchiveDescriptorReader::new();

        if wanted.uncompressed_size && fields.remaining(payload) >= 8 {
            entry.uncompressed_size = fields.read_u64(payload)?;
        }
        if wanted.compressed_size && fields.remaining(payload) >= 8 {
            entry.compressed_size = fields.read_u64(payload)?;
        }
        if wanted.offset && fields.remaining(payload) >= 8 {
            entry.offset = fields.read_u64(payload)?;
        }
        if wanted.disk_number && fields.remaining(payload) >= 4 {
            entry.file_disk_number = fields.read_u32(payload)?;
        }

        indexer.skip(extra, data_size)?;
    }

    Ok(())
}

/// A writer-side extra field, emitted into the local and central headers.
pub trait ExtraField: Debug + Send + Sync {
    fn local_header_extra_field_size(&self, archive_file_entry: &ArchiveFileEntry) -> u16;
    fn central_header_extra_field_size(&self, archive_file_entry: &ArchiveFileEntry) -> u16;

    fn local_header_write_data(
        &self,
        archive_descriptor: &mut ArchiveDescriptor,
        archive_file_entry: &ArchiveFileEntry,
    );

    fn central_header_extra_write_data(
        &self,
        archive_descriptor: &mut ArchiveDescriptor,
        archive_file_entry: &ArchiveFileEntry,
    );
}

/// Info-Zip extended timestamp (0x5455): unix modification time carried next
/// to the 2-second DOS time.
///
/// The central-directory variant carries the modification time only; access
/// and creation times appear in the local header when set.
#[derive(Debug, Default)]
pub struct ExtraFieldExtendedTimestamp {
    flags: u8,
    modify_time: Option<i32>,
    access_time: Option<i32>,
    create_time: Option<i32>,
}

impl ExtraFieldExtendedTimestamp {
    pub const HEADER_ID: u16 = X5455_EXTENDEDTIMESTAMP;

    const MODIFY_TIME_BIT: u8 = 1;
    const ACCESS_TIME_BIT: u8 = 2;
    const CREATE_TIME_BIT: u8 = 4;

    pub fn new(
        modify_time: Option<i32>,
        access_time: Option<i32>,
        create_time: Option<i32>,
    ) -> Self {
        let mut field = Self::default();
        field.set_time(modify_time, Self::MODIFY_TIME_BIT, |f, t| f.modify_time = t);
        field.set_time(access_time, Self::ACCESS_TIME_BIT, |f, t| f.access_time = t);
        field.set_time(create_time, Self::CREATE_TIME_BIT, |f, t| f.create_time = t);
        field
    }

    fn set_time(&mut self, time: Option<i32>, bit: u8, store: impl Fn(&mut Self, Option<i32>)) {
        store(self, time);
        if time.is_some() {
            self.flags |= bit;
        } else {
            self.flags &= !bit;
        }
    }

    fn local_header_extra_field_data_size(&self) -> u16 {
        1 + (self.flags.count_ones() * 4) as u16
    }

    fn central_header_extra_field_data_size(&self) -> u16 {
        1 + ((self.flags & Self::MODIFY_TIME_BIT).count_ones() * 4) as u16
    }
}

impl ExtraField for ExtraFieldExtendedTimestamp {
    fn local_header_extra_field_size(&self, _archive_file_entry: &ArchiveFileEntry) -> u16 {
        if self.flags == 0 {
            return 0;
        }
        4 + self.local_header_extra_field_data_size()
    }

    fn central_header_extra_field_size(&self, _archive_file_entry: &ArchiveFileEntry) -> u16 {
        if self.flags == 0 {
            return 0;
        }
        4 + self.central_header_extra_field_data_size()
    }

    fn local_header_write_data(
        &self,
        archive_descriptor: &mut ArchiveDescriptor,
        _archive_file_entry: &ArchiveFileEntry,
    ) {
        if self.flags == 0 {
            return;
        }

        archive_descriptor.write_u16(Self::HEADER_ID);
        archive_descriptor.write_u16(self.local_header_extra_field_data_size());
        archive_descriptor.write_u8(self.flags);

        if let Some(modify_time) = self.modify_time {
            archive_descriptor.write_i32(modify_time);
        }
        if let Some(access_time) = self.access_time {
            archive_descriptor.write_i32(access_time);
        }
        if let Some(create_time) = self.create_time {
            archive_descriptor.write_i32(create_time);
        }
    }

    fn central_header_extra_write_data(
        &self,
        archive_descriptor: &mut ArchiveDescriptor,
        _archive_file_entry: &ArchiveFileEntry,
    ) {
        if self.flags == 0 {
            return;
        }

        archive_descriptor.write_u16(Self::HEADER_ID);
        archive_descriptor.write_u16(self.central_header_extra_field_data_size());
        archive_descriptor.write_u8(self.flags);

        if let Some(modify_time) = self.modify_time {
            archive_descriptor.write_i32(modify_time);
        }
    }
}

/// Zip64 extended information (0x0001).
///
/// The order of the fields is fixed, but a field appears only when the
/// corresponding base field of the record is set to 0xFFFF or 0xFFFFFFFF.
/// The local-header variant must carry both the original and compressed
/// sizes whenever it appears at all.
#[derive(Debug, Default)]
pub struct ExtraFieldZIP64ExtendedInformation {}

impl ExtraFieldZIP64ExtendedInformation {
    pub const HEADER_ID: u16 = ZIP64_EXTRA_FIELD_ID;

    pub fn new() -> Self {
        Self {}
    }

    fn central_data_size(archive_file_entry: &ArchiveFileEntry) -> u16 {
        let mut size = 0u16;
        if archive_file_entry.uncompressed_size >= ZIP64_SENTINEL_32 as u64 {
            size += 8;
        }
        if archive_file_entry.compressed_size >= ZIP64_SENTINEL_32 as u64 {
            size += 8;
        }
        if archive_file_entry.offset >= ZIP64_SENTINEL_32 as u64 {
            size += 8;
        }
        if archive_file_entry.file_disk_number >= ZIP64_SENTINEL_16 as u32 {
            size += 4;
        }
        size
    }
}

impl ExtraField for ExtraFieldZIP64ExtendedInformation {
    fn local_header_extra_field_size(&self, archive_file_entry: &ArchiveFileEntry) -> u16 {
        let needed = archive_file_entry.uncompressed_size >= ZIP64_SENTINEL_32 as u64
            || archive_file_entry.compressed_size >= ZIP64_SENTINEL_32 as u64;
        if needed {
            4 + 16
        } else {
            0
        }
    }

    fn central_header_extra_field_size(&self, archive_file_entry: &ArchiveFileEntry) -> u16 {
        let size = Self::central_data_size(archive_file_entry);
        if size == 0 {
            0
        } else {
            4 + size
        }
    }

    fn local_header_write_data(
        &self,
        archive_descriptor: &mut ArchiveDescriptor,
        archive_file_entry: &ArchiveFileEntry,
    ) {
        if self.local_header_extra_field_size(archive_file_entry) == 0 {
            return;
        }

        archive_descriptor.write_u16(Self::HEADER_ID);
        archive_descriptor.write_u16(16);
        archive_descriptor.write_u64(archive_file_entry.uncompressed_size);
        archive_descriptor.write_u64(archive_file_entry.compressed_size);
    }

    fn central_header_extra_write_data(
        &self,
        archive_descriptor: &mut ArchiveDescriptor,
        archive_file_entry: &ArchiveFileEntry,
    ) {
        let size = Self::central_data_size(archive_file_entry);
        if size == 0 {
            return;
        }

        archive_descriptor.write_u16(Self::HEADER_ID);
        archive_descriptor.write_u16(size);

        if archive_file_entry.uncompressed_size >= ZIP64_SENTINEL_32 as u64 {
            archive_descriptor.write_u64(archive_file_entry.uncompressed_size);
        }
        if archive_file_entry.compressed_size >= ZIP64_SENTINEL_32 as u64 {
            archive_descriptor.write_u64(archive_file_entry.compressed_size);
        }
        if archive_file_entry.offset >= ZIP64_SENTINEL_32 as u64 {
            archive_descriptor.write_u64(archive_file_entry.offset);
        }
        if archive_file_entry.file_disk_number >= ZIP64_SENTINEL_16 as u32 {
            archive_descriptor.write_u32(archive_file_entry.file_disk_number);
        }
    }
}

/// Per-entry metadata shared by the local header, the central directory and
/// both reader variants.
///
/// Sizes and the offset are 64-bit here; the wire form narrows them to 32
/// bits with overflow sentinels forwarding to the Zip64 extra field.
#[derive(Debug, Default)]
pub struct ArchiveFileEntry {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub general_purpose_flags: u16,
    /// Raw method code; resolved to a [`CompressionMethod`](crate::compression::CompressionMethod)
    /// when the entry's data is opened.
    pub compression_method: u16,
    pub last_mod_file_time: u16,
    pub last_mod_file_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub file_name_as_bytes: Vec<u8>,
    /// Raw extra blob: as stored in the archive when reading, the caller's
    /// verbatim bytes when writing (generated extras are appended after it).
    pub extra: Vec<u8>,
    pub file_comment: Option<Vec<u8>>,
    /// Offset of the local header, populated by indexed reads and the writer.
    pub offset: u64,
    pub file_disk_number: u32,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub extra_fields: Vec<Arc<dyn ExtraField>>,
}

impl ArchiveFileEntry {
    pub fn file_name(&self) -> String {
        String::from_utf8_lossy(&self.file_name_as_bytes).to_string()
    }

    /// A forward-slash-terminated name designates a directory entry.
    pub fn is_dir(&self) -> bool {
        self.file_name_as_bytes.last() == Some(&b'/')
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// Bit 3: sizes and CRC are deferred to a trailing data descriptor.
    pub fn has_data_descriptor(&self) -> bool {
        self.general_purpose_flags & crate::constants::EXTENDED_LOCAL_HEADER_FLAG != 0
    }

    pub fn is_zip64(&self) -> bool {
        self.uncompressed_size >= ZIP64_SENTINEL_32 as u64
            || self.compressed_size >= ZIP64_SENTINEL_32 as u64
            || self.offset >= ZIP64_SENTINEL_32 as u64
    }

    pub fn version_needed_to_extract(&self) -> u16 {
        if self.is_zip64() {
            self.version_needed
                .max(VERSION_USES_ZIP64_FORMAT_EXTENSIONS)
        } else {
            self.version_needed
        }
    }

    pub(crate) fn clamped_compressed_size(&self) -> u32 {
        self.compressed_size.min(ZIP64_SENTINEL_32 as u64) as u32
    }

    pub(crate) fn clamped_uncompressed_size(&self) -> u32 {
        self.uncompressed_size.min(ZIP64_SENTINEL_32 as u64) as u32
    }

    pub(crate) fn clamped_offset(&self) -> u32 {
        self.offset.min(ZIP64_SENTINEL_32 as u64) as u32
    }

    pub(crate) fn file_comment_length(&self) -> u16 {
        match &self.file_comment {
            Some(comment) => comment.len() as u16,
            None => 0,
        }
    }

    pub fn date_time(&self) -> DateTimeCS {
        DateTimeCS::from_msdos(self.last_mod_file_date, self.last_mod_file_time)
    }

    /// Unix permission bits from the external attributes, when the entry was
    /// made on a unix-compatible system.
    pub fn unix_mode(&self) -> Option<u32> {
        if (self.version_made_by >> 8) as u8 == UNIX {
            Some((self.external_file_attributes >> 16) & 0xFFFF)
        } else {
            None
        }
    }
}

/// End-of-central-directory bookkeeping, classical and Zip64 forms.
#[derive(Debug, Default)]
pub struct CentralDirectoryEnd {
    pub number_of_this_disk: u32,
    pub number_of_the_disk_with_central_directory: u32,
    pub total_number_of_entries_on_this_disk: u64,
    pub total_number_of_entries_in_the_central_directory: u64,
    pub central_directory_size: u64,
    pub offset_of_start_of_central_directory: u64,
    pub archive_comment: Option<Vec<u8>>,
}

impl CentralDirectoryEnd {
    /// Set the raw bytes of the archive comment, truncated to 0xFFFF bytes.
    pub fn set_archive_comment(&mut self, comment: &str) {
        let bytes = comment.as_bytes();
        let len = std::cmp::min(bytes.len(), u16::MAX as usize);
        self.archive_comment = Some(bytes[0..len].to_owned());
    }

    // Per spec 4.4.1.4 - when a classical EOCD field is insufficient to hold
    // the required value, the archive carries a ZIP64 record and the
    // classical field is set to its sentinel.
    pub fn needs_zip64_format_extensions(&self) -> bool {
        self.total_number_of_entries_on_this_disk >= ZIP64_SENTINEL_16 as u64
            || self.total_number_of_entries_in_the_central_directory >= ZIP64_SENTINEL_16 as u64
            || self.central_directory_size >= ZIP64_SENTINEL_32 as u64
            || self.offset_of_start_of_central_directory >= ZIP64_SENTINEL_32 as u64
    }

    pub fn create_zip64_end_of_central_directory_record(
        &self,
        end_of_central_directory: &mut ArchiveDescriptor,
    ) {
        // Size of the record not counting the 12-byte signature+size header.
        const SIZE_OF_THE_EOCD64_MINUS_12: u64 = 44;

        end_of_central_directory.write_u32(ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE);
        end_of_central_directory.write_u64(SIZE_OF_THE_EOCD64_MINUS_12);
        end_of_central_directory.write_u16(VERSION_USES_ZIP64_FORMAT_EXTENSIONS);
        end_of_central_directory.write_u16(VERSION_USES_ZIP64_FORMAT_EXTENSIONS);
        end_of_central_directory.write_u32(self.number_of_this_disk);
        end_of_central_directory.write_u32(self.number_of_the_disk_with_central_directory);
        end_of_central_directory.write_u64(self.total_number_of_entries_on_this_disk);
        end_of_central_directory.write_u64(self.total_number_of_entries_in_the_central_directory);
        end_of_central_directory.write_u64(self.central_directory_size);
        end_of_central_directory.write_u64(self.offset_of_start_of_central_directory);
    }

    pub fn create_end_of_central_directory_locator(
        &self,
        zip64_eocd_offset: u64,
        end_of_central_directory: &mut ArchiveDescriptor,
    ) {
        end_of_central_directory.write_u32(ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE);
        end_of_central_directory.write_u32(self.number_of_the_disk_with_central_directory);
        end_of_central_directory.write_u64(zip64_eocd_offset);
        end_of_central_directory.write_u32(1); // total number of disks
    }

    pub fn create_end_of_central_directory(
        &self,
        end_of_central_directory: &mut ArchiveDescriptor,
    ) {
        end_of_central_directory.write_u32(CENTRAL_DIRECTORY_END_SIGNATURE);
        end_of_central_directory
            .write_u16(self.number_of_this_disk.min(ZIP64_SENTINEL_16 as u32) as u16);
        end_of_central_directory.write_u16(
            self.number_of_the_disk_with_central_directory
                .min(ZIP64_SENTINEL_16 as u32) as u16,
        );
        end_of_central_directory.write_u16(
            self.total_number_of_entries_on_this_disk
                .min(ZIP64_SENTINEL_16 as u64) as u16,
        );
        end_of_central_directory.write_u16(
            self.total_number_of_entries_in_the_central_directory
                .min(ZIP64_SENTINEL_16 as u64) as u16,
        );

        end_of_central_directory
            .write_u32(self.central_directory_size.min(ZIP64_SENTINEL_32 as u64) as u32);
        end_of_central_directory.write_u32(
            self.offset_of_start_of_central_directory
                .min(ZIP64_SENTINEL_32 as u64) as u32,
        );

        if let Some(comment) = &self.archive_comment {
            end_of_central_directory.write_u16(comment.len() as u16);
            end_of_central_directory.write_bytes(comment);
        } else {
            end_of_central_directory.write_u16(0);
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry_with(uncompressed: u64, compressed: u64, offset: u64) -> ArchiveFileEntry {
        ArchiveFileEntry {
            uncompressed_size: uncompressed,
            compressed_size: compressed,
            offset,
            ..Default::default()
        }
    }

    #[test]
    fn zip64_extra_overrides_only_wanted_fields() {
        let mut extra = ArchiveDescriptor::new(24);
        extra.write_u16(ZIP64_EXTRA_FIELD_ID);
        extra.write_u16(16);
        extra.write_u64(5);
        extra.write_u64(5);

        let mut entry = entry_with(
            ZIP64_SENTINEL_32 as u64,
            ZIP64_SENTINEL_32 as u64,
            7, // not sentinel-marked, must stay untouched
        );
        let wanted = Zip64Wanted::from_local_sizes(ZIP64_SENTINEL_32, ZIP64_SENTINEL_32);
        apply_zip64_extra(&mut entry, wanted, extra.buffer()).unwrap();

        assert_eq!(entry.uncompressed_size, 5);
        assert_eq!(entry.compressed_size, 5);
        assert_eq!(entry.offset, 7);
    }

    #[test]
    fn zip64_extra_partial_presence() {
        // Only the uncompressed size overflowed; the record carries one u64.
        let mut extra = ArchiveDescriptor::new(16);
        extra.write_u16(ZIP64_EXTRA_FIELD_ID);
        extra.write_u16(8);
        extra.write_u64(0x1_0000_0001);

        let mut entry = entry_with(ZIP64_SENTINEL_32 as u64, 42, 0);
        let wanted = Zip64Wanted {
            uncompressed_size: true,
            ..Default::default()
        };
        apply_zip64_extra(&mut entry, wanted, extra.buffer()).unwrap();

        assert_eq!(entry.uncompressed_size, 0x1_0000_0001);
        assert_eq!(entry.compressed_size, 42);
    }

    #[test]
    fn zip64_extra_found_behind_other_records() {
        let mut extra = ArchiveDescriptor::new(32);
        extra.write_u16(0x5455);
        extra.write_u16(5);
        extra.write_bytes(&[1, 0, 0, 0, 0]);
        extra.write_u16(ZIP64_EXTRA_FIELD_ID);
        extra.write_u16(8);
        extra.write_u64(99);

        let mut entry = entry_with(ZIP64_SENTINEL_32 as u64, 1, 0);
        let wanted = Zip64Wanted {
            uncompressed_size: true,
            ..Default::default()
        };
        apply_zip64_extra(&mut entry, wanted, extra.buffer()).unwrap();
        assert_eq!(entry.uncompressed_size, 99);
    }

    #[test]
    fn zip64_scan_is_bounded() {
        // Declared length overruns the blob; the scan must stop, not read.
        let mut extra = ArchiveDescriptor::new(8);
        extra.write_u16(ZIP64_EXTRA_FIELD_ID);
        extra.write_u16(200);
        extra.write_u32(1);

        let mut entry = entry_with(ZIP64_SENTINEL_32 as u64, 1, 0);
        let wanted = Zip64Wanted {
            uncompressed_size: true,
            ..Default::default()
        };
        apply_zip64_extra(&mut entry, wanted, extra.buffer()).unwrap();
        assert_eq!(entry.uncompressed_size, ZIP64_SENTINEL_32 as u64);

        // Trailing garbage shorter than a record header is ignored too.
        apply_zip64_extra(&mut entry, wanted, &[0x01, 0x00, 0x02]).unwrap();
        assert_eq!(entry.uncompressed_size, ZIP64_SENTINEL_32 as u64);
    }

    #[test]
    fn central_zip64_extra_emits_overflowed_fields_in_order() {
        let entry = entry_with(ZIP64_SENTINEL_32 as u64 + 1, 3, ZIP64_SENTINEL_32 as u64 + 9);
        let field = ExtraFieldZIP64ExtendedInformation::new();

        assert_eq!(field.central_header_extra_field_size(&entry), 4 + 16);

        let mut descriptor = ArchiveDescriptor::new(20);
        field.central_header_extra_write_data(&mut descriptor, &entry);
        let buffer = descriptor.buffer();

        assert_eq!(&buffer[0..2], &0x0001u16.to_le_bytes());
        assert_eq!(&buffer[2..4], &16u16.to_le_bytes());
        assert_eq!(
            &buffer[4..12],
            &(ZIP64_SENTINEL_32 as u64 + 1).to_le_bytes()
        );
        assert_eq!(
            &buffer[12..20],
            &(ZIP64_SENTINEL_32 as u64 + 9).to_le_bytes()
        );
    }

    #[test]
    fn small_entry_emits_no_zip64_extra() {
        let entry = entry_with(10, 5, 100);
        let field = ExtraFieldZIP64ExtendedInformation::new();
        assert_eq!(field.central_header_extra_field_size(&entry), 0);

        let mut descriptor = ArchiveDescriptor::new(4);
        field.central_header_extra_write_data(&mut descriptor, &entry);
        assert!(descriptor.is_empty());
    }

    #[test]
    fn timestamp_extra_sizes() {
        let field = ExtraFieldExtendedTimestamp::new(Some(1_582_248_020), None, None);
        let entry = ArchiveFileEntry::default();
        assert_eq!(field.local_header_extra_field_size(&entry), 4 + 1 + 4);
        assert_eq!(field.central_header_extra_field_size(&entry), 4 + 1 + 4);

        let all = ExtraFieldExtendedTimestamp::new(Some(1), Some(2), Some(3));
        assert_eq!(all.local_header_extra_field_size(&entry), 4 + 1 + 12);
        // The central variant carries the modification time only.
        assert_eq!(all.central_header_extra_field_size(&entry), 4 + 1 + 4);
    }

    #[test]
    fn eocd_zip64_thresholds() {
        let mut end = CentralDirectoryEnd::default();
        assert!(!end.needs_zip64_format_extensions());

        end.total_number_of_entries_in_the_central_directory = ZIP64_SENTINEL_16 as u64;
        assert!(end.needs_zip64_format_extensions());

        end.total_number_of_entries_in_the_central_directory = 3;
        end.offset_of_start_of_central_directory = ZIP64_SENTINEL_32 as u64;
        assert!(end.needs_zip64_format_extensions());
    }

    #[test]
    fn classical_eocd_clamps_to_sentinels() {
        let mut end = CentralDirectoryEnd::default();
        end.total_number_of_entries_on_this_disk = 100_000;
        end.total_number_of_entries_in_the_central_directory = 100_000;
        end.central_directory_size = u64::MAX / 2;
        end.offset_of_start_of_central_directory = u64::MAX / 2;

        let mut descriptor = ArchiveDescriptor::new(22);
        end.create_end_of_central_directory(&mut descriptor);
        let buffer = descriptor.buffer();

        assert_eq!(&buffer[0..4], &CENTRAL_DIRECTORY_END_SIGNATURE.to_le_bytes());
        assert_eq!(&buffer[8..10], &ZIP64_SENTINEL_16.to_le_bytes());
        assert_eq!(&buffer[10..12], &ZIP64_SENTINEL_16.to_le_bytes());
        assert_eq!(&buffer[12..16], &ZIP64_SENTINEL_32.to_le_bytes());
        assert_eq!(&buffer[16..20], &ZIP64_SENTINEL_32.to_le_bytes());
        assert_eq!(&buffer[20..22], &0u16.to_le_bytes());
    }
}
