use std::collections::HashSet;
use std::io::{Read, Write};
use std::sync::Arc;

use crc32fast::Hasher;

use super::compressor::{compress, store};
use super::write_wrapper::WriteWrapper;
use super::FileOptions;
use crate::archive_common::{
    ArchiveDescriptor, ArchiveFileEntry, CentralDirectoryEnd, ExtraField,
    ExtraFieldExtendedTimestamp, ExtraFieldZIP64ExtendedInformation,
};
use crate::compression::CompressionMethod;
use crate::constants::{
    CENTRAL_DIRECTORY_ENTRY_BASE_SIZE, DATA_DESCRIPTOR_SIGNATURE, DIR_DEFAULT,
    EXTENDED_LOCAL_HEADER_FLAG, FILE_DEFAULT, FILE_HEADER_BASE_SIZE, LOCAL_FILE_HEADER_SIGNATURE,
    MS_DIR, S_IFDIR, S_IFREG, UTF8_NAME_FLAG, VERSION_MADE_BY, ZIP64_SENTINEL_32,
};
use crate::error::ArchiveError;

/// A zip archive under construction.
///
/// Append entries with [`append`](Self::append) (deflated),
/// [`append_stored`](Self::append_stored) (stored, caller-declared CRC and
/// size) or [`append_directory`](Self::append_directory), then call
/// [`finalize`](Self::finalize).
///
/// A failed append with [`ArchiveError::DuplicateEntryFilename`] leaves the
/// writer usable; any I/O failure poisons it and every later operation
/// reports [`ArchiveError::IllegalState`].
pub struct ZipArchive<W: Write> {
    sink: WriteWrapper<W>,
    files_info: Vec<ArchiveFileEntry>,
    file_names: HashSet<String>,
    central_directory_end: CentralDirectoryEnd,
    poisoned: bool,
}

impl<W: Write> ZipArchive<W> {
    /// Create a new zip archive writing headers and payloads to `sink`.
    pub fn new(sink: W) -> Self {
        Self {
            sink: WriteWrapper::new(sink),
            files_info: Vec::new(),
            file_names: HashSet::new(),
            central_directory_end: CentralDirectoryEnd::default(),
            poisoned: false,
        }
    }

    /// Archive bytes written so far.
    pub fn get_archive_size(&self) -> u64 {
        self.sink.get_written_bytes_count()
    }

    /// Set the archive comment, written after the end-of-central-directory
    /// record. Truncated to 65 535 bytes.
    pub fn set_archive_comment(&mut self, comment: &str) {
        self.central_directory_end.set_archive_comment(comment);
    }

    /// Append an entry compressed with deflate, streaming `payload` through
    /// the encoder.
    ///
    /// The local header commits to a trailing data descriptor (bit 3): CRC
    /// and sizes are zero inline and follow the payload once known.
    pub fn append<R>(
        &mut self,
        file_name: &str,
        options: &FileOptions,
        payload: &mut R,
    ) -> Result<(), ArchiveError>
    where
        R: Read,
    {
        self.claim_file_name(file_name)?;

        match self.append_deflate(file_name, options, payload) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// Append an entry stored without compression.
    ///
    /// The caller declares the CRC-32 and byte size up front; both are
    /// written inline in the local header and trusted, so no data
    /// descriptor is emitted.
    pub fn append_stored<R>(
        &mut self,
        file_name: &str,
        options: &FileOptions,
        crc32: u32,
        size: u64,
        payload: &mut R,
    ) -> Result<(), ArchiveError>
    where
        R: Read,
    {
        self.claim_file_name(file_name)?;

        match self.append_store(file_name, options, crc32, size, payload) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// Append a directory entry: the name is canonicalised to end in exactly
    /// one `'/'` and an empty stored entry is emitted.
    pub fn append_directory(
        &mut self,
        file_name: &str,
        options: &FileOptions,
    ) -> Result<(), ArchiveError> {
        let canonical = format!("{}/", file_name.trim_end_matches(['/', '\\']));

        self.claim_file_name(&canonical)?;

        match self.append_store(&canonical, options, 0, 0, &mut std::io::empty()) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// Finalize the archive: central directory, Zip64 terminator records
    /// when required, then the classical end-of-central-directory record.
    ///
    /// Returns the archive size in bytes and the sink passed at creation.
    pub fn finalize(mut self) -> Result<(u64, W), ArchiveError> {
        if self.poisoned {
            return Err(ArchiveError::IllegalState(
                "writer poisoned by a previous I/O error",
            ));
        }

        let central_directory_offset = self.sink.get_written_bytes_count();

        let mut central_directory_header =
            ArchiveDescriptor::new(CENTRAL_DIRECTORY_ENTRY_BASE_SIZE + 200);
        for file_info in &self.files_info {
            build_central_directory_file_header(&mut central_directory_header, file_info);
            self.sink.write_all(central_directory_header.buffer())?;
            central_directory_header.clear();
        }

        let central_directory_size =
            self.sink.get_written_bytes_count() - central_directory_offset;

        let end = &mut self.central_directory_end;
        end.total_number_of_entries_on_this_disk = self.files_info.len() as u64;
        end.total_number_of_entries_in_the_central_directory = self.files_info.len() as u64;
        end.central_directory_size = central_directory_size;
        end.offset_of_start_of_central_directory = central_directory_offset;

        let mut end_of_central_directory = ArchiveDescriptor::new(200);

        if end.needs_zip64_format_extensions() {
            let zip64_eocd_offset = self.sink.get_written_bytes_count();
            end.create_zip64_end_of_central_directory_record(&mut end_of_central_directory);
            end.create_end_of_central_directory_locator(
                zip64_eocd_offset,
                &mut end_of_central_directory,
            );
        }

        end.create_end_of_central_directory(&mut end_of_central_directory);

        self.sink.write_all(end_of_central_directory.buffer())?;
        self.sink.flush()?;

        Ok((
            self.sink.get_written_bytes_count(),
            self.sink.retrieve_writer(),
        ))
    }

    fn claim_file_name(&mut self, file_name: &str) -> Result<(), ArchiveError> {
        if self.poisoned {
            return Err(ArchiveError::IllegalState(
                "writer poisoned by a previous I/O error",
            ));
        }
        if !self.file_names.insert(file_name.to_owned()) {
            return Err(ArchiveError::DuplicateEntryFilename(file_name.to_owned()));
        }
        Ok(())
    }

    fn append_deflate<R: Read>(
        &mut self,
        file_name: &str,
        options: &FileOptions,
        payload: &mut R,
    ) -> Result<(), ArchiveError> {
        let offset = self.sink.get_written_bytes_count();
        let mut archive_file_entry = build_file_entry(
            file_name,
            options,
            CompressionMethod::Deflate,
            EXTENDED_LOCAL_HEADER_FLAG,
            offset,
        );

        let file_header = build_local_file_header(&archive_file_entry, options);
        self.sink.write_all(file_header.buffer())?;

        let payload_begin = self.sink.get_written_bytes_count();
        let mut hasher = Hasher::new();
        let uncompressed_size = compress(
            &mut self.sink,
            payload,
            &mut hasher,
            options.compression_level,
        )?;

        archive_file_entry.crc32 = hasher.finalize();
        archive_file_entry.compressed_size =
            self.sink.get_written_bytes_count() - payload_begin;
        archive_file_entry.uncompressed_size = uncompressed_size;

        let data_descriptor = build_data_descriptor(&archive_file_entry);
        self.sink.write_all(data_descriptor.buffer())?;

        self.push_entry(archive_file_entry);
        Ok(())
    }

    fn append_store<R: Read>(
        &mut self,
        file_name: &str,
        options: &FileOptions,
        crc32: u32,
        size: u64,
        payload: &mut R,
    ) -> Result<(), ArchiveError> {
        let offset = self.sink.get_written_bytes_count();
        let mut archive_file_entry =
            build_file_entry(file_name, options, CompressionMethod::Store, 0, offset);
        archive_file_entry.crc32 = crc32;
        archive_file_entry.compressed_size = size;
        archive_file_entry.uncompressed_size = size;

        let file_header = build_local_file_header(&archive_file_entry, options);
        self.sink.write_all(file_header.buffer())?;

        store(&mut self.sink, payload)?;

        self.push_entry(archive_file_entry);
        Ok(())
    }

    fn push_entry(&mut self, mut archive_file_entry: ArchiveFileEntry) {
        if archive_file_entry.is_zip64() {
            archive_file_entry
                .extra_fields
                .push(Arc::new(ExtraFieldZIP64ExtendedInformation::new()));
        }
        self.files_info.push(archive_file_entry);
    }
}

fn build_file_entry(
    file_name: &str,
    options: &FileOptions,
    compressor: CompressionMethod,
    base_flags: u16,
    offset: u64,
) -> ArchiveFileEntry {
    let file_name_as_bytes = file_name.as_bytes().to_owned();
    let is_dir = file_name_as_bytes.last() == Some(&b'/');

    let (date, time) = options.last_modified_time.ms_dos();

    let mut general_purpose_flags = base_flags;
    if !file_name.is_ascii() || options.comment.is_some_and(|c| !c.is_ascii()) {
        general_purpose_flags |= UTF8_NAME_FLAG;
    }

    let mut extra_fields: Vec<Arc<dyn ExtraField>> = Vec::new();
    if options.last_modified_time.extended_timestamp()
        || options.last_access_time.is_some()
        || options.last_creation_time.is_some()
    {
        extra_fields.push(Arc::new(ExtraFieldExtendedTimestamp::new(
            options.last_modified_time.timestamp(),
            options.last_access_time,
            options.last_creation_time,
        )));
    }

    let (unix_ftype, default_permissions, ms_dos_attributes) = if is_dir {
        (S_IFDIR, DIR_DEFAULT, MS_DIR)
    } else {
        (S_IFREG, FILE_DEFAULT, 0)
    };
    let unix_permissions = options.unix_permissions.unwrap_or(default_permissions) | unix_ftype;
    let external_file_attributes = (unix_permissions << 16) | ms_dos_attributes;

    ArchiveFileEntry {
        version_made_by: VERSION_MADE_BY,
        version_needed: compressor.zip_version_needed(),
        general_purpose_flags,
        compression_method: compressor.zip_code(),
        last_mod_file_time: time,
        last_mod_file_date: date,
        crc32: 0,
        compressed_size: 0,
        uncompressed_size: 0,
        file_name_as_bytes,
        extra: options.extra.map(<[u8]>::to_owned).unwrap_or_default(),
        file_comment: options.comment.map(|c| c.as_bytes().to_owned()),
        offset,
        file_disk_number: 0,
        internal_file_attributes: 0,
        external_file_attributes,
        extra_fields,
    }
}

/// Emit the 30-byte fixed local header plus name and extra bytes.
///
/// Only 32-bit sizes go inline; a stored entry past 4 GiB gets sentinel
/// sizes and a local Zip64 extra carrying both 64-bit values.
fn build_local_file_header(
    archive_file_entry: &ArchiveFileEntry,
    options: &FileOptions,
) -> ArchiveDescriptor {
    let zip64_extra = ExtraFieldZIP64ExtendedInformation::new();

    let mut extra_buffer = ArchiveDescriptor::new(64);
    if let Some(extra) = options.extra {
        extra_buffer.write_bytes(extra);
    }
    for extra_field in &archive_file_entry.extra_fields {
        extra_field.local_header_write_data(&mut extra_buffer, archive_file_entry);
    }
    zip64_extra.local_header_write_data(&mut extra_buffer, archive_file_entry);

    let file_name_len = archive_file_entry.file_name_as_bytes.len() as u16;

    let mut file_header =
        ArchiveDescriptor::new(FILE_HEADER_BASE_SIZE + file_name_len as u64 + 64);
    file_header.write_u32(LOCAL_FILE_HEADER_SIGNATURE);
    file_header.write_u16(archive_file_entry.version_needed_to_extract());
    file_header.write_u16(archive_file_entry.general_purpose_flags);
    file_header.write_u16(archive_file_entry.compression_method);
    file_header.write_u16(archive_file_entry.last_mod_file_time);
    file_header.write_u16(archive_file_entry.last_mod_file_date);
    file_header.write_u32(archive_file_entry.crc32);
    file_header.write_u32(archive_file_entry.clamped_compressed_size());
    file_header.write_u32(archive_file_entry.clamped_uncompressed_size());
    file_header.write_u16(file_name_len);
    file_header.write_u16(extra_buffer.len() as u16);
    file_header.write_bytes(&archive_file_entry.file_name_as_bytes);
    file_header.write_bytes(extra_buffer.buffer());

    file_header
}

/// Trailing data descriptor for a bit-3 entry: 32-bit sizes when both fit,
/// 64-bit otherwise.
fn build_data_descriptor(archive_file_entry: &ArchiveFileEntry) -> ArchiveDescriptor {
    let mut file_descriptor = ArchiveDescriptor::new(24);
    file_descriptor.write_u32(DATA_DESCRIPTOR_SIGNATURE);
    file_descriptor.write_u32(archive_file_entry.crc32);

    if archive_file_entry.compressed_size >= ZIP64_SENTINEL_32 as u64
        || archive_file_entry.uncompressed_size >= ZIP64_SENTINEL_32 as u64
    {
        file_descriptor.write_u64(archive_file_entry.compressed_size);
        file_descriptor.write_u64(archive_file_entry.uncompressed_size);
    } else {
        file_descriptor.write_u32(archive_file_entry.compressed_size as u32);
        file_descriptor.write_u32(archive_file_entry.uncompressed_size as u32);
    }

    file_descriptor
}

fn build_central_directory_file_header(
    central_directory_header: &mut ArchiveDescriptor,
    file_info: &ArchiveFileEntry,
) {
    let mut extra_buffer = ArchiveDescriptor::new(64);
    extra_buffer.write_bytes(&file_info.extra);
    for extra_field in &file_info.extra_fields {
        extra_field.central_header_extra_write_data(&mut extra_buffer, file_info);
    }

    central_directory_header.write_u32(crate::constants::CENTRAL_DIRECTORY_ENTRY_SIGNATURE);
    central_directory_header.write_u16(file_info.version_made_by);
    central_directory_header.write_u16(file_info.version_needed_to_extract());
    central_directory_header.write_u16(file_info.general_purpose_flags);
    central_directory_header.write_u16(file_info.compression_method);
    central_directory_header.write_u16(file_info.last_mod_file_time);
    central_directory_header.write_u16(file_info.last_mod_file_date);
    central_directory_header.write_u32(file_info.crc32);
    central_directory_header.write_u32(file_info.clamped_compressed_size());
    central_directory_header.write_u32(file_info.clamped_uncompressed_size());
    central_directory_header.write_u16(file_info.file_name_as_bytes.len() as u16);
    central_directory_header.write_u16(extra_buffer.len() as u16);
    central_directory_header.write_u16(file_info.file_comment_length());
    central_directory_header.write_u16(file_info.file_disk_number as u16);
    central_directory_header.write_u16(file_info.internal_file_attributes);
    central_directory_header.write_u32(file_info.external_file_attributes);
    central_directory_header.write_u32(file_info.clamped_offset());
    central_directory_header.write_bytes(&file_info.file_name_as_bytes);
    central_directory_header.write_bytes(extra_buffer.buffer());
    if let Some(comment) = &file_info.file_comment {
        central_directory_header.write_bytes(comment);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::{CENTRAL_DIRECTORY_END_SIGNATURE, END_OF_CENTRAL_DIRECTORY_SIZE};

    fn signature_at(buffer: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(buffer[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn local_header_is_30_bytes_plus_name() {
        let options = FileOptions::default().last_modified_time(crate::types::FileDateTime::Zero);
        let entry = build_file_entry(
            "file1.txt",
            &options,
            CompressionMethod::Deflate,
            EXTENDED_LOCAL_HEADER_FLAG,
            0,
        );
        let header = build_local_file_header(&entry, &options);

        assert_eq!(header.len(), 30 + "file1.txt".len());
        let buffer = header.buffer();
        assert_eq!(signature_at(buffer, 0), LOCAL_FILE_HEADER_SIGNATURE);
        // crc and both sizes are zero, deferred to the descriptor
        assert_eq!(&buffer[14..26], &[0u8; 12]);
        assert_eq!(&buffer[30..], b"file1.txt");
    }

    #[test]
    fn empty_archive_is_a_bare_eocd() {
        let archive = ZipArchive::new(Vec::new());
        let (size, sink) = archive.finalize().unwrap();

        assert_eq!(size, END_OF_CENTRAL_DIRECTORY_SIZE);
        assert_eq!(signature_at(&sink, 0), CENTRAL_DIRECTORY_END_SIGNATURE);
    }

    #[test]
    fn duplicate_name_rejected_without_poisoning() {
        let mut archive = ZipArchive::new(Vec::new());
        archive
            .append("foo.txt", &FileOptions::default(), &mut &b"contents"[..])
            .unwrap();

        let err = archive
            .append("foo.txt", &FileOptions::default(), &mut &b"again"[..])
            .unwrap_err();
        assert!(matches!(err, ArchiveError::DuplicateEntryFilename(name) if name == "foo.txt"));

        // Still usable afterwards.
        archive
            .append("bar.txt", &FileOptions::default(), &mut &b"other"[..])
            .unwrap();
        archive.finalize().unwrap();
    }

    #[test]
    fn directory_names_are_canonicalised() {
        let mut archive = ZipArchive::new(Vec::new());
        archive
            .append_directory("some/dir", &FileOptions::default())
            .unwrap();
        let err = archive
            .append_directory("some/dir/", &FileOptions::default())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::DuplicateEntryFilename(_)));
    }

    #[test]
    fn stored_entry_has_inline_sizes_and_no_descriptor() {
        let data = b"Hello";
        let crc = crc32fast::hash(data);

        let mut archive = ZipArchive::new(Vec::new());
        let options = FileOptions::default().last_modified_time(crate::types::FileDateTime::Zero);
        archive
            .append_stored("a.txt", &options, crc, data.len() as u64, &mut &data[..])
            .unwrap();
        let (_, sink) = archive.finalize().unwrap();

        assert_eq!(signature_at(&sink, 0), LOCAL_FILE_HEADER_SIGNATURE);
        let header_crc = u32::from_le_bytes(sink[14..18].try_into().unwrap());
        assert_eq!(header_crc, crc);
        let compressed = u32::from_le_bytes(sink[18..22].try_into().unwrap());
        assert_eq!(compressed, data.len() as u32);
        // Payload directly follows the header and name; then the central
        // directory begins with no intervening descriptor.
        let payload_start = 30 + "a.txt".len();
        assert_eq!(&sink[payload_start..payload_start + data.len()], data);
        assert_eq!(
            signature_at(&sink, payload_start + data.len()),
            crate::constants::CENTRAL_DIRECTORY_ENTRY_SIGNATURE
        );
    }

    #[test]
    fn deflated_entry_is_followed_by_descriptor() {
        let mut archive = ZipArchive::new(Vec::new());
        archive
            .append("f", &FileOptions::default(), &mut &b"payload bytes"[..])
            .unwrap();
        let (_, sink) = archive.finalize().unwrap();

        let flags = u16::from_le_bytes(sink[6..8].try_into().unwrap());
        assert_ne!(flags & EXTENDED_LOCAL_HEADER_FLAG, 0);

        let pattern = DATA_DESCRIPTOR_SIGNATURE.to_le_bytes();
        let position = sink
            .windows(4)
            .position(|w| w == &pattern[..])
            .expect("data descriptor present");
        let descriptor_crc = u32::from_le_bytes(sink[position + 4..position + 8].try_into().unwrap());
        assert_eq!(descriptor_crc, crc32fast::hash(b"payload bytes"));
    }
}
