use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::archive_common::{
    apply_zip64_extra, ArchiveDescriptorReader, ArchiveFileEntry, Zip64Wanted,
};
use crate::compression::CompressionMethod;
use crate::constants::{
    CENTRAL_DIRECTORY_END_SIGNATURE, CENTRAL_DIRECTORY_ENTRY_SIGNATURE,
    END_OF_CENTRAL_DIRECTORY_SEARCH_SPAN, END_OF_CENTRAL_DIRECTORY_SIZE, FILE_HEADER_BASE_SIZE,
    LOCAL_FILE_HEADER_SIGNATURE, ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE,
    ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE, ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE,
    ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE, ZIP64_SENTINEL_16, ZIP64_SENTINEL_32,
};
use crate::error::ArchiveError;
use crate::uncompress::Crc32Reader;

/// A positional byte source: the indexed reader's only requirement.
///
/// `cursor` opens an independent logical read position over a byte range, so
/// multiple entry reads can progress at the same time and keep working after
/// the [`ArchiveReader`] itself is gone.
pub trait RandomRead: Send + Sync {
    fn len(&self) -> Result<u64, ArchiveError>;
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), ArchiveError>;
    fn cursor(&self, offset: u64, length: u64) -> Result<Box<dyn Read + Send>, ArchiveError>;
}

/// Archive backed by a file path.
///
/// Every [`cursor`](RandomRead::cursor) opens a fresh handle at the original
/// path, so entry reads are independent of each other and of the handle used
/// to index the archive.
pub struct FileSource {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_owned();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, File>, ArchiveError> {
        self.file
            .lock()
            .map_err(|_| ArchiveError::IllegalState("archive source lock poisoned"))
    }
}

impl RandomRead for FileSource {
    fn len(&self) -> Result<u64, ArchiveError> {
        Ok(self.lock()?.metadata()?.len())
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), ArchiveError> {
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf).map_err(ArchiveError::from_read)
    }

    fn cursor(&self, offset: u64, length: u64) -> Result<Box<dyn Read + Send>, ArchiveError> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(Box::new(file.take(length)))
    }
}

/// Archive held in memory; cursors are range-bounded views over shared bytes.
pub struct BytesSource {
    data: Arc<[u8]>,
}

impl From<Vec<u8>> for BytesSource {
    fn from(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }
}

impl From<&[u8]> for BytesSource {
    fn from(data: &[u8]) -> Self {
        Self { data: data.into() }
    }
}

impl From<Arc<[u8]>> for BytesSource {
    fn from(data: Arc<[u8]>) -> Self {
        Self { data }
    }
}

impl RandomRead for BytesSource {
    fn len(&self) -> Result<u64, ArchiveError> {
        Ok(self.data.len() as u64)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), ArchiveError> {
        let start = offset as usize;
        let end = start
            .checked_add(buf.len())
            .filter(|end| *end <= self.data.len())
            .ok_or(ArchiveError::Truncated)?;
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn cursor(&self, offset: u64, length: u64) -> Result<Box<dyn Read + Send>, ArchiveError> {
        let start = (offset as usize).min(self.data.len());
        let end = start.saturating_add(length as usize).min(self.data.len());
        Ok(Box::new(SliceCursor {
            data: Arc::clone(&self.data),
            position: start,
            end,
        }))
    }
}

struct SliceCursor {
    data: Arc<[u8]>,
    position: usize,
    end: usize,
}

impl Read for SliceCursor {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let count = buf.len().min(self.end - self.position);
        buf[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;
        Ok(count)
    }
}

/// One indexed entry: the central-directory metadata plus the lazily
/// resolved offset of its payload.
pub struct ArchiveEntry {
    meta: ArchiveFileEntry,
    /// Resolved on first open from the local header's own name and extra
    /// lengths, which may differ from the central directory's. Zero means
    /// unresolved (a real offset of zero implies an impossible layout).
    data_offset: AtomicU64,
}

impl ArchiveEntry {
    pub fn meta(&self) -> &ArchiveFileEntry {
        &self.meta
    }

    pub fn file_name(&self) -> String {
        self.meta.file_name()
    }
}

/// Random-access reader over a seekable archive.
///
/// Construction locates the end-of-central-directory record (promoting to
/// the Zip64 form when sentinels demand it) and materialises the entry list
/// in central-directory order plus a first-wins filename map.
pub struct ArchiveReader<S: RandomRead> {
    source: Arc<S>,
    entries: Vec<ArchiveEntry>,
    names: HashMap<String, usize>,
    comment: Vec<u8>,
}

impl ArchiveReader<FileSource> {
    /// Index the archive at `path`. Entry reads open fresh handles at the
    /// same path, so they outlive this reader.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        Self::with_source(FileSource::open(path)?)
    }
}

impl ArchiveReader<BytesSource> {
    /// Index an archive held in memory.
    pub fn from_bytes(data: impl Into<BytesSource>) -> Result<Self, ArchiveError> {
        Self::with_source(data.into())
    }
}

impl<S: RandomRead> ArchiveReader<S> {
    pub fn with_source(source: S) -> Result<Self, ArchiveError> {
        let source = Arc::new(source);
        let (end, comment) = find_end_of_central_directory(source.as_ref())?;
        let entries = read_central_directory(source.as_ref(), &end)?;

        let mut names = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            names.entry(entry.file_name()).or_insert(index);
        }

        Ok(Self {
            source,
            entries,
            names,
            comment,
        })
    }

    /// Entries in central-directory order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The archive-level comment, possibly empty.
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Look an entry up by its exact filename. The first of duplicate names
    /// wins; duplicates are not produced by this crate's writer.
    pub fn by_name(&self, name: &str) -> Option<&ArchiveEntry> {
        self.names.get(name).map(|&index| &self.entries[index])
    }

    /// Open an entry's data for reading.
    ///
    /// Each open starts a fresh decoder over an independent cursor; open
    /// readers do not disturb one another. The returned reader verifies the
    /// central directory's CRC-32 once its data is exhausted.
    pub fn open(&self, entry: &ArchiveEntry) -> Result<EntryReader, ArchiveError> {
        let method = CompressionMethod::from_compression_method(entry.meta.compression_method)?;
        let data_offset = self.resolve_data_offset(entry)?;
        let cursor = self
            .source
            .cursor(data_offset, entry.meta.compressed_size)?;

        let body = match method {
            CompressionMethod::Store => EntryBody::Stored(cursor),
            CompressionMethod::Deflate => {
                EntryBody::Deflated(flate2::read::DeflateDecoder::new(cursor))
            }
        };

        Ok(EntryReader {
            inner: Crc32Reader::new(body, entry.meta.crc32, entry.meta.file_name()),
        })
    }

    /// `data_offset = local_header_offset + 30 + name_len + extra_len`, with
    /// the lengths taken from the local header itself: they are allowed to
    /// differ from the central directory's copies. The central directory
    /// stays authoritative for sizes and CRC.
    fn resolve_data_offset(&self, entry: &ArchiveEntry) -> Result<u64, ArchiveError> {
        let cached = entry.data_offset.load(Ordering::Relaxed);
        if cached != 0 {
            return Ok(cached);
        }

        let mut header = [0u8; FILE_HEADER_BASE_SIZE as usize];
        self.source.read_exact_at(entry.meta.offset, &mut header)?;

        let signature = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if signature != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(ArchiveError::BadSignature {
                expected: LOCAL_FILE_HEADER_SIGNATURE,
                found: signature,
                offset: entry.meta.offset,
            });
        }

        let file_name_len = u16::from_le_bytes([header[26], header[27]]) as u64;
        let extra_field_len = u16::from_le_bytes([header[28], header[29]]) as u64;
        let data_offset = entry.meta.offset + 30 + file_name_len + extra_field_len;

        entry.data_offset.store(data_offset, Ordering::Relaxed);
        Ok(data_offset)
    }
}

/// Decoded, CRC-verified view of one entry's data.
pub struct EntryReader {
    inner: Crc32Reader<EntryBody>,
}

enum EntryBody {
    Stored(Box<dyn Read + Send>),
    Deflated(flate2::read::DeflateDecoder<Box<dyn Read + Send>>),
}

impl Read for EntryBody {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            EntryBody::Stored(reader) => reader.read(buf),
            EntryBody::Deflated(reader) => reader.read(buf),
        }
    }
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Resolved terminator state: 64-bit counts and offsets, post-promotion.
struct EndOfCentralDirectory {
    entries_total: u64,
    central_directory_size: u64,
    central_directory_offset: u64,
}

fn find_end_of_central_directory<S: RandomRead>(
    source: &S,
) -> Result<(EndOfCentralDirectory, Vec<u8>), ArchiveError> {
    let file_length = source.len()?;
    if file_length < END_OF_CENTRAL_DIRECTORY_SIZE {
        return Err(ArchiveError::Truncated);
    }

    // Small-archive fast path first, then the full 65 557-byte span.
    let mut searched = 0u64;
    for window in [1024u64, END_OF_CENTRAL_DIRECTORY_SEARCH_SPAN] {
        let span = window.min(file_length);
        if span == searched {
            break;
        }
        searched = span;

        let window_start = file_length - span;
        let mut buffer = vec![0u8; span as usize];
        source.read_exact_at(window_start, &mut buffer)?;

        let record_size = END_OF_CENTRAL_DIRECTORY_SIZE as usize;
        for candidate in (0..=buffer.len() - record_size).rev() {
            let signature = u32::from_le_bytes([
                buffer[candidate],
                buffer[candidate + 1],
                buffer[candidate + 2],
                buffer[candidate + 3],
            ]);
            if signature != CENTRAL_DIRECTORY_END_SIGNATURE {
                continue;
            }
            // The declared comment must run exactly to the end of the file.
            let comment_len =
                u16::from_le_bytes([buffer[candidate + 20], buffer[candidate + 21]]) as usize;
            if candidate + record_size + comment_len != buffer.len() {
                continue;
            }

            return parse_end_of_central_directory(
                source,
                &buffer[candidate..],
                window_start + candidate as u64,
            );
        }
    }

    Err(ArchiveError::BadSignature {
        expected: CENTRAL_DIRECTORY_END_SIGNATURE,
        found: 0,
        offset: file_length,
    })
}

fn parse_end_of_central_directory<S: RandomRead>(
    source: &S,
    record: &[u8],
    eocd_offset: u64,
) -> Result<(EndOfCentralDirectory, Vec<u8>), ArchiveError> {
    let mut indexer = ArchiveDescriptorReader::new();
    let _signature = indexer.read_u32(record)?;
    let disk_number = indexer.read_u16(record)?;
    let cd_start_disk = indexer.read_u16(record)?;
    let entries_on_disk = indexer.read_u16(record)?;
    let entries_total = indexer.read_u16(record)?;
    let central_directory_size = indexer.read_u32(record)?;
    let central_directory_offset = indexer.read_u32(record)?;
    let comment_len = indexer.read_u16(record)?;
    let comment = indexer.read_bytes(record, comment_len as usize)?;

    let needs_zip64 = entries_on_disk == ZIP64_SENTINEL_16
        || entries_total == ZIP64_SENTINEL_16
        || central_directory_size == ZIP64_SENTINEL_32
        || central_directory_offset == ZIP64_SENTINEL_32;

    if !needs_zip64 && (disk_number != 0 || cd_start_disk != 0) {
        return Err(ArchiveError::Unsupported(
            "multi-disk archives are not supported",
        ));
    }

    let mut end = EndOfCentralDirectory {
        entries_total: entries_total as u64,
        central_directory_size: central_directory_size as u64,
        central_directory_offset: central_directory_offset as u64,
    };

    if needs_zip64 {
        let zip64 = read_zip64_end_of_central_directory(source, eocd_offset)?;
        // Zip64 values override only the sentinel-marked classical fields.
        if entries_total == ZIP64_SENTINEL_16 {
            end.entries_total = zip64.entries_total;
        }
        if central_directory_size == ZIP64_SENTINEL_32 {
            end.central_directory_size = zip64.central_directory_size;
        }
        if central_directory_offset == ZIP64_SENTINEL_32 {
            end.central_directory_offset = zip64.central_directory_offset;
        }
    }

    if end.entries_total > i32::MAX as u64 {
        return Err(ArchiveError::SizeOverflow("more than INT32_MAX entries"));
    }
    if end.central_directory_offset > i64::MAX as u64
        || end.central_directory_size > i64::MAX as u64
    {
        return Err(ArchiveError::SizeOverflow(
            "central directory beyond INT63_MAX",
        ));
    }
    if end
        .central_directory_offset
        .saturating_add(end.central_directory_size)
        > source.len()?
    {
        return Err(ArchiveError::Truncated);
    }

    Ok((end, comment))
}

fn read_zip64_end_of_central_directory<S: RandomRead>(
    source: &S,
    eocd_offset: u64,
) -> Result<EndOfCentralDirectory, ArchiveError> {
    let locator_offset = eocd_offset
        .checked_sub(ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE)
        .ok_or(ArchiveError::Truncated)?;

    let mut locator = [0u8; ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE as usize];
    source.read_exact_at(locator_offset, &mut locator)?;

    let mut indexer = ArchiveDescriptorReader::new();
    let signature = indexer.read_u32(&locator)?;
    if signature != ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE {
        return Err(ArchiveError::BadSignature {
            expected: ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIGNATURE,
            found: signature,
            offset: locator_offset,
        });
    }
    let _zip64_eocd_disk = indexer.read_u32(&locator)?;
    let zip64_eocd_offset = indexer.read_u64(&locator)?;
    let total_disks = indexer.read_u32(&locator)?;
    if total_disks > 1 {
        return Err(ArchiveError::Unsupported(
            "multi-disk archives are not supported",
        ));
    }

    let mut record = [0u8; ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE as usize];
    source.read_exact_at(zip64_eocd_offset, &mut record)?;

    let mut indexer = ArchiveDescriptorReader::new();
    let signature = indexer.read_u32(&record)?;
    if signature != ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE {
        return Err(ArchiveError::BadSignature {
            expected: ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE,
            found: signature,
            offset: zip64_eocd_offset,
        });
    }
    // Any bytes past the fixed 44-byte payload form an extensible-data
    // sector; they are skipped by never being read.
    let _size_of_record = indexer.read_u64(&record)?;
    let _version_made_by = indexer.read_u16(&record)?;
    let _version_needed = indexer.read_u16(&record)?;
    let this_disk = indexer.read_u32(&record)?;
    let cd_start_disk = indexer.read_u32(&record)?;
    let _entries_on_disk = indexer.read_u64(&record)?;
    let entries_total = indexer.read_u64(&record)?;
    let central_directory_size = indexer.read_u64(&record)?;
    let central_directory_offset = indexer.read_u64(&record)?;

    if this_disk != 0 || cd_start_disk != 0 {
        return Err(ArchiveError::Unsupported(
            "multi-disk archives are not supported",
        ));
    }

    Ok(EndOfCentralDirectory {
        entries_total,
        central_directory_size,
        central_directory_offset,
    })
}

fn read_central_directory<S: RandomRead>(
    source: &S,
    end: &EndOfCentralDirectory,
) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut central_directory_buffer = vec![0u8; end.central_directory_size as usize];
    source.read_exact_at(end.central_directory_offset, &mut central_directory_buffer)?;

    let mut indexer = ArchiveDescriptorReader::new();
    let mut entries = Vec::with_capacity(end.entries_total.min(1 << 16) as usize);

    for _ in 0..end.entries_total {
        let record_offset = end.central_directory_offset + indexer.get_index() as u64;
        let signature = indexer.read_u32(&central_directory_buffer)?;
        if signature != CENTRAL_DIRECTORY_ENTRY_SIGNATURE {
            return Err(ArchiveError::BadSignature {
                expected: CENTRAL_DIRECTORY_ENTRY_SIGNATURE,
                found: signature,
                offset: record_offset,
            });
        }

        let meta = parse_central_header(&mut indexer, &central_directory_buffer)?;
        if meta.file_disk_number != 0 {
            return Err(ArchiveError::Unsupported(
                "entry claims to start on a non-zero disk",
            ));
        }

        entries.push(ArchiveEntry {
            meta,
            data_offset: AtomicU64::new(0),
        });
    }

    Ok(entries)
}

/// Parse one central-directory header; the signature was already consumed.
fn parse_central_header(
    indexer: &mut ArchiveDescriptorReader,
    buffer: &[u8],
) -> Result<ArchiveFileEntry, ArchiveError> {
    let version_made_by = indexer.read_u16(buffer)?;
    let version_needed = indexer.read_u16(buffer)?;
    let general_purpose_flags = indexer.read_u16(buffer)?;
    let compression_method = indexer.read_u16(buffer)?;
    let last_mod_file_time = indexer.read_u16(buffer)?;
    let last_mod_file_date = indexer.read_u16(buffer)?;
    let crc32 = indexer.read_u32(buffer)?;
    let compressed_size = indexer.read_u32(buffer)?;
    let uncompressed_size = indexer.read_u32(buffer)?;
    let file_name_len = indexer.read_u16(buffer)?;
    let extra_field_length = indexer.read_u16(buffer)?;
    let file_comment_length = indexer.read_u16(buffer)?;
    let file_disk_number = indexer.read_u16(buffer)?;
    let internal_file_attributes = indexer.read_u16(buffer)?;
    let external_file_attributes = indexer.read_u32(buffer)?;
    let offset = indexer.read_u32(buffer)?;
    let file_name_as_bytes = indexer.read_bytes(buffer, file_name_len as usize)?;
    let extra = indexer.read_bytes(buffer, extra_field_length as usize)?;
    let file_comment = if file_comment_length != 0 {
        Some(indexer.read_bytes(buffer, file_comment_length as usize)?)
    } else {
        None
    };

    let mut archive_file_entry = ArchiveFileEntry {
        version_made_by,
        version_needed,
        general_purpose_flags,
        compression_method,
        last_mod_file_time,
        last_mod_file_date,
        crc32,
        compressed_size: compressed_size as u64,
        uncompressed_size: uncompressed_size as u64,
        file_name_as_bytes,
        file_comment,
        offset: offset as u64,
        file_disk_number: file_disk_number as u32,
        internal_file_attributes,
        external_file_attributes,
        ..Default::default()
    };

    let wanted = Zip64Wanted {
        uncompressed_size: uncompressed_size == ZIP64_SENTINEL_32,
        compressed_size: compressed_size == ZIP64_SENTINEL_32,
        offset: offset == ZIP64_SENTINEL_32,
        disk_number: file_disk_number == ZIP64_SENTINEL_16,
    };
    apply_zip64_extra(&mut archive_file_entry, wanted, &extra)?;
    archive_file_entry.extra = extra;

    Ok(archive_file_entry)
}
