//! Archive reading.
//!
//! Two reader variants share the entry-header codec:
//!
//! * [`stream::StreamReader`] consumes a non-seekable byte source and yields
//!   entries in physical archive order, one at a time.
//! * [`archive::ArchiveReader`] consumes a positional byte source, indexes
//!   the central directory and serves independent random-access reads.

pub mod archive;
pub mod stream;

use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher;

use crate::archive_common::{apply_zip64_extra, ArchiveFileEntry, Zip64Wanted};
use crate::error::ArchiveError;

/// Parse the local file header whose 4-byte signature the caller has already
/// consumed, including the filename and extra blob.
///
/// Sentinel-marked sizes are overridden from the Zip64 extra field when one
/// is present; otherwise they stay at their sentinel values and bit 3
/// governs how the entry's data range terminates.
pub(crate) fn parse_local_header<R: Read>(
    reader: &mut R,
) -> Result<ArchiveFileEntry, ArchiveError> {
    let version_needed = read_u16(reader)?;
    let general_purpose_flags = read_u16(reader)?;
    let compression_method = read_u16(reader)?;
    let last_mod_file_time = read_u16(reader)?;
    let last_mod_file_date = read_u16(reader)?;
    let crc32 = read_u32(reader)?;
    let compressed_size = read_u32(reader)?;
    let uncompressed_size = read_u32(reader)?;
    let file_name_len = read_u16(reader)?;
    let extra_field_length = read_u16(reader)?;

    let mut file_name_as_bytes = vec![0u8; file_name_len as usize];
    reader
        .read_exact(&mut file_name_as_bytes)
        .map_err(ArchiveError::from_read)?;

    let mut extra = vec![0u8; extra_field_length as usize];
    reader
        .read_exact(&mut extra)
        .map_err(ArchiveError::from_read)?;

    let mut archive_file_entry = ArchiveFileEntry {
        version_needed,
        general_purpose_flags,
        compression_method,
        last_mod_file_time,
        last_mod_file_date,
        crc32,
        compressed_size: compressed_size as u64,
        uncompressed_size: uncompressed_size as u64,
        file_name_as_bytes,
        ..Default::default()
    };

    let wanted = Zip64Wanted::from_local_sizes(compressed_size, uncompressed_size);
    apply_zip64_extra(&mut archive_file_entry, wanted, &extra)?;
    archive_file_entry.extra = extra;

    Ok(archive_file_entry)
}

pub(crate) fn read_u16<R: Read>(reader: &mut R) -> Result<u16, ArchiveError> {
    reader
        .read_u16::<LittleEndian>()
        .map_err(ArchiveError::from_read)
}

pub(crate) fn read_u32<R: Read>(reader: &mut R) -> Result<u32, ArchiveError> {
    reader
        .read_u32::<LittleEndian>()
        .map_err(ArchiveError::from_read)
}

pub(crate) fn read_u64<R: Read>(reader: &mut R) -> Result<u64, ArchiveError> {
    reader
        .read_u64::<LittleEndian>()
        .map_err(ArchiveError::from_read)
}

/// `Read` adapter that accumulates a CRC-32 over everything it yields and
/// verifies it against the header value once the underlying data ends.
///
/// The mismatch surfaces as an `InvalidData` I/O error wrapping
/// [`ArchiveError::ChecksumMismatch`], so it propagates through plain
/// `std::io::Read` consumers.
pub struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
    expected: u32,
    file_name: String,
    checked: bool,
}

impl<R> Crc32Reader<R> {
    pub(crate) fn new(inner: R, expected: u32, file_name: String) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            expected,
            file_name,
            checked: false,
        }
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;

        if count == 0 {
            if !self.checked {
                self.checked = true;
                let actual = self.hasher.clone().finalize();
                if actual != self.expected {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        ArchiveError::ChecksumMismatch {
                            filename: self.file_name.clone(),
                            expected: self.expected,
                            actual,
                        },
                    ));
                }
            }
            return Ok(0);
        }

        self.hasher.update(&buf[..count]);
        Ok(count)
    }
}
