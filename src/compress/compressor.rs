use std::io::{Read, Write};

use crc32fast::Hasher;
use flate2::write::DeflateEncoder;

use crate::{compression::Level, error::ArchiveError};

const COPY_BUFFER_SIZE: usize = 4096;

/// Stream `reader` through a raw-deflate encoder into `writer`, feeding the
/// CRC-32 hasher with the uncompressed bytes. Returns the uncompressed size.
pub fn compress<R, W>(
    writer: &mut W,
    reader: &mut R,
    hasher: &mut Hasher,
    compression_level: Level,
) -> Result<u64, ArchiveError>
where
    R: Read,
    W: Write + ?Sized,
{
    let mut encoder = DeflateEncoder::new(writer, compression_level.into());
    let mut buf = vec![0; COPY_BUFFER_SIZE];
    let mut total_read: u64 = 0;

    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        total_read += read as u64;
        hasher.update(&buf[..read]);
        encoder.write_all(&buf[..read])?;
    }
    encoder.finish()?;

    Ok(total_read)
}

/// Copy `reader` verbatim into `writer` for a stored payload. The caller's
/// declared size and CRC are trusted; this only reports what was copied.
pub fn store<R, W>(writer: &mut W, reader: &mut R) -> Result<u64, ArchiveError>
where
    R: Read,
    W: Write + ?Sized,
{
    let mut buf = vec![0; COPY_BUFFER_SIZE];
    let mut total_read: u64 = 0;

    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        total_read += read as u64;
        writer.write_all(&buf[..read])?;
    }

    Ok(total_read)
}
