use std::io::{self, BufRead, Read};

use crc32fast::Hasher;
use flate2::{Decompress, FlushDecompress, Status};

use crate::archive_common::ArchiveFileEntry;
use crate::compression::CompressionMethod;
use crate::constants::{
    CENTRAL_DIRECTORY_END_SIGNATURE, CENTRAL_DIRECTORY_ENTRY_SIGNATURE,
    DATA_DESCRIPTOR_SIGNATURE, LOCAL_FILE_HEADER_SIGNATURE,
};
use crate::error::ArchiveError;
use crate::uncompress::{parse_local_header, read_u32, read_u64};

const STREAM_BUFFER_SIZE: usize = 32 * 1024;
const DRAIN_BUFFER_SIZE: usize = 8 * 1024;

/// Look-ahead span needed to disambiguate 32- vs 64-bit data descriptors.
const DESCRIPTOR_LOOK_AHEAD: usize = 20;

/// Buffered reader with a bounded look-ahead window.
///
/// `peek` refills from the source until `want` bytes are buffered or the
/// source ends, without consuming anything; `BufRead::consume` advances.
pub(crate) struct PeekReader<R> {
    inner: R,
    buffer: Box<[u8]>,
    start: usize,
    end: usize,
    eof: bool,
    consumed: u64,
}

impl<R: Read> PeekReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: vec![0u8; STREAM_BUFFER_SIZE].into_boxed_slice(),
            start: 0,
            end: 0,
            eof: false,
            consumed: 0,
        }
    }

    pub(crate) fn into_inner(self) -> R {
        self.inner
    }

    /// Bytes handed out so far, i.e. the current archive offset.
    pub(crate) fn position(&self) -> u64 {
        self.consumed
    }

    fn available(&self) -> usize {
        self.end - self.start
    }

    fn fill(&mut self, want: usize) -> io::Result<()> {
        if self.available() >= want || self.eof {
            return Ok(());
        }

        if self.start > 0 {
            self.buffer.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }

        while self.available() < want && !self.eof {
            let read = self.inner.read(&mut self.buffer[self.end..])?;
            if read == 0 {
                self.eof = true;
            } else {
                self.end += read;
            }
        }

        Ok(())
    }

    /// Buffered view of the next `want` bytes; shorter only at end of input.
    pub(crate) fn peek(&mut self, want: usize) -> io::Result<&[u8]> {
        let want = want.min(self.buffer.len());
        self.fill(want)?;
        Ok(&self.buffer[self.start..self.end.min(self.start + want)])
    }
}

impl<R: Read> Read for PeekReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.available() == 0 {
            // Large reads bypass the look-ahead buffer entirely.
            if buf.len() >= self.buffer.len() {
                if self.eof {
                    return Ok(0);
                }
                let read = self.inner.read(buf)?;
                if read == 0 {
                    self.eof = true;
                }
                self.consumed += read as u64;
                return Ok(read);
            }
            self.fill(1)?;
            if self.available() == 0 {
                return Ok(0);
            }
        }

        let count = buf.len().min(self.available());
        buf[..count].copy_from_slice(&self.buffer[self.start..self.start + count]);
        self.start += count;
        self.consumed += count as u64;
        Ok(count)
    }
}

impl<R: Read> BufRead for PeekReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.available() == 0 {
            self.fill(1)?;
        }
        Ok(&self.buffer[self.start..self.end])
    }

    fn consume(&mut self, amt: usize) {
        let amt = amt.min(self.available());
        self.start += amt;
        self.consumed += amt as u64;
    }
}

/// Reads archive entries in physical order from a non-seekable byte source.
///
/// Each [`next_entry`](Self::next_entry) call first drains and verifies the
/// entry currently being read, then parses the next local header. Iteration
/// ends when the next signature is neither a local header nor a stray data
/// descriptor; central-directory and terminator records follow at that
/// point and are not consumed.
pub struct StreamReader<R: Read> {
    input: PeekReader<R>,
    current: Option<InFlightEntry>,
    /// Filename and accumulated CRC of a just-closed STORED bit-3 entry
    /// whose optional descriptor has not been seen yet.
    pending_stored_descriptor: Option<(String, u32)>,
    done: bool,
}

/// Handle to the entry currently positioned under a [`StreamReader`].
///
/// Valid only until the next [`StreamReader::next_entry`] call; requesting
/// the next entry drains and closes this one.
pub struct StreamEntry<'a, R: Read> {
    reader: &'a mut StreamReader<R>,
}

struct InFlightEntry {
    meta: ArchiveFileEntry,
    decoder: EntryDecoder,
    hasher: Hasher,
    finished: bool,
}

enum EntryDecoder {
    Stored {
        remaining: u64,
    },
    Deflate {
        inflater: Box<Decompress>,
        /// Compressed bytes left to feed for a sized stream; `None` when the
        /// stream terminates on the deflate end-of-stream marker alone.
        remaining_input: Option<u64>,
        done: bool,
    },
    /// Unknown method code: the entry yields an error on first data access.
    Unsupported {
        method: u16,
    },
}

struct DataDescriptor {
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
}

impl InFlightEntry {
    fn new(meta: ArchiveFileEntry) -> Self {
        let decoder = match CompressionMethod::from_compression_method(meta.compression_method) {
            Ok(CompressionMethod::Store) => EntryDecoder::Stored {
                remaining: meta.compressed_size,
            },
            Ok(CompressionMethod::Deflate) => {
                let unsized_stream = meta.compressed_size == 0 && meta.has_data_descriptor();
                EntryDecoder::Deflate {
                    inflater: Box::new(Decompress::new(false)),
                    remaining_input: if unsized_stream {
                        None
                    } else {
                        Some(meta.compressed_size)
                    },
                    done: false,
                }
            }
            Err(_) => EntryDecoder::Unsupported {
                method: meta.compression_method,
            },
        };

        InFlightEntry {
            meta,
            decoder,
            hasher: Hasher::new(),
            finished: false,
        }
    }
}

impl<R: Read> StreamReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            input: PeekReader::new(source),
            current: None,
            pending_stored_descriptor: None,
            done: false,
        }
    }

    /// Give back the underlying byte source. Its position is wherever
    /// iteration stopped.
    pub fn into_inner(self) -> R {
        self.input.into_inner()
    }

    /// Advance to the next entry, or `Ok(None)` once the central directory
    /// begins.
    ///
    /// Closing the previous entry verifies its CRC-32; a mismatch surfaces
    /// here as [`ArchiveError::ChecksumMismatch`] even when the caller never
    /// read the entry's data.
    pub fn next_entry(&mut self) -> Result<Option<StreamEntry<'_, R>>, ArchiveError> {
        if self.done {
            return Ok(None);
        }

        self.finish_current()?;

        loop {
            let record_offset = self.input.position();
            let head = self.input.peek(4)?;
            if head.len() < 4 {
                self.done = true;
                return Err(ArchiveError::Truncated);
            }
            let signature = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);

            match signature {
                LOCAL_FILE_HEADER_SIGNATURE => {
                    self.input.consume(4);
                    let meta = parse_local_header(&mut self.input)?;
                    self.pending_stored_descriptor = None;
                    self.current = Some(InFlightEntry::new(meta));
                    return Ok(Some(StreamEntry { reader: self }));
                }
                DATA_DESCRIPTOR_SIGNATURE => {
                    // A STORED bit-3 entry gives no earlier opportunity to
                    // consume its descriptor; it shows up here instead.
                    let Some((file_name, actual)) = self.pending_stored_descriptor.take() else {
                        self.done = true;
                        return Err(ArchiveError::BadSignature {
                            expected: LOCAL_FILE_HEADER_SIGNATURE,
                            found: DATA_DESCRIPTOR_SIGNATURE,
                            offset: record_offset,
                        });
                    };
                    self.input.consume(4);
                    let descriptor = read_descriptor_after_signature(&mut self.input)?;
                    if descriptor.crc32 != actual {
                        self.done = true;
                        return Err(ArchiveError::ChecksumMismatch {
                            filename: file_name,
                            expected: descriptor.crc32,
                            actual,
                        });
                    }
                    continue;
                }
                _ => {
                    self.done = true;
                    return Ok(None);
                }
            }
        }
    }

    /// Drain the in-flight entry, consume its trailing descriptor when one
    /// is owed, and verify the CRC-32.
    fn finish_current(&mut self) -> Result<(), ArchiveError> {
        let Some(mut entry) = self.current.take() else {
            return Ok(());
        };

        let mut scratch = [0u8; DRAIN_BUFFER_SIZE];
        while !entry.finished {
            pump(&mut self.input, &mut entry, &mut scratch)?;
        }

        let actual = entry.hasher.finalize();
        let deflated = entry.meta.compression_method == crate::compression::DEFLATE;

        if entry.meta.has_data_descriptor() && deflated {
            let descriptor = read_trailing_descriptor(&mut self.input)?;
            entry.meta.crc32 = descriptor.crc32;
            entry.meta.compressed_size = descriptor.compressed_size;
            entry.meta.uncompressed_size = descriptor.uncompressed_size;
            if descriptor.crc32 != actual {
                return Err(ArchiveError::ChecksumMismatch {
                    filename: entry.meta.file_name(),
                    expected: descriptor.crc32,
                    actual,
                });
            }
        } else if entry.meta.has_data_descriptor() {
            // STORED with bit 3: the optional descriptor, if written at all,
            // is the next record; verification happens when it is seen.
            self.pending_stored_descriptor = Some((entry.meta.file_name(), actual));
        } else if actual != entry.meta.crc32 {
            return Err(ArchiveError::ChecksumMismatch {
                filename: entry.meta.file_name(),
                expected: entry.meta.crc32,
                actual,
            });
        }

        Ok(())
    }

    fn read_current(&mut self, out: &mut [u8]) -> Result<usize, ArchiveError> {
        let Some(entry) = self.current.as_mut() else {
            return Ok(0);
        };
        pump(&mut self.input, entry, out)
    }
}

impl<'a, R: Read> StreamEntry<'a, R> {
    pub fn meta(&self) -> &ArchiveFileEntry {
        match &self.reader.current {
            Some(entry) => &entry.meta,
            None => unreachable!("stream entry outlived its reader slot"),
        }
    }
}

impl<'a, R: Read> Read for StreamEntry<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.reader.read_current(buf).map_err(|e| match e {
            ArchiveError::Io(io_error) => io_error,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        })
    }
}

/// Produce the next slice of decoded entry bytes, feeding the CRC hasher.
/// Returns `Ok(0)` only once the entry's data range is exhausted.
fn pump<R: Read>(
    input: &mut PeekReader<R>,
    entry: &mut InFlightEntry,
    out: &mut [u8],
) -> Result<usize, ArchiveError> {
    if out.is_empty() {
        return Ok(0);
    }

    match &mut entry.decoder {
        EntryDecoder::Stored { remaining } => {
            if *remaining == 0 {
                entry.finished = true;
                return Ok(0);
            }
            let want = (out.len() as u64).min(*remaining) as usize;
            let count = input.read(&mut out[..want])?;
            if count == 0 {
                return Err(ArchiveError::Truncated);
            }
            *remaining -= count as u64;
            if *remaining == 0 {
                entry.finished = true;
            }
            entry.hasher.update(&out[..count]);
            Ok(count)
        }

        EntryDecoder::Deflate {
            inflater,
            remaining_input,
            done,
        } => {
            if *done {
                entry.finished = true;
                return Ok(0);
            }

            loop {
                let available = input.peek(DRAIN_BUFFER_SIZE)?;
                let capped = match remaining_input {
                    Some(remaining) => (available.len() as u64).min(*remaining) as usize,
                    None => available.len(),
                };
                if capped == 0 {
                    // Out of compressed bytes before the deflate stream ended.
                    return Err(ArchiveError::Truncated);
                }
                let chunk = &available[..capped];

                let before_in = inflater.total_in();
                let before_out = inflater.total_out();
                let status = inflater
                    .decompress(chunk, out, FlushDecompress::None)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                let consumed = (inflater.total_in() - before_in) as usize;
                let produced = (inflater.total_out() - before_out) as usize;

                input.consume(consumed);
                if let Some(remaining) = remaining_input {
                    *remaining -= consumed as u64;
                }

                if status == Status::StreamEnd {
                    *done = true;
                    entry.finished = true;
                    // A sized view may declare more compressed bytes than the
                    // deflate stream used; skip them to stay record-aligned.
                    if let Some(remaining) = remaining_input {
                        discard(input, *remaining)?;
                        *remaining = 0;
                    }
                }

                if produced > 0 || entry.finished {
                    entry.hasher.update(&out[..produced]);
                    return Ok(produced);
                }

                if consumed == 0 {
                    // The whole remaining input made no progress; the stream
                    // is cut short or corrupt.
                    return Err(ArchiveError::Truncated);
                }
            }
        }

        EntryDecoder::Unsupported { method } => {
            Err(ArchiveError::UnsupportedCompression(*method))
        }
    }
}

/// Read a data descriptor whose leading 0x08074B50 signature is optional:
/// if the first word is not the signature, it already is the CRC.
fn read_trailing_descriptor<R: Read>(
    input: &mut PeekReader<R>,
) -> Result<DataDescriptor, ArchiveError> {
    let first = read_u32(input)?;
    let crc32 = if first == DATA_DESCRIPTOR_SIGNATURE {
        read_u32(input)?
    } else {
        first
    };
    read_descriptor_sizes(input, crc32)
}

/// Read the remainder of a descriptor whose signature was already consumed.
fn read_descriptor_after_signature<R: Read>(
    input: &mut PeekReader<R>,
) -> Result<DataDescriptor, ArchiveError> {
    let crc32 = read_u32(input)?;
    read_descriptor_sizes(input, crc32)
}

/// The ZIP format does not tag 32- vs 64-bit descriptor sizes. Look ahead:
/// a known record signature 8 bytes out means 32-bit sizes, 16 bytes out
/// means 64-bit; with neither in view, fall back to 32-bit.
fn read_descriptor_sizes<R: Read>(
    input: &mut PeekReader<R>,
    crc32: u32,
) -> Result<DataDescriptor, ArchiveError> {
    let look = input.peek(DESCRIPTOR_LOOK_AHEAD)?;

    let wide = if look.len() >= 12 && is_record_signature(&look[8..12]) {
        false
    } else {
        look.len() >= 20 && is_record_signature(&look[16..20])
    };

    let (compressed_size, uncompressed_size) = if wide {
        (read_u64(input)?, read_u64(input)?)
    } else {
        (read_u32(input)? as u64, read_u32(input)? as u64)
    };

    Ok(DataDescriptor {
        crc32,
        compressed_size,
        uncompressed_size,
    })
}

fn discard<R: Read>(input: &mut PeekReader<R>, mut count: u64) -> Result<(), ArchiveError> {
    let mut scratch = [0u8; 512];
    while count > 0 {
        let want = (scratch.len() as u64).min(count) as usize;
        let read = input.read(&mut scratch[..want])?;
        if read == 0 {
            return Err(ArchiveError::Truncated);
        }
        count -= read as u64;
    }
    Ok(())
}

fn is_record_signature(bytes: &[u8]) -> bool {
    let signature = u32::from_le_bytes(bytes.try_into().unwrap_or_default());
    matches!(
        signature,
        LOCAL_FILE_HEADER_SIGNATURE
            | CENTRAL_DIRECTORY_ENTRY_SIGNATURE
            | CENTRAL_DIRECTORY_END_SIGNATURE
            | DATA_DESCRIPTOR_SIGNATURE
    )
}
