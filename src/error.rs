use std::io;

use thiserror::Error;

/// Errors raised while reading or writing an archive.
///
/// Nothing in this crate retries; every failure surfaces to the caller. A
/// writer that hits an I/O error stays poisoned and reports
/// [`ArchiveError::IllegalState`] on further use.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A fixed 4-byte signature did not match at a computed position.
    #[error("bad signature at offset {offset}: expected {expected:#010x}, found {found:#010x}")]
    BadSignature {
        expected: u32,
        found: u32,
        offset: u64,
    },

    /// The byte source ended before a complete record could be read.
    #[error("unexpected end of archive data")]
    Truncated,

    #[error("unsupported compression method code {0}")]
    UnsupportedCompression(u16),

    #[error("CRC-32 mismatch for {filename:?}: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        filename: String,
        expected: u32,
        actual: u32,
    },

    #[error("an entry named {0:?} was already added to this archive")]
    DuplicateEntryFilename(String),

    /// A count or offset exceeds what this implementation can index.
    #[error("archive too large to index: {0}")]
    SizeOverflow(&'static str),

    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// A structurally valid archive using a feature this crate does not
    /// implement, e.g. multi-disk spanning.
    #[error("unsupported archive: {0}")]
    Unsupported(&'static str),
}

impl ArchiveError {
    /// Collapse `read_exact` end-of-file errors into [`ArchiveError::Truncated`]
    /// so short sources report a format error rather than a bare I/O error.
    pub(crate) fn from_read(e: io::Error) -> ArchiveError {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ArchiveError::Truncated
        } else {
            ArchiveError::Io(e)
        }
    }
}
