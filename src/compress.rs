//! Sequential archive writing.
//!
//! Entries are appended one by one and the archive is terminated with
//! [`ZipArchive::finalize`](archive::ZipArchive::finalize), which writes the
//! central directory, the Zip64 end-of-central-directory record and locator
//! when any count or offset overflows the classical fields, and the
//! classical end-of-central-directory record.
//!
//! Deflated entries are streamed: their local header carries zeroed CRC and
//! sizes with general-purpose bit 3 set, and the real values follow the
//! payload in a data descriptor. Stored entries are written inline with
//! caller-declared CRC and size, so the sink never needs to seek.

pub mod archive;
mod compressor;
mod write_wrapper;

use crate::{
    compression::Level,
    types::FileDateTime,
};

/// Metadata for a file to be archived.
#[derive(Clone)]
pub struct FileOptions<'a> {
    /// The deflate level used by streaming appends.
    pub compression_level: Level,

    /// The file modified time.
    pub last_modified_time: FileDateTime,

    /// The file creation time (unix seconds), written to the 0x5455 extra.
    pub last_creation_time: Option<i32>,

    /// The file access time (unix seconds), written to the 0x5455 extra.
    pub last_access_time: Option<i32>,

    /// Unix permissions.
    pub unix_permissions: Option<u32>,

    /// File comment, written to the central directory.
    pub comment: Option<&'a str>,

    /// Caller extra-field blob, re-emitted verbatim ahead of any extras the
    /// writer generates itself.
    pub extra: Option<&'a [u8]>,
}

impl<'a> FileOptions<'a> {
    /// Set the compression level for the new file.
    pub fn compression_level(mut self, level: Level) -> FileOptions<'a> {
        self.compression_level = level;
        self
    }

    /// Set the last modified time.
    ///
    /// The default is the current timestamp.
    pub fn last_modified_time(mut self, mod_time: FileDateTime) -> FileOptions<'a> {
        self.last_modified_time = mod_time;
        self
    }

    /// Set the permissions for the new file.
    ///
    /// The format is represented with unix-style permissions.
    /// The default is `0o644`, which represents `rw-r--r--` for files,
    /// and `0o755`, which represents `rwxr-xr-x` for directories.
    ///
    /// Only the permission bits are preserved (via a `& 0o777`); higher file
    /// mode bits are discarded.
    pub fn unix_permissions(mut self, mode: u32) -> FileOptions<'a> {
        self.unix_permissions = Some(mode & 0o777);
        self
    }

    /// Set the file comment.
    pub fn set_file_comment(mut self, comment: &'a str) -> FileOptions<'a> {
        self.comment = Some(comment);
        self
    }

    /// Attach a raw extra-field blob to the entry.
    ///
    /// The blob must already be a well-formed sequence of
    /// {id, length, payload} records; it is written as-is to both headers.
    pub fn extra_data(mut self, extra: &'a [u8]) -> FileOptions<'a> {
        self.extra = Some(extra);
        self
    }

    /// Set the entry unix timestamps.
    ///
    /// The time values are in standard Unix signed-long format, indicating
    /// the number of seconds since 1 January 1970 00:00:00.
    ///
    /// All arguments are __optional__.
    pub fn time_stamp(
        mut self,
        last_modification_time: Option<i32>,
        last_access_time: Option<i32>,
        last_creation_time: Option<i32>,
    ) -> FileOptions<'a> {
        self.last_modified_time = match last_modification_time {
            Some(last_modification_time) => FileDateTime::UnixCustom(last_modification_time),
            None => FileDateTime::Zero,
        };
        self.last_access_time = last_access_time;
        self.last_creation_time = last_creation_time;
        self
    }
}

impl<'a> Default for FileOptions<'a> {
    fn default() -> Self {
        Self {
            compression_level: Level::Default,
            last_modified_time: FileDateTime::Now,
            last_creation_time: None,
            last_access_time: None,
            unix_permissions: None,
            comment: None,
            extra: None,
        }
    }
}
