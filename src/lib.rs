//! Read and write ZIP archives, including the Zip64 extensions that lift
//! the 4 GiB per-file and 65 535-entries-per-archive limits.
//!
//! Three entry points:
//!
//! * [`compress::archive::ZipArchive`] writes an archive sequentially to any
//!   [`std::io::Write`] sink.
//! * [`uncompress::stream::StreamReader`] iterates entries from any
//!   [`std::io::Read`] source, without seeking.
//! * [`uncompress::archive::ArchiveReader`] indexes a seekable archive (file
//!   path or in-memory bytes) and serves independent random-access reads.
//!
//! Compression methods STORED and DEFLATED are supported; encryption and
//! multi-disk archives are not.

mod constants;

pub mod archive_common;
pub mod compress;
pub mod compression;
pub mod error;
pub mod types;
pub mod uncompress;

pub use archive_common::ArchiveFileEntry;
pub use compress::archive::ZipArchive;
pub use compress::FileOptions;
pub use error::ArchiveError;
pub use uncompress::archive::ArchiveReader;
pub use uncompress::stream::StreamReader;
