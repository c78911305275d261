use std::fmt::Display;

use crate::error::ArchiveError;

pub const STORE: u16 = 0;
pub const DEFLATE: u16 = 8;

/// The two compression methods this crate reads and writes.
///
/// Any other method code found in an archive is rejected when the entry is
/// opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Store,
    Deflate,
}

impl CompressionMethod {
    pub fn zip_code(&self) -> u16 {
        match self {
            CompressionMethod::Store => STORE,
            CompressionMethod::Deflate => DEFLATE,
        }
    }

    pub fn zip_version_needed(&self) -> u16 {
        crate::constants::DEFAULT_VERSION
    }

    pub fn from_compression_method(
        compression_method: u16,
    ) -> Result<CompressionMethod, ArchiveError> {
        match compression_method {
            STORE => Ok(CompressionMethod::Store),
            DEFLATE => Ok(CompressionMethod::Deflate),
            other => Err(ArchiveError::UnsupportedCompression(other)),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CompressionMethod::Store => "store",
            CompressionMethod::Deflate => "deflate",
        }
    }
}

impl Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Deflate effort passed through to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Fastest,
    Best,
    Default,
    Precise(u32),
}

impl From<Level> for flate2::Compression {
    fn from(level: Level) -> Self {
        match level {
            Level::Fastest => flate2::Compression::fast(),
            Level::Best => flate2::Compression::best(),
            Level::Default => flate2::Compression::default(),
            Level::Precise(val) => flate2::Compression::new(val),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn method_codes_round_trip() {
        assert_eq!(
            CompressionMethod::from_compression_method(STORE).unwrap(),
            CompressionMethod::Store
        );
        assert_eq!(
            CompressionMethod::from_compression_method(DEFLATE).unwrap(),
            CompressionMethod::Deflate
        );
        assert_eq!(CompressionMethod::Store.zip_code(), 0);
        assert_eq!(CompressionMethod::Deflate.zip_code(), 8);
    }

    #[test]
    fn unknown_method_rejected() {
        let err = CompressionMethod::from_compression_method(12).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedCompression(12)));
    }
}
