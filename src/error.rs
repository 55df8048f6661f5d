//! Error management.

use std::io;
use thiserror::Error;

/// A specialized result type for cache operations.
///
/// Broadly used across js5fs for any operation which may produce an
/// [`Error`](enum.Error.html).
pub type Result<T> = std::result::Result<T, Error>;

/// Super error type for all sub cache errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Wrapper for the std::io::Error type.
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Compression(#[from] CompressionUnsupported),
    /// Clarification error for failed parsers.
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validate(#[from] ValidateError),
}

impl From<nom::Err<()>> for Error {
    #[inline]
    fn from(_: nom::Err<()>) -> Self {
        Self::Parse(ParseError::Unknown)
    }
}

#[derive(Error, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum ReadError {
    #[error("index {0} not found")]
    IndexNotFound(u8),
    #[error("index {idx} does not contain archive {arc}")]
    ArchiveNotFound { idx: u8, arc: u32 },
    #[error("archive {arc} in index {idx} has no file {file}")]
    FileNotFound { idx: u8, arc: u32, file: u32 },
    #[error("reference table (index 255) not found")]
    ReferenceTableNotFound,
    #[error("index 255 is reserved for reference tables, use the file store directly")]
    ReferenceTableRestricted,
    #[error("sector archive id was {0} but expected {1}")]
    SectorArchiveMismatch(u32, u32),
    #[error("sector chunk was {0} but expected {1}")]
    SectorChunkMismatch(usize, usize),
    #[error("sector parent index id was {0} but expected {1}")]
    SectorIndexMismatch(u8, u8),
}

#[derive(Error, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[error("unsupported compression type {0}")]
pub struct CompressionUnsupported(pub(crate) u8);

#[derive(Error, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum ParseError {
    #[error("unknown parser error")]
    Unknown,
    #[error("unable to parse archive {0}, unexpected eof")]
    Archive(u32),
    #[error("unable to parse child sector of parent {0}, unexpected eof")]
    Sector(usize),
    #[error("unsupported reference table format {0}")]
    Format(u8),
    #[error("unable to parse file group, unexpected eof")]
    FileGroup,
}

#[derive(Error, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum ValidateError {
    #[error("expected uncompressed length of {expected} but was {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("expected crc length of {expected} but was {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("mismatch crc at index {idx}, expected {internal} but was {external}")]
    InvalidCrc {
        idx: usize,
        internal: u32,
        external: u32,
    },
    #[error("whirlpool digest does not match the preceding table bytes")]
    WhirlpoolMismatch,
    #[error("refusing to force xtea with the all-zero key")]
    KeyRejected,
}
