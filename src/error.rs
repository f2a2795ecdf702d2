//! Error types shared by the compressor and the decompressors.

use std::io;

use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// An error originating from the underlying byte source or sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The gzip member header is malformed: wrong magic, unknown
    /// compression method, reserved flag bits, or a failed header CRC.
    #[error("invalid gzip header: {0}")]
    Header(&'static str),

    /// The member trailer disagrees with the decoded payload, either in its
    /// CRC-32 or in its uncompressed-length field.
    #[error("trailer mismatch: expected {expected:#010x}, got {actual:#010x}")]
    Checksum { expected: u32, actual: u32 },

    /// The DEFLATE payload itself is corrupt, as reported by the decoder.
    #[error("corrupt deflate stream: {0}")]
    Inflate(#[from] flate2::DecompressError),

    /// The byte source ended in the middle of a member.
    #[error("unexpected end of gzip stream")]
    UnexpectedEof,

    /// The resolved seek target lies outside the uncompressed stream.
    #[error("seek to offset {0} is outside the uncompressed stream")]
    InvalidSeek(i64),

    /// Seek was invoked on a reader that has no block index.
    #[error("seeking requires a block index")]
    Unsupported,

    /// The compression level is outside the accepted `-2..=9` range.
    #[error("compression level {0} is out of range (-2..=9)")]
    InvalidLevel(i32),

    /// Header metadata was changed after the first write committed it.
    #[error("header metadata is fixed after the first write")]
    HeaderFrozen,

    /// A persisted block index failed validation.
    #[error("invalid block index: {0}")]
    Index(&'static str),
}

/// A convenience `Result` type alias using the crate's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Recovers a crate error carried inside an `io::Error` produced by the
    /// `Read`/`Write`/`Seek` trait impls.
    pub fn from_io_ref(err: &io::Error) -> Option<&Error> {
        err.get_ref()?.downcast_ref()
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        match err {
            Error::Io(e) => e,
            Error::UnexpectedEof => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            Error::InvalidSeek(_) | Error::InvalidLevel(_) | Error::HeaderFrozen => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            Error::Unsupported => io::Error::new(io::ErrorKind::Unsupported, err),
            Error::Header(_) | Error::Checksum { .. } | Error::Inflate(_) | Error::Index(_) => {
                io::Error::new(io::ErrorKind::InvalidData, err)
            }
        }
    }
}

/// Maps an I/O error to the crate taxonomy, folding `UnexpectedEof` into the
/// dedicated truncation variant.
pub(crate) fn map_io(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::UnexpectedEof
    } else {
        Error::Io(err)
    }
}
