//! Error types produced by the core pipeline.
//!
//! All core errors surface as a single [`Error`] value; the CLI collaborator
//! is responsible for turning that into a diagnostic line and a process exit
//! code (see [`crate`] docs).

use thiserror::Error;

/// Convenience alias for functions that return [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the compression and decompression pipelines.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("block size must be at least 32 KiB, got {0} bytes")]
    BlockSizeTooSmall(usize),

    #[error("worker count must be at least 1")]
    WorkerCountZero,

    #[error("unrecognized input format (bad magic bytes)")]
    UnrecognizedFormat,

    #[error("unsupported compression method {0}")]
    UnsupportedMethod(u16),

    #[error("truncated header")]
    TruncatedHeader,

    #[error("invalid header flags {0:#x}")]
    InvalidHeaderFlags(u16),

    #[error("missing trailer")]
    MissingTrailer,

    #[error("corrupted stream -- crc32 mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Crc32Mismatch { stored: u32, computed: u32 },

    #[error("corrupted stream -- adler32 mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Adler32Mismatch { stored: u32, computed: u32 },

    #[error("corrupted stream -- length mismatch: stored {stored}, computed {computed}")]
    LengthMismatch { stored: u32, computed: u32 },

    #[error("corrupted zip entry -- length mismatch")]
    ZipLengthMismatch,

    #[error("invalid deflate data: {0}")]
    Deflate(String),

    #[error("lzw code out of range")]
    LzwCodeOutOfRange,
}
