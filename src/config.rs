//! The configuration record shared by every stage of the pipeline.
//!
//! A [`Config`] is immutable for the duration of one stream: the reader, the
//! worker pool and the writer all see the same values and never mutate them.

use crate::error::{Error, Result};

/// 32 KiB, the smallest block size the reader will accept -- anything smaller
/// leaves no room for a useful preset dictionary.
pub const MIN_BLOCK_SIZE: usize = 32 * 1024;

/// Default block size, matching pigz's default and a 128 KiB I/O buffer
/// size.
pub const DEFAULT_BLOCK_SIZE: usize = 128 * 1024;

/// Sliding dictionary size used between blocks.
pub const DICT_SIZE: usize = 32 * 1024;

/// Default compression level (zlib's `Z_DEFAULT_COMPRESSION` equivalent).
pub const DEFAULT_LEVEL: u8 = 6;

/// Container format to frame the compressed deflate stream in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Gzip,
    Zlib,
    Zip,
}

impl Format {
    /// Whether this format's check value is Adler-32 (only zlib); everything
    /// else in this crate uses CRC-32.
    pub fn uses_adler32(self) -> bool {
        matches!(self, Format::Zlib)
    }
}

/// Immutable configuration for a single compress or decompress operation.
///
/// Deliberately a plain, clonable value rather than process-wide statics --
/// see the "Global state in the original" design note: every stage receives
/// its own `&Config` instead of reaching into shared globals.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deflate compression level, `0..=9`.
    pub level: u8,
    /// Number of compressor worker slots in the ring. `1` selects the serial
    /// fallback.
    pub workers: usize,
    /// Uncompressed bytes per block, `>= MIN_BLOCK_SIZE`.
    pub block_size: usize,
    /// Output container format.
    pub format: Format,
    /// Whether to seed each block's compressor with the previous block's
    /// trailing 32 KiB as a preset dictionary.
    pub dict: bool,
    /// Whether to embed `name` in the header.
    pub store_name: bool,
    /// Whether to embed `mtime` in the header.
    pub store_mtime: bool,
    /// Original file name, used when `store_name` is set.
    pub name: Option<Vec<u8>>,
    /// Modification time (seconds since epoch), used when `store_mtime` is set.
    pub mtime: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            workers: 1,
            block_size: DEFAULT_BLOCK_SIZE,
            format: Format::Gzip,
            dict: true,
            store_name: false,
            store_mtime: false,
            name: None,
            mtime: None,
        }
    }
}

impl Config {
    /// Validate the configuration record, clamping `level` into range and
    /// rejecting a block size or worker count that can never produce a valid
    /// stream.
    pub fn validate(mut self) -> Result<Self> {
        if self.block_size < MIN_BLOCK_SIZE {
            return Err(Error::BlockSizeTooSmall(self.block_size));
        }
        if self.workers == 0 {
            return Err(Error::WorkerCountZero);
        }
        // Every level in 0..=9 is legal for deflate; anything out of range is
        // clamped rather than rejected, mirroring zlib's tolerant handling of
        // Z_DEFAULT_COMPRESSION.
        self.level = self.level.min(9);
        Ok(self)
    }

    /// The name to embed in the header, honoring `store_name`.
    pub fn header_name(&self) -> Option<&[u8]> {
        if self.store_name {
            self.name.as_deref()
        } else {
            None
        }
    }

    /// The modification time to embed in the header, honoring `store_mtime`.
    pub fn header_mtime(&self) -> u32 {
        if self.store_mtime {
            self.mtime.unwrap_or(0)
        } else {
            0
        }
    }

    /// Worst-case deflate expansion for a block of `n` input bytes, including
    /// room for a sync-flush trailer: `n + n/2048 + 10`.
    pub fn max_output_len(&self) -> usize {
        let n = self.block_size;
        n + n / 2048 + 10
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_small_block_size() {
        let cfg = Config { block_size: 1024, ..Config::default() };
        assert!(matches!(cfg.validate(), Err(Error::BlockSizeTooSmall(1024))));
    }

    #[test]
    fn rejects_zero_workers() {
        let cfg = Config { workers: 0, ..Config::default() };
        assert!(matches!(cfg.validate(), Err(Error::WorkerCountZero)));
    }

    #[test]
    fn clamps_level() {
        let cfg = Config { level: 200, ..Config::default() }.validate().unwrap();
        assert_eq!(cfg.level, 9);
    }

    #[test]
    fn header_name_respects_store_name() {
        let cfg = Config { store_name: false, name: Some(b"x".to_vec()), ..Config::default() };
        assert_eq!(cfg.header_name(), None);
        let cfg = Config { store_name: true, ..cfg };
        assert_eq!(cfg.header_name(), Some(&b"x"[..]));
    }
}
