//! The per-worker deflate engine wrapper.
//!
//! [`BlockEncoder`] is a thin, stateful wrapper over `flate2::Compress`
//! configured for raw deflate (no zlib/gzip wrapper of its own -- framing is
//! this crate's job, see [`crate::framing`]) with a 15-bit window, matching
//! `deflateInit2(&strm, level, Z_DEFLATED, -15, 8, Z_DEFAULT_STRATEGY)` in
//! the original. It supports reset, an optional preset dictionary, and the
//! two terminal flushes the pipeline needs: sync-flush for mid-stream blocks
//! and finish for the last one.
//!
//! `Compress::new_with_window_bits`/`Decompress::new_with_window_bits` are
//! gated behind flate2's `any_zlib` feature and unavailable with the
//! `rust_backend` this crate depends on; the plain `new` constructors
//! already default to a 15-bit window (`MZ_DEFAULT_WINDOW_BITS`), which is
//! the window size this crate needs, so no custom-window call is needed
//! here.

use flate2::{Compress, Compression, FlushCompress, Status};

use crate::error::{Error, Result};

/// The largest input slice accepted by a single call into the underlying
/// engine, to stay within `u32`-sized `avail_in`/`avail_out` fields on every
/// platform regardless of `usize`'s width.
const MAX_CHUNK: usize = u32::MAX as usize;

/// A stateful raw-deflate encoder for one ring slot.
///
/// Reused across blocks via [`BlockEncoder::reset`] rather than being
/// reallocated -- work units are long-lived, see [`crate::pool`].
pub struct BlockEncoder {
    inner: Compress,
}

impl BlockEncoder {
    /// Create a new encoder at the given deflate level, raw deflate (no
    /// zlib wrapper) with the default 15-bit window.
    pub fn new(level: u8) -> Self {
        Self { inner: Compress::new(Compression::new(level as u32), false) }
    }

    /// Reset the encoder state for a new block, preserving allocations.
    pub fn reset(&mut self) {
        self.inner.reset();
    }

    /// Seed the sliding window with a preset dictionary (the previous
    /// block's trailing 32 KiB). Must be called immediately after `reset`
    /// and before any `encode_block` call for this block.
    pub fn set_dictionary(&mut self, dict: &[u8]) -> Result<()> {
        self.inner
            .set_dictionary(dict)
            .map_err(|e| Error::Deflate(e.to_string()))?;
        Ok(())
    }

    /// Compress all of `input` into `output` (which must have at least
    /// [`crate::config::Config::max_output_len`] bytes of spare capacity),
    /// terminating with a sync-flush (`finish = false`) or a finish
    /// (`finish = true`). Returns the number of compressed bytes written.
    ///
    /// Input larger than `MAX_CHUNK` is fed in several `Z_NO_FLUSH` calls
    /// first, mirroring the original's handling of input sizes that would
    /// overflow a 32-bit `avail_in`.
    pub fn encode_block(&mut self, input: &[u8], output: &mut Vec<u8>, finish: bool) -> Result<usize> {
        let flush = if finish { FlushCompress::Finish } else { FlushCompress::Sync };
        self.encode_with_flush(input, output, flush)
    }

    /// Feed `input` through the encoder with no terminal flush at all
    /// (`Z_NO_FLUSH`), leaving the deflate stream open for more input --
    /// used by the serial fallback's dict-on path (spec §4.7), where a
    /// single encoder's own sliding window carries cross-block history and
    /// only the true last block gets a terminal flush via [`Self::encode_block`].
    pub fn encode_continue(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        self.encode_with_flush(input, output, FlushCompress::None)
    }

    fn encode_with_flush(&mut self, input: &[u8], output: &mut Vec<u8>, flush: FlushCompress) -> Result<usize> {
        let out_start = output.len();
        let total_out_before = self.inner.total_out();

        let mut remaining = input;
        while remaining.len() > MAX_CHUNK {
            let (chunk, rest) = remaining.split_at(MAX_CHUNK);
            self.run(chunk, output, FlushCompress::None)?;
            remaining = rest;
        }

        self.run(remaining, output, flush)?;

        let written = (self.inner.total_out() - total_out_before) as usize;
        debug_assert_eq!(output.len() - out_start, written);
        Ok(written)
    }

    /// Drive `compress_vec` until all of `input` has been consumed and, for
    /// a terminal flush, until the engine reports it has nothing more to
    /// emit. `output`'s spare capacity is grown on demand -- callers size it
    /// generously up front (see [`crate::config::Config::max_output_len`])
    /// so this rarely needs to grow more than once.
    fn run(&mut self, input: &[u8], output: &mut Vec<u8>, flush: FlushCompress) -> Result<()> {
        let total_in_before = self.inner.total_in();
        let mut consumed = 0usize;
        loop {
            if output.capacity() == output.len() {
                output.reserve(output.capacity().max(4096));
            }
            let status = self
                .inner
                .compress_vec(&input[consumed..], output, flush)
                .map_err(|e| Error::Deflate(e.to_string()))?;
            consumed = (self.inner.total_in() - total_in_before) as usize;
            match status {
                Status::StreamEnd => break,
                Status::Ok if consumed >= input.len() && !matches!(flush, FlushCompress::Finish) => break,
                Status::Ok | Status::BufError => continue,
            }
        }
        Ok(())
    }
}

/// A stateful raw-deflate decoder, used by the decompression verification
/// path (`flate2` has no direct `inflateBack` equivalent, so the pull/push
/// loop lives in [`crate::decompress`] and drives this wrapper by hand).
pub struct BlockDecoder {
    inner: flate2::Decompress,
}

impl BlockDecoder {
    pub fn new() -> Self {
        Self { inner: flate2::Decompress::new(false) }
    }

    /// Decompress as much of `input` as fits, appending produced bytes to
    /// `output` (which grows as needed) and returning `(consumed, finished)`.
    pub fn decompress(
        &mut self,
        input: &[u8],
        output: &mut Vec<u8>,
        flush: flate2::FlushDecompress,
    ) -> Result<(usize, bool)> {
        let total_in_before = self.inner.total_in();
        let status = self
            .inner
            .decompress_vec(input, output, flush)
            .map_err(|e| Error::Deflate(e.to_string()))?;
        let consumed = (self.inner.total_in() - total_in_before) as usize;
        Ok((consumed, matches!(status, flate2::Status::StreamEnd)))
    }

    pub fn total_out(&self) -> u64 {
        self.inner.total_out()
    }
}

impl Default for BlockDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips() {
        let mut enc = BlockEncoder::new(6);
        let mut out = Vec::new();
        let input = b"the quick brown fox jumps over the lazy dog".repeat(100);
        enc.encode_block(&input, &mut out, true).unwrap();

        let mut dec = BlockDecoder::new();
        let mut result = Vec::new();
        dec.decompress(&out, &mut result, flate2::FlushDecompress::Finish).unwrap();
        assert_eq!(result, input);
    }

    #[test]
    fn sync_flush_then_finish_concatenates_to_one_valid_stream() {
        let mut enc = BlockEncoder::new(6);
        let mut out = Vec::new();
        enc.encode_block(b"first block data", &mut out, false).unwrap();
        enc.reset();
        enc.encode_block(b"second block data, the last one", &mut out, true).unwrap();

        let mut dec = BlockDecoder::new();
        let mut result = Vec::new();
        dec.decompress(&out, &mut result, flate2::FlushDecompress::Finish).unwrap();
        assert_eq!(result, b"first block datasecond block data, the last one");
    }

    #[test]
    fn no_flush_then_finish_concatenates_to_one_valid_stream() {
        let mut enc = BlockEncoder::new(6);
        let mut out = Vec::new();
        enc.encode_continue(b"first block data, ", &mut out).unwrap();
        enc.encode_block(b"second block data, the last one", &mut out, true).unwrap();

        let mut dec = BlockDecoder::new();
        let mut result = Vec::new();
        dec.decompress(&out, &mut result, flate2::FlushDecompress::Finish).unwrap();
        assert_eq!(result, b"first block data, second block data, the last one");
    }

    #[test]
    fn dictionary_improves_compression_of_redundant_blocks() {
        let redundant = vec![b'x'; 64 * 1024];
        let mut no_dict = BlockEncoder::new(6);
        let mut out_no_dict = Vec::new();
        no_dict.encode_block(&redundant, &mut out_no_dict, true).unwrap();

        let mut with_dict = BlockEncoder::new(6);
        with_dict.set_dictionary(&vec![b'x'; 32 * 1024]).unwrap();
        let mut out_with_dict = Vec::new();
        with_dict.encode_block(&redundant, &mut out_with_dict, true).unwrap();

        assert!(out_with_dict.len() <= out_no_dict.len());
    }
}
