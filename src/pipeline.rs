//! Top-level entry point: wires the reader, the worker-ring pool, and the
//! writer together, or falls back to a single-threaded encoder when
//! `cfg.workers == 1`.

use std::io::{Read, Write};
use std::thread;

use crate::check::{Adler32Check, Crc32Check, RunningCheck};
use crate::config::Config;
use crate::deflate::BlockEncoder;
use crate::error::Result;
use crate::framing;
use crate::pool::Pool;
use crate::{reader, writer};

/// Compress `input` into `output` per `cfg`, dispatching to the parallel
/// pipeline (§4.4-§4.6) when `cfg.workers > 1` or the serial fallback
/// (§4.7) when `cfg.workers == 1`.
pub fn compress<R: Read, W: Write + Send>(cfg: &Config, input: R, output: W) -> Result<()> {
    let cfg = cfg.clone().validate()?;
    if cfg.workers <= 1 {
        compress_serial(&cfg, input, output)
    } else {
        compress_parallel(&cfg, input, output)
    }
}

fn compress_parallel<R: Read, W: Write + Send>(cfg: &Config, input: R, output: W) -> Result<()> {
    let output = std::sync::Mutex::new(output);

    thread::scope(|scope| -> Result<()> {
        let pool = Pool::new(cfg);
        let writer_handle = scope.spawn(|| {
            let guard = output.lock().unwrap_or_else(|e| e.into_inner());
            writer::run(cfg, &pool, MutexWriteGuard(guard))
        });
        reader::run(cfg, &pool, input, scope)?;
        match writer_handle.join() {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    })
}

/// Adapts a `MutexGuard<W>` to `Write` so the writer thread can hold the
/// lock for its entire run without the pipeline needing a second layer of
/// buffering; there is exactly one writer thread so the lock never
/// contends, it exists purely to satisfy `Send`/borrow rules across the
/// scope boundary for a caller-supplied, non-`'static` sink.
struct MutexWriteGuard<'a, W: Write>(std::sync::MutexGuard<'a, W>);

impl<W: Write> Write for MutexWriteGuard<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

/// The single-thread fallback (spec §4.7): one encoder, reused across
/// blocks without a ring, preserving cross-block deflate history directly
/// in the encoder's own window when `dict` is on instead of re-seeding a
/// preset dictionary per block.
fn compress_serial<R: Read, W: Write>(cfg: &Config, mut input: R, mut output: W) -> Result<()> {
    let mut header = Vec::new();
    let header_len = framing::write_header(cfg, &mut header);
    output.write_all(&header)?;

    let uses_adler = cfg.format.uses_adler32();
    let mut check = if uses_adler { Adler32Check::seed() } else { Crc32Check::seed() };
    let mut ulen: u64 = 0;
    let mut clen: u64 = 0;

    let mut encoder = BlockEncoder::new(cfg.level);
    let mut in_buf = vec![0u8; cfg.block_size];
    let mut out_buf = Vec::with_capacity(cfg.max_output_len());

    loop {
        let mut filled = 0;
        while filled < in_buf.len() {
            let n = input.read(&mut in_buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        let block = &in_buf[..filled];
        let is_last = filled < cfg.block_size;

        out_buf.clear();
        // Mid-stream blocks finish outright when dict is off (each block is
        // an independent deflate stream with no history to preserve); when
        // dict is on the encoder is never reset, so its own sliding window
        // already carries cross-block history and mid-stream blocks use no
        // flush at all -- only the true last block gets a terminal flush.
        if !cfg.dict {
            encoder.reset();
            encoder.encode_block(block, &mut out_buf, true)?;
        } else if is_last {
            encoder.encode_block(block, &mut out_buf, true)?;
        } else {
            encoder.encode_continue(block, &mut out_buf)?;
        }

        let block_check =
            if uses_adler { Adler32Check::update(Adler32Check::seed(), block) } else { Crc32Check::update(Crc32Check::seed(), block) };
        check = if uses_adler {
            Adler32Check::combine(check, block_check, filled as u64)
        } else {
            Crc32Check::combine(check, block_check, filled as u64)
        };
        ulen += filled as u64;
        clen += out_buf.len() as u64;
        output.write_all(&out_buf)?;

        if is_last {
            break;
        }
    }

    let mut trailer = Vec::new();
    framing::write_trailer(cfg, ulen, clen, check, header_len, &mut trailer);
    output.write_all(&trailer)?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Format;
    use std::io::Cursor;

    fn roundtrip_decode(format: Format, compressed: &[u8]) -> Vec<u8> {
        // Minimal decode using flate2's own container readers, exercised
        // only to confirm this crate's framing is byte-compatible; the full
        // verification path lives in `crate::decompress`.
        use std::io::Read as _;
        match format {
            Format::Gzip => {
                let mut dec = flate2::read::GzDecoder::new(Cursor::new(compressed));
                let mut out = Vec::new();
                dec.read_to_end(&mut out).unwrap();
                out
            }
            Format::Zlib => {
                let mut dec = flate2::read::ZlibDecoder::new(Cursor::new(compressed));
                let mut out = Vec::new();
                dec.read_to_end(&mut out).unwrap();
                out
            }
            Format::Zip => compressed.to_vec(), // structural check only, see decompress tests
        }
    }

    #[test]
    fn serial_gzip_round_trips() {
        let cfg = Config { workers: 1, format: Format::Gzip, ..Config::default() };
        let input = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let mut out = Vec::new();
        compress(&cfg, Cursor::new(&input), &mut out).unwrap();
        assert_eq!(roundtrip_decode(Format::Gzip, &out), input);
    }

    #[test]
    fn serial_zlib_round_trips() {
        let cfg = Config { workers: 1, format: Format::Zlib, ..Config::default() };
        let input = b"abcdefghij".repeat(5000);
        let mut out = Vec::new();
        compress(&cfg, Cursor::new(&input), &mut out).unwrap();
        assert_eq!(roundtrip_decode(Format::Zlib, &out), input);
    }

    #[test]
    fn parallel_gzip_round_trips_with_multiple_blocks() {
        let cfg = Config { workers: 4, block_size: 32 * 1024, format: Format::Gzip, ..Config::default() };
        let input: Vec<u8> = (0..(200 * 1024)).map(|i| (i % 251) as u8).collect();
        let mut out = Vec::new();
        compress(&cfg, Cursor::new(&input), &mut out).unwrap();
        assert_eq!(roundtrip_decode(Format::Gzip, &out), input);
    }

    #[test]
    fn parallel_and_serial_agree_on_uncompressed_content() {
        let input: Vec<u8> = (0..(80 * 1024)).map(|i| ((i * 7) % 256) as u8).collect();

        let cfg_serial = Config { workers: 1, format: Format::Zlib, ..Config::default() };
        let mut out_serial = Vec::new();
        compress(&cfg_serial, Cursor::new(&input), &mut out_serial).unwrap();

        let cfg_parallel = Config { workers: 3, block_size: 32 * 1024, format: Format::Zlib, ..Config::default() };
        let mut out_parallel = Vec::new();
        compress(&cfg_parallel, Cursor::new(&input), &mut out_parallel).unwrap();

        assert_eq!(roundtrip_decode(Format::Zlib, &out_serial), input);
        assert_eq!(roundtrip_decode(Format::Zlib, &out_parallel), input);
    }

    #[test]
    fn empty_input_produces_valid_stream() {
        let cfg = Config { workers: 2, format: Format::Gzip, ..Config::default() };
        let mut out = Vec::new();
        compress(&cfg, Cursor::new(&[] as &[u8]), &mut out).unwrap();
        assert_eq!(roundtrip_decode(Format::Gzip, &out), Vec::<u8>::new());
    }
}
