//! Format detection, header parsing, and the inflate-and-verify pipeline for
//! decompression.
//!
//! Unlike compression, decompression of a single deflate stream is not
//! parallelized (see the Non-goals in [`crate`]'s docs): the only
//! concurrency here is an optional one-shot worker thread that computes the
//! running check value for the most recently produced chunk while the main
//! thread writes that same chunk to the sink, mirroring `run_check` /
//! `outb` in the system this crate's pipeline is modeled on.

use std::io::{Read, Write};
use std::thread;

use crate::check::{Adler32Check, Crc32Check, RunningCheck};
use crate::config::Format;
use crate::deflate::BlockDecoder;
use crate::error::{Error, Result};
use crate::lzw;

const INPUT_BUF_SIZE: usize = 32 * 1024;

/// Everything the caller might want to know about what was decoded.
#[derive(Debug, Clone)]
pub struct DecodeReport {
    pub format: DecodedFormat,
    pub name: Option<Vec<u8>>,
    pub mtime: Option<u32>,
    pub uncompressed_len: u64,
    pub compressed_len: u64,
    pub check: u32,
    /// Set when, after a gzip or zlib stream ended, leftover bytes followed
    /// that were not another valid stream -- reported, not fatal.
    pub trailing_junk: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedFormat {
    Gzip,
    Zlib,
    Zip,
    Lzw,
}

/// Detect the format, decode the (possibly concatenated, for gzip/zlib)
/// stream(s), verify every trailer, and write the uncompressed bytes to
/// `output`. `workers` mirrors the compression side's option and only
/// controls whether check computation is offloaded to a helper thread.
pub fn decompress<R: Read, W: Write>(workers: usize, input: R, mut output: W) -> Result<DecodeReport> {
    let mut reader = ByteReader::new(input);

    let format = sniff_format(&mut reader)?;
    let mut report = decode_stream_body(workers, format, &mut reader, &mut output)?;

    if matches!(report.format, DecodedFormat::Lzw | DecodedFormat::Zip) {
        return Ok(report);
    }

    // gzip/zlib: additional concatenated streams immediately follow, up to
    // the first byte that isn't a valid header -- tolerated, not fatal. The
    // magic is sniffed exactly once per stream (here, or in the initial
    // sniff above) and the already-known format is threaded into
    // `decode_stream_body` rather than re-sniffed, since the magic bytes
    // are consumed as soon as they're read and cannot be un-read.
    loop {
        if reader.at_eof()? {
            break;
        }
        // A byte sequence that fails to sniff at all (too short for a
        // magic, or simply not one of the recognized magics) is treated the
        // same as a recognized-but-mismatched format: the first non-stream
        // byte, tolerated rather than an error.
        let next_format = match sniff_format(&mut reader) {
            Ok(f) => f,
            Err(_) => {
                report.trailing_junk = true;
                break;
            }
        };
        if next_format != report.format {
            report.trailing_junk = true;
            break;
        }
        let next = decode_stream_body(workers, next_format, &mut reader, &mut output)?;
        report.uncompressed_len += next.uncompressed_len;
        report.compressed_len += next.compressed_len;
    }
    Ok(report)
}

fn decode_stream_body<R: Read, W: Write>(
    workers: usize,
    format: DecodedFormat,
    reader: &mut ByteReader<R>,
    output: &mut W,
) -> Result<DecodeReport> {
    match format {
        DecodedFormat::Lzw => decode_lzw(reader, output),
        _ => decode_deflate_container(workers, format, reader, output),
    }
}

fn sniff_format<R: Read>(reader: &mut ByteReader<R>) -> Result<DecodedFormat> {
    let b0 = reader.require_u8()?;
    let b1 = reader.require_u8()?;
    let magic = ((b0 as u16) << 8) | b1 as u16;

    if magic % 31 == 0 {
        return Ok(DecodedFormat::Zlib);
    }
    if magic == 0x1f9d {
        return Ok(DecodedFormat::Lzw);
    }
    if magic == 0x504b {
        let b2 = reader.require_u8()?;
        let b3 = reader.require_u8()?;
        if b2 != 3 || b3 != 4 {
            return Err(Error::UnrecognizedFormat);
        }
        return Ok(DecodedFormat::Zip);
    }
    if magic == 0x1f8b {
        return Ok(DecodedFormat::Gzip);
    }
    Err(Error::UnrecognizedFormat)
}

fn decode_lzw<R: Read, W: Write>(reader: &mut ByteReader<R>, output: &mut W) -> Result<DecodeReport> {
    let rest = reader.read_to_end_vec()?;
    let decoded = lzw::decode(&rest)?;
    output.write_all(&decoded)?;
    Ok(DecodeReport {
        format: DecodedFormat::Lzw,
        name: None,
        mtime: None,
        uncompressed_len: decoded.len() as u64,
        compressed_len: rest.len() as u64,
        check: 0,
        trailing_junk: false,
    })
}

struct ZipSizes {
    crc: u32,
    clen: u32,
    ulen: u32,
}

enum ZipTrailer {
    /// Sizes were present in the local header; no data descriptor follows.
    InHeader(ZipSizes),
    /// General-purpose flag bit 3 was set: a 12-byte data descriptor
    /// follows the compressed data instead.
    Deferred,
}

fn decode_deflate_container<R: Read, W: Write>(
    workers: usize,
    format: DecodedFormat,
    reader: &mut ByteReader<R>,
    output: &mut W,
) -> Result<DecodeReport> {
    let (name, mtime, zip_trailer) = match format {
        DecodedFormat::Gzip => {
            let (name, mtime) = parse_gzip_header(reader)?;
            (name, mtime, None)
        }
        DecodedFormat::Zlib => (None, None, None),
        DecodedFormat::Zip => {
            let (name, mtime, trailer) = parse_zip_local_header(reader)?;
            (name, mtime, Some(trailer))
        }
        DecodedFormat::Lzw => unreachable!("handled by decode_lzw"),
    };

    let uses_adler = format == DecodedFormat::Zlib;
    let (uncompressed_len, check) = inflate_and_check(workers, reader, output, uses_adler)?;
    let compressed_len = reader.consumed_since_mark();

    let trailer_check = match format {
        DecodedFormat::Gzip => verify_gzip_trailer(reader, check, uncompressed_len)?,
        DecodedFormat::Zlib => verify_zlib_trailer(reader, check)?,
        DecodedFormat::Zip => verify_zip_trailer(reader, zip_trailer.unwrap(), check, uncompressed_len, compressed_len)?,
        DecodedFormat::Lzw => unreachable!(),
    };

    Ok(DecodeReport {
        format,
        name,
        mtime,
        uncompressed_len,
        compressed_len,
        check: trailer_check,
        trailing_junk: false,
    })
}

fn parse_gzip_header<R: Read>(reader: &mut ByteReader<R>) -> Result<(Option<Vec<u8>>, Option<u32>)> {
    let _method = reader.require_u8()?; // always 8 (deflate) for anything this crate writes or reads
    let flags = reader.require_u8()?;
    if flags & 0xe0 != 0 {
        return Err(Error::InvalidHeaderFlags(flags as u16));
    }
    let mtime = reader.read_u32le()?;
    let _xfl = reader.require_u8()?;
    let _os = reader.require_u8()?;

    if flags & 0x04 != 0 {
        let extra_len = reader.read_u16le()? as usize;
        reader.skip(extra_len)?;
    }

    let name = if flags & 0x08 != 0 { Some(reader.read_until_nul()?) } else { None };

    if flags & 0x10 != 0 {
        reader.read_until_nul()?;
    }
    if flags & 0x02 != 0 {
        reader.skip(2)?;
    }

    Ok((name, Some(mtime)))
}

fn parse_zip_local_header<R: Read>(
    reader: &mut ByteReader<R>,
) -> Result<(Option<Vec<u8>>, Option<u32>, ZipTrailer)> {
    reader.skip(2)?; // version needed to extract
    let flags = reader.read_u16le()?;
    if flags & 0xfff0 != 0 {
        return Err(Error::InvalidHeaderFlags(flags));
    }
    let method = reader.read_u16le()?;
    if method != 8 {
        return Err(Error::UnsupportedMethod(method));
    }
    let dos_time = reader.read_u32le()?;
    let crc = reader.read_u32le()?;
    let clen = reader.read_u32le()?;
    let ulen = reader.read_u32le()?;
    let name_len = reader.read_u16le()? as usize;
    let extra_len = reader.read_u16le()? as usize;

    let name = reader.read_exact_vec(name_len)?;
    reader.skip(extra_len)?;

    let trailer = if flags & 0x0008 != 0 {
        ZipTrailer::Deferred
    } else {
        ZipTrailer::InHeader(ZipSizes { crc, clen, ulen })
    };

    Ok((Some(name), Some(dos_from_local_header(dos_time)), trailer))
}

/// The local header stores a packed MS-DOS timestamp, not epoch seconds.
/// Converting back would need a timezone assumption this crate has no
/// dependency for, so the packed value is passed through as-is; callers
/// should treat it as informational only, not as `Config::mtime`.
fn dos_from_local_header(dos: u32) -> u32 {
    dos
}

fn verify_gzip_trailer<R: Read>(reader: &mut ByteReader<R>, check: u32, ulen: u64) -> Result<u32> {
    let stored_check = reader.read_u32le()?;
    let stored_len = reader.read_u32le()?;
    if stored_check != check {
        return Err(Error::Crc32Mismatch { stored: stored_check, computed: check });
    }
    if stored_len != (ulen as u32) {
        return Err(Error::LengthMismatch { stored: stored_len, computed: ulen as u32 });
    }
    Ok(stored_check)
}

fn verify_zlib_trailer<R: Read>(reader: &mut ByteReader<R>, check: u32) -> Result<u32> {
    let stored_check = reader.read_u32be()?;
    if stored_check != check {
        return Err(Error::Adler32Mismatch { stored: stored_check, computed: check });
    }
    Ok(stored_check)
}

fn verify_zip_trailer<R: Read>(
    reader: &mut ByteReader<R>,
    trailer: ZipTrailer,
    check: u32,
    ulen: u64,
    clen: u64,
) -> Result<u32> {
    let sizes = match trailer {
        ZipTrailer::InHeader(sizes) => sizes,
        ZipTrailer::Deferred => {
            let mut crc = reader.read_u32le()?;
            let mut this_clen = reader.read_u32le()?;
            let mut this_ulen = reader.read_u32le()?;

            // A data descriptor may optionally be preceded by the
            // info-zip signature 0x08074b50; if the plain CRC doesn't
            // match, retry assuming that variant.
            if crc != check {
                if crc != 0x0807_4b50 || this_clen != check {
                    return Err(Error::Crc32Mismatch { stored: crc, computed: check });
                }
                crc = this_clen;
                this_clen = this_ulen;
                this_ulen = reader.read_u32le()?;
            }

            ZipSizes { crc, clen: this_clen, ulen: this_ulen }
        }
    };

    if sizes.crc != check {
        return Err(Error::Crc32Mismatch { stored: sizes.crc, computed: check });
    }
    if sizes.clen != clen as u32 || sizes.ulen != ulen as u32 {
        return Err(Error::ZipLengthMismatch);
    }
    Ok(sizes.crc)
}

/// Drive the deflate inflater in a pull/push loop: pull refills an input
/// buffer from `reader`, push writes each freshly produced chunk to
/// `output` and folds it into the running check value, optionally on a
/// helper thread running concurrently with the write.
fn inflate_and_check<R: Read, W: Write>(
    workers: usize,
    reader: &mut ByteReader<R>,
    output: &mut W,
    uses_adler: bool,
) -> Result<(u64, u32)> {
    reader.mark();
    let mut decoder = BlockDecoder::new();
    let mut running = if uses_adler { Adler32Check::seed() } else { Crc32Check::seed() };
    let mut total = 0u64;
    let mut produced = Vec::with_capacity(INPUT_BUF_SIZE);

    loop {
        let available = reader.refill_if_empty()?;
        if available.is_empty() {
            return Err(Error::Deflate("unexpected end of deflate stream".into()));
        }

        produced.clear();
        let (consumed, finished) = decoder.decompress(available, &mut produced, flate2::FlushDecompress::None)?;
        reader.consume(consumed);
        total += produced.len() as u64;

        if workers > 1 {
            let chunk = produced.clone();
            let handle = thread::spawn(move || {
                if uses_adler {
                    Adler32Check::update(running, &chunk)
                } else {
                    Crc32Check::update(running, &chunk)
                }
            });
            output.write_all(&produced)?;
            running = handle.join().expect("check worker thread panicked");
        } else {
            running = if uses_adler {
                Adler32Check::update(running, &produced)
            } else {
                Crc32Check::update(running, &produced)
            };
            output.write_all(&produced)?;
        }

        if finished {
            break;
        }
    }

    Ok((total, running))
}

/// A sequential byte reader with its own refillable buffer, matching the
/// pull-based `GET`/`GET2`/`GET4`/`SKIP` primitives the header parser and
/// the inflate loop both need, over an arbitrary (possibly unbuffered,
/// possibly unseekable) `Read`.
struct ByteReader<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
    total_consumed: u64,
    mark: u64,
}

impl<R: Read> ByteReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, buf: Vec::new(), pos: 0, eof: false, total_consumed: 0, mark: 0 }
    }

    fn mark(&mut self) {
        self.mark = self.total_consumed;
    }

    fn consumed_since_mark(&self) -> u64 {
        self.total_consumed - self.mark
    }

    /// Ensure at least one byte is available, refilling from the source if
    /// the buffer is exhausted. Returns `true` if at least one byte is now
    /// available.
    fn fill(&mut self) -> Result<bool> {
        if self.pos < self.buf.len() {
            return Ok(true);
        }
        if self.eof {
            return Ok(false);
        }
        self.buf.resize(INPUT_BUF_SIZE, 0);
        let n = self.inner.read(&mut self.buf)?;
        self.buf.truncate(n);
        self.pos = 0;
        if n == 0 {
            self.eof = true;
        }
        Ok(n > 0)
    }

    fn at_eof(&mut self) -> Result<bool> {
        Ok(!self.fill()?)
    }

    fn require_u8(&mut self) -> Result<u8> {
        if !self.fill()? {
            return Err(Error::TruncatedHeader);
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        self.total_consumed += 1;
        Ok(b)
    }

    fn read_u16le(&mut self) -> Result<u16> {
        let lo = self.require_u8()? as u16;
        let hi = self.require_u8()? as u16;
        Ok(lo | (hi << 8))
    }

    fn read_u32le(&mut self) -> Result<u32> {
        let mut v = 0u32;
        for shift in [0, 8, 16, 24] {
            v |= (self.require_u8()? as u32) << shift;
        }
        Ok(v)
    }

    fn read_u32be(&mut self) -> Result<u32> {
        let mut v = 0u32;
        for _ in 0..4 {
            v = (v << 8) | self.require_u8()? as u32;
        }
        Ok(v)
    }

    fn skip(&mut self, mut n: usize) -> Result<()> {
        while n > 0 {
            self.require_u8()?;
            n -= 1;
        }
        Ok(())
    }

    fn read_exact_vec(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.require_u8()?);
        }
        Ok(out)
    }

    fn read_until_nul(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let b = self.require_u8()?;
            if b == 0 {
                break;
            }
            out.push(b);
        }
        Ok(out)
    }

    fn read_to_end_vec(&mut self) -> Result<Vec<u8>> {
        let mut out = self.buf[self.pos..].to_vec();
        self.pos = self.buf.len();
        self.inner.read_to_end(&mut out)?;
        self.total_consumed += out.len() as u64;
        Ok(out)
    }

    /// Pull-side primitive for the inflate loop: return whatever is
    /// currently buffered, refilling once if empty. Does not advance the
    /// read position -- call [`Self::consume`] with however many bytes the
    /// inflater actually used.
    fn refill_if_empty(&mut self) -> Result<&[u8]> {
        self.fill()?;
        Ok(&self.buf[self.pos..])
    }

    fn consume(&mut self, n: usize) {
        self.pos += n;
        self.total_consumed += n as u64;
    }
}
