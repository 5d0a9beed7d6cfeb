//! Six literal byte-exact scenarios covering each supported container format
//! plus corruption detection, asserted verbatim rather than folded into the
//! unit tests beside each module.

use std::io::Cursor;

use pgzip::config::{Config, Format};
use pgzip::decompress::decompress;
use pgzip::pipeline::compress;

/// Scenario 1: empty input, gzip, level 6, no name, mtime 0.
#[test]
fn empty_gzip_default_level_is_bit_exact() {
    let cfg = Config {
        format: Format::Gzip,
        level: 6,
        workers: 1,
        store_mtime: true,
        mtime: Some(0),
        ..Config::default()
    };
    let mut out = Vec::new();
    compress(&cfg, Cursor::new(&[] as &[u8]), &mut out).unwrap();

    let expected: [u8; 20] =
        [0x1F, 0x8B, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    assert_eq!(out, expected);
}

/// Scenario 2: exactly one block of zero bytes, two workers, dict on; check
/// decoded equality, ISIZE, and CRC-32 against the standard value for S
/// zero bytes.
#[test]
fn one_block_of_zeros_round_trips_with_correct_trailer() {
    let block_size = pgzip::config::MIN_BLOCK_SIZE;
    let input = vec![0u8; block_size];
    let cfg = Config { workers: 2, format: Format::Gzip, dict: true, block_size, ..Config::default() };

    let mut compressed = Vec::new();
    compress(&cfg, Cursor::new(&input), &mut compressed).unwrap();

    let mut decompressed = Vec::new();
    let report = decompress(1, Cursor::new(&compressed), &mut decompressed).unwrap();
    assert_eq!(decompressed, input);

    let isize_bytes = &compressed[compressed.len() - 4..];
    let isize = u32::from_le_bytes(isize_bytes.try_into().unwrap());
    assert_eq!(isize as usize, block_size);

    let expected_crc = pgzip::check::whole_stream_check(Format::Gzip, &input);
    assert_eq!(report.check, expected_crc);
}

/// Scenario 3: 10*S random bytes across four workers -- parallel output
/// need not equal the serial run byte-for-byte, but both must decode back
/// to the original input.
#[test]
fn large_random_input_decodes_equally_across_worker_counts() {
    use rand::RngCore;

    let block_size = pgzip::config::MIN_BLOCK_SIZE;
    let mut input = vec![0u8; block_size * 10];
    rand::thread_rng().fill_bytes(&mut input);

    let cfg_parallel = Config { workers: 4, format: Format::Gzip, block_size, ..Config::default() };
    let mut parallel_out = Vec::new();
    compress(&cfg_parallel, Cursor::new(&input), &mut parallel_out).unwrap();

    let cfg_serial = Config { workers: 1, format: Format::Gzip, block_size, ..Config::default() };
    let mut serial_out = Vec::new();
    compress(&cfg_serial, Cursor::new(&input), &mut serial_out).unwrap();

    let mut parallel_decoded = Vec::new();
    decompress(1, Cursor::new(&parallel_out), &mut parallel_decoded).unwrap();
    assert_eq!(parallel_decoded, input);

    let mut serial_decoded = Vec::new();
    decompress(1, Cursor::new(&serial_out), &mut serial_decoded).unwrap();
    assert_eq!(serial_decoded, input);
}

/// Scenario 4: zlib, level 9, 1 MiB input -- header is `78 DA`, trailer is
/// the big-endian Adler-32 of the whole input.
#[test]
fn zlib_level_nine_header_and_trailer_are_exact() {
    let input = vec![b'z'; 1024 * 1024];
    let cfg = Config { format: Format::Zlib, level: 9, workers: 1, ..Config::default() };

    let mut out = Vec::new();
    compress(&cfg, Cursor::new(&input), &mut out).unwrap();

    assert_eq!(&out[0..2], &[0x78, 0xDA]);

    let expected_adler = pgzip::check::whole_stream_check(Format::Zlib, &input);
    let trailer = &out[out.len() - 4..];
    assert_eq!(u32::from_be_bytes(trailer.try_into().unwrap()), expected_adler);
}

/// Scenario 5: zip, name "a", mtime 0, empty input -- fixed local-header
/// prefix, literal name byte, and an EOCD offset that accounts for the
/// local header, compressed data, and the 12-byte data descriptor.
#[test]
fn zip_empty_entry_has_exact_prefix_and_eocd_offset() {
    let cfg = Config {
        format: Format::Zip,
        store_name: true,
        name: Some(b"a".to_vec()),
        store_mtime: true,
        mtime: Some(0),
        workers: 1,
        ..Config::default()
    };

    let mut out = Vec::new();
    compress(&cfg, Cursor::new(&[] as &[u8]), &mut out).unwrap();

    assert_eq!(&out[0..10], &[0x50, 0x4B, 0x03, 0x04, 0x14, 0x00, 0x08, 0x00, 0x08, 0x00]);

    // Name ("a") sits right after the 30-byte fixed local-header prefix.
    assert_eq!(out[30], b'a');

    let local_header_size = 30 + 1 /* name */ + 9 /* extra */;

    let eocd = &out[out.len() - 22..];
    assert_eq!(&eocd[0..4], &[0x50, 0x4B, 0x05, 0x06]);
    let central_dir_offset = u32::from_le_bytes(eocd[16..20].try_into().unwrap());

    // The data descriptor's COMP_LEN field lets us recover the true
    // compressed size to check the offset relationship exactly.
    let data_descriptor_offset = local_header_size;
    let comp_len = u32::from_le_bytes(
        out[data_descriptor_offset + 4..data_descriptor_offset + 8].try_into().unwrap(),
    );
    assert_eq!(central_dir_offset as usize, local_header_size + comp_len as usize + 12);
}

/// Scenario 6: flipping the last byte of a valid gzip stream (the trailer's
/// ISIZE) is detected and reported, and no output accumulates beyond what
/// the caller already buffered -- the library layer surfaces a `Format`
/// error rather than silently truncating.
#[test]
fn flipped_trailing_byte_is_rejected() {
    let cfg = Config { format: Format::Gzip, workers: 1, ..Config::default() };
    let mut compressed = Vec::new();
    compress(&cfg, Cursor::new(b"some data to compress and then corrupt"), &mut compressed).unwrap();

    let last = compressed.len() - 1;
    compressed[last] ^= 0xFF;

    let mut out = Vec::new();
    let err = decompress(1, Cursor::new(&compressed), &mut out).unwrap_err();
    assert!(matches!(
        err,
        pgzip::Error::LengthMismatch { .. } | pgzip::Error::Crc32Mismatch { .. }
    ));
}
