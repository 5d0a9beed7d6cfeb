//! A self-contained Unix `compress` (`.Z`) decoder.
//!
//! Deliberately independent of the rest of the decompression pipeline: it
//! takes the whole input (magic bytes already stripped by the caller) and
//! produces the whole output, with its own code-table bookkeeping, rather
//! than plugging into the deflate pull/push loop in [`crate::decompress`].
//! LZW *encoding* is out of scope -- this crate only ever reads `.Z` files.

use crate::error::{Error, Result};

/// Highest code width the format allows.
const MAX_BITS: u32 = 16;
/// Code-table size ceiling, `2^MAX_BITS`.
const TABLE_SIZE: usize = 1 << MAX_BITS;
/// Bit in the first post-magic byte marking "block compress" mode, where
/// code 256 is reserved as a table-clear signal.
const BLOCK_MODE: u8 = 0x80;
/// Mask over the low 5 bits of that byte, the maximum code width in use.
const BITS_MASK: u8 = 0x1f;

/// Decode a complete `.Z` payload (the two magic bytes `1F 9D` already
/// consumed by the caller) into its uncompressed bytes.
pub fn decode(input: &[u8]) -> Result<Vec<u8>> {
    let mut bits_reader = BitReader::new(input);

    let flags = bits_reader.read_byte().ok_or(Error::TruncatedHeader)?;
    if flags & 0x60 != 0 {
        return Err(Error::LzwCodeOutOfRange);
    }
    let max_bits = (flags & BITS_MASK) as u32;
    if !(9..=MAX_BITS).contains(&max_bits) {
        return Err(Error::LzwCodeOutOfRange);
    }
    // A stream claiming 9-bit codes never actually packs at 9 bits: the
    // first real code width used is 10, mirroring the original's "9 doesn't
    // really mean 9".
    let max_bits = if max_bits == 9 { 10 } else { max_bits };
    let block_mode = flags & BLOCK_MODE != 0;

    let mut table = CodeTable::new(block_mode);
    let mut bits = 9u32;
    let mut mask = (1u32 << bits) - 1;

    let first = match bits_reader.read_code(bits) {
        Some(c) => c as u8,
        None => return Ok(Vec::new()),
    };

    let mut output = Vec::new();
    output.push(first);
    let mut final_byte = first;
    let mut prev_code = first as u32;

    // Reversed-match scratch buffer: each code's expansion is generated
    // back-to-front by walking the prefix chain, then emitted forwards.
    let mut stack: Vec<u8> = Vec::with_capacity(TABLE_SIZE);

    loop {
        if table.end >= mask && bits < max_bits {
            bits_reader.flush_partial_group(bits);
            bits += 1;
            mask = (1u32 << bits) - 1;
        }

        let code = match bits_reader.read_code(bits) {
            Some(c) => c,
            None => break,
        };

        if block_mode && code == 256 {
            bits_reader.flush_partial_group(bits);
            bits = 9;
            mask = (1u32 << bits) - 1;
            table.clear();
            continue;
        }

        let mut current = code;
        if current > table.end {
            // The only valid "code not yet in the table" case is a request
            // to repeat the previous expansion plus its own first byte.
            if current != table.end + 1 || prev_code > table.end {
                return Err(Error::LzwCodeOutOfRange);
            }
            stack.push(final_byte);
            current = prev_code;
        }

        stack.walk_into(&table, current, &mut final_byte);

        if table.end < mask {
            table.link(prev_code, final_byte);
        }
        prev_code = code;

        output.extend(stack.drain(..).rev());
    }

    Ok(output)
}

/// The prefix/suffix code table, sized for the worst case up front so
/// `link` is an unchecked array write.
struct CodeTable {
    prefix: Vec<u32>,
    suffix: Vec<u8>,
    end: u32,
    block_mode: bool,
}

impl CodeTable {
    fn new(block_mode: bool) -> Self {
        Self {
            prefix: vec![0u32; TABLE_SIZE],
            suffix: vec![0u8; TABLE_SIZE],
            end: if block_mode { 256 } else { 255 },
            block_mode,
        }
    }

    fn clear(&mut self) {
        self.end = if self.block_mode { 256 } else { 255 };
    }

    fn link(&mut self, prev: u32, suffix: u8) {
        self.end += 1;
        self.prefix[self.end as usize] = prev;
        self.suffix[self.end as usize] = suffix;
    }
}

/// Extension used to walk the prefix chain for a code, pushing the
/// expansion (in reverse) onto `self` and updating `final_byte` to the
/// chain's root byte.
trait ReverseWalk {
    fn walk_into(&mut self, table: &CodeTable, code: u32, final_byte: &mut u8);
}

impl ReverseWalk for Vec<u8> {
    fn walk_into(&mut self, table: &CodeTable, mut code: u32, final_byte: &mut u8) {
        while code >= 256 {
            self.push(table.suffix[code as usize]);
            code = table.prefix[code as usize];
        }
        self.push(code as u8);
        *final_byte = code as u8;
    }
}

/// A bit reader over the packed LZW code stream, byte-group aligned the way
/// the format requires: codes of the current width are packed 8-to-a-group
/// (so a group is exactly `width` bytes, since `8 * width` bits is always a
/// whole number of bytes), and growing the code width discards whatever is
/// left of the current group rather than continuing mid-group.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u32,
    bit_count: u32,
    /// Byte offset where the group currently being read began.
    group_start: usize,
    /// Codes read so far within the current group, `0..8`.
    codes_in_group: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, bit_buf: 0, bit_count: 0, group_start: 0, codes_in_group: 0 }
    }

    fn read_byte(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    /// Read one code of `width` bits, little-endian within each byte,
    /// tracking the byte-group alignment described on [`BitReader`]. The
    /// caller must call [`Self::flush_partial_group`] itself right before
    /// the *next* call whenever `width` is larger than it was for the
    /// previous call.
    fn read_code(&mut self, width: u32) -> Option<u32> {
        while self.bit_count < width {
            let byte = self.read_byte()?;
            self.bit_buf |= (byte as u32) << self.bit_count;
            self.bit_count += 8;
        }
        let code = self.bit_buf & ((1u32 << width) - 1);
        self.bit_buf >>= width;
        self.bit_count -= width;

        self.codes_in_group += 1;
        if self.codes_in_group == 8 {
            self.codes_in_group = 0;
            self.group_start = self.pos;
        }
        Some(code)
    }

    /// Discard the unread remainder of the current fixed-width group,
    /// called whenever the code width is about to change and the stream is
    /// not already sitting on a group boundary.
    fn flush_partial_group(&mut self, old_width: u32) {
        if self.codes_in_group == 0 {
            return;
        }
        self.pos = self.group_start + old_width as usize;
        self.bit_buf = 0;
        self.bit_count = 0;
        self.codes_in_group = 0;
        self.group_start = self.pos;
    }
}
