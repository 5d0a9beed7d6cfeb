//! The reader stage: partitions input into fixed-size blocks, seeds the
//! dictionary handoff, and dispatches one compressor thread per block.
//!
//! The reader runs on the thread that called [`crate::pipeline::compress`] --
//! it is not itself spawned. It *does* spawn the short-lived per-block
//! compressor threads, storing each one's handle on its slot for the writer
//! to join later.

use std::io::Read;
use std::thread::Scope;

use crate::check::{Adler32Check, Crc32Check, RunningCheck};
use crate::config::Config;
use crate::error::Result;
use crate::flag::SlotState;
use crate::pool::Pool;

/// Read and dispatch every block of `input`, returning once the last
/// (short) block has been handed to its compressor. Returns the number of
/// blocks dispatched.
pub fn run<'scope, 'env, R: Read>(
    cfg: &'env Config,
    pool: &'env Pool<'scope>,
    mut input: R,
    scope: &'scope Scope<'scope, 'env>,
) -> Result<usize>
where
    'env: 'scope,
{
    let mut k = 0usize;
    let mut blocks = 0usize;

    loop {
        // Step 2: the previous occupant of this slot's compressor must have
        // finished (flag moved off COMP, to WRITE or IDLE).
        pool.flag(k).wait_neq(SlotState::Comp);

        // Step 3: the successor slot's compressor, if any, must not still be
        // reading this slot's tail as a dictionary.
        let next_k = pool.next(k);
        pool.flag(next_k).wait_neq(SlotState::Comp);

        // Step 4: read up to one block's worth of bytes. Only the `input`
        // lock is taken here -- the writer, still possibly draining this
        // slot's *previous* compressed output under `Write`, never touches
        // it, so this can proceed without waiting on `Idle` yet.
        let unit = pool.slot(k);
        unit.ensure_init(cfg);
        let len = {
            let mut input_buf = unit.input();
            input_buf.clear();
            read_block(&mut input, &mut input_buf, cfg.block_size)?;
            input_buf.len()
        };

        // Step 5: the writer must have fully released the slot before a new
        // compressor is spawned to reuse its encoder.
        pool.flag(k).wait_eq(SlotState::Idle);

        // Step 6: spawn the compressor and immediately mark the slot COMP.
        //
        // Blocks are assigned to slots in strict round-robin order, so as
        // long as this isn't the very first block, `prev(k)` is guaranteed
        // to hold the immediately preceding block's input -- the reader read
        // it there, on this same thread, before ever reaching this point.
        // That makes the dictionary source a property of block index, not of
        // whether `prev(k)`'s compressor has finished.
        let dict_source = if cfg.dict && len > 0 && blocks > 0 { Some(pool.prev(k)) } else { None };
        let is_last = len < cfg.block_size;
        let handle = scope.spawn(move || compress_block(cfg, pool, k, dict_source, is_last));
        unit.set_handle(handle);
        pool.flag(k).set(SlotState::Comp);

        blocks += 1;
        if is_last {
            return Ok(blocks);
        }
        k = pool.next(k);
    }
}

/// Read up to `want` bytes into `buf`, looping over short reads the way
/// `Read::read` permits (a single `read` call is allowed to return fewer
/// bytes than requested without signaling EOF).
fn read_block(input: &mut impl Read, buf: &mut Vec<u8>, want: usize) -> Result<()> {
    buf.resize(want, 0);
    let mut filled = 0;
    while filled < want {
        let n = input.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(())
}

/// The per-block compressor body (spec §4.5), run on its own thread. Locks
/// this slot's `compressed` side for the whole call and, when seeding a
/// dictionary, briefly locks `dict_source`'s `input` side read-only -- never
/// both slots' full state at once, and never the same lock the reader or
/// writer on another slot is holding.
fn compress_block(cfg: &Config, pool: &Pool<'_>, k: usize, dict_source: Option<usize>, is_last: bool) -> Result<()> {
    let slot = pool.slot(k);
    let mut compressed = slot.compressed();
    compressed.encoder_mut().reset();
    compressed.output.clear();

    if let Some(prev_k) = dict_source {
        let dict = {
            let prev_input = pool.slot(prev_k).input();
            let tail_start = prev_input.len().saturating_sub(crate::config::DICT_SIZE);
            prev_input[tail_start..].to_vec()
        };
        compressed.encoder_mut().set_dictionary(&dict)?;
    }

    let input = slot.input();
    let seed = if cfg.format.uses_adler32() { Adler32Check::seed() } else { Crc32Check::seed() };
    let check =
        if cfg.format.uses_adler32() { Adler32Check::update(seed, &input) } else { Crc32Check::update(seed, &input) };
    let input_len = input.len();

    let (encoder, output) = compressed.split();
    encoder.encode_block(&input, output, is_last)?;
    compressed.check = check;
    compressed.len = input_len;
    Ok(())
}
