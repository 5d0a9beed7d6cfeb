//! The writer stage: drains compressed blocks strictly in input order,
//! combines their check values, and frames the container header/trailer.

use std::io::Write;

use crate::check::{Adler32Check, Crc32Check, RunningCheck};
use crate::config::Config;
use crate::error::Result;
use crate::flag::SlotState;
use crate::framing;
use crate::pool::Pool;

/// Drive the writer loop for `expected_blocks` blocks, writing the header,
/// each block's compressed bytes in order, and the trailer to `output`.
pub fn run<W: Write>(cfg: &Config, pool: &Pool<'_>, mut output: W) -> Result<()> {
    let mut header = Vec::new();
    let header_len = framing::write_header(cfg, &mut header);
    output.write_all(&header)?;

    let uses_adler = cfg.format.uses_adler32();
    let mut check = if uses_adler { Adler32Check::seed() } else { Crc32Check::seed() };
    let mut ulen: u64 = 0;
    let mut clen: u64 = 0;
    let mut k = 0usize;

    loop {
        // Step a: wait for the worker to have at least started.
        pool.flag(k).wait_eq(SlotState::Comp);

        // Step b: join the worker thread for this slot, surfacing its error.
        let slot = pool.slot(k);
        slot.join()?;

        // Step c: the reader may now overwrite this slot's input buffer --
        // it only ever locks `input`, never `compressed`, so it can refill
        // concurrently with the drain below (spec §9 two-phase release).
        pool.flag(k).set(SlotState::Write);

        // Step d + e: write this block's compressed bytes and fold its
        // check into the running total, all under one `compressed` lock.
        let (block_check, block_len, last) = {
            let compressed = slot.compressed();
            output.write_all(&compressed.output)?;
            clen += compressed.output.len() as u64;
            (compressed.check, compressed.len, compressed.len < cfg.block_size)
        };
        check = if uses_adler {
            Adler32Check::combine(check, block_check, block_len as u64)
        } else {
            Crc32Check::combine(check, block_check, block_len as u64)
        };
        ulen += block_len as u64;

        // Step f: the reader may schedule this slot for a new block.
        pool.flag(k).set(SlotState::Idle);

        if last {
            break;
        }
        k = pool.next(k);
    }

    let mut trailer = Vec::new();
    framing::write_trailer(cfg, ulen, clen, check, header_len, &mut trailer);
    output.write_all(&trailer)?;
    output.flush()?;
    Ok(())
}
