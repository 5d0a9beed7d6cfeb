//! The ring of work units shared between the reader, the compressor threads,
//! and the writer.
//!
//! Each concurrently-used buffer slot has a single, clearly owned home
//! rather than being passed through a channel -- the "home" is a `WorkUnit`
//! in a fixed-size `Vec`, and ownership rotates between reader/compressor/
//! writer via each unit's [`Flag`]. Unlike a single whole-slot lock, the
//! input buffer and the compressed-output buffer each sit behind their own
//! `parking_lot::Mutex` so the two-phase release in spec §9 -- the reader
//! refilling `input` while the writer is still draining the previous
//! block's `output` -- is two threads locking two different mutexes, not
//! two threads aliasing one object.

use std::thread::ScopedJoinHandle;

use parking_lot::Mutex;

use crate::config::Config;
use crate::deflate::BlockEncoder;
use crate::error::Result;
use crate::flag::{Flag, SlotState};

/// The encoder and its most recent output, check value, and input length --
/// everything the compressor thread produces and the writer later drains.
/// Written by the slot's compressor thread during `Comp`, read by the
/// writer during `Write`.
pub struct CompressedBlock {
    encoder: Option<BlockEncoder>,
    pub output: Vec<u8>,
    /// The block's own check value (not yet combined into the stream total).
    pub check: u32,
    /// Bytes actually read for the block this output came from; `<
    /// block_size` marks the last block.
    pub len: usize,
}

impl CompressedBlock {
    fn empty() -> Self {
        Self { encoder: None, output: Vec::new(), check: 0, len: 0 }
    }

    fn ensure_init(&mut self, cfg: &Config) {
        if self.encoder.is_none() {
            self.output.reserve(cfg.max_output_len());
            self.encoder = Some(BlockEncoder::new(cfg.level));
        }
    }

    pub fn encoder_mut(&mut self) -> &mut BlockEncoder {
        self.encoder.as_mut().expect("WorkUnit::ensure_init must be called before use")
    }

    /// Borrow the encoder and the output buffer simultaneously but
    /// disjointly -- the split a single `&mut self` method can hand out
    /// without the borrow checker mistaking it for one aliased borrow.
    pub fn split(&mut self) -> (&mut BlockEncoder, &mut Vec<u8>) {
        (self.encoder.as_mut().expect("WorkUnit::ensure_init must be called before use"), &mut self.output)
    }
}

/// One ring slot: an input buffer, the compressed output it produces, and
/// the flag that hands the slot between reader, compressor and writer.
///
/// `'scope` ties the slot's compressor-thread handle to the `thread::scope`
/// invocation that spawned it -- see [`crate::pipeline`]. `input` and
/// `compressed` are independent locks rather than fields of one guarded
/// struct: the reader only ever takes `input`, the writer only ever takes
/// `compressed`, so the two-phase release (writer still draining
/// `compressed` while the reader refills `input`) needs no aliasing at all.
pub struct WorkUnit<'scope> {
    pub flag: Flag,
    input: Mutex<Vec<u8>>,
    compressed: Mutex<CompressedBlock>,
    /// The compressor thread the reader spawned for this slot's current
    /// block; taken and joined by the writer. Its own lock, disjoint from
    /// both buffers, so storing it never races either one.
    handle: Mutex<Option<ScopedJoinHandle<'scope, Result<()>>>>,
}

impl<'scope> WorkUnit<'scope> {
    fn empty() -> Self {
        Self {
            flag: Flag::new(SlotState::Idle),
            input: Mutex::new(Vec::new()),
            compressed: Mutex::new(CompressedBlock::empty()),
            handle: Mutex::new(None),
        }
    }

    /// Lock and borrow the input buffer.
    pub fn input(&self) -> parking_lot::MutexGuard<'_, Vec<u8>> {
        self.input.lock()
    }

    /// Lock and borrow the compressed-output side (encoder, output bytes,
    /// check, length).
    pub fn compressed(&self) -> parking_lot::MutexGuard<'_, CompressedBlock> {
        self.compressed.lock()
    }

    /// Store the handle for this slot's just-spawned compressor thread.
    pub fn set_handle(&self, handle: ScopedJoinHandle<'scope, Result<()>>) {
        *self.handle.lock() = Some(handle);
    }

    /// Take and join this slot's compressor thread, propagating a panic as
    /// one, same as every other `JoinHandle` in the crate.
    pub fn join(&self) -> Result<()> {
        let handle = self.handle.lock().take().expect("writer observed COMP without a stored handle");
        match handle.join() {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    /// First-use allocation: reserve buffers and build the encoder at the
    /// configured level. Cheap no-op on every subsequent call.
    pub fn ensure_init(&self, cfg: &Config) {
        self.input.lock().reserve(cfg.block_size);
        self.compressed.lock().ensure_init(cfg);
    }
}

/// The fixed-size ring of work units, sized to `cfg.workers`.
///
/// Rebuilt (by constructing a fresh `Pool`) whenever level, block size, or
/// worker count changes; there is no explicit teardown call, resources are
/// reclaimed by `Drop` when a `Pool` goes out of scope.
///
/// `Pool` is `Sync` for free: every field a slot exposes across threads is
/// behind a `parking_lot::Mutex`, and the flag protocol in [`crate::flag`]
/// (not any unsafe aliasing) is what keeps concurrent access to those
/// mutexes from ever contending in practice.
pub struct Pool<'scope> {
    slots: Vec<WorkUnit<'scope>>,
}

impl<'scope> Pool<'scope> {
    /// Allocate `cfg.workers` descriptors with empty buffers and `Idle`
    /// flags. No encoder is constructed yet -- see [`WorkUnit::ensure_init`].
    pub fn new(cfg: &Config) -> Self {
        let slots = (0..cfg.workers).map(|_| WorkUnit::empty()).collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Borrow slot `k`. Callers reach the buffers/handle through
    /// `WorkUnit`'s own locking methods, never through raw aliasing.
    pub fn slot(&self, k: usize) -> &WorkUnit<'scope> {
        &self.slots[k]
    }

    /// Read-only access to a slot's flag, safe to call from any thread at
    /// any time since the flag itself is internally synchronized.
    pub fn flag(&self, k: usize) -> &Flag {
        &self.slots[k].flag
    }

    /// The successor slot index, wrapping modulo the ring size.
    pub fn next(&self, k: usize) -> usize {
        (k + 1) % self.slots.len()
    }

    /// The predecessor slot index, wrapping modulo the ring size.
    pub fn prev(&self, k: usize) -> usize {
        (k + self.slots.len() - 1) % self.slots.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn next_and_prev_wrap_around_the_ring() {
        let cfg = Config { workers: 3, ..Config::default() };
        let pool = Pool::new(&cfg);
        assert_eq!(pool.next(2), 0);
        assert_eq!(pool.prev(0), 2);
        assert_eq!(pool.next(0), 1);
    }

    #[test]
    fn ensure_init_is_idempotent() {
        let cfg = Config::default();
        let unit = WorkUnit::empty();
        unit.ensure_init(&cfg);
        let ptr_before = unit.compressed().encoder_mut() as *const BlockEncoder;
        unit.ensure_init(&cfg);
        let ptr_after = unit.compressed().encoder_mut() as *const BlockEncoder;
        assert_eq!(ptr_before, ptr_after);
    }

    #[test]
    fn new_pool_has_all_slots_idle() {
        let cfg = Config { workers: 4, ..Config::default() };
        let pool = Pool::new(&cfg);
        assert_eq!(pool.len(), 4);
        for k in 0..pool.len() {
            assert_eq!(pool.flag(k).get(), SlotState::Idle);
        }
    }
}
