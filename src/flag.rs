//! The `Flag` synchronization primitive used to hand ring slots between the
//! reader, the compressor threads and the writer.
//!
//! A [`Flag`] is a mutex-guarded state value with a condition variable for
//! the two waiting operations the pipeline needs: "wait until equal" and
//! "wait until not equal". Spurious wakeups are tolerated because both
//! operations recheck their predicate in a loop -- `parking_lot::Condvar`'s
//! `wait_while` already provides that loop.

use parking_lot::{Condvar, Mutex};

/// The three states a ring slot cycles through.
///
/// `IDLE`: compress and write both done -- the reader may start a new
/// compress. `COMP`: a compressor is running -- input and output buffers are
/// in use. `WRITE`: compress is done and the writer is draining the output
/// buffer -- the input buffer is free for the reader to reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Comp,
    Write,
}

/// A labeled integer flag shared between exactly two parties at a time (the
/// reader/writer and whichever compressor currently owns the slot).
pub struct Flag {
    value: Mutex<SlotState>,
    cond: Condvar,
}

impl Flag {
    /// Create a new flag with the given initial value.
    pub fn new(initial: SlotState) -> Self {
        Self { value: Mutex::new(initial), cond: Condvar::new() }
    }

    /// Set the flag to `val` and wake at least one waiter.
    pub fn set(&self, val: SlotState) {
        let mut guard = self.value.lock();
        *guard = val;
        self.cond.notify_all();
    }

    /// Block until the flag equals `val`.
    pub fn wait_eq(&self, val: SlotState) {
        let mut guard = self.value.lock();
        self.cond.wait_while(&mut guard, |v| *v != val);
    }

    /// Block until the flag is not equal to `val`.
    pub fn wait_neq(&self, val: SlotState) {
        let mut guard = self.value.lock();
        self.cond.wait_while(&mut guard, |v| *v == val);
    }

    /// Read the current value without waiting.
    pub fn get(&self) -> SlotState {
        *self.value.lock()
    }
}
