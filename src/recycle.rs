//! Bump cursor over a retired bucket array.
//!
//! After a resize the old bucket array is no longer referenced by any
//! chain. Until it runs out, node allocations are carved from it instead
//! of asking the arena for more memory.

use crate::arena::{align_up, Addr};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Recycler {
    next: Addr,
    remaining: usize,
}

impl Recycler {
    /// Cursor over the `len` bytes starting at `start`.
    pub(crate) fn over(start: Addr, len: usize) -> Self {
        Self {
            next: start,
            remaining: len,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.remaining
    }

    /// Carve one `size`-byte block aligned to `align`.
    ///
    /// Returns `None` when padding plus `size` no longer fits; the cursor is
    /// then spent and the caller should drop it.
    pub(crate) fn carve(&mut self, size: usize, align: usize) -> Option<Addr> {
        let aligned = align_up(self.next.offset(), align);
        let needed = (aligned - self.next.offset()) + size;
        if needed > self.remaining {
            return None;
        }
        self.next = Addr::from_offset(aligned + size);
        self.remaining -= needed;
        Some(Addr::from_offset(aligned))
    }
}
