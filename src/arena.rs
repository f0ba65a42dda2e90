//! Word-addressed bump arena.
//!
//! The arena hands out byte addresses into a growable buffer of 64-bit
//! words. There is no individual free: everything lives until the arena is
//! dropped. Tables built over the same arena share it through
//! [`SharedArena`].
//!
//! Address zero is reserved by a guard word and is never returned by
//! [`Arena::allocate`], so a zero word always reads as "no link".

use core::cell::RefCell;
use core::fmt;
use std::rc::Rc;

/// Size in bytes of one arena word.
pub const WORD: usize = core::mem::size_of::<u64>();

/// Shared handle to an arena; single-threaded by construction.
pub type SharedArena = Rc<RefCell<Arena>>;

/// Byte address inside an [`Arena`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Addr(usize);

impl Addr {
    pub const NULL: Addr = Addr(0);

    pub(crate) const fn from_offset(offset: usize) -> Self {
        Addr(offset)
    }

    pub const fn offset(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub(crate) const fn add(self, bytes: usize) -> Self {
        Addr(self.0 + bytes)
    }

    pub(crate) fn to_word(self) -> u64 {
        self.0 as u64
    }

    pub(crate) fn from_word(word: u64) -> Self {
        Addr(word as usize)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:#x}", self.0)
    }
}

/// Round `offset` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) const fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

/// Allocation counters for an [`Arena`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ArenaStats {
    /// Number of calls to [`Arena::allocate`].
    pub allocations: u64,
    /// Bytes requested by callers, excluding alignment padding.
    pub bytes_requested: usize,
    /// Bytes currently backing the arena, including the guard word.
    pub bytes_reserved: usize,
}

#[derive(Debug)]
pub struct Arena {
    words: Vec<u64>,
    allocations: u64,
    bytes_requested: usize,
}

impl Arena {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an arena with room for `bytes` bytes before it has to grow.
    pub fn with_capacity(bytes: usize) -> Self {
        let mut words = Vec::with_capacity(1 + bytes.div_ceil(WORD));
        words.push(0); // guard word: keeps address zero free for "null"
        Self {
            words,
            allocations: 0,
            bytes_requested: 0,
        }
    }

    /// Wrap this arena for sharing between several tables.
    pub fn shared(self) -> SharedArena {
        Rc::new(RefCell::new(self))
    }

    /// Reserve `size` zeroed bytes aligned to `align` and return their
    /// address. Alignments below one word are raised to one word.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    pub fn allocate(&mut self, size: usize, align: usize) -> Addr {
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        let align = align.max(WORD);
        let top = self.words.len() * WORD;
        let start = align_up(top, align);
        let end = align_up(start + size, WORD);
        self.words.resize(end / WORD, 0);
        self.allocations += 1;
        self.bytes_requested += size;
        Addr(start)
    }

    /// Read the word at `addr`.
    #[inline]
    pub fn read(&self, addr: Addr) -> u64 {
        debug_assert!(addr.0 % WORD == 0, "unaligned word read at {addr}");
        self.words[addr.0 / WORD]
    }

    /// Overwrite the word at `addr`.
    #[inline]
    pub fn write(&mut self, addr: Addr, value: u64) {
        debug_assert!(addr.0 % WORD == 0, "unaligned word write at {addr}");
        self.words[addr.0 / WORD] = value;
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            allocations: self.allocations,
            bytes_requested: self.bytes_requested,
            bytes_reserved: self.words.len() * WORD,
        }
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: address zero is never handed out, so a zeroed word can
    /// stand for "no link".
    #[test]
    fn first_allocation_is_not_null() {
        let mut arena = Arena::new();
        let a = arena.allocate(WORD, WORD);
        assert!(!a.is_null());
        assert_ne!(a, Addr::NULL);
        assert!(Addr::NULL.is_null());
        assert_eq!(a.offset(), WORD);
    }

    /// Invariant: allocations honour alignment and never overlap.
    #[test]
    fn allocations_are_aligned_and_disjoint() {
        let mut arena = Arena::new();
        let a = arena.allocate(3, 1);
        let b = arena.allocate(24, 8);
        let c = arena.allocate(8, 64);
        assert_eq!(a.offset() % WORD, 0);
        assert!(b.offset() >= a.offset() + WORD);
        assert_eq!(c.offset() % 64, 0);
        assert!(c.offset() >= b.offset() + 24);
    }

    /// Invariant: freshly allocated memory reads as zero and writes stick.
    #[test]
    fn memory_is_zeroed_and_writable() {
        let mut arena = Arena::new();
        let a = arena.allocate(4 * WORD, WORD);
        for i in 0..4 {
            assert_eq!(arena.read(a.add(i * WORD)), 0);
        }
        arena.write(a.add(2 * WORD), 0xfeed);
        assert_eq!(arena.read(a.add(2 * WORD)), 0xfeed);
        assert_eq!(arena.read(a.add(WORD)), 0);
    }

    /// Invariant: stats count every allocate call and the bytes asked for.
    #[test]
    fn stats_track_allocations() {
        let mut arena = Arena::with_capacity(128);
        assert_eq!(arena.stats().allocations, 0);
        assert_eq!(arena.stats().bytes_reserved, WORD);
        arena.allocate(16, 8);
        arena.allocate(5, 8);
        let stats = arena.stats();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.bytes_requested, 21);
        assert_eq!(stats.bytes_reserved, WORD + 16 + 8);
    }

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(12, 8), 16);
        assert_eq!(align_up(65, 64), 128);
    }
}
