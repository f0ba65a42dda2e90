//! Object identities used as table keys, and the mixer that scatters them.

use core::fmt;

/// Opaque, non-owning identity of a runtime object.
///
/// An `Identity` is only ever compared and hashed; it is never turned back
/// into a pointer. Two identities are equal iff they were built from the
/// same address (or the same raw value).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Identity(usize);

impl Identity {
    pub const fn new(raw: usize) -> Self {
        Identity(raw)
    }

    /// Identity of the object behind a raw pointer. Metadata of wide
    /// pointers is discarded.
    pub fn from_ptr<T: ?Sized>(ptr: *const T) -> Self {
        Identity(ptr.cast::<()>() as usize)
    }

    /// Identity of a borrowed object.
    pub fn of<T: ?Sized>(obj: &T) -> Self {
        Self::from_ptr(obj as *const T)
    }

    pub const fn get(self) -> usize {
        self.0
    }

    pub(crate) fn to_word(self) -> u64 {
        self.0 as u64
    }

    pub(crate) fn from_word(word: u64) -> Self {
        Identity(word as usize)
    }
}

impl From<usize> for Identity {
    fn from(raw: usize) -> Self {
        Identity(raw)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

const GOLDEN: u64 = 0x9e37_79b9;

/// Full-width hash of an identity.
///
/// Bob Jenkins' three-word mix, run over 64-bit accumulators. Pointer-like
/// identities cluster on allocation-granularity boundaries; the mix
/// spreads those low-entropy bits across the whole word so that reducing
/// modulo a bucket count stays close to uniform.
pub fn hash_identity(key: Identity) -> u64 {
    let mut a = GOLDEN;
    let mut b = GOLDEN;
    let mut c = 0u64;

    a = a.wrapping_add(key.to_word());

    a = a.wrapping_sub(b).wrapping_sub(c) ^ (c >> 13);
    b = b.wrapping_sub(c).wrapping_sub(a) ^ (a << 8);
    c = c.wrapping_sub(a).wrapping_sub(b) ^ (b >> 13);
    a = a.wrapping_sub(b).wrapping_sub(c) ^ (c >> 12);
    b = b.wrapping_sub(c).wrapping_sub(a) ^ (a << 16);
    c = c.wrapping_sub(a).wrapping_sub(b) ^ (b >> 5);
    a = a.wrapping_sub(b).wrapping_sub(c) ^ (c >> 3);
    b = b.wrapping_sub(c).wrapping_sub(a) ^ (a << 10);
    c = c.wrapping_sub(a).wrapping_sub(b) ^ (b >> 15);

    c
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: the mix is a pure function of the identity value.
    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_identity(Identity::new(0)), 0xbd91_e0a0_4a78_8bad);
        assert_eq!(hash_identity(Identity::new(0x1000)), 0xbd91_e2f7_5c51_3bf7);
        for raw in [1usize, 0x1010, 0xdead_beef, usize::MAX] {
            let id = Identity::new(raw);
            assert_eq!(hash_identity(id), hash_identity(id));
        }
    }

    /// Invariant: identities aligned to 16-byte boundaries spread over every
    /// bucket of a 256-bucket table without heavy clustering.
    #[test]
    fn aligned_identities_spread_evenly() {
        let mut counts = [0usize; 256];
        for i in 0..4096usize {
            let id = Identity::new(0x1_0000 + 16 * i);
            counts[(hash_identity(id) % 256) as usize] += 1;
        }
        assert!(counts.iter().all(|&n| n > 0), "every bucket must be hit");
        let worst = counts.iter().copied().max().unwrap();
        assert!(worst <= 40, "bucket overloaded: {worst}");
    }

    /// Invariant: identities built from the same object compare equal and
    /// distinct objects give distinct identities.
    #[test]
    fn identity_of_reference_and_pointer_agree() {
        let a = 1u32;
        let b = 2u32;
        assert_eq!(Identity::of(&a), Identity::from_ptr(&a as *const u32));
        assert_ne!(Identity::of(&a), Identity::of(&b));

        let s: &[u8] = &[1, 2, 3];
        assert_eq!(Identity::of(s), Identity::from_ptr(s.as_ptr()));
    }
}
