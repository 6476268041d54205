//! A view over one Bloom filter slot's bit region inside the arena.
//!
//! `FilterView` carries no ownership; it is a short-lived handle computed
//! from the arena base pointer and a slot's byte offset each time the ring
//! needs to touch that slot's bits.

use crate::bits;
use crate::hash::bit_position;
use std::sync::atomic::AtomicU8;

#[derive(Clone, Copy)]
pub struct FilterView {
    bits: *const AtomicU8,
    m: u64,
    k: u32,
}

impl FilterView {
    /// # Safety
    /// `bits` must point to a live, writable region of at least
    /// `(m + 7) / 8` bytes for the duration this view is used.
    pub unsafe fn new(bits: *const AtomicU8, m: u64, k: u32) -> Self {
        Self { bits, m, k }
    }

    #[inline]
    pub fn insert(&self, h1: u64, h2: u64) {
        for i in 0..self.k {
            let pos = bit_position(h1, h2, i, self.m);
            unsafe { bits::set_bit(self.bits, pos) };
        }
    }

    #[inline]
    pub fn contains(&self, h1: u64, h2: u64) -> bool {
        for i in 0..self.k {
            let pos = bit_position(h1, h2, i, self.m);
            if !unsafe { bits::test_bit(self.bits, pos) } {
                return false;
            }
        }
        true
    }

    pub fn reset(&self) {
        unsafe { bits::reset_all(self.bits, self.byte_len()) };
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        unsafe { bits::read_bytes(self.bits, self.byte_len()) }
    }

    /// Loads previously persisted bytes into this slot's bit region.
    /// `bytes.len()` must equal this view's byte length.
    pub fn load_bytes(&self, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), self.byte_len());
        unsafe { bits::write_bytes(self.bits, bytes) };
    }

    #[inline]
    fn byte_len(&self) -> usize {
        crate::layout::bytes_per_slot(self.m)
    }
}
