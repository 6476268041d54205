//! Lock-free bit operations over a byte region living inside the mmap'd
//! arena. Bits are addressed LSB-first within each byte.
//!
//! Every access goes through `AtomicU8` so `insert` never has to take the
//! ring's generation lock: a concurrent `age()` resetting a *different*
//! slot's bits races safely with an `insert()` touching this one.

use std::sync::atomic::{AtomicU8, Ordering};

/// # Safety
/// `base` must point to at least `(bit / 8) + 1` valid, writable bytes for
/// the lifetime of the call.
#[inline(always)]
pub unsafe fn set_bit(base: *const AtomicU8, bit: u64) {
    let byte = (bit >> 3) as usize;
    let mask = 1u8 << (bit & 7);
    unsafe {
        (*base.add(byte)).fetch_or(mask, Ordering::Relaxed);
    }
}

/// # Safety
/// Same requirement as [`set_bit`].
#[inline(always)]
pub unsafe fn test_bit(base: *const AtomicU8, bit: u64) -> bool {
    let byte = (bit >> 3) as usize;
    let mask = 1u8 << (bit & 7);
    unsafe { (*base.add(byte)).load(Ordering::Relaxed) & mask != 0 }
}

/// # Safety
/// `base` must point to at least `nbytes` valid, writable bytes.
pub unsafe fn reset_all(base: *const AtomicU8, nbytes: usize) {
    for i in 0..nbytes {
        unsafe {
            (*base.add(i)).store(0, Ordering::Relaxed);
        }
    }
}

/// # Safety
/// `base` must point to at least `nbytes` valid bytes.
pub unsafe fn read_bytes(base: *const AtomicU8, nbytes: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(nbytes);
    for i in 0..nbytes {
        out.push(unsafe { (*base.add(i)).load(Ordering::Relaxed) });
    }
    out
}

/// # Safety
/// `base` must point to at least `bytes.len()` valid, writable bytes.
pub unsafe fn write_bytes(base: *const AtomicU8, bytes: &[u8]) {
    for (i, b) in bytes.iter().enumerate() {
        unsafe {
            (*base.add(i)).store(*b, Ordering::Relaxed);
        }
    }
}
