//! Hashing for marker identifiers.
//!
//! A single 128-bit XXH3 hash is split into two 64-bit halves and combined
//! via double hashing (Kirsch-Mitzenmacher) to derive the `k` bit positions
//! for a Bloom filter slot, instead of computing `k` independent hashes.

use xxhash_rust::xxh3::xxh3_128_with_seed;

pub const HASH_SEED: u64 = 0;

/// Hashes a marker identifier to a `(h1, h2)` pair used as the double-hash
/// basis for every slot the identifier is inserted into or looked up from.
#[inline]
pub fn hash_marker(data: &[u8]) -> (u64, u64) {
    let h = xxh3_128_with_seed(data, HASH_SEED);
    ((h >> 64) as u64, h as u64)
}

/// Derives the `i`-th bit position (0-indexed, `i < k`) within a filter of
/// `m` bits from a hashed marker.
#[inline(always)]
pub fn bit_position(h1: u64, h2: u64, i: u32, m: u64) -> u64 {
    h1.wrapping_add((i as u64).wrapping_mul(h2)) % m
}
