//! `markercache-core`: a time-windowed, shared-memory Bloom filter ring
//! for short-circuiting negative marker lookups.
//!
//! One producer process owns the arena and inserts markers into the
//! currently open time window; any number of consumer processes map the
//! same arena read-only and ask whether a marker may have occurred within
//! a given range. A `false` answer is authoritative and lets the caller
//! skip a database round trip; a `true` answer may be a false positive and
//! must be confirmed against the marker database.
//!
//! # Core Components
//!
//! - [`MarkerCache`]: the producer's create/insert/age/save handle
//! - [`MarkerCacheReader`]: a consumer's read-only lookup handle
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐      shared memory file      ┌────────────────────┐
//! │  MarkerCache  │ ──────────────────────────── │ MarkerCacheReader  │
//! │  (producer)   │        (mmap region)         │   (consumer A)     │
//! └───────────────┘                              └────────────────────┘
//!                                                 ┌────────────────────┐
//!                                                 │ MarkerCacheReader  │
//!                                                 │   (consumer B)     │
//!                                                 └────────────────────┘
//! ```
//!
//! # Internal Modules
//!
//! - `cache`: public producer/consumer API
//! - `ring`: time-windowed ring of Bloom filter slots, aging, recovery
//! - `filter`: single Bloom filter slot, insert/contains/reset
//! - `bits`: lock-free atomic bit array primitives
//! - `hash`: XXH3-based double hashing
//! - `layout`: arena binary layout and offset arithmetic
//! - `persist`: on-disk archive format for aged-out slots
//! - `error`: crate error type

mod bits;
mod cache;
mod error;
mod filter;
mod hash;
mod layout;
mod persist;
mod ring;

pub use cache::{CacheParams, MarkerCache, MarkerCacheReader};
pub use error::{CacheError, Result};
pub use ring::TimeRange;
