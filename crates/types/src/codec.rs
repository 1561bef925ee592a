// Path: crates/types/src/codec.rs

//! Defines the canonical, deterministic binary codec for all persisted state.
//!
//! This module provides simple wrappers around `parity-scale-codec` (SCALE).
//! By centralizing the codec logic here in the base `types` crate, we ensure
//! that every component uses the exact same serialization format for verified
//! records, preventing disagreement between the store and its readers over the
//! binary representation of the same data.

use parity_scale_codec::{Decode, DecodeAll, Encode};

/// Encodes a value into its canonical byte representation using SCALE codec.
///
/// Used for everything written to the shard store.
pub fn to_bytes_canonical<T: Encode>(v: &T) -> Vec<u8> {
    v.encode()
}

/// Decodes a value from its canonical byte representation using SCALE codec.
///
/// Fails fast on any decoding error, including trailing bytes; malformed
/// store content must never be silently accepted.
pub fn from_bytes_canonical<T: Decode>(b: &[u8]) -> Result<T, String> {
    T::decode_all(&mut &*b).map_err(|e| format!("canonical decode failed: {}", e))
}
