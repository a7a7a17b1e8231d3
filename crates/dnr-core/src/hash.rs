//! Hash functions for rule identity
//!
//! Uses Murmur3 32-bit. Rule ids and pattern hashes are derived from rule
//! text, so the same input always maps to the same value across runs.

// Default seed for rule text hashing
const SEED_TEXT: u32 = 0x9e3779b9; // Golden ratio
// Separate seed for pattern hashes so they never line up with rule ids
const SEED_PATTERN: u32 = 0x85ebca6b;

/// Murmur3 32-bit hash implementation.
#[inline]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut h = seed;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);

        let k = k.wrapping_mul(0xcc9e2d51);
        let k = k.rotate_left(15);
        let k = k.wrapping_mul(0x1b873593);

        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    // Tail bytes
    let tail = chunks.remainder();
    let mut k: u32 = 0;
    if tail.len() >= 3 {
        k ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        k ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        k ^= tail[0] as u32;
        let k = k.wrapping_mul(0xcc9e2d51);
        let k = k.rotate_left(15);
        let k = k.wrapping_mul(0x1b873593);
        h ^= k;
    }

    // Finalization
    h ^= len as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;

    h
}

/// Hash full rule text. Input to declarative rule id allocation.
#[inline]
pub fn hash_text(text: &str) -> u32 {
    murmur3_32(text.as_bytes(), SEED_TEXT)
}

/// Hash a rule pattern. Used as a cheap pre-check when comparing
/// a badfilter rule against the rules it may cancel.
#[inline]
pub fn hash_pattern(pattern: &str) -> u32 {
    murmur3_32(pattern.as_bytes(), SEED_PATTERN)
}
