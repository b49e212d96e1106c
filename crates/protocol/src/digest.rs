//! 64-bit content digests for block comparison.
//!
//! The digest is part of the peer compatibility surface: both sides must
//! produce bit-identical values for the same block bytes, so the function
//! is pinned to XXH64 with a zero seed. Changing it requires a coordinated
//! version bump on every peer.

use xxhash_rust::xxh64::xxh64;

/// Fixed digest seed shared by every peer.
const DIGEST_SEED: u64 = 0;

/// Computes the 64-bit digest of one content block.
#[must_use]
pub fn chunk_digest(data: &[u8]) -> u64 {
    xxh64(data, DIGEST_SEED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_reference_values() {
        // XXH64 of the empty input with seed 0 is a published constant.
        assert_eq!(chunk_digest(b""), 0xef46_db37_51d8_e999);
    }

    #[test]
    fn digest_agrees_with_streaming_hasher() {
        let input = b"The quick brown fox jumps over the lazy dog";
        let mut hasher = xxhash_rust::xxh64::Xxh64::new(DIGEST_SEED);
        let mid = input.len() / 2;
        hasher.update(&input[..mid]);
        hasher.update(&input[mid..]);
        assert_eq!(chunk_digest(input), hasher.digest());
    }

    #[test]
    fn digest_distinguishes_blocks() {
        assert_ne!(chunk_digest(b"block a"), chunk_digest(b"block b"));
    }
}
