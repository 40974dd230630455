use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a byte slice, for asserting stored checksums.
pub fn sha256_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Deterministic pseudo-random payload from a simple LCG. The same seed
/// always yields the same bytes, so corruption tests can compare against a
/// known digest.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = Vec::with_capacity(len);
    let mut state = seed;
    while data.len() < len {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let take = (len - data.len()).min(8);
        data.extend_from_slice(&state.to_le_bytes()[..take]);
    }
    Bytes::from(data)
}
