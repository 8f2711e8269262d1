use sha2::{Digest, Sha256};

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 64-bit hash of the whitespace-normalised body.
pub fn content_hash(content: &str) -> u64 {
    let digest = Sha256::digest(normalize_whitespace(content).as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}
