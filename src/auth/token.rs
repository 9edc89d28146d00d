use sha2::{Digest, Sha256};

/// Compares two tokens through their SHA-256 digests, so the comparison
/// time does not depend on how long a common prefix is
pub fn tokens_match(expected: &str, provided: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let provided = Sha256::digest(provided.as_bytes());
    expected
        .iter()
        .zip(provided.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
