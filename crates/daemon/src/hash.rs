// Content hashing for change detection.
//
// The engine hashes the rendered todo block (without the timestamped
// trailer) and compares it to the hash of its last successful write, so
// cycles with no candidate changes never touch the target note.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 hash of content.
pub type ContentHash = String;

/// Compute the SHA-256 hash of the given bytes, returned as a lowercase hex string.
pub fn sha256_hex(content: &[u8]) -> ContentHash {
    let digest = Sha256::digest(content);
    hex_encode(&digest)
}

/// Returns `Some(new_hash)` if `content` differs from `last`
/// (or nothing was recorded yet), `None` if it is identical.
pub fn content_changed(last: Option<&str>, content: &[u8]) -> Option<ContentHash> {
    let new_hash = sha256_hex(content);
    match last {
        Some(old_hash) if old_hash == new_hash => None,
        _ => Some(new_hash),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}
