//! Cryptographic utilities for invite tokens.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of generated invite tokens.
pub const INVITE_TOKEN_LENGTH: usize = 40;

/// Characters used for invite tokens (URL safe, no confusable glyphs).
const TOKEN_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generates a random invite token.
///
/// Only the SHA-256 hash of the token is persisted; the raw value is
/// delivered to the invitee and never stored.
pub fn generate_invite_token() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITE_TOKEN_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..TOKEN_CHARSET.len());
            TOKEN_CHARSET[idx] as char
        })
        .collect()
}

/// Hashes a raw invite token for storage or lookup.
pub fn hash_invite_token(token: &str) -> String {
    sha256_hex(token.trim())
}
