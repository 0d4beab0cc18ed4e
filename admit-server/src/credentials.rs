//! Magic-link credential minting and hashing.
//!
//! The raw token is emailed to the applicant and never persisted; only its
//! SHA-256 hex digest is stored. Presenting the token later maps back to
//! the user by hashing and looking up the digest.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Mint a fresh opaque login token.
pub fn mint_token() -> String {
    // Two v4 UUIDs give 244 bits of randomness, comfortably unguessable.
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// One-way hash of a presented token, hex encoded.
pub fn hash_token(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
