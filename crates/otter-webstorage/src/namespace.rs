//! Namespace ids
//!
//! Each embedding application gets its own storage area, keyed by a short
//! SHA-256 prefix of its identity string (typically its main module URL).

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
pub const NAMESPACE_ID_LEN: usize = 16;

/// Derive the namespace id for an identity string.
pub fn namespace_id(identity: &str) -> String {
    let digest = Sha256::digest(identity.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(NAMESPACE_ID_LEN);
    id
}
