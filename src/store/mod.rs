//! Postgres collaborators
//!
//! Implementations of the profile ports over the application database.

mod matcher;
mod members;
mod sessions;

pub use matcher::PgProfileMatcher;
pub use members::PgProfileStore;
pub use sessions::PgSessionStore;

use sha2::{Digest, Sha256};

/// SHA-256 of a secret token, hex encoded. Session and reset tokens are only
/// ever stored in this form.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token() {
        let hash = hash_token("session-token");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("session-token"));
        assert_ne!(hash, hash_token("session-token2"));
        assert_eq!(
            hash_token(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
