//! User bearer tokens. Only the salted SHA-256 digest is ever persisted.

use std::fmt::Write as _;

use rand::Rng;
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// Generate a new random token as 64 lowercase hex characters.
#[must_use]
pub fn generate_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rng.fill(&mut bytes);
    to_hex(&bytes)
}

/// Salted digest stored in `users.token_hash`.
#[must_use]
pub fn hash_token(salt: &str, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn generated_tokens_are_hex_and_distinct() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = generate_token(&mut rng);
        let b = generate_token(&mut rng);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_depends_on_salt_and_token() {
        let h1 = hash_token("salt-a", "token");
        assert_eq!(h1, hash_token("salt-a", "token"));
        assert_ne!(h1, hash_token("salt-b", "token"));
        assert_ne!(h1, hash_token("salt-a", "token2"));
        assert_eq!(h1.len(), 64);
    }
}
