/// One-time tokens for email verification and password reset
///
/// The plaintext token is sent to the user by email and never stored. The
/// database keeps only its SHA-256 hash plus an expiry, and the hash is
/// cleared when the token is consumed, so a token works at most once.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of the random part of a token
pub const TOKEN_LENGTH: usize = 48;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Purpose of a one-time token, which determines its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    /// Email verification link (24 hours)
    EmailVerification,

    /// Password reset link (1 hour)
    PasswordReset,
}

impl TokenPurpose {
    pub fn ttl(&self) -> Duration {
        match self {
            TokenPurpose::EmailVerification => Duration::hours(24),
            TokenPurpose::PasswordReset => Duration::hours(1),
        }
    }
}

/// A freshly generated token
///
/// `plaintext` goes into the email, `hash` and `expires_at` go into the
/// database.
#[derive(Debug, Clone)]
pub struct OneTimeToken {
    pub plaintext: String,
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

impl OneTimeToken {
    /// Generates a token for `purpose` expiring after the purpose's TTL
    pub fn generate(purpose: TokenPurpose) -> Self {
        let plaintext = random_token(TOKEN_LENGTH);
        let hash = hash_token(&plaintext);

        Self {
            plaintext,
            hash,
            expires_at: Utc::now() + purpose.ttl(),
        }
    }
}

/// Generates a random alphanumeric string of `length` characters
pub fn random_token(length: usize) -> String {
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Hashes a token with SHA-256, returning lowercase hex
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_token_shape() {
        let token = random_token(TOKEN_LENGTH);
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, random_token(TOKEN_LENGTH));
    }

    #[test]
    fn test_hash_token_is_stable_hex() {
        let hash = hash_token("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("abc"));
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_generate_sets_expiry_by_purpose() {
        let verify = OneTimeToken::generate(TokenPurpose::EmailVerification);
        let reset = OneTimeToken::generate(TokenPurpose::PasswordReset);

        assert_eq!(verify.hash, hash_token(&verify.plaintext));
        assert!(verify.expires_at > Utc::now() + Duration::hours(23));
        assert!(reset.expires_at <= Utc::now() + Duration::hours(1));
        assert!(reset.expires_at > Utc::now() + Duration::minutes(59));
    }
}
