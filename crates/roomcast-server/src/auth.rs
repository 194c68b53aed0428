//! Shared-secret token authentication.
//!
//! Tokens are the configured secret encrypted under AES-256-GCM and hex
//! encoded, nonce prepended. The AES key is the secret's bytes truncated to
//! 32 bytes, repeat-filled when shorter. Validation decrypts and compares
//! the plaintext back against the secret, so any token minted with the same
//! secret verifies and nothing else does.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use thiserror::Error;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// Token validation error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No token was supplied.
    #[error("missing token")]
    Missing,
    /// Token is not valid hex or is shorter than a nonce.
    #[error("malformed token")]
    Malformed,
    /// Decryption failed or the plaintext did not match the secret.
    #[error("invalid token")]
    Invalid,
}

/// Validates and mints relay access tokens.
pub struct Authenticator {
    secret: String,
    cipher: Aes256Gcm,
}

impl Authenticator {
    /// Build an authenticator from the configured secret.
    ///
    /// The secret must be non-empty; the server skips auth entirely when no
    /// secret is configured.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let key = derive_key(secret);
        Self {
            secret: secret.to_owned(),
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Mint a token that [`Authenticator::validate`] will accept.
    #[must_use]
    pub fn generate_token(&self) -> String {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        // Encryption with a valid key and nonce cannot fail.
        let ciphertext = self
            .cipher
            .encrypt(nonce, self.secret.as_bytes())
            .unwrap_or_default();

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        hex::encode(out)
    }

    /// Check a client-supplied token.
    pub fn validate(&self, token: &str) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        let raw = hex::decode(token).map_err(|_| AuthError::Malformed)?;
        if raw.len() < NONCE_SIZE {
            return Err(AuthError::Malformed);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AuthError::Invalid)?;
        if plaintext != self.secret.as_bytes() {
            return Err(AuthError::Invalid);
        }
        Ok(())
    }
}

/// Truncate or repeat-fill the secret's bytes to the AES-256 key size.
fn derive_key(secret: &str) -> [u8; KEY_SIZE] {
    let bytes = secret.as_bytes();
    let mut key = [0u8; KEY_SIZE];
    if bytes.is_empty() {
        return key;
    }
    for (i, slot) in key.iter_mut().enumerate() {
        *slot = bytes[i % bytes.len()];
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_validates() {
        let auth = Authenticator::new("relay_secret_123");
        let token = auth.generate_token();
        assert!(auth.validate(&token).is_ok());
    }

    #[test]
    fn tokens_are_unique_per_mint() {
        let auth = Authenticator::new("relay_secret_123");
        assert_ne!(auth.generate_token(), auth.generate_token());
    }

    #[test]
    fn wrong_secret_rejects() {
        let minting = Authenticator::new("secret-a");
        let validating = Authenticator::new("secret-b");
        let token = minting.generate_token();
        assert_eq!(validating.validate(&token), Err(AuthError::Invalid));
    }

    #[test]
    fn empty_token_is_missing() {
        let auth = Authenticator::new("s");
        assert_eq!(auth.validate(""), Err(AuthError::Missing));
    }

    #[test]
    fn non_hex_token_is_malformed() {
        let auth = Authenticator::new("s");
        assert_eq!(auth.validate("zzzz"), Err(AuthError::Malformed));
    }

    #[test]
    fn truncated_token_is_malformed() {
        let auth = Authenticator::new("s");
        assert_eq!(auth.validate("abcd"), Err(AuthError::Malformed));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let auth = Authenticator::new("relay_secret_123");
        let mut token = auth.generate_token();
        let last = token.pop().unwrap();
        token.push(if last == '0' { '1' } else { '0' });
        assert_eq!(auth.validate(&token), Err(AuthError::Invalid));
    }

    #[test]
    fn key_derivation_repeat_fills_short_secrets() {
        let key = derive_key("ab");
        assert_eq!(&key[..4], b"abab");
        assert_eq!(key[31], b'b');
    }

    #[test]
    fn key_derivation_truncates_long_secrets() {
        let long = "x".repeat(64);
        let key = derive_key(&long);
        assert!(key.iter().all(|&b| b == b'x'));
    }

    #[test]
    fn long_secret_round_trips() {
        let auth = Authenticator::new(&"long-secret-".repeat(8));
        let token = auth.generate_token();
        assert!(auth.validate(&token).is_ok());
    }
}
