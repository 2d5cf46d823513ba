// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device auth tokens.
//!
//! Tokens are random, hex encoded, and handed to the device once at
//! registration. Only their SHA-256 digest is stored.

use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::AppError;

const TOKEN_BYTES: usize = 16;

/// Generate a fresh device token.
pub fn generate_token() -> Result<String, AppError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))?;
    Ok(hex::encode(bytes))
}

/// Hex SHA-256 digest stored in place of the token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Compare a presented token against a stored digest in constant time.
pub fn verify_token(token: &str, stored_hash: &str) -> bool {
    let presented = hash_token(token.trim());
    presented.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_distinct_hex() {
        let a = generate_token().unwrap();
        let b = generate_token().unwrap();
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_token() {
        let token = generate_token().unwrap();
        let stored = hash_token(&token);
        assert_ne!(stored, token);
        assert!(verify_token(&token, &stored));
        assert!(!verify_token("nope", &stored));
        assert!(!verify_token(&token, ""));
    }
}
