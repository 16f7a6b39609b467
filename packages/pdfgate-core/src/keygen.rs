//! Secure key generation and identifier hashing.
//!
//! `Generate` uses rejection sampling so every symbol of the 62-character
//! alphabet is equally likely; a naive `byte % 62` would bias the first
//! few symbols. `HashIdentifier` lets logs and metric labels carry a
//! stable fingerprint of a raw key without ever storing the key itself.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// The 62-symbol alphabet keys and identifiers are drawn from.
const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of 62 that fits in a byte (`62 * 4 = 248`). Bytes drawn
/// in `[limit, 256)` are rejected and redrawn so the modulo below introduces
/// no bias.
const REJECTION_LIMIT: u8 = 248;

/// Secure random key generator and log-safe identifier hasher.
pub struct KeyIdentityGen;

impl KeyIdentityGen {
    /// Generates a random ASCII string of `length` symbols from
    /// `[A-Za-z0-9]`, uniformly distributed via rejection sampling.
    #[must_use]
    pub fn generate(length: usize) -> String {
        let mut rng = rand::rng();
        let mut out = String::with_capacity(length);
        let mut byte = [0u8; 1];
        while out.len() < length {
            rng.fill_bytes(&mut byte);
            if byte[0] >= REJECTION_LIMIT {
                continue;
            }
            let idx = (byte[0] % ALPHABET.len() as u8) as usize;
            out.push(ALPHABET[idx] as char);
        }
        out
    }

    /// Returns the first `prefix_len` characters of the base64url-unpadded
    /// encoding of SHA-256(value). Used so raw keys and operator identities
    /// never leave the process in logs or metric labels.
    #[must_use]
    pub fn hash_identifier(value: &str, prefix_len: usize) -> String {
        let digest = Sha256::digest(value.as_bytes());
        let encoded = URL_SAFE_NO_PAD.encode(digest);
        encoded.chars().take(prefix_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn generate_produces_requested_length() {
        let key = KeyIdentityGen::generate(32);
        assert_eq!(key.chars().count(), 32);
    }

    #[test]
    fn generate_uses_only_alphabet_symbols() {
        let key = KeyIdentityGen::generate(256);
        assert!(key.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn generate_is_not_deterministic() {
        let a = KeyIdentityGen::generate(32);
        let b = KeyIdentityGen::generate(32);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_identifier_is_deterministic() {
        let a = KeyIdentityGen::hash_identifier("secret-key", 16);
        let b = KeyIdentityGen::hash_identifier("secret-key", 16);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_identifier_respects_prefix_len() {
        for n in [1, 8, 16, 43] {
            let hash = KeyIdentityGen::hash_identifier("x", n);
            assert_eq!(hash.chars().count(), n);
        }
    }

    #[test]
    fn hash_identifier_differs_across_inputs() {
        let a = KeyIdentityGen::hash_identifier("alpha", 16);
        let b = KeyIdentityGen::hash_identifier("beta", 16);
        assert_ne!(a, b);
    }

    proptest::proptest! {
        #[test]
        fn generate_always_returns_requested_length_from_alphabet(len in 0usize..500) {
            let key = KeyIdentityGen::generate(len);
            proptest::prop_assert_eq!(key.chars().count(), len);
            proptest::prop_assert!(key.bytes().all(|b| ALPHABET.contains(&b)));
        }

        #[test]
        fn hash_identifier_is_idempotent_for_arbitrary_input(s in ".*", prefix in 1usize..=43) {
            let a = KeyIdentityGen::hash_identifier(&s, prefix);
            let b = KeyIdentityGen::hash_identifier(&s, prefix);
            proptest::prop_assert_eq!(a.clone(), b);
            proptest::prop_assert_eq!(a.chars().count(), prefix);
        }
    }

    #[test]
    fn generator_symbol_frequency_is_roughly_uniform() {
        let sample = KeyIdentityGen::generate(200_000);
        let mut counts: HashMap<u8, u32> = HashMap::new();
        for b in sample.bytes() {
            *counts.entry(b).or_insert(0) += 1;
        }
        let expected = sample.len() as f64 / ALPHABET.len() as f64;
        for &symbol in ALPHABET.iter() {
            let count = *counts.get(&symbol).unwrap_or(&0) as f64;
            let relative_deviation = (count - expected).abs() / expected;
            assert!(
                relative_deviation < 0.1,
                "symbol {} deviates {relative_deviation:.3} from uniform",
                symbol as char
            );
        }
    }
}
