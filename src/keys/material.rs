//! Key pair and webhook secret generation.
//!
//! # Formats
//!
//! - public key: `pk_<test|live>_<24 hex>`
//! - raw secret: `sk_<test|live>_<64 hex>`
//! - secret hash: `v1$<salt hex>$<HMAC-SHA256(pepper, salt || secret) hex>`
//! - webhook secret: `whsec_<64 hex>`, stored raw
//!
//! Each secret gets its own 16-byte salt. The pepper is keyed into the MAC so
//! a leaked table of hashes cannot be brute-forced without the server config.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{config::KeyMaterialConfig, models::app_key::KeyType};

type HmacSha256 = Hmac<Sha256>;

const HASH_VERSION: &str = "v1";
const SALT_LEN: usize = 16;

/// Well-formed hash no secret matches. Verifying against it costs the same
/// as verifying a real key.
pub const UNMATCHABLE_HASH: &str = "v1$00000000000000000000000000000000$0000000000000000000000000000000000000000000000000000000000000000";

/// Freshly generated credentials. `raw_secret` must be handed to the caller
/// once and then dropped.
#[derive(Debug, Clone)]
pub struct GeneratedKeyPair {
    pub public_key: String,
    pub raw_secret: String,
    pub secret_hash: String,
}

#[derive(Clone)]
pub struct KeyMaterial {
    pepper: Vec<u8>,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial").finish_non_exhaustive()
    }
}

impl KeyMaterial {
    pub fn new(config: &KeyMaterialConfig) -> Self {
        Self {
            pepper: config.pepper.clone(),
        }
    }

    /// Generate a key pair. Public-key collisions are the caller's to retry.
    pub fn generate_key_pair(&self, key_type: KeyType) -> GeneratedKeyPair {
        let public_key = format!(
            "pk_{}_{}",
            key_type.as_str(),
            hex::encode(rand::random::<[u8; 12]>())
        );
        let raw_secret = self.generate_secret(key_type);
        let secret_hash = self.hash_secret(&raw_secret);

        GeneratedKeyPair {
            public_key,
            raw_secret,
            secret_hash,
        }
    }

    pub fn generate_secret(&self, key_type: KeyType) -> String {
        format!(
            "sk_{}_{}",
            key_type.as_str(),
            hex::encode(rand::random::<[u8; 32]>())
        )
    }

    pub fn hash_secret(&self, raw_secret: &str) -> String {
        let salt = rand::random::<[u8; SALT_LEN]>();
        let digest = self.mac(&salt, raw_secret).finalize().into_bytes();
        format!(
            "{HASH_VERSION}${}${}",
            hex::encode(salt),
            hex::encode(digest)
        )
    }

    /// Constant-time check of `raw_secret` against a stored hash.
    ///
    /// A hash in any unrecognized shape verifies as false.
    pub fn verify_secret(&self, raw_secret: &str, secret_hash: &str) -> bool {
        let mut parts = secret_hash.split('$');
        let (Some(version), Some(salt_hex), Some(digest_hex), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return false;
        };

        if version != HASH_VERSION {
            return false;
        }

        let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
            return false;
        };

        if salt.len() != SALT_LEN {
            return false;
        }

        self.mac(&salt, raw_secret).verify_slice(&expected).is_ok()
    }

    fn mac(&self, salt: &[u8], raw_secret: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.pepper).expect("HMAC key length is valid");
        mac.update(salt);
        mac.update(raw_secret.as_bytes());
        mac
    }
}

/// Generate a webhook signing secret (`whsec_` + 32 random bytes as hex).
pub fn generate_webhook_secret() -> String {
    format!("whsec_{}", hex::encode(rand::random::<[u8; 32]>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material() -> KeyMaterial {
        KeyMaterial::new(&KeyMaterialConfig {
            pepper: b"test-pepper".to_vec(),
            max_provision_attempts: 5,
        })
    }

    fn is_lower_hex(s: &str) -> bool {
        s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    #[test]
    fn key_pair_shapes() {
        let pair = material().generate_key_pair(KeyType::Live);

        let public = pair.public_key.strip_prefix("pk_live_").unwrap();
        assert_eq!(public.len(), 24);
        assert!(is_lower_hex(public));

        let secret = pair.raw_secret.strip_prefix("sk_live_").unwrap();
        assert_eq!(secret.len(), 64);
        assert!(is_lower_hex(secret));

        assert!(pair.secret_hash.starts_with("v1$"));
        assert!(!pair.secret_hash.contains(&pair.raw_secret));
    }

    #[test]
    fn unmatchable_hash_takes_the_full_check() {
        let material = material();
        let real = material.hash_secret("sk_test_x");
        let shape = |h: &str| h.split('$').map(str::len).collect::<Vec<_>>();
        assert_eq!(shape(UNMATCHABLE_HASH), shape(&real));
        assert!(!material.verify_secret("sk_test_x", UNMATCHABLE_HASH));
        assert!(!material.verify_secret("", UNMATCHABLE_HASH));
    }

    #[test]
    fn verify_round_trip_ten_thousand_times() {
        let material = material();
        for _ in 0..10_000 {
            let secret = material.generate_secret(KeyType::Test);
            let hash = material.hash_secret(&secret);
            assert!(material.verify_secret(&secret, &hash));
        }
    }

    #[test]
    fn wrong_secret_or_pepper_fails() {
        let material = material();
        let pair = material.generate_key_pair(KeyType::Test);
        assert!(!material.verify_secret("sk_test_nope", &pair.secret_hash));

        let other = KeyMaterial::new(&KeyMaterialConfig {
            pepper: b"other".to_vec(),
            max_provision_attempts: 5,
        });
        assert!(!other.verify_secret(&pair.raw_secret, &pair.secret_hash));
    }

    #[test]
    fn same_secret_hashes_differently() {
        let material = material();
        let a = material.hash_secret("sk_test_same");
        let b = material.hash_secret("sk_test_same");
        assert_ne!(a, b);
        assert!(material.verify_secret("sk_test_same", &a));
        assert!(material.verify_secret("sk_test_same", &b));
    }

    #[test]
    fn malformed_hashes_are_false() {
        let material = material();
        for hash in [
            "",
            "v1",
            "v1$",
            "v1$$",
            "v2$00112233445566778899aabbccddeeff$00",
            "v1$zz$00",
            "v1$0011$00",
            "v1$00112233445566778899aabbccddeeff$ab$extra",
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8",
        ] {
            assert!(!material.verify_secret("anything", hash), "{hash}");
        }
    }

    #[test]
    fn webhook_secret_shape() {
        let secret = generate_webhook_secret();
        let body = secret.strip_prefix("whsec_").unwrap();
        assert_eq!(body.len(), 64);
        assert_ne!(secret, generate_webhook_secret());
    }
}
