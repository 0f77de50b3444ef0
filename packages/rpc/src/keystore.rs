//! Custodial key store
//!
//! Canton signing keys for custodially-registered users are generated
//! server-side and stored AES-256-GCM encrypted under a master secret held in
//! process. Plaintext key material exists only inside `sign_command`, wrapped
//! in `Zeroizing` so it is wiped as soon as the signature is produced.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use eyre::{eyre, Result};
use rand::RngCore;
use zeroize::Zeroizing;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;
/// Ed25519 seed length in bytes
const SEED_LEN: usize = 32;

pub struct Keystore {
    cipher: Aes256Gcm,
}

impl Keystore {
    /// Build from the 32-byte hex master secret
    pub fn new(master_key_hex: &str) -> Result<Self> {
        let raw = hex::decode(master_key_hex.trim_start_matches("0x"))
            .map_err(|_| eyre!("master key must be hex"))?;
        if raw.len() != 32 {
            return Err(eyre!("master key must be 32 bytes, got {}", raw.len()));
        }
        let key = Key::<Aes256Gcm>::from_slice(&raw);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Generate a fresh signing key. Returns `(encrypted, public_key_hex,
    /// plaintext_hex)`; the plaintext copy is handed to the user exactly once
    /// at registration and never stored.
    pub fn generate_key(&self) -> Result<(String, String, Zeroizing<String>)> {
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        rand::rngs::OsRng.fill_bytes(seed.as_mut());

        let signing_key = SigningKey::from_bytes(&seed);
        let public_hex = hex::encode(signing_key.verifying_key().to_bytes());

        let encrypted = self.encrypt(seed.as_ref())?;
        let plaintext_hex = Zeroizing::new(hex::encode(seed.as_ref()));

        Ok((encrypted, public_hex, plaintext_hex))
    }

    /// Encrypt key material: `base64(nonce || ciphertext)`
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| eyre!("key encryption failed"))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// Decrypt stored key material; the result wipes itself on drop
    pub fn decrypt(&self, encoded: &str) -> Result<Zeroizing<Vec<u8>>> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|_| eyre!("stored key is not valid base64"))?;
        if combined.len() <= NONCE_LEN {
            return Err(eyre!("stored key is truncated"));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| eyre!("key decryption failed (wrong master key or corrupted row)"))?;
        Ok(Zeroizing::new(plaintext))
    }

    /// Sign a command id with a user's stored key. The decrypted seed lives
    /// only for the duration of this call.
    pub fn sign_command(&self, encrypted_key: &str, command_id: &str) -> Result<String> {
        let seed = self.decrypt(encrypted_key)?;
        if seed.len() != SEED_LEN {
            return Err(eyre!("stored key has wrong length"));
        }
        let mut seed_array = Zeroizing::new([0u8; SEED_LEN]);
        seed_array.copy_from_slice(&seed);

        let signing_key = SigningKey::from_bytes(&seed_array);
        let signature = signing_key.sign(command_id.as_bytes());
        Ok(hex::encode(signature.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Verifier, VerifyingKey};

    fn keystore() -> Keystore {
        Keystore::new("0101010101010101010101010101010101010101010101010101010101010101")
            .unwrap()
    }

    #[test]
    fn test_master_key_validation() {
        assert!(Keystore::new("abcd").is_err());
        assert!(Keystore::new("zz").is_err());
        assert!(Keystore::new(&"0x".to_string().repeat(1)).is_err());
        assert!(keystore().encrypt(b"x").is_ok());
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let ks = keystore();
        let encrypted = ks.encrypt(b"key material").unwrap();
        let decrypted = ks.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted.as_slice(), b"key material");

        // Nonces are fresh per encryption
        let encrypted2 = ks.encrypt(b"key material").unwrap();
        assert_ne!(encrypted, encrypted2);
    }

    #[test]
    fn test_decrypt_rejects_wrong_master_key() {
        let ks = keystore();
        let other =
            Keystore::new("0202020202020202020202020202020202020202020202020202020202020202")
                .unwrap();
        let encrypted = ks.encrypt(b"secret").unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_sign_command_verifies() {
        let ks = keystore();
        let (encrypted, public_hex, _plaintext) = ks.generate_key().unwrap();

        let signature_hex = ks.sign_command(&encrypted, "erc20-transfer-abc").unwrap();

        let public = VerifyingKey::from_bytes(
            &hex::decode(public_hex).unwrap().try_into().unwrap(),
        )
        .unwrap();
        let signature = ed25519_dalek::Signature::from_bytes(
            &hex::decode(signature_hex).unwrap().try_into().unwrap(),
        );
        assert!(public.verify(b"erc20-transfer-abc", &signature).is_ok());
    }
}
