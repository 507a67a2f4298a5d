//! At-rest encryption for connection passwords and API keys.
//!
//! AES-256-GCM with a fresh random nonce per record; ciphertexts are stored
//! as `base64(nonce || ciphertext)`. The master key lives in a key file under
//! the app data directory, created on first use with owner-only permissions.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::path::Path;

use crate::error::{Error, Result};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_FILE: &str = "meridian.key";

/// Symmetric cipher handle shared by the store.
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; KEY_LEN],
}

impl CredentialCipher {
    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        CredentialCipher { key }
    }

    /// Load the master key from the app data dir, generating one on first use.
    pub fn load_or_create(app_data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(app_data_dir)
            .map_err(|e| Error::Cipher(format!("failed to create app data dir: {}", e)))?;
        let key_path = app_data_dir.join(KEY_FILE);

        if key_path.exists() {
            let hex_key = std::fs::read_to_string(&key_path)
                .map_err(|e| Error::Cipher(format!("failed to read key file: {}", e)))?;
            let bytes = hex::decode(hex_key.trim())
                .map_err(|e| Error::Cipher(format!("malformed key file: {}", e)))?;
            let key: [u8; KEY_LEN] = bytes
                .try_into()
                .map_err(|_| Error::Cipher("key file has wrong length".to_string()))?;
            return Ok(CredentialCipher { key });
        }

        let key = Aes256Gcm::generate_key(OsRng);
        let mut key_bytes = [0u8; KEY_LEN];
        key_bytes.copy_from_slice(key.as_slice());

        std::fs::write(&key_path, hex::encode(key_bytes))
            .map_err(|e| Error::Cipher(format!("failed to write key file: {}", e)))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600));
        }
        log::info!("generated new credential key at {}", key_path.display());

        Ok(CredentialCipher { key: key_bytes })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| Error::Cipher(format!("encryption failed: {}", e)))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(nonce.as_slice());
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|e| Error::Cipher(format!("malformed ciphertext: {}", e)))?;
        if combined.len() < NONCE_LEN {
            return Err(Error::Cipher("ciphertext too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| Error::Cipher(format!("decryption failed: {}", e)))?;
        String::from_utf8(plaintext).map_err(|e| Error::Cipher(format!("invalid utf-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_cipher() -> CredentialCipher {
        CredentialCipher::from_key([7u8; 32])
    }

    #[test]
    fn round_trips_a_password() {
        let cipher = test_cipher();
        let ct = cipher.encrypt("hunter2").unwrap();
        assert_ne!(ct, "hunter2");
        assert_eq!(cipher.decrypt(&ct).unwrap(), "hunter2");
    }

    #[test]
    fn nonces_differ_per_record() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let cipher = test_cipher();
        let mut ct = cipher.encrypt("secret").unwrap();
        ct.replace_range(ct.len() - 2.., "AA");
        assert!(cipher.decrypt(&ct).is_err());
    }

    #[test]
    fn key_file_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let first = CredentialCipher::load_or_create(dir.path()).unwrap();
        let ct = first.encrypt("persisted").unwrap();
        let second = CredentialCipher::load_or_create(dir.path()).unwrap();
        assert_eq!(second.decrypt(&ct).unwrap(), "persisted");
    }

    proptest! {
        #[test]
        fn round_trips_printable_ascii(s in "[ -~]{0,128}") {
            let cipher = test_cipher();
            let ct = cipher.encrypt(&s).unwrap();
            prop_assert_eq!(cipher.decrypt(&ct).unwrap(), s);
        }
    }
}
