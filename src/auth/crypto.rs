//! Password hashing and reversible email encryption

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::AuthError;

pub const PBKDF2_ROUNDS: u32 = 100_000;

const SALT_BYTES: usize = 16;
const DIGEST_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;
const EMAIL_KEY_SALT: &[u8] = b"heartbeat-email";

/// Salted PBKDF2-HMAC-SHA256 password hashes stored as `<hex salt>:<hex digest>`
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    rounds: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            rounds: PBKDF2_ROUNDS,
        }
    }
}

impl PasswordHasher {
    pub fn with_rounds(rounds: u32) -> Self {
        Self { rounds }
    }

    pub fn hash(&self, password: &str) -> String {
        let salt = hex::encode(rand::random::<[u8; SALT_BYTES]>());
        let digest = self.digest(password, &salt);
        format!("{}:{}", salt, hex::encode(digest))
    }

    /// False for a wrong password and for any malformed stored hash
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let Some((salt, expected)) = stored.split_once(':') else {
            return false;
        };
        let Ok(expected) = hex::decode(expected) else {
            return false;
        };

        self.digest(password, salt)[..].ct_eq(&expected[..]).into()
    }

    fn digest(&self, password: &str, salt: &str) -> [u8; DIGEST_BYTES] {
        let mut out = [0u8; DIGEST_BYTES];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), self.rounds, &mut out);
        out
    }
}

/// AES-256-GCM over a key stretched from the configured secret
pub struct EmailCipher {
    cipher: Aes256Gcm,
}

impl EmailCipher {
    pub fn new(secret: &str) -> Self {
        let mut key = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), EMAIL_KEY_SALT, PBKDF2_ROUNDS, &mut key);

        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// base64url of `nonce || ciphertext`
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AuthError> {
        let nonce_bytes = rand::random::<[u8; NONCE_BYTES]>();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| AuthError::Crypto(format!("Failed to encrypt data: {}", e)))?;

        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE.encode(sealed))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, AuthError> {
        let sealed = URL_SAFE
            .decode(encoded)
            .map_err(|e| AuthError::Crypto(format!("Failed to decrypt data: {}", e)))?;
        if sealed.len() <= NONCE_BYTES {
            return Err(AuthError::Crypto("Failed to decrypt data: truncated input".to_string()));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_BYTES);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| AuthError::Crypto(format!("Failed to decrypt data: {}", e)))?;

        String::from_utf8(plaintext).map_err(|e| AuthError::Crypto(format!("Failed to decrypt data: {}", e)))
    }
}

impl std::fmt::Debug for EmailCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailCipher").finish_non_exhaustive()
    }
}
