//! Credential Encryption
//!
//! Machine-bound symmetric encryption for secrets stored in the config file.
//!
//! Encrypted values are `ENC:` followed by base64 of the OpenSSL `enc`
//! container: `"Salted__" || salt[8] || AES-256-CBC(PKCS#7) ciphertext`,
//! with key and IV derived together by PBKDF2-HMAC-SHA256 from the machine's
//! key material. Values without the marker are treated as plaintext and pass
//! through unchanged.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Marker prefix carried by every encrypted value.
pub const ENC_MARKER: &str = "ENC:";

/// PBKDF2 work factor, shared by encryption and decryption.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const SALT_HEADER: &[u8; 8] = b"Salted__";
const SALT_SIZE: usize = 8;
const KEY_SIZE: usize = 32;
const IV_SIZE: usize = 16;
const BLOCK_SIZE: usize = 16;

/// Placeholder used for identity components that cannot be determined.
const UNKNOWN_COMPONENT: &str = "default";

/// Errors from decrypting (or encrypting) a credential.
///
/// Display text never includes the key material or the ciphertext.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecryptionError {
    #[error("no key material available")]
    MissingKeyMaterial,

    #[error("ciphertext is not valid base64")]
    InvalidEncoding,

    #[error("ciphertext is missing the salt header")]
    MissingHeader,

    #[error("ciphertext is truncated")]
    Truncated,

    #[error("wrong key or corrupted ciphertext")]
    WrongKeyOrCorrupt,

    #[error("decrypted value is not valid UTF-8")]
    InvalidUtf8,
}

// ============================================================================
// Machine identity
// ============================================================================

/// Host-specific identity the encryption key is derived from.
///
/// Ciphertext produced on one machine/account does not decrypt elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineIdentity {
    pub hostname: String,
    pub user: String,
    pub machine_id: String,
}

impl MachineIdentity {
    /// Detect the identity of the current host and user.
    pub fn detect() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| UNKNOWN_COMPONENT.to_string());

        let user = ["USER", "LOGNAME", "USERNAME"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| UNKNOWN_COMPONENT.to_string());

        let machine_id = ["/etc/machine-id", "/var/lib/dbus/machine-id"]
            .iter()
            .find_map(|path| {
                std::fs::read_to_string(path)
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_else(|| UNKNOWN_COMPONENT.to_string());

        Self {
            hostname,
            user,
            machine_id,
        }
    }

    /// Hex SHA-256 over the concatenated identity components.
    pub fn key_material(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.hostname.as_bytes());
        hasher.update(self.user.as_bytes());
        hasher.update(self.machine_id.as_bytes());
        hex_encode(&hasher.finalize())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ============================================================================
// Cipher
// ============================================================================

/// Symmetric cipher for `ENC:`-marked credential values.
#[derive(Clone)]
pub struct CredentialCipher {
    key_material: String,
}

impl CredentialCipher {
    /// Create a cipher from explicit key material.
    pub fn new(key_material: impl Into<String>) -> Self {
        Self {
            key_material: key_material.into(),
        }
    }

    /// Create a cipher bound to the current machine and user.
    pub fn for_this_machine() -> Self {
        Self::new(MachineIdentity::detect().key_material())
    }

    /// Whether a stored value carries the encryption marker.
    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(ENC_MARKER)
    }

    /// Encrypt a plaintext credential, producing an `ENC:`-marked value.
    ///
    /// A fresh random salt is drawn per call, so encrypting the same value
    /// twice yields different ciphertexts.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, DecryptionError> {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);

        let (key, iv) = self.derive(&salt)?;
        let cipher = Aes256CbcEnc::new_from_slices(&key, &iv)
            .map_err(|_| DecryptionError::WrongKeyOrCorrupt)?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut blob = Vec::with_capacity(SALT_HEADER.len() + SALT_SIZE + ciphertext.len());
        blob.extend_from_slice(SALT_HEADER);
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", ENC_MARKER, BASE64.encode(blob)))
    }

    /// Decrypt a stored credential. Unmarked values are returned unchanged.
    pub fn decrypt(&self, value: &str) -> Result<String, DecryptionError> {
        let Some(encoded) = value.strip_prefix(ENC_MARKER) else {
            return Ok(value.to_string());
        };

        let blob = BASE64
            .decode(encoded.trim())
            .map_err(|_| DecryptionError::InvalidEncoding)?;

        let header_len = SALT_HEADER.len();
        if blob.len() < header_len {
            return Err(DecryptionError::Truncated);
        }
        if &blob[..header_len] != SALT_HEADER {
            return Err(DecryptionError::MissingHeader);
        }

        let body = &blob[header_len..];
        if body.len() < SALT_SIZE + BLOCK_SIZE || (body.len() - SALT_SIZE) % BLOCK_SIZE != 0 {
            return Err(DecryptionError::Truncated);
        }
        let (salt, ciphertext) = body.split_at(SALT_SIZE);

        let (key, iv) = self.derive(salt)?;
        let cipher = Aes256CbcDec::new_from_slices(&key, &iv)
            .map_err(|_| DecryptionError::WrongKeyOrCorrupt)?;
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| DecryptionError::WrongKeyOrCorrupt)?;

        String::from_utf8(plaintext).map_err(|_| DecryptionError::InvalidUtf8)
    }

    /// Decrypt a stored credential, treating any failure as "not configured".
    pub fn decrypt_or_empty(&self, value: &str) -> String {
        match self.decrypt(value) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::warn!("Failed to decrypt stored credential: {}", e);
                String::new()
            }
        }
    }

    /// Derive the AES key and IV for a salt in one PBKDF2 pass.
    fn derive(&self, salt: &[u8]) -> Result<([u8; KEY_SIZE], [u8; IV_SIZE]), DecryptionError> {
        if self.key_material.is_empty() {
            return Err(DecryptionError::MissingKeyMaterial);
        }

        let mut derived = [0u8; KEY_SIZE + IV_SIZE];
        pbkdf2_hmac::<Sha256>(
            self.key_material.as_bytes(),
            salt,
            PBKDF2_ITERATIONS,
            &mut derived,
        );

        let mut key = [0u8; KEY_SIZE];
        let mut iv = [0u8; IV_SIZE];
        key.copy_from_slice(&derived[..KEY_SIZE]);
        iv.copy_from_slice(&derived[KEY_SIZE..]);
        Ok((key, iv))
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("key_material", &"[REDACTED]")
            .finish()
    }
}
