use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

use super::keys::{generate_salt, ExportKey, KEY_LENGTH, PBKDF2_ITERATIONS, SALT_LENGTH};
use super::CryptoError;

/// Magic bytes opening every encrypted export artifact.
pub const ENVELOPE_MAGIC: &[u8; 8] = b"VITAPORT";

/// Envelope wire-format version.
pub const ENVELOPE_VERSION: u8 = 1;

const NONCE_LENGTH: usize = 12;

/// AES-GCM authentication tag size, appended to the ciphertext.
pub const TAG_LENGTH: usize = 16;

/// magic + version + salt + iterations (u32 LE) + nonce
pub const HEADER_LENGTH: usize = 8 + 1 + SALT_LENGTH + 4 + NONCE_LENGTH;

/// Plausibility bounds on the stored iteration count. Outside this range
/// the header has been damaged (or is hostile); treated as corruption,
/// not as an authentication failure.
const MIN_ITERATIONS: u32 = 1_000;
const MAX_ITERATIONS: u32 = 10_000_000;

/// Self-describing encrypted container: everything a later `decrypt` needs
/// except the password, in fixed order so classification can read only the
/// header.
#[derive(Debug, Clone)]
pub struct EncryptedEnvelope {
    pub version: u8,
    pub salt: [u8; SALT_LENGTH],
    pub iterations: u32,
    pub nonce: [u8; NONCE_LENGTH],
    /// Ciphertext with the 16-byte AES-GCM auth tag appended.
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Serialize: [magic][version][salt][iterations LE][nonce][ciphertext+tag]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LENGTH + self.ciphertext.len());
        bytes.extend_from_slice(ENVELOPE_MAGIC);
        bytes.push(self.version);
        bytes.extend_from_slice(&self.salt);
        bytes.extend_from_slice(&self.iterations.to_le_bytes());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < HEADER_LENGTH + TAG_LENGTH {
            return Err(CryptoError::CorruptEnvelope(
                "Envelope truncated".into(),
            ));
        }
        if &bytes[..8] != ENVELOPE_MAGIC {
            return Err(CryptoError::CorruptEnvelope(
                "Missing envelope marker".into(),
            ));
        }

        let version = bytes[8];
        if version == 0 || version > ENVELOPE_VERSION {
            return Err(CryptoError::CorruptEnvelope(format!(
                "Unsupported envelope version {version}"
            )));
        }

        let mut salt = [0u8; SALT_LENGTH];
        salt.copy_from_slice(&bytes[9..9 + SALT_LENGTH]);

        let iter_start = 9 + SALT_LENGTH;
        let mut iter_bytes = [0u8; 4];
        iter_bytes.copy_from_slice(&bytes[iter_start..iter_start + 4]);
        let iterations = u32::from_le_bytes(iter_bytes);
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&iterations) {
            return Err(CryptoError::CorruptEnvelope(format!(
                "Implausible iteration count {iterations}"
            )));
        }

        let nonce_start = iter_start + 4;
        let mut nonce = [0u8; NONCE_LENGTH];
        nonce.copy_from_slice(&bytes[nonce_start..nonce_start + NONCE_LENGTH]);

        Ok(Self {
            version,
            salt,
            iterations,
            nonce,
            ciphertext: bytes[HEADER_LENGTH..].to_vec(),
        })
    }
}

/// Encrypt a payload under a password: fresh salt, fresh nonce, derived key.
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<EncryptedEnvelope, CryptoError> {
    encrypt_with_iterations(plaintext, password, PBKDF2_ITERATIONS)
}

/// Encryption with an explicit PBKDF2 iteration count. Kept crate-private
/// so production callers always pay the full derivation cost.
pub(crate) fn encrypt_with_iterations(
    plaintext: &[u8],
    password: &str,
    iterations: u32,
) -> Result<EncryptedEnvelope, CryptoError> {
    let salt = generate_salt()?;
    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    rand::rngs::OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|_| CryptoError::EntropyUnavailable)?;

    let key = ExportKey::derive_with_iterations(password, &salt, iterations);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(EncryptedEnvelope {
        version: ENVELOPE_VERSION,
        salt,
        iterations,
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt an envelope. Fails closed: tag mismatch never yields partial
/// plaintext, and a wrong password is indistinguishable from tampering at
/// this layer (both are `AuthenticationFailed`).
pub fn decrypt(envelope: &EncryptedEnvelope, password: &str) -> Result<Vec<u8>, CryptoError> {
    let key = ExportKey::derive_with_iterations(password, &envelope.salt, envelope.iterations);
    decrypt_with_key(envelope, key.as_bytes())
}

fn decrypt_with_key(
    envelope: &EncryptedEnvelope,
    key_bytes: &[u8; KEY_LENGTH],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));
    cipher
        .decrypt(
            Nonce::from_slice(&envelope.nonce),
            envelope.ciphertext.as_ref(),
        )
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Fast sniff: does this payload carry the envelope marker? Reads only the
/// magic bytes, no password needed.
pub fn is_encrypted_backup(bytes: &[u8]) -> bool {
    bytes.len() >= ENVELOPE_MAGIC.len() && &bytes[..ENVELOPE_MAGIC.len()] == ENVELOPE_MAGIC.as_slice()
}

/// Trial-decrypt to validate a password before the expensive downstream
/// import steps run. The plaintext is dropped, never surfaced.
pub fn verify_backup_password(bytes: &[u8], password: &str) -> bool {
    match EncryptedEnvelope::from_bytes(bytes) {
        Ok(envelope) => decrypt(&envelope, password).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_ITERATIONS: u32 = 10_000;

    fn seal(plaintext: &[u8], password: &str) -> EncryptedEnvelope {
        encrypt_with_iterations(plaintext, password, TEST_ITERATIONS).unwrap()
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let envelope = seal(b"Hello, Vitaport health data!", "correct horse battery");
        let decrypted = decrypt(&envelope, "correct horse battery").unwrap();
        assert_eq!(&decrypted, b"Hello, Vitaport health data!");
    }

    #[test]
    fn decrypt_with_wrong_password_fails() {
        let envelope = seal(b"secret", "password1");
        let result = decrypt(&envelope, "password2");
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn tampered_ciphertext_detected() {
        let envelope = seal(b"secret data", "pw");
        for index in 0..envelope.ciphertext.len() {
            let mut tampered = envelope.clone();
            tampered.ciphertext[index] ^= 0x01;
            assert!(
                decrypt(&tampered, "pw").is_err(),
                "flipping byte {index} was not detected"
            );
        }
    }

    #[test]
    fn envelope_serialization_round_trip() {
        let envelope = seal(b"serialize me", "pw");
        let bytes = envelope.to_bytes();
        let restored = EncryptedEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(restored.iterations, TEST_ITERATIONS);
        assert_eq!(restored.salt, envelope.salt);
        let decrypted = decrypt(&restored, "pw").unwrap();
        assert_eq!(&decrypted, b"serialize me");
    }

    #[test]
    fn from_bytes_rejects_truncated() {
        let result = EncryptedEnvelope::from_bytes(&[0u8; 10]);
        assert!(matches!(result, Err(CryptoError::CorruptEnvelope(_))));
    }

    #[test]
    fn from_bytes_rejects_bad_magic() {
        let mut bytes = seal(b"x", "pw").to_bytes();
        bytes[0] = b'X';
        let result = EncryptedEnvelope::from_bytes(&bytes);
        assert!(matches!(result, Err(CryptoError::CorruptEnvelope(_))));
    }

    #[test]
    fn from_bytes_rejects_implausible_iterations() {
        let mut envelope = seal(b"x", "pw");
        envelope.iterations = u32::MAX;
        let result = EncryptedEnvelope::from_bytes(&envelope.to_bytes());
        assert!(matches!(result, Err(CryptoError::CorruptEnvelope(_))));
    }

    #[test]
    fn different_encryptions_produce_different_salts_and_nonces() {
        let e1 = seal(b"same data", "pw");
        let e2 = seal(b"same data", "pw");
        assert_ne!(e1.salt, e2.salt);
        assert_ne!(e1.nonce, e2.nonce);
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let envelope = seal(b"", "pw");
        let decrypted = decrypt(&envelope, "pw").unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn sniff_detects_envelope_without_password() {
        let bytes = seal(b"payload", "pw").to_bytes();
        assert!(is_encrypted_backup(&bytes));
        assert!(!is_encrypted_backup(b"{\"format_version\":1}"));
        assert!(!is_encrypted_backup(b""));
        assert!(!is_encrypted_backup(b"VITA"));
    }

    #[test]
    fn verify_password_without_surfacing_plaintext() {
        let bytes = seal(b"payload", "pw").to_bytes();
        assert!(verify_backup_password(&bytes, "pw"));
        assert!(!verify_backup_password(&bytes, "wrong"));
        assert!(!verify_backup_password(b"not an envelope", "pw"));
    }
}
