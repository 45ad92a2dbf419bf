use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use super::CryptoError;

pub const PBKDF2_ITERATIONS: u32 = 600_000;
pub const KEY_LENGTH: usize = 32; // AES-256
pub const SALT_LENGTH: usize = 32;

/// Export encryption key, zeroed on drop
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct ExportKey {
    pub(super) key_bytes: [u8; KEY_LENGTH],
}

impl ExportKey {
    /// Derive from password + salt using PBKDF2-SHA256 at the default
    /// iteration count.
    pub fn derive(password: &str, salt: &[u8; SALT_LENGTH]) -> Self {
        Self::derive_with_iterations(password, salt, PBKDF2_ITERATIONS)
    }

    /// Derive with an explicit iteration count. Decryption uses the count
    /// stored in the envelope so parameters can be raised without breaking
    /// old artifacts.
    pub fn derive_with_iterations(password: &str, salt: &[u8; SALT_LENGTH], iterations: u32) -> Self {
        let mut key_bytes = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key_bytes);
        Self { key_bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key_bytes
    }
}

/// Generate a cryptographically random salt. Fresh per encryption call,
/// never reused.
pub fn generate_salt() -> Result<[u8; SALT_LENGTH], CryptoError> {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LENGTH];
    rand::rngs::OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|_| CryptoError::EntropyUnavailable)?;
    Ok(salt)
}
