//! Password-based protection for export artifacts.
//!
//! Three sub-systems:
//! 1. Key derivation: PBKDF2-SHA256 from password + fresh random salt
//! 2. Envelope: self-describing AES-256-GCM container (header readable
//!    without the password, payload fails closed on any tampering)
//! 3. Password tooling: strength estimation + secure generation

pub mod envelope;
pub mod keys;
pub mod password;

pub use envelope::*;
pub use keys::*;
pub use password::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    /// Wrong password or a flipped bit in ciphertext/tag. User-recoverable
    /// by re-entering the password; never conflated with a damaged file.
    #[error("Authentication failed: wrong password or tampered data")]
    AuthenticationFailed,

    /// The envelope itself is malformed (bad marker, truncated header,
    /// implausible derivation parameters). Not recoverable by retyping.
    #[error("Corrupt envelope: {0}")]
    CorruptEnvelope(String),

    #[error("System entropy source unavailable")]
    EntropyUnavailable,
}
