use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::CryptoError;

/// Minimum length for generated passwords. Shorter requests are clamped up.
pub const MIN_GENERATED_LENGTH: usize = 12;

/// Bounded ordinal strength score with a human label. Pure function of the
/// password string alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordStrength {
    VeryWeak,
    Weak,
    Fair,
    Strong,
    VeryStrong,
}

impl PasswordStrength {
    pub fn score(self) -> u8 {
        match self {
            PasswordStrength::VeryWeak => 0,
            PasswordStrength::Weak => 1,
            PasswordStrength::Fair => 2,
            PasswordStrength::Strong => 3,
            PasswordStrength::VeryStrong => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PasswordStrength::VeryWeak => "very weak",
            PasswordStrength::Weak => "weak",
            PasswordStrength::Fair => "fair",
            PasswordStrength::Strong => "strong",
            PasswordStrength::VeryStrong => "very strong",
        }
    }
}

/// Passwords seen in every breach corpus. Blocked outright.
const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "123456", "1234567", "12345678",
    "123456789", "1234567890", "qwerty", "qwertyuiop", "azerty", "abc123",
    "letmein", "welcome", "monkey", "dragon", "iloveyou", "admin", "login",
    "passw0rd", "p@ssword", "sunshine", "princess", "football", "baseball",
    "master", "shadow", "superman", "trustno1", "000000", "111111", "soleil",
    "motdepasse",
];

const SYMBOLS: &[u8] = b"!@#$%^&*-_=+?";

/// Estimate password strength from length, character-class diversity, and
/// presence in the common-password blocklist. Deterministic, no I/O.
pub fn estimate_password_strength(password: &str) -> PasswordStrength {
    if password.is_empty() {
        return PasswordStrength::VeryWeak;
    }
    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        return PasswordStrength::VeryWeak;
    }

    let length = password.chars().count();
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_alphanumeric());
    let classes = [has_lower, has_upper, has_digit, has_symbol]
        .iter()
        .filter(|present| **present)
        .count();

    let mut points = 0u8;
    if length >= 8 {
        points += 1;
    }
    if length >= 12 {
        points += 1;
    }
    if length >= 16 {
        points += 1;
    }
    if classes >= 2 {
        points += 1;
    }
    if classes >= 3 {
        points += 1;
    }
    if classes == 4 {
        points += 1;
    }

    match points {
        0 | 1 => PasswordStrength::VeryWeak,
        2 => PasswordStrength::Weak,
        3 => PasswordStrength::Fair,
        4 => PasswordStrength::Strong,
        _ => PasswordStrength::VeryStrong,
    }
}

/// Generate a password from the OS entropy source with at least one
/// character from each class, shuffled so class positions are not
/// predictable. Always scores in the top strength band.
pub fn generate_secure_password(length: usize) -> Result<String, CryptoError> {
    let length = length.max(MIN_GENERATED_LENGTH);
    let mut rng = rand::rngs::OsRng;

    let lower = b"abcdefghijkmnopqrstuvwxyz"; // no 'l' (confusable with 1/I)
    let upper = b"ABCDEFGHJKLMNPQRSTUVWXYZ"; // no 'I'/'O'
    let digits = b"23456789"; // no '0'/'1'
    let pools: [&[u8]; 4] = [lower, upper, digits, SYMBOLS];

    let mut chars: Vec<u8> = Vec::with_capacity(length);
    for pool in pools {
        chars.push(pool[rng.gen_range(0..pool.len())]);
    }

    let all: Vec<u8> = pools.concat();
    while chars.len() < length {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    String::from_utf8(chars).map_err(|_| CryptoError::EncryptionFailed)
}
