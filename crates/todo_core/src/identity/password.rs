//! Password policy and Argon2 hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// One rule of the account password policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRule {
    MinLength,
    Digit,
    Lowercase,
    Uppercase,
    NonAlphanumeric,
}

impl Display for PasswordRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MinLength => write!(
                f,
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            ),
            Self::Digit => write!(f, "password must contain a digit"),
            Self::Lowercase => write!(f, "password must contain a lowercase letter"),
            Self::Uppercase => write!(f, "password must contain an uppercase letter"),
            Self::NonAlphanumeric => {
                write!(f, "password must contain a non-alphanumeric character")
            }
        }
    }
}

/// Returns every rule `password` violates; empty means accepted.
pub fn check_password_policy(password: &str) -> Vec<PasswordRule> {
    let mut violations = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        violations.push(PasswordRule::MinLength);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push(PasswordRule::Digit);
    }
    if !password.chars().any(char::is_lowercase) {
        violations.push(PasswordRule::Lowercase);
    }
    if !password.chars().any(char::is_uppercase) {
        violations.push(PasswordRule::Uppercase);
    }
    if password.chars().all(char::is_alphanumeric) {
        violations.push(PasswordRule::NonAlphanumeric);
    }
    violations
}

/// Argon2 backend failure while hashing.
#[derive(Debug)]
pub struct PasswordHashError(argon2::password_hash::Error);

impl Display for PasswordHashError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to hash password: {}", self.0)
    }
}

impl Error for PasswordHashError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl From<argon2::password_hash::Error> for PasswordHashError {
    fn from(value: argon2::password_hash::Error) -> Self {
        Self(value)
    }
}

/// Hashes `password` with a fresh random salt into a PHC string.
pub fn hash_password(password: &str) -> Result<String, PasswordHashError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verifies `password` against a stored PHC string.
///
/// Malformed stored hashes never verify.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(stored_hash) {
        Ok(hash) => hash,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
