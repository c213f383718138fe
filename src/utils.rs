use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};

use crate::errors::AppError;

const MIN_PASSWORD_LENGTH: usize = 8;

const API_KEY_ALPHABET: &[u8] = b"1234567890abcdefghijklmnopqrstuvwxyz";
const API_KEY_LENGTH: usize = 16;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::bad_request(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::internal(format!("failed to hash password: {err}")))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|err| AppError::internal(format!("invalid password hash: {err}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Opaque project API key: 16 chars over a lowercase alphanumeric alphabet.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| API_KEY_ALPHABET[*b as usize % API_KEY_ALPHABET.len()] as char)
        .collect()
}

/// Lowercase, trim, collapse whitespace runs into single dashes.
/// Non-alphanumeric characters other than `_` and `-` are dropped.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = false;
    for ch in title.trim().to_lowercase().chars() {
        if ch.is_whitespace() || ch == '-' {
            if !last_dash && !slug.is_empty() {
                slug.push('-');
                last_dash = true;
            }
        } else if ch.is_alphanumeric() || ch == '_' {
            slug.push(ch);
            last_dash = false;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_whitespace_and_dashes() {
        assert_eq!(slugify("  Home   Appliances "), "home-appliances");
        assert_eq!(slugify("Already-Dashed--Title"), "already-dashed-title");
        assert_eq!(slugify("Ärmel & Co"), "ärmel-co");
    }

    #[test]
    fn api_key_shape() {
        let key = generate_api_key();
        assert_eq!(key.len(), 16);
        assert!(key.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
    }
}
