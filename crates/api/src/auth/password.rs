//! Password hashing with Argon2

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Registration and reset rules: length bounds, at least one letter and
/// one digit, not a well-known password.
pub fn validate_password_strength(password: &str) -> Result<(), PasswordValidationError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(PasswordValidationError::TooShort);
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(PasswordValidationError::TooLong);
    }

    if !password.chars().any(char::is_alphabetic) {
        return Err(PasswordValidationError::MissingLetter);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordValidationError::MissingDigit);
    }

    if is_common_password(password) {
        return Err(PasswordValidationError::TooCommon);
    }

    Ok(())
}

fn is_common_password(password: &str) -> bool {
    const COMMON_PASSWORDS: &[&str] = &[
        "password1",
        "password12",
        "password123",
        "heslo123",
        "heslo1234",
        "heslo12345",
        "mojeheslo1",
        "qwerty123",
        "qwertz123",
        "abcd1234",
        "abc12345",
        "1q2w3e4r",
        "1qaz2wsx",
        "zaq12wsx",
        "welcome1",
        "admin123",
        "admin1234",
        "letmein1",
        "faktura1",
        "faktura123",
        "fakturace1",
        "fakturace123",
        "12345678a",
        "a12345678",
    ];

    let lower = password.to_lowercase();
    COMMON_PASSWORDS.contains(&lower.as_str())
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Invalid password hash: {0}")]
    InvalidHash(String),
}

/// Messages are shown to the user as-is
#[derive(Debug, thiserror::Error)]
pub enum PasswordValidationError {
    #[error("Heslo musí mít alespoň 8 znaků")]
    TooShort,
    #[error("Heslo může mít nejvýše 128 znaků")]
    TooLong,
    #[error("Heslo musí obsahovat alespoň jedno písmeno")]
    MissingLetter,
    #[error("Heslo musí obsahovat alespoň jednu číslici")]
    MissingDigit,
    #[error("Toto heslo je příliš běžné, zvolte prosím jiné")]
    TooCommon,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let password = "Zluťoučký kůň 42";
        let hash = hash_password(password).expect("Failed to hash password");

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(password, &hash).expect("Verification failed"));
        assert!(!verify_password("spatne-heslo-1", &hash).expect("Verification failed"));
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(matches!(
            verify_password("whatever1", "not-a-hash"),
            Err(PasswordError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_password_rules() {
        assert!(matches!(
            validate_password_strength("kratke1"),
            Err(PasswordValidationError::TooShort)
        ));
        assert!(matches!(
            validate_password_strength("12345678901"),
            Err(PasswordValidationError::MissingLetter)
        ));
        assert!(matches!(
            validate_password_strength("jenompismena"),
            Err(PasswordValidationError::MissingDigit)
        ));
        assert!(matches!(
            validate_password_strength("Heslo123"),
            Err(PasswordValidationError::TooCommon)
        ));
        assert!(matches!(
            validate_password_strength(&format!("a1{}", "x".repeat(MAX_PASSWORD_LENGTH))),
            Err(PasswordValidationError::TooLong)
        ));

        assert!(validate_password_strength("ceskyles7").is_ok());
        // Length counts characters, not bytes
        assert!(validate_password_strength("žluťák1ř").is_ok());
    }
}
