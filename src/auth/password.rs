use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

/// Plaintext policy: at least 7 characters and must not contain the word
/// "password" in any casing. Checked before hashing, on create and on change.
pub fn validate_password(plain: &str) -> Result<(), String> {
    if plain.len() < 7 {
        return Err("Password must be at least 7 characters.".into());
    }
    if plain.to_lowercase().contains("password") {
        return Err("Your password must not contain \"password\".".into());
    }
    Ok(())
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "MyV@alidP@ssword123!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert_ne!(hash, password);
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("correct-horse-battery-staple").expect("hashing should succeed");
        assert!(!verify_password("wrong-guess", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn policy_rejects_short_passwords() {
        assert!(validate_password("abc123").is_err());
        assert!(validate_password("abc1234").is_ok());
    }

    #[test]
    fn policy_rejects_the_word_password_in_any_casing() {
        assert!(validate_password("password123").is_err());
        assert!(validate_password("MyPaSsWoRd!").is_err());
        assert!(validate_password("hunter22").is_ok());
    }
}
