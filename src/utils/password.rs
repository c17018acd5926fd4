use base64::{Engine, engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD}};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const ITERATIONS: u32 = 260000;
const KEY_LENGTH: usize = 32;
const SALT_LENGTH: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("invalid hash format")]
    Format,
    #[error("invalid iterations")]
    Iterations,
    #[error("failed to decode {0}")]
    Decode(&'static str),
    #[error("key derivation failed")]
    Derive,
}

/// Hash au format pbkdf2:sha256:iterations$salt$hash
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    hash_password_with(password, ITERATIONS)
}

/// Same as `hash_password` with an explicit work factor (the in-memory
/// gateway lowers it so tests stay fast)
pub fn hash_password_with(password: &str, iterations: u32) -> Result<String, PasswordError> {
    if iterations == 0 {
        return Err(PasswordError::Iterations);
    }

    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill(&mut salt);

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::<HmacSha256>(password.as_bytes(), &salt, iterations, &mut key)
        .map_err(|_| PasswordError::Derive)?;

    Ok(format!(
        "pbkdf2:sha256:{}${}${}",
        iterations,
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(key)
    ))
}

/// Vérifie un mot de passe contre un hash stocké.
/// Salt and hash may be base64 (url-safe or standard) or hex.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
    let mut parts = stored_hash.split('$');
    let (Some(header), Some(salt_str), Some(hash_str), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(PasswordError::Format);
    };

    let iterations = match header.split(':').collect::<Vec<_>>().as_slice() {
        ["pbkdf2", "sha256", iterations] => iterations
            .parse::<u32>()
            .map_err(|_| PasswordError::Iterations)?,
        _ => return Err(PasswordError::Format),
    };
    if iterations == 0 {
        return Err(PasswordError::Iterations);
    }

    let salt = decode_flexible(salt_str).ok_or(PasswordError::Decode("salt"))?;
    let expected = decode_flexible(hash_str).ok_or(PasswordError::Decode("hash"))?;

    let mut computed = vec![0u8; expected.len()];
    pbkdf2::<HmacSha256>(password.as_bytes(), &salt, iterations, &mut computed)
        .map_err(|_| PasswordError::Derive)?;

    Ok(constant_time_eq(&computed, &expected))
}

fn decode_flexible(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 == 0 && input.chars().all(|c| c.is_ascii_hexdigit()) {
        if let Ok(bytes) = hex::decode(input) {
            return Some(bytes);
        }
    }
    URL_SAFE_NO_PAD
        .decode(input.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(input))
        .ok()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password_with("obra2026", 1_000).unwrap();
        assert!(hash.starts_with("pbkdf2:sha256:1000$"));
        assert!(verify_password("obra2026", &hash).unwrap());
        assert!(!verify_password("obra2025", &hash).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        let first = hash_password_with("same", 1_000).unwrap();
        let second = hash_password_with("same", 1_000).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn rejects_malformed_hashes() {
        assert!(matches!(verify_password("x", "plain"), Err(PasswordError::Format)));
        assert!(matches!(
            verify_password("x", "bcrypt:12$salt$hash"),
            Err(PasswordError::Format)
        ));
        assert!(matches!(
            verify_password("x", "pbkdf2:sha256:abc$c2FsdA$aGFzaA"),
            Err(PasswordError::Iterations)
        ));
    }
}
