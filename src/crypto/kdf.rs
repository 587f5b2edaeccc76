use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use super::KEY_LEN;
use crate::error::StoreError;

/// PBKDF2 iteration count used when the caller does not choose one.
pub const DEFAULT_ITERATIONS: u32 = 390_000;

/// Lowest iteration count a store will accept.
pub const MIN_ITERATIONS: u32 = 100_000;

/// Reject iteration counts below [`MIN_ITERATIONS`].
pub(crate) fn check_iterations(iterations: u32) -> Result<(), StoreError> {
    if iterations < MIN_ITERATIONS {
        return Err(StoreError::WeakIterations(iterations));
    }
    Ok(())
}

/// Derive the 32-byte token key with PBKDF2-HMAC-SHA-256.
///
/// Deterministic in (passphrase, salt, iterations): two stores opened over
/// the same salt with the same passphrase and count derive the same key.
pub(crate) fn derive_key(
    passphrase: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<[u8; KEY_LEN], StoreError> {
    check_iterations(iterations)?;
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut key);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let salt = [42u8; 16];
        let k1 = derive_key("password", &salt, MIN_ITERATIONS).unwrap();
        let k2 = derive_key("password", &salt, MIN_ITERATIONS).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn passphrase_changes_the_key() {
        let salt = [42u8; 16];
        let k1 = derive_key("password", &salt, MIN_ITERATIONS).unwrap();
        let k2 = derive_key("passwore", &salt, MIN_ITERATIONS).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn salt_changes_the_key() {
        let k1 = derive_key("password", &[1u8; 16], MIN_ITERATIONS).unwrap();
        let k2 = derive_key("password", &[2u8; 16], MIN_ITERATIONS).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn iteration_count_changes_the_key() {
        let salt = [7u8; 16];
        let k1 = derive_key("password", &salt, MIN_ITERATIONS).unwrap();
        let k2 = derive_key("password", &salt, MIN_ITERATIONS + 1).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn weak_iteration_counts_fail() {
        match derive_key("password", &[0u8; 16], MIN_ITERATIONS - 1) {
            Err(StoreError::WeakIterations(n)) => assert_eq!(n, MIN_ITERATIONS - 1),
            other => panic!("expected WeakIterations, got: {other:?}"),
        }
    }
}
