//! Cryptographic primitives for the store.
//!
//! Provides passphrase key derivation and the authenticated token codec.

pub(crate) mod kdf;
pub(crate) mod token;

pub use kdf::{DEFAULT_ITERATIONS, MIN_ITERATIONS};
pub(crate) use kdf::{check_iterations, derive_key};
pub(crate) use token::{TokenCipher, TokenError};

use crate::error::StoreError;

/// Length of the KDF salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the derived key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the token IV (16 bytes, one AES block).
pub const IV_LEN: usize = 16;
/// Length of the authentication tag (32 bytes, HMAC-SHA-256).
pub const TAG_LEN: usize = 32;

/// Fill `buf` from the operating system's secure random source.
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<(), StoreError> {
    getrandom::fill(buf).map_err(|e| StoreError::Io(std::io::Error::other(e)))
}
