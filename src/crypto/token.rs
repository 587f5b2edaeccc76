//! Fernet token codec.
//!
//! Token layout, URL-safe base64 over:
//! ```text
//! VERSION (1, 0x80) | TIMESTAMP (8, u64 BE seconds) | IV (16) | CIPHERTEXT (AES-128-CBC, PKCS#7) | TAG (32, HMAC-SHA-256)
//! ```
//!
//! The 32-byte store key splits in half: the first 16 bytes sign, the last 16
//! encrypt. The tag covers every byte before it and is verified before any
//! decryption is attempted.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use super::{IV_LEN, KEY_LEN, TAG_LEN, secure_random};
use crate::error::StoreError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Version byte of every token this codec reads or writes.
const TOKEN_VERSION: u8 = 0x80;

const TS_LEN: usize = 8;
const HEADER_LEN: usize = 1 + TS_LEN + IV_LEN;
const BLOCK_LEN: usize = 16;
/// A well-formed token carries at least one ciphertext block.
const MIN_TOKEN_LEN: usize = HEADER_LEN + BLOCK_LEN + TAG_LEN;

/// Why a token was rejected.
#[derive(Debug, Error)]
pub(crate) enum TokenError {
    #[error("token is not well-formed")]
    Malformed,
    #[error("unsupported token version {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("authentication tag mismatch")]
    TagMismatch,
}

/// Authenticated encryption for the on-disk token.
///
/// Key halves are zeroized on drop.
pub(crate) struct TokenCipher {
    signing_key: [u8; KEY_LEN / 2],
    encryption_key: [u8; KEY_LEN / 2],
}

impl Drop for TokenCipher {
    fn drop(&mut self) {
        self.signing_key.zeroize();
        self.encryption_key.zeroize();
    }
}

impl TokenCipher {
    /// Split a derived key into its signing and encryption halves.
    pub(crate) fn new(key: &[u8; KEY_LEN]) -> Self {
        let mut signing_key = [0u8; KEY_LEN / 2];
        let mut encryption_key = [0u8; KEY_LEN / 2];
        signing_key.copy_from_slice(&key[..KEY_LEN / 2]);
        encryption_key.copy_from_slice(&key[KEY_LEN / 2..]);
        Self {
            signing_key,
            encryption_key,
        }
    }

    /// Encrypt plaintext into a fresh token.
    ///
    /// A new random IV is drawn on every call, so sealing the same plaintext
    /// twice yields different tokens.
    pub(crate) fn seal(&self, plaintext: &[u8]) -> Result<String, StoreError> {
        let mut iv = [0u8; IV_LEN];
        secure_random(&mut iv)?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Ok(self.seal_at(timestamp, iv, plaintext))
    }

    fn seal_at(&self, timestamp: u64, iv: [u8; IV_LEN], plaintext: &[u8]) -> String {
        let ciphertext = Aes128CbcEnc::new(&self.encryption_key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut data = Vec::with_capacity(HEADER_LEN + ciphertext.len() + TAG_LEN);
        data.push(TOKEN_VERSION);
        data.extend_from_slice(&timestamp.to_be_bytes());
        data.extend_from_slice(&iv);
        data.extend_from_slice(&ciphertext);

        let mut mac = self.mac();
        mac.update(&data);
        data.extend_from_slice(&mac.finalize().into_bytes());

        URL_SAFE.encode(&data)
    }

    /// Decrypt a token, verifying the tag before touching the ciphertext.
    ///
    /// The embedded timestamp is not checked against any expiry: the file is
    /// the authoritative current state, however old it is.
    pub(crate) fn open(&self, token: &str) -> Result<Zeroizing<Vec<u8>>, TokenError> {
        let data = URL_SAFE.decode(token).map_err(|_| TokenError::Malformed)?;
        if data.len() < MIN_TOKEN_LEN {
            return Err(TokenError::Malformed);
        }
        if data[0] != TOKEN_VERSION {
            return Err(TokenError::UnsupportedVersion(data[0]));
        }

        let (signed, tag) = data.split_at(data.len() - TAG_LEN);
        let mut mac = self.mac();
        mac.update(signed);
        mac.verify_slice(tag).map_err(|_| TokenError::TagMismatch)?;

        let ciphertext = &signed[HEADER_LEN..];
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(TokenError::Malformed);
        }

        let iv: [u8; IV_LEN] = signed[1 + TS_LEN..HEADER_LEN]
            .try_into()
            .map_err(|_| TokenError::Malformed)?;

        let plaintext = Aes128CbcDec::new(&self.encryption_key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| TokenError::Malformed)?;

        Ok(Zeroizing::new(plaintext))
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.signing_key).expect("HMAC accepts any key length")
    }
}
