//! Passphrase-protected, file-backed key-value store.
//!
//! A [`SyncStore`] keeps a small JSON document encrypted at rest in a single
//! file, with the encryption key derived from a passphrase via
//! PBKDF2-HMAC-SHA-256 and a per-store random salt stored alongside the data.
//! Every operation reads the file fresh and every mutation rewrites it
//! atomically, so the file is the single source of truth and a crash never
//! leaves a partial write behind.
//!
//! Reads degrade instead of failing: a file that does not decrypt (wrong
//! passphrase, tampering, truncation) behaves like an empty store, and the
//! event is reported through [`Diagnostic`] rather than an error. Use
//! [`SyncStore::verify`] when an unreadable store must abort instead.
//!
//! ```no_run
//! use syncstore::{SyncStore, Zeroizing};
//!
//! # fn main() -> syncstore::Result<()> {
//! let mut store = SyncStore::open("settings.db", Zeroizing::new("hunter2".into()))?;
//! store.set("volume", 0.8)?;
//! let volume = store.get_or("volume", 1.0)?;
//! # Ok(())
//! # }
//! ```

mod crypto;
mod document;
mod error;
mod salt;
mod storage;

pub use crate::crypto::{DEFAULT_ITERATIONS, MIN_ITERATIONS};
pub use crate::document::Document;
pub use crate::error::{Diagnostic, Result, StoreError};
pub use serde_json::Value;
pub use zeroize::Zeroizing;

use crate::crypto::{TokenCipher, TokenError};
use crate::storage::DataFile;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

type DiagnosticSink = Box<dyn Fn(Diagnostic) + Send + Sync>;

/// Construction options for a [`SyncStore`].
pub struct StoreOptions {
    iterations: u32,
    sink: Option<DiagnosticSink>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("iterations", &self.iterations)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            sink: None,
        }
    }

    /// PBKDF2 iteration count used for key derivation.
    ///
    /// Defaults to [`DEFAULT_ITERATIONS`]; counts below [`MIN_ITERATIONS`]
    /// are rejected at [`open`](Self::open). An existing store must be opened
    /// with the same count it was created with.
    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Callback invoked whenever an operation degrades instead of failing.
    ///
    /// Degradations are also logged via `tracing`; the sink is for callers
    /// that need to react programmatically.
    pub fn diagnostic_sink(mut self, sink: impl Fn(Diagnostic) + Send + Sync + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Open the store at `path`, creating it if it does not exist.
    ///
    /// The passphrase is consumed and zeroized once the key is derived. If no
    /// data file exists yet, an encrypted empty document is written so that a
    /// partially initialized store is never left behind.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::WeakIterations`] before touching the
    /// filesystem, with [`StoreError::Corrupt`] if an existing salt file has
    /// the wrong length, and with [`StoreError::Io`] on filesystem errors.
    pub fn open(self, path: impl Into<PathBuf>, passphrase: Zeroizing<String>) -> Result<SyncStore> {
        crypto::check_iterations(self.iterations)?;

        let file = DataFile::new(path.into());
        let loaded = salt::load_or_create(file.path())?;

        let mut key = crypto::derive_key(&passphrase, &loaded.bytes, self.iterations)?;
        drop(passphrase);

        let cipher = TokenCipher::new(&key);
        key.zeroize();

        let store = SyncStore {
            file,
            cipher,
            sink: self.sink,
        };

        if let Some(err) = loaded.write_error {
            store.emit(Diagnostic::SaltWriteFailed {
                path: salt::salt_path(store.file.path()),
                detail: err.to_string(),
            });
        }

        store.file.remove_orphans();

        if !store.file.exists() {
            store.write_document(&Document::new())?;
        }

        Ok(store)
    }
}

/// Encrypted key-value store over a single file.
///
/// `SyncStore` holds no decrypted state between calls: reads decrypt the file
/// on demand and mutations read, modify, and atomically rewrite it. Two
/// instances over the same path see each other's writes, though concurrent
/// writers are not coordinated and the last rewrite wins.
///
/// The derived key halves live only inside the store and are zeroized on
/// drop.
pub struct SyncStore {
    file: DataFile,
    cipher: TokenCipher,
    sink: Option<DiagnosticSink>,
}

// key material stays out of Debug output
impl fmt::Debug for SyncStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncStore")
            .field("path", &self.file.path())
            .finish_non_exhaustive()
    }
}

impl SyncStore {
    /// Open the store at `path` with the default iteration count.
    pub fn open(path: impl Into<PathBuf>, passphrase: Zeroizing<String>) -> Result<Self> {
        StoreOptions::new().open(path, passphrase)
    }

    /// Open the store at `path` with an explicit iteration count.
    pub fn open_with_iterations(
        path: impl Into<PathBuf>,
        passphrase: Zeroizing<String>,
        iterations: u32,
    ) -> Result<Self> {
        StoreOptions::new().iterations(iterations).open(path, passphrase)
    }

    /// Look up a key, returning `None` if it is absent.
    ///
    /// An unreadable data file behaves like an empty store; see
    /// [`Diagnostic::TokenRejected`].
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut doc = self.read_document()?;
        Ok(doc.remove(key))
    }

    /// Look up a key, returning `default` if it is absent.
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Result<Value> {
        Ok(self.get(key)?.unwrap_or_else(|| default.into()))
    }

    /// Insert or replace a key, rewriting the data file.
    ///
    /// The value is serialized before any file is touched, so a value that
    /// cannot be represented leaves the store unchanged.
    pub fn set(&mut self, key: &str, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value).map_err(StoreError::Serialization)?;
        let mut doc = self.read_document()?;
        doc.insert(key, value);
        self.write_document(&doc)
    }

    /// Remove a key, rewriting the data file.
    ///
    /// Removing an absent key is not an error; the file is rewritten either
    /// way, which also re-encrypts a previously unreadable store as empty.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let mut doc = self.read_document()?;
        doc.remove(key);
        self.write_document(&doc)
    }

    /// Decrypt and return the whole document.
    pub fn document(&self) -> Result<Document> {
        self.read_document()
    }

    /// Strictly decode the current data file, without the read-path
    /// degradation.
    ///
    /// A zero-byte file counts as a valid empty store.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::Decryption`] when the file does not
    /// authenticate under the derived key, and with [`StoreError::Corrupt`]
    /// when it is not a token or does not hold a document.
    pub fn verify(&self) -> Result<()> {
        let raw = self.file.read()?;
        if raw.is_empty() {
            return Ok(());
        }

        let token = std::str::from_utf8(&raw)
            .map_err(|_| StoreError::Corrupt("data file is not a token".into()))?;

        let plaintext = self.cipher.open(token).map_err(|err| match err {
            TokenError::TagMismatch => StoreError::Decryption,
            other => StoreError::Corrupt(other.to_string()),
        })?;

        serde_json::from_slice::<Document>(&plaintext).map_err(|err| {
            StoreError::Corrupt(format!("decrypted payload is not a document: {err}"))
        })?;

        Ok(())
    }

    /// Path of the data file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn read_document(&self) -> Result<Document> {
        let raw = self.file.read()?;

        // a zero-byte file is a valid empty store, not a corrupt one
        if raw.is_empty() {
            return Ok(Document::new());
        }

        let outcome = match std::str::from_utf8(&raw) {
            Ok(token) => match self.cipher.open(token) {
                Ok(plaintext) => serde_json::from_slice::<Document>(&plaintext)
                    .map_err(|err| format!("decrypted payload is not a document: {err}")),
                Err(err) => Err(err.to_string()),
            },
            Err(_) => Err("data file is not a token".to_string()),
        };

        match outcome {
            Ok(doc) => Ok(doc),
            Err(detail) => {
                self.emit(Diagnostic::TokenRejected {
                    path: self.file.path().to_path_buf(),
                    detail,
                });
                Ok(Document::new())
            }
        }
    }

    fn write_document(&self, doc: &Document) -> Result<()> {
        let plaintext =
            Zeroizing::new(serde_json::to_vec(doc).map_err(StoreError::Serialization)?);
        let token = self.cipher.seal(&plaintext)?;
        self.file.write(token.as_bytes())
    }

    fn emit(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::TokenRejected { path, detail } => {
                tracing::warn!(
                    path = %path.display(),
                    detail = %detail,
                    "unreadable data file, continuing with an empty document"
                );
            }
            Diagnostic::SaltWriteFailed { path, detail } => {
                tracing::error!(
                    path = %path.display(),
                    detail = %detail,
                    "salt not persisted, a future construction will derive a different key"
                );
            }
        }
        if let Some(sink) = &self.sink {
            sink(diagnostic);
        }
    }
}
