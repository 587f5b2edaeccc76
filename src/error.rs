use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors a store operation can fail with.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A filesystem operation failed and the store cannot proceed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// On-disk state is unusable, and rebuilding it would destroy data.
    #[error("store corrupt: {0}")]
    Corrupt(String),

    /// The requested PBKDF2 iteration count is below the supported floor.
    #[error(
        "{0} PBKDF2 iterations is below the required minimum of {min}",
        min = crate::crypto::MIN_ITERATIONS
    )]
    WeakIterations(u32),

    /// The value cannot be represented as a JSON document entry.
    #[error("value cannot be serialized: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The data file did not authenticate or decrypt under the derived key.
    #[error("decryption failed: wrong passphrase or corrupted data")]
    Decryption,
}

/// A degradation the store recovered from instead of failing.
///
/// Reads prefer returning defaults over erroring, so an unreadable file or an
/// unpersistable salt does not abort the calling application. Diagnostics make
/// those events observable: they are logged and, when a sink is installed via
/// [`StoreOptions::diagnostic_sink`](crate::StoreOptions::diagnostic_sink),
/// handed to the caller as they happen.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    /// The data file held something that was not a valid token for the
    /// derived key. The operation continued with an empty document; the file
    /// itself was left untouched.
    TokenRejected { path: PathBuf, detail: String },

    /// A freshly generated salt could not be written next to the data file.
    /// The store works for this process, but values written now will not be
    /// readable by a later construction.
    SaltWriteFailed { path: PathBuf, detail: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::TokenRejected { path, detail } => {
                write!(f, "rejected token in {}: {detail}", path.display())
            }
            Diagnostic::SaltWriteFailed { path, detail } => {
                write!(f, "could not persist salt {}: {detail}", path.display())
            }
        }
    }
}
