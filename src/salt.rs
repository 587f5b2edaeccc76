//! Salt management for key derivation.
//!
//! Every store keeps a sidecar file next to its data file holding the 16-byte
//! KDF salt. The salt is generated once, on first construction, and never
//! regenerated: the same salt and passphrase must keep deriving the same key,
//! or every existing token becomes unreadable.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::crypto::{self, SALT_LEN};
use crate::error::StoreError;

/// Suffix appended to the data-file path to name the salt file.
pub(crate) const SALT_FILE_SUFFIX: &str = ".salt";

/// Outcome of [`load_or_create`]: the salt, plus the write failure if a fresh
/// salt could not be persisted.
#[derive(Debug)]
pub(crate) struct LoadedSalt {
    pub bytes: [u8; SALT_LEN],
    /// The salt is still usable for this process; the caller decides how
    /// loudly to report the failure.
    pub write_error: Option<io::Error>,
}

/// Path of the salt file belonging to a data file (`store.db` -> `store.db.salt`).
pub(crate) fn salt_path(data_path: &Path) -> PathBuf {
    let mut raw = data_path.as_os_str().to_os_string();
    raw.push(SALT_FILE_SUFFIX);
    PathBuf::from(raw)
}

/// Return the store's salt, generating and persisting it on first use.
///
/// An existing salt file of the wrong length fails with
/// [`StoreError::Corrupt`]: regenerating would silently orphan every token
/// encrypted under the old salt.
///
/// Two processes racing to create the same store each generate their own
/// salt and the surviving file is whichever write landed; later
/// constructions all read that one. Nothing coordinates the race, the store
/// is single-writer by contract.
pub(crate) fn load_or_create(data_path: &Path) -> Result<LoadedSalt, StoreError> {
    let path = salt_path(data_path);

    match fs::read(&path) {
        Ok(bytes) => {
            let bytes: [u8; SALT_LEN] = bytes.try_into().map_err(|found: Vec<u8>| {
                StoreError::Corrupt(format!(
                    "salt file {} holds {} bytes, expected {SALT_LEN}",
                    path.display(),
                    found.len()
                ))
            })?;
            Ok(LoadedSalt {
                bytes,
                write_error: None,
            })
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut bytes = [0u8; SALT_LEN];
            crypto::secure_random(&mut bytes)?;
            let write_error = persist(&path, &bytes).err();
            Ok(LoadedSalt { bytes, write_error })
        }
        Err(err) => Err(err.into()),
    }
}

fn persist(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn salt_path_appends_suffix() {
        assert_eq!(
            salt_path(Path::new("/data/store.db")),
            PathBuf::from("/data/store.db.salt")
        );
    }

    #[test]
    fn first_use_creates_the_salt_file() {
        let dir = tempdir().unwrap();
        let data_path = dir.path().join("store.db");

        let loaded = load_or_create(&data_path).unwrap();
        assert!(loaded.write_error.is_none());

        let on_disk = fs::read(salt_path(&data_path)).unwrap();
        assert_eq!(on_disk.len(), SALT_LEN);
        assert_eq!(on_disk, loaded.bytes);
    }

    #[test]
    fn second_use_returns_the_same_salt() {
        let dir = tempdir().unwrap();
        let data_path = dir.path().join("store.db");

        let first = load_or_create(&data_path).unwrap();
        let second = load_or_create(&data_path).unwrap();
        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn wrong_length_salt_file_fails() {
        let dir = tempdir().unwrap();
        let data_path = dir.path().join("store.db");
        fs::write(salt_path(&data_path), [0u8; 8]).unwrap();

        match load_or_create(&data_path) {
            Err(StoreError::Corrupt(msg)) => {
                assert!(msg.contains("8 bytes"), "unexpected message: {msg}");
            }
            other => panic!("expected Corrupt, got: {other:?}"),
        }
    }

    #[test]
    fn empty_salt_file_fails() {
        let dir = tempdir().unwrap();
        let data_path = dir.path().join("store.db");
        fs::write(salt_path(&data_path), []).unwrap();

        assert!(matches!(
            load_or_create(&data_path),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn unwritable_directory_still_yields_a_salt() {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let dir = tempdir().unwrap();
        if fs::metadata(dir.path()).unwrap().uid() == 0 {
            // Permission bits do not bind root.
            return;
        }

        let data_path = dir.path().join("store.db");
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o555)).unwrap();

        let loaded = load_or_create(&data_path).unwrap();

        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();

        assert!(loaded.write_error.is_some());
        assert!(!salt_path(&data_path).exists());
    }
}
