//! Persistence for the encrypted data file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::crypto::secure_random;
use crate::error::StoreError;

/// The encrypted data file behind a store.
///
/// `DataFile` reads the whole file at once and replaces it atomically on
/// write. No handle is held between operations, so every call observes
/// whatever is currently on disk.
pub(crate) struct DataFile {
    path: PathBuf,
}

impl DataFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns the path of the data file.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if the data file exists.
    pub(crate) fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the whole file into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub(crate) fn read(&self) -> Result<Vec<u8>, StoreError> {
        Ok(fs::read(&self.path)?)
    }

    /// Replaces the file contents, atomically with respect to a crash.
    ///
    /// The data goes to a randomly named sibling file first, which is fsynced
    /// and then renamed over the target; the parent directory is fsynced last
    /// so the rename itself survives a power loss. A crash at any point
    /// leaves either the old contents or the new ones, never a mix.
    ///
    /// Creates parent directories if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub(crate) fn write(&self, data: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.unique_tmp_path()?;

        // create_new: never clobber a file another writer is mid-way through
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;

        tmp_file.write_all(data)?;
        // contents must hit disk before the rename does
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(err) = self.atomic_replace(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }

        // persist the rename
        if let Some(parent) = self.path.parent() {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }

        Ok(())
    }

    /// Removes temp files left behind by writers that died mid-write.
    ///
    /// Best effort: an orphan that cannot be listed or removed is skipped.
    /// Orphans never shadow the data file itself, they only waste space.
    pub(crate) fn remove_orphans(&self) {
        let Some(parent) = self.path.parent() else {
            return;
        };
        let Some(name) = self.path.file_name() else {
            return;
        };

        let prefix = format!("{}.tmp.", name.to_string_lossy());
        let Ok(entries) = fs::read_dir(parent) else {
            return;
        };

        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                tracing::debug!(orphan = %entry.path().display(), "removing abandoned temp file");
                let _ = fs::remove_file(entry.path());
            }
        }
    }

    /// Picks a fresh temporary path in the data file's directory.
    ///
    /// The name embeds 8 random bytes (`<name>.tmp.<hex>`), which is also
    /// the pattern [`remove_orphans`](Self::remove_orphans) looks for.
    fn unique_tmp_path(&self) -> Result<PathBuf, StoreError> {
        let mut buf = [0u8; 8];
        secure_random(&mut buf)?;

        let rand_string = buf.iter().map(|b| format!("{b:02x}")).collect::<String>();

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| {
                StoreError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "data path has no file name",
                ))
            })?
            .to_string_lossy();

        let tmp_name = format!("{file_name}.tmp.{rand_string}");

        Ok(self.path.with_file_name(tmp_name))
    }

    /// Swaps the temporary file into place in one step.
    ///
    /// `ReplaceFileW` with `REPLACEFILE_WRITE_THROUGH` keeps the replacement
    /// atomic and forces it through to disk.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<(), StoreError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY: both strings are null-terminated UTF-16 buffers that
        // outlive the call, and ReplaceFileW does not retain the pointers.
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            return Err(StoreError::Io(io::Error::last_os_error()));
        }

        Ok(())
    }

    /// Swaps the temporary file into place in one step.
    ///
    /// `rename()` is atomic on Unix as long as both paths live on the same
    /// filesystem, which holds here because the temp file is a sibling.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<(), StoreError> {
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}
