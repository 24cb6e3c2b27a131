use log::{debug, info};
use sha1::{Digest, Sha1};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{Result, TriageError};

/// Name of the subdirectory the store owns inside the directory it is given.
pub const STORE_DIR_NAME: &str = "image-triage-backup";

/// Per-session staging area for discarded images. One file per original,
/// named after the SHA-1 of the original's absolute path.
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// Opens the store under `parent` for a new session, dropping whatever an
    /// earlier session left behind. Only the store's own subdirectory is
    /// cleared; other entries in `parent` are never touched.
    pub fn open(parent: PathBuf) -> Result<Self> {
        let dir = parent.join(STORE_DIR_NAME);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            debug!("Cleared stale backups in {:?}", dir);
        }
        fs::create_dir_all(&dir)?;
        info!("Backup store at {:?}", dir);
        Ok(Self { dir })
    }

    pub fn default_dir() -> PathBuf {
        let cache_home = dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .unwrap_or_else(|| PathBuf::from(".cache"));

        cache_home.join("image-triage")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn backup_name(original: &Path) -> String {
        let absolute = fs::canonicalize(original).unwrap_or_else(|_| original.to_path_buf());

        let mut hasher = Sha1::new();
        hasher.update(absolute.to_string_lossy().as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        match original.extension() {
            Some(ext) => format!("{}.{}", digest, ext.to_string_lossy()),
            None => digest,
        }
    }

    pub fn backup_path(&self, original: &Path) -> PathBuf {
        self.dir.join(Self::backup_name(original))
    }

    /// Copies `original` into the store and returns where the copy lives.
    pub fn stage(&self, original: &Path) -> Result<PathBuf> {
        let target = self.backup_path(original);
        fs::copy(original, &target).map_err(|source| TriageError::Backup {
            path: original.to_path_buf(),
            source,
        })?;
        debug!("Backed up {:?} to {:?}", original, target);
        Ok(target)
    }

    pub fn release(&self, backup: &Path) {
        if let Err(e) = fs::remove_file(backup) {
            debug!("Could not remove backup {:?}: {}", backup, e);
        }
    }

    pub fn len(&self) -> usize {
        fs::read_dir(&self.dir)
            .map(|entries| entries.filter_map(|e| e.ok()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
