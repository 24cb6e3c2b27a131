use log::{debug, info};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{Result, TriageError};

/// Suffix inserted before the numeric counter when a restored file collides.
pub const RESTORE_SUFFIX: &str = "_restored";

/// Returns `target` if nothing exists there, otherwise the first free
/// `stem{suffix}_N.ext` next to it, counting from 1.
pub fn collision_free_path(target: &Path, suffix: &str) -> PathBuf {
    if !target.exists() {
        return target.to_path_buf();
    }

    let parent = target.parent().unwrap_or_else(|| Path::new(""));
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|n| parent.join(format!("{}{}_{}{}", stem, suffix, n, extension)))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| target.to_path_buf())
}

/// Free spot for `file_name` inside `dir`: the name itself, or `stem_N.ext`.
pub fn free_name_in(dir: &Path, file_name: &OsStr) -> PathBuf {
    collision_free_path(&dir.join(file_name), "")
}

/// Renames `from` to `to`, falling back to copy + remove when the two sit on
/// different file systems.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    let move_error = |source: io::Error| TriageError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(move_error)?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_error) => {
            if !from.exists() {
                return Err(move_error(rename_error));
            }
            debug!("rename {:?} -> {:?} failed ({}), copying instead", from, to, rename_error);
            fs::copy(from, to).map_err(move_error)?;
            if let Err(e) = fs::remove_file(from) {
                let _ = fs::remove_file(to);
                return Err(move_error(e));
            }
            Ok(())
        }
    }
}

/// Somewhere a discarded image can be sent without being erased.
pub trait TrashCan: Send {
    fn discard(&self, path: &Path) -> Result<()>;
}

/// The operating system's recycle bin.
pub struct SystemTrash;

impl TrashCan for SystemTrash {
    fn discard(&self, path: &Path) -> Result<()> {
        trash::delete(path).map_err(|e| TriageError::Trash {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        info!("Sent {:?} to the trash", path);
        Ok(())
    }
}

/// A plain directory standing in for the recycle bin.
pub struct FolderTrash {
    dir: PathBuf,
}

impl FolderTrash {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TrashCan for FolderTrash {
    fn discard(&self, path: &Path) -> Result<()> {
        let file_name = path.file_name().ok_or_else(|| TriageError::Trash {
            path: path.to_path_buf(),
            message: "path has no file name".to_owned(),
        })?;
        let target = free_name_in(&self.dir, file_name);

        move_file(path, &target).map_err(|e| TriageError::Trash {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        info!("Moved {:?} to trash folder as {:?}", path, target);
        Ok(())
    }
}
