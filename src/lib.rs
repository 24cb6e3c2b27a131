use clap::Parser;
use std::path::{Path, PathBuf};

pub mod app;
pub mod backup;
pub mod disposition;
pub mod fileops;
pub mod preferences;
pub mod queue;
pub mod session;
pub mod stats;
pub mod thumbnail;
pub mod undo;

pub use app::TriageApp;
pub use backup::BackupStore;
pub use disposition::{DisposeReport, DispositionKind};
pub use fileops::{FolderTrash, SystemTrash, TrashCan};
pub use preferences::{PreferenceStore, Preferences};
pub use queue::{Slot, SlotCoord, SlotView, TriageQueue};
pub use session::{SessionConfig, TriageAction, TriageSession};
pub use stats::SessionStats;
pub use thumbnail::{Thumbnail, ThumbnailCache, ThumbnailEvent};
pub use undo::{Batch, DispositionRecord, UndoReport, UndoStack};

#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("Failed to create thread pool: {0}")]
    ThreadPoolCreation(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Folder does not exist or is not a directory: {0}")]
    FolderNotFound(PathBuf),

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Failed to back up {path}: {source}")]
    Backup {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to send {path} to the trash: {message}")]
    Trash { path: PathBuf, message: String },

    #[error("Failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to restore {path}: {reason}")]
    Restore { path: PathBuf, reason: String },

    #[error("Invalid preferences file: {0}")]
    Preferences(#[from] serde_json::Error),

    #[error("Lock acquisition failed")]
    LockAcquisition,
}

pub type Result<T> = std::result::Result<T, TriageError>;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"];
pub const MIN_THREAD_COUNT: usize = 4;
pub const KEPT_DIR_NAME: &str = "kept";

#[derive(Parser, Clone, Debug)]
#[command(name = "image-triage")]
#[command(about = "Triage a folder of images: discard or keep each one with a single key")]
pub struct Args {
    #[arg(short, long, help = "Folder to triage (defaults to the last used folder)")]
    pub directory: Option<PathBuf>,

    #[arg(short, long, default_value = "256")]
    pub thumbnail_size: u32,

    #[arg(long, default_value = "2")]
    pub rows: usize,

    #[arg(long, default_value = "2")]
    pub cols: usize,

    #[arg(short, long, value_enum, help = "Start in this mode instead of the last used one")]
    pub mode: Option<DispositionKind>,

    #[arg(long, help = "Where discarded images are staged for undo")]
    pub backup_dir: Option<PathBuf>,

    #[arg(long, help = "Move discarded images here instead of the system trash")]
    pub trash_dir: Option<PathBuf>,

    #[arg(long, help = "Preferences file (last folder, last mode)")]
    pub preferences_file: Option<PathBuf>,

    #[arg(long, help = "Enable debug output")]
    pub debug: bool,
}

impl Args {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            rows: self.rows.max(1),
            cols: self.cols.max(1),
            thumbnail_size: self.thumbnail_size.max(1),
            backup_dir: self
                .backup_dir
                .clone()
                .unwrap_or_else(BackupStore::default_dir),
            workers: num_cpus::get().max(MIN_THREAD_COUNT),
        }
    }

    pub fn trash_can(&self) -> Box<dyn TrashCan> {
        match &self.trash_dir {
            Some(dir) => Box::new(FolderTrash::new(dir.clone())),
            None => Box::new(SystemTrash),
        }
    }

    pub fn preference_store(&self) -> PreferenceStore {
        match &self.preferences_file {
            Some(path) => PreferenceStore::new(path.clone()),
            None => PreferenceStore::new(PreferenceStore::default_path()),
        }
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext_str| IMAGE_EXTENSIONS.iter().any(|&valid_ext| valid_ext.eq_ignore_ascii_case(ext_str)))
        .unwrap_or(false)
}
