use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::disposition::DispositionKind;
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub last_folder: Option<PathBuf>,
    pub mode: DispositionKind,
}

impl Preferences {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Key-value store behind the last folder and last mode. A missing or
/// unreadable file reads as defaults.
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("image-triage")
            .join("preferences.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Preferences {
        if !self.path.exists() {
            return Preferences::default();
        }
        Preferences::load(&self.path).unwrap_or_else(|e| {
            warn!("Ignoring preferences at {:?}: {}", self.path, e);
            Preferences::default()
        })
    }

    fn update(&self, change: impl FnOnce(&mut Preferences)) -> Result<()> {
        let mut prefs = self.read();
        change(&mut prefs);
        prefs.save(&self.path)?;
        debug!("Saved preferences to {:?}", self.path);
        Ok(())
    }

    pub fn read_last_folder(&self) -> Option<PathBuf> {
        self.read().last_folder
    }

    pub fn write_last_folder(&self, folder: &Path) -> Result<()> {
        self.update(|prefs| prefs.last_folder = Some(folder.to_path_buf()))
    }

    pub fn read_mode(&self) -> DispositionKind {
        self.read().mode
    }

    pub fn write_mode(&self, mode: DispositionKind) -> Result<()> {
        self.update(|prefs| prefs.mode = mode)
    }
}
