use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::fileops;
use crate::queue::SlotCoord;
use crate::session::TriageSession;
use crate::undo::{Batch, DispositionRecord};
use crate::{Result, TriageError};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DispositionKind {
    #[default]
    Discard,
    Keep,
}

impl DispositionKind {
    pub fn toggled(self) -> Self {
        match self {
            DispositionKind::Discard => DispositionKind::Keep,
            DispositionKind::Keep => DispositionKind::Discard,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DispositionKind::Discard => "Discard",
            DispositionKind::Keep => "Keep",
        }
    }
}

#[derive(Debug, Default)]
pub struct DisposeReport {
    /// Records pushed onto the undo stack by this call.
    pub recorded: usize,
    /// Slots that were refilled from the backlog.
    pub refilled: Vec<SlotCoord>,
    /// Set once if any requested slot was empty, or nothing was requested.
    pub nothing_to_do: bool,
    /// Per-file failures that were absorbed rather than aborting the call.
    pub failures: Vec<TriageError>,
}

impl TriageSession {
    /// Discards or keeps the images in `coords` as a single undoable batch,
    /// then refills the vacated slots.
    pub fn dispose(&mut self, coords: &[SlotCoord], kind: DispositionKind) -> DisposeReport {
        let mut report = DisposeReport {
            nothing_to_do: coords.is_empty(),
            ..DisposeReport::default()
        };
        let mut batch = Batch::default();
        let mut visited = HashSet::new();

        for &coord in coords.iter().filter(|&&coord| visited.insert(coord)) {
            let Some(original) = self.queue.slot_path(coord).map(Path::to_path_buf) else {
                debug!("Slot {:?} is empty", coord);
                report.nothing_to_do = true;
                continue;
            };

            match kind {
                DispositionKind::Discard => {
                    // The slot moves on whether or not the trash accepted the file.
                    if let Some(record) = self.discard_one(coord, &original, &mut report) {
                        batch.push(record);
                    }
                    report.refilled.push(coord);
                }
                DispositionKind::Keep => match self.keep_one(&original) {
                    Ok(destination) => {
                        batch.push(DispositionRecord {
                            slot: coord,
                            original,
                            stored: Some(destination),
                            kind,
                        });
                        report.refilled.push(coord);
                    }
                    Err(e) => {
                        warn!("{}", e);
                        report.failures.push(e);
                    }
                },
            }
        }

        for &coord in &report.refilled {
            self.queue.fill_slot(coord, &self.cache);
        }

        report.recorded = batch.len();
        if !batch.is_empty() {
            self.undo_stack.push(batch);
        }

        info!(
            "{} of {} slot(s): {} recorded, {} failed. {}",
            kind.label(),
            coords.len(),
            report.recorded,
            report.failures.len(),
            self.stats()
        );
        report
    }

    /// The bulk shortcut: every occupied slot, one batch.
    pub fn dispose_all(&mut self, kind: DispositionKind) -> DisposeReport {
        let coords = self.queue.occupied_coords();
        self.dispose(&coords, kind)
    }

    fn discard_one(
        &mut self,
        coord: SlotCoord,
        original: &Path,
        report: &mut DisposeReport,
    ) -> Option<DispositionRecord> {
        let backup = match self.backup.stage(original) {
            Ok(backup) => Some(backup),
            Err(e) => {
                warn!("{}; discarding without a backup", e);
                report.failures.push(e);
                None
            }
        };

        if let Err(e) = self.trash.discard(original) {
            warn!("{}", e);
            if let Some(backup) = &backup {
                self.backup.release(backup);
            }
            report.failures.push(e);
            return None;
        }

        self.counters.discarded += 1;
        Some(DispositionRecord {
            slot: coord,
            original: original.to_path_buf(),
            stored: backup,
            kind: DispositionKind::Discard,
        })
    }

    fn keep_one(&mut self, original: &Path) -> Result<PathBuf> {
        let kept_dir = self
            .kept_dir()
            .ok_or_else(|| TriageError::FolderNotFound(PathBuf::new()))?;
        let file_name = original.file_name().ok_or_else(|| TriageError::Move {
            from: original.to_path_buf(),
            to: kept_dir.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
        })?;

        let destination = fileops::free_name_in(&kept_dir, file_name);
        fileops::move_file(original, &destination)?;
        self.counters.kept += 1;
        info!("Kept {:?} as {:?}", original, destination);
        Ok(destination)
    }
}
