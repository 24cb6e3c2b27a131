use log::{debug, info, warn};
use std::fs;
use std::path::PathBuf;

use crate::disposition::DispositionKind;
use crate::fileops::{self, RESTORE_SUFFIX};
use crate::queue::SlotCoord;
use crate::session::TriageSession;
use crate::{Result, TriageError};

/// One file touched by one keystroke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispositionRecord {
    pub slot: SlotCoord,
    pub original: PathBuf,
    /// Backup copy for a discard (absent if the backup failed), destination
    /// inside `kept/` for a keep.
    pub stored: Option<PathBuf>,
    pub kind: DispositionKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    records: Vec<DispositionRecord>,
}

impl Batch {
    pub fn push(&mut self, record: DispositionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[DispositionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct UndoStack {
    batches: Vec<Batch>,
}

impl UndoStack {
    pub fn push(&mut self, batch: Batch) {
        self.batches.push(batch);
    }

    pub fn pop(&mut self) -> Option<Batch> {
        self.batches.pop()
    }

    pub fn peek(&self) -> Option<&Batch> {
        self.batches.last()
    }

    pub fn clear(&mut self) {
        self.batches.clear();
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct UndoReport {
    pub nothing_to_undo: bool,
    /// `(slot, path on disk after restoring)` for every record that came back.
    pub restored: Vec<(SlotCoord, PathBuf)>,
    pub failures: Vec<TriageError>,
}

/// Puts the file behind `record` back next to where it came from, renaming
/// to `stem_restored_N.ext` if something else now sits there.
pub fn restore_file(record: &DispositionRecord) -> Result<PathBuf> {
    let restore_error = |reason: String| TriageError::Restore {
        path: record.original.clone(),
        reason,
    };

    let stored = record
        .stored
        .as_deref()
        .ok_or_else(|| restore_error("no backup was taken".to_owned()))?;
    if !stored.exists() {
        return Err(restore_error(format!("{} no longer exists", stored.display())));
    }

    let target = fileops::collision_free_path(&record.original, RESTORE_SUFFIX);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| restore_error(e.to_string()))?;
    }

    match record.kind {
        DispositionKind::Discard => {
            fs::copy(stored, &target).map_err(|e| restore_error(e.to_string()))?;
        }
        DispositionKind::Keep => {
            fileops::move_file(stored, &target).map_err(|e| restore_error(e.to_string()))?;
        }
    }
    debug!("Restored {:?} from {:?}", target, stored);
    Ok(target)
}

impl TriageSession {
    /// Reverses the most recent batch. Records that cannot be restored are
    /// skipped; the rest of the batch still comes back.
    pub fn undo_last(&mut self) -> UndoReport {
        let Some(batch) = self.undo_stack.pop() else {
            debug!("Nothing to undo");
            return UndoReport {
                nothing_to_undo: true,
                ..UndoReport::default()
            };
        };

        let mut report = UndoReport::default();
        // Newest first, so displaced images return to the backlog in order.
        for record in batch.records().iter().rev() {
            match self.undo_record(record) {
                Ok(path) => report.restored.push((record.slot, path)),
                Err(e) => {
                    warn!("{}", e);
                    report.failures.push(e);
                }
            }
        }

        info!(
            "Undid {} of {} record(s). {}",
            report.restored.len(),
            batch.len(),
            self.stats()
        );
        report
    }

    fn undo_record(&mut self, record: &DispositionRecord) -> Result<PathBuf> {
        let restored = restore_file(record)?;

        match record.kind {
            DispositionKind::Discard => {
                if let Some(backup) = &record.stored {
                    self.backup.release(backup);
                }
                self.counters.discarded = self.counters.discarded.saturating_sub(1);
            }
            DispositionKind::Keep => {
                self.counters.kept = self.counters.kept.saturating_sub(1);
            }
        }

        self.queue.restore_into(record.slot, restored.clone(), &self.cache);
        Ok(restored)
    }
}
