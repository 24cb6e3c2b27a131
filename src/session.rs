use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backup::BackupStore;
use crate::disposition::{DisposeReport, DispositionKind};
use crate::fileops::TrashCan;
use crate::queue::{SlotCoord, TriageQueue};
use crate::stats::SessionStats;
use crate::thumbnail::ThumbnailCache;
use crate::undo::{UndoReport, UndoStack};
use crate::{Result, KEPT_DIR_NAME};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub rows: usize,
    pub cols: usize,
    pub thumbnail_size: u32,
    pub backup_dir: PathBuf,
    pub workers: usize,
}

/// Logical commands, independent of whichever keys drive them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriageAction {
    TriageTopLeft,
    TriageTopRight,
    TriageBottomLeft,
    TriageBottomRight,
    TriageAll,
    Undo,
    ToggleMode,
}

#[derive(Debug)]
pub enum ActionOutcome {
    Disposed(DisposeReport),
    Undone(UndoReport),
    ModeChanged(DispositionKind),
}

impl ActionOutcome {
    /// Whether the user should get the "nothing happened" cue.
    pub fn is_noop(&self) -> bool {
        match self {
            ActionOutcome::Disposed(report) => report.nothing_to_do,
            ActionOutcome::Undone(report) => report.nothing_to_undo,
            ActionOutcome::ModeChanged(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub discarded: usize,
    pub kept: usize,
}

/// Everything one triage run owns. The interactive thread drives it; the
/// only work leaving that thread is thumbnail decoding inside the cache.
pub struct TriageSession {
    pub(crate) queue: TriageQueue,
    pub(crate) cache: ThumbnailCache,
    pub(crate) backup: BackupStore,
    pub(crate) undo_stack: UndoStack,
    pub(crate) trash: Box<dyn TrashCan>,
    pub(crate) counters: Counters,
    mode: DispositionKind,
}

impl TriageSession {
    pub fn new(config: SessionConfig, trash: Box<dyn TrashCan>) -> Result<Self> {
        debug!("Starting session with {:?}", config);
        Ok(Self {
            queue: TriageQueue::new(config.rows, config.cols),
            cache: ThumbnailCache::new(config.thumbnail_size, config.workers)?,
            backup: BackupStore::open(config.backup_dir)?,
            undo_stack: UndoStack::default(),
            trash,
            counters: Counters::default(),
            mode: DispositionKind::default(),
        })
    }

    /// Loads `folder` and deals the first images into the slots. Counters and
    /// undo history start over; the thumbnail memo survives.
    pub fn load(&mut self, folder: &Path) -> Result<()> {
        self.queue.load(folder)?;
        self.undo_stack.clear();
        self.counters = Counters::default();
        self.queue.fill_all(&self.cache);
        info!("Session loaded: {}", self.stats());
        Ok(())
    }

    pub fn apply(&mut self, action: TriageAction) -> ActionOutcome {
        let mode = self.mode;
        match action {
            TriageAction::TriageTopLeft => self.dispose_corner(0, 0, mode),
            TriageAction::TriageTopRight => self.dispose_corner(0, 1, mode),
            TriageAction::TriageBottomLeft => self.dispose_corner(1, 0, mode),
            TriageAction::TriageBottomRight => self.dispose_corner(1, 1, mode),
            TriageAction::TriageAll => ActionOutcome::Disposed(self.dispose_all(mode)),
            TriageAction::Undo => ActionOutcome::Undone(self.undo_last()),
            TriageAction::ToggleMode => ActionOutcome::ModeChanged(self.toggle_mode()),
        }
    }

    /// Corner actions address the outermost slots, whatever the grid size.
    fn dispose_corner(&mut self, bottom: usize, right: usize, kind: DispositionKind) -> ActionOutcome {
        let row = bottom * self.queue.rows().saturating_sub(1);
        let col = right * self.queue.cols().saturating_sub(1);
        ActionOutcome::Disposed(self.dispose(&[SlotCoord::new(row, col)], kind))
    }

    pub fn mode(&self) -> DispositionKind {
        self.mode
    }

    pub fn set_mode(&mut self, mode: DispositionKind) {
        self.mode = mode;
    }

    pub fn toggle_mode(&mut self) -> DispositionKind {
        self.mode = self.mode.toggled();
        info!("Mode is now {:?}", self.mode);
        self.mode
    }

    /// Applies every thumbnail delivered so far. Returns how many events
    /// reached a slot.
    pub fn pump_thumbnails(&mut self) -> usize {
        self.cache
            .drain()
            .iter()
            .filter(|event| self.queue.apply_thumbnail(event) > 0)
            .count()
    }

    /// Blocks until no slot is waiting on a decode or `timeout` passes
    /// without a delivery.
    pub fn wait_for_thumbnails(&mut self, timeout: Duration) -> bool {
        loop {
            self.pump_thumbnails();
            if !self.has_pending_thumbnails() {
                return true;
            }
            match self.cache.recv_timeout(timeout) {
                Some(event) => {
                    self.queue.apply_thumbnail(&event);
                }
                None => return false,
            }
        }
    }

    pub fn has_pending_thumbnails(&self) -> bool {
        self.queue
            .slots()
            .iter()
            .any(|slot| matches!(slot.view, crate::queue::SlotView::Pending))
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats::compute(&self.queue, &self.counters)
    }

    pub fn queue(&self) -> &TriageQueue {
        &self.queue
    }

    pub fn cache(&self) -> &ThumbnailCache {
        &self.cache
    }

    pub fn backup(&self) -> &BackupStore {
        &self.backup
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo_stack
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn kept_dir(&self) -> Option<PathBuf> {
        self.queue.folder().map(|folder| folder.join(KEPT_DIR_NAME))
    }
}
