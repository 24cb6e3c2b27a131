use log::{debug, info, warn};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::thumbnail::{Thumbnail, ThumbnailCache, ThumbnailEvent};
use crate::{is_image_file, Result, TriageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotCoord {
    pub row: usize,
    pub col: usize,
}

impl SlotCoord {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[derive(Debug, Clone, Default)]
pub enum SlotView {
    #[default]
    Empty,
    Pending,
    Ready(Arc<Thumbnail>),
    Placeholder,
}

#[derive(Debug, Clone, Default)]
pub struct Slot {
    pub path: Option<PathBuf>,
    pub view: SlotView,
}

impl Slot {
    pub fn is_occupied(&self) -> bool {
        self.path.is_some()
    }
}

/// Single-pass backlog of a folder's images and the slots showing them.
pub struct TriageQueue {
    rows: usize,
    cols: usize,
    folder: Option<PathBuf>,
    backlog: VecDeque<PathBuf>,
    slots: Vec<Slot>,
    total: usize,
    seen: usize,
}

impl TriageQueue {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            folder: None,
            backlog: VecDeque::new(),
            slots: vec![Slot::default(); rows * cols],
            total: 0,
            seen: 0,
        }
    }

    pub fn list_images(folder: &Path) -> Result<Vec<PathBuf>> {
        if !folder.is_dir() {
            return Err(TriageError::FolderNotFound(folder.to_path_buf()));
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(folder)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_image_file(p))
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Replaces everything with the images of `folder`. Slots are left empty
    /// until `fill_all`.
    pub fn load(&mut self, folder: &Path) -> Result<()> {
        let folder = std::fs::canonicalize(folder).unwrap_or_else(|_| folder.to_path_buf());
        let paths = Self::list_images(&folder)?;
        info!("Loaded {} images from {:?}", paths.len(), folder);

        self.total = paths.len();
        self.seen = 0;
        self.backlog = paths.into();
        self.slots = vec![Slot::default(); self.rows * self.cols];
        self.folder = Some(folder);
        Ok(())
    }

    pub fn fill_slot(&mut self, coord: SlotCoord, cache: &ThumbnailCache) {
        let Some(index) = self.index(coord) else {
            warn!("fill_slot outside the grid: {:?}", coord);
            return;
        };

        let next = self.backlog.pop_front();
        if next.is_some() {
            self.seen += 1;
        }
        self.assign(index, next, cache);
    }

    pub fn fill_all(&mut self, cache: &ThumbnailCache) {
        for coord in self.coords() {
            self.fill_slot(coord, cache);
        }
    }

    /// Puts a restored image straight into `coord`. Whatever was showing
    /// there goes back to the front of the backlog as if never dispatched.
    pub fn restore_into(&mut self, coord: SlotCoord, path: PathBuf, cache: &ThumbnailCache) {
        let Some(index) = self.index(coord) else {
            warn!("restore_into outside the grid: {:?}", coord);
            return;
        };

        if let Some(displaced) = self.slots[index].path.take() {
            debug!("Returning {:?} to the backlog", displaced);
            self.backlog.push_front(displaced);
            self.seen = self.seen.saturating_sub(1);
        }
        self.assign(index, Some(path), cache);
    }

    fn assign(&mut self, index: usize, path: Option<PathBuf>, cache: &ThumbnailCache) {
        let slot = &mut self.slots[index];
        match path {
            Some(path) => {
                slot.view = SlotView::Pending;
                if let Err(e) = cache.request(&path) {
                    warn!("Thumbnail request for {:?} failed: {}", path, e);
                    slot.view = SlotView::Placeholder;
                }
                slot.path = Some(path);
            }
            None => {
                slot.path = None;
                slot.view = SlotView::Empty;
            }
        }
    }

    /// Applies a delivered thumbnail to every slot still showing its path.
    /// Returns how many slots took it.
    pub fn apply_thumbnail(&mut self, event: &ThumbnailEvent) -> usize {
        let mut applied = 0;
        for slot in self
            .slots
            .iter_mut()
            .filter(|slot| slot.path.as_deref() == Some(event.path()))
        {
            slot.view = match event {
                ThumbnailEvent::Ready(_, thumbnail) => SlotView::Ready(Arc::clone(thumbnail)),
                ThumbnailEvent::Failed(_) => SlotView::Placeholder,
            };
            applied += 1;
        }
        if applied == 0 {
            debug!("Dropping stale thumbnail for {:?}", event.path());
        }
        applied
    }

    pub fn index(&self, coord: SlotCoord) -> Option<usize> {
        (coord.row < self.rows && coord.col < self.cols).then(|| coord.row * self.cols + coord.col)
    }

    pub fn coords(&self) -> Vec<SlotCoord> {
        (0..self.rows)
            .flat_map(|row| (0..self.cols).map(move |col| SlotCoord::new(row, col)))
            .collect()
    }

    pub fn occupied_coords(&self) -> Vec<SlotCoord> {
        self.coords()
            .into_iter()
            .filter(|&coord| self.slot(coord).is_some_and(Slot::is_occupied))
            .collect()
    }

    pub fn slot(&self, coord: SlotCoord) -> Option<&Slot> {
        self.index(coord).map(|index| &self.slots[index])
    }

    pub fn slot_path(&self, coord: SlotCoord) -> Option<&Path> {
        self.slot(coord).and_then(|slot| slot.path.as_deref())
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    pub fn backlog(&self) -> &VecDeque<PathBuf> {
        &self.backlog
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn remaining(&self) -> usize {
        self.backlog.len()
    }

    pub fn seen(&self) -> usize {
        self.seen
    }
}
