//! Asynchronous, memoizing thumbnail cache.
//!
//! Decodes run on a rayon pool and report back through an mpsc channel that
//! the interactive thread drains. Every event carries the source path so the
//! consumer can drop deliveries for slots that have since moved on.

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageDecoder, ImageReader, RgbaImage};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{Result, TriageError};

/// A decoded image centered on a transparent `size × size` canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub pixels: RgbaImage,
}

impl Thumbnail {
    pub fn size(&self) -> u32 {
        self.pixels.width()
    }

    pub fn as_rgba(&self) -> &[u8] {
        self.pixels.as_raw()
    }
}

#[derive(Debug, Clone)]
pub enum ThumbnailEvent {
    Ready(PathBuf, Arc<Thumbnail>),
    Failed(PathBuf),
}

impl ThumbnailEvent {
    pub fn path(&self) -> &Path {
        match self {
            ThumbnailEvent::Ready(path, _) | ThumbnailEvent::Failed(path) => path,
        }
    }
}

enum Reservation {
    Ready(Arc<Thumbnail>),
    Pending,
    Reserved,
}

/// Memo table shared with the workers. Callers only ever see
/// `reserve`/`fulfil`/`get`, never the maps themselves.
#[derive(Default)]
struct ThumbnailTable {
    inner: Mutex<TableInner>,
}

#[derive(Default)]
struct TableInner {
    entries: HashMap<PathBuf, Arc<Thumbnail>>,
    pending: HashSet<PathBuf>,
}

impl ThumbnailTable {
    fn reserve(&self, path: &Path) -> Result<Reservation> {
        let mut inner = self.inner.lock().map_err(|_| TriageError::LockAcquisition)?;
        if let Some(thumbnail) = inner.entries.get(path) {
            return Ok(Reservation::Ready(Arc::clone(thumbnail)));
        }
        if inner.pending.contains(path) {
            return Ok(Reservation::Pending);
        }
        inner.pending.insert(path.to_path_buf());
        Ok(Reservation::Reserved)
    }

    fn fulfil(&self, path: &Path, thumbnail: Option<Arc<Thumbnail>>) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| TriageError::LockAcquisition)?;
        inner.pending.remove(path);
        if let Some(thumbnail) = thumbnail {
            inner.entries.insert(path.to_path_buf(), thumbnail);
        }
        Ok(())
    }

    fn get(&self, path: &Path) -> Option<Arc<Thumbnail>> {
        self.inner.lock().ok()?.entries.get(path).cloned()
    }

    fn is_pending(&self, path: &Path) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.pending.contains(path))
            .unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }
}

pub struct ThumbnailCache {
    table: Arc<ThumbnailTable>,
    size: u32,
    thread_pool: rayon::ThreadPool,
    sender: Sender<ThumbnailEvent>,
    receiver: Receiver<ThumbnailEvent>,
}

impl ThumbnailCache {
    pub fn new(size: u32, workers: usize) -> Result<Self> {
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|index| format!("thumbnail-{}", index))
            .build()?;
        let (sender, receiver) = mpsc::channel();

        Ok(Self {
            table: Arc::new(ThumbnailTable::default()),
            size,
            thread_pool,
            sender,
            receiver,
        })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Asks for the thumbnail of `path`. A warm entry is delivered on this
    /// call; a cold one is decoded on the pool unless a decode for the same
    /// path is already running, in which case that task's event serves both.
    pub fn request(&self, path: &Path) -> Result<()> {
        match self.table.reserve(path)? {
            Reservation::Ready(thumbnail) => {
                let _ = self
                    .sender
                    .send(ThumbnailEvent::Ready(path.to_path_buf(), thumbnail));
            }
            Reservation::Pending => {
                debug!("Decode already in flight for {:?}", path);
            }
            Reservation::Reserved => {
                let table = Arc::clone(&self.table);
                let sender = self.sender.clone();
                let size = self.size;
                let path = path.to_path_buf();

                self.thread_pool.spawn(move || {
                    let event = match render_thumbnail(&path, size) {
                        Ok(thumbnail) => {
                            let thumbnail = Arc::new(thumbnail);
                            if let Err(e) = table.fulfil(&path, Some(Arc::clone(&thumbnail))) {
                                warn!("Could not cache thumbnail for {:?}: {}", path, e);
                            }
                            ThumbnailEvent::Ready(path, thumbnail)
                        }
                        Err(e) => {
                            warn!("{}", e);
                            if let Err(e) = table.fulfil(&path, None) {
                                warn!("Could not clear pending decode for {:?}: {}", path, e);
                            }
                            ThumbnailEvent::Failed(path)
                        }
                    };
                    let _ = sender.send(event);
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, path: &Path) -> Option<Arc<Thumbnail>> {
        self.table.get(path)
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.table.is_pending(path)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Everything delivered so far, without blocking.
    pub fn drain(&self) -> Vec<ThumbnailEvent> {
        self.receiver.try_iter().collect()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ThumbnailEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Decodes `path`, honours its EXIF orientation and fits it onto a
/// transparent square canvas of `size` pixels.
pub fn render_thumbnail(path: &Path, size: u32) -> Result<Thumbnail> {
    let decode_error = |source| TriageError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let mut decoder = reader.into_decoder().map_err(decode_error)?;
    let orientation = decoder.orientation().map_err(decode_error)?;
    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_error)?;
    img.apply_orientation(orientation);

    Ok(Thumbnail {
        pixels: fit_to_canvas(&img, size),
    })
}

pub fn fit_to_canvas(img: &DynamicImage, size: u32) -> RgbaImage {
    let scaled = img.resize(size, size, FilterType::Triangle).to_rgba8();

    let mut canvas = RgbaImage::new(size, size);
    let x = (size - scaled.width()) / 2;
    let y = (size - scaled.height()) / 2;
    imageops::overlay(&mut canvas, &scaled, i64::from(x), i64::from(y));
    canvas
}
