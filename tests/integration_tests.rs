use image_triage::app::retain_shown;
use image_triage::queue::{SlotCoord, SlotView};
use image_triage::session::ActionOutcome;
use image_triage::{
    DispositionKind, FolderTrash, SessionConfig, ThumbnailCache, ThumbnailEvent, TrashCan,
    TriageAction, TriageError, TriageSession,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use serial_test::serial;

const WAIT: Duration = Duration::from_secs(10);
const TOP_LEFT: SlotCoord = SlotCoord::new(0, 0);
const TOP_RIGHT: SlotCoord = SlotCoord::new(0, 1);
const BOTTOM_LEFT: SlotCoord = SlotCoord::new(1, 0);
const BOTTOM_RIGHT: SlotCoord = SlotCoord::new(1, 1);

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _temp_dir: TempDir,
        folder: PathBuf,
        trash_dir: PathBuf,
        backup_dir: PathBuf,
    }

    impl Fixture {
        /// `count` small PNGs named img_00.png, img_01.png, ... plus some noise.
        fn new(count: usize) -> Self {
            let temp_dir = TempDir::new().unwrap();
            let root = fs::canonicalize(temp_dir.path()).unwrap();
            let folder = root.join("photos");
            fs::create_dir_all(folder.join("nested")).unwrap();

            for i in 0..count {
                write_png(&folder.join(format!("img_{:02}.png", i)), 30 + i as u32, 20, i as u8);
            }
            fs::write(folder.join("notes.txt"), b"not an image").unwrap();
            write_png(&folder.join("nested").join("deep.png"), 10, 10, 0);

            Self {
                _temp_dir: temp_dir,
                folder,
                trash_dir: root.join("trash"),
                backup_dir: root.join("backup"),
            }
        }

        fn image(&self, i: usize) -> PathBuf {
            self.folder.join(format!("img_{:02}.png", i))
        }

        fn config(&self) -> SessionConfig {
            SessionConfig {
                rows: 2,
                cols: 2,
                thumbnail_size: 32,
                backup_dir: self.backup_dir.clone(),
                workers: 2,
            }
        }

        fn session(&self) -> TriageSession {
            let trash = Box::new(FolderTrash::new(self.trash_dir.clone()));
            let mut session = TriageSession::new(self.config(), trash).unwrap();
            session.load(&self.folder).unwrap();
            session
        }
    }

    struct BrokenTrash;

    impl TrashCan for BrokenTrash {
        fn discard(&self, path: &Path) -> image_triage::Result<()> {
            Err(TriageError::Trash {
                path: path.to_path_buf(),
                message: "trash unavailable".to_owned(),
            })
        }
    }

    fn write_png(path: &Path, width: u32, height: u32, shade: u8) {
        image::RgbaImage::from_pixel(width, height, image::Rgba([shade, 100, 200, 255]))
            .save(path)
            .unwrap();
    }

    fn slot_path(session: &TriageSession, coord: SlotCoord) -> Option<PathBuf> {
        session.queue().slot_path(coord).map(Path::to_path_buf)
    }

    fn count_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .map(|entries| entries.filter_map(|e| e.ok()).filter(|e| e.path().is_file()).count())
            .unwrap_or(0)
    }

    #[test]
    #[serial]
    fn test_load_fills_slots_and_leaves_backlog() {
        let fixture = Fixture::new(6);
        let session = fixture.session();
        let stats = session.stats();

        assert_eq!(stats.total, 6);
        assert_eq!(stats.remaining, 2);
        assert_eq!(stats.seen, 4);
        assert_eq!(slot_path(&session, TOP_LEFT), Some(fixture.image(0)));
        assert_eq!(slot_path(&session, TOP_RIGHT), Some(fixture.image(1)));
        assert_eq!(slot_path(&session, BOTTOM_LEFT), Some(fixture.image(2)));
        assert_eq!(slot_path(&session, BOTTOM_RIGHT), Some(fixture.image(3)));
        assert_eq!(
            session.queue().backlog().iter().cloned().collect::<Vec<_>>(),
            vec![fixture.image(4), fixture.image(5)]
        );
    }

    #[test]
    #[serial]
    fn test_load_small_folder_leaves_slots_empty() {
        let fixture = Fixture::new(2);
        let session = fixture.session();

        assert_eq!(session.queue().occupied_coords(), vec![TOP_LEFT, TOP_RIGHT]);
        assert!(matches!(session.queue().slot(BOTTOM_LEFT).unwrap().view, SlotView::Empty));
        assert_eq!(session.stats().total, 2);
        assert_eq!(session.stats().remaining, 0);
        assert_eq!(session.stats().seen, 2);
    }

    #[test]
    #[serial]
    fn test_load_missing_folder_is_an_error() {
        let fixture = Fixture::new(0);
        let trash = Box::new(FolderTrash::new(fixture.trash_dir.clone()));
        let mut session = TriageSession::new(fixture.config(), trash).unwrap();

        let result = session.load(&fixture.folder.join("does-not-exist"));

        assert!(matches!(result, Err(TriageError::FolderNotFound(_))));
    }

    #[test]
    #[serial]
    fn test_thumbnails_reach_their_slots() {
        let fixture = Fixture::new(3);
        fs::write(fixture.folder.join("img_99.png"), b"definitely not a png").unwrap();
        let mut session = fixture.session();

        assert!(session.wait_for_thumbnails(WAIT));

        for coord in [TOP_LEFT, TOP_RIGHT, BOTTOM_LEFT] {
            match &session.queue().slot(coord).unwrap().view {
                SlotView::Ready(thumbnail) => assert_eq!(thumbnail.size(), 32),
                other => panic!("slot {:?} not ready: {:?}", coord, other),
            }
        }
        assert!(matches!(
            session.queue().slot(BOTTOM_RIGHT).unwrap().view,
            SlotView::Placeholder
        ));
        // A failed decode still counts as seen.
        assert_eq!(session.stats().seen, 4);
        assert_eq!(session.cache().len(), 3);
    }

    #[test]
    #[serial]
    fn test_dispose_all_discard_is_one_batch() {
        let fixture = Fixture::new(6);
        let mut session = fixture.session();

        let report = session.dispose_all(DispositionKind::Discard);

        assert_eq!(report.recorded, 4);
        assert!(!report.nothing_to_do);
        assert!(report.failures.is_empty());
        assert_eq!(session.undo_stack().len(), 1);
        assert_eq!(session.undo_stack().peek().unwrap().len(), 4);
        assert_eq!(session.stats().discarded, 4);
        assert_eq!(session.stats().seen, 6);
        assert_eq!(slot_path(&session, TOP_LEFT), Some(fixture.image(4)));
        assert_eq!(slot_path(&session, TOP_RIGHT), Some(fixture.image(5)));
        assert_eq!(slot_path(&session, BOTTOM_LEFT), None);
        assert_eq!(slot_path(&session, BOTTOM_RIGHT), None);
        assert_eq!(count_files(&fixture.trash_dir), 4);
        assert_eq!(session.backup().len(), 4);
        for i in 0..4 {
            assert!(!fixture.image(i).exists());
        }
    }

    #[test]
    #[serial]
    fn test_discard_then_undo_restores_everything() {
        let fixture = Fixture::new(6);
        let mut session = fixture.session();
        let original_bytes = fs::read(fixture.image(0)).unwrap();
        let stats_before = session.stats();
        let backlog_before = session.queue().backlog().clone();

        session.dispose(&[TOP_LEFT], DispositionKind::Discard);
        assert!(!fixture.image(0).exists());
        assert_eq!(session.stats().discarded, 1);

        let report = session.undo_last();

        assert!(!report.nothing_to_undo);
        assert_eq!(report.restored, vec![(TOP_LEFT, fixture.image(0))]);
        assert_eq!(fs::read(fixture.image(0)).unwrap(), original_bytes);
        assert_eq!(slot_path(&session, TOP_LEFT), Some(fixture.image(0)));
        assert_eq!(session.stats(), stats_before);
        assert_eq!(session.queue().backlog(), &backlog_before);
        assert!(session.backup().is_empty());
        assert!(session.undo_stack().is_empty());

        let again = session.undo_last();
        assert!(again.nothing_to_undo);
        assert_eq!(session.stats(), stats_before);
    }

    #[test]
    #[serial]
    fn test_keep_twice_then_undo_twice() {
        let fixture = Fixture::new(6);
        let mut session = fixture.session();
        let kept_dir = fixture.folder.join("kept");
        let stats_before = session.stats();

        session.dispose(&[TOP_LEFT], DispositionKind::Keep);
        assert_eq!(slot_path(&session, TOP_LEFT), Some(fixture.image(4)));
        session.dispose(&[TOP_LEFT], DispositionKind::Keep);
        assert_eq!(slot_path(&session, TOP_LEFT), Some(fixture.image(5)));
        assert_eq!(session.stats().kept, 2);
        assert!(kept_dir.join("img_00.png").exists());
        assert!(kept_dir.join("img_04.png").exists());

        session.undo_last();
        assert!(fixture.image(4).exists());
        assert!(!kept_dir.join("img_04.png").exists());
        assert!(kept_dir.join("img_00.png").exists());
        assert_eq!(slot_path(&session, TOP_LEFT), Some(fixture.image(4)));
        assert_eq!(session.stats().kept, 1);

        session.undo_last();
        assert!(fixture.image(0).exists());
        assert_eq!(count_files(&kept_dir), 0);
        assert_eq!(slot_path(&session, TOP_LEFT), Some(fixture.image(0)));
        assert_eq!(session.stats(), stats_before);
    }

    #[test]
    #[serial]
    fn test_keep_picks_free_name_in_kept_folder() {
        let fixture = Fixture::new(4);
        let kept_dir = fixture.folder.join("kept");
        fs::create_dir_all(&kept_dir).unwrap();
        fs::write(kept_dir.join("img_01.png"), b"earlier keep").unwrap();
        let mut session = fixture.session();

        let report = session.dispose(&[TOP_RIGHT], DispositionKind::Keep);

        assert_eq!(report.recorded, 1);
        assert_eq!(fs::read(kept_dir.join("img_01.png")).unwrap(), b"earlier keep");
        assert!(kept_dir.join("img_01_1.png").exists());
        assert_eq!(
            session.undo_stack().peek().unwrap().records()[0].stored,
            Some(kept_dir.join("img_01_1.png"))
        );
    }

    #[test]
    #[serial]
    fn test_undo_onto_occupied_path_renames() {
        let fixture = Fixture::new(4);
        let mut session = fixture.session();

        session.dispose(&[TOP_LEFT], DispositionKind::Discard);
        fs::write(fixture.image(0), b"a different file").unwrap();

        let report = session.undo_last();
        let restored = fixture.folder.join("img_00_restored_1.png");

        assert_eq!(report.restored, vec![(TOP_LEFT, restored.clone())]);
        assert_eq!(fs::read(fixture.image(0)).unwrap(), b"a different file");
        assert!(restored.exists());
        assert_eq!(slot_path(&session, TOP_LEFT), Some(restored));
    }

    #[test]
    #[serial]
    fn test_undo_skips_records_with_missing_backup() {
        let fixture = Fixture::new(4);
        let mut session = fixture.session();

        session.dispose(&[TOP_LEFT, TOP_RIGHT], DispositionKind::Discard);
        let lost_backup = session.backup().backup_path(&fixture.image(0));
        fs::remove_file(&lost_backup).unwrap();

        let report = session.undo_last();

        assert_eq!(report.restored, vec![(TOP_RIGHT, fixture.image(1))]);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], TriageError::Restore { .. }));
        assert!(!fixture.image(0).exists());
        assert!(fixture.image(1).exists());
        assert_eq!(session.stats().discarded, 1);
        assert_eq!(slot_path(&session, TOP_RIGHT), Some(fixture.image(1)));
    }

    #[test]
    #[serial]
    fn test_empty_slot_signals_once() {
        let fixture = Fixture::new(1);
        let mut session = fixture.session();

        let report = session.dispose(&[TOP_RIGHT, BOTTOM_LEFT], DispositionKind::Discard);

        assert!(report.nothing_to_do);
        assert_eq!(report.recorded, 0);
        assert!(session.undo_stack().is_empty());
        assert_eq!(session.stats().discarded, 0);
        assert_eq!(slot_path(&session, TOP_LEFT), Some(fixture.image(0)));
    }

    #[test]
    #[serial]
    fn test_dispose_all_on_exhausted_folder_signals() {
        let fixture = Fixture::new(0);
        let mut session = fixture.session();

        let report = session.dispose_all(DispositionKind::Keep);

        assert!(report.nothing_to_do);
        assert!(session.undo_stack().is_empty());
    }

    #[test]
    #[serial]
    fn test_failed_trash_is_not_counted() {
        let fixture = Fixture::new(5);
        let mut session = TriageSession::new(fixture.config(), Box::new(BrokenTrash)).unwrap();
        session.load(&fixture.folder).unwrap();

        let report = session.dispose(&[BOTTOM_RIGHT], DispositionKind::Discard);

        assert_eq!(report.recorded, 0);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], TriageError::Trash { .. }));
        assert_eq!(session.stats().discarded, 0);
        assert!(session.undo_stack().is_empty());
        assert!(session.backup().is_empty());
        assert!(fixture.image(3).exists());
        assert_eq!(slot_path(&session, BOTTOM_RIGHT), Some(fixture.image(4)));
    }

    #[test]
    #[serial]
    fn test_failed_keep_leaves_slot_alone() {
        let fixture = Fixture::new(5);
        let mut session = fixture.session();
        fs::remove_file(fixture.image(2)).unwrap();

        let report = session.dispose(&[BOTTOM_LEFT], DispositionKind::Keep);

        assert_eq!(report.recorded, 0);
        assert!(report.refilled.is_empty());
        assert!(matches!(report.failures[0], TriageError::Move { .. }));
        assert_eq!(session.stats().kept, 0);
        assert_eq!(slot_path(&session, BOTTOM_LEFT), Some(fixture.image(2)));
        assert_eq!(session.stats().remaining, 1);
    }

    #[test]
    #[serial]
    fn test_actions_follow_mode() {
        let fixture = Fixture::new(6);
        let mut session = fixture.session();

        let outcome = session.apply(TriageAction::ToggleMode);
        assert!(matches!(outcome, ActionOutcome::ModeChanged(DispositionKind::Keep)));

        let outcome = session.apply(TriageAction::TriageBottomRight);
        assert!(!outcome.is_noop());
        assert!(fixture.folder.join("kept").join("img_03.png").exists());
        assert_eq!(session.stats().kept, 1);

        let outcome = session.apply(TriageAction::Undo);
        assert!(matches!(outcome, ActionOutcome::Undone(_)));
        assert!(fixture.image(3).exists());

        assert!(session.apply(TriageAction::Undo).is_noop());
    }

    #[test]
    #[serial]
    fn test_load_resets_history_and_counters() {
        let fixture = Fixture::new(6);
        let mut session = fixture.session();
        session.dispose_all(DispositionKind::Keep);

        session.load(&fixture.folder).unwrap();

        assert!(session.undo_stack().is_empty());
        assert_eq!(session.stats().total, 2);
        assert_eq!(session.stats().kept, 0);
        assert_eq!(session.stats().seen, 2);
    }

    #[test]
    #[serial]
    fn test_cache_delivers_warm_entries_immediately() {
        let fixture = Fixture::new(1);
        let cache = ThumbnailCache::new(16, 2).unwrap();
        let path = fixture.image(0);

        cache.request(&path).unwrap();
        let first = cache.recv_timeout(WAIT).unwrap();
        assert!(matches!(&first, ThumbnailEvent::Ready(p, _) if p == &path));
        assert!(!cache.is_pending(&path));
        assert_eq!(cache.len(), 1);

        cache.request(&path).unwrap();
        let warm = cache.drain();
        assert_eq!(warm.len(), 1);
        assert_eq!(warm[0].path(), path.as_path());
    }

    #[test]
    #[serial]
    fn test_cache_decodes_once_while_pending() {
        let fixture = Fixture::new(0);
        let cache = ThumbnailCache::new(16, 2).unwrap();
        let path = fixture.folder.join("large.png");
        let large = image::RgbaImage::from_fn(3000, 3000, |x, y| {
            image::Rgba([(x % 251) as u8, (y % 241) as u8, ((x ^ y) % 256) as u8, 255])
        });
        large.save(&path).unwrap();

        for _ in 0..5 {
            cache.request(&path).unwrap();
        }
        assert!(cache.is_pending(&path));

        let first = cache.recv_timeout(WAIT).unwrap();
        assert!(matches!(&first, ThumbnailEvent::Ready(p, _) if p == &path));
        assert!(cache.recv_timeout(Duration::from_millis(500)).is_none());
        assert!(cache.drain().is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    #[serial]
    fn test_cache_reports_failures_without_caching() {
        let fixture = Fixture::new(0);
        let cache = ThumbnailCache::new(16, 2).unwrap();
        let path = fixture.folder.join("broken.png");
        fs::write(&path, b"garbage").unwrap();

        cache.request(&path).unwrap();

        assert!(matches!(cache.recv_timeout(WAIT), Some(ThumbnailEvent::Failed(p)) if p == path));
        assert!(cache.is_empty());
        assert!(!cache.is_pending(&path));
    }

    #[test]
    #[serial]
    fn test_stale_delivery_is_dropped() {
        let fixture = Fixture::new(6);
        let mut session = fixture.session();
        session.dispose(&[TOP_LEFT], DispositionKind::Keep);

        assert!(session.wait_for_thumbnails(WAIT));

        // img_00 may have been delivered after its slot moved on; it must not show.
        match &session.queue().slot(TOP_LEFT).unwrap().view {
            SlotView::Ready(_) => {}
            other => panic!("unexpected view {:?}", other),
        }
        assert_eq!(slot_path(&session, TOP_LEFT), Some(fixture.image(4)));
        assert_eq!(session.pump_thumbnails(), 0);
    }

    #[test]
    #[serial]
    fn test_discard_without_backup_cannot_be_undone() {
        let fixture = Fixture::new(5);
        let mut session = fixture.session();
        fs::remove_dir_all(session.backup().dir()).unwrap();

        let report = session.dispose(&[TOP_LEFT], DispositionKind::Discard);

        assert_eq!(report.recorded, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], TriageError::Backup { .. }));
        assert_eq!(session.stats().discarded, 1);
        assert!(!fixture.image(0).exists());
        assert_eq!(session.undo_stack().peek().unwrap().records()[0].stored, None);
        assert_eq!(slot_path(&session, TOP_LEFT), Some(fixture.image(4)));

        let undo = session.undo_last();

        assert!(!undo.nothing_to_undo);
        assert!(undo.restored.is_empty());
        assert_eq!(undo.failures.len(), 1);
        match &undo.failures[0] {
            TriageError::Restore { path, reason } => {
                assert_eq!(path, &fixture.image(0));
                assert!(reason.contains("no backup was taken"));
            }
            other => panic!("unexpected failure {:?}", other),
        }
        assert_eq!(session.stats().discarded, 1);
        assert_eq!(slot_path(&session, TOP_LEFT), Some(fixture.image(4)));
        assert!(session.undo_stack().is_empty());
    }

    #[test]
    #[serial]
    fn test_undoing_batches_restores_slots_and_backlog_order() {
        let fixture = Fixture::new(7);
        let mut session = fixture.session();
        let slots_before: Vec<_> = [TOP_LEFT, TOP_RIGHT, BOTTOM_LEFT, BOTTOM_RIGHT]
            .iter()
            .map(|coord| slot_path(&session, *coord))
            .collect();
        let stats_before = session.stats();

        let discard = session.dispose_all(DispositionKind::Discard);
        assert_eq!(discard.recorded, 4);
        assert!(session.queue().backlog().is_empty());
        let stats_after_discard = session.stats();

        let keep = session.dispose(&[TOP_LEFT], DispositionKind::Keep);
        assert_eq!(keep.recorded, 1);
        assert_eq!(slot_path(&session, TOP_LEFT), None);
        assert_eq!(session.stats().kept, 1);

        let undo_keep = session.undo_last();
        assert_eq!(undo_keep.restored, vec![(TOP_LEFT, fixture.image(4))]);
        assert_eq!(session.stats(), stats_after_discard);

        let undo_discard = session.undo_last();
        assert!(undo_discard.failures.is_empty());
        assert_eq!(undo_discard.restored.len(), 4);

        let slots_after: Vec<_> = [TOP_LEFT, TOP_RIGHT, BOTTOM_LEFT, BOTTOM_RIGHT]
            .iter()
            .map(|coord| slot_path(&session, *coord))
            .collect();
        assert_eq!(slots_after, slots_before);
        assert_eq!(
            session.queue().backlog().iter().cloned().collect::<Vec<_>>(),
            vec![fixture.image(4), fixture.image(5), fixture.image(6)]
        );
        assert_eq!(session.stats(), stats_before);
        assert!(session.backup().is_empty());
        assert!(session.undo_stack().is_empty());
        for i in 0..7 {
            assert!(fixture.image(i).exists());
        }
    }

    #[test]
    #[serial]
    fn test_textures_follow_the_slots() {
        let fixture = Fixture::new(6);
        let mut session = fixture.session();
        let mut textures: HashMap<PathBuf, u32> =
            (0..4).map(|i| (fixture.image(i), i as u32)).collect();

        session.dispose(&[TOP_LEFT, BOTTOM_RIGHT], DispositionKind::Keep);
        retain_shown(&mut textures, session.queue().slots());

        let mut kept: Vec<_> = textures.keys().cloned().collect();
        kept.sort();
        assert_eq!(kept, vec![fixture.image(1), fixture.image(2)]);
    }
}
