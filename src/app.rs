use eframe::egui;
use log::warn;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::preferences::PreferenceStore;
use crate::queue::{Slot, SlotCoord, SlotView};
use crate::session::{ActionOutcome, TriageAction, TriageSession};
use crate::thumbnail::Thumbnail;
use crate::{Args, Result};

const SLOT_SPACING: f32 = 16.0;
const SLOT_ROUNDING: f32 = 12.0;
const REPAINT_INTERVAL: Duration = Duration::from_millis(50);

pub const DEFAULT_BINDINGS: &[(egui::Key, TriageAction)] = &[
    (egui::Key::H, TriageAction::TriageTopLeft),
    (egui::Key::G, TriageAction::TriageTopRight),
    (egui::Key::K, TriageAction::TriageBottomLeft),
    (egui::Key::L, TriageAction::TriageBottomRight),
    (egui::Key::M, TriageAction::TriageAll),
    (egui::Key::U, TriageAction::Undo),
    (egui::Key::T, TriageAction::ToggleMode),
];

pub fn action_for_key(key: egui::Key, modifiers: egui::Modifiers) -> Option<TriageAction> {
    if modifiers.command && key == egui::Key::Z {
        return Some(TriageAction::Undo);
    }
    if modifiers.command || modifiers.alt {
        return None;
    }
    DEFAULT_BINDINGS
        .iter()
        .find(|(bound, _)| *bound == key)
        .map(|(_, action)| *action)
}

/// Drops entries for images that no longer sit in any of `slots`.
pub fn retain_shown<T>(entries: &mut HashMap<PathBuf, T>, slots: &[Slot]) {
    let shown: HashSet<&Path> = slots.iter().filter_map(|slot| slot.path.as_deref()).collect();
    entries.retain(|path, _| shown.contains(path.as_path()));
}

pub struct TriageApp {
    pub session: TriageSession,
    pub preferences: PreferenceStore,
    pub thumbnail_size: u32,
    pub folder_input: String,
    pub status: Option<String>,
    textures: HashMap<PathBuf, egui::TextureHandle>,
}

impl TriageApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, args: Args) -> Result<Self> {
        let mut session = TriageSession::new(args.session_config(), args.trash_can())?;
        let preferences = args.preference_store();
        session.set_mode(args.mode.unwrap_or_else(|| preferences.read_mode()));

        let mut app = Self {
            session,
            preferences,
            thumbnail_size: args.thumbnail_size,
            folder_input: String::new(),
            status: None,
            textures: HashMap::new(),
        };

        if let Some(folder) = args.directory.or_else(|| app.preferences.read_last_folder()) {
            app.open_folder(&folder);
        }

        Ok(app)
    }

    pub fn open_folder(&mut self, folder: &Path) {
        self.folder_input = folder.to_string_lossy().into_owned();
        match self.session.load(folder) {
            Ok(()) => {
                self.textures.clear();
                self.status = None;
                if let Err(e) = self.preferences.write_last_folder(folder) {
                    warn!("Could not remember folder: {}", e);
                }
            }
            Err(e) => {
                warn!("{}", e);
                self.status = Some(e.to_string());
            }
        }
    }

    fn handle_outcome(&mut self, ctx: &egui::Context, outcome: ActionOutcome) {
        if outcome.is_noop() {
            self.status = Some("Nothing to do".to_owned());
            ctx.send_viewport_cmd(egui::ViewportCommand::RequestUserAttention(
                egui::UserAttentionType::Informational,
            ));
            return;
        }

        self.status = match &outcome {
            ActionOutcome::Disposed(report) => report.failures.first().map(|e| e.to_string()),
            ActionOutcome::Undone(report) => report.failures.first().map(|e| e.to_string()),
            ActionOutcome::ModeChanged(mode) => {
                if let Err(e) = self.preferences.write_mode(*mode) {
                    warn!("Could not remember mode: {}", e);
                }
                Some(format!("Mode: {}", mode.label()))
            }
        };
    }

    fn collect_actions(ctx: &egui::Context) -> Vec<TriageAction> {
        if ctx.wants_keyboard_input() {
            return Vec::new();
        }
        ctx.input(|i| {
            i.events
                .iter()
                .filter_map(|event| match event {
                    egui::Event::Key {
                        key,
                        pressed: true,
                        repeat: false,
                        modifiers,
                        ..
                    } => action_for_key(*key, *modifiers),
                    _ => None,
                })
                .collect()
        })
    }

    fn prune_textures(&mut self) {
        retain_shown(&mut self.textures, self.session.queue().slots());
    }

    fn texture_for(
        &mut self,
        ctx: &egui::Context,
        path: &Path,
        thumbnail: &Arc<Thumbnail>,
    ) -> egui::TextureHandle {
        self.textures
            .entry(path.to_path_buf())
            .or_insert_with(|| {
                let size = thumbnail.size() as usize;
                let color_image =
                    egui::ColorImage::from_rgba_unmultiplied([size, size], thumbnail.as_rgba());
                ctx.load_texture(
                    format!("thumbnail_{}", path.display()),
                    color_image,
                    egui::TextureOptions::default(),
                )
            })
            .clone()
    }

    fn show_slot(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, coord: SlotCoord) {
        let size = self.thumbnail_size as f32;
        let (rect, response) = ui.allocate_exact_size(egui::Vec2::splat(size), egui::Sense::hover());
        ui.painter().rect_filled(
            rect,
            egui::Rounding::same(SLOT_ROUNDING),
            egui::Color32::from_rgb(0x13, 0x17, 0x22),
        );

        let Some(slot) = self.session.queue().slot(coord).cloned() else {
            return;
        };
        let caption = match (&slot.path, &slot.view) {
            (Some(path), SlotView::Ready(thumbnail)) => {
                let texture = self.texture_for(ctx, path, thumbnail);
                ui.painter().image(
                    texture.id(),
                    rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
                None
            }
            (Some(_), SlotView::Pending) => Some("Loading..."),
            (Some(_), _) => Some("Cannot display"),
            (None, _) => Some(":-)"),
        };

        if let Some(caption) = caption {
            ui.painter().text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                caption,
                egui::FontId::proportional(24.0),
                egui::Color32::from_gray(0x7a),
            );
        }
        if let Some(path) = &slot.path {
            response.on_hover_text(path.file_name().unwrap_or_default().to_string_lossy().into_owned());
        }
    }
}

impl eframe::App for TriageApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.session.pump_thumbnails();

        let actions = Self::collect_actions(ctx);
        if !actions.is_empty() {
            for action in actions {
                let outcome = self.session.apply(action);
                self.handle_outcome(ctx, outcome);
            }
            self.prune_textures();
        }

        egui::TopBottomPanel::top("folder_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Folder:");
                let input = ui.text_edit_singleline(&mut self.folder_input);
                let submitted = input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.button("Open").clicked() || submitted {
                    let folder = PathBuf::from(self.folder_input.trim());
                    self.open_folder(&folder);
                }
                ui.separator();
                ui.label(format!("Mode: {}", self.session.mode().label()));
            });
            ui.label(self.session.stats().to_string());
            if let Some(status) = &self.status {
                ui.colored_label(egui::Color32::from_rgb(0xe0, 0xa0, 0x40), status);
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let coords = self.session.queue().coords();
            let cols = self.session.queue().cols();
            egui::Grid::new("slots")
                .spacing(egui::Vec2::splat(SLOT_SPACING))
                .show(ui, |ui| {
                    for coord in coords {
                        self.show_slot(ui, ctx, coord);
                        if coord.col + 1 == cols {
                            ui.end_row();
                        }
                    }
                });
        });

        if self.session.has_pending_thumbnails() {
            ctx.request_repaint_after(REPAINT_INTERVAL);
        }
    }
}
