use crate::dashboard::boundary::{failure_panel, WidgetBoundary};
use crate::dashboard::config::ValidationError;
use crate::dashboard::grid::{CellPlan, GridView, WidgetGrid};
use crate::dashboard::storage::StorageError;
use crate::dashboard::store::{ConfigOrigin, ConfigStore, ResolvedConfig};
use crate::federation::{LoadSession, RemoteModuleLoader};
use eframe::egui;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Height of one grid row in points.
pub const ROW_HEIGHT: f32 = 180.0;
const CELL_GAP: f32 = 8.0;

/// Dashboard-level failure of a user action.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// Message for the user raised while handling input, shown by the shell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    fn info(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            text: text.into(),
        }
    }
}

enum CellAction {
    Focus(String),
    ExitFocus,
    Remove(String),
}

pub type Notify = Arc<dyn Fn() + Send + Sync>;

/// Ties configuration, loading, layout and per-widget fault boundaries together.
pub struct Dashboard {
    store: ConfigStore,
    loader: Arc<RemoteModuleLoader>,
    grid: WidgetGrid,
    origin: ConfigOrigin,
    boundaries: HashMap<String, WidgetBoundary>,
    sessions: Vec<LoadSession>,
    notify: Notify,
    notices: Vec<Notice>,
}

impl Dashboard {
    /// Resolve the configuration and start loading every widget.
    ///
    /// `notify` is called from loader threads whenever a widget settles.
    pub fn new(store: ConfigStore, loader: Arc<RemoteModuleLoader>, notify: Notify) -> Self {
        let ResolvedConfig { config, origin } = store.load_config();
        let mut dashboard = Self {
            store,
            loader,
            grid: WidgetGrid::new(config),
            origin,
            boundaries: HashMap::new(),
            sessions: Vec::new(),
            notify,
            notices: Vec::new(),
        };
        dashboard.start_loading();
        dashboard
    }

    pub fn grid(&self) -> &WidgetGrid {
        &self.grid
    }

    pub fn origin(&self) -> ConfigOrigin {
        self.origin
    }

    pub fn boundary(&self, id: &str) -> Option<&WidgetBoundary> {
        self.boundaries.get(id)
    }

    /// Fresh boundaries for every widget and one load session for all of them.
    pub fn start_loading(&mut self) {
        self.boundaries = self
            .grid
            .widgets()
            .iter()
            .map(|w| (w.id.clone(), WidgetBoundary::new(&w.id)))
            .collect();
        self.sessions.clear();
        if self.grid.widgets().is_empty() {
            return;
        }
        tracing::debug!(widgets = self.grid.widgets().len(), "loading widgets");
        let session = self
            .loader
            .spawn_all(self.grid.widgets(), Arc::clone(&self.notify));
        self.sessions.push(session);
    }

    /// Apply settled loads to their boundaries.
    pub fn poll(&mut self) {
        for session in &mut self.sessions {
            for outcome in session.poll() {
                if let Some(boundary) = self.boundaries.get_mut(&outcome.id) {
                    boundary.resolve(outcome.result);
                }
            }
        }
        let before = self.sessions.len();
        self.sessions.retain(|s| !s.is_settled());
        if self.sessions.len() != before && self.sessions.is_empty() {
            for boundary in self.boundaries.values_mut() {
                boundary.mark_missing();
            }
            tracing::debug!("all widget loads settled");
        }
    }

    /// Block until the current loads settle and apply them.
    pub fn wait_for_loads(&mut self) {
        for session in &mut self.sessions {
            for outcome in session.wait() {
                if let Some(boundary) = self.boundaries.get_mut(&outcome.id) {
                    boundary.resolve(outcome.result);
                }
            }
        }
        self.poll();
    }

    pub fn is_loading(&self) -> bool {
        self.sessions.iter().any(|s| !s.is_settled())
    }

    /// Widgets whose load has not settled yet.
    pub fn pending_loads(&self) -> usize {
        self.sessions.iter().map(|s| s.pending()).sum()
    }

    /// Drop every cached component and load all widgets again.
    pub fn reload_widgets(&mut self) {
        self.loader.clear_cache();
        self.start_loading();
        tracing::info!("reloading widgets");
    }

    /// Forget the persisted configuration and switch to the default document.
    pub fn reset_config(&mut self) {
        let ResolvedConfig { config, origin } = self.store.reset_config();
        self.origin = origin;
        self.apply_config(config);
    }

    /// Replace the configuration with an imported document and persist it.
    ///
    /// Invalid input leaves both the dashboard and storage untouched. A storage
    /// failure is returned after the new configuration is already in use.
    pub fn import_config(&mut self, text: &str) -> Result<(), DashboardError> {
        let config = self.store.import_config(text)?;
        self.apply_config(config);
        self.persist()?;
        Ok(())
    }

    pub fn export_config(&self) -> anyhow::Result<PathBuf> {
        self.store
            .export_config(self.grid.widgets(), self.grid.grid_columns())
    }

    /// Current configuration as pretty JSON, for editing.
    pub fn config_json(&self) -> String {
        self.grid
            .config()
            .to_json_pretty()
            .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    /// Append a raw widget object and start loading it. Returns its id.
    pub fn add_widget(&mut self, raw: &Map<String, Value>) -> Result<String, StorageError> {
        let descriptor = self.grid.add_widget(raw).clone();
        self.boundaries
            .insert(descriptor.id.clone(), WidgetBoundary::new(&descriptor.id));
        let session = self
            .loader
            .spawn_all(std::slice::from_ref(&descriptor), Arc::clone(&self.notify));
        self.sessions.push(session);
        self.persist()?;
        Ok(descriptor.id)
    }

    pub fn remove_widget(&mut self, id: &str) -> Result<bool, StorageError> {
        if self.grid.remove_widget(id).is_none() {
            return Ok(false);
        }
        self.boundaries.remove(id);
        self.loader.cache().remove(id);
        self.persist()?;
        Ok(true)
    }

    pub fn set_grid_columns(&mut self, columns: u32) -> Result<bool, StorageError> {
        if !self.grid.set_grid_columns(columns) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    pub fn focus(&mut self, id: &str) -> bool {
        self.grid.focus(id)
    }

    pub fn exit_focus(&mut self) -> bool {
        self.grid.exit_focus()
    }

    /// Save the in-memory configuration.
    pub fn persist(&self) -> Result<(), StorageError> {
        self.store
            .save_config(self.grid.widgets(), self.grid.grid_columns())
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn apply_config(&mut self, config: crate::dashboard::config::Configuration) {
        self.grid.replace_config(config);
        let cache = self.loader.cache();
        let grid = &self.grid;
        cache.retain(|id| grid.position(id).is_some());
        self.start_loading();
    }

    fn persist_or_notify(&mut self) {
        if let Err(e) = self.persist() {
            tracing::warn!("failed to save configuration: {e}");
            self.notices.push(Notice::error(format!("Configuration not saved: {e}")));
        }
    }

    pub fn ui(&mut self, ui: &mut egui::Ui) {
        self.poll();

        if ui.input(|i| i.key_pressed(egui::Key::Escape)) {
            if self.grid.interaction().drag().is_some() {
                self.grid.interaction_mut().cancel();
            } else {
                self.grid.exit_focus();
            }
        }

        let (columns, rows, cells) = match self.grid.view() {
            GridView::Empty => {
                Self::empty_placeholder(ui);
                return;
            }
            GridView::Cells {
                columns,
                rows,
                cells,
            } => (columns, rows, cells),
        };

        let width = ui.available_width();
        let col_width = width / columns as f32;
        let (rect, _) = ui.allocate_exact_size(
            egui::vec2(width, ROW_HEIGHT * rows as f32),
            egui::Sense::hover(),
        );
        let mut child = ui.child_ui(rect, egui::Layout::top_down(egui::Align::LEFT));

        let pointer = ui.input(|i| i.pointer.interact_pos());
        let mut cell_rects = Vec::with_capacity(cells.len());
        let mut actions = Vec::new();

        for cell in &cells {
            let p = cell.placement;
            let cell_rect = egui::Rect::from_min_size(
                rect.min + egui::vec2(col_width * p.col as f32, ROW_HEIGHT * p.row as f32),
                egui::vec2(col_width * p.col_span as f32, ROW_HEIGHT * p.row_span as f32),
            )
            .shrink(CELL_GAP / 2.0);
            cell_rects.push((cell.index, cell_rect));
            let clip = cell_rect.intersect(child.clip_rect());
            let action = child
                .allocate_ui_at_rect(cell_rect, |cell_ui| {
                    cell_ui.set_clip_rect(clip);
                    cell_ui.set_min_size(cell_rect.size());
                    self.render_cell(cell, cell_ui)
                })
                .inner;
            actions.extend(action);
        }

        self.track_drag(ui, pointer, &cell_rects);

        for action in actions {
            match action {
                CellAction::Focus(id) => {
                    self.grid.focus(&id);
                }
                CellAction::ExitFocus => {
                    self.grid.exit_focus();
                }
                CellAction::Remove(id) => match self.remove_widget(&id) {
                    Ok(_) => self.notices.push(Notice::info(format!("Removed widget {id}"))),
                    Err(e) => self
                        .notices
                        .push(Notice::error(format!("Configuration not saved: {e}"))),
                },
            }
        }
    }

    fn empty_placeholder(ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.add_space(40.0);
            ui.heading("No widgets configured");
            ui.label("Edit the configuration or import a document to add widgets.");
        });
    }

    fn render_cell(&mut self, cell: &CellPlan, ui: &mut egui::Ui) -> Option<CellAction> {
        let Some(descriptor) = self.grid.widgets().get(cell.index).cloned() else {
            failure_panel(ui, &cell.id, "widget is no longer configured");
            return None;
        };
        let focused = self.grid.interaction().focused().is_some();
        let sensors = self.grid.interaction().sensors_enabled();
        let dragged = self.grid.interaction().active_drag() == Some(descriptor.id.as_str());
        let mut action = None;

        let mut frame = egui::Frame::group(ui.style());
        if dragged {
            frame = frame
                .fill(ui.visuals().faint_bg_color)
                .stroke(egui::Stroke::new(1.0, ui.visuals().selection.stroke.color));
        }
        frame.show(ui, |ui| {
            ui.set_min_size(ui.available_size());
            ui.horizontal(|ui| {
                let handle = ui.add(
                    egui::Label::new(egui::RichText::new(descriptor.title()).strong())
                        .sense(if sensors {
                            egui::Sense::drag()
                        } else {
                            egui::Sense::hover()
                        }),
                );
                if sensors && handle.drag_started() {
                    let start = ui
                        .input(|i| i.pointer.press_origin())
                        .or(handle.interact_pointer_pos());
                    if let Some(start) = start {
                        self.grid
                            .interaction_mut()
                            .pointer_down(&descriptor.id, cell.index, start);
                    }
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if focused {
                        if ui.small_button("Exit focus").clicked() {
                            action = Some(CellAction::ExitFocus);
                        }
                    } else {
                        if ui
                            .small_button("x")
                            .on_hover_text("Remove widget")
                            .clicked()
                        {
                            action = Some(CellAction::Remove(descriptor.id.clone()));
                        }
                        if ui.small_button("Focus").clicked() {
                            action = Some(CellAction::Focus(descriptor.id.clone()));
                        }
                    }
                });
            });
            ui.separator();

            let boundary = self
                .boundaries
                .entry(descriptor.id.clone())
                .or_insert_with(|| {
                    let mut boundary = WidgetBoundary::new(&descriptor.id);
                    boundary.mark_missing();
                    boundary
                });
            boundary.show(ui, descriptor.title(), &descriptor.props);
        });

        action
    }

    fn track_drag(
        &mut self,
        ui: &egui::Ui,
        pointer: Option<egui::Pos2>,
        cell_rects: &[(usize, egui::Rect)],
    ) {
        if self.grid.interaction().drag().is_none() {
            return;
        }
        if let Some(pos) = pointer {
            self.grid.interaction_mut().pointer_moved(pos);
        }
        let target = pointer.and_then(|pos| {
            cell_rects
                .iter()
                .find(|(_, rect)| rect.contains(pos))
                .map(|(index, _)| *index)
        });

        if self.grid.interaction().active_drag().is_some() {
            if let Some((_, rect)) = cell_rects.iter().find(|(index, _)| Some(*index) == target) {
                ui.painter().rect_stroke(
                    *rect,
                    4.0,
                    egui::Stroke::new(2.0, ui.visuals().selection.stroke.color),
                );
            }
            ui.ctx().set_cursor_icon(egui::CursorIcon::Grabbing);
        }

        if ui.input(|i| i.pointer.any_released()) {
            if let Some(reorder) = self.grid.finish_drag(target) {
                tracing::debug!(from = reorder.from, to = reorder.to, "widget moved");
                self.persist_or_notify();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::remote::DefaultDocumentSource;
    use crate::dashboard::storage::{KeyValueStore, MemoryStore, STORAGE_KEY};
    use crate::federation::{
        remote_entry_url, ComponentCache, ContainerFetcher, RemoteContainer, RemoteWidget,
        SharedScopeRegistry, StaticContainer,
    };
    use once_cell::sync::Lazy;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    static RENDERS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(Vec::new()));

    struct Recording(&'static str);

    impl RemoteWidget for Recording {
        fn ui(&self, ui: &mut egui::Ui, _props: &Map<String, Value>) {
            RENDERS.lock().unwrap().push(self.0.to_string());
            ui.label(self.0);
        }
    }

    struct Crashing;

    impl RemoteWidget for Crashing {
        fn ui(&self, _ui: &mut egui::Ui, _props: &Map<String, Value>) {
            panic!("widget bug");
        }
    }

    struct TestFetcher {
        fetches: AtomicUsize,
    }

    impl ContainerFetcher for TestFetcher {
        fn fetch(&self, entry_url: &str) -> anyhow::Result<Arc<dyn RemoteContainer>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let component: Arc<dyn RemoteWidget> = match entry_url {
                u if u == remote_entry_url("https://w.example/a") => Arc::new(Recording("a")),
                u if u == remote_entry_url("https://w.example/b") => Arc::new(Recording("b")),
                u if u == remote_entry_url("https://w.example/c") => Arc::new(Recording("c")),
                u if u == remote_entry_url("https://w.example/crash") => Arc::new(Crashing),
                _ => anyhow::bail!("no such plugin"),
            };
            Ok(Arc::new(
                StaticContainer::new().expose_component("./Widget", component),
            ))
        }
    }

    struct NoDefault;

    impl DefaultDocumentSource for NoDefault {
        fn fetch_default(&self) -> anyhow::Result<String> {
            anyhow::bail!("offline")
        }

        fn location(&self) -> String {
            "nowhere".into()
        }
    }

    fn document(ids: &[&str]) -> String {
        let widgets: Vec<Value> = ids
            .iter()
            .map(|id| serde_json::json!({ "id": id, "name": format!("{id} widget"), "url": format!("https://w.example/{id}") }))
            .collect();
        serde_json::json!({ "gridColumns": 3, "widgets": widgets }).to_string()
    }

    struct FixedDefault(String);

    impl DefaultDocumentSource for FixedDefault {
        fn fetch_default(&self) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }

        fn location(&self) -> String {
            "fixed".into()
        }
    }

    fn dashboard(storage: Arc<MemoryStore>) -> (Dashboard, Arc<TestFetcher>) {
        dashboard_with(storage, Arc::new(NoDefault))
    }

    fn dashboard_with(
        storage: Arc<MemoryStore>,
        remote: Arc<dyn DefaultDocumentSource>,
    ) -> (Dashboard, Arc<TestFetcher>) {
        let fetcher = Arc::new(TestFetcher {
            fetches: AtomicUsize::new(0),
        });
        let loader = RemoteModuleLoader::with_cache(fetcher.clone(), Arc::new(ComponentCache::new()))
            .with_scope_provider(|| Arc::new(SharedScopeRegistry::default()));
        let export = std::env::temp_dir();
        let store = ConfigStore::new(storage, remote, export);
        let mut dashboard = Dashboard::new(store, Arc::new(loader), Arc::new(|| {}));
        dashboard.wait_for_loads();
        (dashboard, fetcher)
    }

    fn stored(ids: &[&str]) -> Arc<MemoryStore> {
        let storage = Arc::new(MemoryStore::new());
        storage.set_item(STORAGE_KEY, &document(ids)).unwrap();
        storage
    }

    fn render(dashboard: &mut Dashboard) -> Vec<String> {
        RENDERS.lock().unwrap().clear();
        egui::__run_test_ui(|ui| {
            let rect = egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(600.0, 600.0));
            ui.allocate_ui_at_rect(rect, |ui| dashboard.ui(ui));
        });
        std::mem::take(&mut *RENDERS.lock().unwrap())
    }

    // 600x600 screen, no panel margin: with three columns cell `i` spans
    // x in [200 i + 4, 200 i + 196] and its title sits near the top left.
    const GRAB: egui::Pos2 = egui::pos2(16.0, 18.0);
    const OVER_THIRD: egui::Pos2 = egui::pos2(500.0, 100.0);

    fn frame(ctx: &egui::Context, dashboard: &mut Dashboard, events: Vec<egui::Event>) {
        let input = egui::RawInput {
            screen_rect: Some(egui::Rect::from_min_size(
                egui::Pos2::ZERO,
                egui::vec2(600.0, 600.0),
            )),
            events,
            ..Default::default()
        };
        let _ = ctx.run(input, |ctx| {
            egui::CentralPanel::default()
                .frame(egui::Frame::none())
                .show(ctx, |ui| dashboard.ui(ui));
        });
    }

    fn button(pos: egui::Pos2, pressed: bool) -> egui::Event {
        egui::Event::PointerButton {
            pos,
            button: egui::PointerButton::Primary,
            pressed,
            modifiers: egui::Modifiers::default(),
        }
    }

    fn escape() -> egui::Event {
        egui::Event::Key {
            key: egui::Key::Escape,
            physical_key: None,
            pressed: true,
            repeat: false,
            modifiers: egui::Modifiers::default(),
        }
    }

    /// Press on the first cell's title and drag past the activation distance.
    fn start_drag(ctx: &egui::Context, dashboard: &mut Dashboard) {
        frame(ctx, dashboard, vec![]);
        frame(ctx, dashboard, vec![egui::Event::PointerMoved(GRAB)]);
        frame(ctx, dashboard, vec![button(GRAB, true)]);
        frame(ctx, dashboard, vec![egui::Event::PointerMoved(egui::pos2(120.0, 60.0))]);
        frame(ctx, dashboard, vec![egui::Event::PointerMoved(OVER_THIRD)]);
    }

    fn order(dashboard: &Dashboard) -> Vec<String> {
        dashboard.grid().widgets().iter().map(|w| w.id.clone()).collect()
    }

    fn stored_order(storage: &MemoryStore) -> Vec<String> {
        let text = storage.get_item(STORAGE_KEY).unwrap().unwrap();
        crate::dashboard::config::Configuration::parse(&text)
            .unwrap()
            .widgets
            .into_iter()
            .map(|w| w.id)
            .collect()
    }

    #[test]
    #[serial]
    fn dropping_on_another_cell_reorders_and_saves() {
        let storage = stored(&["a", "b", "c"]);
        let (mut dash, _) = dashboard(storage.clone());
        let ctx = egui::Context::default();
        start_drag(&ctx, &mut dash);
        assert_eq!(dash.grid().interaction().active_drag(), Some("a"));

        frame(&ctx, &mut dash, vec![button(OVER_THIRD, false)]);
        assert!(dash.grid().interaction().sensors_enabled());
        assert_eq!(order(&dash), vec!["b", "c", "a"]);
        assert_eq!(stored_order(&storage), vec!["b", "c", "a"]);
        assert!(dash.take_notices().is_empty());
    }

    #[test]
    #[serial]
    fn escape_cancels_drag_without_saving() {
        let storage = stored(&["a", "b", "c"]);
        let before = storage.get_item(STORAGE_KEY).unwrap();
        let (mut dash, _) = dashboard(storage.clone());
        let ctx = egui::Context::default();
        start_drag(&ctx, &mut dash);
        assert!(dash.grid().interaction().drag().is_some());

        frame(&ctx, &mut dash, vec![escape()]);
        assert!(dash.grid().interaction().drag().is_none());
        frame(&ctx, &mut dash, vec![button(OVER_THIRD, false)]);
        assert_eq!(order(&dash), vec!["a", "b", "c"]);
        assert_eq!(storage.get_item(STORAGE_KEY).unwrap(), before);
    }

    #[test]
    #[serial]
    fn escape_leaves_focus_mode() {
        let (mut dash, _) = dashboard(stored(&["a", "b", "c"]));
        assert!(dash.focus("b"));
        let ctx = egui::Context::default();
        frame(&ctx, &mut dash, vec![]);
        assert_eq!(dash.grid().interaction().focused(), Some("b"));
        frame(&ctx, &mut dash, vec![escape()]);
        assert_eq!(dash.grid().interaction().focused(), None);
        assert_eq!(render(&mut dash), vec!["a", "b", "c"]);
    }

    #[test]
    #[serial]
    fn failed_save_after_drop_raises_error_notice() {
        let storage = Arc::new(MemoryStore::with_quota(10));
        let remote = Arc::new(FixedDefault(document(&["a", "b", "c"])));
        let (mut dash, _) = dashboard_with(storage.clone(), remote);
        assert_eq!(dash.origin(), ConfigOrigin::RemoteDefault);
        let ctx = egui::Context::default();
        start_drag(&ctx, &mut dash);
        frame(&ctx, &mut dash, vec![button(OVER_THIRD, false)]);

        assert_eq!(order(&dash), vec!["b", "c", "a"]);
        assert_eq!(storage.get_item(STORAGE_KEY).unwrap(), None);
        let notices = dash.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Error);
        assert!(notices[0].text.contains("not saved"));
    }

    #[test]
    #[serial]
    fn empty_configuration_renders_placeholder() {
        let (mut dash, _) = dashboard(Arc::new(MemoryStore::new()));
        assert_eq!(dash.origin(), ConfigOrigin::Empty);
        assert!(!dash.is_loading());
        assert!(render(&mut dash).is_empty());
    }

    #[test]
    #[serial]
    fn renders_all_widgets_in_order() {
        let (mut dash, _) = dashboard(stored(&["a", "b", "c"]));
        assert_eq!(dash.origin(), ConfigOrigin::Persisted);
        assert!(!dash.is_loading());
        assert_eq!(dash.pending_loads(), 0);
        assert_eq!(render(&mut dash), vec!["a", "b", "c"]);
    }

    #[test]
    #[serial]
    fn focus_renders_only_focused_widget() {
        let (mut dash, _) = dashboard(stored(&["a", "b", "c"]));
        assert!(dash.focus("b"));
        assert_eq!(render(&mut dash), vec!["b"]);
        assert!(dash.exit_focus());
        assert_eq!(render(&mut dash), vec!["a", "b", "c"]);
    }

    #[test]
    #[serial]
    fn failing_widgets_do_not_affect_siblings() {
        let (mut dash, _) = dashboard(stored(&["a", "missing", "crash", "c"]));
        assert_eq!(render(&mut dash), vec!["a", "c"]);
        assert!(dash.boundary("missing").unwrap().is_failed());
        assert!(dash.boundary("crash").unwrap().is_failed());
        assert_eq!(render(&mut dash), vec!["a", "c"]);
    }

    #[test]
    fn invalid_import_leaves_everything_untouched() {
        let storage = stored(&["a"]);
        let before = storage.get_item(STORAGE_KEY).unwrap();
        let (mut dash, _) = dashboard(storage.clone());
        let err = dash.import_config(r#"{"notWidgets": []}"#).unwrap_err();
        assert!(matches!(err, DashboardError::Validation(_)));
        assert_eq!(storage.get_item(STORAGE_KEY).unwrap(), before);
        assert_eq!(dash.grid().widgets().len(), 1);
    }

    #[test]
    fn import_applies_and_persists() {
        let storage = stored(&["a"]);
        let (mut dash, _) = dashboard(storage.clone());
        dash.import_config(&document(&["b", "c"])).unwrap();
        dash.wait_for_loads();
        let ids: Vec<&str> = dash.grid().widgets().iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        let saved = storage.get_item(STORAGE_KEY).unwrap().unwrap();
        assert!(saved.contains("\"b\"") && !saved.contains("\"a\""));
    }

    #[test]
    fn storage_failure_keeps_in_memory_change() {
        let storage = Arc::new(MemoryStore::with_quota(400));
        storage.set_item(STORAGE_KEY, &document(&["a"])).unwrap();
        let (mut dash, _) = dashboard(storage.clone());
        let err = dash
            .import_config(&document(&["a", "b", "c", "crash", "missing"]))
            .unwrap_err();
        assert!(matches!(err, DashboardError::Storage(StorageError::QuotaExceeded { .. })));
        assert_eq!(dash.grid().widgets().len(), 5);
    }

    #[test]
    fn reload_fetches_again_and_removal_drops_cache_entry() {
        let (mut dash, fetcher) = dashboard(stored(&["a", "b"]));
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 2);
        dash.reload_widgets();
        dash.wait_for_loads();
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 4);

        assert!(dash.remove_widget("a").unwrap());
        assert!(dash.boundary("a").is_none());
        assert!(dash.loader.cache().entry("a").is_none());
        assert!(!dash.remove_widget("a").unwrap());
    }

    #[test]
    fn added_widget_loads_and_persists() {
        let storage = stored(&["a"]);
        let (mut dash, _) = dashboard(storage.clone());
        let raw = serde_json::json!({ "name": "C", "url": "https://w.example/c" });
        let id = dash.add_widget(raw.as_object().unwrap()).unwrap();
        assert!(id.starts_with("c-"));
        dash.wait_for_loads();
        assert!(matches!(
            dash.boundary(&id).unwrap().state(),
            crate::dashboard::boundary::SlotState::Ready(_)
        ));
        assert!(storage.get_item(STORAGE_KEY).unwrap().unwrap().contains(&id));
    }
}
