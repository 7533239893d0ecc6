use crate::dashboard::{Dashboard, DashboardError};
use eframe::egui;

/// Raw JSON editor for the whole dashboard configuration.
#[derive(Default)]
pub struct ConfigEditorDialog {
    pub open: bool,
    text: String,
    error: Option<String>,
}

impl ConfigEditorDialog {
    pub fn open(&mut self, dashboard: &Dashboard) {
        self.text = dashboard.config_json();
        self.error = None;
        self.open = true;
    }

    pub fn text_mut(&mut self) -> &mut String {
        &mut self.text
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Import the edited text. Returns whether the dashboard changed.
    ///
    /// Invalid documents keep the dialog open with the error shown inline.
    pub fn apply(&mut self, dashboard: &mut Dashboard) -> bool {
        match dashboard.import_config(&self.text) {
            Ok(()) => {
                self.error = None;
                self.open = false;
                true
            }
            Err(DashboardError::Validation(e)) => {
                self.error = Some(e.to_string());
                false
            }
            Err(DashboardError::Storage(e)) => {
                self.error = Some(format!("Applied, but not saved: {e}"));
                true
            }
        }
    }

    pub fn ui(&mut self, ctx: &egui::Context, dashboard: &mut Dashboard) -> bool {
        if !self.open {
            return false;
        }
        let mut changed = false;
        let mut open = self.open;
        egui::Window::new("Edit Configuration")
            .open(&mut open)
            .resizable(true)
            .default_size([520.0, 420.0])
            .show(ctx, |ui| {
                if let Some(err) = &self.error {
                    ui.colored_label(egui::Color32::RED, err);
                }
                egui::ScrollArea::vertical()
                    .max_height((ui.available_height() - 32.0).max(120.0))
                    .show(ui, |ui| {
                        ui.add(
                            egui::TextEdit::multiline(&mut self.text)
                                .code_editor()
                                .desired_width(f32::INFINITY)
                                .desired_rows(18),
                        );
                    });
                ui.horizontal(|ui| {
                    if ui.button("Apply").clicked() {
                        changed = self.apply(dashboard);
                    }
                    if ui.button("Revert").clicked() {
                        self.text = dashboard.config_json();
                        self.error = None;
                    }
                });
            });
        self.open = self.open && open;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{ConfigStore, DefaultDocumentSource, KeyValueStore, MemoryStore, STORAGE_KEY};
    use crate::federation::{ComponentCache, ContainerFetcher, RemoteContainer, RemoteModuleLoader};
    use std::sync::Arc;

    struct Offline;

    impl ContainerFetcher for Offline {
        fn fetch(&self, entry_url: &str) -> anyhow::Result<Arc<dyn RemoteContainer>> {
            anyhow::bail!("offline: {entry_url}")
        }
    }

    impl DefaultDocumentSource for Offline {
        fn fetch_default(&self) -> anyhow::Result<String> {
            anyhow::bail!("offline")
        }

        fn location(&self) -> String {
            "offline".into()
        }
    }

    fn dashboard(storage: Arc<MemoryStore>) -> Dashboard {
        let loader = RemoteModuleLoader::with_cache(Arc::new(Offline), Arc::new(ComponentCache::new()));
        let store = ConfigStore::new(storage, Arc::new(Offline), std::env::temp_dir());
        Dashboard::new(store, Arc::new(loader), Arc::new(|| {}))
    }

    #[test]
    fn invalid_document_stays_open_with_error() {
        let storage = Arc::new(MemoryStore::new());
        let mut dash = dashboard(storage.clone());
        let mut dialog = ConfigEditorDialog::default();
        dialog.open(&dash);
        *dialog.text_mut() = r#"{"notWidgets": []}"#.into();
        assert!(!dialog.apply(&mut dash));
        assert!(dialog.open);
        assert!(dialog.error().unwrap().contains("widgets"));
        assert_eq!(storage.get_item(STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn valid_document_is_applied_and_saved() {
        let storage = Arc::new(MemoryStore::new());
        let mut dash = dashboard(storage.clone());
        let mut dialog = ConfigEditorDialog::default();
        dialog.open(&dash);
        *dialog.text_mut() = r#"{"gridColumns": 2, "widgets": []}"#.into();
        assert!(dialog.apply(&mut dash));
        assert!(!dialog.open);
        assert_eq!(dash.grid().grid_columns(), 2);
        assert!(storage.get_item(STORAGE_KEY).unwrap().is_some());
    }
}
