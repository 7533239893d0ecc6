mod config_editor_dialog;

pub use config_editor_dialog::ConfigEditorDialog;

use crate::dashboard::{ConfigOrigin, Dashboard, Notice, NoticeKind};
use crate::settings::Settings;
use eframe::egui;
use egui_toast::{Toast, ToastKind, ToastOptions, Toasts};

fn push_toast(toasts: &mut Toasts, toast: Toast) {
    tracing::debug!(text = %toast.text.text(), "toast");
    toasts.add(toast);
}

/// Desktop shell around the dashboard: toolbar, editor and notifications.
pub struct DashboardApp {
    dashboard: Dashboard,
    toasts: Toasts,
    pub enable_toasts: bool,
    pub toast_duration: f32,
    editor: ConfigEditorDialog,
    grid_columns: u32,
}

impl DashboardApp {
    pub fn new(dashboard: Dashboard, settings: &Settings) -> Self {
        let mut toasts = Toasts::new().anchor(egui::Align2::RIGHT_TOP, [10.0, 10.0]);
        if settings.enable_toasts && dashboard.origin() == ConfigOrigin::Empty {
            push_toast(
                &mut toasts,
                Toast {
                    text: "No configuration found; starting with an empty dashboard".into(),
                    kind: ToastKind::Info,
                    options: ToastOptions::default()
                        .duration_in_seconds(settings.toast_duration as f64),
                },
            );
        }
        let grid_columns = dashboard.grid().grid_columns();
        Self {
            dashboard,
            toasts,
            enable_toasts: settings.enable_toasts,
            toast_duration: settings.toast_duration,
            editor: ConfigEditorDialog::default(),
            grid_columns,
        }
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn add_toast(&mut self, text: impl Into<String>, kind: ToastKind) {
        if !self.enable_toasts {
            return;
        }
        let text: String = text.into();
        push_toast(
            &mut self.toasts,
            Toast {
                text: text.into(),
                kind,
                options: ToastOptions::default().duration_in_seconds(self.toast_duration as f64),
            },
        );
    }

    fn show_notice(&mut self, notice: Notice) {
        let kind = match notice.kind {
            NoticeKind::Info => ToastKind::Info,
            NoticeKind::Error => ToastKind::Error,
        };
        self.add_toast(notice.text, kind);
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        egui::menu::bar(ui, |ui| {
            if ui.button("Reload widgets").clicked() {
                self.dashboard.reload_widgets();
            }
            if ui.button("Reset").on_hover_text("Discard the saved layout").clicked() {
                self.dashboard.reset_config();
                self.grid_columns = self.dashboard.grid().grid_columns();
                self.add_toast("Configuration reset", ToastKind::Info);
            }
            if ui.button("Export").clicked() {
                match self.dashboard.export_config() {
                    Ok(path) => {
                        self.add_toast(format!("Exported to {}", path.display()), ToastKind::Success)
                    }
                    Err(e) => {
                        tracing::error!("export failed: {e:#}");
                        self.add_toast(format!("Export failed: {e}"), ToastKind::Error);
                    }
                }
            }
            if ui.button("Edit configuration").clicked() {
                self.editor.open(&self.dashboard);
            }
            ui.separator();
            ui.label("Columns");
            let resp = ui.add(egui::DragValue::new(&mut self.grid_columns).clamp_range(1..=u32::MAX));
            if resp.changed() && self.grid_columns != self.dashboard.grid().grid_columns() {
                if let Err(e) = self.dashboard.set_grid_columns(self.grid_columns) {
                    self.add_toast(format!("Configuration not saved: {e}"), ToastKind::Error);
                }
            }
            let pending = self.dashboard.pending_loads();
            if pending > 0 {
                ui.separator();
                ui.spinner();
                ui.label(format!("Loading {pending} widget(s)"));
            }
        });
    }
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.enable_toasts {
            self.toasts.show(ctx);
        }

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));

        if self.editor.ui(ctx, &mut self.dashboard) {
            self.grid_columns = self.dashboard.grid().grid_columns();
            self.add_toast("Configuration applied", ToastKind::Success);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false; 2])
                .show(ui, |ui| self.dashboard.ui(ui));
        });

        for notice in self.dashboard.take_notices() {
            self.show_notice(notice);
        }
    }
}
