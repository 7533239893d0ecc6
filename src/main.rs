use remote_dashboard::dashboard::{default_source_for, ConfigStore, Dashboard, FileStore};
use remote_dashboard::federation::{HttpContainerFetcher, RemoteModuleLoader};
use remote_dashboard::gui::DashboardApp;
use remote_dashboard::logging;
use remote_dashboard::settings::Settings;

use anyhow::Context;
use eframe::egui;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let settings_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "settings.json".to_string());
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("failed to read settings from {settings_path}"))?;
    logging::init(settings.debug_logging, settings.log_file.clone());
    tracing::info!(settings = %settings_path, remote_base = settings.remote_base(), "starting dashboard");
    if !std::path::Path::new(&settings_path).exists() {
        match settings.save(&settings_path) {
            Ok(()) => tracing::info!(path = %settings_path, "wrote default settings"),
            Err(e) => tracing::warn!(path = %settings_path, "cannot write default settings: {e:#}"),
        }
    }

    let storage = Arc::new(FileStore::new(settings.storage_dir()).with_quota(settings.storage_quota));
    let remote = default_source_for(settings.remote_base())?;
    let store = ConfigStore::new(storage, Arc::from(remote), settings.export_dir());
    let fetcher = Arc::new(HttpContainerFetcher::new(settings.plugin_cache_dir())?);
    let loader = Arc::new(RemoteModuleLoader::new(fetcher));

    let (width, height) = settings.window_size.unwrap_or((1024, 720));
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([width as f32, height as f32])
            .with_min_inner_size([480.0, 320.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Remote Dashboard",
        native_options,
        Box::new(move |cc| {
            let ctx = cc.egui_ctx.clone();
            let notify = Arc::new(move || ctx.request_repaint());
            let dashboard = Dashboard::new(store, loader, notify);
            Box::new(DashboardApp::new(dashboard, &settings))
        }),
    )
    .map_err(|e| anyhow::anyhow!("window error: {e}"))
}
