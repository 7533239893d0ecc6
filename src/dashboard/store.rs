use crate::dashboard::config::{Configuration, ValidationError};
use crate::dashboard::descriptor::WidgetDescriptor;
use crate::dashboard::remote::DefaultDocumentSource;
use crate::dashboard::storage::{KeyValueStore, StorageError, STORAGE_KEY};
use anyhow::Context;
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a resolved configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    Persisted,
    RemoteDefault,
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub config: Configuration,
    pub origin: ConfigOrigin,
}

/// Result of one stage of the resolution pipeline.
enum StageOutcome {
    Resolved(Configuration),
    TryNext(String),
}

trait ConfigStage {
    fn origin(&self) -> ConfigOrigin;
    fn resolve(&self) -> StageOutcome;
}

struct PersistedStage<'a>(&'a dyn KeyValueStore);

impl ConfigStage for PersistedStage<'_> {
    fn origin(&self) -> ConfigOrigin {
        ConfigOrigin::Persisted
    }

    fn resolve(&self) -> StageOutcome {
        match self.0.get_item(STORAGE_KEY) {
            Ok(Some(text)) => match Configuration::parse(&text) {
                Ok(cfg) => StageOutcome::Resolved(cfg),
                Err(e) => StageOutcome::TryNext(format!("persisted configuration unusable: {e}")),
            },
            Ok(None) => StageOutcome::TryNext("no persisted configuration".into()),
            Err(e) => StageOutcome::TryNext(format!("persisted configuration unreadable: {e}")),
        }
    }
}

struct RemoteDefaultStage<'a>(&'a dyn DefaultDocumentSource);

impl ConfigStage for RemoteDefaultStage<'_> {
    fn origin(&self) -> ConfigOrigin {
        ConfigOrigin::RemoteDefault
    }

    fn resolve(&self) -> StageOutcome {
        let text = match self.0.fetch_default() {
            Ok(text) => text,
            Err(e) => {
                return StageOutcome::TryNext(format!(
                    "default document at {} unavailable: {e:#}",
                    self.0.location()
                ))
            }
        };
        match Configuration::parse(&text) {
            Ok(cfg) => StageOutcome::Resolved(cfg),
            Err(e) => StageOutcome::TryNext(format!(
                "default document at {} unusable: {e}",
                self.0.location()
            )),
        }
    }
}

/// Run `stages` in order; the empty configuration closes the chain.
fn resolve_pipeline(stages: &[&dyn ConfigStage]) -> ResolvedConfig {
    for stage in stages {
        match stage.resolve() {
            StageOutcome::Resolved(config) => {
                tracing::info!(
                    origin = ?stage.origin(),
                    widgets = config.widgets.len(),
                    "configuration resolved"
                );
                return ResolvedConfig {
                    config,
                    origin: stage.origin(),
                };
            }
            StageOutcome::TryNext(reason) => {
                tracing::warn!(origin = ?stage.origin(), "{reason}");
            }
        }
    }
    tracing::info!("no configuration available; starting empty");
    ResolvedConfig {
        config: Configuration::empty(),
        origin: ConfigOrigin::Empty,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentRef<'a> {
    grid_columns: u32,
    widgets: &'a [WidgetDescriptor],
}

/// Resolves, persists, imports and exports the dashboard configuration.
pub struct ConfigStore {
    storage: Arc<dyn KeyValueStore>,
    remote: Arc<dyn DefaultDocumentSource>,
    export_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        remote: Arc<dyn DefaultDocumentSource>,
        export_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            storage,
            remote,
            export_dir: export_dir.as_ref().to_path_buf(),
        }
    }

    /// Persisted configuration, else the remote default, else empty. Never fails.
    pub fn load_config(&self) -> ResolvedConfig {
        let stages: [&dyn ConfigStage; 2] = [
            &PersistedStage(self.storage.as_ref()),
            &RemoteDefaultStage(self.remote.as_ref()),
        ];
        resolve_pipeline(&stages)
    }

    /// Persist an already normalized configuration as-is.
    pub fn save_config(
        &self,
        widgets: &[WidgetDescriptor],
        grid_columns: u32,
    ) -> Result<(), StorageError> {
        let json = serde_json::to_string(&DocumentRef {
            grid_columns,
            widgets,
        })?;
        self.storage.set_item(STORAGE_KEY, &json)?;
        tracing::debug!(widgets = widgets.len(), grid_columns, "configuration saved");
        Ok(())
    }

    /// Validate and normalize imported text. Storage is left untouched.
    pub fn import_config(&self, text: &str) -> Result<Configuration, ValidationError> {
        let config = Configuration::parse(text)?;
        tracing::info!(widgets = config.widgets.len(), "configuration imported");
        Ok(config)
    }

    /// Write the configuration to a timestamped file in the export directory.
    pub fn export_config(
        &self,
        widgets: &[WidgetDescriptor],
        grid_columns: u32,
    ) -> anyhow::Result<PathBuf> {
        let json = serde_json::to_string_pretty(&DocumentRef {
            grid_columns,
            widgets,
        })?;
        std::fs::create_dir_all(&self.export_dir)
            .with_context(|| format!("create {}", self.export_dir.display()))?;
        let path = unused_path(&self.export_dir, &export_file_name(Local::now()));
        std::fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
        tracing::info!(path = %path.display(), "configuration exported");
        Ok(path)
    }

    /// Forget the persisted configuration and start over from the default document.
    pub fn reset_config(&self) -> ResolvedConfig {
        if let Err(e) = self.storage.remove_item(STORAGE_KEY) {
            tracing::warn!("failed to clear persisted configuration: {e}");
        }
        let stages: [&dyn ConfigStage; 1] = [&RemoteDefaultStage(self.remote.as_ref())];
        resolve_pipeline(&stages)
    }
}

fn export_file_name(now: chrono::DateTime<Local>) -> String {
    format!("dashboard-config-{}.json", now.format("%Y%m%d-%H%M%S-%3f"))
}

/// `dir/name`, or `dir/<stem>-N.json` for the first N that is free.
fn unused_path(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    if !path.exists() {
        return path;
    }
    let stem = name.trim_end_matches(".json");
    (1u32..)
        .map(|n| dir.join(format!("{stem}-{n}.json")))
        .find(|p| !p.exists())
        .unwrap_or(path)
}
