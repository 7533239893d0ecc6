use crate::common::panic::panic_message;
use crate::dashboard::descriptor::WidgetDescriptor;
use crate::federation::cache::ComponentCache;
use crate::federation::container::{RemoteContainer, WidgetComponent};
use crate::federation::fetcher::{remote_entry_url, ContainerFetcher};
use crate::federation::shared_scope::{get_shared_scope, SharedScopeRegistry};
use anyhow::anyhow;
use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};

/// Step of a remote load that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Fetch,
    Init,
    Get,
    Factory,
    MissingExport,
    Panic,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadStage::Fetch => "fetch",
            LoadStage::Init => "init",
            LoadStage::Get => "get",
            LoadStage::Factory => "factory",
            LoadStage::MissingExport => "missing export",
            LoadStage::Panic => "panic",
        };
        f.write_str(s)
    }
}

/// Remote fetch, init or extraction failure for one widget.
#[derive(Debug, Clone, thiserror::Error)]
#[error("widget `{id}` failed to load from {url} ({stage}): {cause:#}")]
pub struct LoadError {
    pub id: String,
    pub url: String,
    pub stage: LoadStage,
    pub cause: Arc<anyhow::Error>,
}

impl LoadError {
    fn new(descriptor: &WidgetDescriptor, stage: LoadStage, cause: anyhow::Error) -> Self {
        Self {
            id: descriptor.id.clone(),
            url: descriptor.url.clone(),
            stage,
            cause: Arc::new(cause),
        }
    }
}

type StageError = (LoadStage, anyhow::Error);
type ScopeProvider = Arc<dyn Fn() -> Arc<SharedScopeRegistry> + Send + Sync>;
type Flight = Arc<OnceCell<Result<WidgetComponent, LoadError>>>;

/// Containers per entry URL, valid for one cache generation.
#[derive(Default)]
struct ContainerTable {
    generation: u64,
    cells: HashMap<String, Arc<OnceCell<Arc<dyn RemoteContainer>>>>,
}

/// Resolves widget descriptors into components.
pub struct RemoteModuleLoader {
    fetcher: Arc<dyn ContainerFetcher>,
    cache: Arc<ComponentCache>,
    scope: ScopeProvider,
    containers: Mutex<ContainerTable>,
    in_flight: Mutex<HashMap<String, Flight>>,
}

impl RemoteModuleLoader {
    /// Loader backed by the process-wide cache and shared scope.
    pub fn new(fetcher: Arc<dyn ContainerFetcher>) -> Self {
        Self::with_cache(fetcher, ComponentCache::global())
    }

    pub fn with_cache(fetcher: Arc<dyn ContainerFetcher>, cache: Arc<ComponentCache>) -> Self {
        Self {
            fetcher,
            scope: Arc::new(get_shared_scope),
            containers: Mutex::new(ContainerTable {
                generation: cache.generation(),
                cells: HashMap::new(),
            }),
            in_flight: Mutex::new(HashMap::new()),
            cache,
        }
    }

    pub fn with_scope_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Arc<SharedScopeRegistry> + Send + Sync + 'static,
    {
        self.scope = Arc::new(provider);
        self
    }

    pub fn cache(&self) -> &Arc<ComponentCache> {
        &self.cache
    }

    /// Load the component for `descriptor`, returning the cached one if present.
    ///
    /// At most one load per widget id runs at a time; concurrent callers wait
    /// for it and share its outcome.
    pub fn load_widget(&self, descriptor: &WidgetDescriptor) -> Result<WidgetComponent, LoadError> {
        if let Some(component) = self.cache.component(&descriptor.id) {
            tracing::trace!(id = %descriptor.id, "component cache hit");
            return Ok(component);
        }

        let flight = {
            let mut in_flight = self.lock_in_flight(descriptor)?;
            Arc::clone(in_flight.entry(descriptor.id.clone()).or_default())
        };
        let result = flight.get_or_init(|| self.load_uncached(descriptor)).clone();

        if let Ok(mut in_flight) = self.in_flight.lock() {
            if in_flight
                .get(&descriptor.id)
                .is_some_and(|current| Arc::ptr_eq(current, &flight))
            {
                in_flight.remove(&descriptor.id);
            }
        }
        result
    }

    /// Forget every cached component and container.
    pub fn clear_cache(&self) {
        self.cache.clear();
        if let Ok(mut containers) = self.containers.lock() {
            containers.cells.clear();
            containers.generation = self.cache.generation();
        }
        tracing::debug!("loader cache cleared");
    }

    /// Start loading every widget concurrently.
    ///
    /// Each load runs on its own thread; `notify` is called after every
    /// outcome so a UI can wake up and poll the session.
    pub fn spawn_all(
        self: &Arc<Self>,
        widgets: &[WidgetDescriptor],
        notify: Arc<dyn Fn() + Send + Sync>,
    ) -> LoadSession {
        let (tx, rx) = channel();
        let mut pending = HashSet::new();
        for descriptor in widgets {
            if !pending.insert(descriptor.id.clone()) {
                continue;
            }
            let loader = Arc::clone(self);
            let owned = descriptor.clone();
            let thread_tx = tx.clone();
            let notify = Arc::clone(&notify);
            let spawned = std::thread::Builder::new()
                .name(format!("load-{}", descriptor.id))
                .spawn(move || {
                    let result =
                        panic::catch_unwind(AssertUnwindSafe(|| loader.load_widget(&owned)))
                            .unwrap_or_else(|payload| {
                                Err(LoadError::new(
                                    &owned,
                                    LoadStage::Panic,
                                    anyhow!(panic_message(payload.as_ref())),
                                ))
                            });
                    let _ = thread_tx.send(LoadOutcome {
                        id: owned.id.clone(),
                        result,
                    });
                    notify();
                });
            if let Err(err) = spawned {
                tracing::error!(id = %descriptor.id, error = %err, "failed to spawn load thread");
                let failure = LoadError::new(descriptor, LoadStage::Fetch, err.into());
                let _ = tx.send(LoadOutcome {
                    id: descriptor.id.clone(),
                    result: Err(failure),
                });
            }
        }
        LoadSession { rx, pending }
    }

    fn lock_in_flight(
        &self,
        descriptor: &WidgetDescriptor,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Flight>>, LoadError> {
        self.in_flight.lock().map_err(|_| {
            LoadError::new(descriptor, LoadStage::Fetch, anyhow!("loader lock poisoned"))
        })
    }

    fn load_uncached(&self, descriptor: &WidgetDescriptor) -> Result<WidgetComponent, LoadError> {
        match self.resolve(descriptor) {
            Ok(component) => {
                self.cache
                    .insert_loaded(&descriptor.id, Arc::clone(&component));
                tracing::info!(id = %descriptor.id, url = %descriptor.url, "widget loaded");
                Ok(component)
            }
            Err((stage, cause)) => {
                self.cache.insert_failed(&descriptor.id);
                let err = LoadError::new(descriptor, stage, cause);
                tracing::warn!(id = %err.id, url = %err.url, stage = %err.stage, "widget failed to load: {:#}", err.cause);
                Err(err)
            }
        }
    }

    fn resolve(&self, descriptor: &WidgetDescriptor) -> Result<WidgetComponent, StageError> {
        if descriptor.url.trim().is_empty() {
            return Err((LoadStage::Fetch, anyhow!("widget has no url")));
        }
        let container = self.container(&remote_entry_url(&descriptor.url))?;
        let factory = container
            .get(&descriptor.module)
            .map_err(|e| (LoadStage::Get, e))?;
        let module = factory().map_err(|e| (LoadStage::Factory, e))?;
        module.into_component().ok_or_else(|| {
            (
                LoadStage::MissingExport,
                anyhow!(
                    "module `{}` has neither a default export nor a renderable module object",
                    descriptor.module
                ),
            )
        })
    }

    fn container(&self, entry_url: &str) -> Result<Arc<dyn RemoteContainer>, StageError> {
        let cell = {
            let mut containers = self
                .containers
                .lock()
                .map_err(|_| (LoadStage::Fetch, anyhow!("container table lock poisoned")))?;
            let generation = self.cache.generation();
            if containers.generation != generation {
                containers.cells.clear();
                containers.generation = generation;
            }
            Arc::clone(containers.cells.entry(entry_url.to_string()).or_default())
        };
        cell.get_or_try_init(|| {
            let container = self
                .fetcher
                .fetch(entry_url)
                .map_err(|e| (LoadStage::Fetch, e))?;
            let scope = (self.scope)();
            container.init(&scope).map_err(|e| (LoadStage::Init, e))?;
            tracing::debug!(url = entry_url, "remote container initialised");
            Ok(container)
        })
        .map(Arc::clone)
    }
}

/// Settled load of one widget.
pub struct LoadOutcome {
    pub id: String,
    pub result: Result<WidgetComponent, LoadError>,
}

/// Loads started together by [`RemoteModuleLoader::spawn_all`].
pub struct LoadSession {
    rx: Receiver<LoadOutcome>,
    pending: HashSet<String>,
}

impl LoadSession {
    /// Outcomes that settled since the last poll.
    pub fn poll(&mut self) -> Vec<LoadOutcome> {
        let outcomes: Vec<LoadOutcome> = self.rx.try_iter().collect();
        for outcome in &outcomes {
            self.pending.remove(&outcome.id);
        }
        outcomes
    }

    /// Block until every load has settled.
    pub fn wait(&mut self) -> Vec<LoadOutcome> {
        let mut outcomes = Vec::new();
        while !self.pending.is_empty() {
            match self.rx.recv() {
                Ok(outcome) => {
                    self.pending.remove(&outcome.id);
                    outcomes.push(outcome);
                }
                Err(_) => break,
            }
        }
        outcomes
    }

    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
