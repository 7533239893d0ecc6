use once_cell::sync::OnceCell;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identity every host-provided shared entry is tagged with.
pub const HOST_ORIGIN: &str = env!("CARGO_PKG_NAME");

/// Version key the host registers its `tracing` dispatcher under.
pub const TRACING_VERSION: &str = "0.1";
/// Version key the host registers its blocking HTTP client under.
pub const HTTP_CLIENT_VERSION: &str = "0.11";

/// Type-erased handle to a shared library instance.
pub type SharedInstance = Arc<dyn Any + Send + Sync>;

type InstanceFactory = Arc<dyn Fn() -> SharedInstance + Send + Sync>;

/// One version of a shared library as offered to remote containers.
#[derive(Clone)]
pub struct SharedEntry {
    factory: InstanceFactory,
    instance: Arc<OnceCell<SharedInstance>>,
    pub loaded: bool,
    pub origin: String,
    pub eager: bool,
}

impl SharedEntry {
    /// Entry backed by an instance that already exists in the host process.
    pub fn eager(origin: &str, instance: SharedInstance) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(Arc::clone(&instance));
        Self {
            factory: Arc::new(move || Arc::clone(&instance)),
            instance: Arc::new(cell),
            loaded: true,
            origin: origin.to_string(),
            eager: true,
        }
    }

    /// Entry whose instance is built on first request and reused afterwards.
    pub fn lazy<F>(origin: &str, factory: F) -> Self
    where
        F: Fn() -> SharedInstance + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            instance: Arc::new(OnceCell::new()),
            loaded: false,
            origin: origin.to_string(),
            eager: false,
        }
    }

    /// Return the singleton instance, constructing it at most once.
    pub fn get_instance(&self) -> SharedInstance {
        Arc::clone(self.instance.get_or_init(|| (self.factory)()))
    }

    /// Downcast the singleton to a concrete type.
    pub fn instance_of<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.get_instance().downcast::<T>().ok()
    }
}

impl fmt::Debug for SharedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedEntry")
            .field("loaded", &self.loaded)
            .field("origin", &self.origin)
            .field("eager", &self.eager)
            .finish_non_exhaustive()
    }
}

/// Shared-library name -> version -> entry.
#[derive(Clone, Debug, Default)]
pub struct SharedScopeRegistry {
    libraries: HashMap<String, HashMap<String, SharedEntry>>,
}

impl SharedScopeRegistry {
    pub fn register(&mut self, name: &str, version: &str, entry: SharedEntry) -> &mut Self {
        self.libraries
            .entry(name.to_string())
            .or_default()
            .insert(version.to_string(), entry);
        self
    }

    pub fn get(&self, name: &str, version: &str) -> Option<&SharedEntry> {
        self.libraries.get(name).and_then(|v| v.get(version))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.libraries.contains_key(name)
    }

    pub fn versions(&self, name: &str) -> Vec<&str> {
        let mut versions: Vec<&str> = self
            .libraries
            .get(name)
            .map(|v| v.keys().map(String::as_str).collect())
            .unwrap_or_default();
        versions.sort_unstable();
        versions
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.libraries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered (name, version) pairs.
    pub fn len(&self) -> usize {
        self.libraries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build a registry from the host's own copies of the shared libraries.
///
/// Plugins are separate binaries with their own statics, so anything that must
/// be process-wide (the log dispatcher, the HTTP connection pool) is handed
/// over from here instead of being instantiated again inside the plugin.
pub fn host_shared_libraries() -> SharedScopeRegistry {
    let mut registry = SharedScopeRegistry::default();
    let dispatch = tracing::dispatcher::get_default(|d| d.clone());
    registry.register(
        "tracing",
        TRACING_VERSION,
        SharedEntry::eager(HOST_ORIGIN, Arc::new(dispatch)),
    );
    registry.register(
        "reqwest",
        HTTP_CLIENT_VERSION,
        SharedEntry::eager(HOST_ORIGIN, Arc::new(reqwest::blocking::Client::new())),
    );
    registry
}

/// Memoizes the registry handed to every remote container in a session.
pub struct SharedScopeBroker {
    prebuilt: OnceCell<Arc<SharedScopeRegistry>>,
    session: OnceCell<Arc<SharedScopeRegistry>>,
}

impl Default for SharedScopeBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedScopeBroker {
    pub const fn new() -> Self {
        Self {
            prebuilt: OnceCell::new(),
            session: OnceCell::new(),
        }
    }

    /// Offer a registry produced ahead of time by the host.
    ///
    /// Only the first installation counts, and it must happen before the
    /// session registry is first requested. A rejected registry is handed back.
    pub fn install_prebuilt(&self, registry: SharedScopeRegistry) -> Result<(), SharedScopeRegistry> {
        if self.session.get().is_some() {
            return Err(registry);
        }
        self.prebuilt
            .set(Arc::new(registry))
            .map_err(|rejected| Arc::try_unwrap(rejected).unwrap_or_else(|arc| (*arc).clone()))
    }

    pub fn shared_scope(&self) -> Arc<SharedScopeRegistry> {
        let scope = self.session.get_or_init(|| match self.prebuilt.get() {
            Some(prebuilt) => {
                tracing::debug!("using prebuilt shared scope");
                Arc::clone(prebuilt)
            }
            None => {
                let registry = host_shared_libraries();
                tracing::debug!(libraries = ?registry.names(), "built host shared scope");
                Arc::new(registry)
            }
        });
        Arc::clone(scope)
    }
}

static BROKER: SharedScopeBroker = SharedScopeBroker::new();

/// Session-wide shared scope.
pub fn get_shared_scope() -> Arc<SharedScopeRegistry> {
    BROKER.shared_scope()
}

/// Install the host's prebuilt registry for the process-wide broker.
pub fn install_prebuilt_scope(registry: SharedScopeRegistry) -> Result<(), SharedScopeRegistry> {
    BROKER.install_prebuilt(registry)
}
