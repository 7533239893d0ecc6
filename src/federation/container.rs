use crate::federation::shared_scope::SharedScopeRegistry;
use eframe::egui;
use once_cell::sync::OnceCell;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Renderable component exposed by a remote plugin.
///
/// Components are shared between the cache and every cell that shows them, so
/// any state they keep between frames lives behind interior mutability.
pub trait RemoteWidget: Send + Sync {
    fn ui(&self, ui: &mut egui::Ui, props: &Map<String, Value>);
}

pub type WidgetComponent = Arc<dyn RemoteWidget>;

/// Module object returned by a container factory.
#[derive(Clone, Default)]
pub struct ExposedModule {
    pub default: Option<WidgetComponent>,
    pub namespace: Option<WidgetComponent>,
}

impl ExposedModule {
    pub fn with_default(component: WidgetComponent) -> Self {
        Self {
            default: Some(component),
            namespace: None,
        }
    }

    /// Module whose namespace object is itself the component.
    pub fn bare(component: WidgetComponent) -> Self {
        Self {
            default: None,
            namespace: Some(component),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Default export, falling back to the module object itself.
    pub fn into_component(self) -> Option<WidgetComponent> {
        self.default.or(self.namespace)
    }
}

pub type ModuleFactory = Box<dyn FnOnce() -> anyhow::Result<ExposedModule> + Send>;

/// Contract every remote entry artifact fulfils.
pub trait RemoteContainer: Send + Sync {
    /// Receive the host's shared scope. Called once per container.
    fn init(&self, scope: &Arc<SharedScopeRegistry>) -> anyhow::Result<()>;

    /// Look up the factory for an exposed module path such as `./Widget`.
    fn get(&self, module: &str) -> anyhow::Result<ModuleFactory>;
}

type StaticFactory = Arc<dyn Fn() -> anyhow::Result<ExposedModule> + Send + Sync>;

/// Container whose modules are compiled into the current process.
#[derive(Default)]
pub struct StaticContainer {
    modules: HashMap<String, StaticFactory>,
    scope: OnceCell<Arc<SharedScopeRegistry>>,
}

impl StaticContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expose<F>(mut self, module: &str, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<ExposedModule> + Send + Sync + 'static,
    {
        self.modules.insert(module.to_string(), Arc::new(factory));
        self
    }

    /// Expose a single component as the default export of `module`.
    pub fn expose_component(self, module: &str, component: WidgetComponent) -> Self {
        self.expose(module, move || {
            Ok(ExposedModule::with_default(Arc::clone(&component)))
        })
    }

    /// Scope received through `init`, if any.
    pub fn scope(&self) -> Option<&Arc<SharedScopeRegistry>> {
        self.scope.get()
    }
}

impl RemoteContainer for StaticContainer {
    fn init(&self, scope: &Arc<SharedScopeRegistry>) -> anyhow::Result<()> {
        if self.scope.set(Arc::clone(scope)).is_err() {
            tracing::debug!("container already initialised; keeping first scope");
        }
        Ok(())
    }

    fn get(&self, module: &str) -> anyhow::Result<ModuleFactory> {
        let factory = self
            .modules
            .get(module)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("module `{module}` is not exposed by this container"))?;
        Ok(Box::new(move || factory()))
    }
}

/// Export the `remote_entry` symbol for a plugin library.
///
/// The expression must evaluate to an `Arc<dyn RemoteContainer>`. Host and
/// plugin have to be built with the same compiler and the same version of
/// this crate because trait objects cross the library boundary.
#[macro_export]
macro_rules! export_remote_entry {
    ($container:expr) => {
        #[no_mangle]
        pub extern "C" fn remote_entry(
        ) -> *mut ::std::sync::Arc<dyn $crate::federation::container::RemoteContainer> {
            let container: ::std::sync::Arc<dyn $crate::federation::container::RemoteContainer> =
                $container;
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(container))
        }
    };
}
