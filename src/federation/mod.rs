pub mod cache;
pub mod container;
pub mod fetcher;
pub mod loader;
pub mod shared_scope;

pub use cache::{clear_component_cache, ComponentCache};
pub use container::{ExposedModule, RemoteContainer, RemoteWidget, StaticContainer, WidgetComponent};
pub use fetcher::{remote_entry_url, ContainerFetcher, HttpContainerFetcher};
pub use loader::{LoadError, LoadOutcome, LoadSession, LoadStage, RemoteModuleLoader};
pub use shared_scope::{get_shared_scope, install_prebuilt_scope, SharedEntry, SharedScopeRegistry};
