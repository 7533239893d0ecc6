use crate::federation::container::WidgetComponent;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// State of one cached load.
#[derive(Clone)]
pub enum CacheEntry {
    Loaded(WidgetComponent),
    Failed,
}

impl CacheEntry {
    pub fn component(&self) -> Option<&WidgetComponent> {
        match self {
            CacheEntry::Loaded(c) => Some(c),
            CacheEntry::Failed => None,
        }
    }
}

/// Widget id -> last load outcome.
///
/// The cache only references components for display; widget runtime state is
/// owned by the component itself. A later load for the same id overwrites the
/// entry.
#[derive(Default)]
pub struct ComponentCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    generation: AtomicU64,
}

static GLOBAL_CACHE: Lazy<Arc<ComponentCache>> = Lazy::new(|| Arc::new(ComponentCache::new()));

impl ComponentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache shared by every loader created with `RemoteModuleLoader::new`.
    pub fn global() -> Arc<ComponentCache> {
        Arc::clone(&GLOBAL_CACHE)
    }

    pub fn entry(&self, id: &str) -> Option<CacheEntry> {
        self.entries.read().ok()?.get(id).cloned()
    }

    /// Successfully loaded component for `id`.
    pub fn component(&self, id: &str) -> Option<WidgetComponent> {
        match self.entry(id)? {
            CacheEntry::Loaded(c) => Some(c),
            CacheEntry::Failed => None,
        }
    }

    pub fn insert_loaded(&self, id: &str, component: WidgetComponent) {
        if let Ok(mut map) = self.entries.write() {
            map.insert(id.to_string(), CacheEntry::Loaded(component));
        }
    }

    pub fn insert_failed(&self, id: &str) {
        if let Ok(mut map) = self.entries.write() {
            map.insert(id.to_string(), CacheEntry::Failed);
        }
    }

    pub fn remove(&self, id: &str) -> Option<CacheEntry> {
        self.entries.write().ok()?.remove(id)
    }

    /// Drop every entry whose id does not satisfy `keep`.
    pub fn retain(&self, mut keep: impl FnMut(&str) -> bool) {
        if let Ok(mut map) = self.entries.write() {
            map.retain(|id, _| keep(id));
        }
    }

    /// Drop every entry. Loaders sharing this cache drop their containers
    /// on their next load.
    pub fn clear(&self) {
        if let Ok(mut map) = self.entries.write() {
            map.clear();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Bumped by every [`ComponentCache::clear`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reset the process-wide component cache, including the containers held by
/// loaders built on it.
pub fn clear_component_cache() {
    GLOBAL_CACHE.clear();
    tracing::debug!("component cache cleared");
}
