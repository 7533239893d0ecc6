use remote_dashboard::dashboard::normalize_widgets;
use remote_dashboard::federation::{
    get_shared_scope, install_prebuilt_scope, ComponentCache, ContainerFetcher, RemoteContainer,
    RemoteModuleLoader, SharedEntry, SharedScopeRegistry, StaticContainer, WidgetComponent,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

struct Recorder {
    containers: Mutex<Vec<Arc<StaticContainer>>>,
    component: WidgetComponent,
}

impl ContainerFetcher for Recorder {
    fn fetch(&self, _entry_url: &str) -> anyhow::Result<Arc<dyn RemoteContainer>> {
        let container = Arc::new(
            StaticContainer::new().expose_component("./Widget", Arc::clone(&self.component)),
        );
        self.containers.lock().unwrap().push(Arc::clone(&container));
        Ok(container)
    }
}

struct Blank;

impl remote_dashboard::federation::RemoteWidget for Blank {
    fn ui(&self, _ui: &mut eframe::egui::Ui, _props: &serde_json::Map<String, serde_json::Value>) {}
}

// The broker is process-wide, so everything runs in one test.
#[test]
fn prebuilt_scope_is_shared_with_every_container() {
    let mut prebuilt = SharedScopeRegistry::default();
    prebuilt.register(
        "theme",
        "1.0",
        SharedEntry::eager("host-bundle", Arc::new(String::from("dark"))),
    );
    install_prebuilt_scope(prebuilt).unwrap();

    let first = get_shared_scope();
    let second = get_shared_scope();
    assert!(Arc::ptr_eq(&first, &second));
    let theme = first.get("theme", "1.0").unwrap();
    assert_eq!(theme.origin, "host-bundle");
    assert_eq!(theme.instance_of::<String>().unwrap().as_str(), "dark");

    assert!(install_prebuilt_scope(SharedScopeRegistry::default()).is_err());

    let fetcher = Arc::new(Recorder {
        containers: Mutex::new(Vec::new()),
        component: Arc::new(Blank),
    });
    let loader = RemoteModuleLoader::with_cache(fetcher.clone(), Arc::new(ComponentCache::new()));
    let widgets = normalize_widgets(&[
        json!({ "id": "a", "url": "https://one.example" }),
        json!({ "id": "b", "url": "https://two.example" }),
    ])
    .unwrap();
    for widget in &widgets {
        loader.load_widget(widget).unwrap();
    }

    let containers = fetcher.containers.lock().unwrap();
    assert_eq!(containers.len(), 2);
    for container in containers.iter() {
        assert!(Arc::ptr_eq(container.scope().unwrap(), &first));
    }
}
