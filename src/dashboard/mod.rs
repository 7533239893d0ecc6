pub mod boundary;
pub mod config;
pub mod dashboard;
pub mod descriptor;
pub mod grid;
pub mod interaction;
pub mod layout;
pub mod remote;
pub mod storage;
pub mod store;

pub use boundary::{supervise, SlotState, Supervised, WidgetBoundary, WidgetFault};
pub use config::{Configuration, ValidationError, DEFAULT_GRID_COLUMNS};
pub use dashboard::{Dashboard, DashboardError, Notice, NoticeKind, Notify};
pub use descriptor::{normalize_widget, normalize_widgets, WidgetDescriptor, DEFAULT_MODULE};
pub use grid::{CellPlan, GridView, WidgetGrid};
pub use interaction::{move_item, Interaction, Reorder, DRAG_ACTIVATION_DISTANCE};
pub use remote::{default_source_for, DefaultDocumentSource, FileDefaultSource, HttpDefaultSource};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError, STORAGE_KEY};
pub use store::{ConfigOrigin, ConfigStore, ResolvedConfig};
