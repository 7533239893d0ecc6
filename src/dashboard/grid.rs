use crate::dashboard::config::Configuration;
use crate::dashboard::descriptor::{normalize_widget, WidgetDescriptor};
use crate::dashboard::interaction::{move_item, Interaction, Reorder};
use crate::dashboard::layout::{clamp_row_span, layout_columns, pack_cells, row_count, Placement};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// One widget cell to draw: its index in the configuration and grid position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellPlan {
    pub index: usize,
    pub id: String,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridView {
    /// No widgets configured; show the instructional placeholder.
    Empty,
    Cells {
        columns: usize,
        rows: usize,
        cells: Vec<CellPlan>,
    },
}

impl GridView {
    pub fn cells(&self) -> &[CellPlan] {
        match self {
            GridView::Empty => &[],
            GridView::Cells { cells, .. } => cells,
        }
    }
}

/// In-memory dashboard layout plus the current interaction mode.
///
/// Mutations that change the widget list or grid report it so the caller can
/// persist the configuration.
#[derive(Debug, Clone, Default)]
pub struct WidgetGrid {
    config: Configuration,
    interaction: Interaction,
}

impl WidgetGrid {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            interaction: Interaction::Normal,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn widgets(&self) -> &[WidgetDescriptor] {
        &self.config.widgets
    }

    pub fn grid_columns(&self) -> u32 {
        self.config.grid_columns
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn interaction_mut(&mut self) -> &mut Interaction {
        &mut self.interaction
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.config.widgets.iter().position(|w| w.id == id)
    }

    pub fn widget(&self, id: &str) -> Option<&WidgetDescriptor> {
        self.config.widgets.iter().find(|w| w.id == id)
    }

    /// Cells to render for the current mode.
    pub fn view(&self) -> GridView {
        if self.config.widgets.is_empty() {
            return GridView::Empty;
        }
        let columns = layout_columns(self.config.grid_columns as usize);

        if let Some(focused) = self.interaction.focused() {
            if let Some(index) = self.position(focused) {
                let rows = clamp_row_span(self.config.widgets[index].rows as usize);
                return GridView::Cells {
                    columns,
                    rows,
                    cells: vec![CellPlan {
                        index,
                        id: focused.to_string(),
                        placement: Placement {
                            row: 0,
                            col: 0,
                            row_span: rows,
                            col_span: columns,
                        },
                    }],
                };
            }
        }

        let spans: Vec<(usize, usize)> = self
            .config
            .widgets
            .iter()
            .map(|w| (w.cols as usize, w.rows as usize))
            .collect();
        let placements = pack_cells(&spans, columns);
        GridView::Cells {
            columns,
            rows: row_count(&placements),
            cells: self
                .config
                .widgets
                .iter()
                .zip(placements)
                .enumerate()
                .map(|(index, (w, placement))| CellPlan {
                    index,
                    id: w.id.clone(),
                    placement,
                })
                .collect(),
        }
    }

    /// Apply a move produced by a drop. Returns whether the order changed.
    pub fn reorder(&mut self, reorder: Reorder) -> bool {
        move_item(&mut self.config.widgets, reorder.from, reorder.to)
    }

    /// End the current drag over the cell at `target`, applying the move.
    pub fn finish_drag(&mut self, target: Option<usize>) -> Option<Reorder> {
        let reorder = self.interaction.release(target)?;
        self.reorder(reorder).then_some(reorder)
    }

    /// Focus a configured widget. Unknown ids are ignored.
    pub fn focus(&mut self, id: &str) -> bool {
        if self.position(id).is_none() {
            return false;
        }
        self.interaction.focus(id);
        true
    }

    pub fn exit_focus(&mut self) -> bool {
        self.interaction.exit_focus()
    }

    /// Normalize a raw widget object against the current ids and append it.
    pub fn add_widget(&mut self, raw: &Map<String, Value>) -> &WidgetDescriptor {
        let mut used: HashSet<String> = self.config.widgets.iter().map(|w| w.id.clone()).collect();
        let descriptor = normalize_widget(raw, &mut used);
        let index = self.config.widgets.len();
        self.config.widgets.push(descriptor);
        &self.config.widgets[index]
    }

    /// Remove a widget, leaving focus or drag modes that referred to it.
    pub fn remove_widget(&mut self, id: &str) -> Option<WidgetDescriptor> {
        let index = self.position(id)?;
        if self.interaction.focused() == Some(id) {
            self.interaction.exit_focus();
        }
        if self.interaction.drag().is_some() {
            self.interaction.cancel();
        }
        Some(self.config.widgets.remove(index))
    }

    pub fn set_grid_columns(&mut self, columns: u32) -> bool {
        let columns = columns.max(1);
        if self.config.grid_columns == columns {
            return false;
        }
        self.config.grid_columns = columns;
        true
    }

    /// Swap in a whole new configuration (import, reset).
    pub fn replace_config(&mut self, config: Configuration) {
        self.config = config;
        self.interaction = Interaction::Normal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::layout::MAX_ROW_SPAN;
    use serde_json::json;

    fn grid(ids: &[&str]) -> WidgetGrid {
        let widgets: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "id": id, "name": id, "url": format!("https://w.example/{id}") }))
            .collect();
        let config = Configuration::from_value(&json!({ "gridColumns": 3, "widgets": widgets }))
            .unwrap();
        WidgetGrid::new(config)
    }

    fn ids(grid: &WidgetGrid) -> Vec<&str> {
        grid.widgets().iter().map(|w| w.id.as_str()).collect()
    }

    #[test]
    fn empty_configuration_shows_placeholder() {
        assert_eq!(WidgetGrid::default().view(), GridView::Empty);
    }

    #[test]
    fn reorder_keeps_membership() {
        let mut g = grid(&["a", "b", "c", "d"]);
        assert!(g.reorder(Reorder { from: 0, to: 2 }));
        assert_eq!(ids(&g), vec!["b", "c", "a", "d"]);
        let mut sorted = ids(&g);
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn focus_shows_single_full_width_cell() {
        let mut g = grid(&["a", "b", "c"]);
        assert!(g.focus("b"));
        let view = g.view();
        assert_eq!(view.cells().len(), 1);
        assert_eq!(view.cells()[0].id, "b");
        assert_eq!(view.cells()[0].placement.col_span, 3);

        assert!(g.focus("c"));
        assert_eq!(g.view().cells()[0].id, "c");

        assert!(g.exit_focus());
        let order: Vec<String> = g.view().cells().iter().map(|c| c.id.clone()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn focus_on_unknown_widget_is_ignored() {
        let mut g = grid(&["a"]);
        assert!(!g.focus("zzz"));
        assert_eq!(g.interaction().focused(), None);
    }

    #[test]
    fn removing_focused_widget_leaves_focus() {
        let mut g = grid(&["a", "b"]);
        g.focus("a");
        assert_eq!(g.remove_widget("a").map(|w| w.id), Some("a".into()));
        assert!(g.interaction().sensors_enabled());
        assert_eq!(ids(&g), vec!["b"]);
        assert!(g.remove_widget("a").is_none());
    }

    #[test]
    fn added_widget_gets_unique_id() {
        let mut g = grid(&["a"]);
        let raw = json!({ "id": "a", "name": "Clock", "url": "https://w.example/clock" });
        let added = g.add_widget(raw.as_object().unwrap()).clone();
        assert_ne!(added.id, "a");
        assert_eq!(g.widgets().len(), 2);
    }

    #[test]
    fn finish_drag_applies_move() {
        use eframe::egui::pos2;
        let mut g = grid(&["a", "b", "c"]);
        g.interaction_mut().pointer_down("a", 0, pos2(0.0, 0.0));
        g.interaction_mut().pointer_moved(pos2(50.0, 0.0));
        assert_eq!(g.finish_drag(Some(2)), Some(Reorder { from: 0, to: 2 }));
        assert_eq!(ids(&g), vec!["b", "c", "a"]);
    }

    #[test]
    fn huge_row_span_stays_renderable() {
        let config = Configuration::from_value(&json!({
            "gridColumns": 3,
            "widgets": [
                { "id": "tall", "name": "Tall", "url": "https://w.example/tall", "rows": 4294967295u32 },
                { "id": "b", "name": "B", "url": "https://w.example/b" }
            ]
        }))
        .unwrap();
        let mut g = WidgetGrid::new(config);
        match g.view() {
            GridView::Cells { rows, cells, .. } => {
                assert_eq!(rows, MAX_ROW_SPAN);
                assert_eq!(cells[0].placement.row_span, MAX_ROW_SPAN);
            }
            GridView::Empty => panic!("expected cells"),
        }
        assert_eq!(g.widget("tall").map(|w| w.rows), Some(u32::MAX));

        assert!(g.focus("tall"));
        assert_eq!(g.view().cells()[0].placement.row_span, MAX_ROW_SPAN);
    }

    #[test]
    fn grid_columns_change_is_reported() {
        let mut g = grid(&["a"]);
        assert!(!g.set_grid_columns(3));
        assert!(g.set_grid_columns(0));
        assert_eq!(g.grid_columns(), 1);
    }
}
