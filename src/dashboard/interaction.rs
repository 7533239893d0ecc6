use eframe::egui::Pos2;

/// Pointer travel, in points, before a press on a cell header becomes a drag.
pub const DRAG_ACTIVATION_DISTANCE: f32 = 8.0;

#[derive(Debug, Clone, PartialEq)]
pub struct DragState {
    pub id: String,
    /// Index of the dragged widget when the press started.
    pub origin: usize,
    pub start: Pos2,
    pub current: Pos2,
    /// Set once the pointer travelled past [`DRAG_ACTIVATION_DISTANCE`].
    pub active: bool,
}

/// Move of one widget from `from` to `to` in the ordered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reorder {
    pub from: usize,
    pub to: usize,
}

/// Grid interaction mode.
///
/// Pointer sensors only run in `Normal` and `Dragging`; `Focused` ignores them
/// until focus is left.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Interaction {
    #[default]
    Normal,
    Dragging(DragState),
    Focused { id: String },
}

impl Interaction {
    pub fn sensors_enabled(&self) -> bool {
        !matches!(self, Interaction::Focused { .. })
    }

    pub fn focused(&self) -> Option<&str> {
        match self {
            Interaction::Focused { id } => Some(id),
            _ => None,
        }
    }

    pub fn drag(&self) -> Option<&DragState> {
        match self {
            Interaction::Dragging(state) => Some(state),
            _ => None,
        }
    }

    /// Id of the widget being dragged once the drag is active.
    pub fn active_drag(&self) -> Option<&str> {
        self.drag().filter(|d| d.active).map(|d| d.id.as_str())
    }

    /// Press on a widget header. Ignored unless in `Normal`.
    pub fn pointer_down(&mut self, id: &str, origin: usize, pos: Pos2) {
        if matches!(self, Interaction::Normal) {
            *self = Interaction::Dragging(DragState {
                id: id.to_string(),
                origin,
                start: pos,
                current: pos,
                active: false,
            });
        }
    }

    pub fn pointer_moved(&mut self, pos: Pos2) {
        if let Interaction::Dragging(state) = self {
            state.current = pos;
            if !state.active && state.start.distance(pos) >= DRAG_ACTIVATION_DISTANCE {
                state.active = true;
                tracing::trace!(widget = %state.id, "drag activated");
            }
        }
    }

    /// Pointer released over `target` (the index of the cell under it).
    ///
    /// Returns the move to apply when an active drag was dropped on a
    /// different position. Always ends the drag.
    pub fn release(&mut self, target: Option<usize>) -> Option<Reorder> {
        if !matches!(self, Interaction::Dragging(_)) {
            return None;
        }
        let Interaction::Dragging(state) = std::mem::take(self) else {
            return None;
        };
        match target {
            Some(to) if state.active && to != state.origin => Some(Reorder {
                from: state.origin,
                to,
            }),
            _ => None,
        }
    }

    /// Abandon a drag in progress without reordering.
    pub fn cancel(&mut self) {
        if matches!(self, Interaction::Dragging(_)) {
            *self = Interaction::Normal;
        }
    }

    /// Focus `id`, replacing any previous focus and dropping a pending drag.
    pub fn focus(&mut self, id: &str) {
        *self = Interaction::Focused { id: id.to_string() };
    }

    /// Leave focus mode. Returns whether focus was active.
    pub fn exit_focus(&mut self) -> bool {
        if self.focused().is_some() {
            *self = Interaction::Normal;
            true
        } else {
            false
        }
    }
}

/// Remove the item at `from` and reinsert it at `to`.
///
/// Out of range indices leave the list unchanged; `to` is clamped to the last
/// position.
pub fn move_item<T>(list: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from >= list.len() || list.is_empty() {
        return false;
    }
    let to = to.min(list.len() - 1);
    if from == to {
        return false;
    }
    let item = list.remove(from);
    list.insert(to, item);
    true
}
