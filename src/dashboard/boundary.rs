use crate::common::panic::panic_message;
use crate::federation::{LoadError, WidgetComponent};
use eframe::egui;
use serde_json::{Map, Value};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Failure captured while a widget was rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetFault {
    pub widget: String,
    pub message: String,
}

impl fmt::Display for WidgetFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "widget `{}` crashed: {}", self.widget, self.message)
    }
}

/// Result of running one supervised unit.
#[derive(Debug)]
pub enum Supervised<T> {
    Ok(T),
    Failed(WidgetFault),
}

/// Run `f` for `widget`, turning a panic into a [`WidgetFault`].
pub fn supervise<T>(widget: &str, f: impl FnOnce() -> T) -> Supervised<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Supervised::Ok(value),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(widget, panic_message = %message, "widget panicked");
            Supervised::Failed(WidgetFault {
                widget: widget.to_string(),
                message,
            })
        }
    }
}

#[derive(Clone)]
pub enum SlotState {
    Loading,
    Ready(WidgetComponent),
    LoadFailed(String),
    Crashed(WidgetFault),
}

impl fmt::Debug for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Loading => f.write_str("Loading"),
            SlotState::Ready(_) => f.write_str("Ready"),
            SlotState::LoadFailed(msg) => f.debug_tuple("LoadFailed").field(msg).finish(),
            SlotState::Crashed(fault) => f.debug_tuple("Crashed").field(fault).finish(),
        }
    }
}

/// Per-cell fault boundary.
///
/// A boundary leaves `Loading` once and never recovers from a failure; a
/// fresh boundary is created when the widget is re-added or reloaded.
#[derive(Debug)]
pub struct WidgetBoundary {
    widget: String,
    state: SlotState,
}

impl WidgetBoundary {
    pub fn new(widget: &str) -> Self {
        Self {
            widget: widget.to_string(),
            state: SlotState::Loading,
        }
    }

    pub fn widget(&self) -> &str {
        &self.widget
    }

    pub fn state(&self) -> &SlotState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, SlotState::Loading)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, SlotState::LoadFailed(_) | SlotState::Crashed(_))
    }

    /// Settle the pending load. Ignored once the slot has left `Loading`.
    pub fn resolve(&mut self, outcome: Result<WidgetComponent, LoadError>) {
        if !self.is_loading() {
            return;
        }
        self.state = match outcome {
            Ok(component) => SlotState::Ready(component),
            Err(err) => SlotState::LoadFailed(err.to_string()),
        };
    }

    /// Mark the slot failed without a load error, e.g. when no component
    /// exists for it after loading settled.
    pub fn mark_missing(&mut self) {
        if self.is_loading() {
            self.state = SlotState::LoadFailed("component is not available".into());
        }
    }

    /// Draw the slot body: placeholder, failure panel or the widget.
    pub fn show(&mut self, ui: &mut egui::Ui, title: &str, props: &Map<String, Value>) {
        let component = match &self.state {
            SlotState::Loading => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(format!("Loading {title}..."));
                });
                return;
            }
            SlotState::LoadFailed(message) => {
                failure_panel(ui, title, message);
                return;
            }
            SlotState::Crashed(fault) => {
                failure_panel(ui, title, &fault.message);
                return;
            }
            SlotState::Ready(component) => component.clone(),
        };

        let outcome = supervise(&self.widget, || {
            ui.scope(|ui| component.ui(ui, props));
        });
        if let Supervised::Failed(fault) = outcome {
            failure_panel(ui, title, &fault.message);
            self.state = SlotState::Crashed(fault);
        }
    }
}

/// Inline error panel naming the widget and the failure.
pub fn failure_panel(ui: &mut egui::Ui, title: &str, message: &str) {
    egui::Frame::group(ui.style())
        .stroke(egui::Stroke::new(1.0, ui.visuals().error_fg_color))
        .show(ui, |ui| {
            ui.colored_label(
                ui.visuals().error_fg_color,
                format!("{title} failed to load"),
            );
            ui.label(egui::RichText::new(message).small());
        });
}
