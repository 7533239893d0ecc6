use crate::dashboard::descriptor::{normalize_widgets, WidgetDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Grid width used when a document does not specify a usable one.
pub const DEFAULT_GRID_COLUMNS: u32 = 3;

fn default_grid_columns() -> u32 {
    DEFAULT_GRID_COLUMNS
}

/// Malformed configuration input.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("configuration is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("configuration must be a JSON object")]
    NotAnObject,
    #[error("configuration is missing the `widgets` field")]
    MissingWidgets,
    #[error("configuration field `widgets` must be an array")]
    WidgetsNotArray,
    #[error("widgets[{index}] must be an object")]
    WidgetNotObject { index: usize },
}

/// Dashboard layout document: grid width plus the ordered widget list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default = "default_grid_columns")]
    pub grid_columns: u32,
    #[serde(default)]
    pub widgets: Vec<WidgetDescriptor>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::empty()
    }
}

impl Configuration {
    /// Configuration the dashboard falls back to when nothing else resolves.
    pub fn empty() -> Self {
        Self {
            grid_columns: DEFAULT_GRID_COLUMNS,
            widgets: Vec::new(),
        }
    }

    pub fn new(widgets: Vec<WidgetDescriptor>, grid_columns: u32) -> Self {
        Self {
            grid_columns: grid_columns.max(1),
            widgets,
        }
    }

    /// Parse and normalize a configuration document.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Validate the document shape and normalize every widget.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let doc = value.as_object().ok_or(ValidationError::NotAnObject)?;
        let raw_widgets = match doc.get("widgets") {
            None | Some(Value::Null) => return Err(ValidationError::MissingWidgets),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(ValidationError::WidgetsNotArray),
        };
        let widgets = normalize_widgets(raw_widgets)
            .map_err(|index| ValidationError::WidgetNotObject { index })?;
        let grid_columns = match doc.get("gridColumns") {
            None => DEFAULT_GRID_COLUMNS,
            Some(v) => match v.as_u64().filter(|n| *n >= 1) {
                Some(n) => n.min(u32::MAX as u64) as u32,
                None => {
                    tracing::warn!(value = %v, "unusable gridColumns; using default");
                    DEFAULT_GRID_COLUMNS
                }
            },
        };
        Ok(Self {
            grid_columns,
            widgets,
        })
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
