use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Module path used when a widget does not name one.
pub const DEFAULT_MODULE: &str = "./Widget";

const ID_SUFFIX_LEN: usize = 4;
const ID_TOKEN_LEN: usize = 10;

fn default_span() -> u32 {
    1
}

fn default_module() -> String {
    DEFAULT_MODULE.to_string()
}

/// Fully specified widget entry of a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_module")]
    pub module: String,
    #[serde(default)]
    pub props: Map<String, Value>,
    #[serde(default = "default_span")]
    pub cols: u32,
    #[serde(default = "default_span")]
    pub rows: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Fields this host does not know about, kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WidgetDescriptor {
    /// Label shown for the widget; falls back to its id.
    pub fn title(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

const KNOWN_FIELDS: [&str; 8] = ["id", "name", "url", "module", "props", "cols", "rows", "scope"];

/// Normalize a list of raw widget objects, keeping ids unique within the list.
///
/// Returns the index of the first entry that is not a JSON object.
pub fn normalize_widgets(raw: &[Value]) -> Result<Vec<WidgetDescriptor>, usize> {
    let mut used = HashSet::new();
    raw.iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::Object(map) => Ok(normalize_widget(map, &mut used)),
            _ => Err(index),
        })
        .collect()
}

/// Fill every optional field of one raw widget object.
///
/// `used` holds the ids already taken in the current pass; the chosen id is
/// added to it.
pub fn normalize_widget(raw: &Map<String, Value>, used: &mut HashSet<String>) -> WidgetDescriptor {
    let name = string_field(raw, "name").unwrap_or_default();
    let id = match string_field(raw, "id").filter(|id| !id.trim().is_empty()) {
        Some(id) if !used.contains(&id) => id,
        Some(id) => {
            tracing::warn!(id = %id, "duplicate widget id; assigning a new one");
            unique_id(&name, used)
        }
        None => unique_id(&name, used),
    };
    used.insert(id.clone());

    let extra = raw
        .iter()
        .filter(|(key, _)| !KNOWN_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    WidgetDescriptor {
        id,
        name,
        url: string_field(raw, "url").unwrap_or_default(),
        module: string_field(raw, "module")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(default_module),
        props: match raw.get("props") {
            Some(Value::Object(props)) => props.clone(),
            _ => Map::new(),
        },
        cols: span_field(raw, "cols"),
        rows: span_field(raw, "rows"),
        scope: string_field(raw, "scope"),
        extra,
    }
}

/// Id derived from `name`: its slug plus a short random suffix, or a random
/// token when the name has no usable characters.
pub fn generate_id(name: &str) -> String {
    let base = slug::slugify(name);
    if base.is_empty() {
        random_token(ID_TOKEN_LEN)
    } else {
        format!("{base}-{}", random_token(ID_SUFFIX_LEN))
    }
}

fn unique_id(name: &str, used: &HashSet<String>) -> String {
    loop {
        let id = generate_id(name);
        if !used.contains(&id) {
            return id;
        }
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

fn string_field(raw: &Map<String, Value>, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Positive integer span, `1` when missing or unusable.
fn span_field(raw: &Map<String, Value>, key: &str) -> u32 {
    let value = match raw.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 1.0).map(|f| f as u64)),
        _ => None,
    };
    value
        .filter(|v| *v >= 1)
        .map(|v| v.min(u32::MAX as u64) as u32)
        .unwrap_or_else(default_span)
}
