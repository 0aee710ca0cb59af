//! Values trees, raw configuration blobs and chart coalescing

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::path::Path;
use tracing::warn;

use crate::chart::Chart;
use crate::error::{CoreError, Result};

/// Key under which values shared with every subchart live
pub const GLOBAL_KEY: &str = "global";

/// Values container with deep merge capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(Map::new()))
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse values from a YAML string. An empty document yields empty values.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        match value {
            JsonValue::Null => Ok(Self::new()),
            JsonValue::Object(_) => Ok(Self(value)),
            other => Err(CoreError::ValuesParse {
                message: format!("expected a mapping at the top level, found {}", kind_of(&other)),
            }),
        }
    }

    /// Parse values from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Ok(Self(value))
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Scalars: overlay replaces base
    /// - Objects: recursive merge
    /// - Arrays: overlay replaces base (not appended)
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Set a value by dotted path (e.g., "image.tag")
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();
        set_nested(&mut self.0, &parts, value);
        Ok(())
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        path.split('.')
            .try_fold(&self.0, |current, key| current.as_object()?.get(key))
    }

    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }

    /// Scope values for a subchart
    ///
    /// A subchart sees the tree stored under its own name as its root, plus
    /// the parent's `global` tree.
    pub fn scope_for_subchart(&self, subchart_name: &str) -> Values {
        let mut scoped = Map::new();

        if let JsonValue::Object(parent) = &self.0 {
            if let Some(JsonValue::Object(sub)) = parent.get(subchart_name) {
                scoped.extend(sub.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            if let Some(global) = parent.get(GLOBAL_KEY) {
                scoped.insert(GLOBAL_KEY.to_string(), global.clone());
            }
        }

        Values(JsonValue::Object(scoped))
    }
}

/// The opaque, serialized configuration supplied with a request.
///
/// The raw text is stored verbatim in release history so that later
/// upgrades can reuse it byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub raw: String,
}

impl Config {
    /// Canonical serialization of an empty configuration
    pub const EMPTY: &'static str = "{}\n";

    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Serialize a values tree into a config blob
    pub fn from_values(values: &Values) -> Result<Self> {
        Ok(Self::new(values.to_yaml()?))
    }

    /// Unset, zero-length, or exactly the canonical empty object
    pub fn is_blank(&self) -> bool {
        self.raw.is_empty() || self.raw == Self::EMPTY
    }

    /// Parse the blob into a values tree. Blank yields empty values.
    pub fn parse(&self) -> Result<Values> {
        if self.is_blank() {
            return Ok(Values::new());
        }
        Values::from_yaml(&self.raw).map_err(|e| match e {
            CoreError::ValuesParse { .. } => e,
            other => CoreError::ValuesParse {
                message: other.to_string(),
            },
        })
    }
}

/// Compute the effective values for a chart: the supplied configuration with
/// the chart's defaults (and every subchart's defaults) merged underneath.
///
/// Keys explicitly set to `null` in the configuration remove the default.
pub fn coalesce_values(chart: &Chart, config: &Config) -> Result<Values> {
    let mut values = config.parse()?;
    coalesce_chart(chart, &mut values.0);
    Ok(values)
}

fn coalesce_chart(chart: &Chart, dest: &mut JsonValue) {
    if !dest.is_object() {
        *dest = JsonValue::Object(Map::new());
    }
    coalesce_dependencies(chart, dest);
    coalesce_defaults(&chart.metadata.name, dest, &chart.values.0);
}

fn coalesce_dependencies(chart: &Chart, dest: &mut JsonValue) {
    // Effective globals at this level: the chart's default globals under the supplied ones.
    let mut merged = chart
        .values
        .0
        .get(GLOBAL_KEY)
        .cloned()
        .unwrap_or_else(|| JsonValue::Object(Map::new()));
    if let Some(supplied) = dest.get(GLOBAL_KEY) {
        deep_merge(&mut merged, supplied);
    }
    let globals = merged.as_object().is_some_and(|g| !g.is_empty()).then_some(merged);

    let Some(map) = dest.as_object_mut() else {
        return;
    };

    for sub in &chart.dependencies {
        let entry = map
            .entry(sub.metadata.name.clone())
            .or_insert_with(|| JsonValue::Object(Map::new()));
        if !entry.is_object() {
            warn!(
                chart = %chart.metadata.name,
                subchart = %sub.metadata.name,
                "subchart values are not a table, replacing"
            );
            *entry = JsonValue::Object(Map::new());
        }
        if let Some(globals) = &globals
            && let Some(sub_map) = entry.as_object_mut()
        {
            let sub_globals = sub_map
                .entry(GLOBAL_KEY.to_string())
                .or_insert_with(|| JsonValue::Object(Map::new()));
            deep_merge(sub_globals, globals);
        }
        coalesce_chart(sub, entry);
    }
}

fn coalesce_defaults(chart_name: &str, dest: &mut JsonValue, defaults: &JsonValue) {
    let (Some(dest_map), Some(default_map)) = (dest.as_object_mut(), defaults.as_object()) else {
        return;
    };

    for (key, default) in default_map {
        if !dest_map.contains_key(key) {
            dest_map.insert(key.clone(), default.clone());
            continue;
        }
        if dest_map.get(key).is_some_and(JsonValue::is_null) {
            dest_map.remove(key);
            continue;
        }
        if let Some(existing) = dest_map.get_mut(key) {
            match (existing.is_object(), default.is_object()) {
                (true, true) => coalesce_defaults(chart_name, existing, default),
                (false, true) => warn!(
                    chart = %chart_name,
                    key = %key,
                    "overriding a table default with a scalar"
                ),
                _ => {}
            }
        }
    }
}

fn kind_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a sequence",
        JsonValue::Object(_) => "a mapping",
    }
}

/// Deep merge two JSON values
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn set_nested(value: &mut JsonValue, path: &[&str], new_value: JsonValue) {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return;
    };

    if !value.is_object() {
        *value = JsonValue::Object(Map::new());
    }
    let JsonValue::Object(map) = value else {
        return;
    };

    if remaining.is_empty() {
        map.insert(key.to_string(), new_value);
    } else {
        let entry = map
            .entry(key.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
        set_nested(entry, remaining, new_value);
    }
}

/// Parse --set arguments (key=value format)
pub fn parse_set_values(set_args: &[String]) -> Result<Values> {
    let mut values = Values::new();

    for arg in set_args {
        let (key, val) = arg.split_once('=').ok_or_else(|| CoreError::ValuesParse {
            message: format!("Invalid --set format: '{}'. Expected key=value", arg),
        })?;

        let json_value = match val {
            "true" => JsonValue::Bool(true),
            "false" => JsonValue::Bool(false),
            "null" => JsonValue::Null,
            _ => {
                if let Ok(num) = val.parse::<i64>() {
                    JsonValue::Number(num.into())
                } else if val.starts_with('[') || val.starts_with('{') {
                    serde_json::from_str(val).unwrap_or_else(|_| JsonValue::String(val.to_string()))
                } else {
                    JsonValue::String(val.to_string())
                }
            }
        };

        values.set(key, json_value)?;
    }

    Ok(values)
}
