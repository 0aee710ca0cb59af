//! Filters and functions registered in the default environment

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

/// Serialize a value as YAML without the document marker or trailing newline
///
/// Usage: {{ values.resources | toyaml | nindent(4) }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let json: serde_json::Value = serde_json::to_value(&value).map_err(|e| invalid(e.to_string()))?;
    let yaml = serde_yaml::to_string(&json).map_err(|e| invalid(e.to_string()))?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

pub fn tojson(value: Value) -> Result<String, Error> {
    let json: serde_json::Value = serde_json::to_value(&value).map_err(|e| invalid(e.to_string()))?;
    serde_json::to_string(&json).map_err(|e| invalid(e.to_string()))
}

pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

pub fn b64decode(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| invalid(format!("base64 decode error: {}", e)))?;
    String::from_utf8(decoded).map_err(|e| invalid(format!("UTF-8 decode error: {}", e)))
}

fn as_text(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

pub fn quote(value: Value) -> String {
    let s = as_text(&value);
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn squote(value: Value) -> String {
    format!("'{}'", as_text(&value).replace('\'', "''"))
}

/// Indent every non-empty line by `spaces`
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Like `indent`, preceded by a newline
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Fail rendering when a value is missing or empty
///
/// Usage: {{ values.image.tag | required("image.tag is required") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined()
        || value.is_none()
        || value.as_str().is_some_and(str::is_empty);
    if missing {
        Err(invalid(
            message.unwrap_or_else(|| "required value is missing".to_string()),
        ))
    } else {
        Ok(value)
    }
}

/// Truncate to at most `length` characters
pub fn trunc(value: String, length: usize) -> String {
    value.chars().take(length).collect()
}

pub fn trimprefix(value: String, prefix: String) -> String {
    value.strip_prefix(&prefix).unwrap_or(&value).to_string()
}

pub fn trimsuffix(value: String, suffix: String) -> String {
    value.strip_suffix(&suffix).unwrap_or(&value).to_string()
}

/// Abort rendering with a message
pub fn fail(message: String) -> Result<Value, Error> {
    Err(invalid(message))
}

/// Check a version against a semver range
///
/// Usage: {% if semver_compare(">=1.25.0", capabilities.kubeVersion.gitVersion) %}
pub fn semver_compare(range: String, version: String) -> Result<bool, Error> {
    let plain = version.trim_start_matches('v');
    let core = plain.split(['-', '+']).next().unwrap_or(plain);
    let version = semver::Version::parse(core)
        .map_err(|e| invalid(format!("invalid version '{}': {}", version, e)))?;
    Ok(keel_core::is_compatible_range(&range, &version))
}

pub fn ternary(true_val: Value, false_val: Value, condition: Value) -> Value {
    if condition.is_true() { true_val } else { false_val }
}
