//! Hook annotation keys and parsing
//!
//! Both `keel.sh/*` and `helm.sh/*` keys are understood so that existing
//! charts work unchanged. When both are present the native key wins.

use std::collections::BTreeMap;

/// Keel-native annotations
pub mod keel {
    pub const HOOK: &str = "keel.sh/hook";
    pub const HOOK_WEIGHT: &str = "keel.sh/hook-weight";
}

/// Helm-compatible annotations
pub mod helm {
    pub const HOOK: &str = "helm.sh/hook";
    pub const HOOK_WEIGHT: &str = "helm.sh/hook-weight";
}

/// Get annotation value, preferring the native key
pub fn get_annotation<'a>(
    annotations: &'a BTreeMap<String, String>,
    keel_key: &str,
    helm_key: &str,
) -> Option<&'a str> {
    annotations
        .get(keel_key)
        .or_else(|| annotations.get(helm_key))
        .map(String::as_str)
}

/// Raw value of the hook annotation, if any
pub fn hook_annotation(annotations: &BTreeMap<String, String>) -> Option<&str> {
    get_annotation(annotations, keel::HOOK, helm::HOOK)
}

/// Split a hook annotation into trimmed, lower-cased event names
pub fn parse_hook_events(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse hook weight (default: 0, also on malformed values)
pub fn parse_hook_weight(annotations: &BTreeMap<String, String>) -> i32 {
    get_annotation(annotations, keel::HOOK_WEIGHT, helm::HOOK_WEIGHT)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}
