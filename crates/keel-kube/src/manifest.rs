//! Manifest classification
//!
//! Rendered files are split into YAML documents and each document is sorted
//! into either a lifecycle [`Hook`] or a generic [`Manifest`]. Only the
//! head of each document (`apiVersion`, `kind`, `metadata.name`,
//! `metadata.annotations`) is inspected.

use keel_core::VersionSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::annotations::{hook_annotation, parse_hook_events, parse_hook_weight};
use crate::error::{ReleaseError, Result};
use crate::hooks::{Hook, HookEvent};
use crate::sort::{SortOrder, sort_by_kind};

/// The identifying head of a Kubernetes document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleHead {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Option<HeadMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl SimpleHead {
    pub fn name(&self) -> &str {
        self.metadata.as_ref().map(|m| m.name.as_str()).unwrap_or("")
    }

    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata
            .as_ref()
            .and_then(|m| m.annotations.as_ref())
            .filter(|a| !a.is_empty())
    }
}

/// A non-hook document, applied as part of the release body
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// Rendered file the document came from
    pub path: String,
    pub content: String,
    pub head: SimpleHead,
}

/// What to do with a hook document none of whose events are recognized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownHookPolicy {
    /// Log and discard the document
    #[default]
    Drop,
    /// Log and deploy it as a generic manifest
    Generic,
}

/// Split a multi-document YAML string on `---` separator lines.
///
/// A separator is a line starting with `---` followed only by whitespace or
/// a comment. Documents containing only whitespace or comments are dropped.
pub fn split_manifests(content: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    let mut flush = |lines: &mut Vec<&str>| {
        let has_content = lines.iter().any(|l| {
            let l = l.trim();
            !l.is_empty() && !l.starts_with('#')
        });
        if has_content {
            docs.push(lines.join("\n").trim_matches('\n').to_string());
        }
        lines.clear();
    };

    for line in content.lines() {
        if is_separator(line) {
            flush(&mut current);
        } else {
            current.push(line);
        }
    }
    flush(&mut current);
    docs
}

fn is_separator(line: &str) -> bool {
    match line.strip_prefix("---") {
        Some(rest) => {
            let rest = rest.trim();
            rest.is_empty() || rest.starts_with('#')
        }
        None => false,
    }
}

fn is_partial(path: &str) -> bool {
    path.rsplit('/').next().is_some_and(|base| base.starts_with('_'))
}

/// Classify rendered files into hooks and generic manifests.
///
/// Files are processed in path order. Partials (`_*`) and blank files are
/// skipped. Any document that fails to parse, or that names an `apiVersion`
/// outside `api_versions`, aborts the whole classification. Generic
/// manifests are returned in install order.
pub fn sort_manifests(
    files: &BTreeMap<String, String>,
    api_versions: &VersionSet,
    unknown_hooks: UnknownHookPolicy,
) -> Result<(Vec<Hook>, Vec<Manifest>)> {
    let mut hooks = Vec::new();
    let mut generic = Vec::new();

    for (path, content) in files {
        if is_partial(path) {
            continue;
        }
        if content.trim().is_empty() {
            info!(path = %path, "manifest is empty, skipping");
            continue;
        }

        for doc in split_manifests(content) {
            let head: SimpleHead =
                serde_yaml::from_str(&doc).map_err(|e| ReleaseError::ManifestParse {
                    path: path.clone(),
                    message: e.to_string(),
                })?;

            if !head.api_version.is_empty() && !api_versions.has(&head.api_version) {
                return Err(ReleaseError::UnsupportedApiVersion {
                    api_version: head.api_version,
                    path: path.clone(),
                });
            }

            let Some(hook_value) = head.annotations().and_then(hook_annotation) else {
                generic.push(Manifest {
                    path: path.clone(),
                    content: doc,
                    head,
                });
                continue;
            };

            let mut events = Vec::new();
            for name in parse_hook_events(hook_value) {
                match HookEvent::parse(&name) {
                    Some(event) => events.push(event),
                    None => info!(path = %path, event = %name, "skipping unknown hook event"),
                }
            }

            if events.is_empty() {
                match unknown_hooks {
                    UnknownHookPolicy::Drop => {
                        info!(path = %path, hook = hook_value, "skipping unknown hook");
                    }
                    UnknownHookPolicy::Generic => {
                        info!(path = %path, hook = hook_value, "unknown hook deployed as a regular resource");
                        generic.push(Manifest {
                            path: path.clone(),
                            content: doc,
                            head,
                        });
                    }
                }
                continue;
            }

            let weight = head.annotations().map(parse_hook_weight).unwrap_or(0);
            hooks.push(Hook {
                name: head.name().to_string(),
                kind: head.kind.clone(),
                path: path.clone(),
                manifest: doc,
                events,
                weight,
                last_run: None,
            });
        }
    }

    Ok((hooks, sort_by_kind(generic, SortOrder::Install)))
}
