//! Ordering of manifests and hooks

use std::cmp::Ordering;

use crate::hooks::Hook;
use crate::manifest::Manifest;

/// Kind precedence for installation. Anything not listed comes after.
pub const INSTALL_ORDER: &[&str] = &[
    "Namespace",
    "NetworkPolicy",
    "ResourceQuota",
    "LimitRange",
    "PodSecurityPolicy",
    "PodDisruptionBudget",
    "ServiceAccount",
    "Secret",
    "ConfigMap",
    "StorageClass",
    "PersistentVolume",
    "PersistentVolumeClaim",
    "ClusterRole",
    "ClusterRoleBinding",
    "Role",
    "RoleBinding",
    "Service",
    "DaemonSet",
    "Pod",
    "ReplicationController",
    "ReplicaSet",
    "Deployment",
    "StatefulSet",
    "Job",
    "CronJob",
    "Ingress",
    "APIService",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Install,
    /// The exact reverse of install: unknown kinds first, then the table backwards
    Uninstall,
}

fn install_rank(kind: &str) -> usize {
    INSTALL_ORDER
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(INSTALL_ORDER.len())
}

/// Stable sort of manifests by kind precedence
pub fn sort_by_kind(mut manifests: Vec<Manifest>, order: SortOrder) -> Vec<Manifest> {
    match order {
        SortOrder::Install => manifests.sort_by_key(|m| install_rank(&m.head.kind)),
        SortOrder::Uninstall => {
            manifests.sort_by_key(|m| std::cmp::Reverse(install_rank(&m.head.kind)))
        }
    }
    manifests
}

/// Hook execution order: weight ascending, then name ascending
pub fn hook_order(a: &Hook, b: &Hook) -> Ordering {
    a.weight.cmp(&b.weight).then_with(|| a.name.cmp(&b.name))
}

/// Stable sort of hooks into execution order
pub fn sort_by_hook_weight(hooks: &mut [Hook]) {
    hooks.sort_by(hook_order);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookEvent;
    use crate::manifest::{HeadMetadata, SimpleHead};
    use insta::assert_snapshot;

    fn manifest(kind: &str, name: &str) -> Manifest {
        Manifest {
            path: format!("web/templates/{name}.yaml"),
            content: format!("kind: {kind}\n"),
            head: SimpleHead {
                api_version: "v1".into(),
                kind: kind.into(),
                metadata: Some(HeadMetadata {
                    name: name.into(),
                    annotations: None,
                }),
            },
        }
    }

    fn hook(name: &str, weight: i32) -> Hook {
        Hook {
            name: name.into(),
            kind: "Job".into(),
            path: String::new(),
            manifest: String::new(),
            events: vec![HookEvent::PreInstall],
            weight,
            last_run: None,
        }
    }

    fn describe(manifests: &[Manifest]) -> String {
        manifests
            .iter()
            .map(|m| format!("{}/{}", m.head.kind, m.head.name()))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn input() -> Vec<Manifest> {
        vec![
            manifest("Deployment", "web"),
            manifest("Widget", "w1"),
            manifest("Service", "web"),
            manifest("Namespace", "ns"),
            manifest("Gadget", "g1"),
            manifest("Service", "api"),
        ]
    }

    #[test]
    fn test_install_order() {
        let sorted = sort_by_kind(input(), SortOrder::Install);
        assert_snapshot!(
            describe(&sorted),
            @"Namespace/ns,Service/web,Service/api,Deployment/web,Widget/w1,Gadget/g1"
        );
    }

    #[test]
    fn test_uninstall_order() {
        let sorted = sort_by_kind(input(), SortOrder::Uninstall);
        assert_snapshot!(
            describe(&sorted),
            @"Widget/w1,Gadget/g1,Deployment/web,Service/web,Service/api,Namespace/ns"
        );
    }

    #[test]
    fn test_sort_is_idempotent() {
        let once = sort_by_kind(input(), SortOrder::Install);
        let twice = sort_by_kind(once.clone(), SortOrder::Install);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_hook_weight_then_name() {
        let mut hooks = vec![hook("b", 0), hook("a", 0), hook("z", -5), hook("c", 10)];
        sort_by_hook_weight(&mut hooks);
        let names: Vec<_> = hooks.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "b", "c"]);
    }
}
