//! Template command - render a chart locally
//!
//! Rendering goes through a dry-run install against in-memory history and a
//! fixed cluster description, so the output is classified and ordered
//! exactly as an install would apply it.

use console::style;
use keel_core::{Chart, KubeVersion};
use keel_engine::EngineYard;
use keel_kube::{
    ApiGroup, InstallRequest, MemoryDriver, RecordingExecutor, Release, ReleaseServer,
    ServerConfig, SortOrder, StaticDiscovery,
};
use miette::{IntoDiagnostic, WrapErr};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::display;
use crate::error::Result;
use crate::util::user_values;

pub struct TemplateArgs {
    pub name: String,
    pub chart: PathBuf,
    pub values: Vec<PathBuf>,
    pub set: Vec<String>,
    pub namespace: String,
    pub kube_version: String,
    pub api_versions: Vec<String>,
    pub show_only: Option<String>,
    pub output_dir: Option<PathBuf>,
}

/// The cluster assumed while rendering: the usual API groups plus any
/// `group/version` given on the command line
fn discovery(kube_version: &str, api_versions: &[String]) -> StaticDiscovery {
    let mut discovery = StaticDiscovery {
        version: KubeVersion::new(kube_version),
        ..StaticDiscovery::default()
    };
    for api_version in api_versions {
        let group = match api_version.split_once('/') {
            Some((group, version)) => ApiGroup::new(group, &[version]),
            None => ApiGroup::new("", &[api_version.as_str()]),
        };
        discovery.groups.push(group);
    }
    discovery
}

/// Rendered documents of a release as (path, text) pairs: resources in
/// install order, then hooks in execution order
fn documents(release: &Release) -> Vec<(String, String)> {
    let mut docs: Vec<(String, String)> = release
        .generic_manifests(SortOrder::Install)
        .into_iter()
        .map(|m| (m.path, m.content))
        .collect();

    let mut hooks = release.hooks.clone();
    keel_kube::sort_by_hook_weight(&mut hooks);
    docs.extend(
        hooks
            .into_iter()
            .map(|h| (h.path.clone(), format!("# Source: {}\n{}", h.path, h.manifest))),
    );
    docs
}

pub async fn run(args: TemplateArgs) -> Result<()> {
    let chart = Chart::load(&args.chart)?;
    let values = user_values(&args.values, &args.set)?;

    let server = ReleaseServer::new(
        Arc::new(MemoryDriver::new()),
        Arc::new(RecordingExecutor::new()),
        Arc::new(discovery(&args.kube_version, &args.api_versions)),
        EngineYard::default(),
        ServerConfig::default(),
    );
    let release = server
        .install(
            InstallRequest::new(chart, args.namespace.clone())
                .with_name(args.name.clone())
                .with_values(values)
                .dry_run(),
        )
        .await?;

    let docs: Vec<(String, String)> = documents(&release)
        .into_iter()
        .filter(|(path, _)| args.show_only.as_deref().is_none_or(|f| path.contains(f)))
        .collect();

    if let Some(output_path) = &args.output_dir {
        let mut files: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (path, content) in &docs {
            files.entry(path).or_default().push(content.trim_end());
        }

        for (path, contents) in files {
            let file_path = output_path.join(path);
            if let Some(parent) = file_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut text = contents.join("\n---\n");
            text.push('\n');
            fs::write(&file_path, text)
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to write {}", file_path.display()))?;
            println!("{} {}", style("wrote").green(), file_path.display());
        }
        return Ok(());
    }

    for (_, content) in &docs {
        println!("---");
        println!("{}", content.trim_end());
    }
    display::print_notes(release.notes.as_deref());

    Ok(())
}
