//! List command - list releases

use console::style;
use keel_core::ReleaseStatus;
use keel_kube::{ListRequest, ServerConfig, StatusResponse};
use miette::IntoDiagnostic;
use serde_json::json;

use crate::display;
use crate::error::Result;
use crate::util::offline;

pub struct ListArgs {
    pub filter: Option<String>,
    pub all: bool,
    pub deleted: bool,
    pub failed: bool,
    pub pending: bool,
    pub namespace: Option<String>,
    pub max: usize,
    pub offset: Option<String>,
    pub json: bool,
}

/// Statuses selected by the flags. Empty leaves the server default
/// (deployed releases only).
fn status_codes(args: &ListArgs) -> Vec<ReleaseStatus> {
    if args.all {
        return vec![
            ReleaseStatus::Unknown,
            ReleaseStatus::Deployed,
            ReleaseStatus::Deleted,
            ReleaseStatus::Deleting,
            ReleaseStatus::Superseded,
            ReleaseStatus::Failed,
            ReleaseStatus::PendingInstall,
            ReleaseStatus::PendingUpgrade,
            ReleaseStatus::PendingRollback,
        ];
    }

    let mut codes = Vec::new();
    if args.deleted || args.failed || args.pending {
        codes.push(ReleaseStatus::Deployed);
    }
    if args.deleted {
        codes.push(ReleaseStatus::Deleted);
    }
    if args.failed {
        codes.push(ReleaseStatus::Failed);
    }
    if args.pending {
        codes.extend([
            ReleaseStatus::PendingInstall,
            ReleaseStatus::PendingUpgrade,
            ReleaseStatus::PendingRollback,
            ReleaseStatus::Deleting,
        ]);
    }
    codes
}

pub async fn run(config: ServerConfig, args: ListArgs) -> Result<()> {
    let req = ListRequest {
        limit: args.max,
        offset: args.offset.clone(),
        filter: args.filter.clone(),
        status_codes: status_codes(&args),
        namespace: args.namespace.clone(),
    };

    let server = offline(config).await?;
    let page = server.list(req).await?;

    if args.json {
        let releases: Vec<StatusResponse> = page.releases.iter().map(StatusResponse::from).collect();
        let json = serde_json::to_string_pretty(&json!({
            "releases": releases,
            "next": page.next,
            "total": page.total,
        }))
        .into_diagnostic()?;
        println!("{}", json);
        return Ok(());
    }

    if page.releases.is_empty() {
        println!("No releases found");
        return Ok(());
    }

    println!(
        "{:<25} {:<15} {:<10} {:<17} {:<30} {:<20}",
        style("NAME").bold(),
        style("NAMESPACE").bold(),
        style("REVISION").bold(),
        style("STATUS").bold(),
        style("CHART").bold(),
        style("UPDATED").bold()
    );
    for release in &page.releases {
        println!(
            "{:<25} {:<15} {:<10} {:<17} {:<30} {:<20}",
            release.name,
            release.namespace,
            release.version,
            display::status(release.status()),
            display::chart_label(release),
            display::timestamp(&release.info.last_deployed)
        );
    }

    if let Some(next) = &page.next {
        println!(
            "\n{} shown of {}. Continue with --offset {}",
            display::pluralize(page.releases.len(), "release", "releases"),
            page.total,
            style(next).cyan()
        );
    }

    Ok(())
}
