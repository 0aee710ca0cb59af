//! Rollback command - return a release to an earlier revision

use console::style;
use keel_kube::{RollbackRequest, ServerConfig};
use std::time::Duration;

use crate::error::Result;
use crate::util::connect;

pub async fn run(
    config: ServerConfig,
    name: &str,
    revision: u32,
    dry_run: bool,
    no_hooks: bool,
    recreate_pods: bool,
    timeout: Option<Duration>,
) -> Result<()> {
    let target = if revision == 0 {
        "the previous revision".to_string()
    } else {
        format!("revision {}", revision)
    };
    println!(
        "{} Rolling back {} to {}",
        style("→").blue().bold(),
        style(name).cyan(),
        target
    );

    let mut req = RollbackRequest::new(name, revision);
    req.dry_run = dry_run;
    req.disable_hooks = no_hooks;
    req.recreate = recreate_pods;
    req.timeout = timeout;

    let server = connect(config).await?;
    let release = server.rollback(req).await?;

    if dry_run {
        println!(
            "{} Dry run - {} would become revision {}",
            style("✓").green().bold(),
            release.info.description,
            style(release.version).yellow()
        );
    } else {
        println!(
            "{} {} complete, {} is now at revision {}",
            style("✓").green().bold(),
            release.info.description,
            style(&release.name).cyan(),
            style(release.version).yellow()
        );
    }
    Ok(())
}
