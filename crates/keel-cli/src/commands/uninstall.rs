//! Uninstall command - remove a release from the cluster

use console::style;
use keel_kube::{ServerConfig, UninstallRequest};
use std::time::Duration;

use crate::error::Result;
use crate::util::connect;

pub async fn run(
    config: ServerConfig,
    name: &str,
    purge: bool,
    no_hooks: bool,
    timeout: Option<Duration>,
) -> Result<()> {
    println!(
        "{} Uninstalling release {}",
        style("→").blue().bold(),
        style(name).cyan()
    );

    let mut req = UninstallRequest::new(name);
    req.purge = purge;
    req.disable_hooks = no_hooks;
    req.timeout = timeout;

    let server = connect(config).await?;
    let release = server.uninstall(req).await?;

    if purge {
        println!(
            "{} Uninstalled {} and removed its history",
            style("✓").green().bold(),
            style(&release.name).cyan()
        );
    } else {
        println!(
            "{} Uninstalled {} (history kept, purge with --purge)",
            style("✓").green().bold(),
            style(&release.name).cyan()
        );
    }
    Ok(())
}
