//! Status command - show the status of a release

use console::style;
use keel_kube::ServerConfig;
use miette::IntoDiagnostic;

use crate::display;
use crate::error::Result;
use crate::util::offline;

pub async fn run(
    config: ServerConfig,
    name: &str,
    revision: u32,
    show_manifest: bool,
    output_json: bool,
) -> Result<()> {
    let server = offline(config).await?;

    if output_json {
        let status = server.status(name, revision).await?;
        let json = serde_json::to_string_pretty(&status).into_diagnostic()?;
        println!("{}", json);
        return Ok(());
    }

    let release = server.content(name, revision).await?;

    println!("{}", style("RELEASE INFO").bold().underlined());
    println!("  Name:        {}", style(&release.name).cyan());
    println!("  Namespace:   {}", style(&release.namespace).yellow());
    println!("  Revision:    {}", style(release.version).yellow());
    println!("  Status:      {}", display::status(release.status()));
    println!("  Deployed:    {}", display::timestamp(&release.info.first_deployed));
    println!("  Updated:     {}", display::timestamp(&release.info.last_deployed));
    if let Some(deleted) = &release.info.deleted {
        println!("  Deleted:     {}", display::timestamp(deleted));
    }
    println!("  Description: {}", release.info.description);

    println!("\n{}", style("CHART").bold().underlined());
    println!("  Name:        {}", release.chart.metadata.name);
    println!("  Version:     {}", release.chart.metadata.version);
    if let Some(app_version) = &release.chart.metadata.app_version {
        println!("  App Version: {}", app_version);
    }

    if !release.hooks.is_empty() {
        println!("\n{}", style("HOOKS").bold().underlined());
        for hook in &release.hooks {
            let last_run = hook
                .last_run
                .as_ref()
                .map(display::timestamp)
                .unwrap_or_else(|| "never".to_string());
            println!("  {} {} (last run: {})", hook.kind, style(&hook.name).cyan(), last_run);
        }
    }

    if show_manifest {
        println!("\n{}", style("MANIFEST").bold().underlined());
        println!("{}", release.manifest.trim_end());
    }

    display::print_notes(release.notes.as_deref());
    Ok(())
}
