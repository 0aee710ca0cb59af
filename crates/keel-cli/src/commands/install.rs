//! Install command - deploy a chart as a new release

use console::style;
use keel_core::Chart;
use keel_kube::{InstallRequest, ServerConfig};
use std::path::PathBuf;
use std::time::Duration;

use crate::display;
use crate::error::Result;
use crate::util::{connect, user_values};

pub struct InstallArgs {
    pub chart: PathBuf,
    pub name: Option<String>,
    pub values: Vec<PathBuf>,
    pub set: Vec<String>,
    pub namespace: String,
    pub dry_run: bool,
    pub no_hooks: bool,
    pub replace: bool,
    pub timeout: Option<Duration>,
}

pub async fn run(config: ServerConfig, args: InstallArgs) -> Result<()> {
    let chart = Chart::load(&args.chart)?;
    println!(
        "{} Installing chart {} version {}",
        style("→").blue().bold(),
        style(chart.name()).cyan(),
        style(&chart.metadata.version).yellow()
    );

    let mut req = InstallRequest::new(chart, args.namespace)
        .with_values(user_values(&args.values, &args.set)?);
    req.name = args.name.unwrap_or_default();
    req.dry_run = args.dry_run;
    req.disable_hooks = args.no_hooks;
    req.reuse_name = args.replace;
    req.timeout = args.timeout;

    let server = connect(config).await?;
    let release = server.install(req).await?;

    if args.dry_run {
        println!(
            "{} Dry run - would install {} in namespace {}",
            style("✓").green().bold(),
            style(&release.name).cyan(),
            style(&release.namespace).yellow()
        );
        println!("{}", release.manifest.trim());
    } else {
        println!(
            "{} Successfully installed {} (revision {}) in namespace {}",
            style("✓").green().bold(),
            style(&release.name).cyan(),
            style(release.version).yellow(),
            style(&release.namespace).yellow()
        );
    }

    display::print_notes(release.notes.as_deref());
    Ok(())
}
