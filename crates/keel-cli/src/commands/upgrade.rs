//! Upgrade command - move a release to a new chart or configuration

use console::style;
use keel_core::Chart;
use keel_kube::{ServerConfig, UpdateRequest};
use std::path::PathBuf;
use std::time::Duration;

use crate::display;
use crate::error::Result;
use crate::util::{connect, user_values};

pub struct UpgradeArgs {
    pub name: String,
    pub chart: PathBuf,
    pub values: Vec<PathBuf>,
    pub set: Vec<String>,
    pub reset_values: bool,
    pub reuse_values: bool,
    pub dry_run: bool,
    pub no_hooks: bool,
    pub recreate_pods: bool,
    pub timeout: Option<Duration>,
}

pub async fn run(config: ServerConfig, args: UpgradeArgs) -> Result<()> {
    let chart = Chart::load(&args.chart)?;
    println!(
        "{} Upgrading {} to chart {} version {}",
        style("→").blue().bold(),
        style(&args.name).cyan(),
        style(chart.name()).cyan(),
        style(&chart.metadata.version).yellow()
    );

    let mut req = UpdateRequest::new(&args.name, chart)
        .with_values(user_values(&args.values, &args.set)?);
    req.reset_values = args.reset_values;
    req.reuse_values = args.reuse_values;
    req.dry_run = args.dry_run;
    req.disable_hooks = args.no_hooks;
    req.recreate = args.recreate_pods;
    req.timeout = args.timeout;

    let server = connect(config).await?;
    let release = server.update(req).await?;

    if args.dry_run {
        println!(
            "{} Dry run - would upgrade {} to revision {}",
            style("✓").green().bold(),
            style(&release.name).cyan(),
            style(release.version).yellow()
        );
        println!("{}", release.manifest.trim());
    } else {
        println!(
            "{} Upgraded {} to revision {}",
            style("✓").green().bold(),
            style(&release.name).cyan(),
            style(release.version).yellow()
        );
    }

    display::print_notes(release.notes.as_deref());
    Ok(())
}
