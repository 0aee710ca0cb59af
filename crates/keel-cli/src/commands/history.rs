//! History command - show the revisions of a release

use console::style;
use keel_kube::ServerConfig;
use miette::IntoDiagnostic;
use serde_json::json;

use crate::display;
use crate::error::Result;
use crate::util::offline;

pub async fn run(config: ServerConfig, name: &str, max: usize, output_json: bool) -> Result<()> {
    let server = offline(config).await?;
    let history = server.history(name, max).await?;

    if output_json {
        let entries: Vec<_> = history
            .iter()
            .map(|r| {
                json!({
                    "revision": r.version,
                    "status": r.status(),
                    "chart": display::chart_label(r),
                    "updated": r.info.last_deployed,
                    "description": r.info.description,
                })
            })
            .collect();
        let json = serde_json::to_string_pretty(&entries).into_diagnostic()?;
        println!("{}", json);
        return Ok(());
    }

    println!(
        "{:<10} {:<20} {:<17} {:<30} {}",
        style("REVISION").bold(),
        style("UPDATED").bold(),
        style("STATUS").bold(),
        style("CHART").bold(),
        style("DESCRIPTION").bold()
    );
    for release in &history {
        println!(
            "{:<10} {:<20} {:<17} {:<30} {}",
            release.version,
            display::timestamp(&release.info.last_deployed),
            display::status(release.status()),
            display::chart_label(release),
            release.info.description
        );
    }

    Ok(())
}
