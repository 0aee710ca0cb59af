//! Display formatting for CLI output

use chrono::{DateTime, Utc};
use console::{StyledObject, style};
use keel_core::ReleaseStatus;
use keel_kube::Release;

/// A release status colored by how healthy it is
pub fn status(status: ReleaseStatus) -> StyledObject<String> {
    let text = status.to_string();
    match status {
        ReleaseStatus::Deployed => style(text).green(),
        ReleaseStatus::Failed => style(text).red(),
        s if s.is_pending() => style(text).yellow(),
        _ => style(text).dim(),
    }
}

pub fn timestamp(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `name-version` of the chart a release was rendered from
pub fn chart_label(release: &Release) -> String {
    format!(
        "{}-{}",
        release.chart.metadata.name, release.chart.metadata.version
    )
}

pub fn print_notes(notes: Option<&str>) {
    if let Some(notes) = notes {
        println!("\n{}", style("NOTES:").bold());
        println!("{}", notes.trim_end());
    }
}

pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}
