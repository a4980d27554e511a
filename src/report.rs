use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{Client, PerformanceStatus};
use crate::performance::PerformanceReport;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusMix {
    pub green: usize,
    pub yellow: usize,
    pub red: usize,
}

pub fn summarize_statuses(reports: &[PerformanceReport]) -> StatusMix {
    let mut mix = StatusMix::default();
    for report in reports {
        match report.performance_status {
            PerformanceStatus::Green => mix.green += 1,
            PerformanceStatus::Yellow => mix.yellow += 1,
            PerformanceStatus::Red => mix.red += 1,
        }
    }
    mix
}

fn severity(status: PerformanceStatus) -> u8 {
    match status {
        PerformanceStatus::Red => 0,
        PerformanceStatus::Yellow => 1,
        PerformanceStatus::Green => 2,
    }
}

/// Renders a markdown overview; `clients` and `reports` are paired by index.
pub fn build_report(today: NaiveDate, clients: &[Client], reports: &[PerformanceReport]) -> String {
    let mix = summarize_statuses(reports);
    let mut rows: Vec<(&Client, &PerformanceReport)> = clients.iter().zip(reports).collect();
    rows.sort_by(|a, b| {
        severity(a.1.performance_status)
            .cmp(&severity(b.1.performance_status))
            .then(a.1.metrics.traffic_change.total_cmp(&b.1.metrics.traffic_change))
    });

    let mut output = String::new();

    let _ = writeln!(output, "# Client Performance Report");
    let _ = writeln!(output, "Generated {} (trailing 7-day windows)", today);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");
    let _ = writeln!(output, "- green: {}", mix.green);
    let _ = writeln!(output, "- yellow: {}", mix.yellow);
    let _ = writeln!(output, "- red: {}", mix.red);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Clients");

    if rows.is_empty() {
        let _ = writeln!(output, "No clients on file.");
        return output;
    }

    for (client, report) in rows {
        let stored = if client.performance_status == report.performance_status {
            String::new()
        } else {
            format!(" (stored: {})", client.performance_status)
        };
        let _ = writeln!(
            output,
            "- {} [{}]{}: traffic {} -> {} ({:+.1}%), rankings {} -> {} ({:+.1}%), trend {:?}",
            client.name,
            report.performance_status,
            stored,
            report.metrics.previous_traffic,
            report.metrics.current_traffic,
            report.metrics.traffic_change,
            report.metrics.previous_rankings,
            report.metrics.current_rankings,
            report.metrics.ranking_change,
            report.trend,
        );
    }

    output
}
