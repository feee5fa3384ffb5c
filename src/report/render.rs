//! Report Renderer

use console::{StyledObject, style};
use serde::Serialize;

use super::{ComplianceReport, Score};
use crate::probes::Verdict;

fn styled_verdict(verdict: Verdict) -> StyledObject<String> {
    let text = verdict.to_string();
    match verdict {
        Verdict::Pass => style(text).green().bold(),
        Verdict::Fail => style(text).red().bold(),
        Verdict::Partial => style(text).yellow().bold(),
    }
}

/// Human-readable report, one block per category
#[inline]
pub fn render_text(report: &ComplianceReport) -> String {
    let mut lines = vec![
        style("MCP Compliance Report").bold().underlined().to_string(),
        format!("Target: {}", report.target),
        format!("Run:    {}", style(report.run_id).dim()),
        String::new(),
    ];

    for (category, record) in report.categories() {
        lines.push(format!(
            "{} {} [{}]",
            styled_verdict(record.verdict),
            style(category.title()).bold(),
            category
        ));
        if let Some(note) = &record.note {
            lines.push(format!("    {}", style(note).dim()));
        }

        for probe in &record.probes {
            lines.push(format!(
                "    {:<22} {:<7} {}",
                probe.probe,
                styled_verdict(probe.outcome.verdict),
                probe.outcome.detail
            ));
            for (key, value) in &probe.outcome.diagnostics {
                lines.push(format!("{:>33}{}: {}", "", style(key).cyan(), value));
            }
        }
    }

    lines.push(String::new());
    lines.push(score_line(report.score()));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn score_line(score: Score) -> String {
    match score.percent() {
        Some(percent) => format!(
            "Score: {}/{} categories passed ({}%)",
            score.passed, score.scored, percent
        ),
        None => "Score: no category reached a definitive verdict".to_string(),
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    report: &'a ComplianceReport,
    score: Score,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_ratio: Option<f64>,
    exit_code: i32,
}

/// The report as pretty-printed JSON
#[inline]
pub fn render_json(report: &ComplianceReport) -> serde_json::Result<String> {
    let score = report.score();
    serde_json::to_string_pretty(&JsonReport {
        report,
        score,
        score_ratio: score.ratio(),
        exit_code: report.exit_code(),
    })
}
