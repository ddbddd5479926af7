use chrono::TimeDelta;
use colored::Colorize;

use super::OutputFormatter;
use crate::colors::{PaletteExt, StatusTone};
use crate::consolidate::RunReport;
use crate::domain::{Domain, Scheme};
use crate::lint::LintReport;

fn format_duration(duration: TimeDelta) -> String {
    let total_secs = duration.num_seconds();
    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        format!("{}m {}s", mins, secs)
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        format!("{}h {}m", hours, mins)
    }
}

pub struct HumanFormatter {
    use_colors: bool,
}

impl Default for HumanFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self { use_colors: true }
    }

    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    fn label(&self, text: &str) -> String {
        if self.use_colors {
            text.property().to_string()
        } else {
            text.to_string()
        }
    }

    fn title(&self, text: &str) -> String {
        if self.use_colors {
            text.title().to_string()
        } else {
            text.to_string()
        }
    }

    fn status(&self, status: Option<&str>) -> String {
        let text = status.unwrap_or("-");
        if self.use_colors {
            StatusTone::of(status).paint(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn warning(&self, text: &str) -> String {
        if self.use_colors {
            text.okish().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn error(&self, text: &str) -> String {
        if self.use_colors {
            text.ko().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn field(&self, output: &mut Vec<String>, label: &str, value: Option<&str>) {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            output.push(format!("  {}: {}", self.label(label), value));
        }
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_domain(&self, domain: &Domain) -> String {
        let mut output = vec![self.title(&domain.name)];

        self.field(&mut output, "type", domain.kind.as_deref());
        self.field(&mut output, "sources", domain.sources.as_deref());
        self.field(&mut output, "SIREN", domain.siren.as_deref());
        self.field(&mut output, "script", domain.script.as_deref());
        for scheme in [Scheme::Http, Scheme::Https] {
            output.push(format!(
                "  {}: {}",
                self.label(scheme.as_str()),
                self.status(domain.status(scheme))
            ));
        }

        output.join("\n")
    }

    fn format_report(&self, report: &RunReport) -> String {
        let mut output = Vec::new();

        let duration = report.ended_at - report.started_at;
        let headline = format!(
            "Probed {} domains in {}",
            report.selected,
            format_duration(duration)
        );
        output.push(self.title(&headline));

        if report.interrupted {
            output.push(format!(
                "  {} ({} probes skipped, partial results saved)",
                self.warning("Interrupted"),
                report.skipped
            ));
        }

        let counts = [
            ("candidates", report.candidates),
            ("added", report.added),
            ("pruned", report.pruned),
            ("probes", report.probed),
            ("live", report.live),
            ("registry", report.total),
        ];
        for (label, count) in counts {
            output.push(format!("  {}: {}", self.label(label), count));
        }
        output.push(format!(
            "  {}: {}",
            self.label("peak concurrency"),
            report.peak_in_flight
        ));

        if !report.discoveries.is_empty() {
            output.push(format!(
                "  {}:",
                self.label("discovered through redirections")
            ));
            for discovery in &report.discoveries {
                output.push(format!("    - {}", discovery.to_candidate_line()));
            }
        }

        output.join("\n")
    }

    fn format_lint(&self, report: &LintReport) -> String {
        let mut output: Vec<String> = report
            .issues
            .iter()
            .map(|issue| self.error(&issue.to_string()))
            .collect();

        let summary = format!(
            "{} issues in {} files ({} names)",
            report.issues.len(),
            report.files,
            report.names
        );
        if report.is_clean() {
            output.push(self.title(&summary));
        } else {
            output.push(self.warning(&summary));
        }

        output.join("\n")
    }
}
