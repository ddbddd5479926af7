mod human;
mod json;

pub use human::HumanFormatter;
pub use json::JsonFormatter;

use serde::{Deserialize, Serialize};

use crate::consolidate::RunReport;
use crate::domain::Domain;
use crate::lint::LintReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" | "pretty" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

pub trait OutputFormatter {
    fn format_domain(&self, domain: &Domain) -> String;
    fn format_report(&self, report: &RunReport) -> String;
    fn format_lint(&self, report: &LintReport) -> String;
}

/// Formatter for `format`; `plain` drops colors and JSON indentation.
pub fn get_formatter(format: OutputFormat, plain: bool) -> Box<dyn OutputFormatter> {
    match (format, plain) {
        (OutputFormat::Human, false) => Box::new(HumanFormatter::new()),
        (OutputFormat::Human, true) => Box::new(HumanFormatter::new().without_colors()),
        (OutputFormat::Json, false) => Box::new(JsonFormatter::new()),
        (OutputFormat::Json, true) => Box::new(JsonFormatter::new().compact()),
    }
}
