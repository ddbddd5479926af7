pub mod colors;
pub mod config;
pub mod consolidate;
pub mod domain;
pub mod error;
pub mod lint;
pub mod output;
pub mod registry;
pub mod schedule;
pub mod sources;
pub mod status;
pub mod validation;

pub use config::{Denylist, Kindness, ProbeConfig};
pub use domain::{Domain, Scheme};
pub use error::{Result, VigieError};
pub use validation::{is_valid_domain, normalize_host};

pub use consolidate::{ConsolidationEngine, Discovery, Partial, RunReport, Selection};
pub use lint::{LintIssue, LintReport, Linter};
pub use registry::DomainSet;
pub use schedule::{
    ConcurrencyLimiter, ProbeResult, ProbeScheduler, ProbeUnit, ProgressCallback, ScheduleOutcome,
};
pub use status::{classify, Outcome, Prober, RedirectPolicy};

pub use output::{OutputFormat, OutputFormatter};
