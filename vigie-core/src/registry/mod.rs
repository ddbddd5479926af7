//! The persisted registry: a deduplicated, ordered set of domains.

mod merge;
mod store;
mod urls;

use std::collections::BTreeSet;

use regex::Regex;

use crate::domain::Domain;
use crate::error::Result;

/// Domains in registry order, one entry per name.
pub type DomainSet = BTreeSet<Domain>;

pub use merge::{apply_results, merge, MergeSummary};
pub use store::{load, read_from, write, write_to, CSV_HEADERS};
pub use urls::{live_urls, write_urls};

/// Entries whose name matches `pattern`, in registry order.
pub fn find<'a>(domains: &'a DomainSet, pattern: &str) -> Result<Vec<&'a Domain>> {
    let regex = Regex::new(pattern)?;
    Ok(domains.iter().filter(|d| regex.is_match(&d.name)).collect())
}
