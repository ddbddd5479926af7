use std::path::Path;

use tracing::debug;

use super::DomainSet;
use crate::error::{Result, VigieError};

/// Canonical URLs of live domains, in registry order.
pub fn live_urls(domains: &DomainSet) -> Vec<String> {
    domains.iter().filter_map(|domain| domain.url()).collect()
}

/// Writes the derived URL list, one URL per line.
pub fn write_urls(path: &Path, domains: &DomainSet) -> Result<usize> {
    let urls = live_urls(domains);
    let mut content = urls.join("\n");
    content.push('\n');
    std::fs::write(path, content).map_err(|e| VigieError::file(path, e))?;
    debug!(path = %path.display(), count = urls.len(), "Wrote URL list");
    Ok(urls.len())
}
