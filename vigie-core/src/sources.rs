//! Candidate lists: plain text files naming one host per line.
//!
//! ```text
//! # pure comment line
//! mairie.example.fr
//! Example.GOUV.fr   # trailing comment
//! https://portail.example.fr
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;
use url::Url;

use crate::domain::{Domain, Scheme};
use crate::error::{Result, VigieError};
use crate::registry::DomainSet;
use crate::validation::normalize_host;

/// Splits a candidate line into its host part and trailing comment.
///
/// Returns `None` for blank and pure comment lines.
pub fn split_line(line: &str) -> Option<(&str, &str)> {
    if line.starts_with('#') {
        return None;
    }
    let (host, comment) = line.split_once('#').unwrap_or((line, ""));
    let host = host.trim();
    if host.is_empty() {
        return None;
    }
    Some((host, comment.trim()))
}

/// Parses one candidate line.
///
/// A full `http(s)://` URL contributes its host, and since it was listed as
/// a working URL, that scheme's status starts as `"200 OK"`.
pub fn parse_line(line: &str, file: Option<&Path>) -> Option<Domain> {
    let (host, comment) = split_line(line)?;

    let lower = host.to_ascii_lowercase();
    let mut domain = if lower.starts_with("http://") || lower.starts_with("https://") {
        let url = Url::parse(host).ok()?;
        let scheme: Scheme = url.scheme().parse().ok()?;
        let mut domain = Domain::new(normalize_host(url.host_str()?));
        domain.set_status(scheme, "200 OK");
        domain
    } else {
        Domain::new(normalize_host(host))
    };

    if domain.name.is_empty() {
        return None;
    }
    domain.comment = comment.to_string();
    domain.source_file = file.map(Path::to_path_buf);
    Some(domain)
}

/// Parses a whole candidate list; the first occurrence of a name wins.
pub fn parse_candidates(content: &str, file: Option<&Path>) -> DomainSet {
    let mut domains = DomainSet::new();
    for line in content.lines() {
        if let Some(domain) = parse_line(line, file) {
            if !domains.contains(&domain) {
                domains.insert(domain);
            }
        }
    }
    domains
}

/// Reads and flattens every candidate file.
pub fn load_candidates(files: &[PathBuf]) -> Result<DomainSet> {
    let mut domains = DomainSet::new();
    for file in files {
        let content =
            std::fs::read_to_string(file).map_err(|e| VigieError::file(file, e))?;
        let parsed = parse_candidates(&content, Some(file));
        debug!(file = %file.display(), count = parsed.len(), "Loaded candidate list");
        for domain in parsed {
            if !domains.contains(&domain) {
                domains.insert(domain);
            }
        }
    }
    Ok(domains)
}

/// Rewrites a candidate list in registry order.
///
/// Comment lines heading the list stay on top, blank lines are dropped and
/// every other line moves along with its host.
pub fn sort_content(content: &str) -> String {
    let mut lines: Vec<&str> = content.lines().collect();
    let header_len = lines
        .iter()
        .take_while(|line| split_line(line).is_none())
        .count();
    let mut body: Vec<&str> = lines
        .split_off(header_len)
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect();
    body.sort_by_cached_key(|line| {
        parse_line(line, None)
            .map(|d| d.name.rsplit('.').map(str::to_string).collect::<Vec<_>>())
            .unwrap_or_default()
    });

    let mut sorted = String::with_capacity(content.len());
    for line in lines.into_iter().chain(body) {
        sorted.push_str(line);
        sorted.push('\n');
    }
    sorted
}

/// Sorts a candidate file in place; true when it changed.
pub fn sort_file(path: &Path) -> Result<bool> {
    let content = std::fs::read_to_string(path).map_err(|e| VigieError::file(path, e))?;
    let sorted = sort_content(&content);
    if sorted == content {
        return Ok(false);
    }
    std::fs::write(path, sorted).map_err(|e| VigieError::file(path, e))?;
    Ok(true)
}

/// Appends lines to a candidate file, creating it if needed.
pub fn append_lines<I, S>(path: &Path, lines: I) -> Result<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    use std::io::Write;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| VigieError::file(path, e))?;
    let mut count = 0;
    for line in lines {
        writeln!(file, "{}", line.as_ref()).map_err(|e| VigieError::file(path, e))?;
        count += 1;
    }
    Ok(count)
}

/// Text files of a candidate directory, sorted by path.
pub fn list_candidate_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| VigieError::file(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
