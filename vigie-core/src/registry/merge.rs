use tracing::warn;

use super::DomainSet;
use crate::domain::Domain;
use crate::schedule::ProbeResult;

/// Merges the persisted registry with the current candidates.
///
/// The result holds exactly the candidate names. A name present on both
/// sides keeps the known record, so statuses survive re-listing; only the
/// unpersisted provenance (source file, comment) is taken from the candidate.
pub fn merge(known: &DomainSet, candidates: &DomainSet) -> DomainSet {
    candidates
        .iter()
        .map(|candidate| match known.get(candidate) {
            Some(existing) => {
                let mut kept = existing.clone();
                kept.source_file = candidate.source_file.clone();
                kept.comment = candidate.comment.clone();
                kept
            }
            None => candidate.clone(),
        })
        .collect()
}

/// How a merge changed the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Candidates not yet in the registry
    pub added: usize,
    /// Registry entries no longer listed anywhere
    pub pruned: usize,
    /// Size of the merged registry
    pub total: usize,
}

impl MergeSummary {
    pub fn between(known: &DomainSet, candidates: &DomainSet) -> Self {
        Self {
            added: candidates.difference(known).count(),
            pruned: known.difference(candidates).count(),
            total: candidates.len(),
        }
    }
}

/// Writes probe statuses back into their domains.
///
/// Returns how many results were applied; results for names absent from
/// `domains` are dropped.
pub fn apply_results(domains: &mut DomainSet, results: &[ProbeResult]) -> usize {
    let mut applied = 0;
    for result in results {
        let probe = Domain::new(result.name.clone());
        match domains.take(&probe) {
            Some(mut domain) => {
                domain.set_status(result.scheme, result.status.clone());
                domains.insert(domain);
                applied += 1;
            }
            None => warn!(domain = %result.name, "Probe result for unknown domain dropped"),
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Domain, Scheme};
    use std::path::PathBuf;

    fn checked(name: &str, https: &str) -> Domain {
        let mut domain = Domain::new(name);
        domain.set_status(Scheme::Https, https);
        domain
    }

    #[test]
    fn test_known_statuses_win() {
        let known: DomainSet = [checked("mairie.example.fr", "200 OK")].into();
        let mut fresh = checked("mairie.example.fr", "Timeout");
        fresh.source_file = Some(PathBuf::from("sources/communes.txt"));
        let candidates: DomainSet = [fresh].into();

        let merged = merge(&known, &candidates);
        let domain = merged.iter().next().unwrap();
        assert_eq!(domain.https_status.as_deref(), Some("200 OK"));
        assert_eq!(
            domain.source_file.as_deref(),
            Some(std::path::Path::new("sources/communes.txt"))
        );
    }

    #[test]
    fn test_unlisted_domains_are_pruned() {
        let known: DomainSet = [
            checked("ancienne.example.fr", "200 OK"),
            checked("mairie.example.fr", "200 OK"),
        ]
        .into();
        let candidates: DomainSet =
            [Domain::new("mairie.example.fr"), Domain::new("nouvelle.example.fr")].into();

        let merged = merge(&known, &candidates);
        let names: Vec<&str> = merged.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["mairie.example.fr", "nouvelle.example.fr"]);
        assert_eq!(
            MergeSummary::between(&known, &candidates),
            MergeSummary {
                added: 1,
                pruned: 1,
                total: 2
            }
        );
    }

    #[test]
    fn test_apply_results() {
        let mut domains: DomainSet = [Domain::new("mairie.example.fr")].into();
        let results = vec![
            ProbeResult {
                name: "mairie.example.fr".to_string(),
                scheme: Scheme::Http,
                status: "Cannot connect".to_string(),
                duration_ms: 3,
            },
            ProbeResult {
                name: "absent.example.fr".to_string(),
                scheme: Scheme::Http,
                status: "200 OK".to_string(),
                duration_ms: 1,
            },
        ];

        assert_eq!(apply_results(&mut domains, &results), 1);
        assert_eq!(domains.len(), 1);
        let domain = domains.iter().next().unwrap();
        assert_eq!(domain.http_status.as_deref(), Some("Cannot connect"));
        assert_eq!(domain.https_status, None);
    }
}
