//! One consolidation run: merge candidates into the registry, re-probe a
//! selection of it, persist the result.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::{Denylist, Kindness, ProbeConfig};
use crate::domain::{compare_names, Domain};
use crate::error::{Result, VigieError};
use crate::registry::{self, DomainSet, MergeSummary};
use crate::schedule::{ProbeResult, ProbeScheduler, ProbeUnit, ProgressCallback};
use crate::sources;
use crate::status::{is_redirect, Prober, MISSING_LOCATION};

/// Slice `bucket` (1-based) out of `count` stable hash buckets of the names.
///
/// Serialized as `"i/n"`, and only ever built through [`Partial::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Partial {
    bucket: u32,
    count: u32,
}

impl Partial {
    pub fn new(bucket: u32, count: u32) -> Result<Self> {
        if bucket == 0 || count == 0 || bucket > count {
            return Err(VigieError::InvalidArgument(format!(
                "invalid partial {}/{}: expected 1 <= bucket <= count",
                bucket, count
            )));
        }
        Ok(Self { bucket, count })
    }

    pub fn bucket(&self) -> u32 {
        self.bucket
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn contains(&self, name: &str) -> bool {
        let digest = Sha256::digest(name.as_bytes());
        let hash = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        hash % self.count == self.bucket - 1
    }
}

impl FromStr for Partial {
    type Err = VigieError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || VigieError::InvalidArgument(format!("invalid partial: {}", s));
        let (bucket, count) = s.split_once('/').ok_or_else(invalid)?;
        let bucket = bucket.trim().parse().map_err(|_| invalid())?;
        let count = count.trim().parse().map_err(|_| invalid())?;
        Self::new(bucket, count)
    }
}

impl TryFrom<String> for Partial {
    type Error = VigieError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Partial> for String {
    fn from(partial: Partial) -> Self {
        partial.to_string()
    }
}

impl fmt::Display for Partial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.count)
    }
}

/// Which registry entries a run probes
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Keep names containing any of these substrings
    pub grep: Vec<String>,
    /// Keep one hash bucket of the names
    pub partial: Option<Partial>,
    /// Keep names never probed
    pub new_only: bool,
    /// Keep at most this many domains
    pub limit: Option<usize>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_grep<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grep = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_partial(mut self, partial: Partial) -> Self {
        self.partial = Some(partial);
        self
    }

    pub fn with_new_only(mut self, new_only: bool) -> Self {
        self.new_only = new_only;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matching<'s, 'a: 's>(
        &'s self,
        domains: &'a DomainSet,
    ) -> impl Iterator<Item = &'a Domain> + 's {
        domains
            .iter()
            .filter(|d| self.grep.is_empty() || self.grep.iter().any(|p| d.name.contains(p.as_str())))
            .filter(|d| self.partial.map_or(true, |partial| partial.contains(&d.name)))
            .filter(|d| !self.new_only || !d.is_checked())
    }

    /// Selected domains, in registry order; the limit keeps the first ones.
    pub fn apply<'a>(&self, domains: &'a DomainSet) -> Vec<&'a Domain> {
        self.matching(domains)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Selected domains in random order; the limit keeps a random sample.
    pub fn sample<'a, R>(&self, domains: &'a DomainSet, rng: &mut R) -> Vec<&'a Domain>
    where
        R: Rng + ?Sized,
    {
        let mut selected: Vec<&Domain> = self.matching(domains).collect();
        selected.shuffle(rng);
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// A host reached through a cross-domain redirect and listed nowhere yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovery {
    pub target: String,
    pub from: String,
    /// Candidate file listing `from`
    pub source_file: Option<PathBuf>,
}

impl Discovery {
    /// Line suitable for a candidate file.
    pub fn to_candidate_line(&self) -> String {
        format!("{}  # (redirection from {})", self.target, self.from)
    }
}

/// Summary of one consolidation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Distinct candidate names
    pub candidates: usize,
    /// Names new to the registry
    pub added: usize,
    /// Registry entries dropped from every source
    pub pruned: usize,
    /// Size of the persisted registry
    pub total: usize,
    /// Domains chosen for probing
    pub selected: usize,
    /// Probe units that ran
    pub probed: usize,
    /// Probe units skipped after an interruption
    pub skipped: usize,
    /// Domains answering 200 over some scheme
    pub live: usize,
    pub interrupted: bool,
    pub peak_in_flight: usize,
    pub discoveries: Vec<Discovery>,
}

/// Loads, merges, probes and persists the registry.
#[derive(Debug, Clone)]
pub struct ConsolidationEngine {
    scheduler: ProbeScheduler,
    denylist: Denylist,
    shuffle: bool,
}

impl ConsolidationEngine {
    /// Engine probing over the network.
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let prober = Prober::from_config(config)?;
        Ok(Self::with_prober(prober, config.kindness))
    }

    pub fn with_prober(prober: Prober, kindness: Kindness) -> Self {
        Self {
            scheduler: ProbeScheduler::new(prober, kindness),
            denylist: Denylist::default(),
            shuffle: true,
        }
    }

    pub fn with_denylist(mut self, denylist: Denylist) -> Self {
        self.denylist = denylist;
        self
    }

    /// Shuffle probe units so that concurrent probes spread over hosts.
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn denylist(&self) -> &Denylist {
        &self.denylist
    }

    /// Runs the whole cycle against files.
    ///
    /// The registry is written even when probing was interrupted, with
    /// whatever statuses were collected.
    #[instrument(skip_all, fields(registry = %registry_path.display()))]
    pub async fn run(
        &self,
        source_files: &[PathBuf],
        registry_path: &Path,
        selection: &Selection,
        progress: Option<ProgressCallback>,
        cancel_rx: Option<watch::Receiver<bool>>,
    ) -> Result<RunReport> {
        let known = registry::load(registry_path)?;
        let candidates = sources::load_candidates(source_files)?;

        let (domains, report) = self
            .consolidate(&known, &candidates, selection, progress, cancel_rx)
            .await;

        registry::write(registry_path, &domains)?;
        info!(
            total = report.total,
            probed = report.probed,
            interrupted = report.interrupted,
            "Registry saved"
        );
        Ok(report)
    }

    /// In-memory part of a run: merge, select, probe, apply.
    pub async fn consolidate(
        &self,
        known: &DomainSet,
        candidates: &DomainSet,
        selection: &Selection,
        progress: Option<ProgressCallback>,
        cancel_rx: Option<watch::Receiver<bool>>,
    ) -> (DomainSet, RunReport) {
        let started_at = Utc::now();
        let summary = MergeSummary::between(known, candidates);
        let mut domains = registry::merge(known, candidates);

        let (selected_count, units) = {
            let mut rng = rand::thread_rng();
            let selected = if self.shuffle {
                selection.sample(&domains, &mut rng)
            } else {
                selection.apply(&domains)
            };
            let selected_count = selected.len();
            let mut units = ProbeUnit::for_domains(selected);
            if self.shuffle {
                units.shuffle(&mut rng);
            }
            (selected_count, units)
        };

        debug!(
            added = summary.added,
            pruned = summary.pruned,
            selected = selected_count,
            units = units.len(),
            "Merged registry"
        );

        let outcome = self.scheduler.run(units, progress, cancel_rx).await;
        registry::apply_results(&mut domains, &outcome.results);

        let discoveries = discover(&outcome.results, candidates, &self.denylist);
        let live = domains.iter().filter(|d| d.is_live()).count();

        let report = RunReport {
            started_at,
            ended_at: Utc::now(),
            candidates: candidates.len(),
            added: summary.added,
            pruned: summary.pruned,
            total: domains.len(),
            selected: selected_count,
            probed: outcome.results.len(),
            skipped: outcome.skipped,
            live,
            interrupted: outcome.interrupted,
            peak_in_flight: outcome.peak_in_flight,
            discoveries,
        };
        (domains, report)
    }
}

/// Cross-domain redirect targets that are neither denylisted nor listed.
fn discover(results: &[ProbeResult], candidates: &DomainSet, denylist: &Denylist) -> Vec<Discovery> {
    let mut results: Vec<&ProbeResult> = results.iter().collect();
    results.sort_by(|a, b| {
        compare_names(&a.name, &b.name).then_with(|| a.scheme.as_str().cmp(b.scheme.as_str()))
    });

    let mut found: BTreeMap<String, Discovery> = BTreeMap::new();
    for result in results {
        let Some(target) = redirect_host(result) else {
            continue;
        };
        if target == result.name
            || denylist.contains(&target)
            || candidates.contains(&Domain::new(target.clone()))
            || found.contains_key(&target)
        {
            continue;
        }
        let source_file = candidates
            .get(&Domain::new(result.name.clone()))
            .and_then(|d| d.source_file.clone());
        found.insert(
            target.clone(),
            Discovery {
                target,
                from: result.name.clone(),
                source_file,
            },
        );
    }

    let mut discoveries: Vec<Discovery> = found.into_values().collect();
    discoveries.sort_by(|a, b| compare_names(&a.target, &b.target));
    discoveries
}

/// Host a recorded redirect status points to.
fn redirect_host(result: &ProbeResult) -> Option<String> {
    let status = &result.status;
    let code: u16 = status.split(' ').next()?.parse().ok()?;
    if !is_redirect(code) || status.ends_with(MISSING_LOCATION) {
        return None;
    }
    let location = status.rsplit(' ').next()?;
    let base = Url::parse(&format!("{}://{}/", result.scheme, result.name)).ok()?;
    let target = base.join(location).ok()?;
    target.host_str().map(|host| host.trim_end_matches('.').to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Scheme;
    use crate::status::{ProbeResponse, RedirectPolicy, ReplayTransport};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn engine(transport: ReplayTransport) -> ConsolidationEngine {
        let prober = Prober::new(Arc::new(transport), RedirectPolicy::new(10));
        ConsolidationEngine::with_prober(prober, Kindness::Normal)
    }

    fn set(names: &[&str]) -> DomainSet {
        names.iter().map(|n| Domain::new(*n)).collect()
    }

    fn result(name: &str, status: &str) -> ProbeResult {
        ProbeResult {
            name: name.to_string(),
            scheme: Scheme::Https,
            status: status.to_string(),
            duration_ms: 0,
        }
    }

    #[test]
    fn test_partial_parse_and_buckets() {
        assert_eq!("2/3".parse::<Partial>().unwrap(), Partial::new(2, 3).unwrap());
        assert!("0/2".parse::<Partial>().is_err());
        assert!("3/2".parse::<Partial>().is_err());
        assert!("half".parse::<Partial>().is_err());

        let names: Vec<String> = (0..50).map(|i| format!("d{}.example.fr", i)).collect();
        let halves = [Partial::new(1, 2).unwrap(), Partial::new(2, 2).unwrap()];
        for name in &names {
            // Each name falls in exactly one bucket
            assert_eq!(halves.iter().filter(|p| p.contains(name)).count(), 1);
        }
    }

    #[test]
    fn test_partial_deserializes_through_validation() {
        let partial: Partial = serde_json::from_str("\"2/3\"").unwrap();
        assert_eq!((partial.bucket(), partial.count()), (2, 3));
        assert_eq!(serde_json::to_string(&partial).unwrap(), "\"2/3\"");

        assert!(serde_json::from_str::<Partial>("\"0/0\"").is_err());
        assert!(serde_json::from_str::<Partial>("\"4/3\"").is_err());
        assert!(serde_json::from_str::<Partial>(r#"{"bucket":0,"count":0}"#).is_err());
    }

    #[test]
    fn test_selection_sample_draws_from_whole_selection() {
        let names: Vec<String> = (0..20).map(|i| format!("d{:02}.example.fr", i)).collect();
        let domains: DomainSet = names.iter().map(|n| Domain::new(n.as_str())).collect();
        let selection = Selection::all().with_grep(["example"]).with_limit(3);

        let mut seen = std::collections::BTreeSet::new();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let sample = selection.sample(&domains, &mut rng);
            assert_eq!(sample.len(), 3);
            seen.extend(sample.into_iter().map(|d| d.name.clone()));
        }
        // Not stuck on the first names in registry order
        assert!(seen.len() > 3);

        let unlimited = Selection::all().sample(&domains, &mut StdRng::seed_from_u64(7));
        assert_eq!(unlimited.len(), 20);
    }

    #[tokio::test]
    async fn test_limit_without_shuffle_keeps_registry_order() {
        let candidates = set(&["a.example.fr", "b.example.fr", "c.example.fr"]);
        let (domains, report) = engine(ReplayTransport::new())
            .with_shuffle(false)
            .consolidate(
                &DomainSet::new(),
                &candidates,
                &Selection::all().with_limit(2),
                None,
                None,
            )
            .await;
        assert_eq!(report.selected, 2);
        assert_eq!(report.probed, 4);
        let checked: Vec<&str> = domains
            .iter()
            .filter(|d| d.is_checked())
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(checked, vec!["a.example.fr", "b.example.fr"]);
    }

    #[test]
    fn test_selection_filters() {
        let mut domains = set(&["mairie.a.fr", "mairie.b.fr", "www.b.fr", "www.c.fr"]);
        let mut checked = domains.take(&Domain::new("www.c.fr")).unwrap();
        checked.set_status(Scheme::Http, "Timeout");
        domains.insert(checked);

        let names = |selection: Selection| -> Vec<String> {
            selection
                .apply(&domains)
                .into_iter()
                .map(|d| d.name.clone())
                .collect()
        };

        assert_eq!(names(Selection::all()).len(), 4);
        assert_eq!(
            names(Selection::all().with_grep(["mairie", "c.fr"])),
            vec!["mairie.a.fr", "mairie.b.fr", "www.c.fr"]
        );
        assert_eq!(names(Selection::all().with_new_only(true)).len(), 3);
        assert_eq!(names(Selection::all().with_limit(2)), vec!["mairie.a.fr", "mairie.b.fr"]);
    }

    #[test]
    fn test_discoveries() {
        let candidates = set(&["listed.example.fr", "mairie.example.fr", "www.example.fr"]);
        let denylist = Denylist::new(["squat.example"]);
        let results = vec![
            result("mairie.example.fr", "302 Found https://nouveau.example.fr/accueil"),
            result("www.example.fr", "301 Moved Permanently https://listed.example.fr/"),
            result("www.example.fr", "301 Moved Permanently https://www.squat.example/"),
            result("www.example.fr", "301 Moved Permanently (but no Location in headers)"),
            result("www.example.fr", "200 OK"),
        ];

        let discoveries = discover(&results, &candidates, &denylist);
        assert_eq!(discoveries.len(), 1);
        assert_eq!(discoveries[0].target, "nouveau.example.fr");
        assert_eq!(discoveries[0].from, "mairie.example.fr");
        assert_eq!(
            discoveries[0].to_candidate_line(),
            "nouveau.example.fr  # (redirection from mairie.example.fr)"
        );
    }

    #[tokio::test]
    async fn test_consolidate_merges_and_probes() {
        let transport = ReplayTransport::new()
            .respond("https://mairie.example.fr/", ProbeResponse::new(200, "OK"))
            .respond(
                "http://mairie.example.fr/",
                ProbeResponse::new(301, "Moved Permanently").with_location("https://mairie.example.fr/"),
            );

        let mut old = Domain::new("ancien.example.fr");
        old.set_status(Scheme::Https, "200 OK");
        let known: DomainSet = [old].into();
        let candidates = set(&["mairie.example.fr", "injoignable.example.fr"]);

        let (domains, report) = engine(transport)
            .consolidate(&known, &candidates, &Selection::all(), None, None)
            .await;

        assert_eq!(report.added, 2);
        assert_eq!(report.pruned, 1);
        assert_eq!(report.probed, 4);
        assert_eq!(report.live, 1);
        assert!(!report.interrupted);

        let mairie = domains.get(&Domain::new("mairie.example.fr")).unwrap();
        assert_eq!(mairie.https_status.as_deref(), Some("200 OK"));
        assert_eq!(mairie.http_status.as_deref(), Some("200 OK"));
        let dead = domains.get(&Domain::new("injoignable.example.fr")).unwrap();
        assert_eq!(dead.https_status.as_deref(), Some("Cannot connect"));
        assert!(!domains.contains(&Domain::new("ancien.example.fr")));
    }

    #[tokio::test]
    async fn test_unselected_domains_keep_statuses() {
        let mut known_domain = Domain::new("connu.example.fr");
        known_domain.set_status(Scheme::Https, "200 OK");
        let known: DomainSet = [known_domain].into();
        let candidates = set(&["connu.example.fr", "nouveau.example.fr"]);

        let (domains, report) = engine(ReplayTransport::new())
            .consolidate(
                &known,
                &candidates,
                &Selection::all().with_new_only(true),
                None,
                None,
            )
            .await;

        assert_eq!(report.selected, 1);
        let connu = domains.get(&Domain::new("connu.example.fr")).unwrap();
        assert_eq!(connu.https_status.as_deref(), Some("200 OK"));
        let nouveau = domains.get(&Domain::new("nouveau.example.fr")).unwrap();
        assert!(nouveau.is_checked());
    }
}
