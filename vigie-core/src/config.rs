//! Immutable settings injected into the prober and the consolidation engine.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::VigieError;

pub const DEFAULT_USER_AGENT: &str =
    "See https://github.com/etalab/noms-de-domaine-organismes-publics";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_MAX_REDIRECTS: usize = 10;

/// How gently remote servers are treated.
///
/// Each tier caps the number of probes in flight at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kindness {
    #[default]
    Normal,
    Slow,
    Slower,
    Slowest,
}

impl Kindness {
    pub fn capacity(&self) -> usize {
        match self {
            Kindness::Normal => 20,
            Kindness::Slow => 10,
            Kindness::Slower => 5,
            Kindness::Slowest => 2,
        }
    }
}

impl fmt::Display for Kindness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kindness::Normal => "normal",
            Kindness::Slow => "slow",
            Kindness::Slower => "slower",
            Kindness::Slowest => "slowest",
        };
        f.write_str(name)
    }
}

impl FromStr for Kindness {
    type Err = VigieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" | "0" => Ok(Kindness::Normal),
            "slow" | "1" => Ok(Kindness::Slow),
            "slower" | "2" => Ok(Kindness::Slower),
            "slowest" | "3" => Ok(Kindness::Slowest),
            _ => Err(VigieError::InvalidArgument(format!(
                "unknown kindness tier: {}",
                s
            ))),
        }
    }
}

/// Settings shared by every probe of a run
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Sent as `User-Agent` on every request
    pub user_agent: String,
    /// Total time allowed for one request, connection included
    pub timeout: Duration,
    /// Same-domain redirect hops followed before giving up
    pub max_redirects: usize,
    /// Treat `example.fr` and `www.example.fr` as the same authority
    pub follow_www_alias: bool,
    /// Concurrency tier of the scheduler
    pub kindness: Kindness,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            follow_www_alias: true,
            kindness: Kindness::default(),
        }
    }
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_www_alias(mut self, follow: bool) -> Self {
        self.follow_www_alias = follow;
        self
    }

    pub fn with_kindness(mut self, kindness: Kindness) -> Self {
        self.kindness = kindness;
        self
    }
}

/// Domains commonly found behind redirections or in certificates that do
/// not belong to a public body (squatted names, hosting panels, ...).
const NON_PUBLIC_DOMAINS: &[&str] = &[
    "128k.io",
    "3dathome.fr",
    "attichy.com",
    "bellevillesurmeuse.com",
    "catchtiger.com",
    "changementadresse-carte-grise.com",
    "cloudflaressl.com",
    "commententreprendre.com",
    "communecter.org",
    "creps.ovh",
    "cyberfinder.com",
    "dropcatch.com",
    "esbooks.co.jp",
    "eureka27.fr",
    "eurodislog.com",
    "gitbook.com",
    "github.com",
    "github.io",
    "go.crisp.chat",
    "google.com",
    "host-web.com",
    "imperva.com",
    "incapsula.com",
    "infomaniak.com",
    "lexigraphie.fr",
    "medium.com",
    "mesvres.com",
    "microsoftonline.com",
    "notes-de-frais.info",
    "odyssey-messaging.com",
    "on-web.fr",
    "opendatasoft.com",
    "ovh.co.uk",
    "passeport-mairie.com",
    "paysdemirepoix.org",
    "plafond-pinel.info",
    "pre-demande.fr",
    "remixweb.eu",
    "sarbacane.com",
    "sendinblue.com",
    "sioracderiberac.com",
    "varchetta.fr",
    "viteundevis.com",
    "vitry-sur-orne.com",
    "voxaly.com",
    "wewmanager.com",
];

/// Suffixes of names known not to be public services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denylist {
    suffixes: BTreeSet<String>,
}

impl Default for Denylist {
    fn default() -> Self {
        Self::new(NON_PUBLIC_DOMAINS.iter().copied())
    }
}

impl Denylist {
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            suffixes: suffixes
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            suffixes: BTreeSet::new(),
        }
    }

    /// True when `name` ends with a denylisted suffix.
    pub fn contains(&self, name: &str) -> bool {
        self.suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
    }

    pub fn len(&self) -> usize {
        self.suffixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }
}
