//! The registry entity: a domain name with its per-scheme probe statuses.
//!
//! Identity is the name alone. Two records sharing a name are the same entity
//! whatever their statuses or provenance, and the registry order compares the
//! dot-separated labels from the TLD down.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VigieError;

/// The two schemes every domain is probed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Probe order used by the scheduler.
    pub const ALL: [Scheme; 2] = [Scheme::Https, Scheme::Http];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = VigieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            _ => Err(VigieError::InvalidArgument(format!("unknown scheme: {}", s))),
        }
    }
}

/// A registry entry.
///
/// `PartialEq`, `Eq`, `Hash` and `Ord` are implemented by hand and only look
/// at `name`: a freshly listed, status-less record collides with the known
/// record of the same name in every set operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Domain {
    /// Lowercase hostname without trailing dot
    pub name: String,
    /// Canonical status of the last `http://` probe
    pub http_status: Option<String>,
    /// Canonical status of the last `https://` probe
    pub https_status: Option<String>,
    /// Organizational identifier of the owning body
    #[serde(rename = "SIREN")]
    pub siren: Option<String>,
    /// Kind of organization (commune, hospital, ...)
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Where the name was found
    pub sources: Option<String>,
    /// Importer that harvested the name
    pub script: Option<String>,
    /// Candidate file the name was read from, never persisted
    #[serde(skip)]
    pub source_file: Option<PathBuf>,
    /// Trailing `#` comment of the candidate line, never persisted
    #[serde(skip)]
    pub comment: String,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Labels from the TLD down; this is the registry ordering key.
    pub fn sort_key(&self) -> impl Iterator<Item = &str> + '_ {
        self.name.rsplit('.')
    }

    pub fn status(&self, scheme: Scheme) -> Option<&str> {
        match scheme {
            Scheme::Http => self.http_status.as_deref(),
            Scheme::Https => self.https_status.as_deref(),
        }
    }

    pub fn set_status(&mut self, scheme: Scheme, status: impl Into<String>) {
        let status = Some(status.into());
        match scheme {
            Scheme::Http => self.http_status = status,
            Scheme::Https => self.https_status = status,
        }
    }

    /// True once at least one scheme has been probed.
    pub fn is_checked(&self) -> bool {
        self.http_status.is_some() || self.https_status.is_some()
    }

    /// Scheme under which the domain answers `200`, HTTPS preferred.
    pub fn live_scheme(&self) -> Option<Scheme> {
        let is_ok = |status: Option<&str>| status.is_some_and(|s| s.starts_with("200 "));
        if is_ok(self.status(Scheme::Https)) {
            Some(Scheme::Https)
        } else if is_ok(self.status(Scheme::Http)) {
            Some(Scheme::Http)
        } else {
            None
        }
    }

    pub fn is_live(&self) -> bool {
        self.live_scheme().is_some()
    }

    /// Canonical URL of a live domain.
    pub fn url(&self) -> Option<String> {
        self.live_scheme()
            .map(|scheme| format!("{}://{}", scheme, self.name))
    }
}

impl PartialEq for Domain {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Domain {}

impl Hash for Domain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Ord for Domain {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(other.sort_key())
    }
}

impl PartialOrd for Domain {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.comment.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}  # {}", self.name, self.comment)
        }
    }
}

/// Compares two bare names with the registry order.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.rsplit('.').cmp(b.rsplit('.'))
}
