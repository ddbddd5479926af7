//! Which redirects a probe follows on its own.

use url::Url;

use super::transport::ProbeResponse;
use crate::config::ProbeConfig;

/// Status codes rendered as redirects.
pub const REDIRECT_CODES: [u16; 5] = [301, 302, 303, 307, 308];

pub fn is_redirect(code: u16) -> bool {
    REDIRECT_CODES.contains(&code)
}

/// True when both URLs share the same authority (userinfo, host and port).
pub fn same_registrable_domain(a: &Url, b: &Url) -> bool {
    a.username() == b.username()
        && a.password() == b.password()
        && a.host_str() == b.host_str()
        && a.port() == b.port()
}

/// Follows redirects that stay on the same authority, up to a hop ceiling.
///
/// A redirect leaving the authority is a different destination (a squatted
/// name, a hosting panel, an identity provider) and is left unfollowed so the
/// redirect itself becomes the recorded status.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    max_hops: usize,
    www_alias: bool,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::from_config(&ProbeConfig::default())
    }
}

impl RedirectPolicy {
    pub fn new(max_hops: usize) -> Self {
        Self {
            max_hops,
            www_alias: false,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            max_hops: config.max_redirects,
            www_alias: config.follow_www_alias,
        }
    }

    /// Also treat `host` and `www.host` as the same authority.
    pub fn with_www_alias(mut self, www_alias: bool) -> Self {
        self.www_alias = www_alias;
        self
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    pub fn is_same_destination(&self, a: &Url, b: &Url) -> bool {
        if same_registrable_domain(a, b) {
            return true;
        }
        if !self.www_alias {
            return false;
        }
        let strip = |url: &Url| {
            url.host_str()
                .map(|host| host.strip_prefix("www.").unwrap_or(host).to_string())
        };
        a.username() == b.username()
            && a.password() == b.password()
            && a.port() == b.port()
            && strip(a).is_some()
            && strip(a) == strip(b)
    }

    /// Where to go next, or `None` when `response` is final.
    pub fn next_hop(&self, current: &Url, response: &ProbeResponse, hops_left: usize) -> Option<Url> {
        if hops_left == 0 || !is_redirect(response.status) {
            return None;
        }
        let location = response.location.as_deref()?;
        let destination = current.join(location).ok()?;
        self.is_same_destination(current, &destination)
            .then_some(destination)
    }
}
