use std::sync::Arc;

use tracing::{debug, info, instrument};
use url::Url;

use super::outcome::{classify, Outcome};
use super::redirect::RedirectPolicy;
use super::transport::{HttpTransport, ProbeMethod, ReqwestTransport};
use crate::config::ProbeConfig;
use crate::domain::Scheme;
use crate::error::Result;

/// Probes one scheme of one domain: HEAD first, GET when HEAD is refused,
/// same-domain redirects followed up to the policy's ceiling.
#[derive(Clone)]
pub struct Prober {
    transport: Arc<dyn HttpTransport>,
    policy: RedirectPolicy,
}

impl std::fmt::Debug for Prober {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prober")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Prober {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RedirectPolicy) -> Self {
        Self { transport, policy }
    }

    /// Prober over the network, configured from `config`.
    pub fn from_config(config: &ProbeConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::new(
            Arc::new(transport),
            RedirectPolicy::from_config(config),
        ))
    }

    pub fn policy(&self) -> &RedirectPolicy {
        &self.policy
    }

    /// Canonical status of `scheme://name`. Never fails.
    pub async fn probe(&self, name: &str, scheme: Scheme) -> String {
        classify(&self.probe_outcome(name, scheme).await)
    }

    #[instrument(skip(self), fields(domain = %name, scheme = %scheme))]
    pub async fn probe_outcome(&self, name: &str, scheme: Scheme) -> Outcome {
        let mut url = match Url::parse(&format!("{}://{}", scheme, name)) {
            Ok(url) => url,
            Err(e) => {
                return Outcome::Other {
                    kind: "InvalidUrl".to_string(),
                    message: e.to_string(),
                }
            }
        };
        let mut method = ProbeMethod::Head;
        let mut hops_left = self.policy.max_hops();

        loop {
            debug!(%url, %method, "Querying");
            let response = match self.transport.send(method, &url).await {
                Ok(response) => response,
                Err(e) => {
                    info!(%url, error = %e, "KO");
                    return e.into();
                }
            };
            info!(%url, status = response.status, "Answered");

            if response.status == 405 && method == ProbeMethod::Head {
                method = ProbeMethod::Get;
                continue;
            }

            match self.policy.next_hop(&url, &response, hops_left) {
                Some(next) => {
                    debug!(from = %url, to = %next, hops_left, "Following redirect");
                    url = next;
                    hops_left -= 1;
                }
                None => return response.into_outcome(),
            }
        }
    }
}
