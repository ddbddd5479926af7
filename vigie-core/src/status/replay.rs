//! In-memory transport answering from a script of canned replies.
//!
//! Used to replay a recorded run or to probe without a network. Unscripted
//! URLs fail the way an unreachable host does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::transport::{HttpTransport, ProbeMethod, ProbeResponse, TransportError};

#[derive(Debug, Clone)]
enum Reply {
    Respond(ProbeResponse),
    Fail(TransportError),
}

#[derive(Debug, Default)]
pub struct ReplayTransport {
    routes: HashMap<(Option<ProbeMethod>, String), Reply>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    requests: Mutex<Vec<(ProbeMethod, String)>>,
}

impl ReplayTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers any method on `url` with `response`.
    pub fn respond(self, url: &str, response: ProbeResponse) -> Self {
        self.route(None, url, Reply::Respond(response))
    }

    /// Answers only `method` on `url`; takes precedence over `respond`.
    pub fn respond_to(self, method: ProbeMethod, url: &str, response: ProbeResponse) -> Self {
        self.route(Some(method), url, Reply::Respond(response))
    }

    pub fn fail(self, url: &str, error: TransportError) -> Self {
        self.route(None, url, Reply::Fail(error))
    }

    /// Holds every request for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Highest number of requests observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<(ProbeMethod, String)> {
        match self.requests.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn route(mut self, method: Option<ProbeMethod>, url: &str, reply: Reply) -> Self {
        self.routes.insert((method, canonical(url)), reply);
        self
    }

    fn lookup(&self, method: ProbeMethod, url: &Url) -> Option<&Reply> {
        let key = url.as_str().to_string();
        self.routes
            .get(&(Some(method), key.clone()))
            .or_else(|| self.routes.get(&(None, key)))
    }
}

fn canonical(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

fn unreachable(url: &Url) -> TransportError {
    let host = url.host_str().unwrap_or_default();
    let port = url.port_or_known_default().unwrap_or_default();
    TransportError::Connect {
        message: format!("Cannot connect to host {}:{} ssl:default [Connect call failed]", host, port),
        detail: None,
    }
}

#[async_trait]
impl HttpTransport for ReplayTransport {
    async fn send(
        &self,
        method: ProbeMethod,
        url: &Url,
    ) -> std::result::Result<ProbeResponse, TransportError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((method, url.to_string()));
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = match self.lookup(method, url) {
            Some(Reply::Respond(response)) => Ok(response.clone()),
            Some(Reply::Fail(error)) => Err(error.clone()),
            None => Err(unreachable(url)),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
