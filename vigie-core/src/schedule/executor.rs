use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use super::limiter::ConcurrencyLimiter;
use crate::config::Kindness;
use crate::domain::{Domain, Scheme};
use crate::status::Prober;

pub type ProgressCallback = Box<dyn Fn(usize, usize, &str) + Send + Sync>;

/// One (domain, scheme) pair to probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProbeUnit {
    pub name: String,
    pub scheme: Scheme,
}

impl ProbeUnit {
    pub fn new(name: impl Into<String>, scheme: Scheme) -> Self {
        Self {
            name: name.into(),
            scheme,
        }
    }

    /// Both schemes of every domain.
    pub fn for_domains<'a>(domains: impl IntoIterator<Item = &'a Domain>) -> Vec<ProbeUnit> {
        domains
            .into_iter()
            .flat_map(|domain| {
                Scheme::ALL
                    .iter()
                    .map(move |scheme| ProbeUnit::new(domain.name.clone(), *scheme))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub name: String,
    pub scheme: Scheme,
    pub status: String,
    pub duration_ms: u64,
}

/// What a scheduling pass produced
#[derive(Debug, Clone, Default)]
pub struct ScheduleOutcome {
    /// Results of every unit that was admitted, in completion order
    pub results: Vec<ProbeResult>,
    /// Units never admitted because of cancellation
    pub skipped: usize,
    pub interrupted: bool,
    /// Highest number of units in flight at once
    pub peak_in_flight: usize,
}

/// Fans probe units out under a concurrency gate.
#[derive(Debug, Clone)]
pub struct ProbeScheduler {
    prober: Prober,
    concurrency: usize,
}

impl ProbeScheduler {
    pub fn new(prober: Prober, kindness: Kindness) -> Self {
        Self {
            prober,
            concurrency: kindness.capacity(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Probes every unit, at most `concurrency` at a time.
    ///
    /// When `cancel_rx` turns true the gate closes: units not yet admitted are
    /// skipped and units already probing run to completion. A probe failure
    /// is a status, so no unit can abort another.
    pub async fn run(
        &self,
        units: Vec<ProbeUnit>,
        progress: Option<ProgressCallback>,
        cancel_rx: Option<watch::Receiver<bool>>,
    ) -> ScheduleOutcome {
        let total = units.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let limiter = ConcurrencyLimiter::new(self.concurrency);

        debug!(
            total = total,
            concurrency = self.concurrency,
            "Starting probe scheduling"
        );

        if cancel_rx.as_ref().is_some_and(|rx| *rx.borrow()) {
            limiter.close();
        }
        let watcher = cancel_rx
            .clone()
            .map(|rx| tokio::spawn(close_on_cancel(rx, limiter.clone())));

        let outcomes: Vec<Option<ProbeResult>> = stream::iter(units)
            .map(|unit| {
                let limiter = limiter.clone();
                let completed = completed.clone();
                let progress = progress.as_ref();
                let prober = &self.prober;
                let cancel_rx = cancel_rx.clone();

                async move {
                    let permit = limiter.acquire().await?;
                    if cancel_rx.as_ref().is_some_and(|rx| *rx.borrow()) {
                        limiter.close();
                        return None;
                    }

                    let start = Instant::now();
                    let status = prober.probe(&unit.name, unit.scheme).await;
                    let duration_ms = start.elapsed().as_millis() as u64;
                    drop(permit);

                    let count = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(progress) = progress {
                        progress(count, total, &unit.name);
                    }

                    Some(ProbeResult {
                        name: unit.name,
                        scheme: unit.scheme,
                        status,
                        duration_ms,
                    })
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        if let Some(watcher) = watcher {
            watcher.abort();
        }

        let results: Vec<ProbeResult> = outcomes.into_iter().flatten().collect();
        let skipped = total - results.len();
        // A cancellation arriving after the last admission cost nothing
        let interrupted = skipped > 0;

        if interrupted {
            info!(
                probed = results.len(),
                skipped = skipped,
                "Probing interrupted, keeping partial results"
            );
        }

        ScheduleOutcome {
            results,
            skipped,
            interrupted,
            peak_in_flight: limiter.peak(),
        }
    }
}

async fn close_on_cancel(mut cancel_rx: watch::Receiver<bool>, limiter: ConcurrencyLimiter) {
    loop {
        if *cancel_rx.borrow() {
            debug!("Cancellation requested, closing admission");
            limiter.close();
            return;
        }
        if cancel_rx.changed().await.is_err() {
            // Sender gone without cancelling
            return;
        }
    }
}
