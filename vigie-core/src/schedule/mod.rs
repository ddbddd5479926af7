mod executor;
mod limiter;

pub use executor::{ProbeResult, ProbeScheduler, ProbeUnit, ProgressCallback, ScheduleOutcome};
pub use limiter::{AdmissionPermit, ConcurrencyLimiter};
