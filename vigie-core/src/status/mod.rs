//! Liveness probing of a single domain over a single scheme
//!
//! - `outcome`: network outcomes and their canonical status strings
//! - `redirect`: which redirects are followed transparently
//! - `transport`: the HTTP seam and its `reqwest` implementation
//! - `prober`: HEAD/GET probing with redirect following
//! - `replay`: scripted transport for offline runs

mod outcome;
mod prober;
mod redirect;
pub mod replay;
mod transport;

pub use outcome::{classify, sanitize_reason, Outcome, MISSING_LOCATION};
pub use prober::Prober;
pub use redirect::{is_redirect, same_registrable_domain, RedirectPolicy, REDIRECT_CODES};
pub use replay::ReplayTransport;
pub use transport::{HttpTransport, ProbeMethod, ProbeResponse, ReqwestTransport, TransportError};
