//! Wormhole Retrieval
//!
//! Fetches content by ID from whichever network can serve it.
//!
//! # Design
//!
//! A retrieval is an ordered list of [`RetrievalAttempt`]s, one per
//! transport. [`retrieve_from_best_candidate`] runs them one at a time and
//! returns the first [`RetrievalStats`]; if they all fail the error keeps
//! every attempt's reason.
//!
//! - The swarm attempt asks the peer directory for providers, waits for one
//!   with an address, then walks the graph under the root, counting each
//!   block once and summing leaf bytes.
//! - The market attempt queries every candidate in parallel, ranks the
//!   answers (no unsealing first, then total cost, then size) and tries paid
//!   transfers one candidate at a time until one succeeds.
//!
//! One [`CancellationToken`](tokio_util::sync::CancellationToken) spans a
//! whole retrieval. Every wait observes it.

mod attempt;
mod candidate;
mod config;
mod error;
pub mod market;
mod node;
mod orchestrator;
mod progress;
mod stats;
mod swarm;

#[cfg(test)]
mod testing;

pub use attempt::{AttemptPlan, Network, RetrievalAttempt};
pub use candidate::{candidates_for, parse_miners, Candidate, CandidateDiscovery, MinerAddress};
pub use config::{RetrievalConfig, DEFAULT_LISTEN_ADDR, DEFAULT_MARKET_API};
pub use error::{AttemptFailure, AttemptFailures, Error, ErrorClass, Result};
pub use market::{GatewayClient, MarketAttempt, MarketClient, Selector, DEFAULT_QUERY_TIMEOUT};
pub use node::{ContentNode, LocalNode, PeerId, ProviderRecord};
pub use orchestrator::retrieve_from_best_candidate;
pub use progress::{ChannelProgress, NoProgress, ProgressEvent, ProgressSink};
pub use stats::RetrievalStats;
pub use swarm::{SwarmAttempt, DEFAULT_WALK_CONCURRENCY};
